//! Uniform buffer layout.
//!
//! Offsets follow std140: scalars align to 4 bytes, two-component vectors
//! to 8, three and four component vectors to 16. Matrices are arrays of
//! column vectors, and array elements and structs round up to 16.

use crate::types::{IrType, StructMember, TypeId, TypeTable};

/// Size and alignment of a type in a uniform block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub size: u32,
    pub align: u32,
}

#[inline]
fn round_up(value: u32, align: u32) -> u32 {
    if align == 0 { value } else { value.div_ceil(align) * align }
}

/// std140 size and alignment of `ty`, or `None` for types that cannot live
/// in a uniform block (pointers, functions, opaque resources).
pub fn std140(types: &TypeTable, ty: TypeId) -> Option<Layout> {
    match types.get(ty)? {
        IrType::Bool | IrType::Int | IrType::Float => Some(Layout { size: 4, align: 4 }),
        IrType::Vector { count, .. } => {
            let align = if *count == 2 { 8 } else { 16 };
            Some(Layout {
                size: 4 * count,
                align,
            })
        }
        IrType::Matrix { column, columns } => {
            let stride = round_up(std140(types, *column)?.size, 16);
            Some(Layout {
                size: stride * columns,
                align: 16,
            })
        }
        IrType::Array { element, length } => {
            let element = std140(types, *element)?;
            let stride = round_up(element.size, 16);
            Some(Layout {
                size: stride * length,
                align: 16,
            })
        }
        IrType::Struct { members, .. } => {
            let mut offset = 0;
            let mut align = 16;
            for member in members {
                let layout = std140(types, member.ty)?;
                offset = round_up(offset, layout.align) + layout.size;
                align = align.max(layout.align);
            }
            Some(Layout {
                size: round_up(offset, align),
                align,
            })
        }
        _ => None,
    }
}

/// Assign std140 offsets to `members` in place and return the block size.
/// Members with no uniform layout keep `offset: None` and take no space.
pub fn assign_offsets(types: &TypeTable, members: &mut [StructMember]) -> u32 {
    let mut offset = 0;
    for member in members.iter_mut() {
        match std140(types, member.ty) {
            Some(layout) => {
                offset = round_up(offset, layout.align);
                member.offset = Some(offset);
                offset += layout.size;
            }
            None => member.offset = None,
        }
    }
    round_up(offset, 16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScalarKind;

    fn member(name: &str, ty: TypeId) -> StructMember {
        StructMember {
            name: name.into(),
            ty,
            offset: None,
        }
    }

    #[test]
    fn vec3_then_float_packs() {
        let mut types = TypeTable::new();
        let vec3 = types.vector(ScalarKind::Float, 3);
        let float = types.float();
        let mut members = vec![member("a", vec3), member("b", float)];
        let size = assign_offsets(&types, &mut members);
        assert_eq!(members[0].offset, Some(0));
        assert_eq!(members[1].offset, Some(12));
        assert_eq!(size, 16);
    }

    #[test]
    fn float_then_vec3_aligns() {
        let mut types = TypeTable::new();
        let vec3 = types.vector(ScalarKind::Float, 3);
        let float = types.float();
        let vec2 = types.vector(ScalarKind::Float, 2);
        let mut members = vec![member("a", float), member("b", vec3), member("c", vec2)];
        let size = assign_offsets(&types, &mut members);
        assert_eq!(members[1].offset, Some(16));
        assert_eq!(members[2].offset, Some(32));
        assert_eq!(size, 48);
    }

    #[test]
    fn matrix_is_column_array() {
        let mut types = TypeTable::new();
        let mat4 = types.matrix(4, 4);
        assert_eq!(std140(&types, mat4), Some(Layout { size: 64, align: 16 }));
        let mat3 = types.matrix(3, 3);
        assert_eq!(std140(&types, mat3).map(|l| l.size), Some(48));
    }

    #[test]
    fn opaque_types_have_no_layout() {
        let mut types = TypeTable::new();
        let sampler = types.intern(IrType::Sampler);
        assert!(std140(&types, sampler).is_none());
    }
}
