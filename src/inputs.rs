//! Shader input blocks.
//!
//! [`ShaderInputs`] holds one zeroed byte block per uniform buffer of every
//! compiled stage, sized from the stage's final reflection. Properties are
//! set by the fragment and property name they were declared with; the
//! simplified reflection finds where the passes left them.

use shaderweave_ir::ShaderStage;
use thiserror::Error;

use crate::artifact::CompiledShader;

/// A value written into a uniform block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShaderValue {
    Boolean(bool),
    Integer(i32),
    Integer2([i32; 2]),
    Integer3([i32; 3]),
    Integer4([i32; 4]),
    Real(f32),
    Real2([f32; 2]),
    Real3([f32; 3]),
    Real4([f32; 4]),
    /// Column-major.
    Real3x3([[f32; 3]; 3]),
    /// Column-major.
    Real4x4([[f32; 4]; 4]),
}

impl ShaderValue {
    /// std140 bytes of the value. Booleans take four bytes and matrix
    /// columns are padded to sixteen.
    pub fn to_bytes(&self) -> Vec<u8> {
        fn words<T: Copy>(values: &[T], to: fn(T) -> [u8; 4]) -> Vec<u8> {
            values.iter().flat_map(|&v| to(v)).collect()
        }
        match self {
            ShaderValue::Boolean(value) => u32::from(*value).to_le_bytes().to_vec(),
            ShaderValue::Integer(value) => value.to_le_bytes().to_vec(),
            ShaderValue::Integer2(values) => words(values.as_slice(), i32::to_le_bytes),
            ShaderValue::Integer3(values) => words(values.as_slice(), i32::to_le_bytes),
            ShaderValue::Integer4(values) => words(values.as_slice(), i32::to_le_bytes),
            ShaderValue::Real(value) => value.to_le_bytes().to_vec(),
            ShaderValue::Real2(values) => words(values.as_slice(), f32::to_le_bytes),
            ShaderValue::Real3(values) => words(values.as_slice(), f32::to_le_bytes),
            ShaderValue::Real4(values) => words(values.as_slice(), f32::to_le_bytes),
            ShaderValue::Real3x3(columns) => columns
                .iter()
                .flat_map(|column| {
                    let mut bytes = words(column.as_slice(), f32::to_le_bytes);
                    bytes.resize(16, 0);
                    bytes
                })
                .collect(),
            ShaderValue::Real4x4(columns) => columns
                .iter()
                .flat_map(|column| words(column.as_slice(), f32::to_le_bytes))
                .collect(),
        }
    }
}

impl From<bool> for ShaderValue {
    fn from(value: bool) -> Self {
        ShaderValue::Boolean(value)
    }
}

impl From<i32> for ShaderValue {
    fn from(value: i32) -> Self {
        ShaderValue::Integer(value)
    }
}

impl From<f32> for ShaderValue {
    fn from(value: f32) -> Self {
        ShaderValue::Real(value)
    }
}

impl From<[f32; 2]> for ShaderValue {
    fn from(value: [f32; 2]) -> Self {
        ShaderValue::Real2(value)
    }
}

impl From<[f32; 3]> for ShaderValue {
    fn from(value: [f32; 3]) -> Self {
        ShaderValue::Real3(value)
    }
}

impl From<[f32; 4]> for ShaderValue {
    fn from(value: [f32; 4]) -> Self {
        ShaderValue::Real4(value)
    }
}

impl From<[[f32; 4]; 4]> for ShaderValue {
    fn from(value: [[f32; 4]; 4]) -> Self {
        ShaderValue::Real4x4(value)
    }
}

/// Errors setting a shader input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// No compiled stage still has the property; it was never declared or
    /// a pass removed it.
    #[error("property '{fragment}.{property}' is not present in the compiled shader")]
    NotPresent { fragment: String, property: String },

    /// The value's size does not match the member's.
    #[error("property '{fragment}.{property}' takes {expected} bytes, got {found}")]
    SizeMismatch {
        fragment: String,
        property: String,
        expected: u32,
        found: usize,
    },
}

/// One uniform buffer's bytes for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputBlock {
    pub stage: ShaderStage,
    pub buffer: String,
    pub set: u32,
    pub binding: u32,
    pub bytes: Vec<u8>,
}

/// Uniform blocks of a compiled shader, written by property name.
#[derive(Debug, Clone)]
pub struct ShaderInputs<'s> {
    shader: &'s CompiledShader,
    blocks: Vec<InputBlock>,
}

impl<'s> ShaderInputs<'s> {
    /// Zeroed blocks for every uniform buffer of every compiled stage.
    pub fn new(shader: &'s CompiledShader) -> Self {
        let blocks = shader
            .artifacts()
            .flat_map(|artifact| {
                artifact
                    .reflection
                    .reflection()
                    .uniform_buffers
                    .iter()
                    .map(move |buffer| InputBlock {
                        stage: artifact.stage,
                        buffer: buffer.name.clone(),
                        set: buffer.set,
                        binding: buffer.binding,
                        bytes: vec![0; buffer.size as usize],
                    })
            })
            .collect();
        Self { shader, blocks }
    }

    /// Write `value` wherever `fragment.property` ended up, returning the
    /// number of stages written.
    pub fn set(
        &mut self,
        fragment: &str,
        property: &str,
        value: impl Into<ShaderValue>,
    ) -> Result<usize, InputError> {
        let bytes = value.into().to_bytes();
        let mut written = 0;
        for artifact in self.shader.artifacts() {
            let Some((buffer, member)) = artifact.reflection.find_uniform(fragment, property) else {
                continue;
            };
            let start = member.offset as usize;
            let end = start + bytes.len();
            let block = self
                .blocks
                .iter_mut()
                .find(|b| b.stage == artifact.stage && b.buffer == buffer.name);
            let Some(block) = block.filter(|b| member.size as usize == bytes.len() && end <= b.bytes.len()) else {
                return Err(InputError::SizeMismatch {
                    fragment: fragment.to_string(),
                    property: property.to_string(),
                    expected: member.size,
                    found: bytes.len(),
                });
            };
            block.bytes[start..end].copy_from_slice(&bytes);
            written += 1;
        }
        if written == 0 {
            return Err(InputError::NotPresent {
                fragment: fragment.to_string(),
                property: property.to_string(),
            });
        }
        Ok(written)
    }

    pub fn blocks(&self) -> &[InputBlock] {
        &self.blocks
    }

    /// The blocks of one stage.
    pub fn stage_blocks(&self, stage: ShaderStage) -> impl Iterator<Item = &InputBlock> {
        self.blocks.iter().filter(move |b| b.stage == stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std140_bytes() {
        assert_eq!(ShaderValue::Boolean(true).to_bytes(), vec![1, 0, 0, 0]);
        assert_eq!(ShaderValue::Real(1.0).to_bytes(), 1.0f32.to_le_bytes().to_vec());
        assert_eq!(ShaderValue::Real3([1.0, 2.0, 3.0]).to_bytes().len(), 12);

        let identity = ShaderValue::Real3x3([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
        let bytes = identity.to_bytes();
        assert_eq!(bytes.len(), 48);
        assert_eq!(&bytes[20..24], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[12..16], &[0, 0, 0, 0]);
    }

    #[test]
    fn conversions() {
        assert_eq!(ShaderValue::from(2), ShaderValue::Integer(2));
        assert_eq!(ShaderValue::from([0.5f32, 1.0]), ShaderValue::Real2([0.5, 1.0]));
        assert_eq!(ShaderValue::from(false), ShaderValue::Boolean(false));
    }
}
