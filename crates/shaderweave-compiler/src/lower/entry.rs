//! Stage globals, `main` and the geometry append helper.

use shaderweave_core::{CompileError, Span};
use shaderweave_ir::{
    ConstValue, Decorations, FuncId, FunctionBuilder, GlobalId, IrModule, IrType, Operand, StorageClass,
    StructMember, TypeId, layout,
};

use crate::compositor::emit_vertex_helper;
use crate::core_types::{ScalarType, ShaderType};
use crate::translator::FunctionKey;

use super::{AtSpan, Declarations, LoweringRun, Result};

impl Declarations<'_, '_> {
    /// Declare the stage variables, uniform block, resources and
    /// specialization constants.
    pub(super) fn declare_interface(&mut self, module: &mut IrModule) -> Result<()> {
        let (ctx, interface) = (self.ctx, self.interface);
        let settings = ctx.settings();
        let span = Span::default();
        let vertex_count = interface
            .geometry
            .as_ref()
            .map(|g| g.input_primitive.vertex_count());

        for input in &interface.inputs {
            let ty = self.ir_type(module, &input.ty, span)?;
            if let Some(global) = &input.global {
                let ty = match vertex_count {
                    Some(length) => module.types.intern(IrType::Array { element: ty, length }),
                    None => ty,
                };
                let decorations = Decorations {
                    location: input.location,
                    ..Default::default()
                };
                let id = module.add_global(global, ty, StorageClass::Input, decorations);
                self.inputs.insert(input.name.clone(), id);
                self.interface_globals.push(id);
            } else if let Some(target) = &input.system_value {
                let id = self.system_value(module, target, ty, StorageClass::Input);
                self.system_inputs.insert(input.name.clone(), id);
            }
        }

        for output in &interface.outputs {
            let ty = self.ir_type(module, &output.ty, span)?;
            if let Some(global) = &output.global {
                let decorations = Decorations {
                    location: output.location,
                    ..Default::default()
                };
                let id = module.add_global(global, ty, StorageClass::Output, decorations);
                self.outputs.insert(output.name.clone(), id);
                self.interface_globals.push(id);
            }
            if let Some(target) = &output.system_value {
                let id = self.system_value(module, target, ty, StorageClass::Output);
                self.system_outputs.insert(output.name.clone(), id);
            }
        }

        if !interface.uniforms.is_empty() {
            let mut members = Vec::with_capacity(interface.uniforms.len());
            for (index, uniform) in interface.uniforms.iter().enumerate() {
                members.push(StructMember {
                    name: uniform.member.clone(),
                    ty: self.ir_type(module, &uniform.ty, span)?,
                    offset: None,
                });
                self.uniform_members.insert(uniform.member.clone(), index as u32);
            }
            layout::assign_offsets(&module.types, &mut members);
            let names = ctx.names();
            let block = module.types.intern(IrType::Struct {
                name: names.uniform_block_type(),
                members,
            });
            let decorations = Decorations {
                binding: Some(settings.layout.block_binding),
                set: Some(settings.layout.set),
                ..Default::default()
            };
            self.material = Some(module.add_global(&names.uniform_block, block, StorageClass::Uniform, decorations));
        }

        for resource in &interface.resources {
            let ty = self.ir_type(module, &resource.ty, span)?;
            let decorations = Decorations {
                binding: Some(resource.binding),
                set: Some(settings.layout.set),
                ..Default::default()
            };
            let id = module.add_global(&resource.global, ty, StorageClass::UniformConstant, decorations);
            self.resources.insert(resource.global.clone(), id);
        }

        for constant in &interface.spec_constants {
            let ty = self.ir_type(module, &constant.ty, span)?;
            let default = spec_default(&constant.ty, constant.default.as_deref());
            let id = module.add_spec_constant(&constant.global, ty, constant.id, default);
            self.spec_constants.insert(constant.global.clone(), id);
        }
        Ok(())
    }

    /// Global for a target system value, shared when read and written.
    fn system_value(&mut self, module: &mut IrModule, target: &str, ty: TypeId, storage: StorageClass) -> GlobalId {
        if let Some(id) = module.find_global(target) {
            return id;
        }
        let decorations = Decorations {
            builtin: Some(target.to_string()),
            ..Default::default()
        };
        let id = module.add_global(target, ty, storage, decorations);
        self.interface_globals.push(id);
        id
    }
}

/// Starting value of a specialization constant.
fn spec_default(ty: &ShaderType, text: Option<&str>) -> ConstValue {
    match ty.scalar() {
        Some(ScalarType::Real) => ConstValue::float(text.and_then(|t| t.parse().ok()).unwrap_or(0.0)),
        Some(ScalarType::Integer) => ConstValue::Int(text.and_then(|t| t.parse().ok()).unwrap_or(0)),
        _ => ConstValue::Bool(text == Some("true")),
    }
}

impl LoweringRun<'_, '_> {
    /// `main`: initialize statics, construct the composite, copy inputs
    /// and uniforms in, run `Main` and copy outputs back.
    pub(super) fn build_entry(&mut self, entry: FuncId, init: FuncId, constructor: FuncId, main: FuncId) -> Result<()> {
        let decls = &mut self.decls;
        let interface = decls.interface;
        let library = decls.library;
        let composite = library
            .find_type(&interface.composite)
            .ok_or_else(|| CompileError::UnknownType {
                name: interface.composite.clone(),
                span: Span::default(),
            })?;
        let span = composite.span;
        let field_index = |name: &str| {
            composite
                .instance_index(name)
                .map(|i| i as i32)
                .ok_or_else(|| CompileError::UnknownSymbol {
                    name: format!("{}.{name}", composite.name),
                    span,
                })
        };

        let mut b = FunctionBuilder::new(&mut self.module, entry).at(span)?;
        b.call(init, Vec::new()).at(span)?;
        let self_ty = decls.struct_type(b.module(), &composite.name, span)?;
        let instance = b.call(constructor, Vec::new()).at(span)?.ok_or_else(|| CompileError::Lowering {
            message: "constructor returned no value".into(),
            span,
        })?;
        let self_ptr = b.variable(self_ty, Some(instance)).at(span)?;

        let is_geometry = interface.geometry.is_some();
        for input in &interface.inputs {
            let source = match (decls.inputs.get(&input.name), decls.system_inputs.get(&input.name)) {
                (Some(&global), _) if !is_geometry => global,
                (None, Some(&global)) => global,
                _ => continue,
            };
            let index = b.const_int(field_index(&input.name)?);
            let target = b.access_chain(self_ptr, vec![index]).at(span)?;
            let value = b.load(Operand::Global(source)).at(span)?;
            b.store(target, value).at(span)?;
        }
        if let Some(material) = decls.material {
            for uniform in interface.uniforms.iter().filter(|u| !u.is_static) {
                let Some(&member) = decls.uniform_members.get(&uniform.member) else {
                    continue;
                };
                let member = b.const_int(member as i32);
                let source = b.access_chain(Operand::Global(material), vec![member]).at(span)?;
                let value = b.load(source).at(span)?;
                let index = b.const_int(field_index(&uniform.member)?);
                let target = b.access_chain(self_ptr, vec![index]).at(span)?;
                b.store(target, value).at(span)?;
            }
        }

        match &interface.geometry {
            Some(geometry) => {
                let count = geometry.input_primitive.vertex_count();
                let input_struct = library.find_type(&geometry.input_struct).ok_or_else(|| CompileError::UnknownType {
                    name: geometry.input_struct.clone(),
                    span,
                })?;
                let element = decls.struct_type(b.module(), &input_struct.name, span)?;
                let array = b.module().types.intern(IrType::Array { element, length: count });
                let vertices = b.variable(array, None).at(span)?;
                for vertex in 0..count {
                    let vertex = b.const_int(vertex as i32);
                    for input in &interface.inputs {
                        let (Some(&global), Some(member)) =
                            (decls.inputs.get(&input.name), input_struct.instance_index(&input.name))
                        else {
                            continue;
                        };
                        let source = b.access_chain(Operand::Global(global), vec![vertex]).at(span)?;
                        let value = b.load(source).at(span)?;
                        let member = b.const_int(member as i32);
                        let target = b.access_chain(vertices, vec![vertex, member]).at(span)?;
                        b.store(target, value).at(span)?;
                    }
                }
                let vertices = b.load(vertices).at(span)?;
                b.call(main, vec![self_ptr, vertices]).at(span)?;
            }
            None => {
                b.call(main, vec![self_ptr]).at(span)?;
                for output in &interface.outputs {
                    let targets = [decls.outputs.get(&output.name), decls.system_outputs.get(&output.name)];
                    if targets.iter().all(Option::is_none) {
                        continue;
                    }
                    let index = b.const_int(field_index(&output.name)?);
                    let source = b.access_chain(self_ptr, vec![index]).at(span)?;
                    let value = b.load(source).at(span)?;
                    for &global in targets.into_iter().flatten() {
                        b.store(Operand::Global(global), value).at(span)?;
                    }
                }
            }
        }
        b.ret().at(span)?;
        b.finish();
        Ok(())
    }

    /// `Append(fragmentOutput, vertexIndex)`: gather the input vertex, run
    /// the composite's `EmitVertexHelper`, write the stage outputs and emit.
    pub(super) fn build_append_helper(&mut self, id: FuncId) -> Result<()> {
        let decls = &mut self.decls;
        let interface = decls.interface;
        let library = decls.library;
        let Some(geometry) = &interface.geometry else {
            return Ok(());
        };
        let span = Span::default();
        let find = |name: &str| {
            library.find_type(name).ok_or_else(|| CompileError::UnknownType {
                name: name.to_string(),
                span,
            })
        };
        let (input_struct, output_struct) = (find(&geometry.input_struct)?, find(&geometry.output_struct)?);

        let mut b = FunctionBuilder::new(&mut self.module, id).at(span)?;
        let input_ty = decls.struct_type(b.module(), &input_struct.name, span)?;
        let output_ty = decls.struct_type(b.module(), &output_struct.name, span)?;
        let helper = decls.function(
            b.module(),
            &FunctionKey::new(&interface.composite, emit_vertex_helper(), 3),
            span,
        )?;

        let input_vertex = b.variable(input_ty, None).at(span)?;
        for input in &interface.inputs {
            let (Some(&global), Some(member)) = (decls.inputs.get(&input.name), input_struct.instance_index(&input.name))
            else {
                continue;
            };
            let source = b.access_chain(Operand::Global(global), vec![Operand::Param(1)]).at(span)?;
            let value = b.load(source).at(span)?;
            let member = b.const_int(member as i32);
            let target = b.access_chain(input_vertex, vec![member]).at(span)?;
            b.store(target, value).at(span)?;
        }
        let composite_output = b.variable(output_ty, None).at(span)?;
        let input_value = b.load(input_vertex).at(span)?;
        b.call(helper, vec![Operand::Param(0), input_value, composite_output]).at(span)?;

        for output in &interface.outputs {
            let targets = [decls.outputs.get(&output.name), decls.system_outputs.get(&output.name)];
            let Some(member) = output_struct.instance_index(&output.name) else {
                continue;
            };
            if targets.iter().all(Option::is_none) {
                continue;
            }
            let member = b.const_int(member as i32);
            let source = b.access_chain(composite_output, vec![member]).at(span)?;
            let value = b.load(source).at(span)?;
            for &global in targets.into_iter().flatten() {
                b.store(Operand::Global(global), value).at(span)?;
            }
        }
        b.intrinsic("EmitVertex", Vec::new(), None).at(span)?;
        b.ret().at(span)?;
        b.finish();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_constant_defaults_parse_literals() {
        assert_eq!(spec_default(&ShaderType::REAL, Some("0.5")), ConstValue::float(0.5));
        assert_eq!(spec_default(&ShaderType::INTEGER, Some("-3")), ConstValue::Int(-3));
        assert_eq!(spec_default(&ShaderType::BOOLEAN, Some("true")), ConstValue::Bool(true));
        assert_eq!(spec_default(&ShaderType::REAL, None), ConstValue::float(0.0));
        assert_eq!(spec_default(&ShaderType::INTEGER, Some("oops")), ConstValue::Int(0));
    }
}
