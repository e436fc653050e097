//! Lowering - Build an IR module for one composed stage.
//!
//! Lowering walks the same functions as the text translator, starting from
//! the composite's constructor and `Main`, and builds each one into an
//! [`IrModule`]. Every local lives in a function-storage variable: reads
//! load through a pointer and writes store through an access chain, so an
//! assignable expression always lowers to a pointer.
//!
//! Module-level state (struct types, declared functions, interface globals
//! and static fields) lives in [`Declarations`], shared by every function
//! body. Functions are declared on first use and their bodies built from a
//! worklist. Static fields become private globals; a dedicated function
//! initializes them, and is rebuilt until lowering it discovers no more
//! statics.

mod entry;
mod expr;
mod stmt;

use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use shaderweave_core::{CompileError, Span};
use shaderweave_ir::{
    BlockId, EntryPoint, FuncId, FunctionBuilder, FunctionParam, GlobalId, IrError, IrModule, IrType,
    Operand, ShaderStage, SpecConstId, StorageClass, StructMember, TypeId,
};

use crate::compositor::StageInterface;
use crate::context::{CompilerContext, LocatedError};
use crate::core_types::ShaderType;
use crate::library::{Field, FragmentLibrary, FragmentType, Function, FunctionBody};
use crate::translator::{FunctionKey, mangle};
use crate::typing::{Scope, Typer};

type Result<T> = std::result::Result<T, CompileError>;

/// Name of the function that initializes static fields.
const INIT_STATICS: &str = "InitStatics";

/// Name of the geometry per-vertex output function.
const APPEND_HELPER: &str = "Append";

/// Name of the stage entry point.
const ENTRY_POINT: &str = "main";

/// Attach a span to builder failures.
trait AtSpan<T> {
    fn at(self, span: Span) -> Result<T>;
}

impl<T> AtSpan<T> for std::result::Result<T, IrError> {
    fn at(self, span: Span) -> Result<T> {
        self.map_err(|error| CompileError::Lowering {
            message: error.to_string(),
            span,
        })
    }
}

/// IR of one stage.
#[derive(Debug, Clone)]
pub struct LoweredStage {
    pub stage: ShaderStage,
    pub module: IrModule,
    pub errors: Vec<LocatedError>,
}

impl LoweredStage {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

// ============================================================================
// Stage lowering
// ============================================================================

/// Lowers composed stages to IR modules.
pub struct StageLowering<'t, 'a> {
    ctx: &'t CompilerContext,
    library: &'t FragmentLibrary<'a>,
}

impl<'t, 'a> StageLowering<'t, 'a> {
    /// `library` must contain the composite of every stage lowered.
    pub fn new(ctx: &'t CompilerContext, library: &'t FragmentLibrary<'a>) -> Self {
        Self { ctx, library }
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn lower(&self, interface: &StageInterface) -> LoweredStage {
        let mut run = LoweringRun {
            decls: Declarations::new(self.ctx, self.library, interface),
            module: IrModule::new(),
            errors: Vec::new(),
            origin: Arc::from(interface.composite.as_str()),
        };
        run.run();
        log::debug!(
            "lowered {} stage '{}': {} functions, {} globals, {} errors",
            interface.stage.as_str(),
            interface.composite,
            run.module.functions.len(),
            run.module.globals.len(),
            run.errors.len()
        );
        LoweredStage {
            stage: interface.stage,
            module: run.module,
            errors: run.errors,
        }
    }
}

/// Find the function a key names.
fn find_function<'t, 'a>(
    library: &'t FragmentLibrary<'a>,
    key: &FunctionKey,
) -> Option<(&'t FragmentType<'a>, &'t Function<'a>)> {
    let owner = library.find_type(&key.owner)?;
    let function = if key.is_constructor() {
        owner.find_constructor(key.arity)
    } else {
        owner.find_function(&key.name, key.arity)
    }?;
    Some((owner, function))
}

fn is_output_stream(ty: &ShaderType) -> bool {
    matches!(ty, ShaderType::Stream(stream) if stream.is_output)
}

// ============================================================================
// Declarations
// ============================================================================

/// Module-level declarations shared by every function body.
pub(super) struct Declarations<'t, 'a> {
    ctx: &'t CompilerContext,
    library: &'t FragmentLibrary<'a>,
    interface: &'t StageInterface,
    structs: FxHashMap<String, TypeId>,
    /// Structs whose members are being interned, to catch nesting cycles.
    building: FxHashSet<String>,
    functions: FxHashMap<FunctionKey, FuncId>,
    queue: VecDeque<FunctionKey>,
    /// Static fields as (owner, field) with their private global.
    statics: Vec<((String, String), GlobalId)>,
    /// Stage variables by composite field name.
    inputs: FxHashMap<String, GlobalId>,
    system_inputs: FxHashMap<String, GlobalId>,
    outputs: FxHashMap<String, GlobalId>,
    system_outputs: FxHashMap<String, GlobalId>,
    /// The uniform block global with the index of each member.
    material: Option<GlobalId>,
    uniform_members: FxHashMap<String, u32>,
    resources: FxHashMap<String, GlobalId>,
    spec_constants: FxHashMap<String, SpecConstId>,
    /// Geometry append helper, with whether its body is built.
    append: Option<(FuncId, bool)>,
    interface_globals: Vec<GlobalId>,
}

impl<'t, 'a> Declarations<'t, 'a> {
    fn new(ctx: &'t CompilerContext, library: &'t FragmentLibrary<'a>, interface: &'t StageInterface) -> Self {
        Self {
            ctx,
            library,
            interface,
            structs: FxHashMap::default(),
            building: FxHashSet::default(),
            functions: FxHashMap::default(),
            queue: VecDeque::new(),
            statics: Vec::new(),
            inputs: FxHashMap::default(),
            system_inputs: FxHashMap::default(),
            outputs: FxHashMap::default(),
            system_outputs: FxHashMap::default(),
            material: None,
            uniform_members: FxHashMap::default(),
            resources: FxHashMap::default(),
            spec_constants: FxHashMap::default(),
            append: None,
            interface_globals: Vec::new(),
        }
    }

    /// Intern the IR form of `ty`, declaring the structs it uses.
    pub(super) fn ir_type(&mut self, module: &mut IrModule, ty: &ShaderType, span: Span) -> Result<TypeId> {
        self.declare_structs(module, ty, span)?;
        let structs = &self.structs;
        ty.to_ir(&mut module.types, &|name| structs.get(name).copied())
            .ok_or_else(|| CompileError::Untranslatable {
                construct: format!("a value of type {ty}"),
                span,
            })
    }

    fn declare_structs(&mut self, module: &mut IrModule, ty: &ShaderType, span: Span) -> Result<()> {
        match ty {
            ShaderType::Struct(name) => self.struct_type(module, name, span).map(|_| ()),
            ShaderType::Array(element, _) => self.declare_structs(module, element, span),
            ShaderType::Stream(stream) => self.declare_structs(module, &stream.element, span),
            _ => Ok(()),
        }
    }

    pub(super) fn struct_type(&mut self, module: &mut IrModule, name: &str, span: Span) -> Result<TypeId> {
        if let Some(&id) = self.structs.get(name) {
            return Ok(id);
        }
        let library = self.library;
        let owner = library.find_type(name).ok_or_else(|| CompileError::UnknownType {
            name: name.to_string(),
            span,
        })?;
        if !self.building.insert(name.to_string()) {
            return Err(CompileError::TypeMismatch {
                message: format!("struct '{name}' contains itself"),
                span,
            });
        }
        let members = self.struct_members(module, owner);
        self.building.remove(name);
        let mut members = members?;
        if members.is_empty() {
            members.push(StructMember {
                name: "Unused".into(),
                ty: module.types.int(),
                offset: None,
            });
        }
        let id = module.types.intern(IrType::Struct {
            name: name.to_string(),
            members,
        });
        self.structs.insert(name.to_string(), id);
        Ok(id)
    }

    fn struct_members(&mut self, module: &mut IrModule, owner: &FragmentType<'_>) -> Result<Vec<StructMember>> {
        owner
            .instance_fields()
            .map(|field| {
                Ok(StructMember {
                    name: field.name.clone(),
                    ty: self.ir_type(module, &field.ty, field.span)?,
                    offset: None,
                })
            })
            .collect()
    }

    /// Declare the function `key` names, queueing its body.
    pub(super) fn function(&mut self, module: &mut IrModule, key: &FunctionKey, span: Span) -> Result<FuncId> {
        if let Some(&id) = self.functions.get(key) {
            return Ok(id);
        }
        let library = self.library;
        let (owner, function) = find_function(library, key).ok_or_else(|| CompileError::UnknownSymbol {
            name: format!("{}.{}", key.owner, key.name),
            span,
        })?;
        let is_constructor = key.is_constructor();

        let mut params = Vec::with_capacity(function.params.len() + 1);
        if !function.is_static() && !is_constructor {
            let self_ty = self.struct_type(module, &owner.name, span)?;
            params.push(FunctionParam {
                name: "self".into(),
                ty: module.types.pointer(StorageClass::Function, self_ty),
            });
        }
        for param in function.params.iter().filter(|p| !is_output_stream(&p.ty)) {
            let ty = self.ir_type(module, &param.ty, param.span)?;
            params.push(FunctionParam {
                name: param.name.clone(),
                ty: if param.is_ref {
                    module.types.pointer(StorageClass::Function, ty)
                } else {
                    ty
                },
            });
        }
        let return_type = if is_constructor {
            ShaderType::Struct(owner.name.clone())
        } else {
            function.return_type.clone()
        };
        let return_type = self.ir_type(module, &return_type, function.span)?;

        // Overloads share a mangled name
        let mut name = mangle(self.ctx, &owner.name, &function.name);
        if module.find_function(&name).is_some() {
            name = format!("{name}{}{}", self.ctx.names().mangle_separator, key.arity);
        }
        let id = module.declare_function(name, return_type, params);
        self.functions.insert(key.clone(), id);
        self.queue.push_back(key.clone());
        Ok(id)
    }

    /// Private global holding static field `owner.field`.
    pub(super) fn static_global(
        &mut self,
        module: &mut IrModule,
        owner: &str,
        field: &str,
        global: &str,
        ty: &ShaderType,
        span: Span,
    ) -> Result<GlobalId> {
        if let Some((_, id)) = self.statics.iter().find(|((o, f), _)| o == owner && f == field) {
            return Ok(*id);
        }
        let ir = self.ir_type(module, ty, span)?;
        let id = module.add_global(global, ir, StorageClass::Private, Default::default());
        self.statics.push(((owner.to_string(), field.to_string()), id));
        Ok(id)
    }

    /// The geometry append helper, declared on first use.
    pub(super) fn append_helper(&mut self, module: &mut IrModule, span: Span) -> Result<FuncId> {
        if let Some((id, _)) = self.append {
            return Ok(id);
        }
        let geometry = self
            .interface
            .geometry
            .as_ref()
            .ok_or_else(|| CompileError::Untranslatable {
                construct: "Append outside a geometry stage".into(),
                span,
            })?;
        let fragment_output = self.struct_type(module, &geometry.fragment_output, span)?;
        let params = vec![
            FunctionParam {
                name: "fragmentOutput".into(),
                ty: fragment_output,
            },
            FunctionParam {
                name: "vertexIndex".into(),
                ty: module.types.int(),
            },
        ];
        let void = module.types.void();
        let id = module.declare_function(
            mangle(self.ctx, &self.interface.composite, APPEND_HELPER),
            void,
            params,
        );
        self.append = Some((id, false));
        Ok(id)
    }
}

// ============================================================================
// Lowering run
// ============================================================================

struct LoweringRun<'t, 'a> {
    decls: Declarations<'t, 'a>,
    module: IrModule,
    errors: Vec<LocatedError>,
    origin: Arc<str>,
}

impl<'t, 'a> LoweringRun<'t, 'a> {
    fn error(&mut self, error: CompileError) {
        self.errors.push(LocatedError::new(&self.origin, error));
    }

    fn run(&mut self) {
        if let Err(error) = self.decls.declare_interface(&mut self.module) {
            self.error(error);
            return;
        }
        let (constructor, main) = match self.seed() {
            Ok(seeds) => seeds,
            Err(error) => {
                self.error(error);
                return;
            }
        };

        let ctx = self.decls.ctx;
        let void = self.module.types.void();
        let init = self.module.declare_function(
            mangle(ctx, &self.decls.interface.composite, INIT_STATICS),
            void,
            Vec::new(),
        );
        let entry = self.module.declare_function(ENTRY_POINT, void, Vec::new());
        if let Err(error) = self.build_entry(entry, init, constructor, main) {
            self.error(error);
        }

        let mut initialized = None;
        loop {
            self.drain();
            if initialized == Some(self.decls.statics.len()) {
                break;
            }
            initialized = Some(self.decls.statics.len());
            self.build_static_init(init);
        }

        self.module.entry_points.push(EntryPoint {
            name: ENTRY_POINT.into(),
            stage: self.decls.interface.stage,
            function: entry,
            interface: self.decls.interface_globals.clone(),
        });
    }

    /// Declare the composite's constructor and `Main`.
    fn seed(&mut self) -> Result<(FuncId, FuncId)> {
        let library = self.decls.library;
        let interface = self.decls.interface;
        let composite = &interface.composite;
        let ty = library.find_type(composite).ok_or_else(|| CompileError::UnknownType {
            name: composite.clone(),
            span: Span::default(),
        })?;
        let main_key = match ty.main_function() {
            Some(function) => FunctionKey::new(composite, &function.name, function.call_arity()),
            None => FunctionKey::new(composite, &self.decls.ctx.names().main_function, 0),
        };
        let constructor = self
            .decls
            .function(&mut self.module, &FunctionKey::constructor(composite, 0), ty.span)?;
        let main = self.decls.function(&mut self.module, &main_key, ty.span)?;
        Ok((constructor, main))
    }

    /// Build queued bodies until nothing new is declared.
    fn drain(&mut self) {
        loop {
            if let Some(key) = self.decls.queue.pop_front() {
                self.lower_function(&key);
                continue;
            }
            match self.decls.append {
                Some((id, false)) => {
                    self.decls.append = Some((id, true));
                    if let Err(error) = self.build_append_helper(id) {
                        self.error(error);
                    }
                }
                _ => break,
            }
        }
    }

    fn lower_function(&mut self, key: &FunctionKey) {
        let library = self.decls.library;
        let Some((owner, function)) = find_function(library, key) else {
            return;
        };
        let Some(&id) = self.decls.functions.get(key) else {
            return;
        };
        let builder = match FunctionBuilder::new(&mut self.module, id).at(function.span) {
            Ok(builder) => builder,
            Err(error) => {
                self.errors.push(LocatedError::new(&owner.origin, error));
                return;
            }
        };
        let mut body = BodyLowerer::new(&mut self.decls, builder, owner);
        if let Err(error) = body.function(function, key.is_constructor()) {
            body.error(error);
        }
        let errors = body.finish();
        self.errors.extend(errors);
    }

    /// Rebuild the static initializer over every static found so far.
    fn build_static_init(&mut self, id: FuncId) {
        let library = self.decls.library;
        let interface = self.decls.interface;
        let statics = self.decls.statics.clone();
        let Some(composite) = library.find_type(&interface.composite) else {
            return;
        };
        let builder = match FunctionBuilder::new(&mut self.module, id).at(composite.span) {
            Ok(builder) => builder,
            Err(error) => {
                self.error(error);
                return;
            }
        };
        let mut body = BodyLowerer::new(&mut self.decls, builder, composite);
        for ((owner_name, field_name), global) in statics {
            let Some(owner) = library.find_type(&owner_name) else {
                continue;
            };
            let Some(field) = owner.find_field(&field_name) else {
                continue;
            };
            body.set_owner(owner);
            if let Err(error) = body.init_static(field, global) {
                body.error(error);
            }
        }
        if let Err(error) = body.b.ret().at(composite.span) {
            body.error(error);
        }
        let errors = body.finish();
        self.errors.extend(errors);
    }
}

// ============================================================================
// Function bodies
// ============================================================================

/// How a local is stored.
#[derive(Debug, Clone, Copy)]
pub(super) enum Local {
    /// Function-storage variable or by-reference parameter.
    Pointer(Operand),
    /// Geometry output stream, which has no storage.
    Stream,
}

#[derive(Debug, Clone, Copy)]
struct LoopTargets {
    merge: BlockId,
    continue_target: BlockId,
}

/// Builds the body of one function.
pub(super) struct BodyLowerer<'b, 't, 'a> {
    ctx: &'t CompilerContext,
    library: &'t FragmentLibrary<'a>,
    typer: Typer<'t, 'a>,
    decls: &'b mut Declarations<'t, 'a>,
    b: FunctionBuilder<'b>,
    origin: Arc<str>,
    scope: Scope<Local>,
    self_ptr: Option<Operand>,
    loops: Vec<LoopTargets>,
    return_type: ShaderType,
    in_constructor: bool,
    errors: Vec<LocatedError>,
}

impl<'b, 't, 'a> BodyLowerer<'b, 't, 'a> {
    fn new(decls: &'b mut Declarations<'t, 'a>, b: FunctionBuilder<'b>, owner: &'t FragmentType<'a>) -> Self {
        let (ctx, library) = (decls.ctx, decls.library);
        Self {
            ctx,
            library,
            typer: Typer::new(ctx, library, Some(owner)),
            decls,
            b,
            origin: owner.origin.clone(),
            scope: Scope::new(),
            self_ptr: None,
            loops: Vec::new(),
            return_type: ShaderType::Void,
            in_constructor: false,
            errors: Vec::new(),
        }
    }

    fn set_owner(&mut self, owner: &'t FragmentType<'a>) {
        self.typer = Typer::new(self.ctx, self.library, Some(owner));
        self.origin = owner.origin.clone();
    }

    fn error(&mut self, error: CompileError) {
        self.errors.push(LocatedError::new(&self.origin, error));
    }

    fn finish(self) -> Vec<LocatedError> {
        self.b.finish();
        self.errors
    }

    fn ir_type(&mut self, ty: &ShaderType, span: Span) -> Result<TypeId> {
        self.decls.ir_type(self.b.module(), ty, span)
    }

    fn this_pointer(&self, span: Span) -> Result<Operand> {
        self.self_ptr.ok_or_else(|| CompileError::UnknownSymbol {
            name: "this".into(),
            span,
        })
    }

    fn owner_name(&self) -> Option<String> {
        self.typer.owner().map(|owner| owner.name.clone())
    }

    /// Lower a whole function: parameters, constructor prologue and body.
    fn function(&mut self, function: &Function<'_>, is_constructor: bool) -> Result<()> {
        let span = function.span;
        let owner = self.owner_name().ok_or_else(|| CompileError::UnknownSymbol {
            name: function.name.clone(),
            span,
        })?;
        self.in_constructor = is_constructor;
        self.return_type = if is_constructor {
            ShaderType::Struct(owner.clone())
        } else {
            function.return_type.clone()
        };

        let mut index = 0;
        if !function.is_static() && !is_constructor {
            self.self_ptr = Some(Operand::Param(0));
            index = 1;
        }
        if is_constructor {
            let ty = self.decls.struct_type(self.b.module(), &owner, span)?;
            self.self_ptr = Some(self.b.variable(ty, None).at(span)?);
        }
        for param in &function.params {
            if is_output_stream(&param.ty) {
                self.scope.declare(&param.name, param.ty.clone(), Local::Stream);
                continue;
            }
            let pointer = if param.is_ref {
                Operand::Param(index)
            } else {
                let ty = self.ir_type(&param.ty, param.span)?;
                self.b.variable(ty, Some(Operand::Param(index))).at(param.span)?
            };
            self.scope.declare(&param.name, param.ty.clone(), Local::Pointer(pointer));
            index += 1;
        }

        if is_constructor {
            self.constructor_prologue(span)?;
        }
        if let FunctionBody::Block(block) = function.body {
            self.block(block.stmts);
        }
        if !self.b.is_terminated() {
            self.implicit_return(span)?;
        }
        Ok(())
    }

    /// Initialize every instance field from its default value.
    fn constructor_prologue(&mut self, span: Span) -> Result<()> {
        let Some(owner) = self.typer.owner() else {
            return Ok(());
        };
        let self_ptr = self.this_pointer(span)?;
        for (index, field) in owner.instance_fields().enumerate() {
            let value = match field.default {
                Some(default) => self.rvalue_as(default, &field.ty),
                None => self.default_value(&field.ty, field.span),
            };
            let stored = value.and_then(|value| {
                let index = self.b.const_int(index as i32);
                let pointer = self.b.access_chain(self_ptr, vec![index]).at(field.span)?;
                self.b.store(pointer, value).at(field.span)
            });
            if let Err(error) = stored {
                self.error(error);
            }
        }
        Ok(())
    }

    fn implicit_return(&mut self, span: Span) -> Result<()> {
        if self.in_constructor {
            let self_ptr = self.this_pointer(span)?;
            let value = self.b.load(self_ptr).at(span)?;
            return self.b.ret_value(value).at(span);
        }
        if self.return_type.is_void() {
            return self.b.ret().at(span);
        }
        let return_type = self.return_type.clone();
        let value = self.default_value(&return_type, span)?;
        self.b.ret_value(value).at(span)
    }

    /// Store the initial value of a static field into its global.
    fn init_static(&mut self, field: &Field<'_>, global: GlobalId) -> Result<()> {
        let value = match field.default {
            Some(default) => self.rvalue_as(default, &field.ty)?,
            None => self.default_value(&field.ty, field.span)?,
        };
        self.b.store(Operand::Global(global), value).at(field.span)
    }
}

#[cfg(test)]
mod tests;
