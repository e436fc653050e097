//! Translator - Emit target-language text for one composed stage.
//!
//! Translation starts at the composite's `Main` and walks every function
//! it can reach. Each function is translated on its own into a buffer,
//! recording the functions, value types and static fields it uses; those
//! are queued in turn. Once the queue drains, the collected pieces are
//! assembled in the topological order of the type dependency graph,
//! followed by the entry point.
//!
//! ## Layout of the output
//!
//! 1. Version line
//! 2. Struct declarations
//! 3. Stage variables, the uniform block, resources, specialization and
//!    static globals
//! 4. Function prototypes
//! 5. Function bodies
//! 6. `main()`

mod entry;
mod expr;
mod resolver;
mod stmt;

pub use resolver::{Resolver, ResolverFn, ResolverRegistry, SymbolKey};

use std::collections::VecDeque;
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::{FxHashMap, FxHashSet};
use shaderweave_core::CompileError;
use shaderweave_ir::ShaderStage;

use crate::code_builder::{RangeMapping, ShaderCodeBuilder};
use crate::compositor::{StageInterface, emit_vertex_helper};
use crate::context::{CompilerContext, LocatedError};
use crate::core_types::{ShaderType, resolve_type};
use crate::library::{FragmentLibrary, FragmentType, Function, FunctionBody, FunctionFlags};
use crate::passes::CONSTRUCTOR_NAME;
use crate::typing::{Scope, Typer};

type Result<T> = std::result::Result<T, CompileError>;

/// Name of the per-vertex output helper written for geometry stages.
const APPEND_HELPER: &str = "Append";

/// Identifiers the target reserves that fragment code may use as names.
const RESERVED: &[&str] = &[
    "input", "output", "in", "out", "inout", "uniform", "buffer", "shared", "layout", "flat",
    "smooth", "centroid", "sample", "patch", "texture", "filter", "common", "partition",
    "active", "precision", "main", "not", "and", "or", "xor", "attribute", "varying", "self",
];

/// Name a fragment-language local is emitted under.
pub(crate) fn local_name(name: &str) -> String {
    if RESERVED.contains(&name) || name.starts_with("gl_") {
        format!("{name}_")
    } else {
        name.to_string()
    }
}

/// Translated text of one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedStage {
    pub stage: ShaderStage,
    pub text: String,
    /// Source ranges of every translated function, statement and
    /// expression.
    pub mappings: Vec<RangeMapping>,
    pub errors: Vec<LocatedError>,
}

impl TranslatedStage {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

// ============================================================================
// Work items
// ============================================================================

/// A function the output needs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct FunctionKey {
    pub owner: String,
    pub name: String,
    /// Argument count as written by callers.
    pub arity: usize,
}

impl FunctionKey {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, arity: usize) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            arity,
        }
    }

    pub fn constructor(owner: impl Into<String>, arity: usize) -> Self {
        Self::new(owner, CONSTRUCTOR_NAME, arity)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }
}

/// What a translated piece of code refers to.
#[derive(Debug, Clone, Default)]
pub(crate) struct Dependencies {
    pub functions: Vec<FunctionKey>,
    /// Structs used as values.
    pub types: Vec<String>,
    /// Static fields read as private globals, as (owner, field).
    pub statics: Vec<(String, String)>,
}

impl Dependencies {
    pub fn use_type(&mut self, ty: &ShaderType) {
        match ty {
            ShaderType::Struct(name) => {
                if !self.types.contains(name) {
                    self.types.push(name.clone());
                }
            }
            ShaderType::Array(element, _) => self.use_type(element),
            ShaderType::Stream(stream) => self.use_type(&stream.element),
            _ => {}
        }
    }

    pub fn use_function(&mut self, key: FunctionKey) {
        if !self.functions.contains(&key) {
            self.functions.push(key);
        }
    }

    pub fn use_static(&mut self, owner: &str, field: &str) {
        let entry = (owner.to_string(), field.to_string());
        if !self.statics.contains(&entry) {
            self.statics.push(entry);
        }
    }
}

/// One translated function.
#[derive(Debug)]
struct FunctionOutput {
    owner: String,
    prototype: String,
    body: String,
    mappings: Vec<RangeMapping>,
}

/// One static field global with its initializer.
#[derive(Debug)]
struct StaticOutput {
    declaration: String,
    init: Option<(String, Vec<RangeMapping>)>,
}

/// Stage facts the function translator needs.
#[derive(Debug, Clone)]
pub(crate) struct StageContext {
    pub composite: String,
    /// Mangled name of the geometry append helper.
    pub append_helper: Option<String>,
}

// ============================================================================
// Stage translator
// ============================================================================

/// Translates composed stages to text.
pub struct StageTranslator<'t, 'a> {
    ctx: &'t CompilerContext,
    library: &'t FragmentLibrary<'a>,
}

impl<'t, 'a> StageTranslator<'t, 'a> {
    /// `library` must contain the composite of every stage translated.
    pub fn new(ctx: &'t CompilerContext, library: &'t FragmentLibrary<'a>) -> Self {
        Self { ctx, library }
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn translate(&self, interface: &StageInterface) -> TranslatedStage {
        let mut run = TranslationRun::new(self.ctx, self.library, interface);
        run.run();
        let translated = run.assemble();
        log::debug!(
            "translated {} stage '{}': {} bytes, {} errors",
            interface.stage.as_str(),
            interface.composite,
            translated.text.len(),
            translated.errors.len()
        );
        translated
    }
}

struct TranslationRun<'t, 'a> {
    ctx: &'t CompilerContext,
    library: &'t FragmentLibrary<'a>,
    interface: &'t StageInterface,
    stage: StageContext,
    queue: VecDeque<FunctionKey>,
    queued: FxHashSet<FunctionKey>,
    functions: Vec<FunctionOutput>,
    statics: Vec<((String, String), StaticOutput)>,
    /// Every type in discovery order, whether used as a value or only as
    /// a function owner.
    types: Vec<String>,
    value_types: FxHashSet<String>,
    /// (dependency, dependent) pairs.
    edges: Vec<(String, String)>,
    errors: Vec<LocatedError>,
}

impl<'t, 'a> TranslationRun<'t, 'a> {
    fn new(ctx: &'t CompilerContext, library: &'t FragmentLibrary<'a>, interface: &'t StageInterface) -> Self {
        let names = ctx.names();
        let append_helper = interface
            .geometry
            .as_ref()
            .map(|_| mangle(ctx, &interface.composite, APPEND_HELPER));
        Self {
            ctx,
            library,
            interface,
            stage: StageContext {
                composite: interface.composite.clone(),
                append_helper,
            },
            queue: VecDeque::new(),
            queued: FxHashSet::default(),
            functions: Vec::new(),
            statics: Vec::new(),
            types: Vec::new(),
            value_types: FxHashSet::default(),
            edges: Vec::new(),
            errors: Vec::new(),
        }
        .seeded(names.main_function.clone())
    }

    fn seeded(mut self, main: String) -> Self {
        let library = self.library;
        let interface = self.interface;
        let composite = interface.composite.clone();
        let Some(ty) = library.find_type(&composite) else {
            self.errors.push(LocatedError::new(
                &Arc::from(composite.as_str()),
                CompileError::UnknownType {
                    name: composite.clone(),
                    span: Default::default(),
                },
            ));
            return self;
        };
        self.add_value_type(&composite);
        self.enqueue(FunctionKey::constructor(&composite, 0));
        match ty.main_function() {
            Some(function) => self.enqueue(FunctionKey::new(&composite, &function.name, function.call_arity())),
            None => self.enqueue(FunctionKey::new(&composite, main, 0)),
        }
        if interface.geometry.is_some() {
            self.enqueue(FunctionKey::new(&composite, emit_vertex_helper(), 3));
        }
        for uniform in &interface.uniforms {
            self.note_type(&uniform.ty, &composite);
        }
        self
    }

    fn enqueue(&mut self, key: FunctionKey) {
        if self.queued.insert(key.clone()) {
            self.queue.push_back(key);
        }
    }

    fn add_type(&mut self, name: &str) {
        if !self.types.iter().any(|t| t == name) {
            self.types.push(name.to_string());
        }
    }

    /// Record `name` as a struct the output declares, along with the types
    /// of its instance fields.
    fn add_value_type(&mut self, name: &str) {
        self.add_type(name);
        if !self.value_types.insert(name.to_string()) {
            return;
        }
        let Some(ty) = self.library.find_type(name) else {
            return;
        };
        let field_types: Vec<ShaderType> = ty.instance_fields().map(|f| f.ty.clone()).collect();
        for field_ty in field_types {
            self.note_type(&field_ty, name);
        }
    }

    /// `dependent` needs the struct behind `ty` declared first.
    fn note_type(&mut self, ty: &ShaderType, dependent: &str) {
        let mut deps = Dependencies::default();
        deps.use_type(ty);
        for name in deps.types {
            if self.library.contains_type(&name) {
                self.add_value_type(&name);
                if name != dependent {
                    self.edges.push((name, dependent.to_string()));
                }
            }
        }
    }

    fn run(&mut self) {
        while let Some(key) = self.queue.pop_front() {
            let library = self.library;
            let Some(owner) = library.find_type(&key.owner) else {
                continue;
            };
            let function = if key.is_constructor() {
                owner.find_constructor(key.arity)
            } else {
                owner.find_function(&key.name, key.arity)
            };
            let Some(function) = function else {
                self.errors.push(LocatedError::new(
                    &owner.origin,
                    CompileError::UnknownSymbol {
                        name: format!("{}.{}", key.owner, key.name),
                        span: owner.span,
                    },
                ));
                continue;
            };
            if function.flags.contains(FunctionFlags::UNIT_TEST) {
                continue;
            }
            self.add_type(&owner.name);
            let (output, deps, errors) = self.translate_function(owner, function, &key);
            self.errors
                .extend(errors.into_iter().map(|e| LocatedError::new(&owner.origin, e)));
            self.functions.push(output);
            self.absorb(&owner.name, deps);
        }
    }

    /// Queue everything a translated piece of `dependent` refers to.
    fn absorb(&mut self, dependent: &str, deps: Dependencies) {
        for name in &deps.types {
            self.note_type(&ShaderType::Struct(name.clone()), dependent);
        }
        for key in deps.functions {
            if key.owner != dependent {
                self.add_type(&key.owner);
                self.edges.push((key.owner.clone(), dependent.to_string()));
            }
            self.enqueue(key);
        }
        for (owner, field) in deps.statics {
            if self.statics.iter().any(|((o, f), _)| *o == owner && *f == field) {
                continue;
            }
            self.translate_static(&owner, &field);
        }
    }

    fn translate_function(
        &self,
        owner: &'t FragmentType<'a>,
        function: &'t Function<'a>,
        key: &FunctionKey,
    ) -> (FunctionOutput, Dependencies, Vec<CompileError>) {
        let mut translator = FunctionTranslator::new(self.ctx, self.library, Some(owner), self.stage.clone());
        let name = mangle(self.ctx, &owner.name, &function.name);
        let is_constructor = key.is_constructor();
        translator.in_constructor = is_constructor;

        // Signature
        let mut params = Vec::new();
        if !function.is_static() && !is_constructor {
            params.push(format!("inout {} self", self.ctx.resolvers().type_name(&ShaderType::Struct(owner.name.clone()))));
            translator.deps.use_type(&ShaderType::Struct(owner.name.clone()));
        }
        for param in &function.params {
            let local = local_name(&param.name);
            translator.scope.declare(&param.name, param.ty.clone(), local.clone());
            if let ShaderType::Stream(stream) = &param.ty {
                if stream.is_output {
                    continue;
                }
            }
            translator.deps.use_type(&param.ty);
            let declaration = self.ctx.resolvers().declare(&param.ty, &local);
            params.push(if param.is_ref {
                format!("inout {declaration}")
            } else {
                declaration
            });
        }
        let return_type = if is_constructor {
            ShaderType::Struct(owner.name.clone())
        } else {
            function.return_type.clone()
        };
        translator.deps.use_type(&return_type);
        let prototype = format!(
            "{} {name}({})",
            self.ctx.resolvers().type_name(&return_type),
            params.join(", ")
        );

        // Body
        translator.out.push_mapping(&owner.origin, function.span);
        translator.out.line(&prototype);
        translator.out.begin_scope();
        if is_constructor {
            translator.constructor_prologue(owner);
        }
        if let FunctionBody::Block(block) = function.body {
            for stmt in block.stmts {
                translator.stmt(stmt);
            }
        }
        if is_constructor {
            translator.out.line("return self;");
        }
        translator.out.end_scope();
        translator.out.pop_mapping();

        let (body, mappings) = translator.out.finish();
        (
            FunctionOutput {
                owner: owner.name.clone(),
                prototype: format!("{prototype};"),
                body,
                mappings,
            },
            translator.deps,
            translator.errors,
        )
    }

    /// Declare and initialize a static field read as a private global.
    fn translate_static(&mut self, owner_name: &str, field_name: &str) {
        let library = self.library;
        let key = (owner_name.to_string(), field_name.to_string());
        let Some(owner) = library.find_type(owner_name) else {
            return;
        };
        let Some(field) = owner.find_field(field_name) else {
            return;
        };
        let global = self.ctx.names().mangle_property(owner_name, field_name);
        let declaration = format!("{};", self.ctx.resolvers().declare(&field.ty, &global));

        let mut translator = FunctionTranslator::new(self.ctx, library, Some(owner), self.stage.clone());
        let init = match field.default {
            Some(default) => match translator.expr(default) {
                Ok(value) => {
                    let mut out = ShaderCodeBuilder::new();
                    out.push_mapping(&owner.origin, field.span);
                    out.write(&format!("{global} = "));
                    out.append_mapped(&value.text, &value.mappings);
                    out.write(";\n");
                    out.pop_mapping();
                    Some(out.finish())
                }
                Err(error) => {
                    translator.errors.push(error);
                    None
                }
            },
            None => translator
                .default_value(&field.ty)
                .map(|value| (format!("{global} = {value};\n"), Vec::new())),
        };
        let deps = std::mem::take(&mut translator.deps);
        let errors = std::mem::take(&mut translator.errors);
        self.errors
            .extend(errors.into_iter().map(|e| LocatedError::new(&owner.origin, e)));
        self.note_type(&field.ty, owner_name);
        self.statics.push((key, StaticOutput { declaration, init }));
        self.absorb(owner_name, deps);
    }

    /// Types in dependency order: the full graph when it is acyclic, else
    /// struct nesting alone, else discovery order.
    fn type_order(&self) -> Vec<String> {
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let nodes: FxHashMap<&str, NodeIndex> = self
            .types
            .iter()
            .map(|t| (t.as_str(), graph.add_node(t.as_str())))
            .collect();
        let add_edges = |graph: &mut DiGraph<&str, ()>, struct_only: bool| {
            for (from, to) in &self.edges {
                if struct_only && !self.is_struct_edge(from, to) {
                    continue;
                }
                if let (Some(&a), Some(&b)) = (nodes.get(from.as_str()), nodes.get(to.as_str())) {
                    graph.update_edge(a, b, ());
                }
            }
        };
        add_edges(&mut graph, false);
        if let Ok(order) = toposort(&graph, None) {
            return order.into_iter().map(|n| graph[n].to_string()).collect();
        }
        graph.clear_edges();
        add_edges(&mut graph, true);
        match toposort(&graph, None) {
            Ok(order) => order.into_iter().map(|n| graph[n].to_string()).collect(),
            Err(_) => {
                log::warn!("cyclic struct nesting in '{}'", self.interface.composite);
                self.types.clone()
            }
        }
    }

    fn is_struct_edge(&self, from: &str, to: &str) -> bool {
        self.library.find_type(to).is_some_and(|t| {
            t.instance_fields().any(|f| {
                let mut deps = Dependencies::default();
                deps.use_type(&f.ty);
                deps.types.iter().any(|n| n == from)
            })
        })
    }

    fn assemble(self) -> TranslatedStage {
        let resolvers = self.ctx.resolvers();
        let order = self.type_order();
        let mut out = ShaderCodeBuilder::new();
        out.line(&format!("#version {}", self.ctx.settings().language.version));
        out.newline();

        for name in order.iter().filter(|n| self.value_types.contains(*n)) {
            let Some(ty) = self.library.find_type(name) else {
                continue;
            };
            out.line(&format!("struct {}", resolvers.type_name(&ShaderType::Struct(name.clone()))));
            out.begin_scope();
            let mut any = false;
            for field in ty.instance_fields() {
                out.line(&format!("{};", resolvers.declare(&field.ty, &field.name)));
                any = true;
            }
            if !any {
                out.line("int Unused;");
            }
            out.end_scope_with(";");
            out.newline();
        }

        let entry = entry::EntryWriter::new(self.ctx, self.interface, &self.stage);
        entry.write_globals(&mut out);
        for (_, output) in &self.statics {
            out.line(&output.declaration);
        }
        out.newline();

        for name in &order {
            for function in self.functions.iter().filter(|f| f.owner == *name) {
                out.line(&function.prototype);
            }
        }
        if let Some(prototype) = entry.append_prototype() {
            out.line(&format!("{prototype};"));
        }
        out.newline();

        for name in &order {
            for function in self.functions.iter().filter(|f| f.owner == *name) {
                out.append_mapped(&function.body, &function.mappings);
                out.newline();
            }
        }
        entry.write_append_helper(&mut out);

        let inits: Vec<&(String, Vec<RangeMapping>)> =
            self.statics.iter().filter_map(|(_, s)| s.init.as_ref()).collect();
        entry.write_main(&mut out, &inits);

        let (text, mappings) = out.finish();
        TranslatedStage {
            stage: self.interface.stage,
            text,
            mappings,
            errors: self.errors,
        }
    }
}

/// `Owner_Name`.
pub(crate) fn mangle(ctx: &CompilerContext, owner: &str, name: &str) -> String {
    format!("{owner}{}{name}", ctx.names().mangle_separator)
}

// ============================================================================
// Function translator
// ============================================================================

/// Translates the body of one function.
pub(crate) struct FunctionTranslator<'t, 'a> {
    ctx: &'t CompilerContext,
    library: &'t FragmentLibrary<'a>,
    typer: Typer<'t, 'a>,
    stage: StageContext,
    origin: Arc<str>,
    /// Locals by source name, holding their emitted name.
    scope: Scope<String>,
    out: ShaderCodeBuilder,
    errors: Vec<CompileError>,
    deps: Dependencies,
    in_constructor: bool,
}

impl<'t, 'a> FunctionTranslator<'t, 'a> {
    fn new(
        ctx: &'t CompilerContext,
        library: &'t FragmentLibrary<'a>,
        owner: Option<&'t FragmentType<'a>>,
        stage: StageContext,
    ) -> Self {
        let origin = owner
            .map(|o| o.origin.clone())
            .unwrap_or_else(|| Arc::from(stage.composite.as_str()));
        Self {
            ctx,
            library,
            typer: Typer::new(ctx, library, owner),
            stage,
            origin,
            scope: Scope::new(),
            out: ShaderCodeBuilder::new(),
            errors: Vec::new(),
            deps: Dependencies::default(),
            in_constructor: false,
        }
    }

    /// Field initialization at the top of a constructor.
    fn constructor_prologue(&mut self, owner: &FragmentType<'a>) {
        let resolvers = self.ctx.resolvers();
        let self_type = ShaderType::Struct(owner.name.clone());
        self.out.line(&format!("{};", resolvers.declare(&self_type, "self")));
        for field in owner.instance_fields() {
            self.out.push_mapping(&self.origin, field.span);
            let value = match field.default {
                Some(default) => match self.expr(default) {
                    Ok(value) => Some(value),
                    Err(error) => {
                        self.errors.push(error);
                        None
                    }
                },
                None => self.default_value(&field.ty).map(expr::ExprText::atom),
            };
            if let Some(value) = value {
                self.out.write_indent().write(&format!("self.{} = ", field.name));
                self.out.append_mapped(&value.text, &value.mappings);
                self.out.write(";\n");
            }
            self.out.pop_mapping();
        }
    }

    /// Resolve a written type against the library.
    fn resolve(&self, expr: &shaderweave_parser::ast::TypeExpr<'_>) -> Result<ShaderType> {
        let library = self.library;
        resolve_type(expr, self.ctx.settings(), &|name| library.contains_type(name))
    }

    /// Value a declaration without initializer starts from. `None` for
    /// values that cannot be constructed, such as opaque handles.
    pub(crate) fn default_value(&mut self, ty: &ShaderType) -> Option<String> {
        let resolvers = self.ctx.resolvers();
        match ty {
            ShaderType::Scalar(_) | ShaderType::Vector(..) | ShaderType::Matrix(..) => {
                Some(zero_value(ty, &resolvers.type_name(ty)))
            }
            ShaderType::Array(element, length) => {
                let element_value = self.default_value(element)?;
                let items = vec![element_value; *length as usize];
                Some(format!("{}[{length}]({})", resolvers.type_name(element), items.join(", ")))
            }
            ShaderType::Stream(stream) if !stream.is_output => {
                let element_value = self.default_value(&stream.element)?;
                let count = stream.primitive.vertex_count() as usize;
                let items = vec![element_value; count];
                Some(format!(
                    "{}[{count}]({})",
                    resolvers.type_name(&stream.element),
                    items.join(", ")
                ))
            }
            ShaderType::Struct(name) => {
                let ty = self.library.find_type(name)?;
                ty.find_constructor(0)?;
                self.deps.use_function(FunctionKey::constructor(name, 0));
                self.deps.use_type(&ShaderType::Struct(name.clone()));
                Some(format!("{}()", mangle(self.ctx, name, CONSTRUCTOR_NAME)))
            }
            _ => None,
        }
    }
}

/// Zero of a scalar, vector or matrix type spelled `target`.
fn zero_value(ty: &ShaderType, target: &str) -> String {
    use crate::core_types::ScalarType;
    let scalar = match ty.scalar() {
        Some(ScalarType::Real) => "0.0",
        Some(ScalarType::Integer) => "0",
        _ => "false",
    };
    match ty {
        ShaderType::Scalar(_) => scalar.to_string(),
        _ => format!("{target}({scalar})"),
    }
}

#[cfg(test)]
mod tests;
