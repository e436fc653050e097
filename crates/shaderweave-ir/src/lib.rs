//! Shader intermediate representation.
//!
//! This crate holds everything between the translator and the final target
//! text:
//! - [`IrModule`] and its [`FunctionBuilder`], a block-structured SSA-like
//!   IR with explicit merge information
//! - [`binary`]: the word-stream encoding passes exchange
//! - [`verify_module`]: structural checks
//! - [`reflection`] and [`simplify`]: resource reflection per pass, and the
//!   fragment-level view of it
//! - [`passes`]: the translation pipeline and its backend
//! - [`eval`]: a reference evaluator for testing lowered code
//!
//! # Example
//!
//! ```
//! use shaderweave_ir::{FunctionBuilder, IrModule, PassPipeline, reflect_module};
//!
//! let mut module = IrModule::new();
//! let void = module.types.void();
//! let main = module.declare_function("main", void, Vec::new());
//! let mut builder = FunctionBuilder::new(&mut module, main).unwrap();
//! builder.ret().unwrap();
//! builder.finish();
//!
//! let result = PassPipeline::default()
//!     .run(&module, reflect_module(&module))
//!     .unwrap();
//! assert!(result.backend_text().is_some());
//! ```

pub mod binary;
mod builder;
mod constant;
mod error;
pub mod eval;
mod function;
pub mod layout;
mod module;
pub mod passes;
pub mod reflection;
pub mod simplify;
mod types;
mod verify;
mod worker;

pub use builder::{FunctionBuilder, ShortCircuit};
pub use constant::{ConstId, ConstValue, Constant, ConstantTable, SpecConstId, SpecConstant};
pub use error::IrError;
pub use function::{
    BasicBlock, BinOp, BlockId, FuncId, FunctionParam, Inst, IrFunction, MergeInfo, Op, Operand,
    Terminator, UnOp, ValueId,
};
pub use module::{Decorations, EntryPoint, GlobalId, GlobalVariable, IrModule};
pub use passes::{
    PassInput, PassOutput, PassPipeline, PipelineDescriptor, PipelineResult, TranslationPass,
};
pub use reflection::{ShaderReflection, reflect_module};
pub use simplify::{PropertyDescription, PropertyKind, SimplifiedReflection, UniformLocation};
pub use types::{ImageDim, IrType, ScalarKind, ShaderStage, StorageClass, StructMember, TypeId, TypeTable};
pub use verify::{operand_type, verify_module};
pub use worker::{PipelineTicket, PipelineWorker};

pub use shaderweave_core::PassError;
