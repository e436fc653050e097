//! Library passes.
//!
//! - [`collector`]: Pass 1 - turn each unit's declarations into fragment types
//! - [`validator`]: Pass 2 - check attributes and register cross-type bindings

pub mod collector;
pub mod validator;

pub use collector::{CONSTRUCTOR_NAME, CollectorOutput, CollectorPass, GETTER_PREFIX};
pub use validator::{ValidationOutput, ValidationPass};
