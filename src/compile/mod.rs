//! Config Compiler
//!
//! Turns the composition model into msupcm++ job descriptions.

pub mod compiler;
pub mod schema;

pub use compiler::{
    compile, compile_project, compile_variant, compile_with, CompileSettings, CompiledConfig,
    DEFAULT_VERBOSITY,
};
pub use schema::{JobDescription, NodeRecord, OptionRecord, TrackRecord};
