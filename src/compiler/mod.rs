//! Shader graph compiler: per-node contexts, input discovery, and the
//! dependency-first wiring that produces a vertex and a fragment program.

pub mod ast;
pub mod compile;
pub mod context;
pub mod engine;
pub mod error;
pub mod filler;
pub mod parsers;
pub mod sections;
pub mod strategy;
pub mod validation;

pub use compile::{CompileResult, compile, compile_graph, compile_node};
pub use context::{EngineContext, NodeContext, compute_context_for_node, compute_graph_context};
pub use engine::{Engine, NodeParser};
pub use error::CompileError;
pub use sections::ShaderSections;
pub use strategy::{InputCategory, InputDescriptor, Strategy};
