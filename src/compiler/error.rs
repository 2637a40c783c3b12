//! Error taxonomy for graph compilation. Every variant is fatal: a compile call
//! either produces both programs or none.

use crate::dsl::ShaderStage;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("no parser for node {node_id} (type `{node_type}`, stage {stage})")]
    MissingParser {
        node_id: String,
        node_type: String,
        stage: ShaderStage,
    },

    #[error("graph has no {0} output node")]
    MissingOutputNode(ShaderStage),

    #[error("node {0} has no context; compute the graph context before compiling")]
    MissingNodeContext(String),

    #[error("node not found: {0}")]
    MissingNode(String),

    #[error("edge references missing node: {from} -> {to}")]
    DanglingEdge { from: String, to: String },

    #[error("duplicate node id: {0}")]
    DuplicateNodeId(String),

    #[error("node {node_id} is a second {stage} output node")]
    DuplicateOutputNode { stage: ShaderStage, node_id: String },

    #[error("node {node_id} has no input named `{input}`")]
    UnknownInputPort { node_id: String, input: String },

    #[error("filler for node {node_id} could not find `{target}` in its tree")]
    MissingFillerTarget { node_id: String, target: String },

    #[error("cycle detected in {0} graph")]
    CyclicGraph(ShaderStage),

    #[error("node {node_id} has {count} inputs; binary nodes support at most 26")]
    InputLimitExceeded { node_id: String, count: usize },

    #[error("node {0} has no source")]
    MissingSource(String),

    #[error("node {0} produced no filler expression for its consumer")]
    NoFillerProduced(String),

    #[error("failed to parse GLSL for node {node_id}: {message}")]
    Parse { node_id: String, message: String },
}
