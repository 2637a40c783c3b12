//! Built-in parsers, used when the engine has no override for a node type.

use std::rc::Rc;

use super::engine::NodeParser;
use crate::dsl::{self, Node};

pub mod binary;
pub mod output;
pub mod source;

pub use binary::BinaryParser;
pub use output::OutputParser;
pub use source::SourceParser;

pub fn builtin(node: &Node) -> Option<Rc<dyn NodeParser>> {
    match node.node_type.as_str() {
        dsl::OUTPUT => Some(Rc::new(OutputParser)),
        dsl::SOURCE => Some(Rc::new(SourceParser)),
        t if dsl::binary_operator(t).is_some() => Some(Rc::new(BinaryParser)),
        _ => None,
    }
}

/// Identifier suffix for a node. A vertex node linked to a fragment node takes
/// the fragment node's id so the varyings both declare end up with one name.
pub fn mangle_suffix(node: &Node) -> &str {
    node.next_stage_node_id.as_deref().unwrap_or(&node.id)
}
