use std::collections::HashSet;
use std::fmt;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::compiler::error::CompileError;
use crate::compiler::strategy::Strategy;

pub const OUTPUT: &str = "output";
pub const SOURCE: &str = "source";
pub const ADD: &str = "add";
pub const SUBTRACT: &str = "subtract";
pub const MULTIPLY: &str = "multiply";
pub const DIVIDE: &str = "divide";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Graph {
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub stage: ShaderStage,
    #[serde(default)]
    pub source: Option<String>,
    /// Contributes a single expression and no global declarations.
    #[serde(default)]
    pub expression_only: bool,
    /// Fragment node this vertex node feeds directly (varying linkage).
    #[serde(default)]
    pub next_stage_node_id: Option<String>,
    /// Engine the source was authored against.
    #[serde(default)]
    pub original_engine: Option<String>,
    #[serde(default)]
    pub strategies: Vec<Strategy>,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>, stage: ShaderStage) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            node_type: node_type.into(),
            stage,
            source: None,
            expression_only: false,
            next_stage_node_id: None,
            original_engine: None,
            strategies: Vec::new(),
        }
    }

    pub fn output(id: impl Into<String>, stage: ShaderStage) -> Self {
        Self::new(id, OUTPUT, stage)
    }

    pub fn source(
        id: impl Into<String>,
        stage: ShaderStage,
        source: impl Into<String>,
        strategies: Vec<Strategy>,
    ) -> Self {
        let mut node = Self::new(id, SOURCE, stage);
        node.source = Some(source.into());
        node.strategies = strategies;
        node
    }

    pub fn expression(
        id: impl Into<String>,
        stage: ShaderStage,
        expression: impl Into<String>,
        strategies: Vec<Strategy>,
    ) -> Self {
        let mut node = Self::source(id, stage, expression, strategies);
        node.expression_only = true;
        node
    }

    pub fn is_output(&self) -> bool {
        self.node_type == OUTPUT
    }

    pub fn is_binary_op(&self) -> bool {
        binary_operator(&self.node_type).is_some()
    }

    /// A node whose source is a full shader program (not expression-only).
    pub fn is_shader(&self) -> bool {
        self.node_type == SOURCE && !self.expression_only
    }
}

/// GLSL operator symbol for a binary node type.
pub fn binary_operator(node_type: &str) -> Option<&'static str> {
    match node_type {
        ADD => Some("+"),
        SUBTRACT => Some("-"),
        MULTIPLY => Some("*"),
        DIVIDE => Some("/"),
        _ => None,
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: String,
    pub to: String,
    /// Output port on `from`.
    pub output: String,
    /// Input port on `to`.
    pub input: String,
    pub stage: ShaderStage,
}

impl Edge {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        output: impl Into<String>,
        input: impl Into<String>,
        stage: ShaderStage,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            output: output.into(),
            input: input.into(),
            stage,
        }
    }
}

impl Graph {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    pub fn find_node(&self, node_id: &str) -> Result<&Node, CompileError> {
        self.nodes
            .iter()
            .find(|n| n.id == node_id)
            .ok_or_else(|| CompileError::MissingNode(node_id.to_string()))
    }

    pub fn output_node(&self, stage: ShaderStage) -> Result<&Node, CompileError> {
        self.nodes
            .iter()
            .find(|n| n.is_output() && n.stage == stage)
            .ok_or(CompileError::MissingOutputNode(stage))
    }

    pub fn input_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.to == node_id)
    }

    /// Structural checks: unique node ids, at most one output node per stage,
    /// and edges whose endpoints exist.
    pub fn validate(&self) -> Result<(), CompileError> {
        let mut ids: HashSet<&str> = HashSet::with_capacity(self.nodes.len());
        let mut outputs: HashSet<ShaderStage> = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(CompileError::DuplicateNodeId(node.id.clone()));
            }
            if node.is_output() && !outputs.insert(node.stage) {
                return Err(CompileError::DuplicateOutputNode {
                    stage: node.stage,
                    node_id: node.id.clone(),
                });
            }
        }
        for edge in &self.edges {
            if !ids.contains(edge.from.as_str()) || !ids.contains(edge.to.as_str()) {
                return Err(CompileError::DanglingEdge {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                });
            }
        }
        Ok(())
    }
}

pub fn load_graph_from_str(text: &str) -> Result<Graph> {
    let graph: Graph = serde_json::from_str(text).context("failed to parse graph json")?;
    graph.validate().context("invalid graph")?;
    Ok(graph)
}

pub fn load_graph_from_path(path: impl AsRef<std::path::Path>) -> Result<Graph> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read graph json at {}", path.display()))?;
    load_graph_from_str(&text).with_context(|| format!("in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_json_uses_camel_case_fields() {
        let graph = load_graph_from_str(
            r#"{
                "nodes": [
                    { "id": "out", "type": "output", "stage": "fragment" },
                    { "id": "v", "type": "source", "stage": "vertex",
                      "source": "void main() {}", "nextStageNodeId": "f",
                      "originalEngine": "three" },
                    { "id": "f", "type": "source", "stage": "fragment",
                      "source": "vec2(1.0)", "expressionOnly": true }
                ],
                "edges": [
                    { "from": "f", "to": "out", "output": "out", "input": "color", "stage": "fragment" }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.nodes[1].next_stage_node_id.as_deref(), Some("f"));
        assert_eq!(graph.nodes[1].original_engine.as_deref(), Some("three"));
        assert!(graph.nodes[2].expression_only);
        assert!(graph.nodes[0].is_output());
        assert_eq!(graph.edges[0].input, "color");
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let graph = Graph::new(
            vec![Node::output("out", ShaderStage::Fragment)],
            vec![Edge::new("ghost", "out", "out", "color", ShaderStage::Fragment)],
        );
        let err = graph.validate().unwrap_err();
        assert!(matches!(err, CompileError::DanglingEdge { .. }));
    }

    #[test]
    fn duplicate_node_ids_are_rejected() {
        let graph = Graph::new(
            vec![
                Node::output("out", ShaderStage::Fragment),
                Node::output("out", ShaderStage::Vertex),
            ],
            vec![],
        );
        assert!(matches!(
            graph.validate(),
            Err(CompileError::DuplicateNodeId(id)) if id == "out"
        ));
    }

    #[test]
    fn second_output_for_a_stage_is_rejected() {
        let graph = Graph::new(
            vec![
                Node::output("out", ShaderStage::Fragment),
                Node::output("vout", ShaderStage::Vertex),
                Node::output("again", ShaderStage::Fragment),
            ],
            vec![],
        );
        assert_eq!(
            graph.validate(),
            Err(CompileError::DuplicateOutputNode {
                stage: ShaderStage::Fragment,
                node_id: "again".to_string()
            })
        );
    }

    #[test]
    fn binary_node_types_map_to_operators() {
        assert_eq!(binary_operator("add"), Some("+"));
        assert_eq!(binary_operator("multiply"), Some("*"));
        assert_eq!(binary_operator("source"), None);
    }
}
