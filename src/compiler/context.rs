//! First pass: materialize every participating node's tree and input map.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use super::ast::NodeAst;
use super::engine::Engine;
use super::error::CompileError;
use super::strategy::NodeInput;
use crate::dsl::{Edge, Graph, Node, ShaderStage};
use crate::graph::{collect_connected_nodes, find_orphan_vertex_nodes};

#[derive(Debug, Clone)]
pub struct NodeContext {
    pub ast: NodeAst,
    pub inputs: Vec<NodeInput>,
}

impl NodeContext {
    pub fn input(&self, name: &str) -> Option<&NodeInput> {
        self.inputs.iter().find(|i| i.name() == name)
    }
}

/// Compilation state owned by one compiler instance. Node contexts are
/// replaced on every pass; the counter only grows.
#[derive(Debug, Clone, Default)]
pub struct EngineContext {
    pub nodes: HashMap<String, NodeContext>,
    pub compile_count: u64,
    /// Opaque engine state for adapters.
    pub runtime: serde_json::Map<String, serde_json::Value>,
}

impl EngineContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, node_id: &str) -> Result<&NodeContext, CompileError> {
        self.nodes
            .get(node_id)
            .ok_or_else(|| CompileError::MissingNodeContext(node_id.to_string()))
    }

    pub fn node_mut(&mut self, node_id: &str) -> Result<&mut NodeContext, CompileError> {
        self.nodes
            .get_mut(node_id)
            .ok_or_else(|| CompileError::MissingNodeContext(node_id.to_string()))
    }
}

/// Run the node's parser: pre-compile hook, tree, then input discovery.
pub fn compute_context_for_node(
    ctx: &mut EngineContext,
    engine: &Engine,
    graph: &Graph,
    node: &Node,
) -> Result<NodeContext, CompileError> {
    let parser = engine.parser_for(node)?;
    parser.on_before_compile(engine, graph, node, ctx)?;

    let input_edges: Vec<&Edge> = graph.input_edges(&node.id).collect();
    let mut ast = parser.produce_ast(engine, ctx, graph, node, &input_edges)?;
    let inputs = parser.find_inputs(engine, graph, node, &mut ast)?;
    debug!(
        node = %node.id,
        node_type = %node.node_type,
        stage = %node.stage,
        inputs = inputs.len(),
        "built node context"
    );
    Ok(NodeContext { ast, inputs })
}

/// Nodes taking part in each stage's program.
#[derive(Debug, Clone, Default)]
pub struct GraphParticipants {
    pub fragment: Vec<String>,
    pub vertex: Vec<String>,
    /// Vertex nodes reached only through `nextStageNodeId`.
    pub orphans: Vec<String>,
}

/// Build contexts for the fragment side (output and everything it reaches),
/// then the vertex side (output, everything it reaches, orphans and what
/// they reach).
pub fn compute_graph_context(
    ctx: &mut EngineContext,
    engine: &Engine,
    graph: &Graph,
) -> Result<GraphParticipants, CompileError> {
    let fragment_out = graph.output_node(ShaderStage::Fragment)?;
    let vertex_out = graph.output_node(ShaderStage::Vertex)?;

    let fragment_ids = collect_connected_nodes(graph, fragment_out);
    let mut vertex_ids = collect_connected_nodes(graph, vertex_out);

    let orphans = find_orphan_vertex_nodes(graph, &fragment_ids, &vertex_ids);
    let orphan_ids: Vec<String> = orphans.iter().map(|n| n.id.clone()).collect();
    let mut orphan_reach: BTreeMap<String, &Node> = BTreeMap::new();
    for orphan in &orphans {
        orphan_reach.extend(collect_connected_nodes(graph, orphan));
    }
    vertex_ids.extend(orphan_reach);

    ctx.nodes.clear();
    for (id, node) in fragment_ids.iter().chain(vertex_ids.iter()) {
        if ctx.nodes.contains_key(id) {
            continue;
        }
        let node_ctx = compute_context_for_node(ctx, engine, graph, node)?;
        ctx.nodes.insert(id.clone(), node_ctx);
    }

    Ok(GraphParticipants {
        fragment: fragment_ids.into_keys().collect(),
        vertex: vertex_ids.into_keys().collect(),
        orphans: orphan_ids,
    })
}
