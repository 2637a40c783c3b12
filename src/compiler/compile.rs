//! Second pass: dependency-first wiring of node trees into two programs.

use std::collections::BTreeMap;

use glsl::syntax::Expr;
use tracing::{debug, info};

use super::ast::ShaderAst;
use super::context::{EngineContext, compute_graph_context};
use super::engine::Engine;
use super::error::CompileError;
use super::parsers::output::MAIN_STATEMENTS_PORT;
use super::sections::{ShaderSections, find_shader_sections, merge};
use crate::dsl::{Edge, Graph, Node, ShaderStage};
use crate::graph::check_acyclic;

/// Output port name used for the edges that wire orphan vertex nodes.
pub const ORPHAN_OUTPUT_PORT: &str = "main";

/// What compiling one node hands back to its consumer.
#[derive(Debug, Clone, Default)]
pub struct NodeOutput {
    pub sections: ShaderSections,
    pub filler: Option<Expr>,
}

/// Per-stage memo: node id -> the filler it produced.
pub type Visited = BTreeMap<String, Option<Expr>>;

#[derive(Debug, Clone)]
pub struct CompileResult {
    pub vertex: ShaderSections,
    pub fragment: ShaderSections,
    pub vertex_ids: Vec<String>,
    pub fragment_ids: Vec<String>,
    pub compile_count: u64,
}

impl CompileResult {
    pub fn vertex_source(&self) -> String {
        self.vertex.generate()
    }

    pub fn fragment_source(&self) -> String {
        self.fragment.generate()
    }
}

/// Compile `node` and, first, everything feeding it in `stage`.
///
/// Each input edge's source node is compiled, its sections merged, and its
/// filler expression spliced into this node's tree at the port the edge names.
/// This node's own declarations are merged after its inputs'. A node already
/// in `visited` returns its cached filler and no sections.
pub fn compile_node(
    engine: &Engine,
    graph: &Graph,
    edges: &[Edge],
    ctx: &mut EngineContext,
    node: &Node,
    stage: ShaderStage,
    visited: &mut Visited,
) -> Result<NodeOutput, CompileError> {
    if let Some(filler) = visited.get(&node.id) {
        return Ok(NodeOutput {
            sections: ShaderSections::default(),
            filler: filler.clone(),
        });
    }

    let mut sections = ShaderSections::default();
    for edge in edges.iter().filter(|e| e.to == node.id && e.stage == stage) {
        let child = graph.find_node(&edge.from)?;
        let output = compile_node(engine, graph, edges, ctx, child, stage, visited)?;
        sections = merge(sections, output.sections);

        let expr = output
            .filler
            .ok_or_else(|| CompileError::NoFillerProduced(child.id.clone()))?;
        let node_ctx = ctx.node_mut(&node.id)?;
        let filler = node_ctx
            .input(&edge.input)
            .map(|input| input.filler.clone())
            .ok_or_else(|| CompileError::UnknownInputPort {
                node_id: node.id.clone(),
                input: edge.input.clone(),
            })?;
        filler.apply(&node.id, &mut node_ctx.ast, expr)?;
    }

    let parser = engine.parser_for(node)?;
    let node_ctx = ctx.node(&node.id)?;
    let own = match node_ctx.ast.resolved() {
        ShaderAst::Program(tu) => find_shader_sections(&tu, stage),
        ShaderAst::Expression(_) => ShaderSections::default(),
    };
    let filler = match node_ctx.ast.passthrough() {
        Some(expr) => Some(expr.clone()),
        None => parser.produce_filler(node, &node_ctx.ast),
    };

    debug!(node = %node.id, %stage, has_filler = filler.is_some(), "compiled node");
    visited.insert(node.id.clone(), filler.clone());
    Ok(NodeOutput {
        sections: merge(sections, own),
        filler,
    })
}

/// Compile both programs. The fragment side is compiled first; the first
/// error along the way aborts the whole call.
pub fn compile_graph(
    engine: &Engine,
    graph: &Graph,
    ctx: &mut EngineContext,
) -> Result<CompileResult, CompileError> {
    ctx.compile_count += 1;
    graph.validate()?;
    check_acyclic(graph)?;

    let participants = compute_graph_context(ctx, engine, graph)?;
    let fragment_out = graph.output_node(ShaderStage::Fragment)?;
    let vertex_out = graph.output_node(ShaderStage::Vertex)?;

    let mut edges = graph.edges.clone();
    for orphan in &participants.orphans {
        edges.push(Edge::new(
            orphan.clone(),
            vertex_out.id.clone(),
            ORPHAN_OUTPUT_PORT,
            MAIN_STATEMENTS_PORT,
            ShaderStage::Vertex,
        ));
    }

    let mut fragment_visited = Visited::new();
    let fragment = compile_node(
        engine,
        graph,
        &edges,
        ctx,
        fragment_out,
        ShaderStage::Fragment,
        &mut fragment_visited,
    )?
    .sections;

    let mut vertex_visited = Visited::new();
    let vertex = compile_node(
        engine,
        graph,
        &edges,
        ctx,
        vertex_out,
        ShaderStage::Vertex,
        &mut vertex_visited,
    )?
    .sections;

    info!(
        engine = %engine.name,
        compile = ctx.compile_count,
        fragment_nodes = fragment_visited.len(),
        vertex_nodes = vertex_visited.len(),
        orphans = participants.orphans.len(),
        "compiled graph"
    );

    Ok(CompileResult {
        vertex,
        fragment,
        vertex_ids: vertex_visited.into_keys().collect(),
        fragment_ids: fragment_visited.into_keys().collect(),
        compile_count: ctx.compile_count,
    })
}

/// Compile with a fresh context.
pub fn compile(engine: &Engine, graph: &Graph) -> Result<CompileResult, CompileError> {
    compile_graph(engine, graph, &mut EngineContext::new())
}
