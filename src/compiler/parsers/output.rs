use glsl::syntax::Expr;

use crate::compiler::ast::{self, NodeAst};
use crate::compiler::context::EngineContext;
use crate::compiler::engine::{Engine, NodeParser};
use crate::compiler::error::CompileError;
use crate::compiler::filler::Filler;
use crate::compiler::strategy::{self, InputCategory, InputDescriptor, NodeInput};
use crate::dsl::{Edge, Graph, Node, ShaderStage};

pub const DEFAULT_FRAGMENT_OUTPUT: &str = include_str!("../../../assets/output.frag.glsl");
pub const DEFAULT_VERTEX_OUTPUT: &str = include_str!("../../../assets/output.vert.glsl");

pub const COLOR_PORT: &str = "color";
pub const POSITION_PORT: &str = "position";
pub const MAIN_STATEMENTS_PORT: &str = "mainStmts";

/// Terminal node of a stage. Its program is emitted unmangled and it produces
/// no filler of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputParser;

impl NodeParser for OutputParser {
    fn produce_ast(
        &self,
        _engine: &Engine,
        _ctx: &EngineContext,
        _graph: &Graph,
        node: &Node,
        _input_edges: &[&Edge],
    ) -> Result<NodeAst, CompileError> {
        let source = match (&node.source, node.stage) {
            (Some(source), _) => source.as_str(),
            (None, ShaderStage::Fragment) => DEFAULT_FRAGMENT_OUTPUT,
            (None, ShaderStage::Vertex) => DEFAULT_VERTEX_OUTPUT,
        };
        Ok(NodeAst::program(ast::parse_program(&node.id, source)?))
    }

    fn find_inputs(
        &self,
        _engine: &Engine,
        _graph: &Graph,
        node: &Node,
        tree: &mut NodeAst,
    ) -> Result<Vec<NodeInput>, CompileError> {
        if !node.strategies.is_empty() {
            return Ok(strategy::apply_strategies(node, tree));
        }

        let mut inputs = Vec::new();
        match node.stage {
            ShaderStage::Fragment => {
                let slot = ["frogFragOut", "gl_FragColor"]
                    .into_iter()
                    .find_map(|target| ast::lift_assignment(tree, target));
                if let Some(slot) = slot {
                    inputs.push(NodeInput::new(
                        InputDescriptor::new(COLOR_PORT, InputCategory::Code, false),
                        Filler::Slot(slot),
                    ));
                }
            }
            ShaderStage::Vertex => {
                if let Some(slot) = ast::lift_assignment(tree, "gl_Position") {
                    inputs.push(NodeInput::new(
                        InputDescriptor::new(POSITION_PORT, InputCategory::Code, false),
                        Filler::Slot(slot),
                    ));
                }
                inputs.push(NodeInput::new(
                    InputDescriptor::new(MAIN_STATEMENTS_PORT, InputCategory::Code, false),
                    Filler::MainStatement,
                ));
            }
        }
        Ok(inputs)
    }

    fn produce_filler(&self, _node: &Node, _ast: &NodeAst) -> Option<Expr> {
        None
    }
}
