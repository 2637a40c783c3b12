use glsl::syntax::{BinaryOp, Expr};

use crate::compiler::ast::{self, NodeAst};
use crate::compiler::context::EngineContext;
use crate::compiler::engine::{Engine, NodeParser};
use crate::compiler::error::CompileError;
use crate::compiler::filler::Filler;
use crate::compiler::strategy::{InputCategory, InputDescriptor, NodeInput};
use crate::dsl::{self, Edge, Graph, Node};

const ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz";

/// Placeholder count: one per connected input, never fewer than two.
fn operand_count(input_edges: usize) -> usize {
    input_edges.max(2)
}

fn operator(node_type: &str) -> Option<BinaryOp> {
    match dsl::binary_operator(node_type)? {
        "+" => Some(BinaryOp::Add),
        "-" => Some(BinaryOp::Sub),
        "*" => Some(BinaryOp::Mult),
        "/" => Some(BinaryOp::Div),
        _ => None,
    }
}

/// Placeholder identifiers `a`, `b`, ... for `count` operands.
pub fn placeholders(node_id: &str, count: usize) -> Result<Vec<String>, CompileError> {
    if count > ALPHABET.len() {
        return Err(CompileError::InputLimitExceeded {
            node_id: node_id.to_string(),
            count,
        });
    }
    Ok(ALPHABET.chars().take(count).map(String::from).collect())
}

/// Left-associative chain `a op b op c ...`.
pub fn chain(op: BinaryOp, names: &[String]) -> Option<Expr> {
    let mut names = names.iter();
    let first = ast::variable(names.next()?);
    Some(names.fold(first, |acc, name| {
        Expr::Binary(op.clone(), Box::new(acc), Box::new(ast::variable(name)))
    }))
}

/// Synthesizes its expression from the number of connected inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryParser;

impl NodeParser for BinaryParser {
    fn produce_ast(
        &self,
        _engine: &Engine,
        _ctx: &EngineContext,
        _graph: &Graph,
        node: &Node,
        input_edges: &[&Edge],
    ) -> Result<NodeAst, CompileError> {
        let op = operator(&node.node_type).ok_or_else(|| CompileError::MissingParser {
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            stage: node.stage,
        })?;
        let names = placeholders(&node.id, operand_count(input_edges.len()))?;
        let expr = chain(op, &names).ok_or_else(|| CompileError::InputLimitExceeded {
            node_id: node.id.clone(),
            count: names.len(),
        })?;
        Ok(NodeAst::expression(expr))
    }

    fn find_inputs(
        &self,
        _engine: &Engine,
        graph: &Graph,
        node: &Node,
        tree: &mut NodeAst,
    ) -> Result<Vec<NodeInput>, CompileError> {
        let count = operand_count(graph.input_edges(&node.id).count());
        let letters = placeholders(&node.id, count)?;
        let operands = ast::lift_references(tree, |n| letters.iter().any(|l| l == n), false);
        letters
            .into_iter()
            .map(|letter| {
                operands
                    .iter()
                    .find(|(_, name)| *name == letter)
                    .map(|(slot, _)| *slot)
                    .ok_or_else(|| CompileError::MissingFillerTarget {
                        node_id: node.id.clone(),
                        target: letter.clone(),
                    })
                    .map(|slot| {
                        NodeInput::new(
                            InputDescriptor::new(letter, InputCategory::Code, false),
                            Filler::Slot(slot),
                        )
                    })
            })
            .collect()
    }

    fn produce_filler(&self, _node: &Node, ast: &NodeAst) -> Option<Expr> {
        ast.resolved_expression()
    }
}
