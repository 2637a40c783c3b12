//! Generic shader nodes: a hand-written program (or a single expression) whose
//! inputs are discovered by the node's strategies.

use glsl::syntax::{
    Declaration, Expr, ExternalDeclaration, FullySpecifiedType, StorageQualifier, TypeSpecifier,
    TypeSpecifierNonArray,
};
use tracing::debug;

use super::mangle_suffix;
use crate::compiler::ast::{self, NodeAst};
use crate::compiler::context::EngineContext;
use crate::compiler::engine::{Engine, NodeParser};
use crate::compiler::error::CompileError;
use crate::compiler::strategy::{self, NodeInput};
use crate::dsl::{Edge, Graph, Node, ShaderStage};
use crate::graph::links_through_shader;

/// Local that replaces `gl_FragColor` (or a removed `out vec4`) in fragment nodes.
pub const FRAGMENT_RESULT: &str = "frogFragOut";
/// Local that replaces `gl_Position` in vertex nodes.
pub const VERTEX_RESULT: &str = "frogPosition";

#[derive(Debug, Clone, Copy, Default)]
pub struct SourceParser;

impl NodeParser for SourceParser {
    fn produce_ast(
        &self,
        engine: &Engine,
        _ctx: &EngineContext,
        graph: &Graph,
        node: &Node,
        _input_edges: &[&Edge],
    ) -> Result<NodeAst, CompileError> {
        let source = node
            .source
            .as_deref()
            .ok_or_else(|| CompileError::MissingSource(node.id.clone()))?;
        let rewrites = engine.identifier_rewrites(node.original_engine.as_deref());

        if node.expression_only {
            let mut tree = NodeAst::expression(ast::parse_expression(&node.id, source)?);
            ast::rename_bindings(&mut tree, &rewrites);
            return Ok(tree);
        }

        let mut tree = NodeAst::program(ast::parse_program(&node.id, source)?);
        if !rewrites.is_empty() {
            debug!(node = %node.id, ?rewrites, "rewriting identifiers for {}", engine.name);
            ast::rename_bindings(&mut tree, &rewrites);
        }
        match node.stage {
            ShaderStage::Fragment => convert_fragment_main(node, &mut tree)?,
            ShaderStage::Vertex => {
                convert_vertex_main(node, &mut tree, links_through_shader(graph, node))?
            }
        }
        Ok(tree)
    }

    fn find_inputs(
        &self,
        engine: &Engine,
        _graph: &Graph,
        node: &Node,
        tree: &mut NodeAst,
    ) -> Result<Vec<NodeInput>, CompileError> {
        let inputs = strategy::apply_strategies(node, tree);
        if !node.expression_only {
            ast::mangle_program(tree, mangle_suffix(node), &engine.preserve);
        }
        Ok(inputs)
    }

    fn produce_filler(&self, node: &Node, tree: &NodeAst) -> Option<Expr> {
        if node.expression_only {
            return tree.resolved_expression();
        }
        let main = tree.binding("main");
        let tu = tree.as_program()?;
        ast::global_names(tu)
            .contains(main)
            .then(|| ast::call(main, Vec::new()))
    }
}

fn vec_return_type(ty: TypeSpecifierNonArray) -> FullySpecifiedType {
    FullySpecifiedType {
        qualifier: None,
        ty: TypeSpecifier {
            ty,
            array_specifier: None,
        },
    }
}

/// Turn `main` into a function returning the colour it used to write.
fn convert_fragment_main(node: &Node, tree: &mut NodeAst) -> Result<(), CompileError> {
    let Some(tu) = tree.as_program_mut() else {
        return Ok(());
    };

    let out_name = tu.0 .0.iter().find_map(|decl| match decl {
        ExternalDeclaration::Declaration(Declaration::InitDeclaratorList(list))
            if ast::has_storage(&list.head.ty.qualifier, &StorageQualifier::Out) => {
            ast::declarator_names(list).into_iter().next()
        }
        _ => None,
    });

    let result = match out_name {
        Some(name) => {
            ast::remove_global_declaration(tu, &name, |list| {
                ast::has_storage(&list.head.ty.qualifier, &StorageQualifier::Out)
            });
            name
        }
        None => {
            let local = ast::variable(FRAGMENT_RESULT);
            ast::replace_references(tree, |n| n == "gl_FragColor", &local);
            FRAGMENT_RESULT.to_string()
        }
    };

    rewrite_main(
        node,
        tree,
        TypeSpecifierNonArray::Vec4,
        &format!("vec4 {result};"),
        &format!("return {result};"),
    )
}

/// Route `gl_Position` writes to a local and return it: the full `vec4` when
/// this node is terminal, `.xyz` when another vertex shader consumes it.
fn convert_vertex_main(
    node: &Node,
    tree: &mut NodeAst,
    links_through: bool,
) -> Result<(), CompileError> {
    let local = ast::variable(VERTEX_RESULT);
    ast::replace_references(tree, |n| n == "gl_Position", &local);

    let (ty, ret) = if links_through {
        (TypeSpecifierNonArray::Vec3, format!("return {VERTEX_RESULT}.xyz;"))
    } else {
        (TypeSpecifierNonArray::Vec4, format!("return {VERTEX_RESULT};"))
    };
    rewrite_main(node, tree, ty, &format!("vec4 {VERTEX_RESULT};"), &ret)
}

fn rewrite_main(
    node: &Node,
    tree: &mut NodeAst,
    ty: TypeSpecifierNonArray,
    declaration: &str,
    ret: &str,
) -> Result<(), CompileError> {
    let declaration = ast::parse_statement(&node.id, declaration)?;
    let ret = ast::parse_statement(&node.id, ret)?;
    let Some(main) = tree
        .as_program_mut()
        .and_then(|tu| ast::find_function_mut(tu, "main"))
    else {
        return Ok(());
    };
    main.prototype.ty = vec_return_type(ty);
    ast::prepend_statement(&mut main.statement, 0, declaration);
    main.statement.statement_list.push(ret);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::strategy::Strategy;

    fn compile_one(node: &Node, graph: &Graph) -> (NodeAst, Vec<NodeInput>) {
        let engine = Engine::three();
        let mut tree = SourceParser
            .produce_ast(&engine, &EngineContext::default(), graph, node, &[])
            .unwrap();
        let inputs = SourceParser.find_inputs(&engine, graph, node, &mut tree).unwrap();
        (tree, inputs)
    }

    fn text(tree: &NodeAst) -> String {
        let ast::ShaderAst::Program(tu) = tree.resolved() else {
            panic!("expected a program");
        };
        ast::generate(&tu)
    }

    #[test]
    fn legacy_fragment_main_returns_its_color() {
        let node = Node::source(
            "7",
            ShaderStage::Fragment,
            "uniform vec4 tint;\nvoid main() { gl_FragColor = tint; }\n",
            vec![Strategy::Uniform],
        );
        let graph = Graph::new(vec![node.clone()], vec![]);
        let (tree, inputs) = compile_one(&node, &graph);
        let out = text(&tree);

        assert!(out.contains("vec4 main_7"), "{out}");
        assert!(out.contains("return frogFragOut"));
        assert!(!out.contains("gl_FragColor"));
        assert!(out.contains("tint_7"));
        assert_eq!(inputs[0].descriptor.name, "tint");
        assert_eq!(
            SourceParser.produce_filler(&node, &tree),
            Some(ast::call("main_7", vec![]))
        );
    }

    #[test]
    fn modern_fragment_out_becomes_a_local() {
        let node = Node::source(
            "f",
            ShaderStage::Fragment,
            "#version 300 es\nprecision highp float;\nout vec4 fragColor;\nvoid main() { fragColor = vec4(1.0); }\n",
            vec![],
        );
        let graph = Graph::new(vec![node.clone()], vec![]);
        let (tree, _) = compile_one(&node, &graph);
        let out = text(&tree);
        assert!(!out.contains("out vec4"), "{out}");
        assert!(out.contains("return fragColor"));
    }

    #[test]
    fn vertex_main_returns_vec3_when_it_links_through_a_shader() {
        let a = Node::source(
            "a",
            ShaderStage::Vertex,
            "void main() { gl_Position = vec4(1.0); }\n",
            vec![],
        );
        let b = Node::source(
            "b",
            ShaderStage::Vertex,
            "uniform vec3 offset;\nvoid main() { gl_Position = vec4(offset, 1.0); }\n",
            vec![Strategy::Uniform],
        );
        let graph = Graph::new(
            vec![a.clone(), b.clone()],
            vec![Edge::new("a", "b", "out", "offset", ShaderStage::Vertex)],
        );

        let out_a = text(&compile_one(&a, &graph).0);
        assert!(out_a.contains("vec3 main_a"), "{out_a}");
        assert!(out_a.contains("frogPosition.xyz"));

        let out_b = text(&compile_one(&b, &graph).0);
        assert!(out_b.contains("vec4 main_b"), "{out_b}");
        assert!(!out_b.contains("gl_Position"));
    }

    #[test]
    fn linked_vertex_nodes_mangle_with_the_fragment_id() {
        let mut v = Node::source(
            "v",
            ShaderStage::Vertex,
            "out vec2 vCoord;\nvoid main() { vCoord = vec2(0.0); gl_Position = vec4(0.0); }\n",
            vec![],
        );
        v.next_stage_node_id = Some("f".to_string());
        let graph = Graph::new(vec![v.clone()], vec![]);
        let out = text(&compile_one(&v, &graph).0);
        assert!(out.contains("vCoord_f"), "{out}");
        assert!(out.contains("main_f"));
    }

    #[test]
    fn expression_nodes_are_not_mangled() {
        let node = Node::expression(
            "e",
            ShaderStage::Fragment,
            "vec4(uv, 0.0, 1.0)",
            vec![Strategy::Variable],
        );
        let graph = Graph::new(vec![node.clone()], vec![]);
        let (tree, inputs) = compile_one(&node, &graph);
        assert_eq!(inputs[0].descriptor.name, "uv");
        assert_eq!(
            SourceParser.produce_filler(&node, &tree),
            Some(ast::parse_expression("e", "vec4(uv, 0.0, 1.0)").unwrap())
        );
    }

    #[test]
    fn cross_engine_varyings_are_rewritten() {
        let mut node = Node::source(
            "f",
            ShaderStage::Fragment,
            "in vec2 vUv;\nvoid main() { gl_FragColor = vec4(vUv, 0.0, 1.0); }\n",
            vec![],
        );
        node.original_engine = Some("three".to_string());
        let graph = Graph::new(vec![node.clone()], vec![]);
        let engine = Engine::babylon();
        let mut tree = SourceParser
            .produce_ast(&engine, &EngineContext::default(), &graph, &node, &[])
            .unwrap();
        SourceParser.find_inputs(&engine, &graph, &node, &mut tree).unwrap();
        let out = text(&tree);
        assert!(out.contains("vMainUV1"), "{out}");
        assert!(!out.contains("vUv"));
        assert!(!out.contains("vMainUV1_f"));
    }

    #[test]
    fn missing_source_is_an_error() {
        let node = Node::new("s", crate::dsl::SOURCE, ShaderStage::Fragment);
        let graph = Graph::new(vec![node.clone()], vec![]);
        let err = SourceParser
            .produce_ast(&Engine::three(), &EngineContext::default(), &graph, &node, &[])
            .err()
            .unwrap();
        assert_eq!(err, CompileError::MissingSource("s".to_string()));
    }
}
