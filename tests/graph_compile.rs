use std::path::PathBuf;

use glsl::syntax::{
    BinaryOp, Expr, ExternalDeclaration, FunctionDefinition, FunctionParameterDeclaration,
    JumpStatement, SimpleStatement, Statement,
};
use node_forge_shader_graph::{
    compiler::{
        self, CompileError, CompileResult, Engine, EngineContext, InputCategory, InputDescriptor,
        ShaderSections, Strategy, ast, compile_graph,
    },
    dsl::{self, Edge, Graph, Node, ShaderStage},
};

fn cases_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("cases")
}

fn load_case(name: &str) -> Graph {
    dsl::load_graph_from_path(cases_root().join(name))
        .unwrap_or_else(|e| panic!("failed to load case {name}: {e:#}"))
}

fn outputs() -> Vec<Node> {
    vec![
        Node::output("fout", ShaderStage::Fragment),
        Node::output("vout", ShaderStage::Vertex),
    ]
}

fn frag_edge(from: &str, to: &str, input: &str) -> Edge {
    Edge::new(from, to, "out", input, ShaderStage::Fragment)
}

fn function<'a>(sections: &'a ShaderSections, name: &str) -> &'a FunctionDefinition {
    sections
        .program
        .iter()
        .find_map(|decl| match decl {
            ExternalDeclaration::FunctionDefinition(def) if def.prototype.name.0 == name => Some(def),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no function {name}"))
}

fn statement_expr(stmt: &Statement) -> Option<&Expr> {
    match stmt {
        Statement::Simple(simple) => match &**simple {
            SimpleStatement::Expression(Some(expr)) => Some(expr),
            _ => None,
        },
        _ => None,
    }
}

/// Right-hand side of the first assignment to `target` among `main`'s statements.
fn assigned_in_main<'a>(sections: &'a ShaderSections, target: &str) -> &'a Expr {
    function(sections, "main")
        .statement
        .statement_list
        .iter()
        .filter_map(statement_expr)
        .find_map(|e| match e {
            Expr::Assignment(lhs, _, rhs) if **lhs == ast::variable(target) => Some(&**rhs),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no assignment to {target} in main"))
}

fn returned(def: &FunctionDefinition) -> &Expr {
    def.statement
        .statement_list
        .iter()
        .find_map(|stmt| match stmt {
            Statement::Simple(simple) => match &**simple {
                SimpleStatement::Jump(JumpStatement::Return(Some(e))) => Some(&**e),
                _ => None,
            },
            _ => None,
        })
        .unwrap_or_else(|| panic!("{} returns nothing", def.prototype.name.0))
}

fn compile(graph: &Graph) -> CompileResult {
    compiler::compile(&Engine::three(), graph).unwrap_or_else(|e| panic!("compile failed: {e}"))
}

#[test]
fn orphan_vertex_node_is_prepended_to_vertex_main() {
    let result = compile(&load_case("orphan_varying.json"));

    assert!(result.vertex_ids.contains(&"vert".to_string()));
    assert!(result.fragment_ids.contains(&"frag".to_string()));
    assert!(!result.fragment_ids.contains(&"vert".to_string()));

    let body = &function(&result.vertex, "main").statement.statement_list;
    assert_eq!(
        statement_expr(&body[0]),
        Some(&ast::call("main_frag", vec![])),
        "orphan call must be the first statement"
    );

    let position = assigned_in_main(&result.vertex, "gl_Position");
    assert!(!ast::generate_expr(position).contains("main_frag"));

    let vertex = result.vertex_source();
    let fragment = result.fragment_source();
    assert!(vertex.contains("vCoord_frag"), "{vertex}");
    assert!(fragment.contains("vCoord_frag"), "{fragment}");
    assert_eq!(vertex.matches("vec3 position").count(), 1, "{vertex}");
}

#[test]
fn mangling_keeps_same_named_globals_apart() {
    let source = "float x = 0.5;\nvoid main() { gl_FragColor = vec4(x); }\n";
    let mut nodes = outputs();
    nodes.extend([
        Node::source("n1", ShaderStage::Fragment, source, vec![]),
        Node::source("n2", ShaderStage::Fragment, source, vec![]),
        Node::new("sum", dsl::ADD, ShaderStage::Fragment),
    ]);
    let graph = Graph::new(
        nodes,
        vec![
            frag_edge("n1", "sum", "a"),
            frag_edge("n2", "sum", "b"),
            frag_edge("sum", "fout", "color"),
        ],
    );
    let result = compile(&graph);
    let fragment = result.fragment_source();

    for name in ["x_n1", "x_n2", "main_n1", "main_n2"] {
        assert!(fragment.contains(name), "missing {name}:\n{fragment}");
    }
    assert_eq!(
        assigned_in_main(&result.fragment, "frogFragOut"),
        &Expr::Binary(
            BinaryOp::Add,
            Box::new(ast::call("main_n1", vec![])),
            Box::new(ast::call("main_n2", vec![]))
        )
    );

    let vertex = result.vertex_source();
    assert!(vertex.contains("gl_Position"));
    assert!(!vertex.contains("gl_Position_"));
    assert!(!vertex.contains("position_"));
}

#[test]
fn binary_node_chains_inputs_in_edge_order() {
    let mut nodes = outputs();
    nodes.push(Node::new("sum", dsl::ADD, ShaderStage::Fragment));
    let mut edges = vec![frag_edge("sum", "fout", "color")];
    for (id, letter) in [("first", "a"), ("second", "b"), ("third", "c")] {
        nodes.push(Node::expression(id, ShaderStage::Fragment, format!("{id}Value"), vec![]));
        edges.push(frag_edge(id, "sum", letter));
    }
    let result = compile(&Graph::new(nodes, edges));

    let v = |name: &str| Box::new(ast::variable(name));
    let expected = Expr::Binary(
        BinaryOp::Add,
        Box::new(Expr::Binary(BinaryOp::Add, v("firstValue"), v("secondValue"))),
        v("thirdValue"),
    );
    assert_eq!(assigned_in_main(&result.fragment, "frogFragOut"), &expected);
}

#[test]
fn operand_values_are_not_rewritten_by_later_operands() {
    let mut nodes = outputs();
    nodes.extend([
        Node::new("sum", dsl::ADD, ShaderStage::Fragment),
        Node::expression("x", ShaderStage::Fragment, "vec4(b)", vec![]),
        Node::expression("y", ShaderStage::Fragment, "vec4(2.0)", vec![]),
    ]);
    let graph = Graph::new(
        nodes,
        vec![
            frag_edge("x", "sum", "a"),
            frag_edge("y", "sum", "b"),
            frag_edge("sum", "fout", "color"),
        ],
    );
    let result = compile(&graph);
    let parse = |text: &str| Box::new(ast::parse_expression("t", text).unwrap());
    assert_eq!(
        assigned_in_main(&result.fragment, "frogFragOut"),
        &Expr::Binary(BinaryOp::Add, parse("vec4(b)"), parse("vec4(2.0)"))
    );
}

#[test]
fn named_attribute_rewrites_references_and_parameters_only() {
    let mut nodes = outputs();
    nodes.extend([
        Node::source(
            "v",
            ShaderStage::Vertex,
            "in vec3 position;\nuniform vec3 offset;\nvec3 shift(vec3 position) { return position + offset; }\nvoid main() { gl_Position = vec4(shift(position), 1.0); }\n",
            vec![
                Strategy::Uniform,
                Strategy::NamedAttribute {
                    name: "position".to_string(),
                },
            ],
        ),
        Node::expression("o", ShaderStage::Vertex, "position * 0.1", vec![]),
        Node::expression("p", ShaderStage::Vertex, "displaced", vec![]),
    ]);
    let vertex_edge = |from: &str, to: &str, input: &str| {
        Edge::new(from, to, "out", input, ShaderStage::Vertex)
    };
    let graph = Graph::new(
        nodes,
        vec![
            vertex_edge("o", "v", "offset"),
            vertex_edge("p", "v", "position"),
            vertex_edge("v", "vout", "position"),
        ],
    );
    let result = compile(&graph);

    let shift = function(&result.vertex, "shift_v");
    match &shift.prototype.parameters[0] {
        FunctionParameterDeclaration::Named(_, declarator) => {
            assert_eq!(declarator.ident.ident.0, "displaced")
        }
        other => panic!("unexpected parameter {other:?}"),
    }
    // The offset expression keeps its own `position`.
    assert_eq!(
        returned(shift),
        &Expr::Binary(
            BinaryOp::Add,
            Box::new(ast::variable("displaced")),
            Box::new(ast::parse_expression("o", "position * 0.1").unwrap())
        )
    );

    let vertex = result.vertex_source();
    assert_eq!(vertex.matches("displaced").count(), 3, "{vertex}");
    assert!(!vertex.contains("offset"), "{vertex}");
    assert!(!vertex.contains("position_v"), "{vertex}");
    assert!(vertex.contains("main_v"), "{vertex}");
}

#[test]
fn second_output_node_for_a_stage_is_fatal() {
    let mut nodes = outputs();
    nodes.push(Node::output("fout2", ShaderStage::Fragment));
    let err = compiler::compile(&Engine::three(), &Graph::new(nodes, vec![])).unwrap_err();
    assert_eq!(
        err,
        CompileError::DuplicateOutputNode {
            stage: ShaderStage::Fragment,
            node_id: "fout2".to_string()
        }
    );
}

#[test]
fn repeated_texture_arguments_are_wired_separately() {
    let mut nodes = outputs();
    nodes.extend([
        Node::source(
            "t",
            ShaderStage::Fragment,
            "uniform sampler2D tex;\nvoid main() {\n  gl_FragColor = texture2D(tex, vec2(0.0)) + texture2D(tex, vec2(1.0));\n}\n",
            vec![Strategy::Texture2D],
        ),
        Node::expression("left", ShaderStage::Fragment, "leftSample", vec![]),
        Node::expression("right", ShaderStage::Fragment, "rightSample", vec![]),
    ]);
    let graph = Graph::new(
        nodes,
        vec![
            frag_edge("left", "t", "tex_0"),
            frag_edge("right", "t", "tex_1"),
            frag_edge("t", "fout", "color"),
        ],
    );
    let result = compile(&graph);

    let main_t = function(&result.fragment, "main_t");
    let text = {
        let mut out = String::new();
        for stmt in &main_t.statement.statement_list {
            if let Some(e) = statement_expr(stmt) {
                out.push_str(&ast::generate_expr(e));
            }
        }
        out
    };
    assert!(text.contains("leftSample") && text.contains("rightSample"), "{text}");
    assert!(!text.contains("texture2D"));
    assert!(text.find("leftSample").unwrap() < text.find("rightSample").unwrap());
}

#[test]
fn wired_uniform_disappears_and_references_take_the_input() {
    let mut nodes = outputs();
    nodes.extend([
        Node::source(
            "u",
            ShaderStage::Fragment,
            "uniform vec4 color;\nvoid main() { gl_FragColor = color * color; }\n",
            vec![Strategy::Uniform],
        ),
        Node::expression("tint", ShaderStage::Fragment, "tintValue", vec![]),
    ]);
    let graph = Graph::new(
        nodes,
        vec![frag_edge("tint", "u", "color"), frag_edge("u", "fout", "color")],
    );
    let result = compile(&graph);

    assert!(result.fragment.uniforms.is_empty());
    let fragment = result.fragment_source();
    assert!(!fragment.contains("color_u"), "{fragment}");
    assert_eq!(fragment.matches("tintValue").count(), 2);
}

#[test]
fn hard_coded_input_passes_the_upstream_value_through() {
    let mut nodes = outputs();
    nodes.extend([
        Node::expression(
            "h",
            ShaderStage::Fragment,
            "vec4(0.0)",
            vec![Strategy::HardCode {
                inputs: vec![InputDescriptor::new("value", InputCategory::Data, true)],
            }],
        ),
        Node::expression("given", ShaderStage::Fragment, "givenValue", vec![]),
    ]);
    let graph = Graph::new(
        nodes,
        vec![frag_edge("given", "h", "value"), frag_edge("h", "fout", "color")],
    );
    let result = compile(&graph);
    assert_eq!(
        assigned_in_main(&result.fragment, "frogFragOut"),
        &ast::variable("givenValue")
    );
}

#[test]
fn compiling_twice_is_deterministic() {
    let graph = load_case("orphan_varying.json");
    let first = compile(&graph);
    let second = compile(&graph);
    assert_eq!(first.vertex, second.vertex);
    assert_eq!(first.fragment, second.fragment);
    assert_eq!(first.fragment_source(), second.fragment_source());

    let engine = Engine::three();
    let mut ctx = EngineContext::new();
    let a = compile_graph(&engine, &graph, &mut ctx).unwrap();
    let b = compile_graph(&engine, &graph, &mut ctx).unwrap();
    assert_eq!((a.compile_count, b.compile_count), (1, 2));
    assert_eq!(a.vertex_source(), b.vertex_source());
    assert_eq!(a.fragment_source(), first.fragment_source());
}

#[test]
fn missing_output_node_is_fatal() {
    let graph = Graph::new(vec![Node::output("fout", ShaderStage::Fragment)], vec![]);
    let mut ctx = EngineContext::new();
    let err = compile_graph(&Engine::three(), &graph, &mut ctx).unwrap_err();
    assert_eq!(err, CompileError::MissingOutputNode(ShaderStage::Vertex));
    assert!(ctx.nodes.is_empty());
}

#[test]
fn edge_into_undiscovered_port_is_fatal() {
    let mut nodes = outputs();
    nodes.push(Node::expression("e", ShaderStage::Fragment, "someValue", vec![]));
    let graph = Graph::new(nodes, vec![frag_edge("e", "fout", "emissive")]);
    let err = compiler::compile(&Engine::three(), &graph).unwrap_err();
    assert_eq!(
        err,
        CompileError::UnknownInputPort {
            node_id: "fout".to_string(),
            input: "emissive".to_string()
        }
    );
}

#[test]
fn cyclic_graph_is_rejected() {
    let mut nodes = outputs();
    nodes.extend([
        Node::new("p", dsl::MULTIPLY, ShaderStage::Fragment),
        Node::new("q", dsl::MULTIPLY, ShaderStage::Fragment),
    ]);
    let graph = Graph::new(
        nodes,
        vec![
            frag_edge("p", "q", "a"),
            frag_edge("q", "p", "a"),
            frag_edge("p", "fout", "color"),
        ],
    );
    let err = compiler::compile(&Engine::three(), &graph).unwrap_err();
    assert_eq!(err, CompileError::CyclicGraph(ShaderStage::Fragment));
}

#[test]
fn unknown_node_type_needs_an_engine_parser() {
    let mut nodes = outputs();
    nodes.push(Node::new("n", "noise", ShaderStage::Fragment));
    let graph = Graph::new(nodes, vec![frag_edge("n", "fout", "color")]);
    let err = compiler::compile(&Engine::three(), &graph).unwrap_err();
    assert!(matches!(err, CompileError::MissingParser { node_type, .. } if node_type == "noise"));
}
