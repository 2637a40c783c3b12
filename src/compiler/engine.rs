//! Engine adapters: per-runtime parser overrides, the identifiers a runtime
//! provides (and that must never be mangled), and cross-engine source rewrites.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;

use glsl::syntax::Expr;

use super::ast::NodeAst;
use super::context::EngineContext;
use super::error::CompileError;
use super::parsers;
use super::strategy::NodeInput;
use crate::dsl::{Edge, Graph, Node, ShaderStage};

/// Per node-type behaviour. Built-in parsers cover `output`, `source` and the
/// binary operators; an [`Engine`] may override any of them.
pub trait NodeParser {
    /// Side effects only; runs before the node's tree is produced.
    fn on_before_compile(
        &self,
        _engine: &Engine,
        _graph: &Graph,
        _node: &Node,
        _ctx: &mut EngineContext,
    ) -> Result<(), CompileError> {
        Ok(())
    }

    fn produce_ast(
        &self,
        engine: &Engine,
        ctx: &EngineContext,
        graph: &Graph,
        node: &Node,
        input_edges: &[&Edge],
    ) -> Result<NodeAst, CompileError>;

    /// Discover the node's inputs. May rewrite the tree (mangling, slot lifting).
    fn find_inputs(
        &self,
        engine: &Engine,
        graph: &Graph,
        node: &Node,
        ast: &mut NodeAst,
    ) -> Result<Vec<NodeInput>, CompileError>;

    /// The expression handed to whatever consumes this node. `None` for
    /// terminal nodes.
    fn produce_filler(&self, node: &Node, ast: &NodeAst) -> Option<Expr>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParserKey {
    pub node_type: String,
    /// `None` matches every stage.
    pub stage: Option<ShaderStage>,
}

#[derive(Clone)]
pub struct Engine {
    pub name: String,
    /// Identifiers exempt from mangling.
    pub preserve: BTreeSet<String>,
    parsers: HashMap<ParserKey, Rc<dyn NodeParser>>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.name)
            .field("preserve", &self.preserve)
            .field("parsers", &self.parsers.keys().collect::<Vec<_>>())
            .finish()
    }
}

const THREE_PRESERVE: &[&str] = &[
    "position",
    "normal",
    "uv",
    "uv2",
    "color",
    "modelMatrix",
    "modelViewMatrix",
    "projectionMatrix",
    "viewMatrix",
    "normalMatrix",
    "cameraPosition",
    "isOrthographic",
    "time",
    "vUv",
    "vNormal",
    "vPosition",
];

const BABYLON_PRESERVE: &[&str] = &[
    "position",
    "normal",
    "uv",
    "world",
    "view",
    "projection",
    "viewProjection",
    "worldView",
    "worldViewProjection",
    "vEyePosition",
    "time",
    "vMainUV1",
    "vNormal",
    "vPosition",
];

/// (authored for, compiling for, identifier, replacement)
const IDENTIFIER_REWRITES: &[(&str, &str, &str, &str)] = &[
    ("three", "babylon", "vUv", "vMainUV1"),
    ("babylon", "three", "vMainUV1", "vUv"),
];

impl Engine {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            preserve: BTreeSet::new(),
            parsers: HashMap::new(),
        }
    }

    pub fn with_preserve<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preserve.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn three() -> Self {
        Self::new("three").with_preserve(THREE_PRESERVE.iter().copied())
    }

    pub fn babylon() -> Self {
        Self::new("babylon").with_preserve(BABYLON_PRESERVE.iter().copied())
    }

    /// Stock preset by name; unknown names get an adapter with no overrides
    /// and an empty preserve set.
    pub fn by_name(name: &str) -> Self {
        match name {
            "three" => Self::three(),
            "babylon" => Self::babylon(),
            other => Self::new(other),
        }
    }

    /// Override the parser for `node_type`, optionally only for one stage.
    pub fn register(
        &mut self,
        node_type: impl Into<String>,
        stage: Option<ShaderStage>,
        parser: impl NodeParser + 'static,
    ) -> &mut Self {
        self.parsers.insert(
            ParserKey {
                node_type: node_type.into(),
                stage,
            },
            Rc::new(parser),
        );
        self
    }

    /// Adapter entry for (type, stage), then (type, any stage), then built-in.
    pub fn parser_for(&self, node: &Node) -> Result<Rc<dyn NodeParser>, CompileError> {
        let exact = ParserKey {
            node_type: node.node_type.clone(),
            stage: Some(node.stage),
        };
        let any = ParserKey {
            node_type: node.node_type.clone(),
            stage: None,
        };
        self.parsers
            .get(&exact)
            .or_else(|| self.parsers.get(&any))
            .cloned()
            .or_else(|| parsers::builtin(node))
            .ok_or_else(|| CompileError::MissingParser {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
                stage: node.stage,
            })
    }

    /// Renames to apply to source authored for `original`, when compiled here.
    pub fn identifier_rewrites(&self, original: Option<&str>) -> BTreeMap<String, String> {
        let Some(original) = original else {
            return BTreeMap::new();
        };
        if original == self.name {
            return BTreeMap::new();
        }
        IDENTIFIER_REWRITES
            .iter()
            .filter(|(from, to, _, _)| *from == original && *to == self.name)
            .map(|(_, _, ident, replacement)| (ident.to_string(), replacement.to_string()))
            .collect()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::three()
    }
}
