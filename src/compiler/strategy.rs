//! Input discovery: each strategy scans a node's tree once and yields input
//! descriptors paired with the filler that splices a value into that input.
//!
//! Strategies never fail on "no match"; they return nothing. Whether an edge
//! names a real input is checked by the graph compiler when wiring.
//!
//! Discovery lifts every splice point into the node's slot arena, so a filler
//! only ever writes to the sites found here.

use std::collections::{BTreeMap, HashSet};

use glsl::syntax::{Declaration, Expr, ExternalDeclaration, FunIdentifier, StorageQualifier};
use glsl::visitor::{HostMut, Visit, VisitorMut};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::ast::{self, Lift, NodeAst, SlotArena, SlotId};
use super::filler::{self, Filler};
use crate::dsl::Node;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum Strategy {
    #[serde(rename = "uniform")]
    Uniform,
    #[serde(rename = "assignmentTo")]
    AssignmentTo { target: String },
    #[serde(rename = "declarationOf")]
    DeclarationOf { target: String },
    #[serde(rename = "texture2D")]
    Texture2D,
    #[serde(rename = "namedAttribute")]
    NamedAttribute { name: String },
    #[serde(rename = "variable")]
    Variable,
    #[serde(rename = "hardCode")]
    HardCode { inputs: Vec<InputDescriptor> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputCategory {
    Data,
    Code,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct InputDescriptor {
    pub name: String,
    pub id: String,
    pub category: InputCategory,
    /// Safe to constant-fold or precompute.
    #[serde(default)]
    pub bakeable: bool,
}

impl InputDescriptor {
    pub fn new(name: impl Into<String>, category: InputCategory, bakeable: bool) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            category,
            bakeable,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeInput {
    pub descriptor: InputDescriptor,
    pub filler: Filler,
}

impl NodeInput {
    pub fn new(descriptor: InputDescriptor, filler: Filler) -> Self {
        Self { descriptor, filler }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

const TEXTURE_FUNCTIONS: [&str; 2] = ["texture2D", "texture"];

pub fn apply_strategy(strategy: &Strategy, tree: &mut NodeAst) -> Vec<NodeInput> {
    match strategy {
        Strategy::Uniform => uniform_inputs(tree),
        Strategy::AssignmentTo { target } => ast::lift_assignment(tree, target)
            .map(|slot| {
                NodeInput::new(
                    InputDescriptor::new(target.clone(), InputCategory::Code, false),
                    Filler::Slot(slot),
                )
            })
            .into_iter()
            .collect(),
        Strategy::DeclarationOf { target } => {
            let fill = match filler::lift_initializer(tree, target) {
                Some(slot) => Filler::Slot(slot),
                None if filler::declares(tree, target) => Filler::DeclarationOf {
                    target: target.clone(),
                },
                None => return Vec::new(),
            };
            vec![NodeInput::new(
                InputDescriptor::new(target.clone(), InputCategory::Code, false),
                fill,
            )]
        }
        Strategy::Texture2D => texture_inputs(tree),
        Strategy::NamedAttribute { name } => {
            let lifted = ast::lift_references(tree, |n| n == name.as_str(), true);
            vec![NodeInput::new(
                InputDescriptor::new(name.clone(), InputCategory::Code, true),
                Filler::References {
                    name: name.clone(),
                    sites: sites_named(&lifted, name),
                },
            )]
        }
        // One input per referenced name, filling every reference to it.
        // Names that are only declared never get an input.
        Strategy::Variable => {
            let lifted = ast::lift_references(tree, |_| true, false);
            let mut seen: HashSet<String> = HashSet::new();
            lifted
                .iter()
                .filter(|(_, name)| seen.insert(name.clone()))
                .map(|(_, name)| {
                    NodeInput::new(
                        InputDescriptor::new(name.clone(), InputCategory::Code, false),
                        Filler::References {
                            name: name.clone(),
                            sites: sites_named(&lifted, name),
                        },
                    )
                })
                .collect()
        }
        Strategy::HardCode { inputs } => inputs
            .iter()
            .cloned()
            .map(|descriptor| NodeInput::new(descriptor, Filler::Identity))
            .collect(),
    }
}

fn sites_named(lifted: &[(SlotId, String)], name: &str) -> Vec<SlotId> {
    lifted
        .iter()
        .filter(|(_, n)| n == name)
        .map(|(id, _)| *id)
        .collect()
}

/// Run every strategy on the node, keeping the first input of each name.
pub fn apply_strategies(node: &Node, tree: &mut NodeAst) -> Vec<NodeInput> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut inputs = Vec::new();
    for strategy in &node.strategies {
        for input in apply_strategy(strategy, tree) {
            if seen.insert(input.descriptor.name.clone()) {
                inputs.push(input);
            } else {
                warn!(
                    node = %node.id,
                    input = %input.descriptor.name,
                    "input discovered twice; keeping the first"
                );
            }
        }
    }
    inputs
}

fn uniform_inputs(tree: &mut NodeAst) -> Vec<NodeInput> {
    let Some(tu) = tree.as_program() else {
        return Vec::new();
    };
    let mut names = Vec::new();
    for decl in tu.0 .0.iter() {
        let ExternalDeclaration::Declaration(Declaration::InitDeclaratorList(list)) = decl else {
            continue;
        };
        if !ast::has_storage(&list.head.ty.qualifier, &StorageQualifier::Uniform) {
            continue;
        }
        let ty = ast::generate_type_specifier(&list.head.ty.ty);
        if ty.to_ascii_lowercase().contains("sampler") {
            continue;
        }
        names.extend(ast::declarator_names(list));
    }

    let lifted = ast::lift_references(tree, |n| names.iter().any(|u| u == n), false);
    names
        .iter()
        .map(|name| {
            NodeInput::new(
                InputDescriptor::new(name.clone(), InputCategory::Data, true),
                Filler::Uniform {
                    name: name.clone(),
                    sites: sites_named(&lifted, name),
                },
            )
        })
        .collect()
}

/// Lift every texture sample call into a slot. Calls are named by the text of
/// their first argument; when that text repeats anywhere in the tree, every
/// occurrence (the first included) gets its occurrence index appended.
fn texture_inputs(tree: &mut NodeAst) -> Vec<NodeInput> {
    let mut calls = TextureCalls {
        arena: SlotArena::default(),
        found: Vec::new(),
    };
    ast::lift(tree, &mut calls);

    let mut totals: BTreeMap<String, usize> = BTreeMap::new();
    for (_, key) in &calls.found {
        *totals.entry(key.clone()).or_default() += 1;
    }

    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    calls
        .found
        .into_iter()
        .map(|(slot, key)| {
            let name = if totals.get(&key).copied().unwrap_or(0) > 1 {
                let index = seen.entry(key.clone()).or_default();
                let name = format!("{key}_{index}");
                *index += 1;
                name
            } else {
                key
            };
            NodeInput::new(
                InputDescriptor::new(name, InputCategory::Code, false),
                Filler::Slot(slot),
            )
        })
        .collect()
}

struct TextureCalls {
    arena: SlotArena,
    found: Vec<(SlotId, String)>,
}

impl Lift for TextureCalls {
    fn arena(&mut self) -> &mut SlotArena {
        &mut self.arena
    }
}

fn is_texture_call(e: &Expr) -> bool {
    match e {
        Expr::FunCall(FunIdentifier::Identifier(f), args) => {
            !args.is_empty() && TEXTURE_FUNCTIONS.contains(&f.0.as_str())
        }
        _ => false,
    }
}

impl VisitorMut for TextureCalls {
    fn visit_expr(&mut self, e: &mut Expr) -> Visit {
        if !is_texture_call(e) {
            return Visit::Children;
        }
        let key = match &*e {
            Expr::FunCall(_, args) => ast::generate_expr(&args[0]),
            _ => return Visit::Children,
        };
        let slot = self.arena.lift(e);
        self.found.push((slot, key));

        // Sample calls nested in the arguments get slots of their own.
        let Some(lifted) = self.arena.get_mut(slot) else {
            return Visit::Parent;
        };
        let mut call = std::mem::replace(lifted, Expr::IntConst(0));
        if let Expr::FunCall(_, args) = &mut call {
            for arg in args.iter_mut() {
                arg.visit_mut(self);
            }
        }
        if let Some(lifted) = self.arena.get_mut(slot) {
            *lifted = call;
        }
        Visit::Parent
    }
}
