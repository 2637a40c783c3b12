//! Splice operations applied to a consumer node's tree during wiring.
//!
//! Fillers write into the slots found when inputs were discovered. The only
//! name lookups left happen in the node's own tree, which holds placeholders
//! where spliced code goes and never the spliced code itself.

use std::fmt;
use std::rc::Rc;

use glsl::syntax::{
    Expr, Initializer, SingleDeclaration, SingleDeclarationNoType, StorageQualifier,
};
use glsl::visitor::{Visit, VisitorMut};

use super::ast::{self, NodeAst, SlotId};
use super::error::CompileError;

pub type CustomFill = Rc<dyn Fn(&mut NodeAst, Expr) -> Result<(), CompileError>>;

/// How an input's expression lands in the consumer's tree.
#[derive(Clone)]
pub enum Filler {
    /// Drop the uniform declaration and fill every lifted reference.
    Uniform { name: String, sites: Vec<SlotId> },
    /// Give the declaration of `target` an initializer. Declarations that
    /// already had one were lifted into a [`Filler::Slot`] instead.
    DeclarationOf { target: String },
    /// Replace one lifted splice point: a texture call, an assignment's
    /// right-hand side, a declaration initializer, or an operand.
    Slot(SlotId),
    /// Fill every lifted reference to `name`.
    References { name: String, sites: Vec<SlotId> },
    /// Prepend `expr;` to the top of `main`.
    MainStatement,
    /// The expression becomes the node's value verbatim.
    Identity,
    /// Adapter-provided splice.
    Custom(CustomFill),
}

impl fmt::Debug for Filler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filler::Uniform { name, sites } => f
                .debug_struct("Uniform")
                .field("name", name)
                .field("sites", sites)
                .finish(),
            Filler::DeclarationOf { target } => {
                f.debug_struct("DeclarationOf").field("target", target).finish()
            }
            Filler::Slot(id) => f.debug_tuple("Slot").field(id).finish(),
            Filler::References { name, sites } => f
                .debug_struct("References")
                .field("name", name)
                .field("sites", sites)
                .finish(),
            Filler::MainStatement => f.write_str("MainStatement"),
            Filler::Identity => f.write_str("Identity"),
            Filler::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Filler {
    pub fn apply(&self, node_id: &str, tree: &mut NodeAst, expr: Expr) -> Result<(), CompileError> {
        let missing = |target: &str| CompileError::MissingFillerTarget {
            node_id: node_id.to_string(),
            target: target.to_string(),
        };

        match self {
            Filler::Uniform { name, sites } => {
                let bound = tree.binding(name).to_string();
                if let Some(tu) = tree.as_program_mut() {
                    ast::remove_global_declaration(tu, &bound, |list| {
                        ast::has_storage(&list.head.ty.qualifier, &StorageQualifier::Uniform)
                    });
                }
                if fill_sites(tree, sites, &expr) {
                    Ok(())
                } else {
                    Err(missing(name))
                }
            }
            Filler::DeclarationOf { target } => {
                let bound = tree.binding(target).to_string();
                let value = tree.push_slot(expr);
                if set_initializer(tree, &bound, value) {
                    Ok(())
                } else {
                    Err(missing(target))
                }
            }
            Filler::Slot(id) => {
                if tree.fill_slot(*id, expr) {
                    Ok(())
                } else {
                    Err(missing(&format!("slot {}", id.0)))
                }
            }
            Filler::References { name, sites } => {
                if !sites.is_empty() && fill_sites(tree, sites, &expr) {
                    Ok(())
                } else {
                    Err(missing(name))
                }
            }
            Filler::MainStatement => {
                let at = tree.prepended;
                let statement = ast::expression_statement(tree.push_slot(expr));
                let main = tree
                    .as_program_mut()
                    .and_then(|tu| ast::find_function_mut(tu, "main"))
                    .ok_or_else(|| missing("main"))?;
                ast::prepend_statement(&mut main.statement, at, statement);
                tree.prepended += 1;
                Ok(())
            }
            Filler::Identity => {
                tree.passthrough = Some(expr);
                Ok(())
            }
            Filler::Custom(fill) => fill(tree, expr),
        }
    }
}

fn fill_sites(tree: &mut NodeAst, sites: &[SlotId], expr: &Expr) -> bool {
    sites.iter().all(|id| tree.fill_slot(*id, expr.clone()))
}

/// Whether the node's own tree declares `target`.
pub(crate) fn declares(tree: &mut NodeAst, target: &str) -> bool {
    let mut finder = DeclarationFinder {
        target,
        initializer: None,
        found: false,
    };
    tree.tree_mut().visit_mut(&mut finder);
    finder.found
}

/// Point the declaration of `target` at `value`. Only the node's own tree is
/// searched; slots hold spliced code.
fn set_initializer(tree: &mut NodeAst, target: &str, value: Expr) -> bool {
    let mut finder = DeclarationFinder {
        target,
        initializer: Some(value),
        found: false,
    };
    tree.tree_mut().visit_mut(&mut finder);
    finder.found
}

/// Lift the existing initializer of `target` into a slot.
pub(crate) fn lift_initializer(tree: &mut NodeAst, target: &str) -> Option<SlotId> {
    let mut lifter = InitializerLifter {
        target,
        arena: ast::SlotArena::default(),
        found: None,
    };
    ast::lift(tree, &mut lifter);
    lifter.found
}

struct DeclarationFinder<'a> {
    target: &'a str,
    initializer: Option<Expr>,
    found: bool,
}

impl DeclarationFinder<'_> {
    fn hit(&mut self, initializer: &mut Option<Initializer>) {
        self.found = true;
        if let Some(value) = self.initializer.take() {
            *initializer = Some(Initializer::Simple(Box::new(value)));
        }
    }
}

impl VisitorMut for DeclarationFinder<'_> {
    fn visit_single_declaration(&mut self, d: &mut SingleDeclaration) -> Visit {
        if !self.found && d.name.as_ref().is_some_and(|n| n.0 == self.target) {
            self.hit(&mut d.initializer);
        }
        Visit::Children
    }

    fn visit_single_declaration_no_type(&mut self, d: &mut SingleDeclarationNoType) -> Visit {
        if !self.found && d.ident.ident.0 == self.target {
            self.hit(&mut d.initializer);
        }
        Visit::Children
    }
}

struct InitializerLifter<'a> {
    target: &'a str,
    arena: ast::SlotArena,
    found: Option<SlotId>,
}

impl InitializerLifter<'_> {
    fn hit(&mut self, initializer: &mut Option<Initializer>) {
        if let Some(Initializer::Simple(value)) = initializer {
            self.found = Some(self.arena.lift(value));
        }
    }
}

impl ast::Lift for InitializerLifter<'_> {
    fn arena(&mut self) -> &mut ast::SlotArena {
        &mut self.arena
    }
}

impl VisitorMut for InitializerLifter<'_> {
    fn visit_single_declaration(&mut self, d: &mut SingleDeclaration) -> Visit {
        if self.found.is_none() && d.name.as_ref().is_some_and(|n| n.0 == self.target) {
            self.hit(&mut d.initializer);
        }
        Visit::Children
    }

    fn visit_single_declaration_no_type(&mut self, d: &mut SingleDeclarationNoType) -> Visit {
        if self.found.is_none() && d.ident.ident.0 == self.target {
            self.hit(&mut d.initializer);
        }
        Visit::Children
    }
}
