//! Binding to the `glsl` crate: parse, generate, tree walks, and mangling.
//!
//! Each node owns its tree exclusively through [`NodeAst`]. Every splice point
//! is lifted into a slot arena when inputs are discovered: the tree keeps a
//! placeholder identifier and the slot keeps the original expression, so
//! filling is an indexed write. Spliced expressions live only in slots and are
//! never searched again.

use std::collections::{BTreeMap, BTreeSet};

use glsl::parser::Parse;
use glsl::syntax::{
    CompoundStatement, Declaration, Expr, ExternalDeclaration, FunIdentifier,
    FunctionDefinition, FunctionParameterDeclarator, FunctionPrototype, Identifier,
    InitDeclaratorList, SimpleStatement, SingleDeclaration, SingleDeclarationNoType, Statement,
    StorageQualifier, TranslationUnit, TypeQualifier, TypeQualifierSpec, TypeSpecifier,
};
use glsl::transpiler::glsl as emit;
use glsl::visitor::{HostMut, Visit, VisitorMut};

use super::error::CompileError;

const SLOT_PREFIX: &str = "frog_splice_";

#[derive(Debug, Clone, PartialEq)]
pub enum ShaderAst {
    Program(TranslationUnit),
    Expression(Expr),
}

impl ShaderAst {
    pub fn visit_mut<V: VisitorMut>(&mut self, visitor: &mut V) {
        match self {
            ShaderAst::Program(tu) => tu.visit_mut(visitor),
            ShaderAst::Expression(e) => e.visit_mut(visitor),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotId(pub usize);

#[derive(Debug, Clone)]
pub struct NodeAst {
    pub(crate) tree: ShaderAst,
    pub(crate) slots: Vec<Expr>,
    /// Statements already prepended to `main`; keeps later ones in edge order.
    pub(crate) prepended: usize,
    /// Set by hard-coded inputs: the node's value becomes this expression verbatim.
    pub(crate) passthrough: Option<Expr>,
    /// Original name -> mangled name, recorded by [`mangle_program`].
    pub(crate) renames: BTreeMap<String, String>,
}

impl NodeAst {
    pub fn new(tree: ShaderAst) -> Self {
        Self {
            tree,
            slots: Vec::new(),
            prepended: 0,
            passthrough: None,
            renames: BTreeMap::new(),
        }
    }

    pub fn program(tu: TranslationUnit) -> Self {
        Self::new(ShaderAst::Program(tu))
    }

    pub fn expression(expr: Expr) -> Self {
        Self::new(ShaderAst::Expression(expr))
    }

    pub fn tree(&self) -> &ShaderAst {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut ShaderAst {
        &mut self.tree
    }

    pub fn as_program(&self) -> Option<&TranslationUnit> {
        match &self.tree {
            ShaderAst::Program(tu) => Some(tu),
            ShaderAst::Expression(_) => None,
        }
    }

    pub fn as_program_mut(&mut self) -> Option<&mut TranslationUnit> {
        match &mut self.tree {
            ShaderAst::Program(tu) => Some(tu),
            ShaderAst::Expression(_) => None,
        }
    }

    /// The name a binding has in the tree now, after any mangling.
    pub fn binding<'a>(&'a self, name: &'a str) -> &'a str {
        self.renames.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn passthrough(&self) -> Option<&Expr> {
        self.passthrough.as_ref()
    }

    /// Walk the tree and every slot.
    pub fn visit_mut<V: VisitorMut>(&mut self, visitor: &mut V) {
        self.tree.visit_mut(visitor);
        for slot in &mut self.slots {
            slot.visit_mut(visitor);
        }
    }

    /// Store `expr` in a new slot and return the placeholder that stands for it.
    pub(crate) fn push_slot(&mut self, expr: Expr) -> Expr {
        let id = SlotId(self.slots.len());
        self.slots.push(expr);
        placeholder(id)
    }

    pub fn fill_slot(&mut self, id: SlotId, expr: Expr) -> bool {
        match self.slots.get_mut(id.0) {
            Some(slot) => {
                *slot = expr;
                true
            }
            None => false,
        }
    }

    /// The tree with every placeholder replaced by its slot contents.
    pub fn resolved(&self) -> ShaderAst {
        let mut tree = self.tree.clone();
        tree.visit_mut(&mut SlotResolver { slots: &self.slots });
        tree
    }

    pub fn resolved_expression(&self) -> Option<Expr> {
        match self.resolved() {
            ShaderAst::Expression(e) => Some(e),
            ShaderAst::Program(_) => None,
        }
    }
}

fn placeholder_name(id: SlotId) -> String {
    format!("{SLOT_PREFIX}{}", id.0)
}

fn placeholder(id: SlotId) -> Expr {
    variable(&placeholder_name(id))
}

fn slot_index(name: &str) -> Option<usize> {
    name.strip_prefix(SLOT_PREFIX)?.parse().ok()
}

struct SlotResolver<'a> {
    slots: &'a [Expr],
}

impl VisitorMut for SlotResolver<'_> {
    fn visit_expr(&mut self, e: &mut Expr) -> Visit {
        if let Expr::Variable(ident) = e {
            if let Some(slot) = slot_index(&ident.0).and_then(|i| self.slots.get(i)) {
                *e = slot.clone();
            }
        }
        // Descend into the substituted expression too; slots nest.
        Visit::Children
    }

    fn visit_function_parameter_declarator(&mut self, p: &mut FunctionParameterDeclarator) -> Visit {
        let slots = self.slots;
        let ident = &mut p.ident.ident;
        if let Some(slot) = slot_index(&ident.0).and_then(|i| slots.get(i)) {
            let mut value = slot.clone();
            value.visit_mut(self);
            ident.0 = generate_expr(&value);
        }
        Visit::Children
    }
}

/// New slots reserved during one lifting walk. They are appended to the
/// node's arena once the walk is over.
#[derive(Debug, Default)]
pub(crate) struct SlotArena {
    base: usize,
    pending: Vec<Expr>,
}

impl SlotArena {
    /// Move `e` into a new slot, leaving its placeholder behind.
    pub(crate) fn lift(&mut self, e: &mut Expr) -> SlotId {
        let id = SlotId(self.base + self.pending.len());
        let original = std::mem::replace(e, placeholder(id));
        self.pending.push(original);
        id
    }

    /// Store `expr` in a new slot with no site in the tree yet.
    pub(crate) fn hold(&mut self, expr: Expr) -> SlotId {
        let id = SlotId(self.base + self.pending.len());
        self.pending.push(expr);
        id
    }

    pub(crate) fn get_mut(&mut self, id: SlotId) -> Option<&mut Expr> {
        let index = id.0.checked_sub(self.base)?;
        self.pending.get_mut(index)
    }
}

/// A visitor that lifts splice points out of a tree into slots.
pub(crate) trait Lift: VisitorMut {
    fn arena(&mut self) -> &mut SlotArena;
}

/// Run `lifter` over the tree and over every slot that already exists.
pub(crate) fn lift<L: Lift>(ast: &mut NodeAst, lifter: &mut L) {
    *lifter.arena() = SlotArena {
        base: ast.slots.len(),
        pending: Vec::new(),
    };
    ast.tree.visit_mut(lifter);
    for slot in ast.slots.iter_mut() {
        slot.visit_mut(lifter);
    }
    ast.slots.append(&mut lifter.arena().pending);
}

pub fn parse_program(node_id: &str, text: &str) -> Result<TranslationUnit, CompileError> {
    TranslationUnit::parse(text).map_err(|e| CompileError::Parse {
        node_id: node_id.to_string(),
        message: format!("{e:?}"),
    })
}

pub fn parse_expression(node_id: &str, text: &str) -> Result<Expr, CompileError> {
    Expr::parse(text.trim()).map_err(|e| CompileError::Parse {
        node_id: node_id.to_string(),
        message: format!("{e:?}"),
    })
}

pub fn parse_statement(node_id: &str, text: &str) -> Result<Statement, CompileError> {
    Statement::parse(text).map_err(|e| CompileError::Parse {
        node_id: node_id.to_string(),
        message: format!("{e:?}"),
    })
}

pub fn generate(tu: &TranslationUnit) -> String {
    let mut out = String::new();
    let _ = emit::show_translation_unit(&mut out, tu);
    out
}

pub fn generate_expr(expr: &Expr) -> String {
    let mut out = String::new();
    let _ = emit::show_expr(&mut out, expr);
    out
}

pub fn generate_external_declaration(decl: &ExternalDeclaration) -> String {
    let mut out = String::new();
    let _ = emit::show_external_declaration(&mut out, decl);
    out
}

pub fn generate_type_specifier(ty: &TypeSpecifier) -> String {
    let mut out = String::new();
    let _ = emit::show_type_specifier(&mut out, ty);
    out
}

pub fn identifier(name: &str) -> Identifier {
    Identifier(name.to_string())
}

pub fn variable(name: &str) -> Expr {
    Expr::Variable(identifier(name))
}

pub fn call(name: &str, args: Vec<Expr>) -> Expr {
    Expr::FunCall(FunIdentifier::Identifier(identifier(name)), args)
}

pub fn expression_statement(expr: Expr) -> Statement {
    Statement::Simple(Box::new(SimpleStatement::Expression(Some(expr))))
}

pub fn has_storage(qualifier: &Option<TypeQualifier>, storage: &StorageQualifier) -> bool {
    qualifier.as_ref().is_some_and(|q| {
        q.qualifiers
            .0
            .iter()
            .any(|spec| matches!(spec, TypeQualifierSpec::Storage(s) if s == storage))
    })
}

pub fn declarator_names(list: &InitDeclaratorList) -> Vec<String> {
    list.head
        .name
        .iter()
        .map(|n| n.0.clone())
        .chain(list.tail.iter().map(|t| t.ident.ident.0.clone()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    NotFound,
    /// Other names remain on the declaration line.
    Declarator,
    /// The declaration had no other names and should be dropped entirely.
    Whole,
}

/// Remove one declared name from a declaration line, keeping its siblings.
pub fn remove_declarator(list: &mut InitDeclaratorList, name: &str) -> Removal {
    if list.head.name.as_ref().is_some_and(|n| n.0 == name) {
        if list.tail.is_empty() {
            return Removal::Whole;
        }
        let next = list.tail.remove(0);
        list.head.name = Some(next.ident.ident);
        list.head.array_specifier = next.ident.array_spec;
        list.head.initializer = next.initializer;
        return Removal::Declarator;
    }
    match list.tail.iter().position(|t| t.ident.ident.0 == name) {
        Some(i) => {
            list.tail.remove(i);
            Removal::Declarator
        }
        None => Removal::NotFound,
    }
}

/// Remove `name` from whichever top-level declaration declares it.
pub fn remove_global_declaration(
    tu: &mut TranslationUnit,
    name: &str,
    keep: impl Fn(&InitDeclaratorList) -> bool,
) -> bool {
    let decls = &mut tu.0 .0;
    for i in 0..decls.len() {
        let ExternalDeclaration::Declaration(Declaration::InitDeclaratorList(list)) = &mut decls[i]
        else {
            continue;
        };
        if !keep(&*list) {
            continue;
        }
        match remove_declarator(list, name) {
            Removal::NotFound => continue,
            Removal::Declarator => return true,
            Removal::Whole => {
                decls.remove(i);
                return true;
            }
        }
    }
    false
}

pub fn find_function_mut<'a>(
    tu: &'a mut TranslationUnit,
    name: &str,
) -> Option<&'a mut FunctionDefinition> {
    tu.0 .0.iter_mut().find_map(|decl| match decl {
        ExternalDeclaration::FunctionDefinition(def) if def.prototype.name.0 == name => Some(def),
        _ => None,
    })
}

pub fn prepend_statement(body: &mut CompoundStatement, index: usize, stmt: Statement) {
    let at = index.min(body.statement_list.len());
    body.statement_list.insert(at, stmt);
}

/// Names bound at the top level: global variables and functions.
pub fn global_names(tu: &TranslationUnit) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for decl in tu.0 .0.iter() {
        match decl {
            ExternalDeclaration::Declaration(Declaration::InitDeclaratorList(list)) => {
                names.extend(declarator_names(list));
            }
            ExternalDeclaration::Declaration(Declaration::FunctionPrototype(proto)) => {
                names.insert(proto.name.0.clone());
            }
            ExternalDeclaration::FunctionDefinition(def) => {
                names.insert(def.prototype.name.0.clone());
            }
            _ => {}
        }
    }
    names
}

pub fn mangle_name(name: &str, suffix: &str) -> String {
    format!("{name}_{suffix}")
}

pub fn is_builtin(name: &str) -> bool {
    name.starts_with("gl_")
}

/// Suffix every global binding with `suffix`, except builtins and `preserve`.
/// Returns the rename map that was applied.
pub fn mangle_program(
    ast: &mut NodeAst,
    suffix: &str,
    preserve: &BTreeSet<String>,
) -> BTreeMap<String, String> {
    let Some(tu) = ast.as_program() else {
        return BTreeMap::new();
    };
    let renames: BTreeMap<String, String> = global_names(tu)
        .into_iter()
        .filter(|n| !is_builtin(n) && !preserve.contains(n))
        .map(|n| {
            let mangled = mangle_name(&n, suffix);
            (n, mangled)
        })
        .collect();
    rename_bindings(ast, &renames);
    ast.renames.extend(renames.clone());
    renames
}

/// Rename declarations, references, and function names according to `renames`.
pub fn rename_bindings(ast: &mut NodeAst, renames: &BTreeMap<String, String>) {
    if renames.is_empty() {
        return;
    }
    ast.visit_mut(&mut Renamer { renames });
}

struct Renamer<'a> {
    renames: &'a BTreeMap<String, String>,
}

impl Renamer<'_> {
    fn rename(&self, ident: &mut Identifier) {
        if let Some(to) = self.renames.get(&ident.0) {
            ident.0 = to.clone();
        }
    }
}

impl VisitorMut for Renamer<'_> {
    fn visit_expr(&mut self, e: &mut Expr) -> Visit {
        match e {
            Expr::Variable(ident) => self.rename(ident),
            Expr::FunCall(FunIdentifier::Identifier(ident), _) => self.rename(ident),
            _ => {}
        }
        Visit::Children
    }

    fn visit_single_declaration(&mut self, d: &mut SingleDeclaration) -> Visit {
        if let Some(name) = d.name.as_mut() {
            self.rename(name);
        }
        Visit::Children
    }

    fn visit_single_declaration_no_type(&mut self, d: &mut SingleDeclarationNoType) -> Visit {
        self.rename(&mut d.ident.ident);
        Visit::Children
    }

    fn visit_function_prototype(&mut self, p: &mut FunctionPrototype) -> Visit {
        self.rename(&mut p.name);
        Visit::Children
    }

    fn visit_function_parameter_declarator(&mut self, p: &mut FunctionParameterDeclarator) -> Visit {
        self.rename(&mut p.ident.ident);
        Visit::Children
    }
}

/// Replace every plain reference to a name accepted by `matches` with `replacement`.
/// Returns the number of references replaced.
pub fn replace_references(
    ast: &mut NodeAst,
    matches: impl Fn(&str) -> bool,
    replacement: &Expr,
) -> usize {
    let mut replacer = ReferenceReplacer {
        matches,
        replacement,
        count: 0,
    };
    ast.visit_mut(&mut replacer);
    replacer.count
}

struct ReferenceReplacer<'a, F> {
    matches: F,
    replacement: &'a Expr,
    count: usize,
}

impl<F: Fn(&str) -> bool> VisitorMut for ReferenceReplacer<'_, F> {
    fn visit_expr(&mut self, e: &mut Expr) -> Visit {
        if let Expr::Variable(ident) = e {
            if (self.matches)(&ident.0) {
                *e = self.replacement.clone();
                self.count += 1;
                return Visit::Parent;
            }
        }
        Visit::Children
    }
}

/// Lift every reference accepted by `matches` into its own slot, returning
/// each site with the name it referred to, in tree order. Plain targets of an
/// assignment stay in place. With `parameters`, matching function parameter
/// declarators are lifted as well; they resolve to the text of their slot.
pub fn lift_references(
    ast: &mut NodeAst,
    matches: impl Fn(&str) -> bool,
    parameters: bool,
) -> Vec<(SlotId, String)> {
    let mut lifter = ReferenceLifter {
        matches,
        parameters,
        arena: SlotArena::default(),
        found: Vec::new(),
    };
    lift(ast, &mut lifter);
    lifter.found
}

struct ReferenceLifter<F> {
    matches: F,
    parameters: bool,
    arena: SlotArena,
    found: Vec<(SlotId, String)>,
}

impl<F: Fn(&str) -> bool> Lift for ReferenceLifter<F> {
    fn arena(&mut self) -> &mut SlotArena {
        &mut self.arena
    }
}

impl<F: Fn(&str) -> bool> VisitorMut for ReferenceLifter<F> {
    fn visit_expr(&mut self, e: &mut Expr) -> Visit {
        if let Expr::Assignment(lhs, _, rhs) = e {
            if matches!(**lhs, Expr::Variable(_)) {
                rhs.visit_mut(self);
                return Visit::Parent;
            }
            return Visit::Children;
        }
        let name = match e {
            Expr::Variable(ident) if slot_index(&ident.0).is_none() && (self.matches)(&ident.0) => {
                ident.0.clone()
            }
            _ => return Visit::Children,
        };
        let id = self.arena.lift(e);
        self.found.push((id, name));
        Visit::Parent
    }

    fn visit_function_parameter_declarator(&mut self, p: &mut FunctionParameterDeclarator) -> Visit {
        let ident = &mut p.ident.ident;
        if self.parameters && slot_index(&ident.0).is_none() && (self.matches)(&ident.0) {
            let name = std::mem::take(&mut ident.0);
            let id = self.arena.hold(variable(&name));
            ident.0 = placeholder_name(id);
            self.found.push((id, name));
        }
        Visit::Children
    }
}

/// Lift the right-hand side of the first plain assignment to `target`.
pub fn lift_assignment(ast: &mut NodeAst, target: &str) -> Option<SlotId> {
    let mut lifter = AssignmentLifter {
        target,
        arena: SlotArena::default(),
        found: None,
    };
    lift(ast, &mut lifter);
    lifter.found
}

struct AssignmentLifter<'a> {
    target: &'a str,
    arena: SlotArena,
    found: Option<SlotId>,
}

impl Lift for AssignmentLifter<'_> {
    fn arena(&mut self) -> &mut SlotArena {
        &mut self.arena
    }
}

impl VisitorMut for AssignmentLifter<'_> {
    fn visit_expr(&mut self, e: &mut Expr) -> Visit {
        if self.found.is_some() {
            return Visit::Parent;
        }
        if let Expr::Assignment(lhs, _, rhs) = e {
            if matches!(&**lhs, Expr::Variable(ident) if ident.0 == self.target) {
                self.found = Some(self.arena.lift(rhs));
                return Visit::Parent;
            }
        }
        Visit::Children
    }
}
