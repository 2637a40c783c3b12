//! Categorized top-level declarations and their assembly into one program.

use std::collections::HashSet;

use glsl::syntax::{
    Declaration, ExternalDeclaration, NonEmpty, Preprocessor, StorageQualifier, TranslationUnit,
};
use tracing::warn;

use super::ast::{self, Removal};
use crate::dsl::ShaderStage;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShaderSections {
    pub version: Vec<ExternalDeclaration>,
    pub precision: Vec<ExternalDeclaration>,
    pub preprocessor: Vec<ExternalDeclaration>,
    pub in_statements: Vec<ExternalDeclaration>,
    pub out_statements: Vec<ExternalDeclaration>,
    pub uniforms: Vec<ExternalDeclaration>,
    /// Functions and every other global, in source order.
    pub program: Vec<ExternalDeclaration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Version,
    Precision,
    Preprocessor,
    In,
    Out,
    Uniform,
    Program,
}

fn classify(decl: &ExternalDeclaration, stage: ShaderStage) -> Section {
    match decl {
        ExternalDeclaration::Preprocessor(Preprocessor::Version(_)) => Section::Version,
        ExternalDeclaration::Preprocessor(_) => Section::Preprocessor,
        ExternalDeclaration::Declaration(Declaration::Precision(..)) => Section::Precision,
        ExternalDeclaration::Declaration(Declaration::InitDeclaratorList(list)) => {
            let q = &list.head.ty.qualifier;
            if ast::has_storage(q, &StorageQualifier::Uniform) {
                Section::Uniform
            } else if ast::has_storage(q, &StorageQualifier::In)
                || ast::has_storage(q, &StorageQualifier::Attribute)
            {
                Section::In
            } else if ast::has_storage(q, &StorageQualifier::Out) {
                Section::Out
            } else if ast::has_storage(q, &StorageQualifier::Varying) {
                match stage {
                    ShaderStage::Vertex => Section::Out,
                    ShaderStage::Fragment => Section::In,
                }
            } else {
                Section::Program
            }
        }
        _ => Section::Program,
    }
}

/// Split a program's top-level declarations into sections, keeping source order.
pub fn find_shader_sections(tu: &TranslationUnit, stage: ShaderStage) -> ShaderSections {
    let mut sections = ShaderSections::default();
    for decl in tu.0 .0.iter() {
        let bucket = match classify(decl, stage) {
            Section::Version => &mut sections.version,
            Section::Precision => &mut sections.precision,
            Section::Preprocessor => &mut sections.preprocessor,
            Section::In => &mut sections.in_statements,
            Section::Out => &mut sections.out_statements,
            Section::Uniform => &mut sections.uniforms,
            Section::Program => &mut sections.program,
        };
        bucket.push(decl.clone());
    }
    sections
}

/// `a` then `b`, category by category. No deduplication happens here.
pub fn merge(a: ShaderSections, b: ShaderSections) -> ShaderSections {
    fn cat(mut a: Vec<ExternalDeclaration>, b: Vec<ExternalDeclaration>) -> Vec<ExternalDeclaration> {
        a.extend(b);
        a
    }
    ShaderSections {
        version: cat(a.version, b.version),
        precision: cat(a.precision, b.precision),
        preprocessor: cat(a.preprocessor, b.preprocessor),
        in_statements: cat(a.in_statements, b.in_statements),
        out_statements: cat(a.out_statements, b.out_statements),
        uniforms: cat(a.uniforms, b.uniforms),
        program: cat(a.program, b.program),
    }
}

impl ShaderSections {
    pub fn is_empty(&self) -> bool {
        self.version.is_empty()
            && self.precision.is_empty()
            && self.preprocessor.is_empty()
            && self.in_statements.is_empty()
            && self.out_statements.is_empty()
            && self.uniforms.is_empty()
            && self.program.is_empty()
    }

    pub fn merge(self, other: ShaderSections) -> ShaderSections {
        merge(self, other)
    }

    /// Every declaration in emission order, with the repeats that preserved
    /// (unmangled) identifiers produce removed.
    pub fn declarations(&self) -> Vec<ExternalDeclaration> {
        let mut out = Vec::new();
        out.extend(self.version.iter().take(1).cloned());

        let mut seen_precision: HashSet<String> = HashSet::new();
        out.extend(
            self.precision
                .iter()
                .filter(|d| seen_precision.insert(ast::generate_external_declaration(d)))
                .cloned(),
        );

        out.extend(self.preprocessor.iter().cloned());
        for group in [&self.in_statements, &self.out_statements, &self.uniforms] {
            out.extend(dedupe_by_name(group));
        }
        out.extend(self.program.iter().cloned());
        out
    }

    pub fn to_program(&self) -> Option<TranslationUnit> {
        NonEmpty::from_non_empty_iter(self.declarations()).map(TranslationUnit)
    }

    /// Program text via the external generator; empty when there is nothing to emit.
    pub fn generate(&self) -> String {
        self.to_program()
            .map(|tu| ast::generate(&tu))
            .unwrap_or_default()
    }
}

fn dedupe_by_name(decls: &[ExternalDeclaration]) -> Vec<ExternalDeclaration> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(decls.len());
    for decl in decls {
        let ExternalDeclaration::Declaration(Declaration::InitDeclaratorList(list)) = decl else {
            out.push(decl.clone());
            continue;
        };
        let mut list = list.clone();
        let mut whole = false;
        for name in ast::declarator_names(&list) {
            if seen.insert(name.clone()) {
                continue;
            }
            warn!(%name, "dropping repeated global declaration");
            if ast::remove_declarator(&mut list, &name) == Removal::Whole {
                whole = true;
                break;
            }
        }
        if !whole {
            out.push(ExternalDeclaration::Declaration(Declaration::InitDeclaratorList(list)));
        }
    }
    out
}
