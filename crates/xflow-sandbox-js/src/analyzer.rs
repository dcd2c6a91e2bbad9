//! Compile-time structural analysis of component source.
//!
//! Rejects raw syntax that reads or writes a reflective attribute, so the only
//! route to those names is the interposed `getattr`/`hasattr`, which always
//! denies them. Also records literal `require("...")` targets and top-level
//! candidate names for the loader.

use std::collections::BTreeSet;
use std::ops::ControlFlow;

use boa_engine::ast::expression::access::{PropertyAccess, PropertyAccessField};
use boa_engine::ast::expression::literal::Literal;
use boa_engine::ast::expression::{Call, Expression, Identifier, ImportCall};
use boa_engine::ast::scope::Scope;
use boa_engine::ast::visitor::{VisitWith, Visitor};
use boa_engine::ast::Script;
use boa_engine::interner::{Interner, Sym};
use boa_engine::parser::{Parser, Source};

use xflow_types::{
    is_dangerous_attribute, CodeAnalysisResult, CodeViolation, SandboxError, ViolationKind,
};

/// Name of the interposed module-resolution hook.
pub const REQUIRE_HOOK: &str = "require";

#[derive(Debug, Default, Clone, Copy)]
pub struct ComponentAnalyzer;

impl ComponentAnalyzer {
    pub fn analyze(&self, code: &str) -> Result<CodeAnalysisResult, SandboxError> {
        let mut interner = Interner::default();
        let mut parser = Parser::new(Source::from_bytes(code));
        let script = parser
            .parse_script(&Scope::new_global(), &mut interner)
            .map_err(|e| SandboxError::CompilationError(e.to_string()))?;
        Ok(self.analyze_script(&script, &interner))
    }

    fn analyze_script(&self, script: &Script, interner: &Interner) -> CodeAnalysisResult {
        let mut visitor = StructureVisitor::new(interner);
        let _ = visitor.visit_script(script);
        CodeAnalysisResult {
            is_safe: visitor.violations.is_empty(),
            violations: visitor.violations,
            static_imports: visitor.static_imports.into_iter().collect(),
            candidate_names: visitor.names.into_iter().collect(),
        }
    }
}

struct StructureVisitor<'a> {
    interner: &'a Interner,
    violations: Vec<CodeViolation>,
    static_imports: BTreeSet<String>,
    names: BTreeSet<String>,
}

impl<'a> StructureVisitor<'a> {
    fn new(interner: &'a Interner) -> Self {
        Self {
            interner,
            violations: Vec::new(),
            static_imports: BTreeSet::new(),
            names: BTreeSet::new(),
        }
    }

    fn resolve(&self, sym: Sym) -> Option<String> {
        self.interner.resolve(sym).map(|s| s.to_string())
    }

    fn push_violation(&mut self, kind: ViolationKind, description: impl Into<String>) {
        self.violations.push(CodeViolation {
            kind,
            description: description.into(),
        });
    }

    fn check_attribute(&mut self, name: &str, raw_syntax: bool) {
        if is_dangerous_attribute(name) {
            let description = if raw_syntax {
                format!("direct access to reflective attribute '{name}'")
            } else {
                format!("string literal naming reflective attribute '{name}'")
            };
            self.push_violation(ViolationKind::ReflectiveAttribute, description);
        }
    }

    fn is_require(&self, expr: &Expression) -> bool {
        match expr {
            Expression::Identifier(id) => self
                .resolve(id.sym())
                .map(|name| name == REQUIRE_HOOK)
                .unwrap_or(false),
            _ => false,
        }
    }
}

impl<'ast> Visitor<'ast> for StructureVisitor<'_> {
    type BreakTy = ();

    fn visit_identifier(&mut self, node: &'ast Identifier) -> ControlFlow<Self::BreakTy> {
        if let Some(name) = self.resolve(node.sym()) {
            self.names.insert(name);
        }
        ControlFlow::Continue(())
    }

    fn visit_call(&mut self, node: &'ast Call) -> ControlFlow<Self::BreakTy> {
        if self.is_require(node.function()) {
            if let Some(Expression::Literal(Literal::String(sym))) = node.args().first() {
                if let Some(module) = self.resolve(*sym) {
                    self.static_imports.insert(module);
                }
            }
        }
        node.visit_with(self)
    }

    fn visit_property_access(&mut self, node: &'ast PropertyAccess) -> ControlFlow<Self::BreakTy> {
        if let PropertyAccess::Simple(simple) = node {
            if let PropertyAccessField::Const(sym) = simple.field() {
                if let Some(name) = self.resolve(*sym) {
                    self.check_attribute(&name, true);
                }
            }
        }
        node.visit_with(self)
    }

    fn visit_literal(&mut self, node: &'ast Literal) -> ControlFlow<Self::BreakTy> {
        if let Literal::String(sym) = node {
            if let Some(value) = self.resolve(*sym) {
                self.check_attribute(&value, false);
            }
        }
        ControlFlow::Continue(())
    }

    fn visit_import_call(&mut self, _node: &'ast ImportCall) -> ControlFlow<Self::BreakTy> {
        self.push_violation(ViolationKind::DynamicImport, "dynamic import()");
        ControlFlow::Continue(())
    }
}
