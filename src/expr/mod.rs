//! Expression engine - lexer, parser, evaluator and the per-text cache.
//!
//! Attribute values are expressions in a closed, non-escaping subset:
//! scope identifiers, member access, literals, arithmetic, comparison,
//! logical operators, ternary, increment/decrement, assignment, and the
//! filter pipe. There is no call syntax and no path to the host
//! environment beyond the supplied scope.
//!
//! Each unique expression text is parsed exactly once and cached by text
//! identity on the engine; the compiled form is then evaluated against
//! whatever scope is passed.

pub(crate) mod eval;
mod lexer;
mod parser;

pub use parser::{BinaryOp, Expr, FilterCall, LogicOp, PathExpr, UnaryOp};

use std::rc::Rc;

use serde_json::{Map, Value};

use crate::context::Scope;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::types::ContextId;

impl Engine {
    /// Fetch the compiled form of `text`, parsing and caching on first use.
    /// Parse failures are cached as well and diagnosed once.
    pub(crate) fn compile(&self, text: &str) -> Rc<Result<Expr, String>> {
        if let Some(cached) = self.inner().exprs.borrow().get(text) {
            return cached.clone();
        }
        let compiled = Rc::new(parser::parse(text));
        if let Err(message) = compiled.as_ref() {
            self.diagnose(&EngineError::Expression {
                text: text.to_string(),
                message: message.clone(),
            });
        }
        self.inner()
            .exprs
            .borrow_mut()
            .insert(text.to_string(), compiled.clone());
        compiled
    }

    /// Evaluate expression text in a context. Malformed text yields `Null`;
    /// a single bad binding never aborts tree processing.
    pub fn evaluate_in(
        &self,
        ctx: ContextId,
        text: &str,
        locals: Option<&Map<String, Value>>,
    ) -> Value {
        let compiled = self.compile(text);
        let Ok(expr) = compiled.as_ref() else {
            return Value::Null;
        };
        let scope = match locals {
            Some(locals) => Scope::with_locals(self, ctx, locals),
            None => Scope::new(self, ctx),
        };
        eval::evaluate(expr, &scope)
    }

    /// Resolve expression text to an assignable target: the whole text must
    /// be a bare name or member path (`model`, two-way bindings).
    pub(crate) fn resolve_target(&self, text: &str) -> Option<PathExpr> {
        let compiled = self.compile(text);
        match compiled.as_ref() {
            Ok(expr) => path_of(expr),
            Err(_) => None,
        }
    }

    /// Assign a value through a resolved target in `ctx`.
    pub(crate) fn assign_target(&self, ctx: ContextId, path: &PathExpr, value: Value) {
        let scope = Scope::new(self, ctx);
        let keys = crate::context::resolve_keys(&scope, path);
        scope.assign(&path.root, &keys, value);
    }
}

fn path_of(expr: &Expr) -> Option<PathExpr> {
    match expr {
        Expr::Ident(name) => Some(PathExpr {
            root: name.clone(),
            segments: Vec::new(),
        }),
        Expr::Member(base, key) => {
            let mut path = path_of(base)?;
            path.segments.push((**key).clone());
            Some(path)
        }
        _ => None,
    }
}
