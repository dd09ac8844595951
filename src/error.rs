//! Error taxonomy and the diagnostic channel payload.
//!
//! Engine errors are almost never propagated to the caller: a broken binding
//! renders as empty content, a missing template leaves its directive inert,
//! and tree processing always continues past a failing directive. Errors
//! surface through `tracing` and, when debug mode is on, through the
//! engine's diagnostic subscribers.

use thiserror::Error;

/// Everything that can go wrong inside the engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Malformed or disallowed expression text. Caught at evaluation time,
    /// the binding yields `Null`.
    #[error("expression error in `{text}`: {message}")]
    Expression { text: String, message: String },

    /// Markup that the strict-subset parser cannot understand.
    #[error("markup parse error at byte {offset}: {message}")]
    Markup { offset: usize, message: String },

    /// A directive referenced a template, store entry or ref that does not
    /// exist. The directive becomes inert.
    #[error("{directive}: missing binding target `{name}`")]
    MissingBindingTarget { directive: String, name: String },

    /// Two equal-priority directives wrote the same presentation target.
    /// The later-applied one wins; this is only reported in debug mode.
    #[error("directive conflict on `{target}`: `{winner}` overrides `{loser}`")]
    DirectiveConflict {
        target: String,
        winner: String,
        loser: String,
    },

    /// A remote template failed to load. The template id stays unresolved
    /// and every reference to it reports `MissingBindingTarget`.
    #[error("template `{id}` failed to load: {message}")]
    TemplateLoad { id: String, message: String },

    /// Unknown filter in a pipe expression. The value passes through
    /// unchanged.
    #[error("unknown filter `{name}`")]
    UnknownFilter { name: String },
}

impl EngineError {
    /// Short stable tag for diagnostic subscribers.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Expression { .. } => "expression",
            EngineError::Markup { .. } => "markup",
            EngineError::MissingBindingTarget { .. } => "missing-target",
            EngineError::DirectiveConflict { .. } => "conflict",
            EngineError::TemplateLoad { .. } => "template-load",
            EngineError::UnknownFilter { .. } => "unknown-filter",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::Expression {
            text: "a +".into(),
            message: "unexpected end of input".into(),
        };
        assert_eq!(
            err.to_string(),
            "expression error in `a +`: unexpected end of input"
        );
        assert_eq!(err.kind(), "expression");
    }
}
