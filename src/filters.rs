//! Built-in filter pack for the expression pipe.
//!
//! Filters are pure: previous value in, transformed value out, with the
//! `:`-separated pipe arguments already evaluated. Collaborator filters
//! registered under the same name replace these.

use std::rc::Rc;

use serde_json::Value;

use crate::engine::Engine;
use crate::value::{display, to_f64, truthy};

pub(crate) fn register_builtins(engine: &Engine) {
    engine.register_filter(
        "uppercase",
        Rc::new(|value, _| Value::String(display(value).to_uppercase())),
    );
    engine.register_filter(
        "lowercase",
        Rc::new(|value, _| Value::String(display(value).to_lowercase())),
    );
    engine.register_filter(
        "capitalize",
        Rc::new(|value, _| Value::String(capitalize(&display(value)))),
    );
    engine.register_filter(
        "trim",
        Rc::new(|value, _| Value::String(display(value).trim().to_string())),
    );
    engine.register_filter(
        "length",
        Rc::new(|value, _| match value {
            Value::Array(items) => Value::from(items.len()),
            Value::Object(map) => Value::from(map.len()),
            Value::String(text) => Value::from(text.chars().count()),
            _ => Value::Null,
        }),
    );
    engine.register_filter(
        "default",
        Rc::new(|value, args| {
            if truthy(value) {
                value.clone()
            } else {
                args.first().cloned().unwrap_or(Value::Null)
            }
        }),
    );
    engine.register_filter(
        "number",
        Rc::new(|value, args| {
            let Some(f) = to_f64(value) else {
                return Value::Null;
            };
            let decimals = args
                .first()
                .and_then(to_f64)
                .filter(|d| *d >= 0.0)
                .map(|d| d as usize)
                .unwrap_or(0);
            Value::String(format!("{f:.decimals$}"))
        }),
    );
    engine.register_filter(
        "json",
        Rc::new(|value, _| {
            Value::String(serde_json::to_string(value).unwrap_or_default())
        }),
    );
}

/// Uppercase the first letter of every whitespace-separated word.
fn capitalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for ch in text.chars() {
        if ch.is_whitespace() {
            at_word_start = true;
            out.push(ch);
        } else if at_word_start {
            at_word_start = false;
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capitalize_words() {
        assert_eq!(capitalize("hello cruel world"), "Hello Cruel World");
        assert_eq!(capitalize(""), "");
        assert_eq!(capitalize("x"), "X");
    }
}
