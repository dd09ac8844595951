//! `state` - declares a context on its element.
//!
//! The attribute value is an object literal evaluated once, in the outer
//! scope, at init. Each entry seeds one reactive cell of own state. An
//! empty value declares an empty scope boundary.

use serde_json::{Map, Value};

use super::{DirectiveHooks, Flow, priority};
use crate::engine::Engine;
use crate::error::EngineError;

pub(crate) fn register(engine: &Engine) {
    engine.register_directive(
        "state",
        priority::STATE,
        DirectiveHooks::init_only(|engine, node, inv| {
            // For a materialized clone the branch/item context is already
            // mapped to this element and becomes the parent.
            let outer = engine.find_context(node);
            let initial = if inv.value.trim().is_empty() {
                Value::Object(Map::new())
            } else {
                engine.evaluate_in(outer, &inv.value, None)
            };
            let ctx = engine.create_context(Some(outer), node);
            match initial {
                Value::Object(map) => {
                    for (name, value) in map {
                        engine.define_state(ctx, &name, value);
                    }
                }
                Value::Null => {}
                _ => engine.diagnose(&EngineError::Expression {
                    text: inv.value.clone(),
                    message: "state expects an object literal".to_string(),
                }),
            }
            Flow::Continue
        }),
    );
}
