//! `model` - two-way form binding.
//!
//! State to widget runs through a normal watcher writing the element's
//! form value. Widget to state is a native `input` listener that coerces
//! the payload and assigns through the resolved target, so host-driven
//! edits flow into the same cell the watcher reads. Checkboxes carry a
//! boolean, everything else a string.

use std::rc::Rc;

use serde_json::Value;

use super::events::Handler;
use super::{DirectiveHooks, Flow, bind_watcher, priority};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::types::EventModifiers;
use crate::value::{display, truthy};

pub(crate) fn register(engine: &Engine) {
    engine.register_directive(
        "model",
        priority::MODEL,
        DirectiveHooks::init_only(|engine, node, inv| {
            let checkbox = engine.dom().attr(node, "type").as_deref() == Some("checkbox");
            bind_watcher(engine, node, "model", &inv.value, move |e, node, value| {
                if let Some(el) = e.dom_mut().element_mut(node) {
                    el.value = if checkbox {
                        Value::Bool(truthy(&value))
                    } else {
                        Value::String(display(&value))
                    };
                }
            });
            let Some(path) = engine.resolve_target(&inv.value) else {
                engine.diagnose(&EngineError::MissingBindingTarget {
                    directive: "model".to_string(),
                    name: inv.value.clone(),
                });
                return Flow::Continue;
            };
            let ctx = engine.find_context(node);
            engine.add_listener(
                node,
                "input".to_string(),
                EventModifiers::empty(),
                None,
                ctx,
                Handler::Native(Rc::new(move |e: &Engine, payload: &Value| {
                    let value = if checkbox {
                        Value::Bool(truthy(payload))
                    } else {
                        Value::String(display(payload))
                    };
                    e.assign_target(ctx, &path, value);
                })),
            );
            Flow::Continue
        }),
    );
}
