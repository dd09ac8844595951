//! Content and attribute bindings.
//!
//! `bind` writes escaped text content, `bind-html` writes raw markup, and
//! `bind-<attr>` maintains a dynamic attribute. Each installs one watcher
//! keyed by (role, expression, node), so re-processing an element never
//! duplicates subscriptions.

use serde_json::Value;

use super::{DirectiveHooks, Flow, bind_watcher, priority};
use crate::engine::Engine;
use crate::value::display;

pub(crate) fn register(engine: &Engine) {
    engine.register_directive(
        "bind",
        priority::BIND,
        DirectiveHooks::init_only(|engine, node, inv| {
            bind_watcher(engine, node, "bind", &inv.value, |e, node, value| {
                if let Some(el) = e.dom_mut().element_mut(node) {
                    el.text = Some(display(&value));
                }
            });
            Flow::Continue
        }),
    );

    engine.register_directive(
        "bind-html",
        priority::BIND,
        DirectiveHooks::init_only(|engine, node, inv| {
            bind_watcher(engine, node, "bind-html", &inv.value, |e, node, value| {
                if let Some(el) = e.dom_mut().element_mut(node) {
                    el.html = Some(display(&value));
                }
            });
            Flow::Continue
        }),
    );

    engine.register_directive(
        "bind-",
        priority::BIND,
        DirectiveHooks::init_only(|engine, node, inv| {
            let Some(attr) = inv.arg.clone() else {
                return Flow::Continue;
            };
            bind_watcher(engine, node, &inv.attr, &inv.value, move |e, node, value| {
                let mut dom = e.dom_mut();
                let Some(el) = dom.element_mut(node) else { return };
                match value {
                    // Null and false remove; true renders a boolean attribute.
                    Value::Null | Value::Bool(false) => {
                        el.bound_attrs.remove(&attr);
                    }
                    Value::Bool(true) => {
                        el.bound_attrs.insert(attr.clone(), String::new());
                    }
                    other => {
                        el.bound_attrs.insert(attr.clone(), display(&other));
                    }
                }
            });
            Flow::Continue
        }),
    );
}
