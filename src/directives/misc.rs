//! `ref`, `computed`, `store`, and the companion-attribute markers.
//!
//! Markers (`else-if`, `case`, `slot`, `var`, `from`, ...) are attributes a
//! real directive on another element consumes. They register as no-ops so
//! orphaned occurrences stay inert instead of surfacing as unknown
//! attributes.

use super::{DirectiveHooks, Flow, priority};
use crate::engine::Engine;
use crate::error::EngineError;

const MARKERS: &[&str] = &[
    "else-if", "else", "case", "slot", "var", "from", "filter", "sort", "limit", "expr", "value",
];

pub(crate) fn register(engine: &Engine) {
    engine.register_directive(
        "ref",
        priority::REF,
        DirectiveHooks::init_only(|engine, node, inv| {
            let name = inv.value.clone();
            engine
                .inner()
                .refs
                .borrow_mut()
                .insert(name.clone(), node);
            let ctx = engine.find_context(node);
            // Unregister on teardown unless something re-claimed the name.
            engine.on_context_destroy(ctx, move |e| {
                let mut refs = e.inner().refs.borrow_mut();
                if refs.get(&name) == Some(&node) {
                    refs.remove(&name);
                }
            });
            Flow::Continue
        }),
    );

    engine.register_directive(
        "computed",
        priority::COMPUTED,
        DirectiveHooks::init_only(|engine, node, inv| {
            let Some(expr) = engine.dom().attr(node, "expr") else {
                engine.diagnose(&EngineError::MissingBindingTarget {
                    directive: "computed".to_string(),
                    name: "expr".to_string(),
                });
                return Flow::Continue;
            };
            let ctx = engine.find_context(node);
            engine.define_computed(ctx, &inv.value, &expr);
            Flow::Continue
        }),
    );

    engine.register_directive(
        "store",
        priority::STORE,
        DirectiveHooks::init_only(|engine, node, inv| {
            let Some(expr) = engine.dom().attr(node, "value") else {
                engine.diagnose(&EngineError::MissingBindingTarget {
                    directive: "store".to_string(),
                    name: "value".to_string(),
                });
                return Flow::Continue;
            };
            let ctx = engine.find_context(node);
            let value = engine.evaluate_in(ctx, &expr, None);
            engine.store_set(&inv.value, value);
            Flow::Continue
        }),
    );

    for marker in MARKERS {
        engine.register_directive(
            marker,
            priority::MARKER,
            DirectiveHooks::init_only(|_, _, _| Flow::Continue),
        );
    }
}
