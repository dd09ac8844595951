//! Translation hook and the `t` directive.
//!
//! The engine owns no translation tables. A collaborator implementing
//! [`Translator`] is installed once; `t="key"` bindings render through it
//! and fall back to the key itself when nothing is installed.
//!
//! Reactivity piggybacks on a locale epoch cell: every `t` watcher reads
//! it, and [`Engine::notify_translations`] bumps it, so a locale change
//! re-renders every translated binding without the engine knowing what
//! changed.

use std::rc::Rc;

use serde_json::Value;

use crate::directives::{DirectiveHooks, Flow, priority};
use crate::engine::Engine;
use crate::value::{display, to_f64};

pub trait Translator {
    fn translate(&self, key: &str, params: &Value) -> Value;
}

impl Engine {
    /// Install (or replace) the translator and re-render all `t` bindings.
    pub fn set_translator(&self, translator: Rc<dyn Translator>) {
        *self.inner().translator.borrow_mut() = Some(translator);
        self.notify_translations();
    }

    /// Signal that translations changed (locale switch, table reload).
    pub fn notify_translations(&self) {
        let cell = self.locale_cell();
        let epoch = to_f64(&self.peek_cell(cell)).unwrap_or(0.0) as u64;
        self.write_cell(cell, Value::from(epoch + 1), false);
        self.maybe_flush();
    }
}

pub(crate) fn register(engine: &Engine) {
    engine.register_directive(
        "t",
        priority::I18N,
        DirectiveHooks::init_only(|engine, node, inv| {
            let key = inv.value.clone();
            let ctx = engine.find_context(node);
            let dedup = format!("t\u{1}{key}\u{1}{}", node.index());
            engine.watch_keyed(
                ctx,
                dedup,
                Rc::new(move |e: &Engine| {
                    // The epoch read is the reactive dependency.
                    e.read_cell(e.locale_cell());
                    let translator = e.inner().translator.borrow().clone();
                    let rendered = match translator {
                        Some(translator) => display(&translator.translate(&key, &Value::Null)),
                        None => key.clone(),
                    };
                    if let Some(el) = e.dom_mut().element_mut(node) {
                        el.text = Some(rendered);
                    }
                }),
            );
            Flow::Continue
        }),
    );
}
