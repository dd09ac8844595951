//! Dynamic classes and inline styles.
//!
//! Whole-map forms (`class`, `style`) diff against what they previously
//! applied, so static classes and entries written by the single-target
//! forms (`class-<name>`, `style-<prop>`) survive updates.
//!
//! `class` accepts an object (truthy values toggle keys on), a
//! whitespace-separated string, or an array of names. `style` accepts an
//! object of properties or `prop: value; ...` text. `Null` or empty values
//! clear a property.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use serde_json::Value;

use super::{DirectiveHooks, Flow, bind_watcher, priority};
use crate::engine::Engine;
use crate::value::{display, truthy};

pub(crate) fn register(engine: &Engine) {
    engine.register_directive(
        "class",
        priority::CLASS,
        DirectiveHooks::init_only(|engine, node, inv| {
            let previous: Rc<RefCell<BTreeSet<String>>> = Rc::new(RefCell::new(BTreeSet::new()));
            bind_watcher(engine, node, "class", &inv.value, move |e, node, value| {
                let next = class_set(&value);
                let mut dom = e.dom_mut();
                let Some(el) = dom.element_mut(node) else { return };
                let mut previous = previous.borrow_mut();
                for old in previous.iter() {
                    if !next.contains(old) {
                        el.classes.remove(old);
                    }
                }
                for name in &next {
                    el.classes.insert(name.clone());
                }
                *previous = next;
            });
            Flow::Continue
        }),
    );

    engine.register_directive(
        "class-",
        priority::CLASS,
        DirectiveHooks::init_only(|engine, node, inv| {
            let Some(name) = inv.arg.clone() else {
                return Flow::Continue;
            };
            bind_watcher(engine, node, &inv.attr, &inv.value, move |e, node, value| {
                if let Some(el) = e.dom_mut().element_mut(node) {
                    if truthy(&value) {
                        el.classes.insert(name.clone());
                    } else {
                        el.classes.remove(&name);
                    }
                }
            });
            Flow::Continue
        }),
    );

    engine.register_directive(
        "style",
        priority::STYLE,
        DirectiveHooks::init_only(|engine, node, inv| {
            let previous: Rc<RefCell<BTreeSet<String>>> = Rc::new(RefCell::new(BTreeSet::new()));
            bind_watcher(engine, node, "style", &inv.value, move |e, node, value| {
                let next = style_map(&value);
                let mut dom = e.dom_mut();
                let Some(el) = dom.element_mut(node) else { return };
                let mut previous = previous.borrow_mut();
                for old in previous.iter() {
                    if !next.contains_key(old) {
                        el.styles.remove(old);
                    }
                }
                for (prop, value) in &next {
                    el.styles.insert(prop.clone(), value.clone());
                }
                *previous = next.into_keys().collect();
            });
            Flow::Continue
        }),
    );

    engine.register_directive(
        "style-",
        priority::STYLE,
        DirectiveHooks::init_only(|engine, node, inv| {
            let Some(prop) = inv.arg.clone() else {
                return Flow::Continue;
            };
            bind_watcher(engine, node, &inv.attr, &inv.value, move |e, node, value| {
                if let Some(el) = e.dom_mut().element_mut(node) {
                    let rendered = display(&value);
                    if rendered.is_empty() {
                        el.styles.remove(&prop);
                    } else {
                        el.styles.insert(prop.clone(), rendered);
                    }
                }
            });
            Flow::Continue
        }),
    );
}

fn class_set(value: &Value) -> BTreeSet<String> {
    match value {
        Value::Object(map) => map
            .iter()
            .filter(|(_, v)| truthy(v))
            .map(|(k, _)| k.clone())
            .collect(),
        Value::String(text) => text.split_whitespace().map(str::to_string).collect(),
        Value::Array(items) => items
            .iter()
            .map(display)
            .filter(|s| !s.is_empty())
            .collect(),
        _ => BTreeSet::new(),
    }
}

fn style_map(value: &Value) -> BTreeMap<String, String> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(prop, v)| (prop.clone(), display(v)))
            .filter(|(_, v)| !v.is_empty())
            .collect(),
        Value::String(text) => text
            .split(';')
            .filter_map(|pair| pair.split_once(':'))
            .map(|(prop, v)| (prop.trim().to_string(), v.trim().to_string()))
            .filter(|(prop, v)| !prop.is_empty() && !v.is_empty())
            .collect(),
        _ => BTreeMap::new(),
    }
}
