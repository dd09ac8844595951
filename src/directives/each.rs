//! List rendering - `each="item in collection"` and the attribute-composed
//! `foreach` / `from` / `filter` / `sort` / `limit` form.
//!
//! The loop element becomes a per-item template behind an anchor. Item
//! scopes expose the loop variable plus `$index`, `$first` and `$last`.
//!
//! Reconciliation is positional: when the collection changes, surviving
//! slots are recycled in place (their cells rewritten, bindings re-run
//! through normal reactivity), extra slots are destroyed from the tail and
//! missing ones are cloned and processed at the tail. Items are never
//! re-keyed or re-ordered by identity.
//!
//! `foreach` modifiers compose in a fixed order regardless of attribute
//! order: filter, then sort, then limit. Filter and sort expressions see
//! the loop variable and `$index` as evaluation-scoped locals.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use serde_json::{Map, Value};

use super::{DirectiveHooks, Flow, priority, remove_materialized};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::types::{ContextId, NodeId};
use crate::value::{to_f64, truthy};

#[derive(Default)]
struct LoopMods {
    filter: Option<String>,
    sort: Option<String>,
    limit: Option<String>,
}

struct ItemSlot {
    node: NodeId,
    ctx: ContextId,
}

pub(crate) fn register(engine: &Engine) {
    engine.register_directive(
        "each",
        priority::EACH,
        DirectiveHooks::init_only(|engine, node, inv| {
            let Some((var, source)) = inv.value.split_once(" in ") else {
                engine.diagnose(&EngineError::Expression {
                    text: inv.value.clone(),
                    message: "expected `item in collection`".to_string(),
                });
                return Flow::SkipChildren;
            };
            install_loop(
                engine,
                node,
                var.trim().to_string(),
                source.trim().to_string(),
                LoopMods::default(),
            );
            Flow::SkipChildren
        }),
    );

    engine.register_directive(
        "foreach",
        priority::EACH,
        DirectiveHooks::init_only(|engine, node, inv| {
            let (source, mods) = {
                let dom = engine.dom();
                (
                    dom.attr(node, "from"),
                    LoopMods {
                        filter: dom.attr(node, "filter"),
                        sort: dom.attr(node, "sort"),
                        limit: dom.attr(node, "limit"),
                    },
                )
            };
            let Some(source) = source else {
                engine.diagnose(&EngineError::MissingBindingTarget {
                    directive: "foreach".to_string(),
                    name: "from".to_string(),
                });
                return Flow::SkipChildren;
            };
            install_loop(engine, node, inv.value.trim().to_string(), source, mods);
            Flow::SkipChildren
        }),
    );
}

fn install_loop(engine: &Engine, node: NodeId, var: String, source: String, mods: LoopMods) {
    let anchor = {
        let mut dom = engine.dom_mut();
        let anchor = dom.create_anchor("each");
        dom.replace(node, anchor);
        for name in ["each", "foreach", "from", "filter", "sort", "limit"] {
            dom.remove_attr(node, name);
        }
        anchor
    };
    let owner = engine.find_context(anchor);
    // The detached item template is reachable only from the loop watcher;
    // free it when the owning region goes away.
    engine.on_context_destroy(owner, move |e| {
        let removed = e.dom_mut().remove_subtree(node);
        e.forget_elements(&removed);
    });
    let slots: Rc<RefCell<Vec<ItemSlot>>> = Rc::new(RefCell::new(Vec::new()));
    let key = format!("each\u{1}{source}\u{1}{}", anchor.index());
    engine.watch_keyed(
        owner,
        key,
        Rc::new(move |e: &Engine| {
            if e.dom().node(anchor).is_none() {
                return;
            }
            let items = collect_items(e, owner, &var, &source, &mods);
            sync_slots(e, owner, anchor, node, &var, &items, &slots);
        }),
    );
}

/// Evaluate the collection and apply the modifier pipeline.
fn collect_items(
    e: &Engine,
    owner: ContextId,
    var: &str,
    source: &str,
    mods: &LoopMods,
) -> Vec<Value> {
    let raw = e.evaluate_in(owner, source, None);
    let mut items: Vec<Value> = match raw {
        Value::Array(items) => items,
        Value::Object(map) => map.into_values().collect(),
        // A non-iterable collection renders zero items, not an error.
        _ => Vec::new(),
    };
    if let Some(filter) = &mods.filter {
        let mut kept = Vec::new();
        for (index, item) in items.into_iter().enumerate() {
            let locals = loop_locals(var, &item, index);
            if truthy(&e.evaluate_in(owner, filter, Some(&locals))) {
                kept.push(item);
            }
        }
        items = kept;
    }
    if let Some(sort) = &mods.sort {
        let mut keyed: Vec<(Value, Value)> = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let locals = loop_locals(var, &item, index);
                (e.evaluate_in(owner, sort, Some(&locals)), item)
            })
            .collect();
        keyed.sort_by(|a, b| compare_keys(&a.0, &b.0));
        items = keyed.into_iter().map(|(_, item)| item).collect();
    }
    if let Some(limit) = &mods.limit
        && let Some(n) = to_f64(&e.evaluate_in(owner, limit, None)).filter(|f| *f >= 0.0)
    {
        items.truncate(n as usize);
    }
    items
}

fn loop_locals(var: &str, item: &Value, index: usize) -> Map<String, Value> {
    let mut locals = Map::new();
    locals.insert(var.to_string(), item.clone());
    locals.insert("$index".to_string(), Value::from(index));
    locals
}

fn compare_keys(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => to_f64(a)
            .unwrap_or(0.0)
            .partial_cmp(&to_f64(b).unwrap_or(0.0))
            .unwrap_or(Ordering::Equal),
    }
}

fn sync_slots(
    e: &Engine,
    owner: ContextId,
    anchor: NodeId,
    template: NodeId,
    var: &str,
    items: &[Value],
    slots: &Rc<RefCell<Vec<ItemSlot>>>,
) {
    let len = items.len();
    // Shrink from the tail.
    loop {
        let surplus = {
            let mut slots = slots.borrow_mut();
            if slots.len() > len { slots.pop() } else { None }
        };
        let Some(slot) = surplus else { break };
        remove_materialized(e, slot.node, slot.ctx);
    }
    // Recycle survivors in place. Primitive-equal writes are skipped by the
    // cell layer, so unchanged items do not re-render.
    let existing = slots.borrow().len();
    for index in 0..existing {
        let ctx = slots.borrow()[index].ctx;
        seed_item(e, ctx, var, &items[index], index, len);
    }
    // Materialize the tail, then process the fresh clones with no slot
    // borrow held (processing re-enters the engine).
    let mut fresh = Vec::new();
    for (index, item) in items.iter().enumerate().skip(existing) {
        let reference = slots.borrow().last().map(|s| s.node).unwrap_or(anchor);
        let clone = {
            let mut dom = e.dom_mut();
            let clone = dom.clone_subtree(template);
            dom.insert_after(reference, clone);
            clone
        };
        let ctx = e.create_context(Some(owner), clone);
        seed_item(e, ctx, var, item, index, len);
        slots.borrow_mut().push(ItemSlot { node: clone, ctx });
        fresh.push(clone);
    }
    for clone in fresh {
        e.process_tree(clone);
    }
}

fn seed_item(e: &Engine, ctx: ContextId, var: &str, item: &Value, index: usize, len: usize) {
    e.define_state(ctx, var, item.clone());
    e.define_state(ctx, "$index", Value::from(index));
    e.define_state(ctx, "$first", Value::Bool(index == 0));
    e.define_state(ctx, "$last", Value::Bool(index + 1 == len));
}
