//! Context (scope) tree.
//!
//! One context per state-bearing element, linked parent to child mirroring
//! the document. A context owns its cells, computed values and watchers -
//! and nothing else. The element association is a non-owning id
//! back-reference; the dom arena owns structure.
//!
//! Name resolution walks from the nearest context to the root. Child keys
//! shadow parent keys; a miss resolves to `Null`, never an error, so
//! templates degrade gracefully on typos.
//!
//! # Destruction
//!
//! `destroy_context` is exhaustive, bottom-up and idempotent: children
//! first, then cleanups (listeners, timers, materialized clones), then
//! watchers, then cells. A watcher that was queued when its context died is
//! a silent no-op in the flush.

use std::collections::HashMap;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::engine::Engine;
use crate::expr::PathExpr;
use crate::types::{CellId, ContextId, NodeId, WatcherId};
use crate::value::to_f64;

// =============================================================================
// Context Arena
// =============================================================================

type CleanupFn = Box<dyn FnOnce(&Engine)>;

pub(crate) struct Context {
    pub(crate) element: NodeId,
    pub(crate) parent: Option<ContextId>,
    pub(crate) children: Vec<ContextId>,
    /// Own state: name to cell.
    pub(crate) state: HashMap<String, CellId>,
    /// Computed values, each backed by a cell kept fresh by its own watcher.
    pub(crate) computed: HashMap<String, CellId>,
    pub(crate) watchers: Vec<WatcherId>,
    /// Watcher dedup per (role, expression text, node).
    pub(crate) watcher_keys: HashMap<String, WatcherId>,
    /// Teardown callbacks run on destroy, in reverse registration order.
    pub(crate) cleanups: Vec<CleanupFn>,
}

pub(crate) struct ContextArena {
    slots: Vec<Option<Context>>,
    free: Vec<usize>,
    by_element: HashMap<NodeId, ContextId>,
    root: Option<ContextId>,
}

impl ContextArena {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            by_element: HashMap::new(),
            root: None,
        }
    }

    pub(crate) fn get(&self, id: ContextId) -> Option<&Context> {
        self.slots.get(id.index()).and_then(|c| c.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: ContextId) -> Option<&mut Context> {
        self.slots.get_mut(id.index()).and_then(|c| c.as_mut())
    }
}

// =============================================================================
// Engine Operations
// =============================================================================

impl Engine {
    /// Create a context owned by `element`. The root context (created at
    /// engine construction) passes `parent: None`; everything else hangs off
    /// an ancestor.
    pub(crate) fn create_context(&self, parent: Option<ContextId>, element: NodeId) -> ContextId {
        let mut arena = self.inner().contexts.borrow_mut();
        let context = Context {
            element,
            parent,
            children: Vec::new(),
            state: HashMap::new(),
            computed: HashMap::new(),
            watchers: Vec::new(),
            watcher_keys: HashMap::new(),
            cleanups: Vec::new(),
        };
        let id = match arena.free.pop() {
            Some(index) => {
                arena.slots[index] = Some(context);
                ContextId(index)
            }
            None => {
                arena.slots.push(Some(context));
                ContextId(arena.slots.len() - 1)
            }
        };
        if let Some(parent) = parent
            && let Some(parent_ctx) = arena.get_mut(parent)
        {
            parent_ctx.children.push(id);
        }
        if arena.root.is_none() {
            arena.root = Some(id);
        }
        arena.by_element.insert(element, id);
        id
    }

    pub(crate) fn root_context(&self) -> ContextId {
        self.inner()
            .contexts
            .borrow()
            .root
            .expect("root context exists from construction")
    }

    /// Nearest owning context of a dom node, walking document ancestors.
    /// Falls back to the implicit root context.
    pub(crate) fn find_context(&self, node: NodeId) -> ContextId {
        let arena = self.inner().contexts.borrow();
        if let Some(id) = arena.by_element.get(&node) {
            return *id;
        }
        let dom = self.inner().dom.borrow();
        for ancestor in dom.ancestors(node) {
            if let Some(id) = arena.by_element.get(&ancestor) {
                return *id;
            }
        }
        arena.root.expect("root context exists from construction")
    }

    /// Define (or overwrite) an own-state entry on a context.
    pub(crate) fn define_state(&self, ctx: ContextId, name: &str, value: Value) -> CellId {
        let existing = self
            .inner()
            .contexts
            .borrow()
            .get(ctx)
            .and_then(|c| c.state.get(name).copied());
        if let Some(cell) = existing {
            self.write_cell(cell, value, false);
            return cell;
        }
        let cell = self.create_cell(value);
        if let Some(context) = self.inner().contexts.borrow_mut().get_mut(ctx) {
            context.state.insert(name.to_string(), cell);
        }
        cell
    }

    /// Resolve a name through the scope chain to its owning cell.
    pub(crate) fn lookup_cell(&self, ctx: ContextId, name: &str) -> Option<CellId> {
        let arena = self.inner().contexts.borrow();
        let mut current = Some(ctx);
        while let Some(id) = current {
            let context = arena.get(id)?;
            if let Some(cell) = context.state.get(name) {
                return Some(*cell);
            }
            if let Some(cell) = context.computed.get(name) {
                return Some(*cell);
            }
            current = context.parent;
        }
        None
    }

    /// Register a watcher owned by `ctx` and run it once to collect
    /// dependencies.
    pub(crate) fn watch(&self, ctx: ContextId, callback: Rc<dyn Fn(&Engine)>) -> WatcherId {
        let id = self.create_watcher(callback);
        if let Some(context) = self.inner().contexts.borrow_mut().get_mut(ctx) {
            context.watchers.push(id);
        }
        self.run_watcher(id);
        self.maybe_flush();
        id
    }

    /// Deduplicated watcher registration: one watcher per
    /// (role, expression text, node) within a context.
    pub(crate) fn watch_keyed(
        &self,
        ctx: ContextId,
        key: String,
        callback: Rc<dyn Fn(&Engine)>,
    ) -> WatcherId {
        let existing = self
            .inner()
            .contexts
            .borrow()
            .get(ctx)
            .and_then(|c| c.watcher_keys.get(&key).copied());
        if let Some(id) = existing {
            return id;
        }
        let id = self.watch(ctx, callback);
        if let Some(context) = self.inner().contexts.borrow_mut().get_mut(ctx) {
            context.watcher_keys.insert(key, id);
        }
        id
    }

    /// Register teardown work for a context (listener removal, pending
    /// timers, materialized subtrees).
    pub(crate) fn on_context_destroy(
        &self,
        ctx: ContextId,
        cleanup: impl FnOnce(&Engine) + 'static,
    ) {
        if let Some(context) = self.inner().contexts.borrow_mut().get_mut(ctx) {
            context.cleanups.push(Box::new(cleanup));
        }
    }

    /// Register a lazily maintained derived value: its backing cell is
    /// recomputed only when a dependency cell changes.
    pub(crate) fn define_computed(&self, ctx: ContextId, name: &str, expr_text: &str) {
        let cell = self.create_cell(Value::Null);
        if let Some(context) = self.inner().contexts.borrow_mut().get_mut(ctx) {
            context.computed.insert(name.to_string(), cell);
        }
        let text = expr_text.to_string();
        self.watch(
            ctx,
            Rc::new(move |engine: &Engine| {
                let value = engine.evaluate_in(ctx, &text, None);
                engine.write_cell(cell, value, false);
            }),
        );
    }

    /// Destroy a context subtree: children first, then cleanups, watchers
    /// and cells. Safe to call twice.
    pub(crate) fn destroy_context(&self, ctx: ContextId) {
        let detail = {
            let mut arena = self.inner().contexts.borrow_mut();
            let Some(context) = arena.slots.get_mut(ctx.index()).and_then(|c| c.take()) else {
                return;
            };
            arena.free.push(ctx.index());
            arena.by_element.remove(&context.element);
            if let Some(parent) = context.parent
                && let Some(parent_ctx) = arena.get_mut(parent)
            {
                parent_ctx.children.retain(|c| *c != ctx);
            }
            context
        };
        for child in detail.children {
            self.destroy_context(child);
        }
        for cleanup in detail.cleanups.into_iter().rev() {
            cleanup(self);
        }
        for watcher in detail.watchers {
            self.release_watcher(watcher);
        }
        for cell in detail.state.into_values() {
            self.release_cell(cell);
        }
        for cell in detail.computed.into_values() {
            self.release_cell(cell);
        }
        self.cancel_timers_for(ctx);
        self.remove_listeners_for_context(ctx);
    }

    /// Drop the element association for nodes removed from the document.
    pub(crate) fn forget_elements(&self, nodes: &[NodeId]) {
        let mut arena = self.inner().contexts.borrow_mut();
        for node in nodes {
            arena.by_element.remove(node);
        }
    }
}

// =============================================================================
// Scope Resolution
// =============================================================================

/// The explicit scope-resolution view the evaluator runs against: a context
/// plus optional evaluation-scoped locals (`$event`, per-item loop locals in
/// `foreach` filter predicates).
pub struct Scope<'a> {
    pub(crate) engine: &'a Engine,
    pub(crate) ctx: ContextId,
    pub(crate) locals: Option<&'a Map<String, Value>>,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(engine: &'a Engine, ctx: ContextId) -> Self {
        Self {
            engine,
            ctx,
            locals: None,
        }
    }

    pub(crate) fn with_locals(
        engine: &'a Engine,
        ctx: ContextId,
        locals: &'a Map<String, Value>,
    ) -> Self {
        Self {
            engine,
            ctx,
            locals: Some(locals),
        }
    }

    /// Resolve a free identifier: locals, then ambient names, then the
    /// scope chain. Misses are `Null`.
    pub fn get(&self, name: &str) -> Value {
        if let Some(locals) = self.locals
            && let Some(value) = locals.get(name)
        {
            return value.clone();
        }
        match name {
            "$store" => return self.engine.read_cell(self.engine.store_cell()),
            "$route" => return self.engine.read_cell(self.engine.route_cell()),
            "$refs" => return self.engine.refs_value(),
            _ => {}
        }
        match self.engine.lookup_cell(self.ctx, name) {
            Some(cell) => self.engine.read_cell(cell),
            None => Value::Null,
        }
    }

    /// Assign through a resolved path. A bare name that exists somewhere in
    /// the chain writes the owning cell; an unknown name creates own state
    /// on the *nearest* context. Deeper paths mutate inside the root cell's
    /// value (container mutation always notifies).
    pub(crate) fn assign(&self, root: &str, keys: &[Value], value: Value) {
        if root == "$store" {
            self.engine.store_assign(keys, value);
            return;
        }
        let cell = self.engine.lookup_cell(self.ctx, root);
        if keys.is_empty() {
            match cell {
                Some(cell) => self.engine.write_cell(cell, value, false),
                None => {
                    self.engine.define_state(self.ctx, root, value);
                }
            }
            return;
        }
        let cell = cell.unwrap_or_else(|| {
            self.engine
                .define_state(self.ctx, root, Value::Object(Map::new()))
        });
        let mut container = self.engine.peek_cell(cell);
        write_path(&mut container, keys, value);
        self.engine.write_cell(cell, container, true);
    }
}

/// Navigate into a value by evaluated key. Objects by string key, arrays by
/// numeric index; anything else resolves to `Null`.
pub(crate) fn index_value(base: &Value, key: &Value) -> Value {
    match base {
        Value::Object(map) => {
            let key = match key {
                Value::String(s) => s.clone(),
                other => crate::value::display(other),
            };
            map.get(&key).cloned().unwrap_or(Value::Null)
        }
        Value::Array(items) => match to_f64(key) {
            Some(index) if index >= 0.0 => items
                .get(index as usize)
                .cloned()
                .unwrap_or(Value::Null),
            _ => Value::Null,
        },
        Value::String(s) => {
            if key.as_str() == Some("length") {
                Value::from(s.chars().count())
            } else {
                Value::Null
            }
        }
        _ => Value::Null,
    }
}

/// In-place write at a key path, creating intermediate objects/arrays.
pub(crate) fn write_path(container: &mut Value, keys: &[Value], value: Value) {
    let Some((head, rest)) = keys.split_first() else {
        *container = value;
        return;
    };
    match container {
        Value::Array(items) => {
            let Some(index) = to_f64(head).filter(|f| *f >= 0.0).map(|f| f as usize) else {
                return;
            };
            while items.len() <= index {
                items.push(Value::Null);
            }
            write_path(&mut items[index], rest, value);
        }
        Value::Object(map) => {
            let key = match head {
                Value::String(s) => s.clone(),
                other => crate::value::display(other),
            };
            let slot = map.entry(key).or_insert(Value::Null);
            write_path(slot, rest, value);
        }
        other => {
            // Writing through a primitive replaces it with an object.
            *other = Value::Object(Map::new());
            write_path(other, keys, value);
        }
    }
}

/// Used by `resolve()`-style entry points (`model`) that need an assignable
/// target rather than a value.
pub(crate) fn resolve_keys(scope: &Scope<'_>, path: &PathExpr) -> Vec<Value> {
    path.segments
        .iter()
        .map(|segment| crate::expr::eval::evaluate(segment, scope))
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_index_value() {
        let obj = json!({"a": {"b": [10, 20]}});
        let inner = index_value(&obj, &json!("a"));
        let items = index_value(&inner, &json!("b"));
        assert_eq!(index_value(&items, &json!(1)), json!(20));
        assert_eq!(index_value(&items, &json!(9)), Value::Null);
        assert_eq!(index_value(&json!(null), &json!("x")), Value::Null);
    }

    #[test]
    fn test_write_path_creates_intermediates() {
        let mut container = json!({});
        write_path(&mut container, &[json!("a"), json!("b")], json!(1));
        assert_eq!(container, json!({"a": {"b": 1}}));

        let mut list = json!([]);
        write_path(&mut list, &[json!(2)], json!("x"));
        assert_eq!(list, json!([null, null, "x"]));
    }
}
