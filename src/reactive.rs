//! Reactive runtime - cells, watchers and the flush queue.
//!
//! The runtime is the engine's dependency graph. A [`Cell`] is the smallest
//! unit of observable state; a watcher is a callback that re-runs whenever
//! any cell it read during its previous run changes.
//!
//! # Pattern: Implicit Dependency Stack
//!
//! There is no property interception. Instead the runtime keeps a stack of
//! "active" watcher ids: before a watcher's callback runs its id is pushed,
//! after it returns the id is popped, and every cell read in between
//! subscribes the top-of-stack watcher. Re-running a watcher first drops all
//! of its previous subscriptions, so the dependency set always mirrors the
//! latest run.
//!
//! # Pattern: Coalesced Flush
//!
//! Writes inside one synchronous turn are coalesced: each affected watcher
//! runs at most once per flush round, in subscription order. A watcher that
//! writes one of its own dependencies is not re-entered synchronously; it is
//! marked dirty and queued for one follow-up round.

use std::collections::HashSet;
use std::rc::Rc;

use serde_json::Value;
use tracing::warn;

use crate::engine::Engine;
use crate::types::{CellId, WatcherId};
use crate::value::is_container;

/// Hard cap on follow-up rounds within one flush. A binding graph that keeps
/// dirtying itself past this point is cyclic; we stop and warn instead of
/// spinning.
const MAX_FLUSH_ROUNDS: usize = 64;

// =============================================================================
// Runtime State
// =============================================================================

pub(crate) struct Cell {
    pub(crate) value: Value,
    pub(crate) version: u64,
    /// Watchers to notify on write, in subscription order.
    subs: Vec<WatcherId>,
}

pub(crate) struct Watcher {
    callback: Rc<dyn Fn(&Engine)>,
    /// Cells read during the last run.
    deps: Vec<CellId>,
    /// Creation order; flush rounds run in this order.
    seq: u64,
    /// True while the callback executes (re-entrancy guard).
    running: bool,
    /// Set when the watcher dirties itself mid-run; forces one follow-up.
    dirty: bool,
}

/// Arena of cells and watchers plus the scheduling state.
pub(crate) struct Runtime {
    cells: Vec<Option<Cell>>,
    free_cells: Vec<usize>,
    watchers: Vec<Option<Watcher>>,
    free_watchers: Vec<usize>,
    /// Implicit dependency-tracking stack.
    active: Vec<WatcherId>,
    /// Watchers scheduled for the next flush round.
    pending: Vec<WatcherId>,
    flushing: bool,
    next_seq: u64,
}

impl Runtime {
    pub(crate) fn new() -> Self {
        Self {
            cells: Vec::new(),
            free_cells: Vec::new(),
            watchers: Vec::new(),
            free_watchers: Vec::new(),
            active: Vec::new(),
            pending: Vec::new(),
            flushing: false,
            next_seq: 0,
        }
    }

    fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(id.index()).and_then(|c| c.as_ref())
    }

    fn cell_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.cells.get_mut(id.index()).and_then(|c| c.as_mut())
    }

    fn watcher_mut(&mut self, id: WatcherId) -> Option<&mut Watcher> {
        self.watchers.get_mut(id.index()).and_then(|w| w.as_mut())
    }
}

// =============================================================================
// Engine Operations
// =============================================================================

impl Engine {
    /// Allocate a cell holding `initial`.
    pub(crate) fn create_cell(&self, initial: Value) -> CellId {
        let mut rt = self.runtime_mut();
        let cell = Cell {
            value: initial,
            version: 0,
            subs: Vec::new(),
        };
        match rt.free_cells.pop() {
            Some(index) => {
                rt.cells[index] = Some(cell);
                CellId(index)
            }
            None => {
                rt.cells.push(Some(cell));
                CellId(rt.cells.len() - 1)
            }
        }
    }

    /// Read a cell, subscribing the active watcher (if any).
    pub(crate) fn read_cell(&self, id: CellId) -> Value {
        let mut rt = self.runtime_mut();
        let active = rt.active.last().copied();
        if let Some(wid) = active {
            if let Some(cell) = rt.cell_mut(id)
                && !cell.subs.contains(&wid)
            {
                cell.subs.push(wid);
            }
            if let Some(watcher) = rt.watcher_mut(wid)
                && !watcher.deps.contains(&id)
            {
                watcher.deps.push(id);
            }
        }
        rt.cell(id).map(|c| c.value.clone()).unwrap_or(Value::Null)
    }

    /// Read without dependency tracking.
    pub(crate) fn peek_cell(&self, id: CellId) -> Value {
        self.runtime_mut()
            .cell(id)
            .map(|c| c.value.clone())
            .unwrap_or(Value::Null)
    }

    /// Write a cell and notify subscribers.
    ///
    /// Primitive writes skip notification when the value is unchanged.
    /// Container values (and `force` writes, used for in-place path
    /// mutation) always notify.
    pub(crate) fn write_cell(&self, id: CellId, value: Value, force: bool) {
        let subs = {
            let mut rt = self.runtime_mut();
            let Some(cell) = rt.cell_mut(id) else {
                return;
            };
            if !force && !is_container(&value) && !is_container(&cell.value) && cell.value == value
            {
                return;
            }
            cell.value = value;
            cell.version += 1;
            cell.subs.clone()
        };
        self.schedule(&subs);
        self.maybe_flush();
    }

    /// Drop a cell, detaching it from every subscribed watcher.
    pub(crate) fn release_cell(&self, id: CellId) {
        let mut rt = self.runtime_mut();
        let Some(cell) = rt.cells.get_mut(id.index()).and_then(|c| c.take()) else {
            return;
        };
        for wid in cell.subs {
            if let Some(watcher) = rt.watcher_mut(wid) {
                watcher.deps.retain(|d| *d != id);
            }
        }
        rt.free_cells.push(id.index());
    }

    /// Register a watcher without running it. Use [`Engine::run_watcher`]
    /// for the initial dependency-collecting run.
    pub(crate) fn create_watcher(&self, callback: Rc<dyn Fn(&Engine)>) -> WatcherId {
        let mut rt = self.runtime_mut();
        rt.next_seq += 1;
        let watcher = Watcher {
            callback,
            deps: Vec::new(),
            seq: rt.next_seq,
            running: false,
            dirty: false,
        };
        match rt.free_watchers.pop() {
            Some(index) => {
                rt.watchers[index] = Some(watcher);
                WatcherId(index)
            }
            None => {
                rt.watchers.push(Some(watcher));
                WatcherId(rt.watchers.len() - 1)
            }
        }
    }

    /// Unsubscribe and drop a watcher. Safe to call twice; a released
    /// watcher that is still queued becomes a silent no-op.
    pub(crate) fn release_watcher(&self, id: WatcherId) {
        let mut rt = self.runtime_mut();
        let Some(watcher) = rt.watchers.get_mut(id.index()).and_then(|w| w.take()) else {
            return;
        };
        for dep in watcher.deps {
            if let Some(cell) = rt.cell_mut(dep) {
                cell.subs.retain(|s| *s != id);
            }
        }
        rt.pending.retain(|p| *p != id);
        rt.free_watchers.push(id.index());
    }

    /// Run one watcher now: drop its previous subscriptions, push it on the
    /// dependency stack, execute, pop. Destroyed watchers no-op.
    pub(crate) fn run_watcher(&self, id: WatcherId) {
        let callback = {
            let mut rt = self.runtime_mut();
            let Some(watcher) = rt.watcher_mut(id) else {
                return;
            };
            watcher.running = true;
            watcher.dirty = false;
            let old_deps = std::mem::take(&mut watcher.deps);
            let callback = watcher.callback.clone();
            for dep in old_deps {
                if let Some(cell) = rt.cell_mut(dep) {
                    cell.subs.retain(|s| *s != id);
                }
            }
            rt.active.push(id);
            callback
        };
        callback(self);
        let mut rt = self.runtime_mut();
        rt.active.pop();
        if let Some(watcher) = rt.watcher_mut(id) {
            watcher.running = false;
            if watcher.dirty {
                watcher.dirty = false;
                if !rt.pending.contains(&id) {
                    rt.pending.push(id);
                }
            }
        }
    }

    /// Queue watchers for the next flush round. A watcher that is currently
    /// running is marked dirty instead of being queued (no synchronous
    /// re-entry).
    pub(crate) fn schedule(&self, watchers: &[WatcherId]) {
        let mut rt = self.runtime_mut();
        for &wid in watchers {
            match rt.watcher_mut(wid) {
                Some(w) if w.running => w.dirty = true,
                Some(_) => {
                    if !rt.pending.contains(&wid) {
                        rt.pending.push(wid);
                    }
                }
                None => {}
            }
        }
    }

    /// Flush the pending queue unless a flush is already in progress or a
    /// watcher is mid-run (its finishing `run_watcher` re-queues followups,
    /// and the outer flush drains them).
    pub(crate) fn maybe_flush(&self) {
        {
            let rt = self.runtime_mut();
            if rt.flushing || !rt.active.is_empty() || rt.pending.is_empty() {
                return;
            }
        }
        self.flush();
    }

    fn flush(&self) {
        self.runtime_mut().flushing = true;
        let mut rounds = 0;
        loop {
            let mut batch = {
                let mut rt = self.runtime_mut();
                std::mem::take(&mut rt.pending)
            };
            if batch.is_empty() {
                break;
            }
            rounds += 1;
            if rounds > MAX_FLUSH_ROUNDS {
                warn!(rounds, "reactive flush did not settle; dropping remaining work");
                break;
            }
            // Subscription order within a round.
            {
                let rt = self.runtime_mut();
                batch.sort_by_key(|id| {
                    rt.watchers
                        .get(id.index())
                        .and_then(|w| w.as_ref())
                        .map(|w| w.seq)
                        .unwrap_or(u64::MAX)
                });
            }
            let mut ran: HashSet<WatcherId> = HashSet::new();
            for wid in batch {
                if ran.insert(wid) {
                    self.run_watcher(wid);
                }
            }
        }
        self.runtime_mut().flushing = false;
    }

    pub(crate) fn cell_version(&self, id: CellId) -> u64 {
        self.runtime_mut().cell(id).map(|c| c.version).unwrap_or(0)
    }

    fn runtime_mut(&self) -> std::cell::RefMut<'_, Runtime> {
        self.inner().runtime.borrow_mut()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use serde_json::json;

    use crate::engine::Engine;

    #[test]
    fn test_write_notifies_only_readers() {
        let engine = Engine::new();
        let a = engine.create_cell(json!(1));
        let b = engine.create_cell(json!(2));

        let log = Rc::new(RefCell::new(Vec::new()));
        let log_a = log.clone();
        let wa = engine.create_watcher(Rc::new(move |e: &Engine| {
            let v = e.read_cell(a);
            log_a.borrow_mut().push(format!("a={v}"));
        }));
        let log_b = log.clone();
        let wb = engine.create_watcher(Rc::new(move |e: &Engine| {
            let v = e.read_cell(b);
            log_b.borrow_mut().push(format!("b={v}"));
        }));
        engine.run_watcher(wa);
        engine.run_watcher(wb);
        log.borrow_mut().clear();

        engine.write_cell(a, json!(10), false);
        assert_eq!(*log.borrow(), vec!["a=10"]);

        log.borrow_mut().clear();
        engine.write_cell(b, json!(20), false);
        assert_eq!(*log.borrow(), vec!["b=20"]);
    }

    #[test]
    fn test_unchanged_primitive_write_is_skipped() {
        let engine = Engine::new();
        let a = engine.create_cell(json!("same"));
        let runs = Rc::new(RefCell::new(0));
        let runs_inner = runs.clone();
        let w = engine.create_watcher(Rc::new(move |e: &Engine| {
            e.read_cell(a);
            *runs_inner.borrow_mut() += 1;
        }));
        engine.run_watcher(w);
        assert_eq!(*runs.borrow(), 1);

        engine.write_cell(a, json!("same"), false);
        assert_eq!(*runs.borrow(), 1);

        engine.write_cell(a, json!("changed"), false);
        assert_eq!(*runs.borrow(), 2);
    }

    #[test]
    fn test_container_write_always_notifies() {
        let engine = Engine::new();
        let a = engine.create_cell(json!([1, 2]));
        let runs = Rc::new(RefCell::new(0));
        let runs_inner = runs.clone();
        let w = engine.create_watcher(Rc::new(move |e: &Engine| {
            e.read_cell(a);
            *runs_inner.borrow_mut() += 1;
        }));
        engine.run_watcher(w);
        engine.write_cell(a, json!([1, 2]), false);
        assert_eq!(*runs.borrow(), 2);
    }

    #[test]
    fn test_self_write_does_not_recurse() {
        let engine = Engine::new();
        let a = engine.create_cell(json!(0));
        let runs = Rc::new(RefCell::new(0));
        let runs_inner = runs.clone();
        let w = engine.create_watcher(Rc::new(move |e: &Engine| {
            let v = e.read_cell(a);
            *runs_inner.borrow_mut() += 1;
            // Write our own dependency once; must not recurse unboundedly.
            if v == json!(0) {
                e.write_cell(a, json!(1), false);
            }
        }));
        engine.run_watcher(w);
        engine.maybe_flush();
        // Initial run + exactly one follow-up pass.
        assert_eq!(*runs.borrow(), 2);
    }

    #[test]
    fn test_released_watcher_never_fires_again() {
        let engine = Engine::new();
        let a = engine.create_cell(json!(0));
        let runs = Rc::new(RefCell::new(0));
        let runs_inner = runs.clone();
        let w = engine.create_watcher(Rc::new(move |e: &Engine| {
            e.read_cell(a);
            *runs_inner.borrow_mut() += 1;
        }));
        engine.run_watcher(w);
        engine.release_watcher(w);
        engine.release_watcher(w); // idempotent
        engine.write_cell(a, json!(99), false);
        assert_eq!(*runs.borrow(), 1);
    }

    #[test]
    fn test_flush_runs_in_subscription_order() {
        let engine = Engine::new();
        let a = engine.create_cell(json!(0));
        let order = Rc::new(RefCell::new(Vec::new()));

        let o1 = order.clone();
        let w1 = engine.create_watcher(Rc::new(move |e: &Engine| {
            e.read_cell(a);
            o1.borrow_mut().push(1);
        }));
        let o2 = order.clone();
        let w2 = engine.create_watcher(Rc::new(move |e: &Engine| {
            e.read_cell(a);
            o2.borrow_mut().push(2);
        }));
        // Run out of order; notification order must follow creation order.
        engine.run_watcher(w2);
        engine.run_watcher(w1);
        order.borrow_mut().clear();

        engine.write_cell(a, json!(1), false);
        assert_eq!(*order.borrow(), vec![1, 2]);
    }
}
