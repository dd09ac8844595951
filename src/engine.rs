//! The engine instance - one explicit object owning every registry.
//!
//! There are no hidden singletons: directives, filters, validators,
//! templates, the store, refs and diagnostics all live on the [`Engine`]
//! created once and passed by reference everywhere ("register once, resolve
//! anywhere" without process-wide state).
//!
//! The engine is single-threaded and cooperative. `Engine` is a cheap
//! clone over `Rc`; interior mutability keeps borrows short so watcher
//! callbacks can re-enter engine operations freely.
//!
//! # Lifecycle
//!
//! ```ignore
//! let engine = Engine::new();
//! engine.mount(r#"
//!     <div state="{count: 0}">
//!         <span bind="count"></span>
//!         <button on:click="count++">+1</button>
//!     </div>
//! "#)?;
//! let button = engine.find_by_tag("button")[0];
//! engine.dispatch(button, "click", Value::Null);
//! assert_eq!(engine.text_of(engine.find_by_tag("span")[0]), "1");
//! ```

use std::cell::{Cell as StdCell, Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::context::ContextArena;
use crate::directives::DirectiveRegistry;
use crate::directives::events::ListenerTable;
use crate::dom::Document;
use crate::error::EngineError;
use crate::expr::Expr;
use crate::reactive::Runtime;
use crate::template::TemplateStore;
use crate::types::{CellId, ContextId, NodeId, TimerId};

/// Pure function looked up by name at evaluation time: previous pipe value
/// first, then the `:`-separated arguments.
pub type FilterFn = Rc<dyn Fn(&Value, &[Value]) -> Value>;

/// Diagnostic subscriber, fed when debug mode is on.
pub type DiagnosticFn = Rc<dyn Fn(&EngineError)>;

/// Blocking template fetch; transport is the collaborator's problem.
pub trait TemplateLoader {
    fn fetch(&self, url: &str) -> Result<String, String>;
}

// =============================================================================
// Timers
// =============================================================================

struct TimerEntry {
    id: TimerId,
    ctx: ContextId,
    deadline: u64,
    callback: Rc<dyn Fn(&Engine)>,
}

pub(crate) struct TimerState {
    now: u64,
    next_id: usize,
    entries: Vec<TimerEntry>,
}

// =============================================================================
// Engine
// =============================================================================

pub(crate) struct EngineInner {
    pub(crate) dom: RefCell<Document>,
    pub(crate) runtime: RefCell<Runtime>,
    pub(crate) contexts: RefCell<ContextArena>,
    pub(crate) directives: RefCell<DirectiveRegistry>,
    pub(crate) filters: RefCell<HashMap<String, FilterFn>>,
    pub(crate) validators: RefCell<HashMap<String, FilterFn>>,
    pub(crate) exprs: RefCell<HashMap<String, Rc<Result<Expr, String>>>>,
    pub(crate) templates: RefCell<TemplateStore>,
    pub(crate) listeners: RefCell<ListenerTable>,
    timers: RefCell<TimerState>,
    pub(crate) refs: RefCell<HashMap<String, NodeId>>,
    store_cell: StdCell<CellId>,
    route_cell: StdCell<CellId>,
    locale_cell: StdCell<CellId>,
    debug: StdCell<bool>,
    diag_subs: RefCell<Vec<DiagnosticFn>>,
    pub(crate) translator: RefCell<Option<Rc<dyn crate::i18n::Translator>>>,
    pub(crate) loader: RefCell<Option<Rc<dyn TemplateLoader>>>,
    /// Template ids the active route needs; the router keeps this current.
    pub(crate) route_templates: RefCell<Vec<String>>,
}

/// Handle to one engine instance. Cloning shares the instance.
#[derive(Clone)]
pub struct Engine {
    inner: Rc<EngineInner>,
}

impl Engine {
    pub fn new() -> Self {
        let engine = Self {
            inner: Rc::new(EngineInner {
                dom: RefCell::new(Document::new()),
                runtime: RefCell::new(Runtime::new()),
                contexts: RefCell::new(ContextArena::new()),
                directives: RefCell::new(DirectiveRegistry::new()),
                filters: RefCell::new(HashMap::new()),
                validators: RefCell::new(HashMap::new()),
                exprs: RefCell::new(HashMap::new()),
                templates: RefCell::new(TemplateStore::new()),
                listeners: RefCell::new(ListenerTable::new()),
                timers: RefCell::new(TimerState {
                    now: 0,
                    next_id: 0,
                    entries: Vec::new(),
                }),
                refs: RefCell::new(HashMap::new()),
                store_cell: StdCell::new(CellId(usize::MAX)),
                route_cell: StdCell::new(CellId(usize::MAX)),
                locale_cell: StdCell::new(CellId(usize::MAX)),
                debug: StdCell::new(false),
                diag_subs: RefCell::new(Vec::new()),
                translator: RefCell::new(None),
                loader: RefCell::new(None),
                route_templates: RefCell::new(Vec::new()),
            }),
        };
        // Ambient cells and the implicit root context.
        engine
            .inner
            .store_cell
            .set(engine.create_cell(Value::Object(Map::new())));
        engine
            .inner
            .route_cell
            .set(engine.create_cell(Value::Null));
        engine
            .inner
            .locale_cell
            .set(engine.create_cell(Value::from(0)));
        let root_element = engine.inner.dom.borrow().root();
        engine.create_context(None, root_element);
        crate::directives::register_builtins(&engine);
        crate::filters::register_builtins(&engine);
        engine
    }

    pub(crate) fn inner(&self) -> &EngineInner {
        &self.inner
    }

    pub(crate) fn dom(&self) -> Ref<'_, Document> {
        self.inner.dom.borrow()
    }

    pub(crate) fn dom_mut(&self) -> RefMut<'_, Document> {
        self.inner.dom.borrow_mut()
    }

    pub(crate) fn store_cell(&self) -> CellId {
        self.inner.store_cell.get()
    }

    pub(crate) fn route_cell(&self) -> CellId {
        self.inner.route_cell.get()
    }

    pub(crate) fn locale_cell(&self) -> CellId {
        self.inner.locale_cell.get()
    }

    // =========================================================================
    // Mounting
    // =========================================================================

    /// Parse markup under the document root, resolve template declarations,
    /// block on phase-1 remote templates, then process the tree.
    pub fn mount(&self, markup: &str) -> Result<NodeId, EngineError> {
        let root = {
            let mut dom = self.dom_mut();
            let root = dom.root();
            dom.parse_into(root, markup)?;
            root
        };
        self.collect_template_declarations(root);
        self.load_phase_one();
        self.process_tree(root);
        self.maybe_flush();
        Ok(root)
    }

    // =========================================================================
    // Cooperative Clock
    // =========================================================================

    /// Advance the engine-virtual clock, firing due timers (debounced
    /// handlers) and draining one round of phase-2 template prefetch.
    pub fn advance(&self, ms: u64) {
        let due = {
            let mut timers = self.inner.timers.borrow_mut();
            timers.now += ms;
            let now = timers.now;
            let mut due: Vec<TimerEntry> = Vec::new();
            let mut index = 0;
            while index < timers.entries.len() {
                if timers.entries[index].deadline <= now {
                    due.push(timers.entries.remove(index));
                } else {
                    index += 1;
                }
            }
            due.sort_by_key(|entry| (entry.deadline, entry.id));
            due
        };
        for entry in due {
            // Contexts destroyed since scheduling were already cancelled,
            // but a timer callback may destroy a later context mid-loop.
            let alive = self.inner.contexts.borrow().get(entry.ctx).is_some();
            if alive {
                (entry.callback)(self);
            }
        }
        self.maybe_flush();
        self.pump_prefetch();
    }

    pub(crate) fn schedule_timer(
        &self,
        ctx: ContextId,
        delay_ms: u64,
        callback: Rc<dyn Fn(&Engine)>,
    ) -> TimerId {
        let mut timers = self.inner.timers.borrow_mut();
        timers.next_id += 1;
        let id = TimerId(timers.next_id);
        let deadline = timers.now + delay_ms;
        timers.entries.push(TimerEntry {
            id,
            ctx,
            deadline,
            callback,
        });
        id
    }

    pub(crate) fn cancel_timer(&self, id: TimerId) {
        self.inner
            .timers
            .borrow_mut()
            .entries
            .retain(|entry| entry.id != id);
    }

    pub(crate) fn cancel_timers_for(&self, ctx: ContextId) {
        self.inner
            .timers
            .borrow_mut()
            .entries
            .retain(|entry| entry.ctx != ctx);
    }

    // =========================================================================
    // Filters & Validators
    // =========================================================================

    /// Register (or replace) a filter; effective for subsequent evaluations.
    pub fn register_filter(&self, name: &str, filter: FilterFn) {
        self.inner.filters.borrow_mut().insert(name.to_string(), filter);
    }

    /// Register (or replace) a validator. The core only hosts the registry;
    /// rule bodies are collaborator-supplied.
    pub fn register_validator(&self, name: &str, validator: FilterFn) {
        self.inner
            .validators
            .borrow_mut()
            .insert(name.to_string(), validator);
    }

    pub(crate) fn apply_filter(&self, name: &str, value: Value, args: &[Value]) -> Value {
        let filter = self.inner.filters.borrow().get(name).cloned();
        match filter {
            Some(filter) => filter(&value, args),
            None => {
                self.diagnose(&EngineError::UnknownFilter {
                    name: name.to_string(),
                });
                value
            }
        }
    }

    /// Run a named validator; unknown names validate to `true` with a
    /// diagnostic, matching the filter pass-through policy.
    pub fn validate(&self, name: &str, value: &Value, args: &[Value]) -> Value {
        let validator = self.inner.validators.borrow().get(name).cloned();
        match validator {
            Some(validator) => validator(value, args),
            None => {
                self.diagnose(&EngineError::UnknownFilter {
                    name: name.to_string(),
                });
                Value::Bool(true)
            }
        }
    }

    // =========================================================================
    // Store & Refs
    // =========================================================================

    /// Write into the global `$store` map. The store is one container cell,
    /// so any entry change notifies every store reader.
    pub fn store_set(&self, name: &str, value: Value) {
        self.store_assign(&[Value::String(name.to_string())], value);
    }

    pub fn store_get(&self, name: &str) -> Value {
        crate::context::index_value(
            &self.peek_cell(self.store_cell()),
            &Value::String(name.to_string()),
        )
    }

    pub(crate) fn store_assign(&self, keys: &[Value], value: Value) {
        let mut store = self.peek_cell(self.store_cell());
        crate::context::write_path(&mut store, keys, value);
        self.write_cell(self.store_cell(), store, true);
    }

    pub(crate) fn refs_value(&self) -> Value {
        let refs = self.inner.refs.borrow();
        let mut map = Map::new();
        for (name, node) in refs.iter() {
            map.insert(name.clone(), Value::from(node.index()));
        }
        Value::Object(map)
    }

    /// Element registered under `ref="name"`, if any.
    pub fn ref_node(&self, name: &str) -> Option<NodeId> {
        self.inner.refs.borrow().get(name).copied()
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Toggle debug mode: conflicts are reported and diagnostics fan out to
    /// subscribers in addition to the log.
    pub fn set_debug(&self, debug: bool) {
        self.inner.debug.set(debug);
    }

    pub fn debug_enabled(&self) -> bool {
        self.inner.debug.get()
    }

    /// Subscribe to diagnostics (debug mode only).
    pub fn on_diagnostic(&self, subscriber: DiagnosticFn) {
        self.inner.diag_subs.borrow_mut().push(subscriber);
    }

    /// Log an engine error and, in debug mode, fan it out to subscribers.
    /// Never propagates: broken bindings render as empty content.
    pub(crate) fn diagnose(&self, error: &EngineError) {
        warn!(kind = error.kind(), "{error}");
        if self.inner.debug.get() {
            let subs = self.inner.diag_subs.borrow().clone();
            for sub in subs {
                sub(error);
            }
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Serialize the current document.
    pub fn html(&self) -> String {
        self.dom().html()
    }

    pub fn find_by_tag(&self, tag: &str) -> Vec<NodeId> {
        self.dom().find_by_tag(tag)
    }

    pub fn text_of(&self, node: NodeId) -> String {
        self.dom().text_content(node)
    }

    /// Current form value maintained by `model` on this element.
    pub fn value_of(&self, node: NodeId) -> Value {
        self.dom()
            .element(node)
            .map(|el| el.value.clone())
            .unwrap_or(Value::Null)
    }

    /// Evaluate expression text in the scope of `node`'s nearest context.
    pub fn eval_at(&self, node: NodeId, text: &str) -> Value {
        let ctx = self.find_context(node);
        self.evaluate_in(ctx, text, None)
    }

    /// Assign into the scope of `node` (host-driven state changes).
    pub fn assign_at(&self, node: NodeId, target: &str, value: Value) {
        let ctx = self.find_context(node);
        match self.resolve_target(target) {
            Some(path) => self.assign_target(ctx, &path, value),
            None => self.diagnose(&EngineError::Expression {
                text: target.to_string(),
                message: "not an assignable target".to_string(),
            }),
        }
    }

    /// Subscribe a callback that re-runs whenever any cell it read during
    /// its own run later changes, scoped to `node`'s nearest context.
    pub fn watch_at(&self, node: NodeId, callback: impl Fn(&Engine) + 'static) {
        let ctx = self.find_context(node);
        self.watch(ctx, Rc::new(callback));
        debug!(node = node.index(), "watcher attached");
    }

    /// Install the remote template loader collaborator.
    pub fn set_template_loader(&self, loader: Rc<dyn TemplateLoader>) {
        *self.inner.loader.borrow_mut() = Some(loader);
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
