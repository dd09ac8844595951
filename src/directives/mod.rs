//! Directive registry and tree processor.
//!
//! A directive is a named attribute convention with registered
//! init/update/destroy behavior. Names are exact (`state`, `if`, `model`) or
//! prefixed (`bind-`, `class-`, `style-`, `on:`), where the suffix becomes
//! the invocation argument. Re-registering a name replaces the prior
//! behavior.
//!
//! # Processing Order
//!
//! `process_tree` walks elements and applies every matching attribute in
//! descending priority, ties broken by attribute order. Structural
//! directives (state, each, if, switch, template) run before content
//! directives (bind, class, style, model), which run before event/ref/i18n
//! directives - content and event bindings must resolve against a context
//! the structural pass established.
//!
//! Elements inside an inactive branch or unmaterialized loop item are not
//! processed until activation, so side-effecting directives never fire for
//! inactive markup. No directive failure halts sibling or ancestor
//! processing.

pub mod bind;
pub mod condition;
pub mod each;
pub mod events;
pub mod misc;
pub mod model;
pub mod state;
pub mod style;
pub mod template_use;

use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::types::{ContextId, NodeId};

/// Built-in priority bands, descending. Structural > content > events.
pub mod priority {
    pub const STATE: i32 = 1000;
    pub const EACH: i32 = 900;
    pub const IF: i32 = 850;
    pub const SWITCH: i32 = 840;
    pub const TEMPLATE: i32 = 800;
    pub const USE: i32 = 790;
    pub const COMPUTED: i32 = 700;
    pub const STORE: i32 = 690;
    pub const BIND: i32 = 500;
    pub const CLASS: i32 = 450;
    pub const STYLE: i32 = 440;
    pub const SHOW: i32 = 430;
    pub const MODEL: i32 = 400;
    pub const EVENT: i32 = 300;
    pub const REF: i32 = 200;
    pub const I18N: i32 = 150;
    pub const INIT: i32 = 100;
    pub const MARKER: i32 = 0;
}

/// Whether processing descends into the element's children afterwards.
/// Structural directives that capture their subtree return `SkipChildren`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    SkipChildren,
}

/// One matched attribute on one element.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Full attribute name as written.
    pub attr: String,
    /// Registered directive name that matched.
    pub directive: String,
    /// Suffix for prefix-matched names (`on:click.stop` → `click.stop`).
    pub arg: Option<String>,
    /// Attribute value (usually expression text).
    pub value: String,
    /// Attribute position, for deterministic tie-breaking.
    pub index: usize,
}

pub type InitFn = Rc<dyn Fn(&Engine, NodeId, &Invocation) -> Flow>;
pub type HookFn = Rc<dyn Fn(&Engine, NodeId, &Invocation)>;

#[derive(Clone)]
pub struct DirectiveHooks {
    pub init: InitFn,
    pub update: Option<HookFn>,
    pub destroy: Option<HookFn>,
}

impl DirectiveHooks {
    pub fn init_only(init: impl Fn(&Engine, NodeId, &Invocation) -> Flow + 'static) -> Self {
        Self {
            init: Rc::new(init),
            update: None,
            destroy: None,
        }
    }
}

struct DirectiveEntry {
    priority: i32,
    hooks: DirectiveHooks,
}

pub struct DirectiveRegistry {
    entries: HashMap<String, DirectiveEntry>,
    /// Registered prefix names (ending in `-` or `:`), longest first.
    prefixes: Vec<String>,
}

impl DirectiveRegistry {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
            prefixes: Vec::new(),
        }
    }

    fn insert(&mut self, name: &str, priority: i32, hooks: DirectiveHooks) {
        if (name.ends_with('-') || name.ends_with(':')) && !self.prefixes.iter().any(|p| p == name)
        {
            self.prefixes.push(name.to_string());
            self.prefixes.sort_by_key(|p| std::cmp::Reverse(p.len()));
        }
        self.entries.insert(name.to_string(), DirectiveEntry { priority, hooks });
    }

    /// Exact names win over prefix matches (`bind-html` beats `bind-`).
    fn match_attr(&self, attr: &str) -> Option<(String, Option<String>)> {
        if self.entries.contains_key(attr) {
            return Some((attr.to_string(), None));
        }
        for prefix in &self.prefixes {
            if let Some(rest) = attr.strip_prefix(prefix.as_str())
                && !rest.is_empty()
            {
                return Some((prefix.clone(), Some(rest.to_string())));
            }
        }
        None
    }
}

// =============================================================================
// Engine Operations
// =============================================================================

impl Engine {
    /// Register (or replace) a directive. Built-ins use the same entry
    /// point as collaborator extensions.
    pub fn register_directive(&self, name: &str, priority: i32, hooks: DirectiveHooks) {
        self.inner()
            .directives
            .borrow_mut()
            .insert(name, priority, hooks);
    }

    /// Walk a subtree, applying directives at each element.
    pub fn process_tree(&self, root: NodeId) {
        self.process_node(root);
    }

    fn process_node(&self, node: NodeId) {
        {
            let dom = self.dom();
            let Some(detail) = dom.node(node) else { return };
            // Nodes captured by a structural sibling (else-if branches,
            // detached templates) are skipped until materialized.
            if detail.parent.is_none() && node != dom.root() {
                return;
            }
        }
        if self.dom().element(node).is_some() {
            let mut skip = false;
            for invocation in self.match_invocations(node) {
                let entry = {
                    let registry = self.inner().directives.borrow();
                    registry
                        .entries
                        .get(&invocation.directive)
                        .map(|e| e.hooks.clone())
                };
                let Some(hooks) = entry else { continue };
                let flow = (hooks.init)(self, node, &invocation);
                if let Some(destroy) = hooks.destroy.clone() {
                    let ctx = self.find_context(node);
                    let inv = invocation.clone();
                    self.on_context_destroy(ctx, move |engine| destroy(engine, node, &inv));
                }
                if flow == Flow::SkipChildren {
                    skip = true;
                    break;
                }
            }
            if skip {
                return;
            }
        }
        let children = self
            .dom()
            .node(node)
            .map(|n| n.children.clone())
            .unwrap_or_default();
        for child in children {
            self.process_node(child);
        }
    }

    /// Match an element's attributes against the registry, sorted by
    /// descending priority with document order breaking ties. Equal-priority
    /// directives writing the same presentation channel conflict: the
    /// later-applied one wins.
    fn match_invocations(&self, node: NodeId) -> Vec<Invocation> {
        let registry = self.inner().directives.borrow();
        let dom = self.dom();
        let Some(element) = dom.element(node) else {
            return Vec::new();
        };
        let mut matched: Vec<(i32, Invocation)> = Vec::new();
        for (index, attr) in element.attrs.iter().enumerate() {
            if let Some((directive, arg)) = registry.match_attr(&attr.name) {
                let priority = registry.entries[&directive].priority;
                matched.push((
                    priority,
                    Invocation {
                        attr: attr.name.clone(),
                        directive,
                        arg,
                        value: attr.value.clone(),
                        index,
                    },
                ));
            }
        }
        matched.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.index.cmp(&b.1.index)));
        drop(registry);
        drop(dom);

        // Conflict pass: same priority, same channel - later wins.
        let mut keep = vec![true; matched.len()];
        for i in 0..matched.len() {
            for j in (i + 1)..matched.len() {
                if matched[i].0 != matched[j].0 {
                    break;
                }
                if let (Some(a), Some(b)) = (
                    channel(&matched[i].1.directive),
                    channel(&matched[j].1.directive),
                ) && a == b
                {
                    keep[i] = false;
                    if self.debug_enabled() {
                        self.conflict_diag(node, &matched[j].1, &matched[i].1);
                    }
                }
            }
        }
        matched
            .into_iter()
            .zip(keep)
            .filter_map(|((_, inv), kept)| kept.then_some(inv))
            .collect()
    }

    fn conflict_diag(&self, node: NodeId, winner: &Invocation, loser: &Invocation) {
        let target = self
            .dom()
            .element(node)
            .map(|el| el.tag.clone())
            .unwrap_or_default();
        self.diagnose(&EngineError::DirectiveConflict {
            target,
            winner: winner.attr.clone(),
            loser: loser.attr.clone(),
        });
    }
}

/// Presentation channel a directive writes, for conflict detection.
fn channel(directive: &str) -> Option<&'static str> {
    match directive {
        "bind" | "bind-html" => Some("text"),
        _ => None,
    }
}

/// Register every built-in directive on a fresh engine.
pub(crate) fn register_builtins(engine: &Engine) {
    state::register(engine);
    bind::register(engine);
    condition::register(engine);
    each::register(engine);
    events::register(engine);
    model::register(engine);
    style::register(engine);
    template_use::register(engine);
    misc::register(engine);
    crate::i18n::register(engine);
}

/// Tear down one materialized clone: context first (watchers unsubscribe
/// while their nodes still exist), then the subtree and its listener and
/// element associations.
pub(crate) fn remove_materialized(engine: &Engine, clone: NodeId, ctx: ContextId) {
    engine.destroy_context(ctx);
    let removed = engine.dom_mut().remove_subtree(clone);
    engine.forget_elements(&removed);
    engine.remove_listeners_for_nodes(&removed);
}

/// Shared helper: a deduplicated watcher that re-evaluates `text` in the
/// node's nearest context and applies the result to the node.
pub(crate) fn bind_watcher(
    engine: &Engine,
    node: NodeId,
    role: &str,
    text: &str,
    apply: impl Fn(&Engine, NodeId, Value) + 'static,
) {
    let ctx = engine.find_context(node);
    let key = format!("{role}\u{1}{text}\u{1}{}", node.index());
    let text = text.to_string();
    engine.watch_keyed(
        ctx,
        key,
        Rc::new(move |e: &Engine| {
            let value = e.evaluate_in(ctx, &text, None);
            apply(e, node, value);
        }),
    );
}
