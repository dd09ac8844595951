//! Event listeners, modifiers and dispatch.
//!
//! `on:<event>` registers an expression handler in the element's nearest
//! context, with `$event` as an evaluation-scoped local. Modifier suffixes
//! on the attribute name: `.prevent` marks the dispatch result, `.once`
//! arms a single run, `.stop` ends bubbling after the current element, and
//! `.debounce(ms)` defers the handler on the engine-virtual clock,
//! resetting the window on every dispatch.
//!
//! `on:init` is not a listener: it evaluates once at processing time, after
//! every other directive on the element.
//!
//! Dispatch bubbles from the target through its document ancestors and
//! flushes reactivity once at the end.

use std::collections::HashSet;
use std::rc::Rc;

use serde_json::{Map, Value};

use super::{DirectiveHooks, Flow, priority};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::types::{ContextId, EventModifiers, NodeId, TimerId};

#[derive(Clone)]
pub(crate) enum Handler {
    /// Expression text evaluated with `$event` in scope.
    Expr(String),
    /// Engine-internal callback (`model`'s write-back).
    Native(Rc<dyn Fn(&Engine, &Value)>),
}

pub(crate) struct Listener {
    pub(crate) node: NodeId,
    pub(crate) event: String,
    pub(crate) mods: EventModifiers,
    pub(crate) debounce: Option<u64>,
    pub(crate) ctx: ContextId,
    pub(crate) handler: Handler,
    fired: bool,
    pending: Option<TimerId>,
}

pub(crate) struct ListenerTable {
    slots: Vec<Option<Listener>>,
}

impl ListenerTable {
    pub(crate) fn new() -> Self {
        Self { slots: Vec::new() }
    }

    fn insert(&mut self, listener: Listener) -> usize {
        self.slots.push(Some(listener));
        self.slots.len() - 1
    }

    /// Listener ids for one element and event, in registration order.
    fn matching(&self, node: NodeId, event: &str) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|l| (index, l)))
            .filter(|(_, l)| l.node == node && l.event == event)
            .map(|(index, _)| index)
            .collect()
    }
}

/// Outcome of a dispatch, for the embedding host.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchResult {
    /// Some handler ran with `.prevent`; the host should suppress its
    /// platform default.
    pub prevented: bool,
}

enum Action {
    Skip,
    Run(Handler, ContextId),
    Debounce(Handler, ContextId, u64, Option<TimerId>),
}

// =============================================================================
// Engine Operations
// =============================================================================

impl Engine {
    pub(crate) fn add_listener(
        &self,
        node: NodeId,
        event: String,
        mods: EventModifiers,
        debounce: Option<u64>,
        ctx: ContextId,
        handler: Handler,
    ) -> usize {
        self.inner().listeners.borrow_mut().insert(Listener {
            node,
            event,
            mods,
            debounce,
            ctx,
            handler,
            fired: false,
            pending: None,
        })
    }

    /// Deliver a host event: the target's listeners run first, then each
    /// ancestor's, until `.stop` or the root.
    pub fn dispatch(&self, target: NodeId, event: &str, payload: Value) -> DispatchResult {
        let chain = {
            let dom = self.dom();
            let mut chain = vec![target];
            chain.extend(dom.ancestors(target));
            chain
        };
        let mut prevented = false;
        'bubble: for node in chain {
            let ids = self.inner().listeners.borrow().matching(node, event);
            let mut stop = false;
            for id in ids {
                let action = {
                    let mut table = self.inner().listeners.borrow_mut();
                    match table.slots.get_mut(id).and_then(|s| s.as_mut()) {
                        Some(l) if !(l.mods.contains(EventModifiers::ONCE) && l.fired) => {
                            l.fired = true;
                            if l.mods.contains(EventModifiers::PREVENT) {
                                prevented = true;
                            }
                            if l.mods.contains(EventModifiers::STOP) {
                                stop = true;
                            }
                            match l.debounce {
                                Some(ms) => Action::Debounce(
                                    l.handler.clone(),
                                    l.ctx,
                                    ms,
                                    l.pending.take(),
                                ),
                                None => Action::Run(l.handler.clone(), l.ctx),
                            }
                        }
                        _ => Action::Skip,
                    }
                };
                match action {
                    Action::Skip => {}
                    Action::Run(handler, ctx) => self.run_handler(&handler, ctx, &payload),
                    Action::Debounce(handler, ctx, ms, previous) => {
                        if let Some(timer) = previous {
                            self.cancel_timer(timer);
                        }
                        let payload = payload.clone();
                        let timer = self.schedule_timer(
                            ctx,
                            ms,
                            Rc::new(move |e: &Engine| {
                                if let Some(l) = e
                                    .inner()
                                    .listeners
                                    .borrow_mut()
                                    .slots
                                    .get_mut(id)
                                    .and_then(|s| s.as_mut())
                                {
                                    l.pending = None;
                                }
                                e.run_handler(&handler, ctx, &payload);
                            }),
                        );
                        if let Some(l) = self
                            .inner()
                            .listeners
                            .borrow_mut()
                            .slots
                            .get_mut(id)
                            .and_then(|s| s.as_mut())
                        {
                            l.pending = Some(timer);
                        }
                    }
                }
            }
            if stop {
                break 'bubble;
            }
        }
        self.maybe_flush();
        DispatchResult { prevented }
    }

    pub(crate) fn run_handler(&self, handler: &Handler, ctx: ContextId, payload: &Value) {
        if self.inner().contexts.borrow().get(ctx).is_none() {
            return;
        }
        match handler {
            Handler::Expr(text) => {
                let mut locals = Map::new();
                locals.insert("$event".to_string(), payload.clone());
                self.evaluate_in(ctx, text, Some(&locals));
            }
            Handler::Native(callback) => callback(self, payload),
        }
    }

    pub(crate) fn remove_listeners_for_context(&self, ctx: ContextId) {
        let pending = {
            let mut table = self.inner().listeners.borrow_mut();
            let mut pending = Vec::new();
            for slot in table.slots.iter_mut() {
                if slot.as_ref().is_some_and(|l| l.ctx == ctx)
                    && let Some(listener) = slot.take()
                    && let Some(timer) = listener.pending
                {
                    pending.push(timer);
                }
            }
            pending
        };
        for timer in pending {
            self.cancel_timer(timer);
        }
    }

    pub(crate) fn remove_listeners_for_nodes(&self, nodes: &[NodeId]) {
        let removed: HashSet<NodeId> = nodes.iter().copied().collect();
        let pending = {
            let mut table = self.inner().listeners.borrow_mut();
            let mut pending = Vec::new();
            for slot in table.slots.iter_mut() {
                if slot.as_ref().is_some_and(|l| removed.contains(&l.node))
                    && let Some(listener) = slot.take()
                    && let Some(timer) = listener.pending
                {
                    pending.push(timer);
                }
            }
            pending
        };
        for timer in pending {
            self.cancel_timer(timer);
        }
    }
}

// =============================================================================
// Directives
// =============================================================================

pub(crate) fn register(engine: &Engine) {
    engine.register_directive(
        "on:",
        priority::EVENT,
        DirectiveHooks::init_only(|engine, node, inv| {
            let Some(arg) = inv.arg.as_deref() else {
                return Flow::Continue;
            };
            let Some((event, mods, debounce)) = parse_event_arg(engine, arg, &inv.attr) else {
                return Flow::Continue;
            };
            let ctx = engine.find_context(node);
            engine.add_listener(
                node,
                event,
                mods,
                debounce,
                ctx,
                Handler::Expr(inv.value.clone()),
            );
            Flow::Continue
        }),
    );

    engine.register_directive(
        "on:init",
        priority::INIT,
        DirectiveHooks::init_only(|engine, node, inv| {
            let ctx = engine.find_context(node);
            engine.evaluate_in(ctx, &inv.value, None);
            Flow::Continue
        }),
    );
}

fn parse_event_arg(
    engine: &Engine,
    arg: &str,
    attr: &str,
) -> Option<(String, EventModifiers, Option<u64>)> {
    let mut parts = arg.split('.');
    let event = parts.next().unwrap_or_default().to_string();
    if event.is_empty() {
        engine.diagnose(&EngineError::Expression {
            text: attr.to_string(),
            message: "missing event name".to_string(),
        });
        return None;
    }
    let mut mods = EventModifiers::empty();
    let mut debounce = None;
    for part in parts {
        match part {
            "prevent" => mods |= EventModifiers::PREVENT,
            "once" => mods |= EventModifiers::ONCE,
            "stop" => mods |= EventModifiers::STOP,
            other => {
                let parsed = other
                    .strip_prefix("debounce(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .and_then(|ms| ms.trim().parse::<u64>().ok());
                match parsed {
                    Some(ms) => debounce = Some(ms),
                    None => engine.diagnose(&EngineError::Expression {
                        text: attr.to_string(),
                        message: format!("unknown event modifier `{other}`"),
                    }),
                }
            }
        }
    }
    Some((event, mods, debounce))
}
