//! Template inclusion - `template="id"` and `use="id"` with slot
//! projection.
//!
//! `template` clones a named fragment's children into the element; the
//! clones pick up the surrounding scope when processing descends into them.
//!
//! `use` is component-style invocation: the element's own children become
//! slot fillers (a `slot="name"` attribute targets a named outlet,
//! everything else fills the default outlet), the fragment is expanded in
//! their place, `<slot>` outlets are replaced by the projected fillers or
//! unwrapped to their fallback content, and a fresh context is created so
//! `var="a: expr, b: expr"` parameters evaluate once in the outer scope
//! and seed the expansion's own state. Ownership of fillers moves into the
//! expansion; fillers with no matching outlet are dropped.
//!
//! A missing fragment leaves either directive inert with a diagnostic.

use std::collections::HashMap;

use super::{DirectiveHooks, Flow, priority};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::types::NodeId;

pub(crate) fn register(engine: &Engine) {
    engine.register_directive(
        "template",
        priority::TEMPLATE,
        DirectiveHooks::init_only(|engine, node, inv| {
            if !engine.clone_fragment_children(&inv.value, node) {
                engine.diagnose(&EngineError::TemplateLoad {
                    id: inv.value.clone(),
                    message: "template not available".to_string(),
                });
            }
            Flow::Continue
        }),
    );

    engine.register_directive(
        "use",
        priority::USE,
        DirectiveHooks::init_only(|engine, node, inv| {
            if !engine.template_available(&inv.value) {
                engine.diagnose(&EngineError::TemplateLoad {
                    id: inv.value.clone(),
                    message: "template not available".to_string(),
                });
                return Flow::Continue;
            }
            let fillers = collect_fillers(engine, node);
            engine.clone_fragment_children(&inv.value, node);
            project_slots(engine, node, fillers);

            let outer = engine.find_context(node);
            let ctx = engine.create_context(Some(outer), node);
            if let Some(var) = engine.dom().attr(node, "var") {
                for pair in var.split(',') {
                    let Some((name, expr)) = pair.split_once(':') else {
                        engine.diagnose(&EngineError::Expression {
                            text: var.clone(),
                            message: "expected `name: expression` pairs".to_string(),
                        });
                        continue;
                    };
                    let value = engine.evaluate_in(outer, expr.trim(), None);
                    engine.define_state(ctx, name.trim(), value);
                }
            }
            Flow::Continue
        }),
    );
}

/// Detach the invocation's children, grouped by target slot name.
/// Unnamed content fills the default (empty-name) outlet.
fn collect_fillers(engine: &Engine, node: NodeId) -> HashMap<String, Vec<NodeId>> {
    let children = engine
        .dom()
        .node(node)
        .map(|n| n.children.clone())
        .unwrap_or_default();
    let mut fillers: HashMap<String, Vec<NodeId>> = HashMap::new();
    let mut dom = engine.dom_mut();
    for child in children {
        let name = dom.attr(child, "slot").unwrap_or_default();
        dom.detach(child);
        dom.remove_attr(child, "slot");
        fillers.entry(name).or_default().push(child);
    }
    fillers
}

/// Replace `<slot>` outlets in the expansion with their fillers, or unwrap
/// them to their fallback children.
fn project_slots(engine: &Engine, node: NodeId, mut fillers: HashMap<String, Vec<NodeId>>) {
    let outlets: Vec<NodeId> = {
        let dom = engine.dom();
        dom.descendants(node)
            .into_iter()
            .filter(|id| dom.element(*id).is_some_and(|el| el.tag == "slot"))
            .collect()
    };
    for outlet in outlets {
        let name = engine.dom().attr(outlet, "name").unwrap_or_default();
        let replacements = match fillers.remove(&name) {
            Some(nodes) => nodes,
            None => engine
                .dom()
                .node(outlet)
                .map(|n| n.children.clone())
                .unwrap_or_default(),
        };
        let removed = {
            let mut dom = engine.dom_mut();
            let mut reference = outlet;
            for replacement in replacements {
                dom.insert_after(reference, replacement);
                reference = replacement;
            }
            dom.remove_subtree(outlet)
        };
        engine.forget_elements(&removed);
    }
    // Fillers with no outlet are dropped, not leaked into the expansion.
    for nodes in fillers.into_values() {
        for node in nodes {
            let removed = engine.dom_mut().remove_subtree(node);
            engine.forget_elements(&removed);
            engine.remove_listeners_for_nodes(&removed);
        }
    }
}
