//! Conditional rendering - `if`/`else-if`/`else`, `switch`/`case`, and the
//! presentation-only `show`/`hide`.
//!
//! An `if` element and its adjacent `else-if`/`else` siblings are captured
//! as branch templates behind one anchor. Exactly one branch is
//! materialized at a time; switching destroys the old branch's context
//! before its nodes are detached, then clones and processes the new one.
//!
//! `switch` keeps its container attached and renders the first `case` child
//! whose value loosely equals the subject (an `else` child is the default).
//!
//! `show`/`hide` never touch structure: the element stays attached and
//! keeps its context, only `visible` flips.

use std::cell::RefCell;
use std::rc::Rc;

use super::{DirectiveHooks, Flow, bind_watcher, priority, remove_materialized};
use crate::engine::Engine;
use crate::types::{ContextId, NodeId};
use crate::value::{loose_eq, truthy};

/// Condition text plus the detached template root. `None` is the
/// unconditional `else`/default branch.
type Branch = (Option<String>, NodeId);

struct Active {
    index: Option<usize>,
    clone: Option<NodeId>,
    ctx: Option<ContextId>,
}

pub(crate) fn register(engine: &Engine) {
    engine.register_directive(
        "if",
        priority::IF,
        DirectiveHooks::init_only(|engine, node, inv| {
            // Collect the full chain before touching structure.
            let mut branches: Vec<Branch> = vec![(Some(inv.value.clone()), node)];
            {
                let dom = engine.dom();
                let Some(parent) = dom.node(node).and_then(|n| n.parent) else {
                    return Flow::SkipChildren;
                };
                let siblings = dom.node(parent).map(|n| n.children.clone()).unwrap_or_default();
                let Some(pos) = siblings.iter().position(|c| *c == node) else {
                    return Flow::SkipChildren;
                };
                for sibling in &siblings[pos + 1..] {
                    if dom.has_attr(*sibling, "else-if") {
                        let cond = dom.attr(*sibling, "else-if").unwrap_or_default();
                        branches.push((Some(cond), *sibling));
                    } else if dom.has_attr(*sibling, "else") {
                        branches.push((None, *sibling));
                        break;
                    } else {
                        break;
                    }
                }
            }
            let anchor = {
                let mut dom = engine.dom_mut();
                let anchor = dom.create_anchor("if");
                dom.replace(node, anchor);
                dom.remove_attr(node, "if");
                for (_, template) in &branches[1..] {
                    dom.detach(*template);
                    dom.remove_attr(*template, "else-if");
                    dom.remove_attr(*template, "else");
                }
                anchor
            };
            install_branches(engine, anchor, branches, None);
            Flow::SkipChildren
        }),
    );

    engine.register_directive(
        "switch",
        priority::SWITCH,
        DirectiveHooks::init_only(|engine, node, inv| {
            let mut branches: Vec<Branch> = Vec::new();
            let mut plain: Vec<NodeId> = Vec::new();
            {
                let dom = engine.dom();
                let children = dom.node(node).map(|n| n.children.clone()).unwrap_or_default();
                for child in children {
                    if dom.has_attr(child, "case") {
                        let value = dom.attr(child, "case").unwrap_or_default();
                        branches.push((Some(value), child));
                    } else if dom.has_attr(child, "else") {
                        branches.push((None, child));
                    } else {
                        plain.push(child);
                    }
                }
            }
            let anchor = {
                let mut dom = engine.dom_mut();
                for (_, template) in &branches {
                    dom.detach(*template);
                    dom.remove_attr(*template, "case");
                    dom.remove_attr(*template, "else");
                }
                let anchor = dom.create_anchor("switch");
                dom.append_child(node, anchor);
                anchor
            };
            for child in plain {
                engine.process_tree(child);
            }
            install_branches(engine, anchor, branches, Some(inv.value.clone()));
            Flow::SkipChildren
        }),
    );

    engine.register_directive(
        "show",
        priority::SHOW,
        DirectiveHooks::init_only(|engine, node, inv| {
            bind_watcher(engine, node, "show", &inv.value, |e, node, value| {
                if let Some(el) = e.dom_mut().element_mut(node) {
                    el.visible = truthy(&value);
                }
            });
            Flow::Continue
        }),
    );

    engine.register_directive(
        "hide",
        priority::SHOW,
        DirectiveHooks::init_only(|engine, node, inv| {
            bind_watcher(engine, node, "hide", &inv.value, |e, node, value| {
                if let Some(el) = e.dom_mut().element_mut(node) {
                    el.visible = !truthy(&value);
                }
            });
            Flow::Continue
        }),
    );
}

/// One watcher per branch set. With a `subject` expression the branch
/// values are compared loosely against it (`switch`); without one the
/// branch expressions are truth-tested (`if`). The first hit wins; an
/// unchanged winner is left alone.
fn install_branches(
    engine: &Engine,
    anchor: NodeId,
    branches: Vec<Branch>,
    subject: Option<String>,
) {
    let owner = engine.find_context(anchor);
    // Branch templates are detached and reachable only from the watcher;
    // free them when the owning region goes away.
    let templates: Vec<NodeId> = branches.iter().map(|(_, template)| *template).collect();
    engine.on_context_destroy(owner, move |e| {
        for template in &templates {
            let removed = e.dom_mut().remove_subtree(*template);
            e.forget_elements(&removed);
        }
    });
    let active = Rc::new(RefCell::new(Active {
        index: None,
        clone: None,
        ctx: None,
    }));
    let key = format!("branches\u{1}{}", anchor.index());
    engine.watch_keyed(
        owner,
        key,
        Rc::new(move |e: &Engine| {
            // The whole region may have been torn down out of band.
            if e.dom().node(anchor).is_none() {
                return;
            }
            let subject_value = subject.as_ref().map(|text| e.evaluate_in(owner, text, None));
            let chosen = branches.iter().position(|(cond, _)| match cond {
                Some(text) => {
                    let value = e.evaluate_in(owner, text, None);
                    match &subject_value {
                        Some(subject) => loose_eq(subject, &value),
                        None => truthy(&value),
                    }
                }
                None => true,
            });
            let mut state = active.borrow_mut();
            if chosen == state.index {
                return;
            }
            if let (Some(ctx), Some(clone)) = (state.ctx.take(), state.clone.take()) {
                remove_materialized(e, clone, ctx);
            }
            state.index = chosen;
            if let Some(index) = chosen {
                let clone = {
                    let mut dom = e.dom_mut();
                    let clone = dom.clone_subtree(branches[index].1);
                    dom.insert_after(anchor, clone);
                    clone
                };
                let ctx = e.create_context(Some(owner), clone);
                state.clone = Some(clone);
                state.ctx = Some(ctx);
                drop(state);
                e.process_tree(clone);
            }
        }),
    );
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use crate::engine::Engine;

    // Nested structural directives capture detached templates; tearing the
    // enclosing branch down must return them to the node free pool, so the
    // arena occupancy is stable across toggle cycles.
    #[test]
    fn test_branch_teardown_frees_nested_loop_template() {
        let engine = Engine::new();
        engine
            .mount(
                r#"
                <div state="{on: true}">
                    <section if="on">
                        <li each="x in [1, 2]" bind="x"></li>
                    </section>
                    <button on:click="on = !on">toggle</button>
                </div>
                "#,
            )
            .unwrap();
        let button = engine.find_by_tag("button")[0];
        let baseline = engine.dom().live_nodes();
        for _ in 0..4 {
            engine.dispatch(button, "click", Value::Null);
            engine.dispatch(button, "click", Value::Null);
        }
        assert_eq!(engine.dom().live_nodes(), baseline);
        assert_eq!(engine.find_by_tag("li").len(), 2);
    }

    #[test]
    fn test_branch_teardown_frees_nested_chain_templates() {
        let engine = Engine::new();
        engine
            .mount(
                r#"
                <div state="{outer: true, pick: 1}">
                    <section if="outer">
                        <p if="pick == 1">one</p>
                        <p else>other</p>
                    </section>
                    <button on:click="outer = !outer">toggle</button>
                </div>
                "#,
            )
            .unwrap();
        let button = engine.find_by_tag("button")[0];
        let baseline = engine.dom().live_nodes();
        for _ in 0..4 {
            engine.dispatch(button, "click", Value::Null);
            engine.dispatch(button, "click", Value::Null);
        }
        assert_eq!(engine.dom().live_nodes(), baseline);
        assert_eq!(engine.find_by_tag("p").len(), 1);
    }
}
