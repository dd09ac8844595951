//! Named template fragments and two-phase remote loading.
//!
//! `<template id="name">...</template>` elements are collected before
//! directive processing: inline declarations are detached and kept as
//! fragments, declarations with a `src` attribute become remote entries.
//!
//! Remote loading is two-phase. Phase 1 runs inside `mount` and blocks:
//! declarations carrying a `priority` attribute, plus whatever the router
//! lists for the active route, are fetched before the tree is processed.
//! Everything else is phase 2, drained one round per clock advance by
//! [`Engine::pump_prefetch`]. A loaded or failed entry is never fetched
//! again.

use std::collections::HashMap;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::types::NodeId;

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum RemoteState {
    Pending,
    Loaded,
    Failed,
}

pub(crate) struct RemoteTemplate {
    url: String,
    priority: bool,
    state: RemoteState,
}

pub(crate) struct TemplateStore {
    /// Detached container nodes whose children are the fragment.
    fragments: HashMap<String, NodeId>,
    remotes: HashMap<String, RemoteTemplate>,
}

impl TemplateStore {
    pub(crate) fn new() -> Self {
        Self {
            fragments: HashMap::new(),
            remotes: HashMap::new(),
        }
    }
}

// =============================================================================
// Engine Operations
// =============================================================================

impl Engine {
    /// Pre-scan a mounted subtree for `<template id>` declarations and pull
    /// them out of the document.
    pub(crate) fn collect_template_declarations(&self, root: NodeId) {
        let declarations: Vec<NodeId> = {
            let dom = self.dom();
            dom.descendants(root)
                .into_iter()
                .filter(|id| {
                    dom.element(*id).is_some_and(|el| el.tag == "template")
                        && dom.has_attr(*id, "id")
                })
                .collect()
        };
        for node in declarations {
            let (id, src, priority) = {
                let dom = self.dom();
                (
                    dom.attr(node, "id").unwrap_or_default(),
                    dom.attr(node, "src"),
                    dom.has_attr(node, "priority"),
                )
            };
            match src {
                Some(url) => {
                    let removed = self.dom_mut().remove_subtree(node);
                    self.forget_elements(&removed);
                    self.inner().templates.borrow_mut().remotes.insert(
                        id,
                        RemoteTemplate {
                            url,
                            priority,
                            state: RemoteState::Pending,
                        },
                    );
                }
                None => {
                    self.dom_mut().detach(node);
                    self.inner()
                        .templates
                        .borrow_mut()
                        .fragments
                        .insert(id, node);
                }
            }
        }
    }

    /// Phase 1: blocking fetch of priority and active-route templates.
    pub(crate) fn load_phase_one(&self) {
        let route = self.inner().route_templates.borrow().clone();
        let ids: Vec<String> = {
            let templates = self.inner().templates.borrow();
            templates
                .remotes
                .iter()
                .filter(|(id, remote)| {
                    remote.state == RemoteState::Pending
                        && (remote.priority || route.iter().any(|r| r == *id))
                })
                .map(|(id, _)| id.clone())
                .collect()
        };
        for id in ids {
            self.fetch_remote(&id);
        }
    }

    /// Phase 2: fetch every still-pending remote template. Called once per
    /// clock advance; also callable directly by the host.
    pub fn pump_prefetch(&self) {
        let ids: Vec<String> = {
            let templates = self.inner().templates.borrow();
            templates
                .remotes
                .iter()
                .filter(|(_, remote)| remote.state == RemoteState::Pending)
                .map(|(id, _)| id.clone())
                .collect()
        };
        for id in ids {
            self.fetch_remote(&id);
        }
    }

    fn fetch_remote(&self, id: &str) {
        let url = {
            let templates = self.inner().templates.borrow();
            let Some(remote) = templates.remotes.get(id) else {
                return;
            };
            remote.url.clone()
        };
        let loader = self.inner().loader.borrow().clone();
        let Some(loader) = loader else {
            self.mark_remote(id, RemoteState::Failed);
            self.diagnose(&EngineError::TemplateLoad {
                id: id.to_string(),
                message: "no template loader installed".to_string(),
            });
            return;
        };
        match loader.fetch(&url) {
            Ok(markup) => {
                let parsed = {
                    let mut dom = self.dom_mut();
                    let container = dom.create_element("template", Vec::new());
                    dom.parse_into(container, &markup).map(|_| container)
                };
                match parsed {
                    Ok(container) => {
                        self.inner()
                            .templates
                            .borrow_mut()
                            .fragments
                            .insert(id.to_string(), container);
                        self.mark_remote(id, RemoteState::Loaded);
                    }
                    Err(error) => {
                        self.mark_remote(id, RemoteState::Failed);
                        self.diagnose(&EngineError::TemplateLoad {
                            id: id.to_string(),
                            message: error.to_string(),
                        });
                    }
                }
            }
            Err(message) => {
                self.mark_remote(id, RemoteState::Failed);
                self.diagnose(&EngineError::TemplateLoad {
                    id: id.to_string(),
                    message,
                });
            }
        }
    }

    fn mark_remote(&self, id: &str, state: RemoteState) {
        if let Some(remote) = self.inner().templates.borrow_mut().remotes.get_mut(id) {
            remote.state = state;
        }
    }

    pub(crate) fn template_available(&self, id: &str) -> bool {
        self.inner().templates.borrow().fragments.contains_key(id)
    }

    /// Clone a fragment's children under `target`. Returns `false` when the
    /// fragment is unknown or not yet loaded.
    pub(crate) fn clone_fragment_children(&self, id: &str, target: NodeId) -> bool {
        let fragment = self.inner().templates.borrow().fragments.get(id).copied();
        let Some(fragment) = fragment else {
            return false;
        };
        let children = self
            .dom()
            .node(fragment)
            .map(|n| n.children.clone())
            .unwrap_or_default();
        let mut dom = self.dom_mut();
        for child in children {
            let copy = dom.clone_subtree(child);
            dom.append_child(target, copy);
        }
        true
    }
}
