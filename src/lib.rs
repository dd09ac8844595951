//! # weft
//!
//! Attribute-driven reactive markup engine.
//!
//! Behavior lives in markup: plain elements carry directive attributes
//! (`state`, `bind`, `if`, `each`, `on:click`, ...) that declare state,
//! bindings, control flow and event handling. The engine parses the
//! markup once, walks it through the directive registry, and from then on
//! updates the live document through fine-grained reactivity - there is
//! no virtual-tree diffing and no re-render pass.
//!
//! ## Architecture
//!
//! ```text
//! markup → Document arena → directive processing → contexts + watchers
//!                                                        ↓
//!            cells (reactive state)  ←  expressions  ←  bindings
//! ```
//!
//! - [`dom`] - document arena, markup parser, serializer
//! - [`reactive`] - cells, watchers, implicit dependency tracking, flush
//! - [`context`] - scope tree with shadowing name resolution
//! - [`expr`] - the attribute expression language and its cache
//! - [`directives`] - registry, tree processor and every built-in
//! - [`template`] - named fragments and two-phase remote loading
//! - [`engine`] - the instance owning all of the above
//!
//! Everything hangs off one [`Engine`]: no global registries, no
//! singletons. Clone the handle freely; it shares the instance.
//!
//! ## Example
//!
//! ```ignore
//! use weft::Engine;
//! use serde_json::Value;
//!
//! let engine = Engine::new();
//! engine.mount(r#"
//!     <div state="{count: 0}">
//!         <span bind="count"></span>
//!         <button on:click="count++">+1</button>
//!     </div>
//! "#)?;
//! let button = engine.find_by_tag("button")[0];
//! engine.dispatch(button, "click", Value::Null);
//! ```

pub mod context;
pub mod directives;
pub mod dom;
pub mod engine;
pub mod error;
pub mod expr;
mod filters;
pub mod i18n;
pub mod reactive;
pub mod router;
mod template;
pub mod types;
pub mod value;

pub use directives::events::DispatchResult;
pub use directives::{DirectiveHooks, Flow, Invocation, priority};
pub use engine::{DiagnosticFn, Engine, FilterFn, TemplateLoader};
pub use error::EngineError;
pub use i18n::Translator;
pub use router::Router;
pub use types::{CellId, ContextId, EventModifiers, NodeId, WatcherId};
