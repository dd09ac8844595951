//! Core shared types - arena ids and event modifier flags.
//!
//! Every arena in the engine (dom nodes, contexts, cells, watchers, timers)
//! hands out small copyable ids instead of references. Ids are only
//! meaningful for the [`crate::engine::Engine`] that issued them.

use bitflags::bitflags;

// =============================================================================
// Arena Ids
// =============================================================================

macro_rules! arena_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub(crate) usize);

        impl $name {
            pub(crate) fn index(self) -> usize {
                self.0
            }
        }
    };
}

arena_id! {
    /// Handle to a node in the document arena.
    NodeId
}

arena_id! {
    /// Handle to a scope node in the context tree.
    ContextId
}

arena_id! {
    /// Handle to a reactive cell.
    CellId
}

arena_id! {
    /// Handle to a registered watcher.
    WatcherId
}

arena_id! {
    /// Handle to a pending cooperative timer (debounce etc.).
    TimerId
}

// =============================================================================
// Event Modifiers
// =============================================================================

bitflags! {
    /// Modifier flags parsed from `on:<event>.<modifier>` attribute names.
    ///
    /// `.debounce(ms)` carries a payload and is stored separately on the
    /// listener rather than as a flag.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EventModifiers: u8 {
        /// `.prevent` - mark the dispatched event default-prevented.
        const PREVENT = 1 << 0;
        /// `.once` - detach the handler after its first invocation.
        const ONCE = 1 << 1;
        /// `.stop` - stop propagation past the handling element.
        const STOP = 1 << 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_comparable() {
        assert_eq!(NodeId(3), NodeId(3));
        assert_ne!(CellId(0), CellId(1));
        assert!(WatcherId(1) < WatcherId(2));
    }

    #[test]
    fn test_modifier_flags_compose() {
        let mods = EventModifiers::PREVENT | EventModifiers::STOP;
        assert!(mods.contains(EventModifiers::PREVENT));
        assert!(!mods.contains(EventModifiers::ONCE));
    }
}
