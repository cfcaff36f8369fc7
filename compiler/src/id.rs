// id.rs — Arena handles for the actor IR and the action scheduler
//
// Every IR object lives in an arena owned by its container (locals, nodes and
// instructions by their `Procedure`; globals, procedures and actions by their
// `Actor`; states by the `Fsm`). Handles are plain indices: copying a handle
// never copies the object, and a removed object leaves its slot empty so
// stale handles are detected instead of silently aliasing a new object.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

arena_id!(
    /// A procedure-local variable (parameters included).
    LocalId,
    "%"
);
arena_id!(
    /// An actor state variable.
    GlobalId,
    "@"
);
arena_id!(
    /// A control-flow node inside a procedure.
    NodeId,
    "n"
);
arena_id!(
    /// An instruction inside a procedure.
    InstId,
    "i"
);
arena_id!(
    /// A procedure owned by an actor.
    ProcId,
    "proc"
);
arena_id!(
    /// An action owned by an actor.
    ActionId,
    "act"
);
arena_id!(
    /// A state of an action-scheduler FSM.
    StateId,
    "s"
);

/// Allocator for actor-level action ids. Produces monotonically increasing
/// ids, so a merged action never reuses the id of one it replaced.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdAllocator {
    next_action: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_action(&mut self) -> ActionId {
        let id = ActionId(self.next_action);
        self.next_action += 1;
        id
    }

    /// Make sure future allocations do not collide with `id`.
    pub fn reserve_action(&mut self, id: ActionId) {
        self.next_action = self.next_action.max(id.0 + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_is_monotonic() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.alloc_action(), ActionId(0));
        assert_eq!(ids.alloc_action(), ActionId(1));
        ids.reserve_action(ActionId(7));
        assert_eq!(ids.alloc_action(), ActionId(8));
        ids.reserve_action(ActionId(2));
        assert_eq!(ids.alloc_action(), ActionId(9));
    }

    #[test]
    fn display_prefixes() {
        assert_eq!(LocalId(3).to_string(), "%3");
        assert_eq!(GlobalId(0).to_string(), "@0");
        assert_eq!(StateId(2).to_string(), "s2");
    }
}
