// pass.rs — Pass descriptor module: metadata, dependency resolution, errors
//
// Declares the actor-level transformation passes, their dependency edges and
// the invariant each one establishes. The pipeline runner uses
// `required_passes` to expand a selection into execution order.

use std::collections::HashSet;

use crate::ir::IrError;
use crate::types::Type;

// ── Pass identifiers ───────────────────────────────────────────────────────

/// Identifies each actor-level pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PassId {
    InsertCasts,
    StoreOnce,
    IfConvert,
    RemovePhis,
    Classify,
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a pass.
pub struct PassDescriptor {
    /// Human-readable name for diagnostics/verbose output.
    pub name: &'static str,
    /// Passes that must have run first.
    pub inputs: &'static [PassId],
    /// What holds after the pass (documentation only).
    pub invariants: &'static str,
}

/// Return the static descriptor for a given pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::InsertCasts => PassDescriptor {
            name: "insert_casts",
            inputs: &[],
            invariants: "every expression has the type its context requires",
        },
        PassId::StoreOnce => PassDescriptor {
            name: "store_once",
            inputs: &[],
            invariants: "each state variable is stored at most once per procedure (whole-variable stores)",
        },
        PassId::IfConvert => PassDescriptor {
            name: "if_convert",
            inputs: &[PassId::InsertCasts],
            invariants: "no conditionals remain; hoisted instructions carry predicates",
        },
        PassId::RemovePhis => PassDescriptor {
            name: "remove_phis",
            inputs: &[PassId::InsertCasts],
            invariants: "no phi-assignments remain",
        },
        PassId::Classify => PassDescriptor {
            name: "classify",
            inputs: &[],
            invariants: "pattern-equal parallel actions are merged",
        },
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// All pass IDs in execution order.
pub const ALL_PASSES: [PassId; 5] = [
    PassId::InsertCasts,
    PassId::StoreOnce,
    PassId::IfConvert,
    PassId::RemovePhis,
    PassId::Classify,
];

/// Compute the minimal ordered set of passes needed to run `terminal`.
/// Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

/// Expand a selection of passes with their dependencies and order the result
/// by `ALL_PASSES`.
pub fn schedule_passes(selected: &[PassId]) -> Vec<PassId> {
    let mut wanted = HashSet::new();
    for &pass in selected {
        wanted.extend(required_passes(pass));
    }
    ALL_PASSES.into_iter().filter(|p| wanted.contains(p)).collect()
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Errors ─────────────────────────────────────────────────────────────────

/// A fatal pass failure. The procedure it names is left partially rewritten
/// and must not be handed to later passes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PassError {
    #[error("procedure '{proc}': if-conversion does not support loops")]
    UnsupportedLoop { proc: String },
    #[error("procedure '{proc}': cannot determine the type required for `{expr}`: {reason}")]
    MissingParentType {
        proc: String,
        expr: String,
        reason: String,
    },
    #[error("procedure '{proc}': expression `{expr}` has no type")]
    Untyped { proc: String, expr: String },
    #[error("procedure '{proc}': phi defining '{target}' has no operand for the {pred} predecessor")]
    MalformedPhi {
        proc: String,
        target: String,
        pred: &'static str,
    },
    #[error("procedure '{proc}': zero initial value of '{target}' ({ty}) is too large to materialize")]
    InitialValueTooLarge { proc: String, target: String, ty: Type },
    #[error(transparent)]
    Ir(#[from] IrError),
}

// ── Tests ──────────────────────────────────────────────────────────────────
