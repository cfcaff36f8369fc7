// classify.rs — Action classifier and merger
//
// Actions that share a position in the action scheduler (the whole action
// list of an FSM-less actor, or all actions leaving one FSM state towards a
// single target state) are merged when their input and output patterns are
// equal by value. The merged action gets:
//
//   - a scheduler that unconditionally returns true, since all originals
//     require the same token counts;
//   - a dispatch body that, in declaration order, calls each original
//     scheduler and fires the first original body whose guard holds
//     (an if / else-if chain).
//
// Declaration order is the priority between overlapping guards. The merged
// action takes the list position of the first original; in FSM mode every
// edge carrying an original is replaced by one edge per distinct
// (source, target) pair carrying the merged action.
//
// Preconditions: actions name live procedures; schedulers return `bool`.
// Postconditions: no two pattern-equal actions share a state and target.
// Failure modes: none beyond stale handles; unequal patterns are skipped.
// Side effects: appends procedures to the actor; rewrites `actions` and FSM.

use std::collections::HashSet;

use tracing::{debug, info, trace};

use crate::actor::{Action, Actor};
use crate::expr::Expr;
use crate::id::{ActionId, StateId};
use crate::ir::{Inst, ListRef, Procedure};
use crate::pass::PassError;
use crate::types::Type;

/// One merge performed by [`classify`].
#[derive(Debug, Clone, PartialEq)]
pub struct Merge {
    /// Source state, for FSM actors.
    pub state: Option<String>,
    /// Names of the replaced actions, in priority order.
    pub originals: Vec<String>,
    pub merged: ActionId,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifyReport {
    pub merges: Vec<Merge>,
}

/// Merge pattern-equal actions of `actor` in place.
pub fn classify(actor: &mut Actor) -> Result<ClassifyReport, PassError> {
    let mut report = ClassifyReport::default();
    if actor.fsm.is_none() {
        let all: Vec<ActionId> = actor.actions.iter().map(|a| a.id).collect();
        let originals = names(actor, &all);
        if let Some(merged) = try_and_merge(actor, &all)? {
            info!(actor = %actor.name, actions = ?originals, "merging actions");
            report.merges.push(Merge {
                state: None,
                originals,
                merged,
            });
        }
    } else {
        let states: Vec<StateId> = actor
            .fsm
            .iter()
            .flat_map(|fsm| fsm.states().map(|(id, _)| id))
            .collect();
        for state in states {
            if let Some(merge) = examine_state(actor, state)? {
                report.merges.push(merge);
            }
        }
    }
    debug!(actor = %actor.name, merges = report.merges.len(), "classification done");
    Ok(report)
}

fn examine_state(actor: &mut Actor, state: StateId) -> Result<Option<Merge>, PassError> {
    let Some(fsm) = &actor.fsm else {
        return Ok(None);
    };
    let state_name = fsm.state_name(state).to_string();
    let edges: Vec<_> = fsm.outgoing(state).copied().collect();
    if edges.is_empty() {
        trace!(actor = %actor.name, state = %state_name, "no outgoing transitions");
        return Ok(None);
    }
    if fsm.targets(state).len() > 1 {
        debug!(actor = %actor.name, state = %state_name, "transitions fan out, not merging");
        return Ok(None);
    }

    let mut actions: Vec<ActionId> = Vec::new();
    for edge in &edges {
        if !actions.contains(&edge.action) {
            actions.push(edge.action);
        }
    }
    actions.sort_by_key(|id| priority(actor, *id));

    let originals = names(actor, &actions);
    let Some(merged) = try_and_merge(actor, &actions)? else {
        return Ok(None);
    };
    info!(
        actor = %actor.name,
        state = %state_name,
        actions = ?originals,
        "merging actions"
    );

    if let Some(fsm) = actor.fsm.as_mut() {
        let replaced: HashSet<ActionId> = actions.iter().copied().collect();
        let removed = fsm.remove_transitions(|t| replaced.contains(&t.action));
        let mut pairs: Vec<(StateId, StateId)> = Vec::new();
        for t in removed {
            if !pairs.contains(&(t.source, t.target)) {
                pairs.push((t.source, t.target));
            }
        }
        for (source, target) in pairs {
            fsm.add_transition(source, merged, target);
        }
    }

    Ok(Some(Merge {
        state: Some(state_name),
        originals,
        merged,
    }))
}

/// Declaration position of an action; unknown actions sort last.
fn priority(actor: &Actor, id: ActionId) -> usize {
    actor
        .actions
        .iter()
        .position(|a| a.id == id)
        .unwrap_or(usize::MAX)
}

fn names(actor: &Actor, ids: &[ActionId]) -> Vec<String> {
    ids.iter()
        .map(|id| {
            actor
                .action(*id)
                .map_or_else(|| id.to_string(), |a| a.name.clone())
        })
        .collect()
}

/// Merge `ids` if there are at least two and all patterns agree.
fn try_and_merge(actor: &mut Actor, ids: &[ActionId]) -> Result<Option<ActionId>, PassError> {
    if ids.len() <= 1 {
        return Ok(None);
    }
    let originals: Vec<Action> = ids.iter().filter_map(|id| actor.action(*id).cloned()).collect();
    let Some((first, rest)) = originals.split_first() else {
        return Ok(None);
    };
    if let Some(other) = rest.iter().find(|a| !first.same_patterns(a)) {
        debug!(
            actor = %actor.name,
            first = %first.name,
            other = %other.name,
            "patterns differ, not merging"
        );
        return Ok(None);
    }
    merge_actions(actor, &originals).map(Some)
}

fn merge_actions(actor: &mut Actor, originals: &[Action]) -> Result<ActionId, PassError> {
    let scheduler_name = fresh_proc_name(actor, "isSchedulable_SDF");
    let scheduler = actor.add_always_true(scheduler_name)?;

    let body_name = fresh_proc_name(actor, "SDF");
    let body = build_dispatch(actor, originals, body_name.clone())?;
    let body = actor.add_proc(body);

    let first = &originals[0];
    let id = actor.alloc_action_id();
    let merged = Action {
        id,
        name: body_name,
        input: first.input.clone(),
        output: first.output.clone(),
        scheduler,
        body,
        tag: None,
    };

    let replaced: HashSet<ActionId> = originals.iter().map(|a| a.id).collect();
    let position = actor
        .actions
        .iter()
        .position(|a| replaced.contains(&a.id))
        .unwrap_or(actor.actions.len());
    actor.actions.retain(|a| !replaced.contains(&a.id));
    actor.actions.insert(position.min(actor.actions.len()), merged);
    Ok(id)
}

/// `base`, or `base_N` for the first N that no procedure uses.
fn fresh_proc_name(actor: &Actor, base: &str) -> String {
    if actor.proc_by_name(base).is_none() {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{base}_{n}"))
        .find(|name| actor.proc_by_name(name).is_none())
        .unwrap_or_else(|| base.to_string())
}

/// Build the if / else-if chain firing the first original whose scheduler
/// returns true.
fn build_dispatch(actor: &Actor, originals: &[Action], name: String) -> Result<Procedure, PassError> {
    let mut proc = Procedure::new(name, Type::Void);
    let mut list = ListRef::Body;
    for action in originals {
        let (guard_name, guard_ty) = actor
            .proc(action.scheduler)
            .map_or_else(|| (action.scheduler.to_string(), Type::Bool), |p| (p.name.clone(), p.return_type.clone()));
        let ret = proc.new_temp(guard_ty, &format!("{guard_name}_ret"));

        let check = proc.ensure_first_block(list)?;
        proc.append_inst(
            check,
            Inst::Call {
                target: Some(ret),
                callee: action.scheduler,
                args: Vec::new(),
            },
        )?;

        let branch = proc.new_if(Expr::var(ret));
        let fire = proc.new_block();
        proc.append_inst(
            fire,
            Inst::Call {
                target: None,
                callee: action.body,
                args: Vec::new(),
            },
        )?;
        proc.push_node(ListRef::Then(branch), fire)?;
        proc.push_node(list, branch)?;
        list = ListRef::Else(branch);
    }
    let last = proc.last_block()?;
    proc.append_inst(last, Inst::Return { value: None })?;
    Ok(proc)
}
