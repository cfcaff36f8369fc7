// schedule.rs — Pattern queries and static-schedule listing for actors
//
// The pattern of a set of actions is the port-wise maximum of the actions'
// own patterns: the fewest tokens that let any one of them fire. For an
// FSM-less actor the set is every action; for an FSM actor it is the actions
// outside the FSM at actor level and the actions on a state's outgoing
// transitions per state.
//
// An actor is statically schedulable when every scheduling point offers a
// single action whose guard is trivially true (reads no state, calls
// nothing, and evaluates to `true`). That is what the classifier produces
// for pattern-equal action sets.
//
// Preconditions: the actor passes `Actor::check`.
// Postconditions: none (pure queries).
// Failure modes: guard evaluation errors → `InterpError`.
// Side effects: none.

use std::fmt;

use crate::actor::{Action, Actor, Pattern};
use crate::expr::VarRef;
use crate::id::{ActionId, ProcId, StateId};
use crate::interp::{InterpError, Interpreter};
use crate::ir::Inst;

// ── Pattern queries ─────────────────────────────────────────────────────────

/// Actions that are not labels of any FSM transition.
pub fn actions_outside_fsm(actor: &Actor) -> Vec<&Action> {
    let in_fsm = actor.fsm.as_ref().map(|f| f.actions()).unwrap_or_default();
    actor.actions.iter().filter(|a| !in_fsm.contains(&a.id)).collect()
}

/// Actor-level input pattern.
pub fn input_pattern(actor: &Actor) -> Pattern {
    Pattern::max_of(actions_outside_fsm(actor).into_iter().map(|a| &a.input))
}

/// Actor-level output pattern.
pub fn output_pattern(actor: &Actor) -> Pattern {
    Pattern::max_of(actions_outside_fsm(actor).into_iter().map(|a| &a.output))
}

fn state_actions(actor: &Actor, state: StateId) -> Vec<&Action> {
    let Some(fsm) = &actor.fsm else {
        return Vec::new();
    };
    let mut ids: Vec<ActionId> = Vec::new();
    for t in fsm.outgoing(state) {
        if !ids.contains(&t.action) {
            ids.push(t.action);
        }
    }
    ids.into_iter().filter_map(|id| actor.action(id)).collect()
}

/// Input pattern of the transitions leaving `state`.
pub fn state_input_pattern(actor: &Actor, state: StateId) -> Pattern {
    Pattern::max_of(state_actions(actor, state).into_iter().map(|a| &a.input))
}

/// Output pattern of the transitions leaving `state`.
pub fn state_output_pattern(actor: &Actor, state: StateId) -> Pattern {
    Pattern::max_of(state_actions(actor, state).into_iter().map(|a| &a.output))
}

// ── Guards ──────────────────────────────────────────────────────────────────

/// Whether the guard procedure `id` is true regardless of actor state.
pub fn guard_is_trivial(actor: &Actor, id: ProcId) -> Result<bool, InterpError> {
    let Some(proc) = actor.proc(id) else {
        return Err(InterpError::UnknownProc(id));
    };
    if proc.native || !proc.params.is_empty() {
        return Ok(false);
    }
    for inst in proc.insts_forward() {
        let Some(data) = proc.inst(inst) else { continue };
        if matches!(data.kind, Inst::Call { .. }) {
            return Ok(false);
        }
        let mut reads_state = false;
        data.kind.for_each_use(&mut |v| reads_state |= matches!(v, VarRef::Global(_)));
        if reads_state || matches!(data.kind, Inst::Store { target: VarRef::Global(_), .. }) {
            return Ok(false);
        }
    }
    let mut interp = Interpreter::new(actor)?;
    let result = interp.call(id, Vec::new())?;
    Ok(matches!(result, Some(crate::interp::Value::Bool(true))))
}

// ── Schedules ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledAction {
    pub action: String,
    /// Target state, for FSM transitions.
    pub target: Option<String>,
    /// The guard depends on data or state.
    pub guarded: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateSchedule {
    pub state: String,
    pub initial: bool,
    pub input: Pattern,
    pub output: Pattern,
    pub actions: Vec<ScheduledAction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActorSchedule {
    pub actor: String,
    pub is_static: bool,
    pub input: Pattern,
    pub output: Pattern,
    /// Actions outside the FSM, in priority order.
    pub actions: Vec<ScheduledAction>,
    pub states: Vec<StateSchedule>,
}

fn scheduled(actor: &Actor, action: &Action, target: Option<String>) -> Result<ScheduledAction, InterpError> {
    Ok(ScheduledAction {
        action: action.name.clone(),
        target,
        guarded: !guard_is_trivial(actor, action.scheduler)?,
    })
}

/// Compute the schedule listing of `actor`.
pub fn schedule_actor(actor: &Actor) -> Result<ActorSchedule, InterpError> {
    let mut actions = Vec::new();
    for action in actions_outside_fsm(actor) {
        actions.push(scheduled(actor, action, None)?);
    }

    let mut states = Vec::new();
    if let Some(fsm) = &actor.fsm {
        for (id, state) in fsm.states() {
            let mut listed = Vec::new();
            for t in fsm.outgoing(id) {
                if let Some(action) = actor.action(t.action) {
                    listed.push(scheduled(actor, action, Some(fsm.state_name(t.target).to_string()))?);
                }
            }
            states.push(StateSchedule {
                state: state.name.clone(),
                initial: id == fsm.initial(),
                input: state_input_pattern(actor, id),
                output: state_output_pattern(actor, id),
                actions: listed,
            });
        }
    }

    let single = |list: &[ScheduledAction]| list.len() <= 1 && list.iter().all(|a| !a.guarded);
    let is_static = if actor.fsm.is_some() {
        actions.is_empty() && states.iter().all(|s| single(&s.actions))
    } else {
        single(&actions)
    };

    Ok(ActorSchedule {
        actor: actor.name.clone(),
        is_static,
        input: input_pattern(actor),
        output: output_pattern(actor),
        actions,
        states,
    })
}

impl fmt::Display for ScheduledAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.action)?;
        if let Some(target) = &self.target {
            write!(f, " -> {target}")?;
        }
        if self.guarded {
            write!(f, " [guarded]")?;
        }
        Ok(())
    }
}

impl fmt::Display for ActorSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_static { "static" } else { "dynamic" };
        writeln!(f, "actor {} ({kind})", self.actor)?;
        if !self.actions.is_empty() || self.states.is_empty() {
            writeln!(f, "  input {} output {}", self.input, self.output)?;
            for action in &self.actions {
                writeln!(f, "    {action}")?;
            }
        }
        for state in &self.states {
            let initial = if state.initial { " (initial)" } else { "" };
            writeln!(
                f,
                "  state {}{initial}: input {} output {}",
                state.state, state.input, state.output
            )?;
            for action in &state.actions {
                writeln!(f, "    {action}")?;
            }
        }
        Ok(())
    }
}
