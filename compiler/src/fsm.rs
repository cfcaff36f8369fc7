// fsm.rs — Action-scheduler finite state machine
//
// States are named and kept in declaration order; transitions form a
// multigraph over states labelled with actions. Parallel edges between the
// same pair of states are allowed (one per action), which is exactly what the
// classifier merges.
//
// Preconditions: none.
// Postconditions: `initial` always names a live state.
// Failure modes: lookups of unknown states return `None`.
// Side effects: none.

use serde::{Deserialize, Serialize};

use crate::id::{ActionId, StateId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub name: String,
}

/// `source --action--> target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transition {
    pub source: StateId,
    pub action: ActionId,
    pub target: StateId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fsm {
    states: Vec<State>,
    initial: StateId,
    #[serde(default)]
    transitions: Vec<Transition>,
}

impl Fsm {
    /// An FSM holding a single initial state.
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            states: vec![State {
                name: initial.into(),
            }],
            initial: StateId(0),
            transitions: Vec::new(),
        }
    }

    pub fn add_state(&mut self, name: impl Into<String>) -> StateId {
        self.states.push(State { name: name.into() });
        StateId(self.states.len() as u32 - 1)
    }

    pub fn initial(&self) -> StateId {
        self.initial
    }

    pub fn set_initial(&mut self, state: StateId) -> bool {
        if self.state(state).is_some() {
            self.initial = state;
            true
        } else {
            false
        }
    }

    pub fn state(&self, id: StateId) -> Option<&State> {
        self.states.get(id.index())
    }

    pub fn state_name(&self, id: StateId) -> &str {
        self.state(id).map_or("?", |s| s.name.as_str())
    }

    pub fn state_by_name(&self, name: &str) -> Option<StateId> {
        self.states
            .iter()
            .position(|s| s.name == name)
            .map(|i| StateId(i as u32))
    }

    pub fn states(&self) -> impl Iterator<Item = (StateId, &State)> {
        self.states
            .iter()
            .enumerate()
            .map(|(i, s)| (StateId(i as u32), s))
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn add_transition(&mut self, source: StateId, action: ActionId, target: StateId) {
        self.transitions.push(Transition {
            source,
            action,
            target,
        });
    }

    /// Edges leaving `state`, in edge order.
    pub fn outgoing(&self, state: StateId) -> impl Iterator<Item = &Transition> {
        self.transitions.iter().filter(move |t| t.source == state)
    }

    /// Distinct targets reachable in one step from `state`, first-seen order.
    pub fn targets(&self, state: StateId) -> Vec<StateId> {
        let mut out = Vec::new();
        for t in self.outgoing(state) {
            if !out.contains(&t.target) {
                out.push(t.target);
            }
        }
        out
    }

    /// Remove every edge matching `pred`; returns the removed edges in order.
    pub fn remove_transitions(&mut self, mut pred: impl FnMut(&Transition) -> bool) -> Vec<Transition> {
        let mut removed = Vec::new();
        self.transitions.retain(|t| {
            if pred(t) {
                removed.push(*t);
                false
            } else {
                true
            }
        });
        removed
    }

    /// Actions that appear on more than one edge leaving the same state. A
    /// deterministic scheduler has none.
    pub fn ambiguous(&self) -> Vec<(StateId, ActionId)> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for t in &self.transitions {
            if !seen.insert((t.source, t.action)) && !out.contains(&(t.source, t.action)) {
                out.push((t.source, t.action));
            }
        }
        out
    }

    /// Actions labelling at least one transition, first-seen order.
    pub fn actions(&self) -> Vec<ActionId> {
        let mut out = Vec::new();
        for t in &self.transitions {
            if !out.contains(&t.action) {
                out.push(t.action);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_state() -> Fsm {
        let mut fsm = Fsm::new("idle");
        let run = fsm.add_state("run");
        let idle = fsm.initial();
        fsm.add_transition(idle, ActionId(0), run);
        fsm.add_transition(idle, ActionId(1), run);
        fsm.add_transition(run, ActionId(2), idle);
        fsm
    }

    #[test]
    fn outgoing_and_targets() {
        let fsm = two_state();
        let idle = fsm.state_by_name("idle").unwrap();
        let actions: Vec<_> = fsm.outgoing(idle).map(|t| t.action).collect();
        assert_eq!(actions, vec![ActionId(0), ActionId(1)]);
        assert_eq!(fsm.targets(idle), vec![StateId(1)]);
        assert_eq!(fsm.state_name(StateId(1)), "run");
    }

    #[test]
    fn remove_reports_removed_edges() {
        let mut fsm = two_state();
        let removed = fsm.remove_transitions(|t| t.action != ActionId(2));
        assert_eq!(removed.len(), 2);
        assert_eq!(fsm.transitions().len(), 1);
        assert_eq!(fsm.actions(), vec![ActionId(2)]);
    }

    #[test]
    fn ambiguity_is_per_state() {
        let mut fsm = two_state();
        assert!(fsm.ambiguous().is_empty());
        fsm.add_transition(StateId(0), ActionId(0), StateId(0));
        assert_eq!(fsm.ambiguous(), vec![(StateId(0), ActionId(0))]);
    }

    #[test]
    fn json_form_is_stable() {
        let fsm = two_state();
        let json = serde_json::to_string(&fsm).unwrap();
        let back: Fsm = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fsm);
        assert!(json.contains("\"initial\":0"));
    }
}
