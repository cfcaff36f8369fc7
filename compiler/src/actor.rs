// actor.rs — Actors: ports, patterns, guarded actions and state variables
//
// An `Actor` owns its procedures and actions. Actions refer to their
// scheduler (guard) and body procedures by `ProcId`; the FSM refers to actions
// by `ActionId`. The classifier replaces sets of actions with new merged ones
// and never edits an action in place.
//
// Preconditions: actor documents are produced by a front-end in SSA form.
// Postconditions: `Actor::check` accepts every actor the passes produce.
// Failure modes: dangling handles or duplicate ids → `ActorError`.
// Side effects: none.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fsm::Fsm;
use crate::id::{ActionId, GlobalId, IdAllocator, ProcId};
use crate::ir::{IrError, ProcScope, Procedure, Signature, Variable};
use crate::types::Type;

// ── Ports and patterns ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
}

impl Port {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Required token count per port. A requirement set: equality is by value
/// and port order carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pattern(BTreeMap<String, u32>);

impl Pattern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, port: impl Into<String>, count: u32) -> Self {
        self.set(port, count);
        self
    }

    pub fn set(&mut self, port: impl Into<String>, count: u32) {
        self.0.insert(port.into(), count);
    }

    /// Token count required on `port`; 0 if the port is absent.
    pub fn get(&self, port: &str) -> u32 {
        self.0.get(port).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(p, n)| (p.as_str(), *n))
    }

    /// Raise each port's requirement to at least the one in `other`.
    pub fn merge_max(&mut self, other: &Pattern) {
        for (port, count) in other.iter() {
            let slot = self.0.entry(port.to_string()).or_insert(0);
            *slot = (*slot).max(count);
        }
    }

    /// Port-wise maximum over a set of patterns.
    pub fn max_of<'a>(patterns: impl IntoIterator<Item = &'a Pattern>) -> Pattern {
        let mut out = Pattern::new();
        for p in patterns {
            out.merge_max(p);
        }
        out
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (port, count)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{port}: {count}")?;
        }
        write!(f, "}}")
    }
}

// ── Actions ─────────────────────────────────────────────────────────────────

/// A firing rule: token requirements, a boolean guard procedure, a body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    pub name: String,
    #[serde(default)]
    pub input: Pattern,
    #[serde(default)]
    pub output: Pattern,
    /// Procedure returning `bool`: may this action fire now?
    pub scheduler: ProcId,
    pub body: ProcId,
    #[serde(default)]
    pub tag: Option<String>,
}

impl Action {
    /// Both patterns equal by value.
    pub fn same_patterns(&self, other: &Action) -> bool {
        self.input == other.input && self.output == other.output
    }
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ActorError {
    #[error("cannot parse actor document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("actor '{actor}': duplicate action id {id}")]
    DuplicateAction { actor: String, id: ActionId },
    #[error("actor '{actor}': action '{action}' refers to unknown procedure {proc}")]
    UnknownProcedure {
        actor: String,
        action: String,
        proc: ProcId,
    },
    #[error("actor '{actor}': FSM refers to unknown action {id}")]
    UnknownFsmAction { actor: String, id: ActionId },
    #[error("actor '{actor}': pattern of action '{action}' names unknown port '{port}'")]
    UnknownPort {
        actor: String,
        action: String,
        port: String,
    },
    #[error("actor '{actor}': {source}")]
    Ir {
        actor: String,
        #[source]
        source: IrError,
    },
}

// ── Actor ───────────────────────────────────────────────────────────────────

/// A dataflow actor in IR form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<Port>,
    #[serde(default)]
    pub outputs: Vec<Port>,
    /// State variables, indexed by `GlobalId`.
    #[serde(default)]
    pub globals: Vec<Variable>,
    /// Procedures, indexed by `ProcId`.
    #[serde(default)]
    pub procs: Vec<Procedure>,
    /// Actions in declaration (priority) order.
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub fsm: Option<Fsm>,
    #[serde(default, skip_serializing)]
    ids: IdAllocator,
}

impl Actor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            globals: Vec::new(),
            procs: Vec::new(),
            actions: Vec::new(),
            fsm: None,
            ids: IdAllocator::new(),
        }
    }

    /// Parse an actor document and check its handles.
    pub fn from_json(text: &str) -> Result<Self, ActorError> {
        let mut actor: Actor = serde_json::from_str(text)?;
        for action in &actor.actions {
            actor.ids.reserve_action(action.id);
        }
        actor.check()?;
        Ok(actor)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    // ── Lookup ──

    pub fn proc(&self, id: ProcId) -> Option<&Procedure> {
        self.procs.get(id.index())
    }

    pub fn proc_mut(&mut self, id: ProcId) -> Option<&mut Procedure> {
        self.procs.get_mut(id.index())
    }

    pub fn proc_by_name(&self, name: &str) -> Option<ProcId> {
        self.procs
            .iter()
            .position(|p| p.name == name)
            .map(|i| ProcId(i as u32))
    }

    pub fn action(&self, id: ActionId) -> Option<&Action> {
        self.actions.iter().find(|a| a.id == id)
    }

    pub fn action_by_name(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn input(&self, name: &str) -> Option<&Port> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&Port> {
        self.outputs.iter().find(|p| p.name == name)
    }

    /// State variables with their handles.
    pub fn state_vars(&self) -> impl Iterator<Item = (GlobalId, &Variable)> {
        self.globals
            .iter()
            .enumerate()
            .map(|(i, v)| (GlobalId(i as u32), v))
    }

    /// Signatures of all procedures, indexed by `ProcId`.
    pub fn signatures(&self) -> Vec<Signature> {
        self.procs.iter().map(Procedure::signature).collect()
    }

    pub fn scope(&self, id: ProcId) -> Option<ProcScope<'_>> {
        self.proc(id).map(|p| ProcScope::new(p, &self.globals))
    }

    // ── Construction ──

    pub fn add_global(&mut self, var: Variable) -> GlobalId {
        self.globals.push(var);
        GlobalId(self.globals.len() as u32 - 1)
    }

    pub fn add_proc(&mut self, proc: Procedure) -> ProcId {
        self.procs.push(proc);
        ProcId(self.procs.len() as u32 - 1)
    }

    /// Append a new action with a fresh id.
    pub fn add_action(
        &mut self,
        name: impl Into<String>,
        input: Pattern,
        output: Pattern,
        scheduler: ProcId,
        body: ProcId,
    ) -> ActionId {
        let id = self.alloc_action_id();
        self.actions.push(Action {
            id,
            name: name.into(),
            input,
            output,
            scheduler,
            body,
            tag: None,
        });
        id
    }

    pub fn alloc_action_id(&mut self) -> ActionId {
        self.ids.alloc_action()
    }

    /// Create a `bool` procedure `name` whose body is `return true`.
    pub fn add_always_true(&mut self, name: impl Into<String>) -> Result<ProcId, IrError> {
        use crate::expr::Expr;
        use crate::ir::{Inst, ListRef};

        let mut proc = Procedure::new(name, Type::Bool);
        let result = proc.add_local(Variable::new("result", Type::Bool));
        let block = proc.new_block();
        proc.append_inst(
            block,
            Inst::Assign {
                target: result,
                value: Expr::Bool(true),
            },
        )?;
        proc.append_inst(
            block,
            Inst::Return {
                value: Some(Expr::var(result)),
            },
        )?;
        proc.push_node(ListRef::Body, block)?;
        Ok(self.add_proc(proc))
    }

    // ── Checks ──

    /// Check that every handle resolves: action ids are unique, actions name
    /// existing procedures and ports, the FSM names existing actions, and
    /// every procedure satisfies its containment invariants.
    pub fn check(&self) -> Result<(), ActorError> {
        let actor = || self.name.clone();
        let mut seen = std::collections::HashSet::new();
        for action in &self.actions {
            if !seen.insert(action.id) {
                return Err(ActorError::DuplicateAction {
                    actor: actor(),
                    id: action.id,
                });
            }
            for proc in [action.scheduler, action.body] {
                if self.proc(proc).is_none() {
                    return Err(ActorError::UnknownProcedure {
                        actor: actor(),
                        action: action.name.clone(),
                        proc,
                    });
                }
            }
            let ports = action
                .input
                .iter()
                .filter(|(p, _)| self.input(p).is_none())
                .chain(action.output.iter().filter(|(p, _)| self.output(p).is_none()));
            if let Some((port, _)) = ports.into_iter().next() {
                return Err(ActorError::UnknownPort {
                    actor: actor(),
                    action: action.name.clone(),
                    port: port.to_string(),
                });
            }
        }
        if let Some(fsm) = &self.fsm {
            for t in fsm.transitions() {
                if !seen.contains(&t.action) {
                    return Err(ActorError::UnknownFsmAction {
                        actor: actor(),
                        id: t.action,
                    });
                }
            }
        }
        for proc in &self.procs {
            proc.verify().map_err(|source| ActorError::Ir {
                actor: actor(),
                source,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_equality_ignores_insertion_order() {
        let a = Pattern::new().with("P0", 3).with("P1", 1);
        let b = Pattern::new().with("P1", 1).with("P0", 3);
        assert_eq!(a, b);
        assert_ne!(a, Pattern::new().with("P0", 4).with("P1", 1));
    }

    #[test]
    fn pattern_max_is_port_wise() {
        let a = Pattern::new().with("A", 2);
        let b = Pattern::new().with("A", 1).with("B", 5);
        let m = Pattern::max_of([&a, &b]);
        assert_eq!(m, Pattern::new().with("A", 2).with("B", 5));
        assert_eq!(m.get("C"), 0);
        assert_eq!(m.to_string(), "{A: 2, B: 5}");
    }

    #[test]
    fn json_round_trip_reserves_action_ids() {
        let mut actor = Actor::new("Count");
        actor.inputs.push(Port::new("IN", Type::Int(16)));
        let guard = actor.add_always_true("guard").unwrap();
        let body = actor.add_proc(Procedure::new("body", Type::Void));
        actor.add_action("a", Pattern::new().with("IN", 1), Pattern::new(), guard, body);

        let json = actor.to_json().unwrap();
        let mut back = Actor::from_json(&json).unwrap();
        assert_eq!(back.actions, actor.actions);
        assert_eq!(back.alloc_action_id(), ActionId(1));
    }

    #[test]
    fn check_rejects_unknown_port() {
        let mut actor = Actor::new("Bad");
        let guard = actor.add_always_true("guard").unwrap();
        actor.add_action("a", Pattern::new().with("X", 1), Pattern::new(), guard, guard);
        let err = actor.check().unwrap_err();
        assert!(matches!(err, ActorError::UnknownPort { ref port, .. } if port == "X"));
    }

    #[test]
    fn state_vars_enumerate_globals() {
        let mut actor = Actor::new("S");
        actor.add_global(Variable::new("count", Type::Int(32)).with_init(crate::expr::Expr::int(0, Type::Int(32))));
        let vars: Vec<_> = actor.state_vars().map(|(id, v)| (id, v.name.clone())).collect();
        assert_eq!(vars, vec![(GlobalId(0), "count".to_string())]);
    }
}
