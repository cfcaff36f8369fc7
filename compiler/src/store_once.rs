// store_once.rs — Single-store canonicalization of state variables
//
// Whole-variable (non-indexed) stores to a state variable are redirected to
// one fresh local per variable, and the variable itself is written by a
// single store in the procedure epilogue. Whole-variable loads read the
// bound local instead of the state variable once a binding exists; the
// first load of a variable that is never stored establishes the binding.
//
// When a state variable is stored under a condition (inside a branch, a loop
// body, or with a predicate), its local is seeded by a load in the prologue
// so the epilogue store writes the old value on paths that do not store.
// Bindings made by loads inside a branch do not leak out of it.
//
// Indexed loads and stores are left untouched.
//
// Preconditions: casts are inserted (stored values have the variable's type).
// Postconditions: at most one whole-variable store per state variable.
// Failure modes: stale handles → `PassError::Ir`.
// Side effects: mints `local_<name>` temporaries.

use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::debug;

use crate::actor::Actor;
use crate::expr::{Expr, VarRef};
use crate::id::{GlobalId, InstId, LocalId, NodeId};
use crate::ir::{Inst, ListRef, Node, Procedure, Variable};
use crate::pass::PassError;

/// Canonicalize every non-native procedure of `actor`. Returns the number of
/// stores redirected to locals.
pub fn store_once(actor: &mut Actor) -> Result<usize, PassError> {
    let mut total = 0;
    for proc in actor.procs.iter_mut().filter(|p| !p.native) {
        total += store_once_in(proc, &actor.globals)?;
    }
    debug!(actor = %actor.name, redirected = total, "single-store canonicalization done");
    Ok(total)
}

/// Canonicalize one procedure.
pub fn store_once_in(proc: &mut Procedure, globals: &[Variable]) -> Result<usize, PassError> {
    let mut stored: IndexMap<GlobalId, bool> = IndexMap::new();
    collect_stores(proc, &proc.body, false, &mut stored);
    if stored.is_empty() && !has_whole_loads(proc) {
        return Ok(0);
    }

    let mut locals = IndexMap::new();
    let mut bindings = HashMap::new();
    let mut prologue = Vec::new();
    for (&global, &conditional) in &stored {
        let Some(var) = globals.get(global.index()) else {
            continue;
        };
        let local = proc.new_temp(var.ty.clone(), &format!("local_{}", var.name));
        locals.insert(global, local);
        if conditional {
            prologue.push((global, local));
            bindings.insert(global, local);
        }
    }

    let mut skip = Vec::new();
    if !prologue.is_empty() {
        let first = proc.ensure_first_block(ListRef::Body)?;
        for (i, (global, local)) in prologue.into_iter().enumerate() {
            let load = proc.insert_inst(
                first,
                i,
                Inst::Load {
                    target: local,
                    source: VarRef::Global(global),
                    indexes: Vec::new(),
                },
            )?;
            skip.push(load);
        }
    }

    let mut pass = StoreOnce {
        proc: &mut *proc,
        locals: &locals,
        skip,
        redirected: 0,
    };
    pass.visit_list(ListRef::Body, &mut bindings)?;
    let redirected = pass.redirected;

    if locals.is_empty() {
        return Ok(redirected);
    }
    // Epilogue: one store per variable, before a trailing return.
    let last = proc.last_block()?;
    let trailing_return = proc
        .block_insts(last)
        .last()
        .copied()
        .filter(|i| proc.inst(*i).is_some_and(|d| d.kind.is_return()));
    for (&global, &local) in &locals {
        let store = Inst::Store {
            target: VarRef::Global(global),
            indexes: Vec::new(),
            value: Expr::var(local),
        };
        match trailing_return {
            Some(ret) => proc.insert_before(ret, store)?,
            None => proc.append_inst(last, store)?,
        };
    }
    Ok(redirected)
}

/// Record every state variable with a whole-variable store, and whether any
/// of its stores is conditional.
fn collect_stores(proc: &Procedure, list: &[NodeId], nested: bool, out: &mut IndexMap<GlobalId, bool>) {
    for &node in list {
        match proc.node(node) {
            Some(Node::Block { insts }) => {
                for &inst in insts {
                    let Some(data) = proc.inst(inst) else { continue };
                    if let Inst::Store {
                        target: VarRef::Global(global),
                        indexes,
                        ..
                    } = &data.kind
                    {
                        if indexes.is_empty() {
                            let conditional = nested || data.predicate.is_some();
                            *out.entry(*global).or_insert(false) |= conditional;
                        }
                    }
                }
            }
            Some(Node::If {
                then_nodes,
                else_nodes,
                ..
            }) => {
                collect_stores(proc, then_nodes, true, out);
                collect_stores(proc, else_nodes, true, out);
            }
            Some(Node::While { body, .. }) => collect_stores(proc, body, true, out),
            None => {}
        }
    }
}

fn has_whole_loads(proc: &Procedure) -> bool {
    proc.insts_forward().into_iter().any(|i| {
        matches!(
            proc.inst(i).map(|d| &d.kind),
            Some(Inst::Load { source: VarRef::Global(_), indexes, .. }) if indexes.is_empty()
        )
    })
}

struct StoreOnce<'a> {
    proc: &'a mut Procedure,
    locals: &'a IndexMap<GlobalId, LocalId>,
    /// Prologue loads, which must stay loads.
    skip: Vec<InstId>,
    redirected: usize,
}

impl StoreOnce<'_> {
    fn visit_list(&mut self, list: ListRef, bindings: &mut HashMap<GlobalId, LocalId>) -> Result<(), PassError> {
        for node in self.proc.list(list).to_vec() {
            match self.proc.node(node) {
                Some(Node::Block { .. }) => self.visit_block(node, bindings)?,
                Some(Node::If { .. }) => {
                    self.visit_list(ListRef::Then(node), &mut bindings.clone())?;
                    self.visit_list(ListRef::Else(node), &mut bindings.clone())?;
                }
                Some(Node::While { .. }) => {
                    self.visit_list(ListRef::LoopBody(node), &mut bindings.clone())?;
                }
                None => {}
            }
        }
        Ok(())
    }

    fn visit_block(&mut self, block: NodeId, bindings: &mut HashMap<GlobalId, LocalId>) -> Result<(), PassError> {
        for inst in self.proc.block_insts(block).to_vec() {
            if self.skip.contains(&inst) {
                continue;
            }
            let Some(kind) = self.proc.inst(inst).map(|d| d.kind.clone()) else {
                continue;
            };
            match kind {
                Inst::Store {
                    target: VarRef::Global(global),
                    indexes,
                    value,
                } if indexes.is_empty() => {
                    let Some(&local) = self.locals.get(&global) else {
                        continue;
                    };
                    self.proc.replace_inst(inst, Inst::Assign { target: local, value })?;
                    bindings.insert(global, local);
                    self.redirected += 1;
                }
                Inst::Load {
                    target,
                    source: VarRef::Global(global),
                    indexes,
                } if indexes.is_empty() => match bindings.get(&global) {
                    Some(&local) => {
                        self.proc.replace_inst(
                            inst,
                            Inst::Assign {
                                target,
                                value: Expr::var(local),
                            },
                        )?;
                    }
                    None => {
                        bindings.insert(global, target);
                    }
                },
                _ => {}
            }
        }
        Ok(())
    }
}
