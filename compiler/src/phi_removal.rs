// phi_removal.rs — Lowering of phi-assignments to copies
//
// Each phi operand becomes a plain assignment at the end of the predecessor
// block it flows in from: the last block of the then/else branch for
// conditionals; the block before the loop (entry) or the last block of the
// body (back edge) for loops. Missing blocks are synthesized. Phis that
// if-conversion hoisted out of their join become one predicated assignment
// per operand, in place.
//
// An operand that is a never-redefined local (SSA index 0, not a parameter,
// defined by no instruction) holds no meaningful value: it is replaced by the
// zero literal of the target type, and the local is deleted once nothing
// mentions it. Temporaries minted by earlier passes always have a definition.
//
// Preconditions: phis in joins carry one operand per predecessor.
// Postconditions: no `Inst::Phi` remains; every join is empty.
// Failure modes: a phi missing an operand or a guard → `PassError::MalformedPhi`;
//   a zero initial value too large to build → `PassError::InitialValueTooLarge`.
// Side effects: may insert empty blocks before loops; may delete locals.

use std::collections::HashSet;

use tracing::debug;

use crate::actor::Actor;
use crate::expr::{Expr, VarRef};
use crate::id::{InstId, LocalId, NodeId};
use crate::ir::{Inst, ListRef, Node, PhiArm, Pred, Procedure};
use crate::pass::PassError;

/// Remove phis from every non-native procedure of `actor`. Returns the
/// number of phis lowered.
pub fn remove_phis(actor: &mut Actor) -> Result<usize, PassError> {
    let mut total = 0;
    for proc in actor.procs.iter_mut().filter(|p| !p.native) {
        total += remove_phis_in(proc)?;
    }
    debug!(actor = %actor.name, phis = total, "phi removal done");
    Ok(total)
}

/// Remove phis from one procedure.
pub fn remove_phis_in(proc: &mut Procedure) -> Result<usize, PassError> {
    let defined: HashSet<LocalId> = proc
        .insts_forward()
        .into_iter()
        .filter_map(|i| proc.inst(i).and_then(|d| d.kind.def()))
        .collect();
    let mut pass = PhiRemover {
        proc: &mut *proc,
        lowered: 0,
        defined,
        dead: Vec::new(),
    };
    pass.visit_list(ListRef::Body)?;
    let PhiRemover { lowered, dead, .. } = pass;
    for local in dead {
        if proc.local(local).is_some() && proc.mention_count(VarRef::Local(local)) == 0 {
            proc.remove_local(local);
        }
    }
    Ok(lowered)
}

struct PhiRemover<'a> {
    proc: &'a mut Procedure,
    lowered: usize,
    /// Locals with a defining instruction when the pass started.
    defined: HashSet<LocalId>,
    /// Locals replaced by zero; deleted at the end if unused.
    dead: Vec<LocalId>,
}

impl PhiRemover<'_> {
    fn visit_list(&mut self, list: ListRef) -> Result<(), PassError> {
        let mut pos = 0;
        while let Some(&node) = self.proc.list(list).get(pos) {
            pos += self.visit_node(list, pos, node)? + 1;
        }
        Ok(())
    }

    fn visit_node(&mut self, list: ListRef, pos: usize, node: NodeId) -> Result<usize, PassError> {
        match self.proc.node(node) {
            Some(Node::Block { .. }) => {
                self.lower_hoisted(node)?;
                Ok(0)
            }
            Some(Node::If { .. }) => {
                let shift = self.lower_join(list, pos, node, [Pred::Then, Pred::Else])?;
                self.visit_list(ListRef::Then(node))?;
                self.visit_list(ListRef::Else(node))?;
                Ok(shift)
            }
            Some(Node::While { .. }) => {
                let shift = self.lower_join(list, pos, node, [Pred::Entry, Pred::Back])?;
                self.visit_list(ListRef::LoopBody(node))?;
                Ok(shift)
            }
            None => Ok(0),
        }
    }

    /// Lower every phi of the join of `list[pos]`, then clear the join.
    fn lower_join(&mut self, list: ListRef, pos: usize, node: NodeId, preds: [Pred; 2]) -> Result<usize, PassError> {
        let Some(join) = self.proc.join_of(node) else {
            return Ok(0);
        };
        let phis = self.proc.block_insts(join).to_vec();
        let mut shift = 0;
        for phi in &phis {
            let Some(Inst::Phi { target, arms }) = self.proc.inst(*phi).map(|d| d.kind.clone()) else {
                continue;
            };
            for pred in preds {
                let arm = self.arm_for(target, &arms, pred)?;
                let (block, inserted) = self.proc.pred_block(list, pos + shift, pred)?;
                shift += usize::from(inserted);
                let value = self.copy_value(target, arm.var)?;
                self.proc.append_inst(block, Inst::Assign { target, value })?;
            }
            self.lowered += 1;
        }
        if !phis.is_empty() {
            self.proc.clear_block(join)?;
        }
        Ok(shift)
    }

    /// Phis living in an ordinary block were hoisted by if-conversion; each
    /// operand becomes an assignment guarded by its branch predicate.
    fn lower_hoisted(&mut self, block: NodeId) -> Result<(), PassError> {
        for inst in self.proc.block_insts(block).to_vec() {
            let Some(Inst::Phi { target, arms }) = self.proc.inst(inst).map(|d| d.kind.clone()) else {
                continue;
            };
            for arm in arms {
                let Some(guard) = arm.guard else {
                    return Err(self.malformed(target, "guarded"));
                };
                let value = self.copy_value(target, arm.var)?;
                let assign = self.proc.insert_before(inst, Inst::Assign { target, value })?;
                self.set_predicate(assign, guard);
            }
            self.proc.remove_inst(inst)?;
            self.lowered += 1;
        }
        Ok(())
    }

    fn set_predicate(&mut self, inst: InstId, predicate: Expr) {
        if let Some(data) = self.proc.inst_mut(inst) {
            data.predicate = Some(predicate);
        }
    }

    fn arm_for(&self, target: LocalId, arms: &[PhiArm], pred: Pred) -> Result<PhiArm, PassError> {
        arms.iter()
            .find(|a| a.pred == pred)
            .or_else(|| arms.get(pred.index()).filter(|a| !is_tagged_elsewhere(a.pred, pred)))
            .cloned()
            .ok_or_else(|| self.malformed(target, pred.label()))
    }

    fn malformed(&self, target: LocalId, pred: &'static str) -> PassError {
        PassError::MalformedPhi {
            proc: self.proc.name.clone(),
            target: self
                .proc
                .local(target)
                .map_or_else(|| target.to_string(), |v| v.display_name()),
            pred,
        }
    }

    /// The value copied into `target` for operand `source`.
    fn copy_value(&mut self, target: LocalId, source: VarRef) -> Result<Expr, PassError> {
        let VarRef::Local(local) = source else {
            return Ok(Expr::Var(source));
        };
        let initial = self.proc.local(local).is_some_and(|v| v.index == 0);
        if !initial || self.proc.is_param(local) || self.defined.contains(&local) {
            return Ok(Expr::Var(source));
        }
        let Some(var) = self.proc.local(target) else {
            return Ok(Expr::Var(source));
        };
        let zero = Expr::zero(&var.ty).ok_or_else(|| PassError::InitialValueTooLarge {
            proc: self.proc.name.clone(),
            target: var.display_name(),
            ty: var.ty.clone(),
        })?;
        if !self.dead.contains(&local) {
            self.dead.push(local);
        }
        Ok(zero)
    }
}

/// Positional fallback for untagged operands: slot `pred.index()` is only
/// used when its tag does not belong to the other kind of construct.
fn is_tagged_elsewhere(tag: Pred, wanted: Pred) -> bool {
    let conditional = |p: Pred| matches!(p, Pred::Then | Pred::Else);
    conditional(tag) != conditional(wanted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::if_convert::if_convert_proc;
    use crate::ir::Variable;
    use crate::types::Type;

    fn count_phis(p: &Procedure) -> usize {
        p.insts_forward()
            .into_iter()
            .filter(|i| p.inst(*i).unwrap().kind.is_phi())
            .count()
    }

    /// if c { y_1 := 1 } else { } join { y_2 := phi(then: y_1, else: y) }
    fn conditional() -> Procedure {
        let mut p = Procedure::new("cond", Type::Void);
        let c = p.add_param(Variable::new("c", Type::Bool));
        let y0 = p.add_local(Variable::new("y", Type::Int(8)));
        let y1 = p.add_local(Variable::new("y", Type::Int(8)).with_index(1));
        let y2 = p.add_local(Variable::new("y", Type::Int(8)).with_index(2));
        let branch = p.new_if(Expr::var(c));
        let then_block = p.new_block();
        p.append_inst(then_block, Inst::Assign { target: y1, value: Expr::int(1, Type::Int(8)) })
            .unwrap();
        p.push_node(ListRef::Then(branch), then_block).unwrap();
        let join = p.join_of(branch).unwrap();
        p.append_inst(
            join,
            Inst::Phi {
                target: y2,
                arms: vec![PhiArm::new(Pred::Then, y1), PhiArm::new(Pred::Else, y0)],
            },
        )
        .unwrap();
        p.push_node(ListRef::Body, branch).unwrap();
        p
    }

    #[test]
    fn conditional_phi_becomes_copies_in_each_branch() {
        let mut p = conditional();
        assert_eq!(remove_phis_in(&mut p).unwrap(), 1);
        assert_eq!(count_phis(&p), 0);
        p.verify().unwrap();
        assert_eq!(
            p.display(&[], &[]).to_string(),
            "proc cond(bool c) -> void {\n  if c {\n    y_1 := 1\n    y_2 := y_1\n  } else {\n    y_2 := 0\n  }\n}\n"
        );
    }

    #[test]
    fn initial_value_local_is_deleted() {
        let mut p = conditional();
        remove_phis_in(&mut p).unwrap();
        assert!(p.local(LocalId(1)).is_none());
        assert!(p.local(LocalId(2)).is_some());
    }

    #[test]
    fn defined_initial_local_is_copied_not_zeroed() {
        let mut p = conditional();
        let y0 = LocalId(1);
        let before = p.new_block();
        p.append_inst(before, Inst::Assign { target: y0, value: Expr::int(5, Type::Int(8)) })
            .unwrap();
        p.insert_node(ListRef::Body, 0, before).unwrap();
        remove_phis_in(&mut p).unwrap();
        let text = p.display(&[], &[]).to_string();
        assert!(text.contains("y_2 := y\n"), "{text}");
        assert!(p.local(y0).is_some());
    }

    #[test]
    fn oversized_zero_initial_value_is_refused() {
        let mut p = Procedure::new("big", Type::Void);
        let c = p.add_param(Variable::new("c", Type::Bool));
        let huge = Type::list(4_000_000_000, Type::Int(8));
        let a0 = p.add_local(Variable::new("a", huge.clone()));
        let a1 = p.add_local(Variable::new("a", huge).with_index(1));
        let branch = p.new_if(Expr::var(c));
        let join = p.join_of(branch).unwrap();
        p.append_inst(
            join,
            Inst::Phi {
                target: a1,
                arms: vec![PhiArm::new(Pred::Then, a0), PhiArm::new(Pred::Else, a0)],
            },
        )
        .unwrap();
        p.push_node(ListRef::Body, branch).unwrap();
        assert!(matches!(
            remove_phis_in(&mut p),
            Err(PassError::InitialValueTooLarge { ref target, .. }) if target == "a_1"
        ));
    }

    #[test]
    fn parameter_operand_is_copied_not_zeroed() {
        let mut p = conditional();
        let join = p.join_of(p.body[0]).unwrap();
        let phi = p.block_insts(join)[0];
        let c = p.params[0];
        let Inst::Phi { arms, .. } = &mut p.inst_mut(phi).unwrap().kind else {
            panic!("expected phi")
        };
        arms[1].var = VarRef::Local(c);
        remove_phis_in(&mut p).unwrap();
        let text = p.display(&[], &[]).to_string();
        assert!(text.contains("y_2 := c"), "{text}");
    }

    #[test]
    fn loop_without_preceding_block_gets_one() {
        let mut p = Procedure::new("count", Type::Void);
        let n = p.add_param(Variable::new("n", Type::Int(8)));
        let i1 = p.add_local(Variable::new("i", Type::Int(8)).with_index(1));
        let i2 = p.add_local(Variable::new("i", Type::Int(8)).with_index(2));
        let lp = p.new_while(Expr::var(i1));
        let join = p.join_of(lp).unwrap();
        p.append_inst(
            join,
            Inst::Phi {
                target: i1,
                arms: vec![PhiArm::new(Pred::Entry, n), PhiArm::new(Pred::Back, i2)],
            },
        )
        .unwrap();
        let body = p.new_block();
        p.append_inst(body, Inst::Assign { target: i2, value: Expr::var(i1) })
            .unwrap();
        p.push_node(ListRef::LoopBody(lp), body).unwrap();
        p.push_node(ListRef::Body, lp).unwrap();

        assert_eq!(remove_phis_in(&mut p).unwrap(), 1);
        assert_eq!(p.body.len(), 2);
        assert_eq!(p.body[1], lp);
        assert_eq!(
            p.display(&[], &[]).to_string(),
            "proc count(int8 n) -> void {\n  i_1 := n\n  while i_1 {\n    i_2 := i_1\n    i_1 := i_2\n  }\n}\n"
        );
    }

    #[test]
    fn hoisted_phi_becomes_guarded_copies() {
        let mut p = conditional();
        if_convert_proc(&mut p).unwrap();
        assert_eq!(remove_phis_in(&mut p).unwrap(), 1);
        assert_eq!(count_phis(&p), 0);
        assert_eq!(
            p.display(&[], &[]).to_string(),
            "proc cond(bool c) -> void {\n  [c] y_1 := 1\n  [c] y_2 := y_1\n  [!c] y_2 := 0\n}\n"
        );
    }

    #[test]
    fn unguarded_phi_in_plain_block_is_malformed() {
        let mut p = Procedure::new("bad", Type::Void);
        let a = p.add_param(Variable::new("a", Type::Int(8)));
        let y = p.add_local(Variable::new("y", Type::Int(8)).with_index(1));
        let block = p.new_block();
        p.append_inst(block, Inst::Phi { target: y, arms: vec![PhiArm::new(Pred::Then, a)] })
            .unwrap();
        p.push_node(ListRef::Body, block).unwrap();
        assert!(matches!(remove_phis_in(&mut p), Err(PassError::MalformedPhi { .. })));
    }
}
