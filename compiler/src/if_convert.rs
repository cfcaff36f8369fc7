// if_convert.rs — If-conversion
//
// Flattens a loop-free procedure into a single block. Every hoisted
// instruction is annotated with the conjunction of the branch conditions
// enclosing it (negated on else paths). Join phis are hoisted under the
// predicate of the enclosing construct, and each phi operand records the
// predicate of the branch it flows in from so phi removal can lower it.
//
// Preconditions: no loops anywhere in the procedure.
// Postconditions: `body` is exactly one block; top-level instructions carry
//                 no predicate, all others do.
// Failure modes: a loop → `PassError::UnsupportedLoop`, detected before any
//                mutation.
// Side effects: frees every original node.

use tracing::debug;

use crate::actor::Actor;
use crate::expr::Expr;
use crate::id::NodeId;
use crate::ir::{Inst, ListRef, Node, Pred, Procedure};
use crate::pass::PassError;

/// If-convert every non-native procedure of `actor`. Returns the number of
/// conditionals eliminated.
pub fn if_convert(actor: &mut Actor) -> Result<usize, PassError> {
    let mut total = 0;
    for proc in actor.procs.iter_mut().filter(|p| !p.native) {
        total += if_convert_proc(proc)?;
    }
    debug!(actor = %actor.name, conditionals = total, "if-conversion done");
    Ok(total)
}

/// If-convert one procedure.
pub fn if_convert_proc(proc: &mut Procedure) -> Result<usize, PassError> {
    if has_loop(proc) {
        return Err(PassError::UnsupportedLoop {
            proc: proc.name.clone(),
        });
    }

    let target = proc.new_block();
    let original = std::mem::take(&mut proc.body);
    let mut converter = IfConverter {
        proc: &mut *proc,
        target,
        removed: 0,
    };
    converter.hoist_list(&original, None)?;
    let removed = converter.removed;
    for node in original {
        proc.free_node(node);
    }
    proc.body = vec![target];
    Ok(removed)
}

struct IfConverter<'a> {
    proc: &'a mut Procedure,
    target: NodeId,
    removed: usize,
}

impl IfConverter<'_> {
    fn hoist_list(&mut self, nodes: &[NodeId], predicate: Option<&Expr>) -> Result<(), PassError> {
        for &node in nodes {
            match self.proc.node(node) {
                Some(Node::Block { .. }) => self.hoist_block(node, predicate)?,
                Some(Node::If { .. }) => self.hoist_if(node, predicate)?,
                Some(Node::While { .. }) => {
                    return Err(PassError::UnsupportedLoop {
                        proc: self.proc.name.clone(),
                    })
                }
                None => {}
            }
        }
        Ok(())
    }

    fn hoist_block(&mut self, block: NodeId, predicate: Option<&Expr>) -> Result<(), PassError> {
        for inst in self.proc.block_insts(block).to_vec() {
            if let Some(data) = self.proc.inst_mut(inst) {
                data.predicate = predicate.cloned();
            }
            self.proc.move_inst(inst, self.target)?;
        }
        Ok(())
    }

    fn hoist_if(&mut self, node: NodeId, previous: Option<&Expr>) -> Result<(), PassError> {
        let Some(Node::If {
            condition,
            then_nodes,
            else_nodes,
            join,
        }) = self.proc.node(node).cloned()
        else {
            return Ok(());
        };

        let then_pred = conjoin(previous, condition.clone());
        self.hoist_list(&then_nodes, Some(&then_pred))?;

        let else_pred = conjoin(previous, Expr::not(condition));
        self.hoist_list(&else_nodes, Some(&else_pred))?;

        for phi in self.proc.block_insts(join).to_vec() {
            if let Some(Inst::Phi { arms, .. }) = self.proc.inst_mut(phi).map(|d| &mut d.kind) {
                for arm in arms {
                    arm.guard = match arm.pred {
                        Pred::Then => Some(then_pred.clone()),
                        Pred::Else => Some(else_pred.clone()),
                        Pred::Entry | Pred::Back => arm.guard.take(),
                    };
                }
            }
        }
        self.hoist_block(join, previous)?;
        self.removed += 1;
        Ok(())
    }
}

fn conjoin(previous: Option<&Expr>, condition: Expr) -> Expr {
    match previous {
        Some(p) => Expr::and(p.clone(), condition),
        None => condition,
    }
}

/// Whether `proc` is already a single flat block.
pub fn is_flat(proc: &Procedure) -> bool {
    match proc.body.as_slice() {
        [] => true,
        [only] => proc.node(*only).is_some_and(Node::is_block),
        _ => false,
    }
}

/// Whether `proc` contains a loop anywhere.
pub fn has_loop(proc: &Procedure) -> bool {
    proc.nodes_in(proc.list(ListRef::Body))
        .into_iter()
        .any(|n| matches!(proc.node(n), Some(Node::While { .. })))
}
