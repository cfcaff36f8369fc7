// cast.rs — Explicit cast insertion
//
// Walks every expression post-order and compares its type against the type
// its syntactic parent requires. Where the two differ in representation
// class or bit width, an explicit `Cast` instruction is inserted and the
// expression is replaced by a reference to the casted temporary.
//
// Required types by position:
//   assign value      → assignment target type
//   store value       → store target type (element type when indexed)
//   call argument     → callee's formal parameter type
//   return value      → procedure return type
//   phi operand       → phi target type (cast at the end of the predecessor)
//   if/while cond     → bool
//   arithmetic operand→ the binary expression's own type
//   comparison operand→ least upper bound of both operand types
//   logical operand   → bool
//   index expression  → none (traversed only)
//
// Preconditions: every variable an expression reads is typed.
// Postconditions: running the pass again inserts no casts.
// Failure modes: call arity mismatch, value return from a void procedure, or
//                an untyped expression → `PassError`.
// Side effects: mints temporaries through the procedure's counter.

use tracing::{debug, trace};

use crate::actor::Actor;
use crate::expr::{Expr, UnaryOp, VarRef};
use crate::id::{InstId, LocalId, NodeId};
use crate::ir::{Inst, ListRef, Node, Pred, ProcScope, Procedure, Signature, Variable};
use crate::pass::PassError;
use crate::types::Type;

/// Insert casts into every non-native procedure of `actor`. Returns the
/// number of cast instructions added.
pub fn insert_casts(actor: &mut Actor) -> Result<usize, PassError> {
    let callees = actor.signatures();
    let mut total = 0;
    for proc in actor.procs.iter_mut().filter(|p| !p.native) {
        total += insert_casts_in(proc, &actor.globals, &callees)?;
    }
    debug!(actor = %actor.name, casts = total, "cast insertion done");
    Ok(total)
}

/// Insert casts into one procedure.
pub fn insert_casts_in(
    proc: &mut Procedure,
    globals: &[Variable],
    callees: &[Signature],
) -> Result<usize, PassError> {
    let mut pass = CastInserter {
        proc,
        globals,
        callees,
        inserted: 0,
    };
    pass.visit_list(ListRef::Body)?;
    trace!(proc = %pass.proc.name, casts = pass.inserted, "casts inserted");
    Ok(pass.inserted)
}

/// Where generated instructions go.
#[derive(Clone, Copy)]
enum Anchor {
    Before(InstId),
    End(NodeId),
}

struct CastInserter<'a> {
    proc: &'a mut Procedure,
    globals: &'a [Variable],
    callees: &'a [Signature],
    inserted: usize,
}

impl CastInserter<'_> {
    // ── Helpers ──

    fn scope(&self) -> ProcScope<'_> {
        ProcScope::new(&*self.proc, self.globals)
    }

    fn render(&self, e: &Expr) -> String {
        e.display(&self.scope()).to_string()
    }

    fn type_of(&self, e: &Expr) -> Result<Type, PassError> {
        e.ty(&self.scope()).ok_or_else(|| PassError::Untyped {
            proc: self.proc.name.clone(),
            expr: self.render(e),
        })
    }

    fn var_type(&self, var: VarRef) -> Result<Type, PassError> {
        self.type_of(&Expr::Var(var))
    }

    fn missing_parent(&self, e: &Expr, reason: impl Into<String>) -> PassError {
        PassError::MissingParentType {
            proc: self.proc.name.clone(),
            expr: self.render(e),
            reason: reason.into(),
        }
    }

    fn emit(&mut self, at: Anchor, kind: Inst) -> Result<InstId, PassError> {
        Ok(match at {
            Anchor::Before(anchor) => self.proc.insert_before(anchor, kind)?,
            Anchor::End(block) => self.proc.append_inst(block, kind)?,
        })
    }

    fn condition(&self, node: NodeId) -> Option<Expr> {
        match self.proc.node(node)? {
            Node::If { condition, .. } | Node::While { condition, .. } => Some(condition.clone()),
            Node::Block { .. } => None,
        }
    }

    fn set_condition(&mut self, node: NodeId, value: Expr) {
        if let Some(Node::If { condition, .. } | Node::While { condition, .. }) = self.proc.node_mut(node) {
            *condition = value;
        }
    }

    // ── Control flow ──

    fn visit_list(&mut self, list: ListRef) -> Result<(), PassError> {
        let mut pos = 0;
        while let Some(&node) = self.proc.list(list).get(pos) {
            pos += self.visit_node(list, pos, node)? + 1;
        }
        Ok(())
    }

    /// Returns how many nodes were inserted into `list` before `pos`.
    fn visit_node(&mut self, list: ListRef, pos: usize, node: NodeId) -> Result<usize, PassError> {
        match self.proc.node(node) {
            Some(Node::Block { .. }) => {
                self.visit_block(node)?;
                Ok(0)
            }
            Some(Node::If { .. }) => self.visit_if(list, pos, node),
            Some(Node::While { .. }) => self.visit_while(list, pos, node),
            None => Ok(0),
        }
    }

    fn visit_if(&mut self, list: ListRef, pos: usize, node: NodeId) -> Result<usize, PassError> {
        let scratch = self.cast_condition(node)?;
        let mut shift = 0;
        if !self.proc.block_insts(scratch).is_empty() {
            let (before, inserted) = self.proc.block_before(list, pos)?;
            self.proc.append_block(before, scratch)?;
            shift += usize::from(inserted);
        }
        self.proc.free_node(scratch);

        self.visit_list(ListRef::Then(node))?;
        self.visit_list(ListRef::Else(node))?;
        shift += self.cast_phis(list, pos + shift, node)?;
        Ok(shift)
    }

    fn visit_while(&mut self, list: ListRef, pos: usize, node: NodeId) -> Result<usize, PassError> {
        let scratch = self.cast_condition(node)?;
        self.visit_list(ListRef::LoopBody(node))?;
        let mut shift = self.cast_phis(list, pos, node)?;

        // The condition is evaluated on both loop-entry edges: once before
        // the loop and again at the end of the body. Reads of loop-header
        // phis become reads of the operand flowing in on that edge.
        let casts = self.proc.block_insts(scratch).to_vec();
        if !casts.is_empty() {
            let (entry_sources, back_sources) = self.loop_phi_sources(node);

            let (before, inserted) = self.proc.block_before(list, pos + shift)?;
            shift += usize::from(inserted);
            let entry = self.proc.copy_insts_preserving_defs(&casts, before)?;
            self.substitute(entry.insts.values().copied(), &entry_sources);

            let end = self.proc.ensure_last_block(ListRef::LoopBody(node))?;
            let back = self.proc.copy_insts_preserving_defs(&casts, end)?;
            self.substitute(back.insts.values().copied(), &back_sources);

            let cast_count = casts
                .iter()
                .filter(|i| matches!(self.proc.inst(**i).map(|d| &d.kind), Some(Inst::Cast { .. })))
                .count();
            self.inserted += cast_count;
        }
        self.proc.free_node(scratch);
        Ok(shift)
    }

    /// Cast the condition of `node` to `bool`, collecting generated
    /// instructions into a detached scratch block.
    fn cast_condition(&mut self, node: NodeId) -> Result<NodeId, PassError> {
        let scratch = self.proc.new_block();
        if let Some(cond) = self.condition(node) {
            let cast = self.cast_expr(cond, Some(&Type::Bool), Anchor::End(scratch))?;
            self.set_condition(node, cast);
        }
        Ok(scratch)
    }

    /// Per-edge `(phi target, operand)` pairs of a loop's header phis.
    fn loop_phi_sources(&self, node: NodeId) -> (Vec<(VarRef, VarRef)>, Vec<(VarRef, VarRef)>) {
        let mut entry = Vec::new();
        let mut back = Vec::new();
        let Some(join) = self.proc.join_of(node) else {
            return (entry, back);
        };
        for &phi in self.proc.block_insts(join) {
            if let Some(Inst::Phi { target, arms }) = self.proc.inst(phi).map(|d| &d.kind) {
                for arm in arms {
                    match arm.pred {
                        Pred::Entry => entry.push((VarRef::Local(*target), arm.var)),
                        Pred::Back => back.push((VarRef::Local(*target), arm.var)),
                        Pred::Then | Pred::Else => {}
                    }
                }
            }
        }
        (entry, back)
    }

    fn substitute(&mut self, insts: impl Iterator<Item = InstId>, pairs: &[(VarRef, VarRef)]) {
        for inst in insts {
            if let Some(data) = self.proc.inst_mut(inst) {
                for (old, new) in pairs {
                    data.kind.replace_use(*old, *new);
                }
            }
        }
    }

    /// Cast phi operands of the join of `list[pos]` to the phi target type,
    /// at the end of each operand's predecessor block.
    fn cast_phis(&mut self, list: ListRef, pos: usize, node: NodeId) -> Result<usize, PassError> {
        let Some(join) = self.proc.join_of(node) else {
            return Ok(0);
        };
        let mut shift = 0;
        for phi in self.proc.block_insts(join).to_vec() {
            let Some(Inst::Phi { target, arms }) = self.proc.inst(phi).map(|d| d.kind.clone()) else {
                continue;
            };
            let target_ty = self.var_type(VarRef::Local(target))?;
            let mut new_arms = arms.clone();
            for arm in &mut new_arms {
                if !self.var_type(arm.var)?.needs_cast(&target_ty) {
                    continue;
                }
                let (block, inserted) = self.proc.pred_block(list, pos + shift, arm.pred)?;
                shift += usize::from(inserted);
                let casted = self.proc.new_temp(target_ty.clone(), "casted");
                self.proc.append_inst(
                    block,
                    Inst::Cast {
                        source: arm.var,
                        target: casted,
                        ty: target_ty.clone(),
                    },
                )?;
                self.inserted += 1;
                arm.var = VarRef::Local(casted);
            }
            if new_arms != arms {
                self.proc.replace_inst(phi, Inst::Phi { target, arms: new_arms })?;
            }
        }
        Ok(shift)
    }

    // ── Instructions ──

    fn visit_block(&mut self, block: NodeId) -> Result<(), PassError> {
        for inst in self.proc.block_insts(block).to_vec() {
            self.visit_inst(inst)?;
        }
        Ok(())
    }

    fn visit_inst(&mut self, inst: InstId) -> Result<(), PassError> {
        let Some(kind) = self.proc.inst(inst).map(|d| d.kind.clone()) else {
            return Ok(());
        };
        let at = Anchor::Before(inst);
        let rewritten = match kind {
            Inst::Assign { target, value } => {
                let required = self.var_type(VarRef::Local(target))?;
                let value = self.cast_expr(value, Some(&required), at)?;
                Inst::Assign { target, value }
            }
            Inst::Load {
                target,
                source,
                indexes,
            } => {
                let indexes = self.traverse_all(indexes, at)?;
                let depth = indexes.len();
                self.proc.replace_inst(
                    inst,
                    Inst::Load {
                        target,
                        source,
                        indexes,
                    },
                )?;
                let source_ty = self.var_type(source)?;
                let uncasted = element_at_depth(&source_ty, depth)
                    .ok_or_else(|| self.missing_parent(&Expr::Var(source), "indexed past its element type"))?;
                let target_ty = self.var_type(VarRef::Local(target))?;
                if target_ty.needs_cast(&uncasted) {
                    self.retype_load(inst, target, uncasted, target_ty)?;
                }
                return Ok(());
            }
            Inst::Store {
                target,
                indexes,
                value,
            } => {
                let indexes = self.traverse_all(indexes, at)?;
                let target_ty = self.var_type(target)?;
                let required = element_at_depth(&target_ty, indexes.len())
                    .ok_or_else(|| self.missing_parent(&Expr::Var(target), "indexed past its element type"))?;
                let value = self.cast_expr(value, Some(&required), at)?;
                Inst::Store {
                    target,
                    indexes,
                    value,
                }
            }
            Inst::Call { target, callee, args } => {
                let Some(sig) = self.callees.get(callee.index()) else {
                    let shown = args.first().cloned().unwrap_or(Expr::Bool(false));
                    return Err(self.missing_parent(&shown, format!("unknown procedure {callee}")));
                };
                if sig.params.len() != args.len() {
                    let shown = args.get(sig.params.len()).cloned().unwrap_or(Expr::Bool(false));
                    return Err(self.missing_parent(
                        &shown,
                        format!(
                            "'{}' takes {} argument(s) but {} were supplied",
                            sig.name,
                            sig.params.len(),
                            args.len()
                        ),
                    ));
                }
                let params = sig.params.clone();
                let args = args
                    .into_iter()
                    .zip(&params)
                    .map(|(arg, ty)| self.cast_expr(arg, Some(ty), at))
                    .collect::<Result<Vec<_>, _>>()?;
                Inst::Call { target, callee, args }
            }
            Inst::Return { value: Some(value) } => {
                if self.proc.return_type.is_void() {
                    return Err(self.missing_parent(&value, "value returned from a void procedure"));
                }
                let required = self.proc.return_type.clone();
                Inst::Return {
                    value: Some(self.cast_expr(value, Some(&required), at)?),
                }
            }
            // Phis are cast at their construct; returns without a value and
            // casts have nothing to check.
            Inst::Phi { .. } | Inst::Return { value: None } | Inst::Cast { .. } => return Ok(()),
        };
        self.proc.replace_inst(inst, rewritten)?;
        Ok(())
    }

    /// Keep the load at the element type it actually produces and cast the
    /// result into a temporary of the declared type. Later reads of the
    /// target are re-pointed to that temporary.
    fn retype_load(&mut self, load: InstId, target: LocalId, uncasted: Type, declared: Type) -> Result<(), PassError> {
        let name = self.proc.local(target).map(|v| v.name.clone()).unwrap_or_default();
        let casted = self.proc.new_temp(declared.clone(), &format!("casted_{name}"));
        self.proc.replace_uses(VarRef::Local(target), VarRef::Local(casted));
        if let Some(var) = self.proc.local_mut(target) {
            var.ty = uncasted;
        }
        self.proc.insert_after(
            load,
            Inst::Cast {
                source: VarRef::Local(target),
                target: casted,
                ty: declared,
            },
        )?;
        self.inserted += 1;
        Ok(())
    }

    // ── Expressions ──

    fn traverse_all(&mut self, exprs: Vec<Expr>, at: Anchor) -> Result<Vec<Expr>, PassError> {
        exprs.into_iter().map(|e| self.cast_expr(e, None, at)).collect()
    }

    /// Post-order: children are cast against their own required types
    /// before `expr` is checked against `required`.
    fn cast_expr(&mut self, expr: Expr, required: Option<&Type>, at: Anchor) -> Result<Expr, PassError> {
        let expr = match expr {
            Expr::Binary { op, lhs, rhs, ty } => {
                let operand = if op.is_logical() {
                    Type::Bool
                } else if op.is_comparison() {
                    let l = self.type_of(&lhs)?;
                    let r = self.type_of(&rhs)?;
                    l.lub(&r).unwrap_or(l)
                } else {
                    ty.clone()
                };
                let lhs = self.cast_expr(*lhs, Some(&operand), at)?;
                let rhs = self.cast_expr(*rhs, Some(&operand), at)?;
                Expr::binary(op, lhs, rhs, ty)
            }
            Expr::Unary { op, expr, ty } => {
                let operand = match op {
                    UnaryOp::Not => Type::Bool,
                    UnaryOp::Minus | UnaryOp::BitNot => ty.clone(),
                };
                let inner = self.cast_expr(*expr, Some(&operand), at)?;
                Expr::unary(op, inner, ty)
            }
            Expr::List { elems, ty } => {
                let elem = ty.elem().cloned();
                let elems = elems
                    .into_iter()
                    .map(|e| self.cast_expr(e, elem.as_ref(), at))
                    .collect::<Result<Vec<_>, _>>()?;
                Expr::List { elems, ty }
            }
            other => other,
        };

        let Some(required) = required else {
            return Ok(expr);
        };
        let ty = self.type_of(&expr)?;
        if !ty.needs_cast(required) {
            return Ok(expr);
        }
        // Cast instructions read variables, so anything else is first
        // materialized into a temporary.
        let source = match expr.as_var() {
            Some(var) => var,
            None => {
                let tmp = self.proc.new_temp(ty, "expr");
                self.emit(at, Inst::Assign { target: tmp, value: expr })?;
                VarRef::Local(tmp)
            }
        };
        let casted = self.proc.new_temp(required.clone(), "casted");
        self.emit(
            at,
            Inst::Cast {
                source,
                target: casted,
                ty: required.clone(),
            },
        )?;
        self.inserted += 1;
        Ok(Expr::var(casted))
    }
}

/// Type reached after indexing `ty` `depth` times.
fn element_at_depth(ty: &Type, depth: usize) -> Option<Type> {
    let mut current = ty;
    for _ in 0..depth {
        current = current.elem()?;
    }
    Some(current.clone())
}

// ── Tests ───────────────────────────────────────────────────────────────────
