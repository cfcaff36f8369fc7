// interp.rs — Partial interpreter for actor procedures
//
// Executes structured IR directly: blocks in order, `if` by its condition,
// `while` by re-evaluating its condition after each body, joins by selecting
// the phi operand of the edge actually taken. Predicated instructions run
// only when their predicate holds, and hoisted phis select the operand whose
// guard holds. State variables live in the interpreter and persist across
// calls, so a guard can be evaluated against the state a body left behind.
//
// Integer results are wrapped to the width of the expression type; casts
// truncate or sign-extend to the target width.
//
// Preconditions: the actor passes `Actor::check`.
// Postconditions: `trace()` lists every procedure entered, in call order.
// Failure modes: unbound variables, operand type errors, phis without a
//                selectable operand, runaway recursion or loops → `InterpError`.
// Side effects: mutates interpreter-held state variables only.

use std::collections::HashMap;
use std::fmt;

use tracing::trace;

use crate::actor::{Action, Actor};
use crate::expr::{BinaryOp, Expr, UnaryOp, VarRef};
use crate::id::{ActionId, GlobalId, LocalId, NodeId, ProcId};
use crate::ir::{Inst, Node, PhiArm, Pred, Procedure};
use crate::types::Type;

const DEFAULT_MAX_DEPTH: usize = 64;
const DEFAULT_MAX_STEPS: usize = 1_000_000;

// ── Values ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
        }
    }

    /// The default value of a type, as used for unset list elements.
    pub fn zero(ty: &Type) -> Value {
        match ty {
            Type::Bool => Value::Bool(false),
            Type::Float => Value::Float(0.0),
            Type::String => Value::Str(String::new()),
            Type::List { size, elem } => Value::List((0..*size).map(|_| Value::zero(elem)).collect()),
            Type::Int(_) | Type::Uint(_) | Type::Void => Value::Int(0),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Wrap `value` to the width of an integer type; other types pass through.
fn wrap(value: i64, ty: &Type) -> i64 {
    match *ty {
        Type::Int(bits) if bits > 0 && bits < 64 => {
            let shift = 64 - bits;
            (value << shift) >> shift
        }
        Type::Uint(bits) if bits > 0 && bits < 64 => value & ((1i64 << bits) - 1),
        _ => value,
    }
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InterpError {
    #[error("in '{proc}': variable '{var}' read before it is bound")]
    Unbound { proc: String, var: String },
    #[error("in '{proc}': expected {expected}, found {found}")]
    Type {
        proc: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("in '{proc}': index {index} out of range for length {len}")]
    Index { proc: String, index: i64, len: usize },
    #[error("in '{proc}': phi for '{target}' has no operand for the path taken")]
    DetachedPhi { proc: String, target: String },
    #[error("call depth exceeds {limit}")]
    CallDepth { limit: usize },
    #[error("execution exceeds {limit} steps")]
    StepLimit { limit: usize },
    #[error("unknown procedure {0}")]
    UnknownProc(ProcId),
    #[error("unknown action {0}")]
    UnknownAction(ActionId),
    #[error("procedure '{0}' is native and has no body")]
    Native(String),
    #[error("'{proc}' takes {expected} argument(s), got {found}")]
    Arity {
        proc: String,
        expected: usize,
        found: usize,
    },
}

// ── Interpreter ─────────────────────────────────────────────────────────────

enum Flow {
    Next,
    Return(Option<Value>),
}

struct Frame<'p> {
    proc: &'p Procedure,
    locals: HashMap<LocalId, Value>,
}

pub struct Interpreter<'a> {
    actor: &'a Actor,
    globals: Vec<Option<Value>>,
    trace: Vec<ProcId>,
    depth: usize,
    steps: usize,
    max_depth: usize,
    max_steps: usize,
}

impl<'a> Interpreter<'a> {
    /// Bind every state variable to its initial value, if it has one.
    pub fn new(actor: &'a Actor) -> Result<Self, InterpError> {
        let mut interp = Self {
            actor,
            globals: Vec::new(),
            trace: Vec::new(),
            depth: 0,
            steps: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            max_steps: DEFAULT_MAX_STEPS,
        };
        let empty = Procedure::new("<init>", Type::Void);
        for var in &actor.globals {
            let value = match &var.init {
                Some(init) => {
                    let mut frame = Frame {
                        proc: &empty,
                        locals: HashMap::new(),
                    };
                    Some(interp.eval(&mut frame, init)?)
                }
                None => None,
            };
            interp.globals.push(value);
        }
        Ok(interp)
    }

    pub fn with_max_depth(mut self, limit: usize) -> Self {
        self.max_depth = limit;
        self
    }

    pub fn with_max_steps(mut self, limit: usize) -> Self {
        self.max_steps = limit;
        self
    }

    /// Procedures entered so far, in call order.
    pub fn trace(&self) -> &[ProcId] {
        &self.trace
    }

    pub fn clear_trace(&mut self) {
        self.trace.clear();
    }

    pub fn global(&self, id: GlobalId) -> Option<&Value> {
        self.globals.get(id.index()).and_then(Option::as_ref)
    }

    pub fn set_global(&mut self, id: GlobalId, value: Value) {
        if let Some(slot) = self.globals.get_mut(id.index()) {
            *slot = Some(value);
        }
    }

    /// Whether `action` may fire: its scheduler must return `true`. Any
    /// other result, including a non-boolean one, means "not schedulable".
    pub fn is_schedulable(&mut self, action: &Action) -> Result<bool, InterpError> {
        let result = self.call(action.scheduler, Vec::new())?;
        trace!(action = %action.name, result = ?result, "guard evaluated");
        Ok(matches!(result, Some(Value::Bool(true))))
    }

    /// Run the body of `action`.
    pub fn fire(&mut self, action: &Action) -> Result<(), InterpError> {
        self.call(action.body, Vec::new()).map(|_| ())
    }

    /// Call procedure `id` with `args` bound to its parameters.
    pub fn call(&mut self, id: ProcId, args: Vec<Value>) -> Result<Option<Value>, InterpError> {
        let actor = self.actor;
        let proc = actor.proc(id).ok_or(InterpError::UnknownProc(id))?;
        if proc.native {
            return Err(InterpError::Native(proc.name.clone()));
        }
        if proc.params.len() != args.len() {
            return Err(InterpError::Arity {
                proc: proc.name.clone(),
                expected: proc.params.len(),
                found: args.len(),
            });
        }
        if self.depth >= self.max_depth {
            return Err(InterpError::CallDepth { limit: self.max_depth });
        }
        self.trace.push(id);
        self.depth += 1;
        let mut frame = Frame {
            proc,
            locals: proc.params.iter().copied().zip(args).collect(),
        };
        let flow = self.exec_list(&mut frame, &proc.body);
        self.depth -= 1;
        match flow? {
            Flow::Return(value) => Ok(value),
            Flow::Next => Ok(None),
        }
    }

    fn step(&mut self) -> Result<(), InterpError> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(InterpError::StepLimit { limit: self.max_steps });
        }
        Ok(())
    }

    // ── Control flow ──

    fn exec_list(&mut self, frame: &mut Frame<'_>, list: &[NodeId]) -> Result<Flow, InterpError> {
        for &node in list {
            if let Flow::Return(v) = self.exec_node(frame, node)? {
                return Ok(Flow::Return(v));
            }
        }
        Ok(Flow::Next)
    }

    fn exec_node(&mut self, frame: &mut Frame<'_>, node: NodeId) -> Result<Flow, InterpError> {
        let proc = frame.proc;
        match proc.node(node) {
            Some(Node::Block { .. }) => self.exec_block(frame, node, None),
            Some(Node::If {
                condition,
                then_nodes,
                else_nodes,
                join,
            }) => {
                let (taken, list) = if self.eval_bool(frame, condition)? {
                    (Pred::Then, then_nodes)
                } else {
                    (Pred::Else, else_nodes)
                };
                if let Flow::Return(v) = self.exec_list(frame, list)? {
                    return Ok(Flow::Return(v));
                }
                self.exec_block(frame, *join, Some(taken))
            }
            Some(Node::While { condition, body, join }) => {
                if let Flow::Return(v) = self.exec_block(frame, *join, Some(Pred::Entry))? {
                    return Ok(Flow::Return(v));
                }
                while self.eval_bool(frame, condition)? {
                    self.step()?;
                    if let Flow::Return(v) = self.exec_list(frame, body)? {
                        return Ok(Flow::Return(v));
                    }
                    if let Flow::Return(v) = self.exec_block(frame, *join, Some(Pred::Back))? {
                        return Ok(Flow::Return(v));
                    }
                }
                Ok(Flow::Next)
            }
            None => Ok(Flow::Next),
        }
    }

    /// Run a block. `edge` is the predecessor edge when the block is a join.
    fn exec_block(&mut self, frame: &mut Frame<'_>, block: NodeId, edge: Option<Pred>) -> Result<Flow, InterpError> {
        let proc = frame.proc;
        let insts = proc.block_insts(block);

        // Join phis read their operands before any of them is written.
        let mut pending = Vec::new();
        for &inst in insts {
            let Some(data) = proc.inst(inst) else { continue };
            if let (Some(pred), Inst::Phi { target, arms }) = (edge, &data.kind) {
                let value = self.select_phi(frame, *target, arms, Some(pred))?;
                pending.push((*target, value));
            }
        }
        for (target, value) in pending {
            frame.locals.insert(target, value);
        }

        for &inst in insts {
            let Some(data) = proc.inst(inst) else { continue };
            if edge.is_some() && data.kind.is_phi() {
                continue;
            }
            self.step()?;
            if let Some(predicate) = &data.predicate {
                if !self.eval_bool(frame, predicate)? {
                    continue;
                }
            }
            if let Flow::Return(v) = self.exec_inst(frame, &data.kind)? {
                return Ok(Flow::Return(v));
            }
        }
        Ok(Flow::Next)
    }

    fn select_phi(
        &mut self,
        frame: &mut Frame<'_>,
        target: LocalId,
        arms: &[PhiArm],
        edge: Option<Pred>,
    ) -> Result<Value, InterpError> {
        let arm = match edge {
            Some(pred) => arms
                .iter()
                .find(|a| a.pred == pred)
                .or_else(|| arms.get(pred.index())),
            None => {
                let mut chosen = None;
                for arm in arms {
                    if let Some(guard) = &arm.guard {
                        if self.eval_bool(frame, guard)? {
                            chosen = Some(arm);
                            break;
                        }
                    }
                }
                chosen
            }
        };
        match arm {
            Some(arm) => self.read(frame, arm.var),
            None => Err(InterpError::DetachedPhi {
                proc: frame.proc.name.clone(),
                target: local_name(frame.proc, target),
            }),
        }
    }

    // ── Instructions ──

    fn exec_inst(&mut self, frame: &mut Frame<'_>, inst: &Inst) -> Result<Flow, InterpError> {
        match inst {
            Inst::Assign { target, value } => {
                let value = self.eval(frame, value)?;
                frame.locals.insert(*target, value);
            }
            Inst::Load {
                target,
                source,
                indexes,
            } => {
                let mut value = self.read(frame, *source)?;
                for index in indexes {
                    let i = self.eval_int(frame, index)?;
                    value = self.element(frame, value, i)?;
                }
                frame.locals.insert(*target, value);
            }
            Inst::Store { target, indexes, value } => {
                let value = self.eval(frame, value)?;
                let mut path = Vec::with_capacity(indexes.len());
                for index in indexes {
                    path.push(self.eval_int(frame, index)?);
                }
                if path.is_empty() {
                    self.write(frame, *target, value);
                } else {
                    let mut whole = self.read(frame, *target)?;
                    self.store_at(frame, &mut whole, &path, value)?;
                    self.write(frame, *target, whole);
                }
            }
            Inst::Call { target, callee, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(frame, arg)?);
                }
                let result = self.call(*callee, values)?;
                if let (Some(target), Some(value)) = (target, result) {
                    frame.locals.insert(*target, value);
                }
            }
            Inst::Phi { target, arms } => {
                let value = self.select_phi(frame, *target, arms, None)?;
                frame.locals.insert(*target, value);
            }
            Inst::Return { value } => {
                let value = match value {
                    Some(v) => Some(self.eval(frame, v)?),
                    None => None,
                };
                return Ok(Flow::Return(value));
            }
            Inst::Cast { source, target, ty } => {
                let value = self.read(frame, *source)?;
                let value = self.convert(frame, value, ty)?;
                frame.locals.insert(*target, value);
            }
        }
        Ok(Flow::Next)
    }

    fn read(&self, frame: &Frame<'_>, var: VarRef) -> Result<Value, InterpError> {
        let value = match var {
            VarRef::Local(id) => frame.locals.get(&id),
            VarRef::Global(id) => self.global(id),
        };
        value.cloned().ok_or_else(|| InterpError::Unbound {
            proc: frame.proc.name.clone(),
            var: match var {
                VarRef::Local(id) => local_name(frame.proc, id),
                VarRef::Global(id) => self
                    .actor
                    .globals
                    .get(id.index())
                    .map_or_else(|| id.to_string(), |v| v.display_name()),
            },
        })
    }

    fn write(&mut self, frame: &mut Frame<'_>, var: VarRef, value: Value) {
        match var {
            VarRef::Local(id) => {
                frame.locals.insert(id, value);
            }
            VarRef::Global(id) => self.set_global(id, value),
        }
    }

    fn element(&self, frame: &Frame<'_>, value: Value, index: i64) -> Result<Value, InterpError> {
        match value {
            Value::List(mut items) => {
                let len = items.len();
                usize::try_from(index)
                    .ok()
                    .filter(|i| *i < len)
                    .map(|i| items.swap_remove(i))
                    .ok_or_else(|| InterpError::Index {
                        proc: frame.proc.name.clone(),
                        index,
                        len,
                    })
            }
            other => Err(type_error(frame, "list", &other)),
        }
    }

    fn store_at(&self, frame: &Frame<'_>, whole: &mut Value, path: &[i64], value: Value) -> Result<(), InterpError> {
        let Some((&first, rest)) = path.split_first() else {
            *whole = value;
            return Ok(());
        };
        let Value::List(items) = whole else {
            return Err(type_error(frame, "list", whole));
        };
        let len = items.len();
        let slot = usize::try_from(first)
            .ok()
            .and_then(|i| items.get_mut(i))
            .ok_or_else(|| InterpError::Index {
                proc: frame.proc.name.clone(),
                index: first,
                len,
            })?;
        self.store_at(frame, slot, rest, value)
    }

    fn convert(&self, frame: &Frame<'_>, value: Value, ty: &Type) -> Result<Value, InterpError> {
        Ok(match (value, ty) {
            (Value::Int(v), Type::Int(_) | Type::Uint(_)) => Value::Int(wrap(v, ty)),
            (Value::Bool(b), Type::Int(_) | Type::Uint(_)) => Value::Int(i64::from(b)),
            (Value::Float(v), Type::Int(_) | Type::Uint(_)) => Value::Int(wrap(v as i64, ty)),
            (Value::Int(v), Type::Float) => Value::Float(v as f64),
            (Value::Int(v), Type::Bool) => Value::Bool(v != 0),
            (Value::List(items), Type::List { elem, .. }) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.convert(frame, item, elem)?);
                }
                Value::List(out)
            }
            (v @ Value::Bool(_), Type::Bool)
            | (v @ Value::Float(_), Type::Float)
            | (v @ Value::Str(_), Type::String) => v,
            (other, _) => return Err(type_error(frame, "a convertible value", &other)),
        })
    }

    // ── Expressions ──

    fn eval_bool(&mut self, frame: &mut Frame<'_>, expr: &Expr) -> Result<bool, InterpError> {
        match self.eval(frame, expr)? {
            Value::Bool(b) => Ok(b),
            other => Err(type_error(frame, "bool", &other)),
        }
    }

    fn eval_int(&mut self, frame: &mut Frame<'_>, expr: &Expr) -> Result<i64, InterpError> {
        match self.eval(frame, expr)? {
            Value::Int(v) => Ok(v),
            other => Err(type_error(frame, "int", &other)),
        }
    }

    fn eval(&mut self, frame: &mut Frame<'_>, expr: &Expr) -> Result<Value, InterpError> {
        match expr {
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int { value, ty: Type::Float } => Ok(Value::Float(*value as f64)),
            Expr::Int { value, .. } => Ok(Value::Int(*value)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::List { elems, .. } => {
                let mut items = Vec::with_capacity(elems.len());
                for e in elems {
                    items.push(self.eval(frame, e)?);
                }
                Ok(Value::List(items))
            }
            Expr::Var(var) => self.read(frame, *var),
            Expr::Unary { op, expr, ty } => {
                let value = self.eval(frame, expr)?;
                match (op, value) {
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (UnaryOp::Minus, Value::Int(v)) => Ok(Value::Int(wrap(v.wrapping_neg(), ty))),
                    (UnaryOp::Minus, Value::Float(v)) => Ok(Value::Float(-v)),
                    (UnaryOp::BitNot, Value::Int(v)) => Ok(Value::Int(wrap(!v, ty))),
                    (UnaryOp::Not, other) => Err(type_error(frame, "bool", &other)),
                    (_, other) => Err(type_error(frame, "int", &other)),
                }
            }
            Expr::Binary { op, lhs, rhs, ty } => {
                if op.is_logical() {
                    let l = self.eval_bool(frame, lhs)?;
                    // Short-circuit.
                    let value = match op {
                        BinaryOp::And => l && self.eval_bool(frame, rhs)?,
                        _ => l || self.eval_bool(frame, rhs)?,
                    };
                    return Ok(Value::Bool(value));
                }
                let l = self.eval(frame, lhs)?;
                let r = self.eval(frame, rhs)?;
                self.binary(frame, *op, l, r, ty)
            }
        }
    }

    fn binary(&self, frame: &Frame<'_>, op: BinaryOp, l: Value, r: Value, ty: &Type) -> Result<Value, InterpError> {
        use BinaryOp::*;
        match (l, r) {
            (Value::Int(a), Value::Int(b)) => Ok(match op {
                Eq => Value::Bool(a == b),
                Ne => Value::Bool(a != b),
                Lt => Value::Bool(a < b),
                Le => Value::Bool(a <= b),
                Gt => Value::Bool(a > b),
                Ge => Value::Bool(a >= b),
                Add => Value::Int(wrap(a.wrapping_add(b), ty)),
                Sub => Value::Int(wrap(a.wrapping_sub(b), ty)),
                Mul => Value::Int(wrap(a.wrapping_mul(b), ty)),
                Div | Mod if b == 0 => {
                    return Err(InterpError::Type {
                        proc: frame.proc.name.clone(),
                        expected: "non-zero divisor",
                        found: "zero",
                    })
                }
                Div => Value::Int(wrap(a.wrapping_div(b), ty)),
                Mod => Value::Int(wrap(a.wrapping_rem(b), ty)),
                BitAnd => Value::Int(wrap(a & b, ty)),
                BitOr => Value::Int(wrap(a | b, ty)),
                BitXor => Value::Int(wrap(a ^ b, ty)),
                Shl => Value::Int(wrap(a.wrapping_shl(b as u32), ty)),
                Shr => Value::Int(wrap(a.wrapping_shr(b as u32), ty)),
                And | Or => return Err(type_error(frame, "bool", &Value::Int(a))),
            }),
            (Value::Float(a), Value::Float(b)) => Ok(match op {
                Eq => Value::Bool(a == b),
                Ne => Value::Bool(a != b),
                Lt => Value::Bool(a < b),
                Le => Value::Bool(a <= b),
                Gt => Value::Bool(a > b),
                Ge => Value::Bool(a >= b),
                Add => Value::Float(a + b),
                Sub => Value::Float(a - b),
                Mul => Value::Float(a * b),
                Div => Value::Float(a / b),
                _ => return Err(type_error(frame, "int", &Value::Float(a))),
            }),
            (Value::Bool(a), Value::Bool(b)) if matches!(op, Eq | Ne) => Ok(Value::Bool((a == b) == (op == Eq))),
            (Value::Str(a), Value::Str(b)) if matches!(op, Eq | Ne) => Ok(Value::Bool((a == b) == (op == Eq))),
            (l, _) => Err(type_error(frame, "operands of one kind", &l)),
        }
    }
}

fn type_error(frame: &Frame<'_>, expected: &'static str, found: &Value) -> InterpError {
    InterpError::Type {
        proc: frame.proc.name.clone(),
        expected,
        found: found.kind(),
    }
}

fn local_name(proc: &Procedure, id: LocalId) -> String {
    proc.local(id).map_or_else(|| id.to_string(), |v| v.display_name())
}

/// Evaluate the scheduler of action `id` against the initial actor state.
pub fn is_schedulable(actor: &Actor, id: ActionId) -> Result<bool, InterpError> {
    let action = actor.action(id).ok_or(InterpError::UnknownAction(id))?;
    Interpreter::new(actor)?.is_schedulable(action)
}
