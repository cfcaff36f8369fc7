// ir.rs — Control-flow/instruction IR of actor procedures
//
// A `Procedure` owns three arenas: locals, control-flow nodes and
// instructions. Containment is expressed with handles: a node list holds
// `NodeId`s, a block holds `InstId`s, and every instruction records the block
// that contains it. All structural mutation goes through the primitives in
// this file so that the instruction → block back-reference stays exact.
//
// Preconditions: the front-end hands over SSA form (one definition per
//                variable version, no use before definition).
// Postconditions: every primitive leaves `Procedure::verify` satisfied.
// Failure modes: stale handles → `IrError`; removing a definition that is
//                still used is a caller error and is not repaired.
// Side effects: none.

use std::collections::HashMap;
use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};

use crate::expr::{Expr, Scope, VarRef};
use crate::id::{GlobalId, InstId, LocalId, NodeId, ProcId};
use crate::types::Type;

// ── Variables ───────────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

/// A variable: a procedure local, a parameter, or an actor state variable.
///
/// Two locals denote the same storage location iff they share base name and
/// suffix; the SSA index tells successive definitions apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Base name, without suffix or SSA index.
    pub name: String,
    pub ty: Type,
    /// SSA version; 0 is the original definition.
    #[serde(default)]
    pub index: u32,
    /// Disambiguates same-named variables from different static scopes.
    #[serde(default)]
    pub suffix: Option<u32>,
    #[serde(default = "default_true")]
    pub assignable: bool,
    /// Initial value (state variables only).
    #[serde(default)]
    pub init: Option<Expr>,
}

impl Variable {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            index: 0,
            suffix: None,
            assignable: true,
            init: None,
        }
    }

    pub fn with_index(mut self, index: u32) -> Self {
        self.index = index;
        self
    }

    pub fn with_suffix(mut self, suffix: u32) -> Self {
        self.suffix = Some(suffix);
        self
    }

    pub fn with_init(mut self, init: Expr) -> Self {
        self.init = Some(init);
        self
    }

    pub fn constant(mut self) -> Self {
        self.assignable = false;
        self
    }

    /// Whether this and `other` name the same storage location.
    pub fn same_location(&self, other: &Variable) -> bool {
        self.name == other.name && self.suffix == other.suffix
    }

    /// Printed name: base name, then suffix, then `_index` for index > 0.
    pub fn display_name(&self) -> String {
        let mut name = self.name.clone();
        if let Some(suffix) = self.suffix {
            let _ = write!(name, "{suffix}");
        }
        if self.index != 0 {
            let _ = write!(name, "_{}", self.index);
        }
        name
    }
}

// ── Instructions ────────────────────────────────────────────────────────────

/// Which control-flow predecessor a phi operand flows in from.
///
/// Conditionals use a two-predecessor encoding (`Then` = 0, `Else` = 1);
/// loops use `Entry` (before the loop, 0) and `Back` (end of the body, 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pred {
    Then,
    Else,
    Entry,
    Back,
}

impl Pred {
    pub fn index(self) -> usize {
        match self {
            Pred::Then | Pred::Entry => 0,
            Pred::Else | Pred::Back => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Pred::Then => "then",
            Pred::Else => "else",
            Pred::Entry => "entry",
            Pred::Back => "back",
        }
    }
}

/// One phi operand. `guard` is set by if-conversion when the phi is hoisted
/// out of its join: the predicate under which this operand is selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhiArm {
    pub pred: Pred,
    pub var: VarRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<Expr>,
}

impl PhiArm {
    pub fn new(pred: Pred, var: impl Into<VarRef>) -> Self {
        Self {
            pred,
            var: var.into(),
            guard: None,
        }
    }
}

/// An IR instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Inst {
    Assign {
        target: LocalId,
        value: Expr,
    },
    /// Read a variable, or an element of it when `indexes` is non-empty.
    Load {
        target: LocalId,
        source: VarRef,
        #[serde(default)]
        indexes: Vec<Expr>,
    },
    /// Write a variable, or an element of it when `indexes` is non-empty.
    Store {
        target: VarRef,
        #[serde(default)]
        indexes: Vec<Expr>,
        value: Expr,
    },
    Call {
        #[serde(default)]
        target: Option<LocalId>,
        callee: ProcId,
        #[serde(default)]
        args: Vec<Expr>,
    },
    Phi {
        target: LocalId,
        arms: Vec<PhiArm>,
    },
    Return {
        #[serde(default)]
        value: Option<Expr>,
    },
    Cast {
        source: VarRef,
        target: LocalId,
        ty: Type,
    },
}

impl Inst {
    /// The local this instruction defines, if any.
    pub fn def(&self) -> Option<LocalId> {
        match self {
            Inst::Assign { target, .. }
            | Inst::Load { target, .. }
            | Inst::Phi { target, .. }
            | Inst::Cast { target, .. } => Some(*target),
            Inst::Call { target, .. } => *target,
            Inst::Store { .. } | Inst::Return { .. } => None,
        }
    }

    fn set_def(&mut self, local: LocalId) {
        match self {
            Inst::Assign { target, .. }
            | Inst::Load { target, .. }
            | Inst::Phi { target, .. }
            | Inst::Cast { target, .. } => *target = local,
            Inst::Call { target, .. } => *target = Some(local),
            Inst::Store { .. } | Inst::Return { .. } => {}
        }
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, Inst::Phi { .. })
    }

    pub fn is_return(&self) -> bool {
        matches!(self, Inst::Return { .. })
    }

    /// Call `f` on every variable this instruction reads.
    pub fn for_each_use(&self, f: &mut dyn FnMut(VarRef)) {
        match self {
            Inst::Assign { value, .. } => value.for_each_use(f),
            Inst::Load {
                source, indexes, ..
            } => {
                f(*source);
                indexes.iter().for_each(|e| e.for_each_use(f));
            }
            Inst::Store {
                indexes, value, ..
            } => {
                indexes.iter().for_each(|e| e.for_each_use(f));
                value.for_each_use(f);
            }
            Inst::Call { args, .. } => args.iter().for_each(|e| e.for_each_use(f)),
            Inst::Phi { arms, .. } => {
                for arm in arms {
                    f(arm.var);
                    if let Some(g) = &arm.guard {
                        g.for_each_use(f);
                    }
                }
            }
            Inst::Return { value } => {
                if let Some(v) = value {
                    v.for_each_use(f);
                }
            }
            Inst::Cast { source, .. } => f(*source),
        }
    }

    /// Whether this instruction reads, defines, or stores to `var`.
    pub fn mentions(&self, var: VarRef) -> bool {
        let mut found = match self {
            Inst::Store { target, .. } => *target == var,
            _ => self.def().map(VarRef::Local) == Some(var),
        };
        self.for_each_use(&mut |v| found |= v == var);
        found
    }

    /// Re-point every read of `old` to `new`. Definitions and store targets
    /// are left alone. Returns the number of reads changed.
    pub fn replace_use(&mut self, old: VarRef, new: VarRef) -> usize {
        let swap = |v: &mut VarRef| {
            if *v == old {
                *v = new;
                1
            } else {
                0
            }
        };
        match self {
            Inst::Assign { value, .. } => value.replace_var(old, new),
            Inst::Load {
                source, indexes, ..
            } => swap(source) + indexes.iter_mut().map(|e| e.replace_var(old, new)).sum::<usize>(),
            Inst::Store {
                indexes, value, ..
            } => {
                indexes.iter_mut().map(|e| e.replace_var(old, new)).sum::<usize>()
                    + value.replace_var(old, new)
            }
            Inst::Call { args, .. } => args.iter_mut().map(|e| e.replace_var(old, new)).sum(),
            Inst::Phi { arms, .. } => arms
                .iter_mut()
                .map(|arm| swap(&mut arm.var) + arm.guard.as_mut().map_or(0, |g| g.replace_var(old, new)))
                .sum(),
            Inst::Return { value } => value.as_mut().map_or(0, |v| v.replace_var(old, new)),
            Inst::Cast { source, .. } => swap(source),
        }
    }
}

/// An instruction slot: the instruction, its containing block, and the
/// predicate attached by if-conversion (`None` = unconditional).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstData {
    pub kind: Inst,
    pub block: NodeId,
    #[serde(default)]
    pub predicate: Option<Expr>,
}

// ── Control-flow nodes ──────────────────────────────────────────────────────

/// A control-flow node. `join` nodes are blocks holding only phis; they
/// exist only on conditionals and loops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Block {
        insts: Vec<InstId>,
    },
    If {
        condition: Expr,
        then_nodes: Vec<NodeId>,
        else_nodes: Vec<NodeId>,
        join: NodeId,
    },
    While {
        condition: Expr,
        body: Vec<NodeId>,
        join: NodeId,
    },
}

impl Node {
    pub fn is_block(&self) -> bool {
        matches!(self, Node::Block { .. })
    }
}

/// Names one of the node lists of a procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListRef {
    /// The procedure's top-level list.
    Body,
    Then(NodeId),
    Else(NodeId),
    LoopBody(NodeId),
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IrError {
    #[error("{proc}: stale node handle {node}")]
    StaleNode { proc: String, node: NodeId },
    #[error("{proc}: stale instruction handle {inst}")]
    StaleInst { proc: String, inst: InstId },
    #[error("{proc}: node {node} is not a block")]
    NotABlock { proc: String, node: NodeId },
    #[error("{proc}: stale local {local}")]
    StaleLocal { proc: String, local: LocalId },
    #[error("{proc}: instruction {inst} is listed in {listed} but records block {recorded}")]
    BadBackReference {
        proc: String,
        inst: InstId,
        listed: NodeId,
        recorded: NodeId,
    },
    #[error("{proc}: {what} {id} is contained more than once")]
    SharedContainment { proc: String, what: &'static str, id: u32 },
    #[error("{proc}: join node {join} holds a non-phi instruction {inst}")]
    NonPhiInJoin { proc: String, join: NodeId, inst: InstId },
}

// ── Copies ──────────────────────────────────────────────────────────────────

/// Old → new handle maps produced by the structural copy operations.
///
/// `locals` stays empty for copies that preserve definitions: the copy reads
/// and writes exactly the variables of the original.
#[derive(Debug, Default, Clone)]
pub struct CopyMap {
    pub nodes: HashMap<NodeId, NodeId>,
    pub insts: HashMap<InstId, InstId>,
    pub locals: HashMap<LocalId, LocalId>,
}

// ── Procedure ───────────────────────────────────────────────────────────────

/// A procedure: signature, locals, and an ordered top-level node list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    pub name: String,
    #[serde(default)]
    pub params: Vec<LocalId>,
    pub return_type: Type,
    /// Implemented outside the IR; its body is empty and never transformed.
    #[serde(default)]
    pub native: bool,
    #[serde(default)]
    locals: Vec<Option<Variable>>,
    #[serde(default)]
    nodes: Vec<Option<Node>>,
    #[serde(default)]
    insts: Vec<Option<InstData>>,
    #[serde(default)]
    pub body: Vec<NodeId>,
    /// Counter for fresh temporary names; only ever increases.
    #[serde(default)]
    next_temp: u32,
}

/// Parameter and return types of a procedure, detached from its body so that
/// passes can look up callees while mutating a caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub name: String,
    pub params: Vec<Type>,
    pub return_type: Type,
}

impl Procedure {
    pub fn new(name: impl Into<String>, return_type: Type) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            return_type,
            native: false,
            locals: Vec::new(),
            nodes: Vec::new(),
            insts: Vec::new(),
            body: Vec::new(),
            next_temp: 0,
        }
    }

    pub fn signature(&self) -> Signature {
        Signature {
            name: self.name.clone(),
            params: self
                .params
                .iter()
                .filter_map(|p| self.local(*p).map(|v| v.ty.clone()))
                .collect(),
            return_type: self.return_type.clone(),
        }
    }

    // ── Locals ──

    pub fn add_local(&mut self, var: Variable) -> LocalId {
        let id = LocalId(self.locals.len() as u32);
        self.locals.push(Some(var));
        id
    }

    pub fn add_param(&mut self, var: Variable) -> LocalId {
        let id = self.add_local(var);
        self.params.push(id);
        id
    }

    /// Mint a fresh temporary named `<hint>_<n>`. Names never collide with an
    /// earlier temporary of this procedure, whichever pass minted it, nor
    /// with a local already present; counter values in use are skipped.
    pub fn new_temp(&mut self, ty: Type, hint: &str) -> LocalId {
        loop {
            let candidate = Variable::new(format!("{}_{}", hint, self.next_temp), ty.clone());
            self.next_temp += 1;
            if !self.locals().any(|(_, v)| v.same_location(&candidate)) {
                return self.add_local(candidate);
            }
        }
    }

    pub fn local(&self, id: LocalId) -> Option<&Variable> {
        self.locals.get(id.index()).and_then(Option::as_ref)
    }

    pub fn local_mut(&mut self, id: LocalId) -> Option<&mut Variable> {
        self.locals.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn is_param(&self, id: LocalId) -> bool {
        self.params.contains(&id)
    }

    /// Remove a local. The caller must have rewritten its uses first.
    pub fn remove_local(&mut self, id: LocalId) -> Option<Variable> {
        self.locals.get_mut(id.index()).and_then(Option::take)
    }

    pub fn locals(&self) -> impl Iterator<Item = (LocalId, &Variable)> {
        self.locals
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|v| (LocalId(i as u32), v)))
    }

    // ── Nodes ──

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index()).and_then(Option::as_mut)
    }

    fn alloc_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(node));
        id
    }

    /// Allocate a detached, empty block.
    pub fn new_block(&mut self) -> NodeId {
        self.alloc_node(Node::Block { insts: Vec::new() })
    }

    /// Allocate a detached conditional with empty branches and a fresh join.
    pub fn new_if(&mut self, condition: Expr) -> NodeId {
        let join = self.new_block();
        self.alloc_node(Node::If {
            condition,
            then_nodes: Vec::new(),
            else_nodes: Vec::new(),
            join,
        })
    }

    /// Allocate a detached loop with an empty body and a fresh join.
    pub fn new_while(&mut self, condition: Expr) -> NodeId {
        let join = self.new_block();
        self.alloc_node(Node::While {
            condition,
            body: Vec::new(),
            join,
        })
    }

    pub fn join_of(&self, node: NodeId) -> Option<NodeId> {
        match self.node(node)? {
            Node::If { join, .. } | Node::While { join, .. } => Some(*join),
            Node::Block { .. } => None,
        }
    }

    pub fn list(&self, list: ListRef) -> &[NodeId] {
        match list {
            ListRef::Body => &self.body,
            ListRef::Then(id) => match self.node(id) {
                Some(Node::If { then_nodes, .. }) => then_nodes,
                _ => &[],
            },
            ListRef::Else(id) => match self.node(id) {
                Some(Node::If { else_nodes, .. }) => else_nodes,
                _ => &[],
            },
            ListRef::LoopBody(id) => match self.node(id) {
                Some(Node::While { body, .. }) => body,
                _ => &[],
            },
        }
    }

    pub fn list_mut(&mut self, list: ListRef) -> Option<&mut Vec<NodeId>> {
        match list {
            ListRef::Body => Some(&mut self.body),
            ListRef::Then(id) => match self.node_mut(id)? {
                Node::If { then_nodes, .. } => Some(then_nodes),
                _ => None,
            },
            ListRef::Else(id) => match self.node_mut(id)? {
                Node::If { else_nodes, .. } => Some(else_nodes),
                _ => None,
            },
            ListRef::LoopBody(id) => match self.node_mut(id)? {
                Node::While { body, .. } => Some(body),
                _ => None,
            },
        }
    }

    /// Append a detached node to a list.
    pub fn push_node(&mut self, list: ListRef, node: NodeId) -> Result<(), IrError> {
        self.insert_node(list, usize::MAX, node)
    }

    /// Insert a detached node into a list at `index` (clamped to the end).
    pub fn insert_node(&mut self, list: ListRef, index: usize, node: NodeId) -> Result<(), IrError> {
        let proc = self.name.clone();
        let nodes = self.list_mut(list).ok_or(IrError::StaleNode {
            proc,
            node: list_owner(list),
        })?;
        let index = index.min(nodes.len());
        nodes.insert(index, node);
        Ok(())
    }

    /// The last node of a list if it is a block; otherwise a new empty block
    /// appended to the list.
    pub fn ensure_last_block(&mut self, list: ListRef) -> Result<NodeId, IrError> {
        if let Some(&last) = self.list(list).last() {
            if self.node(last).is_some_and(Node::is_block) {
                return Ok(last);
            }
        }
        let block = self.new_block();
        self.push_node(list, block)?;
        Ok(block)
    }

    /// The first node of a list if it is a block; otherwise a new empty block
    /// inserted at the front.
    pub fn ensure_first_block(&mut self, list: ListRef) -> Result<NodeId, IrError> {
        if let Some(&first) = self.list(list).first() {
            if self.node(first).is_some_and(Node::is_block) {
                return Ok(first);
            }
        }
        let block = self.new_block();
        self.insert_node(list, 0, block)?;
        Ok(block)
    }

    /// The block immediately preceding position `pos` of `list`. If the
    /// preceding node is not a block (or there is none), a new empty block is
    /// inserted at `pos`; the returned flag tells the caller that everything
    /// from `pos` on moved one slot to the right.
    pub fn block_before(&mut self, list: ListRef, pos: usize) -> Result<(NodeId, bool), IrError> {
        if pos > 0 {
            if let Some(&prev) = self.list(list).get(pos - 1) {
                if self.node(prev).is_some_and(Node::is_block) {
                    return Ok((prev, false));
                }
            }
        }
        let block = self.new_block();
        self.insert_node(list, pos, block)?;
        Ok((block, true))
    }

    /// Last block of the top-level list, created if needed.
    pub fn last_block(&mut self) -> Result<NodeId, IrError> {
        self.ensure_last_block(ListRef::Body)
    }

    /// The block that hosts the copy/cast for phi operand `pred` of the
    /// construct at `list[pos]`: end of the then/else branch, end of the loop
    /// body, or the block before the loop. Returns the block and whether a
    /// block was inserted into `list` before `pos`.
    pub fn pred_block(&mut self, list: ListRef, pos: usize, pred: Pred) -> Result<(NodeId, bool), IrError> {
        let node = self.list(list).get(pos).copied().ok_or(IrError::StaleNode {
            proc: self.name.clone(),
            node: list_owner(list),
        })?;
        let is_if = matches!(self.node(node), Some(Node::If { .. }));
        let is_while = matches!(self.node(node), Some(Node::While { .. }));
        match pred {
            Pred::Then if is_if => Ok((self.ensure_last_block(ListRef::Then(node))?, false)),
            Pred::Else if is_if => Ok((self.ensure_last_block(ListRef::Else(node))?, false)),
            Pred::Entry if is_while => self.block_before(list, pos),
            Pred::Back if is_while => Ok((self.ensure_last_block(ListRef::LoopBody(node))?, false)),
            _ => Err(IrError::StaleNode {
                proc: self.name.clone(),
                node,
            }),
        }
    }

    /// Free a node and everything it contains. The caller detaches it from
    /// its list.
    pub fn free_node(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id.index()).and_then(Option::take) else {
            return;
        };
        match node {
            Node::Block { insts } => {
                for inst in insts {
                    if let Some(slot) = self.insts.get_mut(inst.index()) {
                        *slot = None;
                    }
                }
            }
            Node::If {
                then_nodes,
                else_nodes,
                join,
                ..
            } => {
                for n in then_nodes.into_iter().chain(else_nodes) {
                    self.free_node(n);
                }
                self.free_node(join);
            }
            Node::While { body, join, .. } => {
                for n in body {
                    self.free_node(n);
                }
                self.free_node(join);
            }
        }
    }

    // ── Instructions ──

    pub fn inst(&self, id: InstId) -> Option<&InstData> {
        self.insts.get(id.index()).and_then(Option::as_ref)
    }

    pub fn inst_mut(&mut self, id: InstId) -> Option<&mut InstData> {
        self.insts.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Instructions of a block, in order. Empty for non-blocks.
    pub fn block_insts(&self, block: NodeId) -> &[InstId] {
        match self.node(block) {
            Some(Node::Block { insts }) => insts,
            _ => &[],
        }
    }

    fn block_vec_mut(&mut self, block: NodeId) -> Result<&mut Vec<InstId>, IrError> {
        let proc = self.name.clone();
        match self.nodes.get_mut(block.index()).and_then(Option::as_mut) {
            Some(Node::Block { insts }) => Ok(insts),
            Some(_) => Err(IrError::NotABlock { proc, node: block }),
            None => Err(IrError::StaleNode { proc, node: block }),
        }
    }

    /// Insert an instruction into `block` at `index` (clamped to the end).
    pub fn insert_inst(&mut self, block: NodeId, index: usize, kind: Inst) -> Result<InstId, IrError> {
        self.block_vec_mut(block)?;
        let id = InstId(self.insts.len() as u32);
        self.insts.push(Some(InstData {
            kind,
            block,
            predicate: None,
        }));
        let insts = self.block_vec_mut(block)?;
        let index = index.min(insts.len());
        insts.insert(index, id);
        Ok(id)
    }

    pub fn append_inst(&mut self, block: NodeId, kind: Inst) -> Result<InstId, IrError> {
        self.insert_inst(block, usize::MAX, kind)
    }

    /// Containing block and index of an instruction.
    pub fn position(&self, inst: InstId) -> Option<(NodeId, usize)> {
        let block = self.inst(inst)?.block;
        let index = self.block_insts(block).iter().position(|i| *i == inst)?;
        Some((block, index))
    }

    fn position_or_err(&self, inst: InstId) -> Result<(NodeId, usize), IrError> {
        self.position(inst).ok_or(IrError::StaleInst {
            proc: self.name.clone(),
            inst,
        })
    }

    pub fn insert_before(&mut self, anchor: InstId, kind: Inst) -> Result<InstId, IrError> {
        let (block, index) = self.position_or_err(anchor)?;
        self.insert_inst(block, index, kind)
    }

    pub fn insert_after(&mut self, anchor: InstId, kind: Inst) -> Result<InstId, IrError> {
        let (block, index) = self.position_or_err(anchor)?;
        self.insert_inst(block, index + 1, kind)
    }

    /// Detach an instruction from its block and free its slot.
    pub fn remove_inst(&mut self, inst: InstId) -> Result<InstData, IrError> {
        let (block, index) = self.position_or_err(inst)?;
        self.block_vec_mut(block)?.remove(index);
        self.insts
            .get_mut(inst.index())
            .and_then(Option::take)
            .ok_or(IrError::StaleInst {
                proc: self.name.clone(),
                inst,
            })
    }

    /// Replace an instruction in place, keeping its handle, block and
    /// predicate. Returns the old instruction.
    pub fn replace_inst(&mut self, inst: InstId, kind: Inst) -> Result<Inst, IrError> {
        let proc = self.name.clone();
        let data = self.inst_mut(inst).ok_or(IrError::StaleInst { proc, inst })?;
        Ok(std::mem::replace(&mut data.kind, kind))
    }

    /// Move an instruction to the end of another block.
    pub fn move_inst(&mut self, inst: InstId, target: NodeId) -> Result<(), IrError> {
        let (block, index) = self.position_or_err(inst)?;
        self.block_vec_mut(target)?;
        self.block_vec_mut(block)?.remove(index);
        self.block_vec_mut(target)?.push(inst);
        if let Some(data) = self.inst_mut(inst) {
            data.block = target;
        }
        Ok(())
    }

    /// Move all instructions of `source` to the end of `target`, in order.
    pub fn append_block(&mut self, target: NodeId, source: NodeId) -> Result<(), IrError> {
        if target == source {
            return Ok(());
        }
        self.block_vec_mut(target)?;
        let moved = std::mem::take(self.block_vec_mut(source)?);
        for inst in &moved {
            if let Some(data) = self.inst_mut(*inst) {
                data.block = target;
            }
        }
        self.block_vec_mut(target)?.extend(moved);
        Ok(())
    }

    /// Remove every instruction of a block.
    pub fn clear_block(&mut self, block: NodeId) -> Result<(), IrError> {
        let insts = std::mem::take(self.block_vec_mut(block)?);
        for inst in insts {
            if let Some(slot) = self.insts.get_mut(inst.index()) {
                *slot = None;
            }
        }
        Ok(())
    }

    // ── Traversal ──

    /// All nodes reachable from `list`, pre-order: a construct comes before
    /// its branches, its join last.
    pub fn nodes_in(&self, list: &[NodeId]) -> Vec<NodeId> {
        let mut out = Vec::new();
        for &id in list {
            self.collect_nodes(id, &mut out);
        }
        out
    }

    fn collect_nodes(&self, id: NodeId, out: &mut Vec<NodeId>) {
        out.push(id);
        match self.node(id) {
            Some(Node::If {
                then_nodes,
                else_nodes,
                join,
                ..
            }) => {
                for &n in then_nodes.iter().chain(else_nodes) {
                    self.collect_nodes(n, out);
                }
                out.push(*join);
            }
            Some(Node::While { body, join, .. }) => {
                out.push(*join);
                for &n in body {
                    self.collect_nodes(n, out);
                }
            }
            Some(Node::Block { .. }) | None => {}
        }
    }

    /// All instructions in textual order (loop joins before loop bodies,
    /// conditional joins after both branches).
    pub fn insts_forward(&self) -> Vec<InstId> {
        self.nodes_in(&self.body)
            .into_iter()
            .flat_map(|n| self.block_insts(n).iter().copied())
            .collect()
    }

    /// `insts_forward`, last instruction first.
    pub fn insts_backward(&self) -> Vec<InstId> {
        let mut insts = self.insts_forward();
        insts.reverse();
        insts
    }

    /// Re-point every read of `old` (instructions, conditions, predicates)
    /// to `new`. Returns the number of reads changed.
    pub fn replace_uses(&mut self, old: VarRef, new: VarRef) -> usize {
        let mut count = 0;
        for slot in self.insts.iter_mut().flatten() {
            count += slot.kind.replace_use(old, new);
            if let Some(pred) = slot.predicate.as_mut() {
                count += pred.replace_var(old, new);
            }
        }
        for node in self.nodes.iter_mut().flatten() {
            if let Node::If { condition, .. } | Node::While { condition, .. } = node {
                count += condition.replace_var(old, new);
            }
        }
        count
    }

    /// Number of instructions and conditions that mention `var`.
    pub fn mention_count(&self, var: VarRef) -> usize {
        let insts = self
            .insts
            .iter()
            .flatten()
            .filter(|d| d.kind.mentions(var) || d.predicate.as_ref().is_some_and(|p| p.mentions(var)))
            .count();
        let conds = self
            .nodes
            .iter()
            .flatten()
            .filter(|n| match n {
                Node::If { condition, .. } | Node::While { condition, .. } => condition.mentions(var),
                Node::Block { .. } => false,
            })
            .count();
        insts + conds
    }

    // ── Structural copies ──

    /// Deep-copy a node subtree. Every variable reference in the copy points
    /// at the variable the original references: no local is created.
    pub fn clone_preserving_defs(&mut self, node: NodeId) -> Result<(NodeId, CopyMap), IrError> {
        let mut map = CopyMap::default();
        let copy = self.copy_node(node, &mut map)?;
        Ok((copy, map))
    }

    /// Deep-copy a node subtree and give every local defined inside it a
    /// fresh version; reads inside the copy follow the new definitions.
    pub fn clone_with_fresh_defs(&mut self, node: NodeId) -> Result<(NodeId, CopyMap), IrError> {
        let (copy, mut map) = self.clone_preserving_defs(node)?;
        let mut copied: Vec<InstId> = map.insts.values().copied().collect();
        copied.sort();
        for inst in &copied {
            let Some(def) = self.inst(*inst).and_then(|d| d.kind.def()) else {
                continue;
            };
            if map.locals.contains_key(&def) {
                continue;
            }
            let Some(var) = self.local(def).cloned() else {
                return Err(IrError::StaleLocal {
                    proc: self.name.clone(),
                    local: def,
                });
            };
            let index = self.next_index_of(&var);
            let fresh = self.add_local(Variable { index, ..var });
            map.locals.insert(def, fresh);
        }
        for inst in &copied {
            let Some(data) = self.insts.get_mut(inst.index()).and_then(Option::as_mut) else {
                continue;
            };
            for (old, new) in &map.locals {
                data.kind.replace_use(VarRef::Local(*old), VarRef::Local(*new));
                if let Some(p) = data.predicate.as_mut() {
                    p.replace_var(VarRef::Local(*old), VarRef::Local(*new));
                }
            }
            if let Some(new) = data.kind.def().and_then(|d| map.locals.get(&d)) {
                data.kind.set_def(*new);
            }
        }
        for copied_node in map.nodes.values() {
            if let Some(Node::If { condition, .. } | Node::While { condition, .. }) =
                self.nodes.get_mut(copied_node.index()).and_then(Option::as_mut)
            {
                for (old, new) in &map.locals {
                    condition.replace_var(VarRef::Local(*old), VarRef::Local(*new));
                }
            }
        }
        Ok((copy, map))
    }

    /// Append copies of `insts` (in order) to `target`. Copies define and read
    /// the same variables as the originals.
    pub fn copy_insts_preserving_defs(&mut self, insts: &[InstId], target: NodeId) -> Result<CopyMap, IrError> {
        let mut map = CopyMap::default();
        for &inst in insts {
            let data = self.inst(inst).cloned().ok_or(IrError::StaleInst {
                proc: self.name.clone(),
                inst,
            })?;
            let copy = self.append_inst(target, data.kind)?;
            if let Some(slot) = self.inst_mut(copy) {
                slot.predicate = data.predicate;
            }
            map.insts.insert(inst, copy);
        }
        Ok(map)
    }

    fn next_index_of(&self, var: &Variable) -> u32 {
        self.locals()
            .filter(|(_, v)| v.same_location(var))
            .map(|(_, v)| v.index)
            .max()
            .map_or(0, |m| m + 1)
    }

    fn copy_node(&mut self, node: NodeId, map: &mut CopyMap) -> Result<NodeId, IrError> {
        let original = self.node(node).cloned().ok_or(IrError::StaleNode {
            proc: self.name.clone(),
            node,
        })?;
        let copy = match original {
            Node::Block { insts } => {
                let block = self.new_block();
                let inner = self.copy_insts_preserving_defs(&insts, block)?;
                map.insts.extend(inner.insts);
                block
            }
            Node::If {
                condition,
                then_nodes,
                else_nodes,
                join,
            } => {
                let then_copy = self.copy_list(&then_nodes, map)?;
                let else_copy = self.copy_list(&else_nodes, map)?;
                let join_copy = self.copy_node(join, map)?;
                self.alloc_node(Node::If {
                    condition,
                    then_nodes: then_copy,
                    else_nodes: else_copy,
                    join: join_copy,
                })
            }
            Node::While {
                condition,
                body,
                join,
            } => {
                let join_copy = self.copy_node(join, map)?;
                let body_copy = self.copy_list(&body, map)?;
                self.alloc_node(Node::While {
                    condition,
                    body: body_copy,
                    join: join_copy,
                })
            }
        };
        map.nodes.insert(node, copy);
        Ok(copy)
    }

    fn copy_list(&mut self, list: &[NodeId], map: &mut CopyMap) -> Result<Vec<NodeId>, IrError> {
        list.iter().map(|n| self.copy_node(*n, map)).collect()
    }

    // ── Verification ──

    /// Check the containment invariants: every live instruction sits in
    /// exactly one block whose id it records, every node is contained once,
    /// join nodes hold only phis, and every local handle is live.
    pub fn verify(&self) -> Result<(), IrError> {
        let proc = || self.name.clone();
        let mut seen_nodes = vec![false; self.nodes.len()];
        let mut seen_insts = vec![false; self.insts.len()];

        let mut stack: Vec<(NodeId, bool)> = self.body.iter().map(|n| (*n, false)).collect();
        while let Some((id, is_join)) = stack.pop() {
            let node = self.node(id).ok_or(IrError::StaleNode { proc: proc(), node: id })?;
            if std::mem::replace(&mut seen_nodes[id.index()], true) {
                return Err(IrError::SharedContainment {
                    proc: proc(),
                    what: "node",
                    id: id.0,
                });
            }
            match node {
                Node::Block { insts } => {
                    for &inst in insts {
                        let data = self.inst(inst).ok_or(IrError::StaleInst { proc: proc(), inst })?;
                        if std::mem::replace(&mut seen_insts[inst.index()], true) {
                            return Err(IrError::SharedContainment {
                                proc: proc(),
                                what: "instruction",
                                id: inst.0,
                            });
                        }
                        if data.block != id {
                            return Err(IrError::BadBackReference {
                                proc: proc(),
                                inst,
                                listed: id,
                                recorded: data.block,
                            });
                        }
                        if is_join && !data.kind.is_phi() {
                            return Err(IrError::NonPhiInJoin {
                                proc: proc(),
                                join: id,
                                inst,
                            });
                        }
                        let mut vars: Vec<VarRef> = Vec::new();
                        data.kind.for_each_use(&mut |v| vars.push(v));
                        vars.extend(data.kind.def().map(VarRef::Local));
                        for local in vars.into_iter().filter_map(VarRef::as_local) {
                            if self.local(local).is_none() {
                                return Err(IrError::StaleLocal { proc: proc(), local });
                            }
                        }
                    }
                }
                Node::If {
                    then_nodes,
                    else_nodes,
                    join,
                    ..
                } => {
                    stack.extend(then_nodes.iter().chain(else_nodes).map(|n| (*n, false)));
                    stack.push((*join, true));
                }
                Node::While { body, join, .. } => {
                    stack.extend(body.iter().map(|n| (*n, false)));
                    stack.push((*join, true));
                }
            }
        }
        for &param in &self.params {
            if self.local(param).is_none() {
                return Err(IrError::StaleLocal { proc: proc(), local: param });
            }
        }
        Ok(())
    }

    // ── Display ──

    /// Render this procedure; `globals` and `callees` resolve names.
    pub fn display<'a>(&'a self, globals: &'a [Variable], callees: &'a [Signature]) -> ProcDisplay<'a> {
        ProcDisplay {
            scope: ProcScope { proc: self, globals },
            callees,
        }
    }
}

fn list_owner(list: ListRef) -> NodeId {
    match list {
        ListRef::Body => NodeId(u32::MAX),
        ListRef::Then(id) | ListRef::Else(id) | ListRef::LoopBody(id) => id,
    }
}

// ── Scope ───────────────────────────────────────────────────────────────────

/// Variable lookup inside one procedure of an actor.
#[derive(Clone, Copy)]
pub struct ProcScope<'a> {
    pub proc: &'a Procedure,
    pub globals: &'a [Variable],
}

impl<'a> ProcScope<'a> {
    pub fn new(proc: &'a Procedure, globals: &'a [Variable]) -> Self {
        Self { proc, globals }
    }

    pub fn var(&self, var: VarRef) -> Option<&'a Variable> {
        match var {
            VarRef::Local(id) => self.proc.local(id),
            VarRef::Global(GlobalId(i)) => self.globals.get(i as usize),
        }
    }
}

impl Scope for ProcScope<'_> {
    fn var_type(&self, var: VarRef) -> Option<&Type> {
        self.var(var).map(|v| &v.ty)
    }

    fn var_name(&self, var: VarRef) -> String {
        match self.var(var) {
            Some(v) => v.display_name(),
            None => format!("{var:?}"),
        }
    }
}

// ── Display ─────────────────────────────────────────────────────────────────

/// `Display` adapter produced by [`Procedure::display`].
pub struct ProcDisplay<'a> {
    scope: ProcScope<'a>,
    callees: &'a [Signature],
}

impl ProcDisplay<'_> {
    fn write_list(&self, f: &mut fmt::Formatter<'_>, list: &[NodeId], depth: usize) -> fmt::Result {
        for &node in list {
            self.write_node(f, node, depth)?;
        }
        Ok(())
    }

    fn write_node(&self, f: &mut fmt::Formatter<'_>, node: NodeId, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        let proc = self.scope.proc;
        match proc.node(node) {
            Some(Node::Block { insts }) => {
                for &inst in insts {
                    self.write_inst(f, inst, depth)?;
                }
                Ok(())
            }
            Some(Node::If {
                condition,
                then_nodes,
                else_nodes,
                join,
            }) => {
                writeln!(f, "{pad}if {} {{", condition.display(&self.scope))?;
                self.write_list(f, then_nodes, depth + 1)?;
                if !else_nodes.is_empty() {
                    writeln!(f, "{pad}}} else {{")?;
                    self.write_list(f, else_nodes, depth + 1)?;
                }
                writeln!(f, "{pad}}}")?;
                self.write_node(f, *join, depth)
            }
            Some(Node::While { condition, body, join }) => {
                self.write_node(f, *join, depth)?;
                writeln!(f, "{pad}while {} {{", condition.display(&self.scope))?;
                self.write_list(f, body, depth + 1)?;
                writeln!(f, "{pad}}}")
            }
            None => writeln!(f, "{pad}<freed {node}>"),
        }
    }

    fn write_inst(&self, f: &mut fmt::Formatter<'_>, inst: InstId, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        let Some(data) = self.scope.proc.inst(inst) else {
            return writeln!(f, "{pad}<freed {inst}>");
        };
        write!(f, "{pad}")?;
        if let Some(pred) = &data.predicate {
            write!(f, "[{}] ", pred.display(&self.scope))?;
        }
        let s = &self.scope;
        let name = |v: LocalId| s.var_name(VarRef::Local(v));
        let indexes = |idx: &[Expr]| -> String { idx.iter().map(|e| format!("[{}]", e.display(s))).collect() };
        match &data.kind {
            Inst::Assign { target, value } => writeln!(f, "{} := {}", name(*target), value.display(s)),
            Inst::Load {
                target,
                source,
                indexes: idx,
            } => writeln!(f, "{} := load {}{}", name(*target), s.var_name(*source), indexes(idx)),
            Inst::Store {
                target,
                indexes: idx,
                value,
            } => writeln!(f, "store {}{} := {}", s.var_name(*target), indexes(idx), value.display(s)),
            Inst::Call { target, callee, args } => {
                if let Some(t) = target {
                    write!(f, "{} := ", name(*t))?;
                }
                let callee = self
                    .callees
                    .get(callee.index())
                    .map_or_else(|| callee.to_string(), |sig| sig.name.clone());
                let args: Vec<String> = args.iter().map(|a| a.display(s).to_string()).collect();
                writeln!(f, "call {}({})", callee, args.join(", "))
            }
            Inst::Phi { target, arms } => {
                let arms: Vec<String> = arms
                    .iter()
                    .map(|a| match &a.guard {
                        Some(g) => format!("{} [{}]: {}", a.pred.label(), g.display(s), s.var_name(a.var)),
                        None => format!("{}: {}", a.pred.label(), s.var_name(a.var)),
                    })
                    .collect();
                writeln!(f, "{} := phi({})", name(*target), arms.join(", "))
            }
            Inst::Return { value: Some(v) } => writeln!(f, "return {}", v.display(s)),
            Inst::Return { value: None } => writeln!(f, "return"),
            Inst::Cast { source, target, ty } => {
                writeln!(f, "{} := cast<{}> {}", name(*target), ty, s.var_name(*source))
            }
        }
    }
}

impl fmt::Display for ProcDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let proc = self.scope.proc;
        let params: Vec<String> = proc
            .params
            .iter()
            .filter_map(|p| proc.local(*p).map(|v| format!("{} {}", v.ty, v.display_name())))
            .collect();
        writeln!(f, "proc {}({}) -> {} {{", proc.name, params.join(", "), proc.return_type)?;
        self.write_list(f, &proc.body, 1)?;
        writeln!(f, "}}")
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::BinaryOp;

    fn int16() -> Type {
        Type::Int(16)
    }

    /// x := 1; if (c) { y_1 := x } else { y_2 := 2 } join { y_3 := phi(y_1, y_2) }
    fn diamond() -> (Procedure, NodeId, LocalId) {
        let mut p = Procedure::new("diamond", Type::Void);
        let c = p.add_param(Variable::new("c", Type::Bool));
        let x = p.add_local(Variable::new("x", int16()));
        let y1 = p.add_local(Variable::new("y", int16()).with_index(1));
        let y2 = p.add_local(Variable::new("y", int16()).with_index(2));
        let y3 = p.add_local(Variable::new("y", int16()).with_index(3));

        let entry = p.new_block();
        p.append_inst(entry, Inst::Assign { target: x, value: Expr::int(1, int16()) })
            .unwrap();
        p.push_node(ListRef::Body, entry).unwrap();

        let branch = p.new_if(Expr::var(c));
        let then_block = p.new_block();
        p.append_inst(then_block, Inst::Assign { target: y1, value: Expr::var(x) })
            .unwrap();
        p.push_node(ListRef::Then(branch), then_block).unwrap();
        let else_block = p.new_block();
        p.append_inst(else_block, Inst::Assign { target: y2, value: Expr::int(2, int16()) })
            .unwrap();
        p.push_node(ListRef::Else(branch), else_block).unwrap();
        let join = p.join_of(branch).unwrap();
        p.append_inst(
            join,
            Inst::Phi {
                target: y3,
                arms: vec![
                    PhiArm::new(Pred::Then, y1),
                    PhiArm::new(Pred::Else, y2),
                ],
            },
        )
        .unwrap();
        p.push_node(ListRef::Body, branch).unwrap();
        (p, branch, x)
    }

    #[test]
    fn diamond_verifies() {
        let (p, _, _) = diamond();
        p.verify().unwrap();
        assert_eq!(p.insts_forward().len(), 4);
    }

    #[test]
    fn insert_and_remove_keep_back_references() {
        let (mut p, _, x) = diamond();
        let entry = p.body[0];
        let first = p.block_insts(entry)[0];
        let t = p.new_temp(int16(), "t");
        let after = p
            .insert_after(first, Inst::Assign { target: t, value: Expr::var(x) })
            .unwrap();
        let before = p
            .insert_before(first, Inst::Return { value: None })
            .unwrap();
        assert_eq!(p.block_insts(entry), &[before, first, after]);
        assert_eq!(p.position(after), Some((entry, 2)));

        p.remove_inst(before).unwrap();
        assert!(p.inst(before).is_none());
        assert_eq!(p.block_insts(entry), &[first, after]);
        p.verify().unwrap();
    }

    #[test]
    fn move_and_append_block_update_containing_block() {
        let (mut p, branch, _) = diamond();
        let then_block = p.list(ListRef::Then(branch))[0];
        let else_block = p.list(ListRef::Else(branch))[0];
        let moved = p.block_insts(else_block)[0];
        p.append_block(then_block, else_block).unwrap();
        assert_eq!(p.inst(moved).unwrap().block, then_block);
        assert!(p.block_insts(else_block).is_empty());
        p.verify().unwrap();
    }

    #[test]
    fn iteration_runs_both_ways() {
        let (p, _, _) = diamond();
        let mut fwd = p.insts_forward();
        let bwd = p.insts_backward();
        fwd.reverse();
        assert_eq!(fwd, bwd);
        let last = bwd[0];
        assert!(p.inst(last).unwrap().kind.is_phi());
    }

    #[test]
    fn clone_preserving_defs_reuses_variables() {
        let (mut p, branch, x) = diamond();
        let locals_before = p.locals().count();
        let (copy, map) = p.clone_preserving_defs(branch).unwrap();
        assert_ne!(copy, branch);
        assert_eq!(p.locals().count(), locals_before);
        assert!(map.locals.is_empty());
        assert_eq!(map.insts.len(), 3);

        // The copied then-assignment still reads the original `x`.
        let Some(Node::If { then_nodes, .. }) = p.node(copy) else {
            panic!("copy is not a conditional")
        };
        let copied_assign = p.block_insts(then_nodes[0])[0];
        assert_eq!(
            p.inst(copied_assign).unwrap().kind,
            Inst::Assign { target: LocalId(2), value: Expr::var(x) }
        );
        // The copy's instructions record the copied blocks.
        for (orig, new) in &map.insts {
            let orig_block = p.inst(*orig).unwrap().block;
            assert_eq!(p.inst(*new).unwrap().block, map.nodes[&orig_block]);
        }
    }

    #[test]
    fn clone_with_fresh_defs_renames_inside_copy_only() {
        let (mut p, branch, _) = diamond();
        let (copy, map) = p.clone_with_fresh_defs(branch).unwrap();
        assert_eq!(map.locals.len(), 3);
        let join = p.join_of(copy).unwrap();
        let phi = p.block_insts(join)[0];
        let Inst::Phi { target, arms } = &p.inst(phi).unwrap().kind else {
            panic!("join lost its phi")
        };
        assert_eq!(*target, map.locals[&LocalId(4)]);
        assert_eq!(arms[0].var, VarRef::Local(map.locals[&LocalId(2)]));
        assert_eq!(p.local(*target).unwrap().display_name(), "y_6");
    }

    #[test]
    fn replace_uses_reaches_conditions_and_predicates() {
        let (mut p, branch, x) = diamond();
        let z = p.add_local(Variable::new("z", int16()));
        let c = p.params[0];
        let entry = p.body[0];
        let first = p.block_insts(entry)[0];
        p.inst_mut(first).unwrap().predicate = Some(Expr::var(c));
        let n = p.replace_uses(VarRef::Local(c), VarRef::Local(z));
        assert_eq!(n, 2);
        assert!(matches!(p.node(branch), Some(Node::If { condition: Expr::Var(VarRef::Local(id)), .. }) if *id == z));
        assert_eq!(p.mention_count(VarRef::Local(x)), 2);
    }

    #[test]
    fn block_before_synthesizes_when_needed() {
        let mut p = Procedure::new("loop", Type::Void);
        let cond = p.add_local(Variable::new("go", Type::Bool));
        let lp = p.new_while(Expr::var(cond));
        p.push_node(ListRef::Body, lp).unwrap();
        let (block, inserted) = p.block_before(ListRef::Body, 0).unwrap();
        assert!(inserted);
        assert_eq!(p.body, vec![block, lp]);
        let (again, inserted) = p.block_before(ListRef::Body, 1).unwrap();
        assert!(!inserted);
        assert_eq!(again, block);
    }

    #[test]
    fn temporaries_never_collide() {
        let mut p = Procedure::new("t", Type::Void);
        let a = p.new_temp(Type::Bool, "tmp");
        let b = p.new_temp(Type::Bool, "tmp");
        assert_ne!(p.local(a).unwrap().name, p.local(b).unwrap().name);
    }

    #[test]
    fn temporaries_skip_names_already_declared() {
        let mut p = Procedure::new("t", Type::Void);
        let user = p.add_local(Variable::new("casted_0", int16()));
        let t = p.new_temp(int16(), "casted");
        assert_eq!(p.local(t).unwrap().name, "casted_1");
        assert!(!p.local(t).unwrap().same_location(p.local(user).unwrap()));
        let t2 = p.new_temp(int16(), "casted");
        assert_eq!(p.local(t2).unwrap().name, "casted_2");
    }

    #[test]
    fn display_renders_structure() {
        let (p, _, _) = diamond();
        let text = p.display(&[], &[]).to_string();
        assert_eq!(
            text,
            "proc diamond(bool c) -> void {\n  x := 1\n  if c {\n    y_1 := x\n  } else {\n    y_2 := 2\n  }\n  y_3 := phi(then: y_1, else: y_2)\n}\n"
        );
    }

    #[test]
    fn verify_catches_non_phi_in_join() {
        let (mut p, branch, x) = diamond();
        let join = p.join_of(branch).unwrap();
        p.append_inst(join, Inst::Assign { target: x, value: Expr::int(0, int16()) })
            .unwrap();
        assert!(matches!(p.verify(), Err(IrError::NonPhiInJoin { .. })));
    }

    #[test]
    fn display_name_includes_suffix_and_index() {
        let v = Variable::new("acc", int16()).with_suffix(2).with_index(3);
        assert_eq!(v.display_name(), "acc2_3");
        let op = Expr::binary(BinaryOp::Add, Expr::int(1, int16()), Expr::int(2, int16()), int16());
        assert!(!op.is_literal());
    }
}
