// expr.rs — Expressions of the actor IR
//
// Expressions are owned trees. A pass that rewrites a sub-expression replaces
// the value held by its parent; nothing is shared, so cloning an expression
// is already a "copy with uses": variable leaves are handles and keep
// pointing at the original definitions.
//
// Preconditions: none.
// Postconditions: none (data + pure helpers).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::{GlobalId, LocalId};
use crate::types::Type;

/// Largest zero literal `Expr::zero` builds, counted in scalars.
pub const MAX_ZERO_SCALARS: u64 = 1 << 16;

// ── Variable references ─────────────────────────────────────────────────────

/// A use of a variable: either a procedure local or an actor state variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VarRef {
    Local(LocalId),
    Global(GlobalId),
}

impl VarRef {
    pub fn as_local(self) -> Option<LocalId> {
        match self {
            VarRef::Local(id) => Some(id),
            VarRef::Global(_) => None,
        }
    }

    pub fn as_global(self) -> Option<GlobalId> {
        match self {
            VarRef::Global(id) => Some(id),
            VarRef::Local(_) => None,
        }
    }
}

impl From<LocalId> for VarRef {
    fn from(id: LocalId) -> Self {
        VarRef::Local(id)
    }
}

impl From<GlobalId> for VarRef {
    fn from(id: GlobalId) -> Self {
        VarRef::Global(id)
    }
}

/// Name and type lookup for the variables an expression mentions.
pub trait Scope {
    fn var_type(&self, var: VarRef) -> Option<&Type>;
    fn var_name(&self, var: VarRef) -> String;
}

// ── Operators ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Logical negation.
    Not,
    /// Arithmetic negation.
    Minus,
    /// Bitwise complement.
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Minus => "-",
            UnaryOp::BitNot => "~",
        }
    }
}

// ── Expressions ─────────────────────────────────────────────────────────────

/// An IR expression. Every variant except `Var` carries its resolved type;
/// a variable reference has the declared type of its variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Bool(bool),
    Int {
        value: i64,
        ty: Type,
    },
    Str(String),
    List {
        elems: Vec<Expr>,
        ty: Type,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
        ty: Type,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        ty: Type,
    },
    Var(VarRef),
}

impl Expr {
    pub fn var(var: impl Into<VarRef>) -> Self {
        Expr::Var(var.into())
    }

    pub fn int(value: i64, ty: Type) -> Self {
        Expr::Int { value, ty }
    }

    pub fn unary(op: UnaryOp, expr: Expr, ty: Type) -> Self {
        Expr::Unary {
            op,
            expr: Box::new(expr),
            ty,
        }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr, ty: Type) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            ty,
        }
    }

    /// Boolean negation.
    pub fn not(expr: Expr) -> Self {
        Expr::unary(UnaryOp::Not, expr, Type::Bool)
    }

    /// Boolean conjunction.
    pub fn and(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::And, lhs, rhs, Type::Bool)
    }

    /// The literal zero of a type: `false`, `0`, `""`, or a list of zeros.
    /// `None` when the type holds more than `MAX_ZERO_SCALARS` scalars.
    pub fn zero(ty: &Type) -> Option<Self> {
        if ty.scalar_count() > MAX_ZERO_SCALARS {
            return None;
        }
        Some(Self::zero_unchecked(ty))
    }

    fn zero_unchecked(ty: &Type) -> Self {
        match ty {
            Type::Bool => Expr::Bool(false),
            Type::String => Expr::Str(String::new()),
            Type::List { size, elem } => Expr::List {
                elems: (0..*size).map(|_| Expr::zero_unchecked(elem)).collect(),
                ty: ty.clone(),
            },
            // An integer literal typed `float` evaluates to a float.
            Type::Int(_) | Type::Uint(_) | Type::Float | Type::Void => Expr::int(0, ty.clone()),
        }
    }

    pub fn as_var(&self) -> Option<VarRef> {
        match self {
            Expr::Var(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        match self {
            Expr::Bool(_) | Expr::Int { .. } | Expr::Str(_) => true,
            Expr::List { elems, .. } => elems.iter().all(Expr::is_literal),
            _ => false,
        }
    }

    /// Resolved type of this expression, `None` if it references a variable
    /// the scope does not know.
    pub fn ty(&self, scope: &dyn Scope) -> Option<Type> {
        match self {
            Expr::Bool(_) => Some(Type::Bool),
            Expr::Str(_) => Some(Type::String),
            Expr::Int { ty, .. }
            | Expr::List { ty, .. }
            | Expr::Unary { ty, .. }
            | Expr::Binary { ty, .. } => Some(ty.clone()),
            Expr::Var(v) => scope.var_type(*v).cloned(),
        }
    }

    /// Call `f` on every variable use, left to right.
    pub fn for_each_use(&self, f: &mut dyn FnMut(VarRef)) {
        match self {
            Expr::Bool(_) | Expr::Int { .. } | Expr::Str(_) => {}
            Expr::List { elems, .. } => elems.iter().for_each(|e| e.for_each_use(f)),
            Expr::Unary { expr, .. } => expr.for_each_use(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.for_each_use(f);
                rhs.for_each_use(f);
            }
            Expr::Var(v) => f(*v),
        }
    }

    pub fn uses(&self) -> Vec<VarRef> {
        let mut out = Vec::new();
        self.for_each_use(&mut |v| out.push(v));
        out
    }

    pub fn mentions(&self, var: VarRef) -> bool {
        let mut found = false;
        self.for_each_use(&mut |v| found |= v == var);
        found
    }

    /// Re-point every use of `old` to `new`. Returns the number of uses changed.
    pub fn replace_var(&mut self, old: VarRef, new: VarRef) -> usize {
        match self {
            Expr::Bool(_) | Expr::Int { .. } | Expr::Str(_) => 0,
            Expr::List { elems, .. } => elems.iter_mut().map(|e| e.replace_var(old, new)).sum(),
            Expr::Unary { expr, .. } => expr.replace_var(old, new),
            Expr::Binary { lhs, rhs, .. } => lhs.replace_var(old, new) + rhs.replace_var(old, new),
            Expr::Var(v) => {
                if *v == old {
                    *v = new;
                    1
                } else {
                    0
                }
            }
        }
    }

    /// Render with variable names resolved through `scope`.
    pub fn display<'a>(&'a self, scope: &'a dyn Scope) -> ExprDisplay<'a> {
        ExprDisplay { expr: self, scope }
    }
}

/// `Display` adapter produced by [`Expr::display`].
pub struct ExprDisplay<'a> {
    expr: &'a Expr,
    scope: &'a dyn Scope,
}

impl fmt::Display for ExprDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.expr {
            Expr::Bool(b) => write!(f, "{b}"),
            Expr::Int { value, .. } => write!(f, "{value}"),
            Expr::Str(s) => write!(f, "{s:?}"),
            Expr::List { elems, .. } => {
                write!(f, "[")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e.display(self.scope))?;
                }
                write!(f, "]")
            }
            Expr::Unary { op, expr, .. } => write!(f, "{}{}", op.symbol(), expr.display(self.scope)),
            Expr::Binary { op, lhs, rhs, .. } => write!(
                f,
                "({} {} {})",
                lhs.display(self.scope),
                op.symbol(),
                rhs.display(self.scope)
            ),
            Expr::Var(v) => write!(f, "{}", self.scope.var_name(*v)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Names;

    impl Scope for Names {
        fn var_type(&self, var: VarRef) -> Option<&Type> {
            static I16: Type = Type::Int(16);
            match var {
                VarRef::Local(_) => Some(&I16),
                VarRef::Global(_) => None,
            }
        }

        fn var_name(&self, var: VarRef) -> String {
            match var {
                VarRef::Local(id) => format!("l{}", id.0),
                VarRef::Global(id) => format!("g{}", id.0),
            }
        }
    }

    #[test]
    fn replace_var_rewrites_every_leaf() {
        let a = VarRef::Local(LocalId(0));
        let b = VarRef::Local(LocalId(1));
        let mut e = Expr::binary(
            BinaryOp::Add,
            Expr::var(a),
            Expr::binary(BinaryOp::Mul, Expr::var(a), Expr::var(b), Type::Int(16)),
            Type::Int(16),
        );
        assert_eq!(e.replace_var(a, b), 2);
        assert_eq!(e.uses(), vec![b, b, b]);
        assert!(!e.mentions(a));
    }

    #[test]
    fn types_resolve_through_scope() {
        let e = Expr::var(LocalId(3));
        assert_eq!(e.ty(&Names), Some(Type::Int(16)));
        assert_eq!(Expr::var(GlobalId(0)).ty(&Names), None);
        assert_eq!(Expr::not(Expr::Bool(true)).ty(&Names), Some(Type::Bool));
    }

    #[test]
    fn display_is_fully_parenthesized() {
        let e = Expr::and(
            Expr::var(LocalId(0)),
            Expr::not(Expr::binary(
                BinaryOp::Lt,
                Expr::var(GlobalId(1)),
                Expr::int(3, Type::Int(8)),
                Type::Bool,
            )),
        );
        assert_eq!(e.display(&Names).to_string(), "(l0 && !(g1 < 3))");
    }

    #[test]
    fn zero_of_list_is_elementwise() {
        let z = Expr::zero(&Type::list(2, Type::Bool)).unwrap();
        assert!(z.is_literal());
        let Expr::List { elems, .. } = z else { panic!("expected list") };
        assert_eq!(elems, vec![Expr::Bool(false), Expr::Bool(false)]);
    }

    #[test]
    fn zero_of_huge_list_is_refused() {
        let huge = Type::list(4_000_000_000, Type::Int(8));
        assert_eq!(huge.scalar_count(), 4_000_000_000);
        assert!(Expr::zero(&huge).is_none());
        let nested = Type::list(u32::MAX, Type::list(u32::MAX, Type::Bool));
        assert!(Expr::zero(&nested).is_none());
    }
}
