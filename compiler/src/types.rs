// types.rs — Value types of the actor IR and of network ports
//
// A closed tagged union: passes match on it exhaustively instead of asking a
// type object "is this a list?". Types compare structurally, which is what
// port-compatibility checking in `network` relies on.
//
// Text form (used by registries, actor documents and diagnostics):
//   bool | intN | uintN | float | String | void | [T; N]
//
// Preconditions: none.
// Postconditions: `Display` and `FromStr` round-trip for every type.
// Failure modes: malformed text → `TypeParseError`.
// Side effects: none.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An IR value type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Type {
    Bool,
    /// Signed integer of the given bit width.
    Int(u32),
    /// Unsigned integer of the given bit width.
    Uint(u32),
    Float,
    String,
    /// Fixed-size list (array) of `size` elements.
    List { size: u32, elem: Box<Type> },
    Void,
}

/// Representation class of a type: two types of the same class differ at
/// most in bit width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    Bool,
    Int,
    Uint,
    Float,
    String,
    List,
    Void,
}

impl Type {
    pub fn int(size: u32) -> Self {
        Type::Int(size)
    }

    pub fn uint(size: u32) -> Self {
        Type::Uint(size)
    }

    pub fn list(size: u32, elem: Type) -> Self {
        Type::List {
            size,
            elem: Box::new(elem),
        }
    }

    pub fn class(&self) -> TypeClass {
        match self {
            Type::Bool => TypeClass::Bool,
            Type::Int(_) => TypeClass::Int,
            Type::Uint(_) => TypeClass::Uint,
            Type::Float => TypeClass::Float,
            Type::String => TypeClass::String,
            Type::List { .. } => TypeClass::List,
            Type::Void => TypeClass::Void,
        }
    }

    /// Storage width in bits. Lists count all of their elements.
    pub fn size_in_bits(&self) -> u32 {
        match self {
            Type::Bool => 1,
            Type::Int(n) | Type::Uint(n) => *n,
            Type::Float => 32,
            Type::String | Type::Void => 0,
            Type::List { size, elem } => size.saturating_mul(elem.size_in_bits()),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Type::List { .. })
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Bool)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    /// Number of scalars held by a value of this type. Saturates.
    pub fn scalar_count(&self) -> u64 {
        match self {
            Type::List { size, elem } => u64::from(*size).saturating_mul(elem.scalar_count()),
            _ => 1,
        }
    }

    /// Element type of a list; `None` for scalars.
    pub fn elem(&self) -> Option<&Type> {
        match self {
            Type::List { elem, .. } => Some(elem),
            _ => None,
        }
    }

    /// Whether a value of type `self` must be explicitly converted before it
    /// can be used where `required` is expected.
    pub fn needs_cast(&self, required: &Type) -> bool {
        self.class() != required.class() || self.size_in_bits() != required.size_in_bits()
    }

    /// Least upper bound of two types, if they have one.
    ///
    /// Same-class integers widen to the larger width; a signed/unsigned mix
    /// widens to a signed type able to hold both ranges.
    pub fn lub(&self, other: &Type) -> Option<Type> {
        match (self, other) {
            (Type::Int(a), Type::Int(b)) => Some(Type::Int(*a.max(b))),
            (Type::Uint(a), Type::Uint(b)) => Some(Type::Uint(*a.max(b))),
            (Type::Int(i), Type::Uint(u)) | (Type::Uint(u), Type::Int(i)) => {
                Some(Type::Int((*i).max(u + 1)))
            }
            (Type::List { size: s1, elem: e1 }, Type::List { size: s2, elem: e2 }) => {
                let elem = e1.lub(e2)?;
                Some(Type::list((*s1).max(*s2), elem))
            }
            (a, b) if a == b => Some(a.clone()),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Int(n) => write!(f, "int{n}"),
            Type::Uint(n) => write!(f, "uint{n}"),
            Type::Float => write!(f, "float"),
            Type::String => write!(f, "String"),
            Type::List { size, elem } => write!(f, "[{elem}; {size}]"),
            Type::Void => write!(f, "void"),
        }
    }
}

/// Error returned when a type's text form cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid type '{text}': {reason}")]
pub struct TypeParseError {
    pub text: String,
    pub reason: &'static str,
}

impl FromStr for Type {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let err = |reason| TypeParseError {
            text: text.to_string(),
            reason,
        };
        match text {
            "bool" => return Ok(Type::Bool),
            "float" => return Ok(Type::Float),
            "String" | "string" => return Ok(Type::String),
            "void" => return Ok(Type::Void),
            _ => {}
        }

        if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
            // The element type may itself be a list, so split at the last ';'.
            let split = inner.rfind(';').ok_or_else(|| err("expected '[T; N]'"))?;
            let elem: Type = inner[..split].parse()?;
            let size = inner[split + 1..]
                .trim()
                .parse::<u32>()
                .map_err(|_| err("list size must be a non-negative integer"))?;
            return Ok(Type::list(size, elem));
        }

        let (ctor, digits): (fn(u32) -> Type, &str) = if let Some(d) = text.strip_prefix("uint") {
            (Type::Uint, d)
        } else if let Some(d) = text.strip_prefix("int") {
            (Type::Int, d)
        } else {
            return Err(err("unknown type name"));
        };
        let size = digits
            .parse::<u32>()
            .map_err(|_| err("integer width must follow 'int'/'uint'"))?;
        if size == 0 || size > 64 {
            return Err(err("integer width must be between 1 and 64"));
        }
        Ok(ctor(size))
    }
}

impl TryFrom<String> for Type {
    type Error = TypeParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Type> for String {
    fn from(ty: Type) -> Self {
        ty.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_round_trip() {
        for text in ["bool", "int16", "uint8", "float", "String", "void", "[int32; 4]", "[[uint8; 2]; 3]"] {
            let ty: Type = text.parse().unwrap();
            assert_eq!(ty.to_string(), text);
        }
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("int".parse::<Type>().is_err());
        assert!("int0".parse::<Type>().is_err());
        assert!("int65".parse::<Type>().is_err());
        assert!("complex".parse::<Type>().is_err());
        assert!("[int8; x]".parse::<Type>().is_err());
    }

    #[test]
    fn needs_cast_compares_class_and_width() {
        assert!(Type::Uint(16).needs_cast(&Type::Uint(8)));
        assert!(Type::Int(8).needs_cast(&Type::Uint(8)));
        assert!(!Type::Int(32).needs_cast(&Type::Int(32)));
        assert!(!Type::Bool.needs_cast(&Type::Bool));
        assert!(Type::Bool.needs_cast(&Type::Int(1)));
    }

    #[test]
    fn lub_widens() {
        assert_eq!(Type::Int(8).lub(&Type::Int(16)), Some(Type::Int(16)));
        assert_eq!(Type::Uint(8).lub(&Type::Int(8)), Some(Type::Int(9)));
        assert_eq!(Type::Bool.lub(&Type::Bool), Some(Type::Bool));
        assert_eq!(Type::Bool.lub(&Type::Int(8)), None);
    }

    #[test]
    fn serde_uses_text_form() {
        let json = serde_json::to_string(&Type::list(4, Type::Int(16))).unwrap();
        assert_eq!(json, "\"[int16; 4]\"");
        let back: Type = serde_json::from_str("\"uint8\"").unwrap();
        assert_eq!(back, Type::Uint(8));
    }
}
