// ast.rs — Declarative network descriptions
//
// A network description lists instances (id, actor class, named literal
// parameters) and connections (source instance/port, destination
// instance/port, attributes). The same structure is produced by the text
// parser and deserialized from JSON; only parsed documents carry spans.
//
// Preconditions: none.
// Postconditions: none (data-only module).
// Failure modes: none.
// Side effects: none.

use chumsky::span::SimpleSpan;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Byte-offset span (alias for chumsky's `SimpleSpan`).
pub type Span = SimpleSpan;

/// Attribute naming the FIFO size of a connection.
pub const BUFFER_SIZE: &str = "bufferSize";

/// A literal parameter or attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Literal>),
}

impl Literal {
    pub fn kind(&self) -> &'static str {
        match self {
            Literal::Bool(_) => "bool",
            Literal::Int(_) => "int",
            Literal::Str(_) => "string",
            Literal::List(_) => "list",
        }
    }

    /// A list is well formed when all its elements have the same kind,
    /// recursively.
    pub fn is_homogeneous(&self) -> bool {
        match self {
            Literal::List(items) => {
                let same_kind = items.windows(2).all(|w| w[0].kind() == w[1].kind());
                same_kind && items.iter().all(Literal::is_homogeneous)
            }
            _ => true,
        }
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Str(s) => write!(f, "{s:?}"),
            Literal::List(items) => {
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDecl {
    pub id: String,
    pub class: String,
    #[serde(default)]
    pub params: IndexMap<String, Literal>,
    #[serde(skip)]
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConnectionDecl {
    pub src: String,
    pub src_port: String,
    pub dst: String,
    pub dst_port: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<String, Literal>,
    #[serde(skip)]
    pub span: Option<Span>,
}

impl ConnectionDecl {
    pub fn new(
        src: impl Into<String>,
        src_port: impl Into<String>,
        dst: impl Into<String>,
        dst_port: impl Into<String>,
    ) -> Self {
        Self {
            src: src.into(),
            src_port: src_port.into(),
            dst: dst.into(),
            dst_port: dst_port.into(),
            attributes: IndexMap::new(),
            span: None,
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: Literal) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }
}

/// A complete network description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkDecl {
    pub name: String,
    #[serde(default)]
    pub instances: Vec<InstanceDecl>,
    #[serde(default)]
    pub connections: Vec<ConnectionDecl>,
    #[serde(skip)]
    pub span: Option<Span>,
}

impl NetworkDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instances: Vec::new(),
            connections: Vec::new(),
            span: None,
        }
    }

    pub fn instance(mut self, id: impl Into<String>, class: impl Into<String>) -> Self {
        self.instances.push(InstanceDecl {
            id: id.into(),
            class: class.into(),
            params: IndexMap::new(),
            span: None,
        });
        self
    }

    pub fn connect(mut self, connection: ConnectionDecl) -> Self {
        self.connections.push(connection);
        self
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_uses_kebab_case_ports() {
        let decl = NetworkDecl::from_json(
            r#"{
                "name": "Top",
                "instances": [
                    {"id": "a", "class": "Source", "params": {"count": 10, "taps": [1, 2]}},
                    {"id": "b", "class": "Sink"}
                ],
                "connections": [
                    {"src": "a", "src-port": "out", "dst": "b", "dst-port": "in",
                     "attributes": {"bufferSize": 64}}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(decl.instances[0].params["taps"], Literal::List(vec![Literal::Int(1), Literal::Int(2)]));
        assert_eq!(decl.connections[0].src_port, "out");
        assert_eq!(decl.connections[0].attributes[BUFFER_SIZE], Literal::Int(64));
        assert!(decl.span.is_none());
    }

    #[test]
    fn homogeneity_is_recursive() {
        let ok = Literal::List(vec![
            Literal::List(vec![Literal::Int(1)]),
            Literal::List(vec![Literal::Int(2), Literal::Int(3)]),
        ]);
        assert!(ok.is_homogeneous());
        let mixed = Literal::List(vec![Literal::Int(1), Literal::Str("x".into())]);
        assert!(!mixed.is_homogeneous());
        assert_eq!(mixed.to_string(), "[1, \"x\"]");
    }
}
