// network.rs — Network multigraph construction and validation
//
// Builds a directed multigraph of actor instances from a `NetworkDecl`.
// Parallel edges are allowed: each connection is its own edge.
//
// Checks run in two phases. Structural and referential checks run eagerly,
// per declaration, in document order: empty required attributes, duplicate
// instance ids, unknown classes, non-homogeneous list parameters, an empty
// network, dangling instance or port references, and non-integer buffer
// sizes. Only once the whole graph is built are port types compared; a
// mismatch names both endpoints as `instance.port`.
//
// Preconditions: every instance class is present in the registry.
// Postconditions: a returned `Network` is fully type-checked.
// Failure modes: first violation → `NetworkError`; no partial graph.
// Side effects: none.

use std::fmt;

use indexmap::IndexMap;
use tracing::debug;

use crate::actor::Port;
use crate::ast::{ConnectionDecl, InstanceDecl, Literal, NetworkDecl, Span, BUFFER_SIZE};
use crate::diag::{codes, DiagCode, Diagnostic};
use crate::registry::Registry;
use crate::types::Type;

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NetworkError {
    #[error("{message}")]
    Parse { message: String, span: Option<Span> },
    #[error("a {element} element must have a valid non-empty \"{attribute}\" attribute")]
    EmptyAttribute {
        element: &'static str,
        attribute: &'static str,
        span: Option<Span>,
    },
    #[error("duplicate instance id \"{id}\"")]
    DuplicateInstance { id: String, span: Option<Span> },
    #[error("network \"{name}\" must contain at least one instance")]
    EmptyNetwork { name: String },
    #[error("instance \"{instance}\" refers to unknown actor class \"{class}\"")]
    UnknownClass {
        instance: String,
        class: String,
        span: Option<Span>,
    },
    #[error("parameter \"{param}\" of instance \"{instance}\" is a list of mixed kinds")]
    HeterogeneousList {
        instance: String,
        param: String,
        span: Option<Span>,
    },
    #[error("a connection refers to a non-existent instance: \"{id}\"")]
    NoSuchInstance { id: String, span: Option<Span> },
    #[error("a connection refers to a non-existent source port: \"{instance}.{port}\"")]
    NoSuchSourcePort {
        instance: String,
        port: String,
        span: Option<Span>,
    },
    #[error("a connection refers to a non-existent target port: \"{instance}.{port}\"")]
    NoSuchTargetPort {
        instance: String,
        port: String,
        span: Option<Span>,
    },
    #[error("FIFO size: expected an integer, got: {value}")]
    BadBufferSize { value: String, span: Option<Span> },
    #[error("type error: {from} is {from_type}, {to} is {to_type}")]
    TypeMismatch {
        from: String,
        from_type: Type,
        to: String,
        to_type: Type,
        span: Option<Span>,
    },
}

impl NetworkError {
    pub fn code(&self) -> DiagCode {
        match self {
            NetworkError::Parse { .. } => codes::E0100,
            NetworkError::EmptyAttribute { .. } => codes::E0101,
            NetworkError::DuplicateInstance { .. } => codes::E0102,
            NetworkError::EmptyNetwork { .. } => codes::E0103,
            NetworkError::UnknownClass { .. } => codes::E0104,
            NetworkError::NoSuchInstance { .. } => codes::E0105,
            NetworkError::NoSuchSourcePort { .. } => codes::E0106,
            NetworkError::NoSuchTargetPort { .. } => codes::E0107,
            NetworkError::BadBufferSize { .. } => codes::E0108,
            NetworkError::HeterogeneousList { .. } => codes::E0109,
            NetworkError::TypeMismatch { .. } => codes::E0201,
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            NetworkError::EmptyNetwork { .. } => None,
            NetworkError::Parse { span, .. }
            | NetworkError::EmptyAttribute { span, .. }
            | NetworkError::DuplicateInstance { span, .. }
            | NetworkError::UnknownClass { span, .. }
            | NetworkError::HeterogeneousList { span, .. }
            | NetworkError::NoSuchInstance { span, .. }
            | NetworkError::NoSuchSourcePort { span, .. }
            | NetworkError::NoSuchTargetPort { span, .. }
            | NetworkError::BadBufferSize { span, .. }
            | NetworkError::TypeMismatch { span, .. } => *span,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::error(self.span(), self.to_string()).with_code(self.code());
        match self {
            NetworkError::TypeMismatch { .. } => diag.with_hint("insert a conversion actor between the two ports"),
            NetworkError::UnknownClass { .. } => diag.with_hint("pass the class interface with --registry"),
            _ => diag,
        }
    }
}

// ── Graph ───────────────────────────────────────────────────────────────────

/// Index of an instance in its `Network`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub id: String,
    pub class: String,
    pub params: IndexMap<String, Literal>,
}

/// One edge: a typed FIFO between an output port and an input port.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub source: InstanceId,
    pub source_port: Port,
    pub target: InstanceId,
    pub target_port: Port,
    pub buffer_size: Option<u32>,
    pub attributes: IndexMap<String, Literal>,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    pub name: String,
    instances: Vec<Instance>,
    connections: Vec<Connection>,
}

impl Network {
    pub fn instances(&self) -> impl Iterator<Item = (InstanceId, &Instance)> {
        self.instances
            .iter()
            .enumerate()
            .map(|(i, inst)| (InstanceId(i as u32), inst))
    }

    pub fn instance(&self, id: InstanceId) -> Option<&Instance> {
        self.instances.get(id.0 as usize)
    }

    pub fn instance_by_name(&self, name: &str) -> Option<InstanceId> {
        self.instances
            .iter()
            .position(|i| i.id == name)
            .map(|i| InstanceId(i as u32))
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn outgoing(&self, id: InstanceId) -> impl Iterator<Item = &Connection> {
        self.connections.iter().filter(move |c| c.source == id)
    }

    pub fn incoming(&self, id: InstanceId) -> impl Iterator<Item = &Connection> {
        self.connections.iter().filter(move |c| c.target == id)
    }

    fn name_of(&self, id: InstanceId) -> &str {
        self.instance(id).map_or("?", |i| i.id.as_str())
    }

    /// `instance.port` for both endpoints of `conn`.
    pub fn endpoints(&self, conn: &Connection) -> (String, String) {
        (
            format!("{}.{}", self.name_of(conn.source), conn.source_port.name),
            format!("{}.{}", self.name_of(conn.target), conn.target_port.name),
        )
    }

    /// Convert back to a declaration, e.g. for JSON output.
    pub fn to_decl(&self) -> NetworkDecl {
        let mut decl = NetworkDecl::new(self.name.clone());
        for inst in &self.instances {
            decl.instances.push(InstanceDecl {
                id: inst.id.clone(),
                class: inst.class.clone(),
                params: inst.params.clone(),
                span: None,
            });
        }
        for conn in &self.connections {
            let mut c = ConnectionDecl::new(
                self.name_of(conn.source),
                conn.source_port.name.clone(),
                self.name_of(conn.target),
                conn.target_port.name.clone(),
            );
            c.attributes = conn.attributes.clone();
            decl.connections.push(c);
        }
        decl
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "network {}: {} instance(s), {} connection(s)",
            self.name,
            self.instances.len(),
            self.connections.len()
        )?;
        for inst in &self.instances {
            writeln!(f, "  {}: {}", inst.id, inst.class)?;
        }
        for conn in &self.connections {
            let (from, to) = self.endpoints(conn);
            write!(f, "  {from} -> {to} [{}]", conn.source_port.ty)?;
            if let Some(size) = conn.buffer_size {
                write!(f, " ({BUFFER_SIZE} = {size})")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

// ── Construction ────────────────────────────────────────────────────────────

fn require(value: &str, element: &'static str, attribute: &'static str, span: Option<Span>) -> Result<(), NetworkError> {
    if value.is_empty() {
        return Err(NetworkError::EmptyAttribute {
            element,
            attribute,
            span,
        });
    }
    Ok(())
}

/// Build and validate the network described by `decl`.
pub fn build_network(decl: &NetworkDecl, registry: &Registry) -> Result<Network, NetworkError> {
    require(&decl.name, "Network", "name", decl.span)?;

    let mut network = Network {
        name: decl.name.clone(),
        instances: Vec::new(),
        connections: Vec::new(),
    };
    let mut ids: IndexMap<&str, InstanceId> = IndexMap::new();

    for inst in &decl.instances {
        require(&inst.id, "Instance", "id", inst.span)?;
        require(&inst.class, "Instance", "class", inst.span)?;
        if ids.contains_key(inst.id.as_str()) {
            return Err(NetworkError::DuplicateInstance {
                id: inst.id.clone(),
                span: inst.span,
            });
        }
        for (name, value) in &inst.params {
            require(name, "Parameter", "name", inst.span)?;
            if !value.is_homogeneous() {
                return Err(NetworkError::HeterogeneousList {
                    instance: inst.id.clone(),
                    param: name.clone(),
                    span: inst.span,
                });
            }
        }
        if registry.lookup(&inst.class).is_none() {
            return Err(NetworkError::UnknownClass {
                instance: inst.id.clone(),
                class: inst.class.clone(),
                span: inst.span,
            });
        }
        ids.insert(inst.id.as_str(), InstanceId(network.instances.len() as u32));
        network.instances.push(Instance {
            id: inst.id.clone(),
            class: inst.class.clone(),
            params: inst.params.clone(),
        });
    }

    if network.instances.is_empty() {
        return Err(NetworkError::EmptyNetwork {
            name: decl.name.clone(),
        });
    }

    for conn in &decl.connections {
        let connection = resolve_connection(conn, &ids, &network, registry)?;
        network.connections.push(connection);
    }

    check_types(&network)?;
    debug!(
        network = %network.name,
        instances = network.instances.len(),
        connections = network.connections.len(),
        "network built"
    );
    Ok(network)
}

fn resolve_connection(
    conn: &ConnectionDecl,
    ids: &IndexMap<&str, InstanceId>,
    network: &Network,
    registry: &Registry,
) -> Result<Connection, NetworkError> {
    let span = conn.span;
    require(&conn.src, "Connection", "src", span)?;
    require(&conn.src_port, "Connection", "src-port", span)?;
    require(&conn.dst, "Connection", "dst", span)?;
    require(&conn.dst_port, "Connection", "dst-port", span)?;

    let lookup = |id: &str| {
        ids.get(id).copied().ok_or_else(|| NetworkError::NoSuchInstance {
            id: id.to_string(),
            span,
        })
    };
    let source = lookup(&conn.src)?;
    let target = lookup(&conn.dst)?;

    let class_of = |id: InstanceId| network.instance(id).and_then(|i| registry.lookup(&i.class));
    let source_port = class_of(source)
        .and_then(|c| c.output(&conn.src_port))
        .cloned()
        .ok_or_else(|| NetworkError::NoSuchSourcePort {
            instance: conn.src.clone(),
            port: conn.src_port.clone(),
            span,
        })?;
    let target_port = class_of(target)
        .and_then(|c| c.input(&conn.dst_port))
        .cloned()
        .ok_or_else(|| NetworkError::NoSuchTargetPort {
            instance: conn.dst.clone(),
            port: conn.dst_port.clone(),
            span,
        })?;

    let buffer_size = match conn.attributes.get(BUFFER_SIZE) {
        None => None,
        Some(Literal::Int(v)) => Some(u32::try_from(*v).map_err(|_| NetworkError::BadBufferSize {
            value: v.to_string(),
            span,
        })?),
        Some(other) => {
            return Err(NetworkError::BadBufferSize {
                value: other.to_string(),
                span,
            })
        }
    };

    Ok(Connection {
        source,
        source_port,
        target,
        target_port,
        buffer_size,
        attributes: conn.attributes.clone(),
        span,
    })
}

/// Graph-wide check: every connection joins ports of equal type.
fn check_types(network: &Network) -> Result<(), NetworkError> {
    for conn in &network.connections {
        if conn.source_port.ty != conn.target_port.ty {
            let (from, to) = network.endpoints(conn);
            return Err(NetworkError::TypeMismatch {
                from,
                from_type: conn.source_port.ty.clone(),
                to,
                to_type: conn.target_port.ty.clone(),
                span: conn.span,
            });
        }
    }
    Ok(())
}

/// Parse a textual description and build it.
pub fn parse_network(source: &str, registry: &Registry) -> Result<Network, NetworkError> {
    let result = crate::parser::parse(source);
    if let Some(err) = result.errors.first() {
        return Err(NetworkError::Parse {
            message: err.to_string(),
            span: Some(*err.span()),
        });
    }
    let decl = result.network.ok_or_else(|| NetworkError::Parse {
        message: "empty network description".into(),
        span: None,
    })?;
    build_network(&decl, registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ActorClass;

    fn registry(b_in: Type) -> Registry {
        let mut reg = Registry::new();
        reg.register(ActorClass {
            name: "A".into(),
            inputs: vec![],
            outputs: vec![Port::new("out", Type::Int(16))],
        })
        .unwrap();
        reg.register(ActorClass {
            name: "B".into(),
            inputs: vec![Port::new("in", b_in)],
            outputs: vec![],
        })
        .unwrap();
        reg
    }

    fn pair() -> NetworkDecl {
        NetworkDecl::new("N")
            .instance("A", "A")
            .instance("B", "B")
            .connect(ConnectionDecl::new("A", "out", "B", "in"))
    }

    #[test]
    fn matching_types_build() {
        let net = build_network(&pair(), &registry(Type::Int(16))).unwrap();
        assert_eq!(net.connections().len(), 1);
        let a = net.instance_by_name("A").unwrap();
        assert_eq!(net.outgoing(a).count(), 1);
    }

    #[test]
    fn type_mismatch_names_both_endpoints() {
        let err = build_network(&pair(), &registry(Type::Int(32))).unwrap_err();
        assert_eq!(err.to_string(), "type error: A.out is int16, B.in is int32");
        assert_eq!(err.code(), codes::E0201);
    }

    #[test]
    fn missing_instance_is_reported_before_types() {
        let decl = pair().connect(ConnectionDecl::new("A", "out", "Z", "in"));
        let err = build_network(&decl, &registry(Type::Int(32))).unwrap_err();
        assert!(matches!(err, NetworkError::NoSuchInstance { ref id, .. } if id == "Z"));
    }

    #[test]
    fn parallel_edges_are_kept() {
        let decl = pair().connect(ConnectionDecl::new("A", "out", "B", "in"));
        let net = build_network(&decl, &registry(Type::Int(16))).unwrap();
        assert_eq!(net.connections().len(), 2);
    }

    #[test]
    fn source_and_target_ports_are_distinguished() {
        let bad_src = NetworkDecl::new("N")
            .instance("A", "A")
            .instance("B", "B")
            .connect(ConnectionDecl::new("A", "in", "B", "in"));
        let err = build_network(&bad_src, &registry(Type::Int(16))).unwrap_err();
        assert_eq!(err.code(), codes::E0106);

        let bad_dst = NetworkDecl::new("N")
            .instance("A", "A")
            .instance("B", "B")
            .connect(ConnectionDecl::new("A", "out", "B", "out"));
        let err = build_network(&bad_dst, &registry(Type::Int(16))).unwrap_err();
        assert_eq!(err.code(), codes::E0107);
    }

    #[test]
    fn buffer_size_must_be_an_integer() {
        let decl = NetworkDecl::new("N").instance("A", "A").instance("B", "B").connect(
            ConnectionDecl::new("A", "out", "B", "in").with_attribute(BUFFER_SIZE, Literal::Str("big".into())),
        );
        let err = build_network(&decl, &registry(Type::Int(16))).unwrap_err();
        assert_eq!(err.to_string(), "FIFO size: expected an integer, got: \"big\"");

        let mut ok = pair();
        ok.connections[0] = ok.connections[0].clone().with_attribute(BUFFER_SIZE, Literal::Int(64));
        let net = build_network(&ok, &registry(Type::Int(16))).unwrap();
        assert_eq!(net.connections()[0].buffer_size, Some(64));
    }

    #[test]
    fn structural_errors() {
        let reg = registry(Type::Int(16));
        let err = build_network(&NetworkDecl::new(""), &reg).unwrap_err();
        assert_eq!(err.code(), codes::E0101);
        let err = build_network(&NetworkDecl::new("N"), &reg).unwrap_err();
        assert_eq!(err, NetworkError::EmptyNetwork { name: "N".into() });
        let err = build_network(&NetworkDecl::new("N").instance("A", "A").instance("A", "B"), &reg).unwrap_err();
        assert_eq!(err.code(), codes::E0102);
        let err = build_network(&NetworkDecl::new("N").instance("X", "Nope"), &reg).unwrap_err();
        assert_eq!(err.code(), codes::E0104);
        let err = build_network(
            &NetworkDecl::new("N")
                .instance("A", "A")
                .connect(ConnectionDecl::new("A", "", "A", "in")),
            &reg,
        )
        .unwrap_err();
        assert!(err.to_string().contains("\"src-port\""));
    }

    #[test]
    fn parsed_errors_carry_spans() {
        let source = "network N {\n  instance A: A;\n  instance B: B;\n  A.out -> B.in;\n}";
        let err = parse_network(source, &registry(Type::Int(8))).unwrap_err();
        let diag = err.to_diagnostic();
        assert_eq!(
            diag.render("n.nl", Some(source)),
            "n.nl:4:3: error[E0201]: type error: A.out is int16, B.in is int8\n  hint: insert a conversion actor between the two ports"
        );
    }

    #[test]
    fn syntax_errors_become_parse_errors() {
        let err = parse_network("network {", &registry(Type::Int(8))).unwrap_err();
        assert_eq!(err.code(), codes::E0100);
    }
}
