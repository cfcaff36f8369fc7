// dot.rs — Graphviz DOT output for networks and actor FSMs
//
// Networks render as one box per instance and one edge per connection,
// labelled with the port names and the token type. FSMs render one node
// per state (the initial state double-circled) and one edge per
// transition, labelled with the action name.
//
// Preconditions: `network` was built by `network::build_network`.
// Postconditions: returns a valid DOT string.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::fmt::{self, Write};

use crate::actor::Actor;
use crate::fsm::Fsm;
use crate::network::Network;

/// Emit a network as a Graphviz DOT string.
pub fn network_dot(network: &Network) -> String {
    let mut buf = String::new();
    // Writing into a String cannot fail.
    let _ = write_network(&mut buf, network);
    buf
}

/// Emit the FSM of `actor` as a Graphviz DOT string. Actors without an FSM
/// render as a single implicit state.
pub fn fsm_dot(actor: &Actor) -> String {
    let mut buf = String::new();
    let _ = write_fsm(&mut buf, actor);
    buf
}

fn write_header(buf: &mut String, name: &str) -> fmt::Result {
    writeln!(buf, "digraph {} {{", sanitize(name))?;
    writeln!(buf, "    rankdir=LR;")?;
    writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10];")?;
    writeln!(buf, "    edge [fontname=\"Helvetica\", fontsize=9];")
}

fn write_network(buf: &mut String, network: &Network) -> fmt::Result {
    write_header(buf, &network.name)?;
    writeln!(buf)?;
    for (id, inst) in network.instances() {
        writeln!(
            buf,
            "    n{} [shape=box, style=filled, fillcolor=lightblue, label=\"{}\\n{}\"];",
            id.0,
            escape(&inst.id),
            escape(&inst.class)
        )?;
    }
    if !network.connections().is_empty() {
        writeln!(buf)?;
    }
    for conn in network.connections() {
        write!(
            buf,
            "    n{} -> n{} [taillabel=\"{}\", headlabel=\"{}\", label=\"{}",
            conn.source.0,
            conn.target.0,
            escape(&conn.source_port.name),
            escape(&conn.target_port.name),
            conn.source_port.ty
        )?;
        if let Some(size) = conn.buffer_size {
            write!(buf, " [{size}]")?;
        }
        writeln!(buf, "\"];")?;
    }
    writeln!(buf, "}}")
}

fn write_fsm(buf: &mut String, actor: &Actor) -> fmt::Result {
    write_header(buf, &actor.name)?;
    writeln!(buf)?;
    match &actor.fsm {
        Some(fsm) => write_states(buf, actor, fsm)?,
        None => {
            writeln!(buf, "    s0 [shape=doublecircle, label=\"\"];")?;
            for action in &actor.actions {
                writeln!(buf, "    s0 -> s0 [label=\"{}\"];", escape(&action.name))?;
            }
        }
    }
    writeln!(buf, "}}")
}

fn write_states(buf: &mut String, actor: &Actor, fsm: &Fsm) -> fmt::Result {
    for (id, state) in fsm.states() {
        let shape = if id == fsm.initial() { "doublecircle" } else { "circle" };
        writeln!(buf, "    s{} [shape={shape}, label=\"{}\"];", id.0, escape(&state.name))?;
    }
    if !fsm.transitions().is_empty() {
        writeln!(buf)?;
    }
    for t in fsm.transitions() {
        let label = actor.action(t.action).map_or("?", |a| a.name.as_str());
        writeln!(buf, "    s{} -> s{} [label=\"{}\"];", t.source.0, t.target.0, escape(label))?;
    }
    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Sanitize a name to valid DOT identifier characters.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() || cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        format!("g_{cleaned}")
    } else {
        cleaned
    }
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Port;
    use crate::ast::{ConnectionDecl, Literal, NetworkDecl, BUFFER_SIZE};
    use crate::network::build_network;
    use crate::registry::{ActorClass, Registry};
    use crate::types::Type;

    fn network() -> Network {
        let mut reg = Registry::new();
        reg.register(ActorClass {
            name: "Src".into(),
            inputs: vec![],
            outputs: vec![Port::new("out", Type::Int(16))],
        })
        .unwrap();
        reg.register(ActorClass {
            name: "Sink".into(),
            inputs: vec![Port::new("in", Type::Int(16))],
            outputs: vec![],
        })
        .unwrap();
        let decl = NetworkDecl::new("top-level")
            .instance("a", "Src")
            .instance("b", "Sink")
            .connect(ConnectionDecl::new("a", "out", "b", "in").with_attribute(BUFFER_SIZE, Literal::Int(8)));
        build_network(&decl, &reg).unwrap()
    }

    #[test]
    fn network_rendering() {
        insta::assert_snapshot!(network_dot(&network()), @r###"
        digraph top_level {
            rankdir=LR;
            node [fontname="Helvetica", fontsize=10];
            edge [fontname="Helvetica", fontsize=9];

            n0 [shape=box, style=filled, fillcolor=lightblue, label="a\nSrc"];
            n1 [shape=box, style=filled, fillcolor=lightblue, label="b\nSink"];

            n0 -> n1 [taillabel="out", headlabel="in", label="int16 [8]"];
        }
        "###);
    }

    #[test]
    fn fsm_rendering_marks_initial_state() {
        let mut actor = Actor::new("Toggle");
        let guard = actor.add_always_true("g").unwrap();
        let a = actor.add_action("on", Default::default(), Default::default(), guard, guard);
        let b = actor.add_action("off", Default::default(), Default::default(), guard, guard);
        let mut fsm = Fsm::new("idle");
        let busy = fsm.add_state("busy");
        let idle = fsm.initial();
        fsm.add_transition(idle, a, busy);
        fsm.add_transition(busy, b, idle);
        actor.fsm = Some(fsm);

        let dot = fsm_dot(&actor);
        assert!(dot.starts_with("digraph Toggle {"));
        assert!(dot.contains("s0 [shape=doublecircle, label=\"idle\"];"));
        assert!(dot.contains("s1 [shape=circle, label=\"busy\"];"));
        assert!(dot.contains("s0 -> s1 [label=\"on\"];"));
        assert!(dot.contains("s1 -> s0 [label=\"off\"];"));
    }

    #[test]
    fn actors_without_fsm_loop_on_one_state() {
        let mut actor = Actor::new("9lives");
        let guard = actor.add_always_true("g").unwrap();
        actor.add_action("step", Default::default(), Default::default(), guard, guard);
        let dot = fsm_dot(&actor);
        assert!(dot.starts_with("digraph g_9lives {"));
        assert!(dot.contains("s0 -> s0 [label=\"step\"];"));
    }
}
