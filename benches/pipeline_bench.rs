use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use dacc::actor::{Actor, Pattern, Port};
use dacc::expr::{BinaryOp, Expr};
use dacc::ir::{Inst, ListRef, PhiArm, Pred, Procedure, Variable};
use dacc::pipeline::PipelineOptions;
use dacc::registry::{ActorClass, Registry};
use dacc::types::Type;
use dacc::*;

// Scenarios scale along one axis each: network size, number of
// conditionals per procedure, number of pattern-equal actions.

// ── Scenario generators ──

/// A chain of `n` stages, each stage fed by the previous one.
fn generate_chain_network(n: usize) -> String {
    let mut text = String::from("network Chain {\n");
    for i in 0..n {
        text.push_str(&format!("  instance s{i}: Stage(gain = {i}, taps = [1, 2, 3]);\n"));
    }
    for i in 1..n {
        text.push_str(&format!("  s{}.out -> s{i}.in {{ bufferSize = 16 }};\n", i - 1));
    }
    text.push_str("}\n");
    text
}

fn stage_registry() -> Registry {
    let mut reg = Registry::new();
    reg.register(ActorClass {
        name: "Stage".into(),
        inputs: vec![Port::new("in", Type::Int(16))],
        outputs: vec![Port::new("out", Type::Int(16))],
    })
    .expect("fresh registry");
    reg
}

/// One procedure made of `n` if/else diamonds joined by phis.
fn diamond_actor(n: usize) -> Actor {
    let i32_ty = Type::Int(32);
    let mut actor = Actor::new("Diamonds");
    let mut p = Procedure::new("sum", i32_ty.clone());
    let v = p.add_param(Variable::new("v", Type::Int(16)));
    let mut acc = p.add_local(Variable::new("s", i32_ty.clone()));
    let first = p.new_block();
    p.append_inst(first, Inst::Assign { target: acc, value: Expr::int(0, i32_ty.clone()) })
        .unwrap();
    p.push_node(ListRef::Body, first).unwrap();

    for i in 0..n {
        let k = i as u32 + 1;
        let c = p.add_local(Variable::new("c", Type::Bool).with_index(k));
        let a = p.add_local(Variable::new("a", Type::Int(16)).with_index(k));
        let b = p.add_local(Variable::new("b", Type::Int(16)).with_index(k));
        let y = p.add_local(Variable::new("y", Type::Int(16)).with_index(k));
        let before = p.last_block().unwrap();
        let test = Expr::binary(BinaryOp::Gt, Expr::var(v), Expr::int(i as i64, Type::Int(16)), Type::Bool);
        p.append_inst(before, Inst::Assign { target: c, value: test }).unwrap();
        let branch = p.new_if(Expr::var(c));
        let t = p.new_block();
        p.append_inst(t, Inst::Assign { target: a, value: Expr::int(1, Type::Int(16)) }).unwrap();
        p.push_node(ListRef::Then(branch), t).unwrap();
        let e = p.new_block();
        p.append_inst(e, Inst::Assign { target: b, value: Expr::var(v) }).unwrap();
        p.push_node(ListRef::Else(branch), e).unwrap();
        let join = p.join_of(branch).unwrap();
        p.append_inst(
            join,
            Inst::Phi { target: y, arms: vec![PhiArm::new(Pred::Then, a), PhiArm::new(Pred::Else, b)] },
        )
        .unwrap();
        p.push_node(ListRef::Body, branch).unwrap();
        let after = p.last_block().unwrap();
        let next = p.add_local(Variable::new("s", i32_ty.clone()).with_index(k));
        let add = Expr::binary(BinaryOp::Add, Expr::var(acc), Expr::var(y), i32_ty.clone());
        p.append_inst(after, Inst::Assign { target: next, value: add }).unwrap();
        acc = next;
    }
    let last = p.last_block().unwrap();
    p.append_inst(last, Inst::Return { value: Some(Expr::var(acc)) }).unwrap();
    let body = actor.add_proc(p);
    let guard = actor.add_always_true("guard").unwrap();
    actor.add_action("a", Pattern::new(), Pattern::new(), guard, body);
    actor
}

/// `n` pattern-equal actions with trivial guards and empty bodies.
fn parallel_actions(n: usize) -> Actor {
    let mut actor = Actor::new("Parallel");
    actor.inputs.push(Port::new("IN", Type::Int(8)));
    for i in 0..n {
        let guard = actor.add_always_true(format!("guard_{i}")).unwrap();
        let body = actor.add_proc(Procedure::new(format!("body_{i}"), Type::Void));
        actor.add_action(format!("a{i}"), Pattern::new().with("IN", 1), Pattern::new(), guard, body);
    }
    actor
}

// ── Benchmarks ──

fn bench_network_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("network/parse");
    for n in [1_usize, 10, 50, 200] {
        let source = generate_chain_network(n);
        group.bench_with_input(BenchmarkId::from_parameter(format!("{n}stages")), &source, |b, source| {
            b.iter(|| {
                let r = parser::parse(black_box(source.as_str()));
                black_box(&r.network);
            });
        });
    }
    group.finish();
}

fn bench_network_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("network/build");
    let registry = stage_registry();
    for n in [10_usize, 200] {
        let decl = parser::parse(&generate_chain_network(n)).network.unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(format!("{n}stages")), &decl, |b, decl| {
            b.iter(|| black_box(network::build_network(black_box(decl), &registry).unwrap()));
        });
    }
    group.finish();
}

fn bench_actor_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("actor/pipeline");
    let if_convert = PipelineOptions {
        if_convert: true,
        store_once: true,
        ..PipelineOptions::default()
    };
    for n in [1_usize, 8, 32] {
        let actor = diamond_actor(n);
        for (label, opts) in [("default", PipelineOptions::default()), ("if_convert", if_convert.clone())] {
            group.bench_with_input(BenchmarkId::new(label, format!("{n}diamonds")), &actor, |b, actor| {
                b.iter_batched(
                    || actor.clone(),
                    |mut actor| {
                        let report = pipeline::run_actor_pipeline(&mut actor, &opts).unwrap();
                        black_box(report);
                    },
                    BatchSize::SmallInput,
                );
            });
        }
    }
    group.finish();
}

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("actor/classify");
    for n in [2_usize, 16, 64] {
        let actor = parallel_actions(n);
        group.bench_with_input(BenchmarkId::from_parameter(format!("{n}actions")), &actor, |b, actor| {
            b.iter_batched(
                || actor.clone(),
                |mut actor| black_box(classify::classify(&mut actor).unwrap()),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_network_parse,
    bench_network_build,
    bench_actor_pipeline,
    bench_classify
);
criterion_main!(benches);
