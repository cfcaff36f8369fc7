// Property-based tests for pass invariants.
//
// Four categories:
// 1. Phi removal: generated diamond chains, with branch values of mixed
//    widths, lose every phi and compute the same result
// 2. If-conversion: the same chains become a single flat block, still
//    computing the same result
// 3. Single store: generated store sequences keep one store per variable
// 4. Cast insertion: a second run inserts nothing
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use dacc::actor::{Actor, Pattern};
use dacc::cast::insert_casts;
use dacc::expr::{BinaryOp, Expr, VarRef};
use dacc::id::{GlobalId, ProcId};
use dacc::if_convert::is_flat;
use dacc::interp::{Interpreter, Value};
use dacc::ir::{Inst, ListRef, PhiArm, Pred, Procedure, Variable};
use dacc::pipeline::{run_actor_pipeline, PipelineOptions};
use dacc::types::Type;
use proptest::prelude::*;

// ── Generators ──────────────────────────────────────────────────────────────

const I32: Type = Type::Int(32);

/// One diamond: `y := v > threshold ? then_value : else_value`, where `y`
/// is `int32` and each branch value may be narrower.
#[derive(Debug, Clone)]
struct Diamond {
    threshold: i64,
    then_value: (Type, i64),
    else_value: (Type, i64),
}

/// An integer type with a value it can represent.
fn arb_typed_value() -> impl Strategy<Value = (Type, i64)> {
    arb_int_type().prop_flat_map(|ty| {
        let (lo, hi) = match ty {
            Type::Int(bits) => (-(1i64 << (bits - 1)), 1i64 << (bits - 1)),
            Type::Uint(bits) => (0, 1i64 << bits),
            _ => (0, 1),
        };
        (Just(ty), lo.max(-1000)..hi.min(1000))
    })
}

fn arb_diamonds() -> impl Strategy<Value = Vec<Diamond>> {
    prop::collection::vec(
        (-50i64..50, arb_typed_value(), arb_typed_value()).prop_map(|(threshold, then_value, else_value)| Diamond {
            threshold,
            then_value,
            else_value,
        }),
        1..6,
    )
}

/// `sum(v)`: the sum of every diamond's selected value.
fn diamond_chain(diamonds: &[Diamond]) -> (Actor, ProcId) {
    let mut actor = Actor::new("Chain");
    let mut p = Procedure::new("sum", I32);
    let v = p.add_param(Variable::new("v", I32));
    let mut acc = p.add_local(Variable::new("s", I32));
    let first = p.new_block();
    p.append_inst(first, Inst::Assign { target: acc, value: Expr::int(0, I32) })
        .unwrap();
    p.push_node(ListRef::Body, first).unwrap();

    for (i, d) in diamonds.iter().enumerate() {
        let n = i as u32 + 1;
        let c = p.add_local(Variable::new("c", Type::Bool).with_index(n));
        let (then_ty, then_value) = d.then_value.clone();
        let (else_ty, else_value) = d.else_value.clone();
        let a = p.add_local(Variable::new("a", then_ty.clone()).with_index(n));
        let b = p.add_local(Variable::new("b", else_ty.clone()).with_index(n));
        let y = p.add_local(Variable::new("y", I32).with_index(n));

        let before = p.last_block().unwrap();
        let test = Expr::binary(BinaryOp::Gt, Expr::var(v), Expr::int(d.threshold, I32), Type::Bool);
        p.append_inst(before, Inst::Assign { target: c, value: test }).unwrap();

        let branch = p.new_if(Expr::var(c));
        let t = p.new_block();
        p.append_inst(t, Inst::Assign { target: a, value: Expr::int(then_value, then_ty) })
            .unwrap();
        p.push_node(ListRef::Then(branch), t).unwrap();
        let e = p.new_block();
        p.append_inst(e, Inst::Assign { target: b, value: Expr::int(else_value, else_ty) })
            .unwrap();
        p.push_node(ListRef::Else(branch), e).unwrap();
        let join = p.join_of(branch).unwrap();
        p.append_inst(
            join,
            Inst::Phi {
                target: y,
                arms: vec![PhiArm::new(Pred::Then, a), PhiArm::new(Pred::Else, b)],
            },
        )
        .unwrap();
        p.push_node(ListRef::Body, branch).unwrap();

        let after = p.last_block().unwrap();
        let next = p.add_local(Variable::new("s", I32).with_index(n));
        let add = Expr::binary(BinaryOp::Add, Expr::var(acc), Expr::var(y), I32);
        p.append_inst(after, Inst::Assign { target: next, value: add }).unwrap();
        acc = next;
    }

    let last = p.last_block().unwrap();
    p.append_inst(last, Inst::Return { value: Some(Expr::var(acc)) }).unwrap();
    let id = actor.add_proc(p);
    (actor, id)
}

/// `update(v)`: a sequence of stores to one state variable, each either
/// unconditional or under `v > 0`.
fn store_sequence(stores: &[(bool, i64)]) -> (Actor, ProcId) {
    let mut actor = Actor::new("Stores");
    let g = actor.add_global(Variable::new("g", I32).with_init(Expr::int(-1, I32)));
    let mut p = Procedure::new("update", Type::Void);
    let v = p.add_param(Variable::new("v", I32));
    let c = p.add_local(Variable::new("c", Type::Bool));
    let first = p.new_block();
    let positive = Expr::binary(BinaryOp::Gt, Expr::var(v), Expr::int(0, I32), Type::Bool);
    p.append_inst(first, Inst::Assign { target: c, value: positive }).unwrap();
    p.push_node(ListRef::Body, first).unwrap();

    for &(conditional, value) in stores {
        let store = Inst::Store {
            target: VarRef::Global(g),
            indexes: vec![],
            value: Expr::int(value, I32),
        };
        if conditional {
            let branch = p.new_if(Expr::var(c));
            let t = p.new_block();
            p.append_inst(t, store).unwrap();
            p.push_node(ListRef::Then(branch), t).unwrap();
            p.push_node(ListRef::Body, branch).unwrap();
        } else {
            let block = p.last_block().unwrap();
            p.append_inst(block, store).unwrap();
        }
    }
    let id = actor.add_proc(p);
    (actor, id)
}

fn arb_int_type() -> impl Strategy<Value = Type> {
    prop_oneof![
        Just(Type::Int(8)),
        Just(Type::Int(16)),
        Just(Type::Int(32)),
        Just(Type::Uint(8)),
        Just(Type::Uint(16)),
    ]
}

fn call(actor: &Actor, id: ProcId, v: i64) -> Option<Value> {
    Interpreter::new(actor).unwrap().call(id, vec![Value::Int(v)]).unwrap()
}

fn count_insts(actor: &Actor, id: ProcId, pred: impl Fn(&Inst) -> bool) -> usize {
    let p = actor.proc(id).unwrap();
    p.insts_forward()
        .into_iter()
        .filter(|i| pred(&p.inst(*i).unwrap().kind))
        .count()
}

// ── Properties ──────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        max_shrink_iters: 200,
        .. ProptestConfig::default()
    })]

    #[test]
    fn phi_removal_preserves_results(diamonds in arb_diamonds(), v in -100i64..100) {
        let (original, id) = diamond_chain(&diamonds);
        let mut actor = original.clone();
        run_actor_pipeline(&mut actor, &PipelineOptions::default()).unwrap();

        prop_assert_eq!(count_insts(&actor, id, Inst::is_phi), 0);
        prop_assert_eq!(call(&actor, id, v), call(&original, id, v));
    }

    #[test]
    fn if_conversion_is_total_on_loop_free_code(diamonds in arb_diamonds(), v in -100i64..100) {
        let (original, id) = diamond_chain(&diamonds);
        let mut actor = original.clone();
        let opts = PipelineOptions { if_convert: true, ..PipelineOptions::default() };
        let report = run_actor_pipeline(&mut actor, &opts).unwrap();

        let converted = report.passes.iter().find(|(n, _)| *n == "if_convert").unwrap().1;
        prop_assert_eq!(converted, diamonds.len());
        prop_assert!(is_flat(actor.proc(id).unwrap()));
        prop_assert_eq!(count_insts(&actor, id, Inst::is_phi), 0);
        prop_assert_eq!(call(&actor, id, v), call(&original, id, v));
    }

    #[test]
    fn store_once_bounds_stores(
        stores in prop::collection::vec((any::<bool>(), -500i64..500), 1..8),
        v in -10i64..10,
        if_convert in any::<bool>(),
    ) {
        let (original, id) = store_sequence(&stores);
        let mut actor = original.clone();
        let opts = PipelineOptions { store_once: true, if_convert, ..PipelineOptions::default() };
        run_actor_pipeline(&mut actor, &opts).unwrap();

        prop_assert_eq!(count_insts(&actor, id, |i| matches!(i, Inst::Store { .. })), 1);

        let run = |a: &Actor| {
            let mut interp = Interpreter::new(a).unwrap();
            interp.call(id, vec![Value::Int(v)]).unwrap();
            interp.global(GlobalId(0)).cloned()
        };
        prop_assert_eq!(run(&actor), run(&original));
    }

    #[test]
    fn cast_insertion_is_idempotent(global_ty in arb_int_type(), param_ty in arb_int_type(), k in 0i64..100) {
        let mut actor = Actor::new("Casts");
        let g = actor.add_global(Variable::new("g", global_ty.clone()));
        let mut p = Procedure::new("p", global_ty);
        let v = p.add_param(Variable::new("v", param_ty.clone()));
        let x = p.add_local(Variable::new("x", param_ty.clone()));
        let b = p.new_block();
        let sum = Expr::binary(BinaryOp::Add, Expr::var(v), Expr::int(k, param_ty.clone()), param_ty);
        p.append_inst(b, Inst::Assign { target: x, value: sum }).unwrap();
        p.append_inst(b, Inst::Store { target: VarRef::Global(g), indexes: vec![], value: Expr::var(x) }).unwrap();
        p.append_inst(b, Inst::Return { value: Some(Expr::var(x)) }).unwrap();
        p.push_node(ListRef::Body, b).unwrap();
        let body = actor.add_proc(p);
        let guard = actor.add_always_true("guard").unwrap();
        actor.add_action("a", Pattern::new(), Pattern::new(), guard, body);

        insert_casts(&mut actor).unwrap();
        let once = actor.clone();
        prop_assert_eq!(insert_casts(&mut actor).unwrap(), 0);
        prop_assert_eq!(actor, once);
    }
}
