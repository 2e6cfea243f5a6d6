//! Structured control flow: compiled trees evaluate like their graphs

mod common;

use common::*;
use strand_backend::eval::{Evaluator, Value};
use strand_backend::ir::{BasicBlockId, BinaryBranchCondition, BranchCondition, Terminator, Var};
use strand_backend::{Backend, BackendError, MethodRef};

fn branch(condition: BranchCondition, operand: u32, consequent: u32, alternative: u32) -> Terminator {
    Terminator::Branch {
        condition,
        operand: Var(operand),
        consequent: BasicBlockId(consequent),
        alternative: BasicBlockId(alternative),
    }
}

fn eval_int(unit: strand_backend::Unit, method: &MethodRef, arg: i32) -> Value {
    let compiled = compile(unit);
    let mut evaluator = Evaluator::new(&compiled);
    let summary = evaluator.run(method, vec![Value::int(arg)]).unwrap();
    assert_eq!(summary.suspensions, 0);
    summary.value
}

/// For every `i` below `n`, counts `j` up to `min(i, 2)`; the inner loop
/// runs into the increment after it, unless `j` reaches 2, when it jumps
/// straight back to the outer loop's head.
fn nested_loops() -> strand_backend::Method {
    MethodBuilder::new_static("T", "pairs", "(I)I", 9)
        .block(vec![int(2, -1), int(5, 1), int(4, 0), int(8, 2)], jump(1))
        .block(
            vec![add(2, 2, 5), compare(6, 2, 1)],
            branch(BranchCondition::GreaterOrEqual, 6, 7, 2),
        )
        .block(vec![int(3, 0)], jump(3))
        .block(
            vec![compare(7, 3, 2)],
            branch(BranchCondition::GreaterOrEqual, 7, 6, 4),
        )
        .block(
            vec![],
            Terminator::BinaryBranch {
                condition: BinaryBranchCondition::Equal,
                first: Var(3),
                second: Var(8),
                consequent: BasicBlockId(1),
                alternative: BasicBlockId(5),
            },
        )
        .block(vec![add(4, 4, 5), add(3, 3, 5)], jump(3))
        .block(vec![add(4, 4, 5)], jump(1))
        .block(vec![], ret(4))
        .build()
}

#[test]
fn test_inner_loop_continues_outer_loop() {
    let method = nested_loops();
    let reference = method.reference.clone();
    let unit = unit(vec![class("T", vec![method])]);

    assert_eq!(eval_int(unit.clone(), &reference, 0), Value::int(0));
    assert_eq!(eval_int(unit.clone(), &reference, 1), Value::int(1));
    assert_eq!(eval_int(unit.clone(), &reference, 5), Value::int(10));

    let code = render(unit);
    assert!(code.contains("$lbl0: while (true) {"), "{}", code);
    assert!(code.contains("continue $lbl0;"), "{}", code);
    // the inner loop's own back edge stays unlabelled
    assert!(!code.contains("$lbl1"), "{}", code);
}

#[test]
fn test_switch_dispatches_on_value() {
    let method = MethodBuilder::new_static("T", "pick", "(I)I", 3)
        .block(
            vec![],
            Terminator::Switch {
                value: Var(1),
                cases: vec![(1, BasicBlockId(1)), (2, BasicBlockId(2))],
                default: BasicBlockId(3),
            },
        )
        .block(vec![int(2, 10)], jump(4))
        .block(vec![int(2, 20)], jump(4))
        .block(vec![int(2, 30)], jump(4))
        .block(vec![], ret(2))
        .build();
    let reference = method.reference.clone();
    let unit = unit(vec![class("T", vec![method])]);

    assert_eq!(eval_int(unit.clone(), &reference, 1), Value::int(10));
    assert_eq!(eval_int(unit.clone(), &reference, 2), Value::int(20));
    assert_eq!(eval_int(unit.clone(), &reference, 7), Value::int(30));
    assert!(render(unit).contains("switch (var$1) {"));
}

#[test]
fn test_chained_conditionals() {
    let method = MethodBuilder::new_static("T", "sign", "(I)I", 3)
        .block(vec![], branch(BranchCondition::Less, 1, 1, 2))
        .block(vec![int(2, -1)], jump(4))
        .block(vec![], branch(BranchCondition::Equal, 1, 3, 5))
        .block(vec![int(2, 0)], jump(4))
        .block(vec![], ret(2))
        .block(vec![int(2, 1)], jump(4))
        .build();
    let reference = method.reference.clone();
    let unit = unit(vec![class("T", vec![method])]);

    assert_eq!(eval_int(unit.clone(), &reference, -5), Value::int(-1));
    assert_eq!(eval_int(unit.clone(), &reference, 0), Value::int(0));
    assert_eq!(eval_int(unit, &reference, 5), Value::int(1));
}

#[test]
fn test_irreducible_graph_is_rejected() {
    let method = MethodBuilder::new_static("T", "knot", "(I)V", 2)
        .block(vec![], branch(BranchCondition::Equal, 1, 1, 2))
        .block(vec![], jump(2))
        .block(vec![], jump(1))
        .build();
    let result = Backend::new(config()).compile(unit(vec![class("T", vec![method])]));
    assert!(
        matches!(result, Err(BackendError::IrreducibleGraph { .. })),
        "{:?}",
        result.err()
    );
}
