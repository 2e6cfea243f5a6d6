//! Instruction lowering
//!
//! One instruction becomes at most one statement. Int arithmetic is wrapped
//! back to 32 bits with `| 0`, int multiplication goes through `$rt_imul`,
//! and long arithmetic becomes `Long_*` helper calls.

use crate::analysis::SuspendSet;
use crate::ast::{BinaryOp, Expr, ExprKind, Helper, Invocation, Statement, UnaryOp};
use crate::ir::{
    BinaryBranchCondition, BinaryOperation, BranchCondition, CastDirection, Constant,
    Instruction, InstructionKind, IntegerSubtype, NumericType, Var,
};

/// Lowering failure; the caller attaches the method name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LowerError(pub String);

pub fn lower_instruction(
    instr: &Instruction,
    suspend_set: Option<&SuspendSet>,
) -> Result<Option<Statement>, LowerError> {
    let location = instr.location.clone();
    let assign = |receiver: Var, value: Expr| Statement::Assignment {
        left: Some(Expr::var(receiver)),
        right: value,
        suspends: false,
        location: instr.location.clone(),
    };

    let stmt = match &instr.kind {
        InstructionKind::Nop => return Ok(None),
        InstructionKind::Constant { receiver, value } => {
            assign(*receiver, Expr::constant(value.clone()))
        }
        InstructionKind::Assign { receiver, assignee } => assign(*receiver, Expr::var(*assignee)),
        InstructionKind::Binary {
            receiver,
            operation,
            operand_type,
            first,
            second,
        } => assign(
            *receiver,
            lower_binary(*operation, *operand_type, Expr::var(*first), Expr::var(*second))?,
        ),
        InstructionKind::Negate {
            receiver,
            operand_type,
            operand,
        } => {
            let value = Expr::var(*operand);
            let negated = match operand_type {
                NumericType::Int => wrap_int(Expr::unary(UnaryOp::Negate, value)),
                NumericType::Long => Expr::helper(Helper::LongNegate, vec![value]),
                NumericType::Float | NumericType::Double => Expr::unary(UnaryOp::Negate, value),
            };
            assign(*receiver, negated)
        }
        InstructionKind::CastNumber {
            receiver,
            from,
            to,
            value,
        } => assign(*receiver, lower_number_cast(*from, *to, Expr::var(*value))),
        InstructionKind::CastInteger {
            receiver,
            target,
            direction,
            value,
        } => {
            let value = Expr::var(*value);
            let cast = match direction {
                CastDirection::ToInteger => value,
                CastDirection::FromInteger => narrow(*target, value),
            };
            assign(*receiver, cast)
        }
        InstructionKind::Cast {
            receiver, value, ..
        } => assign(*receiver, Expr::var(*value)),
        InstructionKind::GetField {
            receiver,
            instance,
            field,
        } => assign(
            *receiver,
            ExprKind::Qualification {
                target: instance.map(|v| Box::new(Expr::var(v))),
                field: field.clone(),
            }
            .into(),
        ),
        InstructionKind::PutField {
            instance,
            field,
            value,
        } => Statement::Assignment {
            left: Some(
                ExprKind::Qualification {
                    target: instance.map(|v| Box::new(Expr::var(v))),
                    field: field.clone(),
                }
                .into(),
            ),
            right: Expr::var(*value),
            suspends: false,
            location,
        },
        InstructionKind::GetElement {
            receiver,
            array,
            index,
        } => assign(*receiver, subscript(*array, *index)),
        InstructionKind::PutElement {
            array,
            index,
            value,
        } => Statement::Assignment {
            left: Some(subscript(*array, *index)),
            right: Expr::var(*value),
            suspends: false,
            location,
        },
        InstructionKind::ArrayLength { receiver, array } => {
            assign(*receiver, Expr::unary(UnaryOp::Length, Expr::var(*array)))
        }
        InstructionKind::ConstructArray {
            receiver,
            element_type,
            size,
        } => assign(
            *receiver,
            ExprKind::NewArray {
                element_type: element_type.clone(),
                size: Box::new(Expr::var(*size)),
            }
            .into(),
        ),
        InstructionKind::Construct { receiver, class } => assign(
            *receiver,
            ExprKind::New {
                class: class.clone(),
            }
            .into(),
        ),
        InstructionKind::Invoke(invoke) => {
            let suspends = suspend_set.map_or(false, |set| set.invocation_suspends(invoke));
            let call = Expr::invoke(Invocation {
                method: invoke.method.clone(),
                kind: invoke.kind,
                instance: invoke.instance.map(|v| Box::new(Expr::var(v))),
                arguments: invoke.arguments.iter().map(|&a| Expr::var(a)).collect(),
                may_suspend: invoke.may_suspend,
            })
            .at(location.clone());
            Statement::Assignment {
                left: invoke.receiver.map(Expr::var),
                right: call,
                suspends,
                location,
            }
        }
        InstructionKind::IsInstance {
            receiver,
            value,
            class,
        } => assign(
            *receiver,
            ExprKind::InstanceOf {
                value: Box::new(Expr::var(*value)),
                class: class.clone(),
            }
            .into(),
        ),
        InstructionKind::InitClass { class } => Statement::InitClass {
            class: class.clone(),
            suspends: suspend_set.map_or(false, |set| set.class_init_suspends(class)),
            location,
        },
        InstructionKind::NullCheck { receiver, value } => {
            assign(*receiver, Expr::unary(UnaryOp::NullCheck, Expr::var(*value)))
        }
        InstructionKind::MonitorEnter { object } => Statement::MonitorEnter {
            object: Expr::var(*object),
            location,
        },
        InstructionKind::MonitorExit { object } => Statement::MonitorExit {
            object: Expr::var(*object),
            location,
        },
    };
    Ok(Some(stmt))
}

fn subscript(array: Var, index: Var) -> Expr {
    ExprKind::Subscript {
        array: Box::new(Expr::var(array)),
        index: Box::new(Expr::var(index)),
    }
    .into()
}

/// `(e) | 0`
fn wrap_int(e: Expr) -> Expr {
    Expr::binary(BinaryOp::BitOr, e, Expr::int(0))
}

fn narrow(target: IntegerSubtype, value: Expr) -> Expr {
    match target {
        IntegerSubtype::Byte => Expr::binary(
            BinaryOp::ShiftRight,
            Expr::binary(BinaryOp::ShiftLeft, value, Expr::int(24)),
            Expr::int(24),
        ),
        IntegerSubtype::Short => Expr::binary(
            BinaryOp::ShiftRight,
            Expr::binary(BinaryOp::ShiftLeft, value, Expr::int(16)),
            Expr::int(16),
        ),
        IntegerSubtype::Char => Expr::binary(BinaryOp::BitAnd, value, Expr::int(65535)),
    }
}

fn lower_number_cast(from: NumericType, to: NumericType, value: Expr) -> Expr {
    use NumericType::*;
    match (from, to) {
        (Int, Long) => Expr::helper(Helper::LongFromInt, vec![value]),
        (Long, Int) => Expr::helper(Helper::LongToInt, vec![value]),
        (Long, Float) | (Long, Double) => Expr::helper(Helper::LongToNumber, vec![value]),
        (Float, Long) | (Double, Long) => Expr::helper(Helper::LongFromNumber, vec![value]),
        (Float, Int) | (Double, Int) => wrap_int(value),
        _ => value,
    }
}

pub fn lower_binary(
    operation: BinaryOperation,
    operand_type: NumericType,
    first: Expr,
    second: Expr,
) -> Result<Expr, LowerError> {
    use BinaryOperation as Op;
    let expr = match operand_type {
        NumericType::Int => match operation {
            Op::Add => wrap_int(Expr::binary(BinaryOp::Add, first, second)),
            Op::Subtract => wrap_int(Expr::binary(BinaryOp::Subtract, first, second)),
            Op::Divide => wrap_int(Expr::binary(BinaryOp::Divide, first, second)),
            Op::Modulo => wrap_int(Expr::binary(BinaryOp::Modulo, first, second)),
            Op::Multiply => Expr::helper(Helper::IntMultiply, vec![first, second]),
            Op::Compare => Expr::helper(Helper::Compare, vec![first, second]),
            Op::And => Expr::binary(BinaryOp::BitAnd, first, second),
            Op::Or => Expr::binary(BinaryOp::BitOr, first, second),
            Op::Xor => Expr::binary(BinaryOp::BitXor, first, second),
            Op::ShiftLeft => Expr::binary(BinaryOp::ShiftLeft, first, second),
            Op::ShiftRight => Expr::binary(BinaryOp::ShiftRight, first, second),
            Op::ShiftRightUnsigned => {
                wrap_int(Expr::binary(BinaryOp::ShiftRightUnsigned, first, second))
            }
        },
        NumericType::Long => {
            let helper = match operation {
                Op::Add => Helper::LongAdd,
                Op::Subtract => Helper::LongSubtract,
                Op::Multiply => Helper::LongMultiply,
                Op::Divide => Helper::LongDivide,
                Op::Modulo => Helper::LongRemainder,
                Op::Compare => Helper::LongCompare,
                Op::And => Helper::LongAnd,
                Op::Or => Helper::LongOr,
                Op::Xor => Helper::LongXor,
                Op::ShiftLeft => Helper::LongShiftLeft,
                Op::ShiftRight => Helper::LongShiftRight,
                Op::ShiftRightUnsigned => Helper::LongShiftRightUnsigned,
            };
            Expr::helper(helper, vec![first, second])
        }
        NumericType::Float | NumericType::Double => {
            let op = match operation {
                Op::Add => BinaryOp::Add,
                Op::Subtract => BinaryOp::Subtract,
                Op::Multiply => BinaryOp::Multiply,
                Op::Divide => BinaryOp::Divide,
                Op::Modulo => BinaryOp::Modulo,
                Op::Compare => return Ok(Expr::helper(Helper::Compare, vec![first, second])),
                other => {
                    return Err(LowerError(format!(
                        "{:?} is not defined for {:?} operands",
                        other, operand_type
                    )))
                }
            };
            Expr::binary(op, first, second)
        }
    };
    Ok(expr)
}

/// Condition of a single-operand branch
pub fn branch_condition(condition: BranchCondition, operand: Var) -> Expr {
    let value = Expr::var(operand);
    let (op, rhs) = match condition {
        BranchCondition::Equal => (BinaryOp::Equal, Expr::int(0)),
        BranchCondition::NotEqual => (BinaryOp::NotEqual, Expr::int(0)),
        BranchCondition::Less => (BinaryOp::Less, Expr::int(0)),
        BranchCondition::LessOrEqual => (BinaryOp::LessOrEqual, Expr::int(0)),
        BranchCondition::Greater => (BinaryOp::Greater, Expr::int(0)),
        BranchCondition::GreaterOrEqual => (BinaryOp::GreaterOrEqual, Expr::int(0)),
        BranchCondition::Null => (BinaryOp::StrictEqual, Expr::constant(Constant::Null)),
        BranchCondition::NotNull => (BinaryOp::StrictNotEqual, Expr::constant(Constant::Null)),
    };
    Expr::binary(op, value, rhs)
}

/// Condition of a two-operand branch
pub fn binary_branch_condition(condition: BinaryBranchCondition, first: Var, second: Var) -> Expr {
    let op = match condition {
        BinaryBranchCondition::Equal => BinaryOp::Equal,
        BinaryBranchCondition::NotEqual => BinaryOp::NotEqual,
        BinaryBranchCondition::ReferenceEqual => BinaryOp::StrictEqual,
        BinaryBranchCondition::ReferenceNotEqual => BinaryOp::StrictNotEqual,
    };
    Expr::binary(op, Expr::var(first), Expr::var(second))
}
