//! Expression trees
//!
//! Every expression is pure except [`ExprKind::Invocation`] and
//! [`ExprKind::New`], the only effect carriers.

use crate::ir::{Constant, FieldRef, InvocationKind, MethodRef, TextLocation, ValueType, Var};

/// Target-level binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
    ShiftRightUnsigned,
    /// Loose equality, used for int operands
    Equal,
    NotEqual,
    /// Strict equality, used for references and floating point
    StrictEqual,
    StrictNotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::ShiftLeft => "<<",
            BinaryOp::ShiftRight => ">>",
            BinaryOp::ShiftRightUnsigned => ">>>",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::StrictEqual => "===",
            BinaryOp::StrictNotEqual => "!==",
            BinaryOp::Less => "<",
            BinaryOp::LessOrEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterOrEqual => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Negate,
    Not,
    BitNot,
    /// Array length
    Length,
    NullCheck,
}

/// Runtime helpers for arithmetic the target cannot express natively
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Helper {
    IntMultiply,
    Compare,
    LongAdd,
    LongSubtract,
    LongMultiply,
    LongDivide,
    LongRemainder,
    LongAnd,
    LongOr,
    LongXor,
    LongShiftLeft,
    LongShiftRight,
    LongShiftRightUnsigned,
    LongCompare,
    LongNegate,
    LongFromInt,
    LongFromNumber,
    LongToNumber,
    LongToInt,
}

impl Helper {
    pub fn name(self) -> &'static str {
        match self {
            Helper::IntMultiply => "$rt_imul",
            Helper::Compare => "$rt_compare",
            Helper::LongAdd => "Long_add",
            Helper::LongSubtract => "Long_sub",
            Helper::LongMultiply => "Long_mul",
            Helper::LongDivide => "Long_div",
            Helper::LongRemainder => "Long_rem",
            Helper::LongAnd => "Long_and",
            Helper::LongOr => "Long_or",
            Helper::LongXor => "Long_xor",
            Helper::LongShiftLeft => "Long_shl",
            Helper::LongShiftRight => "Long_shr",
            Helper::LongShiftRightUnsigned => "Long_shru",
            Helper::LongCompare => "Long_compare",
            Helper::LongNegate => "Long_neg",
            Helper::LongFromInt => "Long_fromInt",
            Helper::LongFromNumber => "Long_fromNumber",
            Helper::LongToNumber => "Long_toNumber",
            Helper::LongToInt => "Long_lo",
        }
    }
}

/// Method call; the effect carrier suspension analysis looks at
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub method: MethodRef,
    pub kind: InvocationKind,
    pub instance: Option<Box<Expr>>,
    pub arguments: Vec<Expr>,
    pub may_suspend: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Constant(Constant),
    Variable(Var),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        consequent: Box<Expr>,
        alternative: Box<Expr>,
    },
    Subscript {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    Invocation(Invocation),
    /// Field access; `target` is `None` for static fields
    Qualification {
        target: Option<Box<Expr>>,
        field: FieldRef,
    },
    New {
        class: String,
    },
    NewArray {
        element_type: ValueType,
        size: Box<Expr>,
    },
    InstanceOf {
        value: Box<Expr>,
        class: ValueType,
    },
    Helper {
        helper: Helper,
        arguments: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub location: Option<TextLocation>,
}

impl From<ExprKind> for Expr {
    fn from(kind: ExprKind) -> Self {
        Expr {
            kind,
            location: None,
        }
    }
}

impl Expr {
    pub fn at(mut self, location: Option<TextLocation>) -> Self {
        self.location = location;
        self
    }

    pub fn constant(value: Constant) -> Self {
        ExprKind::Constant(value).into()
    }

    pub fn int(value: i32) -> Self {
        Self::constant(Constant::Int(value))
    }

    pub fn var(var: Var) -> Self {
        ExprKind::Variable(var).into()
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
        .into()
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        ExprKind::Unary {
            op,
            operand: Box::new(operand),
        }
        .into()
    }

    pub fn helper(helper: Helper, arguments: Vec<Expr>) -> Self {
        ExprKind::Helper { helper, arguments }.into()
    }

    pub fn invoke(invocation: Invocation) -> Self {
        ExprKind::Invocation(invocation).into()
    }

    /// Logical negation, folding comparisons where that is exact
    pub fn negate(self) -> Self {
        let location = self.location.clone();
        match self.kind {
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand,
            } => *operand,
            ExprKind::Binary { op, left, right } => match inverse_equality(op) {
                Some(inverted) => Expr::binary(inverted, *left, *right).at(location),
                None => {
                    Expr::unary(UnaryOp::Not, ExprKind::Binary { op, left, right }.into())
                        .at(location)
                }
            },
            kind => Expr::unary(UnaryOp::Not, Expr::from(kind)).at(location),
        }
    }

    /// Does this tree contain an effect carrier?
    pub fn has_effects(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| {
            if matches!(e.kind, ExprKind::Invocation(_) | ExprKind::New { .. }) {
                found = true;
            }
        });
        found
    }

    /// Constants and variable reads
    pub fn is_trivial(&self) -> bool {
        matches!(self.kind, ExprKind::Constant(_) | ExprKind::Variable(_))
    }

    /// Direct children in evaluation order
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Constant(_) | ExprKind::Variable(_) | ExprKind::New { .. } => vec![],
            ExprKind::Binary { left, right, .. } => vec![left, right],
            ExprKind::Unary { operand, .. } => vec![operand],
            ExprKind::Conditional {
                condition,
                consequent,
                alternative,
            } => vec![condition, consequent, alternative],
            ExprKind::Subscript { array, index } => vec![array, index],
            ExprKind::Invocation(inv) => inv
                .instance
                .iter()
                .map(|e| e.as_ref())
                .chain(inv.arguments.iter())
                .collect(),
            ExprKind::Qualification { target, .. } => {
                target.iter().map(|e| e.as_ref()).collect()
            }
            ExprKind::NewArray { size, .. } => vec![size],
            ExprKind::InstanceOf { value, .. } => vec![value],
            ExprKind::Helper { arguments, .. } => arguments.iter().collect(),
        }
    }

    /// Pre-order traversal
    pub fn walk(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }
}

fn inverse_equality(op: BinaryOp) -> Option<BinaryOp> {
    match op {
        BinaryOp::Equal => Some(BinaryOp::NotEqual),
        BinaryOp::NotEqual => Some(BinaryOp::Equal),
        BinaryOp::StrictEqual => Some(BinaryOp::StrictNotEqual),
        BinaryOp::StrictNotEqual => Some(BinaryOp::StrictEqual),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negate_flips_equality() {
        let e = Expr::binary(BinaryOp::Equal, Expr::var(Var(1)), Expr::int(0));
        match e.negate().kind {
            ExprKind::Binary { op, .. } => assert_eq!(op, BinaryOp::NotEqual),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_negate_wraps_ordering() {
        // `!(a < b)` is not `a >= b` for NaN operands
        let e = Expr::binary(BinaryOp::Less, Expr::var(Var(1)), Expr::var(Var(2)));
        assert!(matches!(
            e.negate().kind,
            ExprKind::Unary {
                op: UnaryOp::Not,
                ..
            }
        ));
    }

    #[test]
    fn test_has_effects_finds_nested_call() {
        let call = Expr::invoke(Invocation {
            method: MethodRef::new("A", "f", "()I"),
            kind: InvocationKind::Static,
            instance: None,
            arguments: vec![],
            may_suspend: true,
        });
        let sum = Expr::binary(BinaryOp::Add, Expr::int(1), call);
        assert!(sum.has_effects());
        assert!(!Expr::int(1).has_effects());
    }
}
