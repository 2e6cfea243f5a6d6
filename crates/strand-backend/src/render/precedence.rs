//! Operator precedence of the target language, loosest first

use crate::ast::BinaryOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    Comma,
    Assignment,
    Conditional,
    LogicalOr,
    LogicalAnd,
    BitwiseOr,
    BitwiseXor,
    BitwiseAnd,
    Equality,
    Comparison,
    Shift,
    Addition,
    Multiplication,
    Unary,
    Call,
    Member,
    Grouping,
}

impl Precedence {
    pub fn min() -> Self {
        Precedence::Comma
    }

    /// One level tighter
    pub fn next(self) -> Self {
        use Precedence::*;
        match self {
            Comma => Assignment,
            Assignment => Conditional,
            Conditional => LogicalOr,
            LogicalOr => LogicalAnd,
            LogicalAnd => BitwiseOr,
            BitwiseOr => BitwiseXor,
            BitwiseXor => BitwiseAnd,
            BitwiseAnd => Equality,
            Equality => Comparison,
            Comparison => Shift,
            Shift => Addition,
            Addition => Multiplication,
            Multiplication => Unary,
            Unary => Call,
            Call => Member,
            Member | Grouping => Grouping,
        }
    }

    pub fn of(op: BinaryOp) -> Self {
        match op {
            BinaryOp::Add | BinaryOp::Subtract => Precedence::Addition,
            BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => Precedence::Multiplication,
            BinaryOp::BitAnd => Precedence::BitwiseAnd,
            BinaryOp::BitOr => Precedence::BitwiseOr,
            BinaryOp::BitXor => Precedence::BitwiseXor,
            BinaryOp::ShiftLeft | BinaryOp::ShiftRight | BinaryOp::ShiftRightUnsigned => {
                Precedence::Shift
            }
            BinaryOp::Equal
            | BinaryOp::NotEqual
            | BinaryOp::StrictEqual
            | BinaryOp::StrictNotEqual => Precedence::Equality,
            BinaryOp::Less
            | BinaryOp::LessOrEqual
            | BinaryOp::Greater
            | BinaryOp::GreaterOrEqual => Precedence::Comparison,
            BinaryOp::And => Precedence::LogicalAnd,
            BinaryOp::Or => Precedence::LogicalOr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        assert!(Precedence::of(BinaryOp::Multiply) > Precedence::of(BinaryOp::Add));
        assert!(Precedence::of(BinaryOp::Add) > Precedence::of(BinaryOp::ShiftLeft));
        assert!(Precedence::of(BinaryOp::BitOr) > Precedence::of(BinaryOp::And));
        assert_eq!(Precedence::Addition.next(), Precedence::Multiplication);
        assert_eq!(Precedence::Grouping.next(), Precedence::Grouping);
    }
}
