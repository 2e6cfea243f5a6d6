//! Expression printing

use super::precedence::Precedence;
use super::Renderer;
use crate::ast::{BinaryOp, Expr, ExprKind, Invocation, UnaryOp};
use crate::ir::{Constant, InvocationKind, ValueType};

impl Renderer<'_> {
    pub(super) fn expr(&mut self, expr: &Expr, outer: Precedence) {
        let located = expr.location.is_some();
        if located {
            self.push_location(expr.location.clone());
        }
        self.expr_kind(&expr.kind, outer);
        if located {
            self.pop_location();
        }
    }

    fn expr_kind(&mut self, kind: &ExprKind, outer: Precedence) {
        match kind {
            ExprKind::Constant(value) => self.constant(value, outer),
            ExprKind::Variable(var) => {
                let name = self.vars.get(*var);
                self.writer.append(&name);
            }
            ExprKind::Binary { op, left, right } => {
                let level = Precedence::of(*op);
                let wrap = outer > level;
                if wrap {
                    self.writer.append("(");
                }
                self.expr(left, level);
                self.writer.ws().append(op.symbol()).ws();
                let negated = matches!(
                    right.kind,
                    ExprKind::Unary {
                        op: UnaryOp::Negate,
                        ..
                    }
                );
                if negated && matches!(op, BinaryOp::Add | BinaryOp::Subtract) && self.writer.is_minified() {
                    self.writer.append(" ");
                }
                self.expr(right, level.next());
                if wrap {
                    self.writer.append(")");
                }
            }
            ExprKind::Unary { op, operand } => self.unary(*op, operand, outer),
            ExprKind::Conditional {
                condition,
                consequent,
                alternative,
            } => {
                let wrap = outer > Precedence::Conditional;
                if wrap {
                    self.writer.append("(");
                }
                self.expr(condition, Precedence::LogicalOr);
                self.writer.ws().append("?").ws();
                self.expr(consequent, Precedence::Assignment);
                self.writer.ws().append(":").ws();
                self.expr(alternative, Precedence::Assignment);
                if wrap {
                    self.writer.append(")");
                }
            }
            ExprKind::Subscript { array, index } => {
                self.expr(array, Precedence::Member);
                self.writer.append(".data[");
                self.expr(index, Precedence::min());
                self.writer.append("]");
            }
            ExprKind::Invocation(invocation) => self.invocation(invocation),
            ExprKind::Qualification { target, field } => match target {
                Some(target) => {
                    let member = self.names.field(field);
                    self.expr(target, Precedence::Member);
                    self.writer.append(".").append(&member);
                }
                None => {
                    let global = self.names.static_field(field);
                    self.writer.append(&global);
                }
            },
            ExprKind::New { class } => {
                let name = self.names.class(class);
                self.writer.append("new ").append(&name).append("()");
            }
            ExprKind::NewArray { element_type, size } => {
                match primitive_array_factory(element_type) {
                    Some(factory) => {
                        self.writer.append(factory).append("(");
                    }
                    None => {
                        self.writer.append("$rt_createArray(");
                        self.class_ref(element_type);
                        self.writer.append(",").ws();
                    }
                }
                self.expr(size, Precedence::Assignment);
                self.writer.append(")");
            }
            ExprKind::InstanceOf { value, class } => {
                self.writer.append("$rt_isInstance(");
                self.expr(value, Precedence::Assignment);
                self.writer.append(",").ws();
                self.class_ref(class);
                self.writer.append(")");
            }
            ExprKind::Helper { helper, arguments } => {
                self.writer.append(helper.name());
                self.arguments(arguments.iter());
            }
        }
    }

    fn unary(&mut self, op: UnaryOp, operand: &Expr, outer: Precedence) {
        match op {
            UnaryOp::Length => {
                self.expr(operand, Precedence::Member);
                self.writer.append(".data.length");
            }
            UnaryOp::NullCheck => {
                self.writer.append("$rt_nullCheck(");
                self.expr(operand, Precedence::Assignment);
                self.writer.append(")");
            }
            UnaryOp::Negate | UnaryOp::Not | UnaryOp::BitNot => {
                let wrap = outer > Precedence::Unary;
                if wrap {
                    self.writer.append("(");
                }
                let symbol = match op {
                    UnaryOp::Negate => "-",
                    UnaryOp::Not => "!",
                    _ => "~",
                };
                self.writer.append(symbol);
                let inner = if op == UnaryOp::Negate {
                    Precedence::Call
                } else {
                    Precedence::Unary
                };
                self.expr(operand, inner);
                if wrap {
                    self.writer.append(")");
                }
            }
        }
    }

    fn invocation(&mut self, invocation: &Invocation) {
        match invocation.kind {
            InvocationKind::Static => {
                let function = self.names.function(&invocation.method);
                self.writer.append(&function);
                self.arguments(invocation.arguments.iter());
            }
            InvocationKind::Special => {
                let function = self.names.function(&invocation.method);
                self.writer.append(&function);
                self.arguments(invocation.instance.iter().map(|e| e.as_ref()).chain(&invocation.arguments));
            }
            InvocationKind::Virtual => {
                let member = self.names.member(&invocation.method);
                if let Some(instance) = &invocation.instance {
                    self.expr(instance, Precedence::Member);
                    self.writer.append(".");
                }
                self.writer.append(&member);
                self.arguments(invocation.arguments.iter());
            }
        }
    }

    fn arguments<'e>(&mut self, arguments: impl Iterator<Item = &'e Expr>) {
        self.writer.append("(");
        for (i, argument) in arguments.enumerate() {
            if i > 0 {
                self.writer.append(",").ws();
            }
            self.expr(argument, Precedence::Assignment);
        }
        self.writer.append(")");
    }

    fn constant(&mut self, value: &Constant, outer: Precedence) {
        let text = match value {
            Constant::Null => "null".to_string(),
            Constant::Int(v) => signed(v.to_string(), *v < 0, outer),
            Constant::Long(0) => "Long_ZERO".to_string(),
            Constant::Long(v) => match i32::try_from(*v) {
                Ok(small) => format!("Long_fromInt({})", small),
                Err(_) => {
                    let low = *v as i32;
                    let high = (*v >> 32) as i32;
                    format!("Long_create({},{}{})", low, if self.writer.is_minified() { "" } else { " " }, high)
                }
            },
            Constant::Float(v) => number(f64::from(*v), outer),
            Constant::Double(v) => number(*v, outer),
            Constant::String(s) => {
                if self.config.pool_strings {
                    let index = self.strings.intern(s);
                    format!("{}({})", self.config.runtime.string, index)
                } else {
                    super::strings::quote(s)
                }
            }
            Constant::Class(ty) => {
                let function = self.config.runtime.class.clone();
                self.writer.append(&function).append("(");
                self.class_ref(ty);
                self.writer.append(")");
                return;
            }
        };
        self.writer.append(&text);
    }

    /// Runtime class object of `ty`
    pub(super) fn class_ref(&mut self, ty: &ValueType) {
        match ty {
            ValueType::Object(class) => {
                let name = self.names.class(class);
                self.writer.append(&name);
            }
            ValueType::Array(element) => {
                self.writer.append("$rt_arraycls(");
                self.class_ref(element);
                self.writer.append(")");
            }
            primitive => {
                let name = match primitive {
                    ValueType::Void => "$rt_voidcls()",
                    ValueType::Boolean => "$rt_booleancls()",
                    ValueType::Byte => "$rt_bytecls()",
                    ValueType::Short => "$rt_shortcls()",
                    ValueType::Char => "$rt_charcls()",
                    ValueType::Int => "$rt_intcls()",
                    ValueType::Long => "$rt_longcls()",
                    ValueType::Float => "$rt_floatcls()",
                    _ => "$rt_doublecls()",
                };
                self.writer.append(name);
            }
        }
    }
}

fn signed(text: String, negative: bool, outer: Precedence) -> String {
    if negative && outer > Precedence::Assignment {
        format!("({})", text)
    } else {
        text
    }
}

fn number(value: f64, outer: Precedence) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        let text = if value > 0.0 { "Infinity" } else { "-Infinity" };
        return signed(text.to_string(), value < 0.0, outer);
    }
    if value == 0.0 && value.is_sign_negative() {
        return signed("-0.0".to_string(), true, outer);
    }
    signed(value.to_string(), value < 0.0, outer)
}

fn primitive_array_factory(element: &ValueType) -> Option<&'static str> {
    Some(match element {
        ValueType::Boolean => "$rt_createBooleanArray",
        ValueType::Byte => "$rt_createByteArray",
        ValueType::Short => "$rt_createShortArray",
        ValueType::Char => "$rt_createCharArray",
        ValueType::Int => "$rt_createIntArray",
        ValueType::Long => "$rt_createLongArray",
        ValueType::Float => "$rt_createFloatArray",
        ValueType::Double => "$rt_createDoubleArray",
        ValueType::Void | ValueType::Object(_) | ValueType::Array(_) => return None,
    })
}
