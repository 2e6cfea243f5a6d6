//! Pretty-printing for IR
//!
//! Provides human-readable output for debugging IR structures.

use super::block::BasicBlock;
use super::method::{Method, Unit};
use std::fmt::Write;

/// Trait for pretty-printing IR constructs
pub trait PrettyPrint {
    fn pretty_print(&self) -> String;
}

impl PrettyPrint for Unit {
    fn pretty_print(&self) -> String {
        let mut output = String::new();
        for class in &self.classes {
            let _ = write!(output, "; class {}", class.name);
            if let Some(parent) = &class.parent {
                let _ = write!(output, " extends {}", parent);
            }
            let _ = writeln!(output);
            for field in &class.fields {
                let _ = writeln!(output, ";   field {}: {}", field.name, field.ty);
            }
            for method in &class.methods {
                output.push_str(&method.pretty_print());
            }
            let _ = writeln!(output);
        }
        output
    }
}

impl PrettyPrint for Method {
    fn pretty_print(&self) -> String {
        let mut output = String::new();
        let mut flags = Vec::new();
        if self.modifiers.is_static {
            flags.push("static");
        }
        if self.modifiers.synchronized {
            flags.push("synchronized");
        }
        if self.modifiers.native {
            flags.push("native");
        }
        if self.annotations.is_async {
            flags.push("@async");
        }
        if self.annotations.sync {
            flags.push("@sync");
        }
        let _ = writeln!(
            output,
            "method {} [{}] vars={} {{",
            self.reference,
            flags.join(" "),
            self.variable_count
        );
        for block in &self.blocks {
            output.push_str(&block.pretty_print_indented(2));
        }
        let _ = writeln!(output, "}}");
        output
    }
}

impl BasicBlock {
    fn pretty_print_indented(&self, indent: usize) -> String {
        let mut output = String::new();
        let prefix = " ".repeat(indent);

        let _ = write!(output, "{}{}:", prefix, self.id);
        for handler in &self.handlers {
            let _ = write!(
                output,
                " catch({}) -> {}",
                handler.exception_type.as_deref().unwrap_or("*"),
                handler.handler
            );
        }
        let _ = writeln!(output);

        for instr in &self.instructions {
            let _ = writeln!(output, "{}  {}", prefix, instr.kind);
        }
        let _ = writeln!(output, "{}  {}", prefix, self.terminator);
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BasicBlockId, InstructionKind, MethodRef, Terminator, Var};
    use crate::ir::Constant;

    #[test]
    fn test_pretty_print_method() {
        let mut method = Method::new(MethodRef::new("A", "f", "()I"), 2);
        let mut block = BasicBlock::new(BasicBlockId(0));
        block.add_instr(InstructionKind::Constant {
            receiver: Var(1),
            value: Constant::Int(7),
        });
        block.set_terminator(Terminator::ret(Some(Var(1))));
        method.blocks.push(block);

        let text = method.pretty_print();
        assert!(text.starts_with("method A.f()I"));
        assert!(text.contains("bb0:"));
        assert!(text.contains("v1 = 7"));
        assert!(text.contains("return v1"));
    }
}
