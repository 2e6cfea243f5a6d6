//! IR builders shared by the integration tests

#![allow(dead_code)]

use strand_backend::ir::{
    BasicBlock, BasicBlockId, BinaryOperation, Constant, InstructionKind, InvocationKind, Invoke,
    NumericType, Terminator, Var,
};
use strand_backend::{Backend, BackendConfig, ClassDef, CompiledUnit, Method, MethodRef, Unit};

/// The natively blocking method every test configures as an intrinsic
pub fn blocking() -> MethodRef {
    MethodRef::new("rt.Sched", "block", "()I")
}

pub fn config() -> BackendConfig {
    BackendConfig {
        intrinsics: vec![blocking()],
        ..BackendConfig::default()
    }
}

pub fn compile(unit: Unit) -> CompiledUnit {
    Backend::new(config()).compile(unit).unwrap()
}

pub fn render(unit: Unit) -> String {
    Backend::new(config()).compile_unit(unit).unwrap().code
}

pub struct MethodBuilder {
    method: Method,
}

impl MethodBuilder {
    pub fn new_static(class: &str, name: &str, descriptor: &str, variables: u32) -> Self {
        let mut method = Method::new(MethodRef::new(class, name, descriptor), variables);
        method.modifiers.is_static = true;
        Self { method }
    }

    pub fn new_instance(class: &str, name: &str, descriptor: &str, variables: u32) -> Self {
        Self {
            method: Method::new(MethodRef::new(class, name, descriptor), variables),
        }
    }

    pub fn class_init(class: &str, variables: u32) -> Self {
        let mut method = Method::new(MethodRef::class_initializer(class), variables);
        method.modifiers.is_static = true;
        Self { method }
    }

    pub fn synchronized(mut self) -> Self {
        self.method.modifiers.synchronized = true;
        self
    }

    pub fn sync_claim(mut self) -> Self {
        self.method.annotations.sync = true;
        self
    }

    /// Append a block; ids must be added in ascending order from 0
    pub fn block(mut self, instructions: Vec<InstructionKind>, terminator: Terminator) -> Self {
        let mut block = BasicBlock::new(BasicBlockId(self.method.blocks.len() as u32));
        for instruction in instructions {
            block.add_instr(instruction);
        }
        block.set_terminator(terminator);
        self.method.blocks.push(block);
        self
    }

    pub fn build(self) -> Method {
        self.method
    }
}

pub fn class(name: &str, methods: Vec<Method>) -> ClassDef {
    let mut def = ClassDef::new(name);
    def.methods = methods;
    def
}

pub fn unit(classes: Vec<ClassDef>) -> Unit {
    Unit { classes }
}

pub fn int(receiver: u32, value: i32) -> InstructionKind {
    InstructionKind::Constant {
        receiver: Var(receiver),
        value: Constant::Int(value),
    }
}

pub fn string(receiver: u32, value: &str) -> InstructionKind {
    InstructionKind::Constant {
        receiver: Var(receiver),
        value: Constant::String(value.to_string()),
    }
}

pub fn add(receiver: u32, first: u32, second: u32) -> InstructionKind {
    InstructionKind::Binary {
        receiver: Var(receiver),
        operation: BinaryOperation::Add,
        operand_type: NumericType::Int,
        first: Var(first),
        second: Var(second),
    }
}

pub fn compare(receiver: u32, first: u32, second: u32) -> InstructionKind {
    InstructionKind::Binary {
        receiver: Var(receiver),
        operation: BinaryOperation::Compare,
        operand_type: NumericType::Int,
        first: Var(first),
        second: Var(second),
    }
}

pub fn call_static(receiver: Option<u32>, method: MethodRef, arguments: &[u32]) -> InstructionKind {
    InstructionKind::Invoke(Invoke {
        receiver: receiver.map(Var),
        method,
        instance: None,
        arguments: arguments.iter().copied().map(Var).collect(),
        kind: InvocationKind::Static,
        may_suspend: true,
    })
}

pub fn block_into(receiver: u32) -> InstructionKind {
    call_static(Some(receiver), blocking(), &[])
}

pub fn jump(target: u32) -> Terminator {
    Terminator::jump(BasicBlockId(target))
}

pub fn ret(value: u32) -> Terminator {
    Terminator::ret(Some(Var(value)))
}

/// `static T.m()I`: `x = block(); y = 1; z = x + y; return z`
pub fn worked_example() -> Method {
    MethodBuilder::new_static("T", "m", "()I", 4)
        .block(vec![block_into(1), int(2, 1), add(3, 1, 2)], ret(3))
        .build()
}
