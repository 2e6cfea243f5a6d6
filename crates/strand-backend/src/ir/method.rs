//! Methods, classes and compilation units

use super::block::{BasicBlock, BasicBlockId};
use super::instr::InstructionKind;
use super::types::{MethodRef, ValueType, Var};
use crate::structure::BlockMap;
use serde::{Deserialize, Serialize};

/// Method modifiers relevant to lowering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Modifiers {
    #[serde(rename = "static")]
    pub is_static: bool,
    pub synchronized: bool,
    pub native: bool,
}

/// Upstream annotations that influence suspension analysis
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Annotations {
    /// Natively suspending: always part of the suspend set
    #[serde(rename = "async")]
    pub is_async: bool,
    /// Claimed synchronous: suspending here is a diagnostic
    pub sync: bool,
}

/// A method of the input IR; block 0 is the entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Method {
    pub reference: MethodRef,
    #[serde(default)]
    pub modifiers: Modifiers,
    #[serde(default)]
    pub annotations: Annotations,
    /// Total variable slots, including receiver slot 0 and parameters
    pub variable_count: u32,
    /// Debug names by slot
    #[serde(default)]
    pub variable_names: Vec<Option<String>>,
    #[serde(default)]
    pub blocks: Vec<BasicBlock>,
    /// Precomputed structural index; computed by the backend when absent
    #[serde(default, skip_serializing)]
    pub block_map: Option<BlockMap>,
}

impl Method {
    pub fn new(reference: MethodRef, variable_count: u32) -> Self {
        Self {
            reference,
            modifiers: Modifiers::default(),
            annotations: Annotations::default(),
            variable_count,
            variable_names: Vec::new(),
            blocks: Vec::new(),
            block_map: None,
        }
    }

    pub fn is_static(&self) -> bool {
        self.modifiers.is_static
    }

    /// Whether the method has a body to translate
    /// Instance methods dispatched through the prototype
    pub fn is_virtual(&self) -> bool {
        !self.is_static() && !self.reference.is_constructor() && !self.reference.is_class_initializer()
    }

    pub fn has_body(&self) -> bool {
        !self.modifiers.native && !self.blocks.is_empty()
    }

    pub fn entry(&self) -> BasicBlockId {
        BasicBlockId(0)
    }

    pub fn block(&self, id: BasicBlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.index())
    }

    /// Number of declared parameters (receiver excluded)
    pub fn parameter_count(&self) -> usize {
        self.reference
            .parameter_types()
            .map(|params| params.len())
            .unwrap_or(0)
    }

    /// First slot after receiver and parameters
    pub fn first_local(&self) -> u32 {
        self.parameter_count() as u32 + 1
    }

    pub fn variable_name(&self, var: Var) -> Option<&str> {
        self.variable_names
            .get(var.index())
            .and_then(|name| name.as_deref())
    }

    /// Does any block contain a monitor enter?
    pub fn has_monitor(&self) -> bool {
        self.blocks.iter().any(|block| {
            block
                .instructions
                .iter()
                .any(|instr| matches!(instr.kind, InstructionKind::MonitorEnter { .. }))
        })
    }

    /// Parameter slots that the body overwrites
    pub fn written_parameters(&self) -> Vec<Var> {
        let first_local = self.first_local();
        let mut written: Vec<Var> = self
            .blocks
            .iter()
            .flat_map(|block| block.instructions.iter())
            .filter_map(|instr| instr.kind.receiver())
            .chain(
                self.blocks
                    .iter()
                    .flat_map(|block| block.handlers.iter())
                    .filter_map(|handler| handler.exception_var),
            )
            .filter(|var| var.0 < first_local)
            .collect();
        written.sort();
        written.dedup();
        written
    }
}

/// Field declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ValueType,
    #[serde(default, rename = "static")]
    pub is_static: bool,
}

/// Class declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDef {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub methods: Vec<Method>,
}

impl ClassDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn has_class_initializer(&self) -> bool {
        self.methods
            .iter()
            .any(|m| m.reference.is_class_initializer())
    }
}

/// Compilation unit: everything rendered into one output text
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Unit {
    #[serde(default)]
    pub classes: Vec<ClassDef>,
}

impl Unit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn class(&self, name: &str) -> Option<&ClassDef> {
        self.classes.iter().find(|c| c.name == name)
    }

    pub fn methods(&self) -> impl Iterator<Item = &Method> {
        self.classes.iter().flat_map(|c| c.methods.iter())
    }

    pub fn method(&self, reference: &MethodRef) -> Option<&Method> {
        self.class(&reference.class)?
            .methods
            .iter()
            .find(|m| &m.reference == reference)
    }

    /// `class` or one of its ancestors/interfaces equals `target`
    pub fn is_subtype(&self, class: &str, target: &str) -> bool {
        let mut pending = vec![class.to_string()];
        let mut seen = Vec::new();
        while let Some(current) = pending.pop() {
            if current == target {
                return true;
            }
            if seen.contains(&current) {
                continue;
            }
            if let Some(def) = self.class(&current) {
                pending.extend(def.parent.iter().cloned());
                pending.extend(def.interfaces.iter().cloned());
            }
            seen.push(current);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_local_counts_receiver_slot() {
        let method = Method::new(MethodRef::new("A", "f", "(IJ)V"), 5);
        assert_eq!(method.parameter_count(), 2);
        assert_eq!(method.first_local(), 3);
    }

    #[test]
    fn test_subtype_walks_parents_and_interfaces() {
        let mut unit = Unit::new();
        let mut b = ClassDef::new("B");
        b.parent = Some("A".into());
        b.interfaces.push("I".into());
        unit.classes.push(ClassDef::new("A"));
        unit.classes.push(b);
        assert!(unit.is_subtype("B", "A"));
        assert!(unit.is_subtype("B", "I"));
        assert!(!unit.is_subtype("A", "B"));
    }

    #[test]
    fn test_unit_from_json() {
        let json = r#"{
            "classes": [{
                "name": "Main",
                "methods": [{
                    "reference": "Main.answer()I",
                    "modifiers": { "static": true },
                    "variable_count": 2,
                    "blocks": [{
                        "id": 0,
                        "instructions": [
                            { "op": "constant", "receiver": 1, "value": { "int": 42 } }
                        ],
                        "terminator": { "op": "return", "value": 1 }
                    }]
                }]
            }]
        }"#;
        let unit = Unit::from_json(json).unwrap();
        let method = unit.methods().next().unwrap();
        assert!(method.is_static());
        assert_eq!(method.blocks[0].instructions.len(), 1);
    }
}
