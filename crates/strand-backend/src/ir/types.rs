//! Value-level IR types: variables, type descriptors, member references

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Variable slot inside one method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Var(pub u32);

impl Var {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Source position attached to instructions and expressions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextLocation {
    pub file: String,
    pub line: u32,
}

impl TextLocation {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for TextLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Error produced when a descriptor or member reference cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed {kind} `{text}`")]
pub struct ParseRefError {
    pub kind: &'static str,
    pub text: String,
}

impl ParseRefError {
    fn new(kind: &'static str, text: &str) -> Self {
        Self {
            kind,
            text: text.to_string(),
        }
    }
}

// ============================================================================
// Value types
// ============================================================================

/// Type of a value, written in descriptor form (`I`, `J`, `Ljava/lang/String;`, `[I`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ValueType {
    Void,
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
    Object(String),
    Array(Box<ValueType>),
}

impl ValueType {
    pub fn object(class: impl Into<String>) -> Self {
        ValueType::Object(class.into())
    }

    pub fn array_of(element: ValueType) -> Self {
        ValueType::Array(Box::new(element))
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self, ValueType::Object(_) | ValueType::Array(_))
    }

    /// Parse one type from the front of `text`, returning the rest
    fn parse_prefix(text: &str) -> Option<(ValueType, &str)> {
        let mut chars = text.chars();
        let ty = match chars.next()? {
            'V' => ValueType::Void,
            'Z' => ValueType::Boolean,
            'B' => ValueType::Byte,
            'S' => ValueType::Short,
            'C' => ValueType::Char,
            'I' => ValueType::Int,
            'J' => ValueType::Long,
            'F' => ValueType::Float,
            'D' => ValueType::Double,
            'L' => {
                let end = text.find(';')?;
                let name = text[1..end].replace('/', ".");
                if name.is_empty() {
                    return None;
                }
                return Some((ValueType::Object(name), &text[end + 1..]));
            }
            '[' => {
                let (element, rest) = Self::parse_prefix(&text[1..])?;
                return Some((ValueType::Array(Box::new(element)), rest));
            }
            _ => return None,
        };
        Some((ty, chars.as_str()))
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Void => write!(f, "V"),
            ValueType::Boolean => write!(f, "Z"),
            ValueType::Byte => write!(f, "B"),
            ValueType::Short => write!(f, "S"),
            ValueType::Char => write!(f, "C"),
            ValueType::Int => write!(f, "I"),
            ValueType::Long => write!(f, "J"),
            ValueType::Float => write!(f, "F"),
            ValueType::Double => write!(f, "D"),
            ValueType::Object(name) => write!(f, "L{};", name.replace('.', "/")),
            ValueType::Array(element) => write!(f, "[{}", element),
        }
    }
}

impl FromStr for ValueType {
    type Err = ParseRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Self::parse_prefix(s) {
            Some((ty, "")) => Ok(ty),
            _ => Err(ParseRefError::new("type descriptor", s)),
        }
    }
}

impl TryFrom<String> for ValueType {
    type Error = ParseRefError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ValueType> for String {
    fn from(value: ValueType) -> Self {
        value.to_string()
    }
}

// ============================================================================
// Member references
// ============================================================================

/// Method identity: owning class, name and descriptor.
///
/// Textual form is `class.name(descriptor)`, e.g. `java.lang.Thread.sleep(J)V`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MethodRef {
    pub class: String,
    pub name: String,
    pub descriptor: String,
}

impl MethodRef {
    pub fn new(
        class: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    /// Static initializer of `class`
    pub fn class_initializer(class: impl Into<String>) -> Self {
        Self::new(class, "<clinit>", "()V")
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    pub fn is_class_initializer(&self) -> bool {
        self.name == "<clinit>"
    }

    /// Same name and descriptor, i.e. one may override the other
    pub fn same_signature(&self, other: &MethodRef) -> bool {
        self.name == other.name && self.descriptor == other.descriptor
    }

    /// Parameter types parsed from the descriptor
    pub fn parameter_types(&self) -> Result<Vec<ValueType>, ParseRefError> {
        let err = || ParseRefError::new("method descriptor", &self.descriptor);
        let mut rest = self.descriptor.strip_prefix('(').ok_or_else(err)?;
        let mut params = Vec::new();
        while !rest.starts_with(')') {
            let (ty, tail) = ValueType::parse_prefix(rest).ok_or_else(err)?;
            params.push(ty);
            rest = tail;
        }
        Ok(params)
    }

    pub fn returns_value(&self) -> bool {
        !self.descriptor.ends_with(")V")
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.class, self.name, self.descriptor)
    }
}

impl FromStr for MethodRef {
    type Err = ParseRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseRefError::new("method reference", s);
        let paren = s.find('(').ok_or_else(err)?;
        let (qualified, descriptor) = s.split_at(paren);
        let dot = qualified.rfind('.').ok_or_else(err)?;
        let (class, name) = (&qualified[..dot], &qualified[dot + 1..]);
        if class.is_empty() || name.is_empty() {
            return Err(err());
        }
        let method = MethodRef::new(class, name, descriptor);
        method.parameter_types().map_err(|_| err())?;
        Ok(method)
    }
}

impl TryFrom<String> for MethodRef {
    type Error = ParseRefError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MethodRef> for String {
    fn from(value: MethodRef) -> Self {
        value.to_string()
    }
}

/// Field identity, textual form `class.name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldRef {
    pub class: String,
    pub name: String,
}

impl FieldRef {
    pub fn new(class: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class, self.name)
    }
}

impl FromStr for FieldRef {
    type Err = ParseRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rfind('.') {
            Some(dot) if dot > 0 && dot + 1 < s.len() => Ok(FieldRef::new(&s[..dot], &s[dot + 1..])),
            _ => Err(ParseRefError::new("field reference", s)),
        }
    }
}

impl TryFrom<String> for FieldRef {
    type Error = ParseRefError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FieldRef> for String {
    fn from(value: FieldRef) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_ref_parse() {
        let m: MethodRef = "java.lang.Thread.sleep(J)V".parse().unwrap();
        assert_eq!(m.class, "java.lang.Thread");
        assert_eq!(m.name, "sleep");
        assert_eq!(m.descriptor, "(J)V");
        assert_eq!(m.parameter_types().unwrap(), vec![ValueType::Long]);
        assert!(!m.returns_value());
        assert_eq!(m.to_string(), "java.lang.Thread.sleep(J)V");
    }

    #[test]
    fn test_method_ref_rejects_garbage() {
        assert!("sleep(J)V".parse::<MethodRef>().is_err());
        assert!("a.b".parse::<MethodRef>().is_err());
        assert!("a.b(Q)V".parse::<MethodRef>().is_err());
    }

    #[test]
    fn test_descriptor_parameters() {
        let m = MethodRef::new("Foo", "bar", "(I[Ljava/lang/String;D)I");
        assert_eq!(
            m.parameter_types().unwrap(),
            vec![
                ValueType::Int,
                ValueType::array_of(ValueType::object("java.lang.String")),
                ValueType::Double,
            ]
        );
        assert!(m.returns_value());
    }

    #[test]
    fn test_value_type_display_parse() {
        let ty: ValueType = "[[Ljava/lang/Object;".parse().unwrap();
        assert_eq!(ty.to_string(), "[[Ljava/lang/Object;");
        assert!("X".parse::<ValueType>().is_err());
        assert!("II".parse::<ValueType>().is_err());
    }

    #[test]
    fn test_field_ref_parse() {
        let f: FieldRef = "com.example.Counter.value".parse().unwrap();
        assert_eq!(f.class, "com.example.Counter");
        assert_eq!(f.name, "value");
        assert!("value".parse::<FieldRef>().is_err());
    }
}
