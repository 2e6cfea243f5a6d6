//! String literal pool and escaping

use rustc_hash::FxHashMap;

/// Each distinct literal once, in order of first use
#[derive(Debug, Default, Clone)]
pub struct StringPool {
    index: FxHashMap<String, usize>,
    entries: Vec<String>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, value: &str) -> usize {
        if let Some(&i) = self.index.get(value) {
            return i;
        }
        let i = self.entries.len();
        self.index.insert(value.to_string(), i);
        self.entries.push(value.to_string());
        i
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<String> {
        self.entries
    }
}

/// Double-quoted literal; everything outside printable ASCII is escaped
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for unit in value.encode_utf16() {
        match unit {
            0x22 => out.push_str("\\\""),
            0x5C => out.push_str("\\\\"),
            0x0A => out.push_str("\\n"),
            0x0D => out.push_str("\\r"),
            0x09 => out.push_str("\\t"),
            0x20..=0x7E => out.push(unit as u8 as char),
            _ => out.push_str(&format!("\\u{:04X}", unit)),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_deduplicates() {
        let mut pool = StringPool::new();
        assert_eq!(pool.intern("a"), 0);
        assert_eq!(pool.intern("b"), 1);
        assert_eq!(pool.intern("a"), 0);
        assert_eq!(pool.entries(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("a\"b\\c\n"), r#""a\"b\\c\n""#);
        assert_eq!(quote("é"), r#""\u00E9""#);
        assert_eq!(quote("😀"), r#""\uD83D\uDE00""#);
    }
}
