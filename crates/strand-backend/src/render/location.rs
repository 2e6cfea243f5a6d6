//! Source-location stack for the debug side channel
//!
//! Statements and expressions push their location while they are rendered.
//! Whenever the innermost known location changes an entry is recorded at the
//! current output position, so a nested expression re-associates the span
//! with its own location and popping it restores the enclosing one.

use crate::ir::TextLocation;
use serde::Serialize;

/// Generated position mapped to a source location; `None` marks code with
/// no known origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugEntry {
    pub line: u32,
    pub column: u32,
    pub location: Option<TextLocation>,
}

#[derive(Debug, Default)]
pub struct LocationStack {
    enabled: bool,
    stack: Vec<Option<TextLocation>>,
    emitted: Option<TextLocation>,
    entries: Vec<DebugEntry>,
}

impl LocationStack {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    fn current(&self) -> Option<TextLocation> {
        self.stack.iter().rev().find_map(|l| l.clone())
    }

    fn sync(&mut self, position: (u32, u32)) {
        if !self.enabled {
            return;
        }
        let current = self.current();
        if current != self.emitted {
            self.entries.push(DebugEntry {
                line: position.0,
                column: position.1,
                location: current.clone(),
            });
            self.emitted = current;
        }
    }

    pub fn push(&mut self, location: Option<TextLocation>, position: (u32, u32)) {
        self.stack.push(location);
        self.sync(position);
    }

    pub fn pop(&mut self, position: (u32, u32)) {
        self.stack.pop();
        self.sync(position);
    }

    pub fn into_entries(self) -> Vec<DebugEntry> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_location_restored_on_pop() {
        let outer = TextLocation::new("A.java", 3);
        let inner = TextLocation::new("A.java", 4);
        let mut stack = LocationStack::new(true);
        stack.push(Some(outer.clone()), (0, 0));
        stack.push(None, (0, 2));
        stack.push(Some(inner.clone()), (0, 4));
        stack.pop((0, 8));
        stack.pop((0, 9));
        stack.pop((1, 0));

        let entries = stack.into_entries();
        let locations: Vec<_> = entries.iter().map(|e| e.location.clone()).collect();
        assert_eq!(locations, vec![Some(outer.clone()), Some(inner), Some(outer), None]);
        assert_eq!((entries[2].line, entries[2].column), (0, 8));
    }

    #[test]
    fn test_disabled_records_nothing() {
        let mut stack = LocationStack::new(false);
        stack.push(Some(TextLocation::new("A.java", 1)), (0, 0));
        assert!(stack.into_entries().is_empty());
    }
}
