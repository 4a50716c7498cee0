//! The per-group holder document.
//!
//! One JSON document per lock group: `{"max": N, "holders": [...]}`. The
//! document is always written back whole; there are no field-level updates.

use serde::{Deserialize, Serialize};

/// Semaphore state for one lock group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDoc {
    /// Capacity of the group ("max" on the wire).
    #[serde(rename = "max")]
    pub capacity: i64,

    /// Current holders, in acquisition order.
    pub holders: Vec<String>,
}

impl GroupDoc {
    /// A fresh group: capacity 1, no holders.
    pub fn new() -> Self {
        Self {
            capacity: 1,
            holders: Vec::new(),
        }
    }

    pub fn holder_count(&self) -> i64 {
        self.holders.len() as i64
    }

    pub fn is_full(&self) -> bool {
        self.holder_count() >= self.capacity
    }

    pub fn contains(&self, id: &str) -> bool {
        self.holders.iter().any(|h| h == id)
    }

    /// Append a holder. Returns false without modifying the document if the
    /// id already holds the group, so a retried grant cannot burn capacity.
    pub fn add_holder(&mut self, id: &str) -> bool {
        if self.contains(id) {
            return false;
        }
        self.holders.push(id.to_string());
        true
    }

    /// Remove the first occurrence of `id`. Returns false if absent.
    pub fn remove_holder(&mut self, id: &str) -> bool {
        match self.holders.iter().position(|h| h == id) {
            Some(idx) => {
                self.holders.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("GroupDoc serializes")
    }
}

impl Default for GroupDoc {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wire_document() {
        let doc = GroupDoc::from_json("{\n    \"max\": 2,\n    \"holders\": [\"A\"]\n}").unwrap();
        assert_eq!(doc.capacity, 2);
        assert_eq!(doc.holder_count(), 1);
        assert!(!doc.is_full());
    }

    #[test]
    fn test_add_and_remove_holders() {
        let mut doc = GroupDoc::from_json("{\"max\": 2, \"holders\": [\"A\"]}").unwrap();

        assert!(doc.add_holder("B"));
        assert!(doc.is_full());

        assert!(doc.remove_holder("A"));
        assert!(!doc.contains("A"));
        assert!(doc.contains("B"));

        // Removing an absent id is a no-op.
        assert!(!doc.remove_holder("A"));
        assert_eq!(doc.holders, vec!["B"]);
    }

    #[test]
    fn test_add_holder_enforces_uniqueness() {
        let mut doc = GroupDoc::new();
        assert!(doc.add_holder("A"));
        assert!(!doc.add_holder("A"));
        assert_eq!(doc.holder_count(), 1);
    }

    #[test]
    fn test_json_round_trip_preserves_order() {
        let mut doc = GroupDoc::new();
        doc.capacity = 3;
        doc.add_holder("C");
        doc.add_holder("A");
        doc.add_holder("B");

        let back = GroupDoc::from_json(&doc.to_json()).unwrap();
        assert_eq!(back.holders, vec!["C", "A", "B"]);
        assert_eq!(back.capacity, 3);
    }

    #[test]
    fn test_rejects_malformed_document() {
        assert!(GroupDoc::from_json("{\"holders\": []}").is_err());
        assert!(GroupDoc::from_json("not json").is_err());
    }
}
