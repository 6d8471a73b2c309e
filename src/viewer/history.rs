use ahash::AHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    Up,
    Down,
    Unchanged,
}

impl Movement {
    pub fn class(self) -> &'static str {
        match self {
            Movement::Up => "up",
            Movement::Down => "down",
            Movement::Unchanged => "",
        }
    }
}

/// `"{record id}::{market}::{selection identity}"`
pub fn selection_key(record_id: &str, market: &str, selection: &str) -> String {
    format!("{record_id}::{market}::{selection}")
}

/// Last numeric price seen per composite key, for the whole session.
/// Entries are never evicted: a record that drops out and comes back is
/// compared against what it showed before it left.
#[derive(Debug, Default, Clone)]
pub struct OddsHistory {
    last: AHashMap<String, f64>,
}

impl OddsHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `value` against the stored one and remember it. Non-numeric
    /// observations (`None`) leave history alone and never move.
    pub fn observe(&mut self, key: &str, value: Option<f64>) -> Movement {
        let Some(n) = value else {
            return Movement::Unchanged;
        };
        match self.last.insert(key.to_string(), n) {
            Some(prev) if n > prev => Movement::Up,
            Some(prev) if n < prev => Movement::Down,
            _ => Movement::Unchanged,
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.last.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}
