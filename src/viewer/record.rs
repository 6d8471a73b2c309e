//! Lenient decoding of the collector's `/live` records.
//!
//! The collector is not ours, so nothing here fails: unknown shapes decode
//! to empty fields, a non-array snapshot is an empty list, and the raw JSON
//! is kept for the free-text filter.

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub name: Option<String>,
    pub id: Option<String>,
    /// `priceDecimal`, falling back to `priceFractional`, as received.
    pub price: Option<Value>,
}

impl Selection {
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("Selection {}", self.id.as_deref().unwrap_or("")),
        }
    }

    /// Stable identity within a market: the id, else the display name.
    pub fn identity(&self) -> String {
        self.id.clone().unwrap_or_else(|| self.display_name())
    }

    fn from_value(v: &Value) -> Self {
        let empty = Map::new();
        let obj = v.as_object().unwrap_or(&empty);
        let pick = |keys: &[&str]| keys.iter().find_map(|k| obj.get(*k).filter(|v| !v.is_null()));

        Self {
            name: pick(&["selection", "selectionName"]).map(scalar_text),
            id: pick(&["selection_id", "selectionId"]).map(scalar_text),
            price: pick(&["odds_decimal", "priceDecimal"])
                .or_else(|| pick(&["odds_fractional", "priceFractional"]))
                .cloned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Market {
    pub name: String,
    pub selections: Vec<Selection>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveRecord {
    pub id: String,
    pub title: String,
    pub league: String,
    pub time: String,
    pub score: String,
    pub period: String,
    /// `None` when the record carries no odds object at all.
    pub odds: Option<Vec<Market>>,
    pub raw: Value,
}

impl LiveRecord {
    pub fn from_value(raw: Value) -> Self {
        let text = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| raw.get(*k).filter(|v| !v.is_null()))
                .map(scalar_text)
                .unwrap_or_default()
        };

        let odds = raw.get("odds").and_then(Value::as_object).map(|markets| {
            markets
                .iter()
                .map(|(name, sels)| Market {
                    name: name.clone(),
                    selections: sels
                        .as_array()
                        .map(|a| a.iter().map(Selection::from_value).collect())
                        .unwrap_or_default(),
                })
                .collect()
        });

        Self {
            id: text(&["id"]),
            title: text(&["title", "event"]),
            league: text(&["league"]),
            time: text(&["time"]),
            score: text(&["score"]),
            period: text(&["period"]),
            odds,
            raw,
        }
    }

    /// Case-insensitive substring match against the record's JSON.
    /// `needle` must already be lower-cased.
    pub fn matches(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        self.raw.to_string().to_lowercase().contains(needle)
    }
}

/// Decode a `/live` body. Anything but an array is an empty snapshot.
pub fn parse_snapshot(body: Value) -> Vec<LiveRecord> {
    match body {
        Value::Array(items) => items.into_iter().map(LiveRecord::from_value).collect(),
        _ => Vec::new(),
    }
}

/// Records whose JSON contains `filter` (trimmed, any case).
pub fn apply_filter(records: Vec<LiveRecord>, filter: &str) -> Vec<LiveRecord> {
    let needle = filter.trim().to_lowercase();
    if needle.is_empty() {
        return records;
    }
    records.into_iter().filter(|r| r.matches(&needle)).collect()
}

fn scalar_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
