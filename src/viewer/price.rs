use serde_json::Value;

/// Shown wherever a price is missing or not a number.
pub const PLACEHOLDER: &str = "—";

/// Numeric value of a price field. Accepts JSON numbers, decimal strings,
/// fractional strings (`"5/2"` -> 3.5) and evens (`"EVS"` -> 2.0).
pub fn parse_price(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => parse_price_str(s)?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn parse_price_str(raw: &str) -> Option<f64> {
    let s = raw.trim().to_uppercase();
    match s.as_str() {
        "" | "0/0" => return None,
        "EVS" | "EVENS" => return Some(2.0),
        _ => {}
    }
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den == 0.0 {
            return None;
        }
        let decimal = 1.0 + num / den;
        return Some((decimal * 10_000.0).round() / 10_000.0);
    }
    s.parse().ok()
}

pub fn format_price(value: Option<&Value>) -> String {
    match value.and_then(parse_price) {
        Some(n) => format!("{n:.2}"),
        None => PLACEHOLDER.to_string(),
    }
}
