//! Lenient field decoders.
//!
//! Clients send numbers as JSON numbers or as strings depending on where the
//! value came from, and sometimes omit or null out whole fields.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Reads a non-negative integer from a number, a numeric string or null.
///
/// Anything unreadable decodes as 0. Fractions are truncated.
pub(crate) fn number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map_or(0, number_from_value))
}

pub(crate) fn number_from_value(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Value::String(s) => {
            let digits: String = s.trim().chars().take_while(char::is_ascii_digit).collect();
            digits.parse().unwrap_or(0)
        }
        _ => 0,
    }
}

/// Reads a list, treating null or any non-array value as empty.
pub(crate) fn list<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => Ok(items),
        _ => Ok(Vec::new()),
    }
}

/// Reads one element or an array of elements.
pub(crate) fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
    }

    match Option::<OneOrMany<T>>::deserialize(deserializer)? {
        Some(OneOrMany::Many(items)) => Ok(items),
        Some(OneOrMany::One(item)) => Ok(vec![item]),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    proptest! {
        #[test]
        fn numeric_strings_match_numbers(n in any::<u64>()) {
            prop_assert_eq!(number_from_value(&json!(n.to_string())), n);
            prop_assert_eq!(number_from_value(&json!(n)), n);
        }
    }

    #[test]
    fn numbers_from_strings_and_junk() {
        assert_eq!(number_from_value(&json!(3)), 3);
        assert_eq!(number_from_value(&json!("12")), 12);
        assert_eq!(number_from_value(&json!("7abc")), 7);
        assert_eq!(number_from_value(&json!("abc")), 0);
        assert_eq!(number_from_value(&json!(2.9)), 2);
        assert_eq!(number_from_value(&json!(-4)), 0);
        assert_eq!(number_from_value(&json!(null)), 0);
    }
}
