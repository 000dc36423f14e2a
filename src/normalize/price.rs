use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static DOLLAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\s?(\d+(?:\.\d{2})?)").expect("dollar amount regex"));

/// `$N` for one price, `$first - $last` for several.
///
/// The list is used in the order the source gave it; sources publish tiers
/// cheapest first, so nothing is re-sorted here.
pub fn format_price<S: AsRef<str>>(prices: &[S]) -> Option<String> {
    let amounts: Vec<&str> = prices
        .iter()
        .map(|price| price.as_ref().trim().trim_start_matches('$').trim())
        .filter(|amount| !amount.is_empty())
        .collect();

    match amounts.as_slice() {
        [] => None,
        [only] => Some(format!("${only}")),
        [first, .., last] => Some(format!("${first} - ${last}")),
    }
}

/// Renders a JSON price value as an amount string: integers stay bare,
/// fractional amounts get two decimals.
pub fn price_from_json(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => {
            if let Some(whole) = number.as_i64() {
                return Some(whole.to_string());
            }
            let amount = number.as_f64()?;
            if amount.fract() == 0.0 {
                Some(format!("{amount:.0}"))
            } else {
                Some(format!("{amount:.2}"))
            }
        }
        _ => None,
    }
}

/// Every `$N` or `$N.NN` amount in free text, in order of appearance.
pub fn prices_in_text(text: &str) -> Vec<String> {
    DOLLAR_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_price() {
        let amount = price_from_json(&json!(12.50)).unwrap();
        assert_eq!(format_price(&[amount]), Some("$12.50".to_string()));
        assert_eq!(format_price(&["12.50"]), Some("$12.50".to_string()));
    }

    #[test]
    fn price_range_uses_first_and_last() {
        let amounts: Vec<String> = [json!(10), json!(25)]
            .iter()
            .filter_map(price_from_json)
            .collect();
        assert_eq!(format_price(&amounts), Some("$10 - $25".to_string()));
        assert_eq!(
            format_price(&["$15", "$20", "$35"]),
            Some("$15 - $35".to_string())
        );
    }

    #[test]
    fn unsorted_input_is_not_reordered() {
        assert_eq!(format_price(&["40", "20"]), Some("$40 - $20".to_string()));
    }

    #[test]
    fn empty_list_is_absent() {
        let empty: [&str; 0] = [];
        assert_eq!(format_price(&empty), None);
        assert_eq!(format_price(&["  "]), None);
    }

    #[test]
    fn json_values() {
        assert_eq!(price_from_json(&json!(30.0)), Some("30".to_string()));
        assert_eq!(price_from_json(&json!("25.00")), Some("25.00".to_string()));
        assert_eq!(price_from_json(&json!(null)), None);
    }

    #[test]
    fn amounts_in_text() {
        assert_eq!(
            prices_in_text("Tickets $25 advance / $30.00 door"),
            vec!["25".to_string(), "30.00".to_string()]
        );
        assert!(prices_in_text("Free show").is_empty());
    }
}
