use serde_json::Value;

/// Preferred size variants, best first.
pub const IMAGE_SIZE_PRIORITY: [&str; 4] = ["rectSm", "sqSm", "sqLg", "original"];

/// Picks an image from a map of size variants, falling back to a single
/// direct image field when no known variant carries a source.
pub fn select_image(variants: Option<&Value>, direct: Option<&str>) -> Option<String> {
    if let Some(Value::Object(map)) = variants {
        for size in IMAGE_SIZE_PRIORITY {
            let src = match map.get(size) {
                Some(Value::Object(variant)) => variant.get("src").and_then(Value::as_str),
                Some(Value::String(src)) => Some(src.as_str()),
                _ => None,
            };
            if let Some(src) = src.filter(|s| !s.trim().is_empty()) {
                return Some(src.to_string());
            }
        }
    }
    direct
        .filter(|src| !src.trim().is_empty())
        .map(str::to_string)
}

/// Schema.org `image` may be a URL, a list of URLs, or an `ImageObject`.
pub fn first_image_url(value: &Value) -> Option<String> {
    match value {
        Value::String(url) if !url.trim().is_empty() => Some(url.clone()),
        Value::Array(items) => items.iter().find_map(first_image_url),
        Value::Object(object) => object.get("url").and_then(first_image_url),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prefers_sizes_in_priority_order() {
        let srcset = json!({
            "original": {"src": "https://img/original.jpg"},
            "sqSm": {"src": "https://img/sq-sm.jpg"},
            "sqLg": {"src": "https://img/sq-lg.jpg"},
        });
        assert_eq!(
            select_image(Some(&srcset), Some("https://img/direct.jpg")),
            Some("https://img/sq-sm.jpg".to_string())
        );
    }

    #[test]
    fn skips_empty_variants() {
        let srcset = json!({"rectSm": {"src": ""}, "sqLg": {"src": "https://img/lg.jpg"}});
        assert_eq!(
            select_image(Some(&srcset), None),
            Some("https://img/lg.jpg".to_string())
        );
    }

    #[test]
    fn falls_back_to_direct_image() {
        assert_eq!(
            select_image(Some(&json!({})), Some("https://img/direct.jpg")),
            Some("https://img/direct.jpg".to_string())
        );
        assert_eq!(
            select_image(None, Some("https://img/direct.jpg")),
            Some("https://img/direct.jpg".to_string())
        );
        assert_eq!(select_image(None, None), None);
    }

    #[test]
    fn schema_image_shapes() {
        assert_eq!(
            first_image_url(&json!("https://a.jpg")),
            Some("https://a.jpg".to_string())
        );
        assert_eq!(
            first_image_url(&json!(["https://b.jpg", "https://c.jpg"])),
            Some("https://b.jpg".to_string())
        );
        assert_eq!(
            first_image_url(&json!({"@type": "ImageObject", "url": "https://d.jpg"})),
            Some("https://d.jpg".to_string())
        );
        assert_eq!(first_image_url(&json!(null)), None);
    }
}
