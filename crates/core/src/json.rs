use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no JSON object found in model output")]
    NoObject,
    #[error("model output is not valid JSON: {0}")]
    Invalid(#[from] serde_json::Error),
    #[error("model output is not a JSON object")]
    NotAnObject,
}

/// Pulls the first top-level JSON object out of free-form model text: the
/// substring from the first `{` to the last `}`. Prose around the object is
/// tolerated; everything else is a typed failure. This is the only point
/// where model text becomes structured data.
pub fn extract_json_object(text: &str) -> Result<Value, ExtractError> {
    let start = text.find('{').ok_or(ExtractError::NoObject)?;
    let end = text.rfind('}').ok_or(ExtractError::NoObject)?;
    if end < start {
        return Err(ExtractError::NoObject);
    }

    let value: Value = serde_json::from_str(&text[start..=end])?;
    if !value.is_object() {
        return Err(ExtractError::NotAnObject);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_surrounded_by_prose() {
        let text = "Sure! Here you go:\n{\"reply\": \"hi\", \"field_updates\": {}}\nHope that helps.";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["reply"], "hi");
    }

    #[test]
    fn plain_object_passes_through() {
        let value = extract_json_object("{\"a\": [1, 2, {\"b\": 3}]}").unwrap();
        assert_eq!(value["a"][2]["b"], 3);
    }

    #[test]
    fn missing_braces_is_a_typed_failure() {
        assert!(matches!(
            extract_json_object("no structure here"),
            Err(ExtractError::NoObject)
        ));
    }

    #[test]
    fn malformed_json_is_a_typed_failure() {
        assert!(matches!(
            extract_json_object("{\"reply\": }"),
            Err(ExtractError::Invalid(_))
        ));
    }

    #[test]
    fn reversed_braces_do_not_panic() {
        assert!(extract_json_object("} nothing {").is_err());
    }
}
