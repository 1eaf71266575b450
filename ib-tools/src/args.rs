use crate::error::{Result, ToolError};

pub(crate) fn require_non_empty_string(args: &serde_json::Value, key: &str) -> Result<String> {
    let Some(v) = args.get(key) else {
        return Err(ToolError::InvalidArguments(format!("missing key: {key}")));
    };
    match v {
        serde_json::Value::String(s) if !s.trim().is_empty() => Ok(s.clone()),
        serde_json::Value::String(_) => Err(ToolError::InvalidArguments(format!(
            "key {key} must not be empty"
        ))),
        other => Err(ToolError::InvalidArguments(format!(
            "key {key} must be string, got {other:?}"
        ))),
    }
}

pub(crate) fn optional_string_array(
    args: &serde_json::Value,
    key: &str,
) -> Result<Option<Vec<String>>> {
    let Some(v) = args.get(key) else {
        return Ok(None);
    };
    match v {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| match item {
                serde_json::Value::String(s) => Ok(s.clone()),
                other => Err(ToolError::InvalidArguments(format!(
                    "key {key} must contain only strings, got {other:?}"
                ))),
            })
            .collect::<Result<Vec<_>>>()
            .map(Some),
        other => Err(ToolError::InvalidArguments(format!(
            "key {key} must be an array of strings, got {other:?}"
        ))),
    }
}
