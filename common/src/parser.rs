//! バックエンドレスポンスパーサー
//!
//! 一括アップロードは `{"results": [...]}` または素の配列を返す。
//! 逐次アップロードは1件分の結果、失敗時は `{"error": "..."}` を返す。

use crate::error::{Error, Result};
use crate::types::InspectionResult;
use serde_json::Value;

/// 逐次アップロードのレスポンス
#[derive(Debug, Clone, PartialEq)]
pub enum ItemResponse {
    Result(InspectionResult),
    Error(String),
}

/// 一括アップロードのレスポンスをパース
///
/// # Examples
/// ```
/// use pcb_inspect_common::parse_batch_response;
///
/// let body = r#"{"results": [{"identifier": "a.jpg", "status": "PASS"}]}"#;
/// let results = parse_batch_response(body).unwrap();
/// assert_eq!(results.len(), 1);
/// ```
pub fn parse_batch_response(body: &str) -> Result<Vec<InspectionResult>> {
    let value: Value = serde_json::from_str(body.trim())?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("results").or_else(|| map.remove("data")) {
            Some(Value::Array(items)) => items,
            _ => return Err(Error::Parse("results配列が見つかりません".into())),
        },
        _ => return Err(Error::Parse("想定外のレスポンス形式".into())),
    };

    items
        .into_iter()
        .map(|item| {
            let result: InspectionResult = serde_json::from_value(item)?;
            Ok(result.normalize())
        })
        .collect()
}

/// 逐次アップロードのレスポンスをパース
///
/// 識別子が空の場合は `fallback_identifier`（アップロードしたファイル名）を使う。
pub fn parse_item_response(body: &str, fallback_identifier: &str) -> Result<ItemResponse> {
    let value: Value = serde_json::from_str(body.trim())?;

    if !value.is_object() {
        return Err(Error::Parse("想定外のレスポンス形式".into()));
    }

    if let Some(message) = error_only_message(&value) {
        return Ok(ItemResponse::Error(message));
    }

    let mut result: InspectionResult = serde_json::from_value(value)?;
    if result.identifier.trim().is_empty() {
        result.identifier = fallback_identifier.to_string();
    }
    Ok(ItemResponse::Result(result.normalize()))
}

/// エラーレスポンスからメッセージを取り出す
///
/// `error` / `detail` / `message` のいずれかを文字列として返す。
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body.trim()).ok()?;
    ["error", "detail", "message"]
        .iter()
        .find_map(|key| value.get(*key))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
}

fn error_only_message(value: &Value) -> Option<String> {
    let map = value.as_object()?;
    let has_payload = ["identifier", "filename", "file", "status", "defects", "detections"]
        .iter()
        .any(|key| map.contains_key(*key));
    if has_payload {
        return None;
    }
    map.get("error").map(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}
