use crate::enums::UnavailableReason;
use crate::error::CoreError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Shown to clients when no artifact exists yet. Nothing is actually queued:
/// the producer scans the watchlist on its own schedule.
pub const PENDING_MESSAGE: &str =
    "该股票尚未纳入后台量化池，已加入队列，请等待下一次批量计算。";

/// The default watchlist served when the store is unreachable or empty.
pub const FALLBACK_WATCHLIST: [(&str, &str); 3] = [
    ("600519", "贵州茅台"),
    ("300750", "宁德时代"),
    ("000001", "平安银行"),
];

/// Builds the fallback watchlist as owned entries, in display order.
pub fn fallback_watchlist() -> Vec<WatchlistEntry> {
    FALLBACK_WATCHLIST
        .iter()
        .map(|(code, name)| WatchlistEntry {
            code: code.to_string(),
            name: Some(name.to_string()),
            added_at: None,
        })
        .collect()
}

/// One row of the `watchlist` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WatchlistEntry {
    pub code: String,
    pub name: Option<String>,
    /// Absent only for fallback entries, which were never persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
}

/// A single headline attached to an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub time: String,
}

impl NewsItem {
    /// The notice injected when the producer wrote no news of its own.
    pub fn sync_notice() -> Self {
        Self {
            kind: "系统".to_string(),
            title: "量化分析报告已从云端数据库同步".to_string(),
            time: "刚刚".to_string(),
        }
    }
}

/// A ready artifact as served to clients: the producer's payload with
/// `lastUpdated` merged in and a guaranteed `news` field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ArtifactDocument(Map<String, Value>);

impl ArtifactDocument {
    /// Merges store metadata into a stored payload.
    ///
    /// The payload must be a JSON object. A missing or `null` `news` field is
    /// replaced by [`NewsItem::sync_notice`]; any other value is kept as is.
    pub fn from_stored(
        code: &str,
        payload: Value,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        let mut fields = match payload {
            Value::Object(fields) => fields,
            other => {
                return Err(CoreError::MalformedArtifact {
                    code: code.to_string(),
                    reason: format!("expected a JSON object, found {}", json_kind(&other)),
                });
            }
        };

        fields.insert(
            "lastUpdated".to_string(),
            Value::String(updated_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );

        let has_news = fields.get("news").is_some_and(|news| !news.is_null());
        if !has_news {
            let notice = serde_json::to_value(NewsItem::sync_notice()).map_err(|e| {
                CoreError::MalformedArtifact {
                    code: code.to_string(),
                    reason: e.to_string(),
                }
            })?;
            fields.insert("news".to_string(), Value::Array(vec![notice]));
        }

        Ok(Self(fields))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// The result of asking for an artifact. Client errors and corruption are
/// reported separately, as errors; everything here is an expected state.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Ready(ArtifactDocument),
    Pending { message: String },
    Unavailable(UnavailableReason),
}

impl LookupOutcome {
    pub fn pending() -> Self {
        LookupOutcome::Pending {
            message: PENDING_MESSAGE.to_string(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, LookupOutcome::Ready(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn stamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 17, 7, 30, 0).unwrap()
    }

    #[test]
    fn missing_news_is_backfilled_with_sync_notice() {
        let doc = ArtifactDocument::from_stored("688981", json!({"score": 72}), stamp()).unwrap();
        let value = doc.into_value();

        assert_eq!(value["score"], json!(72));
        assert_eq!(value["lastUpdated"], json!("2024-05-17T07:30:00.000Z"));
        let news = value["news"].as_array().unwrap();
        assert_eq!(news.len(), 1);
        assert_eq!(news[0]["type"], json!("系统"));
        assert!(!news[0]["title"].as_str().unwrap().is_empty());
    }

    #[test]
    fn null_news_counts_as_missing() {
        let doc =
            ArtifactDocument::from_stored("600519", json!({"news": null}), stamp()).unwrap();
        assert_eq!(doc.get("news").unwrap().as_array().unwrap().len(), 1);
    }

    #[test]
    fn producer_news_is_kept() {
        let news = json!([{"type": "公告", "title": "年报发布", "time": "昨天"}]);
        let doc =
            ArtifactDocument::from_stored("600519", json!({"news": news.clone()}), stamp())
                .unwrap();
        assert_eq!(doc.get("news"), Some(&news));

        let empty =
            ArtifactDocument::from_stored("600519", json!({"news": []}), stamp()).unwrap();
        assert_eq!(empty.get("news"), Some(&json!([])));
    }

    #[test]
    fn stored_last_updated_is_replaced_by_row_timestamp() {
        let doc = ArtifactDocument::from_stored(
            "300750",
            json!({"lastUpdated": "stale"}),
            stamp(),
        )
        .unwrap();
        assert_eq!(doc.get("lastUpdated"), Some(&json!("2024-05-17T07:30:00.000Z")));
    }

    #[test]
    fn non_object_payload_is_malformed() {
        let err = ArtifactDocument::from_stored("300750", json!([1, 2, 3]), stamp()).unwrap_err();
        assert!(matches!(err, CoreError::MalformedArtifact { ref code, .. } if code == "300750"));
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn fallback_watchlist_has_three_unpersisted_entries() {
        let entries = fallback_watchlist();
        let codes: Vec<&str> = entries.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, vec!["600519", "300750", "000001"]);
        assert!(entries.iter().all(|e| e.added_at.is_none()));

        let wire = serde_json::to_value(&entries[0]).unwrap();
        assert_eq!(wire, json!({"code": "600519", "name": "贵州茅台"}));
    }

    #[test]
    fn pending_outcome_carries_explanation() {
        match LookupOutcome::pending() {
            LookupOutcome::Pending { message } => assert!(!message.is_empty()),
            other => panic!("expected pending, got {:?}", other),
        }
    }
}
