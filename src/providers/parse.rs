//! Decoding of the loosely structured provider payloads.
//!
//! Every field falls back by an explicit rule:
//! - `estimate_value`, `estimate_change`, history `value`/`change`: a missing,
//!   empty or non-numeric value decodes to `0.0`.
//! - `net_value`: missing, `null` or empty decodes to `None`; any other
//!   non-numeric value decodes to `Some(0.0)`.
//! - `code`: empty falls back to the code that was requested.
//! - `name`, `last_update`: missing decodes to an empty string.
//! - history entries without a date or a settled value are dropped.

use crate::core::error::FetchError;
use crate::core::fund::{FundRecord, HistoryPoint, SearchResult};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

static ENVELOPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*([A-Za-z_$][\w$]*)\((.*)\)\s*;?\s*$").expect("valid envelope pattern")
});

static SEARCH_INDEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)var\s+r\s*=\s*(\[.*?\])\s*;").expect("valid search index pattern")
});

const HISTORY_DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d", "%Y.%m.%d"];

fn number_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.parse::<f64>().unwrap_or(0.0))
            }
        }
        Value::Null => None,
        _ => Some(0.0),
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(number_from_value(&value).unwrap_or(0.0))
}

fn lenient_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(number_from_value(&value))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Inner object of the valuation envelope.
#[derive(Debug, Deserialize)]
struct ValuationPayload {
    #[serde(default, deserialize_with = "lenient_string")]
    fundcode: String,
    #[serde(default, deserialize_with = "lenient_string")]
    name: String,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    dwjz: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    gsz: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    gszzl: f64,
    #[serde(default, deserialize_with = "lenient_string")]
    gztime: String,
}

/// Error-shaped body some endpoints return instead of data.
#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    #[serde(rename = "ErrCode", default)]
    err_code: Option<Value>,
    #[serde(rename = "ErrMsg", default)]
    err_msg: Option<String>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Returns the text between `<token>(` and the closing `)`.
pub fn strip_envelope(body: &str) -> Option<&str> {
    let captures = ENVELOPE.captures(body)?;
    if let Some(token) = captures.get(1) {
        debug!(token = token.as_str(), "Stripped response envelope");
    }
    captures.get(2).map(|inner| inner.as_str())
}

fn provider_error(body: &str) -> Option<FetchError> {
    let parsed: ProviderErrorBody = serde_json::from_str(body.trim()).ok()?;
    if parsed.err_code.is_none() && parsed.err_msg.is_none() {
        return None;
    }
    let message = parsed
        .err_msg
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| "Unknown error".to_string());
    Some(FetchError::ProviderReported(message))
}

/// Decodes one valuation response body into a `FundRecord`.
pub fn parse_valuation(requested_code: &str, body: &str) -> Result<FundRecord, FetchError> {
    let Some(inner) = strip_envelope(body) else {
        if let Some(err) = provider_error(body) {
            return Err(err);
        }
        return Err(FetchError::Parse(format!(
            "response for {requested_code} is not wrapped in a callback envelope"
        )));
    };

    if inner.trim().is_empty() {
        return Err(FetchError::EmptyResult(format!(
            "no valuation available for {requested_code}"
        )));
    }

    let payload: ValuationPayload = serde_json::from_str(inner).map_err(|e| {
        FetchError::Parse(format!("invalid valuation JSON for {requested_code}: {e}"))
    })?;

    let code = if payload.fundcode.trim().is_empty() {
        requested_code.to_string()
    } else {
        payload.fundcode.trim().to_string()
    };

    Ok(FundRecord::new(
        code,
        payload.name,
        payload.dwjz,
        payload.gsz,
        round2(payload.gszzl),
        payload.gztime,
    ))
}

/// Extracts the whole fund index from the script-like search payload.
pub fn parse_search_index(body: &str) -> Result<Vec<SearchResult>, FetchError> {
    let captures = SEARCH_INDEX
        .captures(body)
        .ok_or_else(|| FetchError::Parse("fund index array not found in payload".to_string()))?;
    let array = captures.get(1).map_or("[]", |m| m.as_str());

    let rows: Vec<Vec<Value>> = serde_json::from_str(array)?;
    let total = rows.len();
    let index: Vec<SearchResult> = rows
        .into_iter()
        .filter(|row| row.len() >= 4)
        .filter_map(|row| {
            let field = |i: usize| row[i].as_str().map(str::to_string);
            Some(SearchResult {
                code: field(0)?,
                name: field(2)?,
                kind: field(3)?,
            })
        })
        .collect();

    debug!(total, usable = index.len(), "Parsed fund index");
    Ok(index)
}

/// Case-sensitive substring match on code or name.
pub fn filter_index(index: &[SearchResult], keyword: &str) -> Vec<SearchResult> {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return Vec::new();
    }
    index
        .iter()
        .filter(|fund| fund.code.contains(keyword) || fund.name.contains(keyword))
        .cloned()
        .collect()
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(rename = "Data", default)]
    data: Option<HistoryData>,
    #[serde(rename = "ErrCode", default)]
    err_code: Option<Value>,
    #[serde(rename = "ErrMsg", default)]
    err_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryData {
    #[serde(rename = "LSJZList", default)]
    entries: Option<Vec<HistoryEntry>>,
}

#[derive(Debug, Deserialize)]
struct HistoryEntry {
    #[serde(rename = "FSRQ", default)]
    date: Option<String>,
    #[serde(rename = "DWJZ", default)]
    value: Option<Value>,
    #[serde(rename = "JZZZL", default)]
    change: Option<Value>,
}

fn parse_history_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    HISTORY_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}

fn is_present(value: &Option<Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

/// Maps the nested history list into points ordered by calendar date.
pub fn parse_history(code: &str, body: &str) -> Result<Vec<HistoryPoint>, FetchError> {
    let response: HistoryResponse = serde_json::from_str(body)?;

    let Some(entries) = response.data.and_then(|data| data.entries) else {
        let has_error_code = response
            .err_code
            .as_ref()
            .is_some_and(|c| number_from_value(c).unwrap_or(0.0) != 0.0);
        if let Some(message) = response.err_msg.filter(|m| !m.trim().is_empty())
            && has_error_code
        {
            return Err(FetchError::ProviderReported(message));
        }
        return Err(FetchError::Parse(format!(
            "history response for {code} has no Data.LSJZList"
        )));
    };

    let mut points: Vec<HistoryPoint> = entries
        .into_iter()
        .filter(|entry| is_present(&entry.value))
        .filter_map(|entry| {
            let date = parse_history_date(entry.date.as_deref()?)?;
            let value = entry.value.as_ref().and_then(number_from_value).unwrap_or(0.0);
            let change = entry.change.as_ref().and_then(number_from_value).unwrap_or(0.0);
            Some(HistoryPoint {
                date,
                value,
                change,
            })
        })
        .collect();

    if points.is_empty() {
        return Err(FetchError::EmptyResult(format!(
            "no history entries for {code}"
        )));
    }

    // Stable, so same-day duplicates keep provider order and the first one wins.
    points.sort_by_key(|p| p.date);
    points.dedup_by_key(|p| p.date);
    Ok(points)
}
