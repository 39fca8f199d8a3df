//! Fund records and the provider abstraction

use crate::core::error::FetchError;
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

/// Canonical valuation snapshot of a single fund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundRecord {
    pub code: String,
    pub name: String,
    /// Last officially settled value; not every provider reports it.
    #[serde(default)]
    pub net_value: Option<f64>,
    pub estimate_value: f64,
    /// Signed percentage change against the prior settlement.
    pub estimate_change: f64,
    /// Provider-reported timestamp, kept verbatim.
    pub last_update: String,
    #[serde(default)]
    pub is_rising: bool,
}

impl FundRecord {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        net_value: Option<f64>,
        estimate_value: f64,
        estimate_change: f64,
        last_update: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            net_value,
            estimate_value,
            estimate_change,
            last_update: last_update.into(),
            is_rising: estimate_change >= 0.0,
        }
    }

    /// Re-derives `is_rising` from `estimate_change`.
    pub fn normalized(mut self) -> Self {
        self.is_rising = self.estimate_change >= 0.0;
        self
    }
}

/// Lightweight entry of the provider's fund index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub code: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Settled value of a fund on one trading day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub value: f64,
    pub change: f64,
}

/// Lookback window for history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HistoryRange {
    Week,
    #[default]
    Month,
    Quarter,
    Days(u32),
}

impl HistoryRange {
    pub fn days(&self) -> u32 {
        match self {
            HistoryRange::Week => 7,
            HistoryRange::Month => 30,
            HistoryRange::Quarter => 90,
            HistoryRange::Days(days) => *days,
        }
    }
}

impl Display for HistoryRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}d", self.days())
    }
}

impl FromStr for HistoryRange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "7d" => Ok(HistoryRange::Week),
            "30d" => Ok(HistoryRange::Month),
            "90d" => Ok(HistoryRange::Quarter),
            other => {
                let digits = other.strip_suffix('d').unwrap_or(other);
                match digits.parse::<u32>() {
                    Ok(days) if days > 0 => Ok(HistoryRange::Days(days)),
                    _ => Err(anyhow::anyhow!("Invalid history range: {}", s)),
                }
            }
        }
    }
}

/// Outcome of a multi-code valuation fetch, one entry per requested code.
pub type ValuationBatch = HashMap<String, Result<FundRecord, FetchError>>;

#[async_trait]
pub trait FundProvider: Send + Sync {
    /// Fetches the current valuation estimate of one fund.
    async fn fetch_valuation(&self, code: &str) -> Result<FundRecord, FetchError>;

    /// Fetches every code concurrently and waits for all of them to settle.
    ///
    /// A failing code only affects its own entry in the batch.
    async fn fetch_valuations(&self, codes: &[String]) -> ValuationBatch {
        let futures = codes.iter().map(|code| async move {
            let result = self.fetch_valuation(code).await;
            (code.clone(), result)
        });
        join_all(futures).await.into_iter().collect()
    }

    /// Finds funds whose code or name contains `keyword`.
    async fn search(&self, keyword: &str) -> Result<Vec<SearchResult>, FetchError>;

    /// Settled history of a fund, ascending by date.
    async fn fetch_history(
        &self,
        code: &str,
        range: HistoryRange,
    ) -> Result<Vec<HistoryPoint>, FetchError>;
}
