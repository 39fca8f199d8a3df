use super::parse::{filter_index, parse_history, parse_search_index, parse_valuation};
use crate::core::cache::{TtlCache, cache_key};
use crate::core::config::{EastmoneyProviderConfig, EndpointConfig};
use crate::core::error::FetchError;
use crate::core::fund::{FundProvider, FundRecord, HistoryPoint, HistoryRange, SearchResult};
use async_trait::async_trait;
use reqwest::header::REFERER;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Adapter for the eastmoney family of fund endpoints.
pub struct EastmoneyProvider {
    config: EastmoneyProviderConfig,
    client: reqwest::Client,
    search_cache: TtlCache<Arc<Vec<SearchResult>>>,
    history_cache: TtlCache<Vec<HistoryPoint>>,
}

impl EastmoneyProvider {
    pub fn new(
        config: EastmoneyProviderConfig,
        search_cache: TtlCache<Arc<Vec<SearchResult>>>,
        history_cache: TtlCache<Vec<HistoryPoint>>,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self {
            config,
            client,
            search_cache,
            history_cache,
        })
    }

    async fn get_text(
        &self,
        endpoint: &EndpointConfig,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<String, FetchError> {
        let raw_url = format!("{}{}", endpoint.base_url.trim_end_matches('/'), path);
        let url = if query.is_empty() {
            reqwest::Url::parse(&raw_url)
        } else {
            reqwest::Url::parse_with_params(&raw_url, query.iter().map(|(k, v)| (*k, v.as_str())))
        }
        .map_err(|e| FetchError::Transport(format!("invalid URL {raw_url}: {e}")))?;
        debug!("Requesting {}", url);

        let mut request = self.client.get(url.clone()).timeout(endpoint.timeout());
        if let Some(referer) = &endpoint.referer {
            request = request.header(REFERER, referer);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(%url, status = status.as_u16(), "Provider returned an error status");
            return Err(FetchError::HttpStatus(status.as_u16()));
        }
        Ok(response.text().await?)
    }

    async fn search_index(&self) -> Result<Arc<Vec<SearchResult>>, FetchError> {
        let key = cache_key("search", &["index"]);
        if let Some(index) = self.search_cache.get(&key).await {
            return Ok(index);
        }

        let body = self
            .get_text(&self.config.search, "/js/fundcode_search.js", &[])
            .await?;
        let index = Arc::new(parse_search_index(&body)?);
        self.search_cache.set(key, Arc::clone(&index)).await;
        Ok(index)
    }
}

#[async_trait]
impl FundProvider for EastmoneyProvider {
    #[instrument(name = "ValuationFetch", skip(self), fields(code = %code))]
    async fn fetch_valuation(&self, code: &str) -> Result<FundRecord, FetchError> {
        let path = format!("/js/{code}.js");
        let body = self.get_text(&self.config.valuation, &path, &[]).await?;
        let record = parse_valuation(code, &body)?;
        debug!(
            estimate = record.estimate_value,
            change = record.estimate_change,
            "Fetched valuation"
        );
        Ok(record)
    }

    #[instrument(name = "FundSearch", skip(self), fields(keyword = %keyword))]
    async fn search(&self, keyword: &str) -> Result<Vec<SearchResult>, FetchError> {
        if keyword.trim().is_empty() {
            return Ok(Vec::new());
        }
        let index = self.search_index().await?;
        let matches = filter_index(&index, keyword);
        debug!(matches = matches.len(), "Filtered fund index");
        Ok(matches)
    }

    #[instrument(name = "HistoryFetch", skip(self), fields(code = %code, days = range.days()))]
    async fn fetch_history(
        &self,
        code: &str,
        range: HistoryRange,
    ) -> Result<Vec<HistoryPoint>, FetchError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(FetchError::EmptyResult("fund code is empty".to_string()));
        }

        let days = range.days();
        let key = cache_key("history", &[code.to_string(), days.to_string()]);
        if let Some(points) = self.history_cache.get(&key).await {
            return Ok(points);
        }

        let query = [
            ("fundCode", code.to_string()),
            ("pageIndex", "1".to_string()),
            ("pageSize", days.to_string()),
            ("startDate", String::new()),
            ("endDate", String::new()),
            ("_", chrono::Utc::now().timestamp_millis().to_string()),
        ];
        let body = self
            .get_text(&self.config.history, "/f10/lsjz", &query)
            .await?;
        let points = parse_history(code, &body)?;
        self.history_cache.set(key, points.clone()).await;
        Ok(points)
    }
}
