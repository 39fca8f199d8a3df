//! Watch-list state and the store that owns it.
//!
//! `FundStore` is the only writer of `EngineState`. Every mutation goes
//! through `watch::Sender::send_modify`, which serializes writers and
//! notifies subscribers; network I/O always happens outside that critical
//! section.

use crate::core::cache::{TtlCache, cache_key};
use crate::core::config::RefreshConfig;
use crate::core::error::{EngineError, FetchError};
use crate::core::fund::{FundProvider, FundRecord, HistoryPoint, HistoryRange, SearchResult};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Full engine state as seen by the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineState {
    /// Insertion order is display order.
    pub watch_list: Vec<FundRecord>,
    pub is_refreshing: bool,
    pub last_update: Option<DateTime<Local>>,
    pub error: Option<String>,
    pub auto_refresh_enabled: bool,
    pub refresh_interval_ms: u64,
}

impl EngineState {
    pub fn new(settings: &RefreshConfig) -> Self {
        Self {
            watch_list: Vec::new(),
            is_refreshing: false,
            last_update: None,
            error: None,
            auto_refresh_enabled: settings.auto_refresh,
            refresh_interval_ms: settings.interval_ms,
        }
    }

    /// Rebuilds the state from its durable subset; transient fields reset.
    pub fn from_persisted(persisted: PersistedState) -> Self {
        Self {
            watch_list: persisted
                .watch_list
                .into_iter()
                .map(FundRecord::normalized)
                .collect(),
            is_refreshing: false,
            last_update: None,
            error: None,
            auto_refresh_enabled: persisted.auto_refresh,
            refresh_interval_ms: persisted.refresh_interval.max(1),
        }
    }

    pub fn to_persisted(&self) -> PersistedState {
        PersistedState {
            watch_list: self.watch_list.clone(),
            auto_refresh: self.auto_refresh_enabled,
            refresh_interval: self.refresh_interval_ms,
        }
    }

    pub fn codes(&self) -> Vec<String> {
        self.watch_list.iter().map(|f| f.code.clone()).collect()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.watch_list.iter().any(|f| f.code == code)
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new(&RefreshConfig::default())
    }
}

/// Durable subset of `EngineState`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub watch_list: Vec<FundRecord>,
    pub auto_refresh: bool,
    pub refresh_interval: u64,
}

/// What a call to `refresh_funds` ended up doing.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Nothing to refresh
    Empty,
    /// Another refresh was already in flight; nothing was done
    Skipped,
    /// A cached snapshot for the same code list was adopted
    Cached,
    /// The provider was called; `failed` lists codes that kept stale data
    Fetched {
        updated: usize,
        failed: Vec<String>,
    },
}

/// Replaces records in place by code; codes absent from `fresh` keep their
/// previous record and codes not in `watch_list` are ignored.
fn merge_records(watch_list: &mut [FundRecord], fresh: &[FundRecord]) -> usize {
    let by_code: HashMap<&str, &FundRecord> =
        fresh.iter().map(|record| (record.code.as_str(), record)).collect();
    let mut updated = 0;
    for record in watch_list.iter_mut() {
        if let Some(new_record) = by_code.get(record.code.as_str()) {
            *record = (*new_record).clone();
            updated += 1;
        }
    }
    updated
}

/// Marks the store busy for as long as it is alive.
struct BusyGuard<'a> {
    store: &'a FundStore,
}

impl<'a> BusyGuard<'a> {
    fn begin(store: &'a FundStore) -> Self {
        store.in_flight.fetch_add(1, Ordering::SeqCst);
        store.state.send_modify(|state| {
            state.is_refreshing = true;
            state.error = None;
        });
        Self { store }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if self.store.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.store
                .state
                .send_modify(|state| state.is_refreshing = false);
        }
    }
}

/// Clears the refresh flag when a refresh settles.
struct RefreshSlot<'a>(&'a AtomicBool);

impl Drop for RefreshSlot<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct FundStore {
    provider: Arc<dyn FundProvider>,
    valuation_cache: TtlCache<Vec<FundRecord>>,
    state: watch::Sender<EngineState>,
    in_flight: AtomicUsize,
    refreshing: AtomicBool,
}

impl FundStore {
    pub fn new(
        provider: Arc<dyn FundProvider>,
        valuation_cache: TtlCache<Vec<FundRecord>>,
        initial: EngineState,
    ) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            provider,
            valuation_cache,
            state,
            in_flight: AtomicUsize::new(0),
            refreshing: AtomicBool::new(false),
        }
    }

    /// Current state snapshot.
    pub fn snapshot(&self) -> EngineState {
        self.state.borrow().clone()
    }

    /// Read-only subscription to state changes.
    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    pub fn persisted(&self) -> PersistedState {
        self.state.borrow().to_persisted()
    }

    fn set_error(&self, err: &EngineError) {
        let message = err.user_message();
        self.state.send_modify(|state| state.error = Some(message));
    }

    /// Fetches `code` and appends it to the end of the watch-list.
    pub async fn add_fund(&self, code: &str) -> Result<FundRecord, EngineError> {
        let code = code.trim();
        if code.is_empty() {
            let err = EngineError::InvalidCode;
            self.set_error(&err);
            return Err(err);
        }
        if self.state.borrow().contains(code) {
            let err = EngineError::Duplicate(code.to_string());
            self.set_error(&err);
            return Err(err);
        }

        let _busy = BusyGuard::begin(self);
        let record = match self.provider.fetch_valuation(code).await {
            Ok(record) => record,
            Err(e) => {
                warn!(code, error = %e, "Failed to add fund");
                let err = EngineError::from(e);
                self.set_error(&err);
                return Err(err);
            }
        };

        let mut appended = false;
        self.state.send_modify(|state| {
            // Another add of the same code may have finished meanwhile
            if !state.contains(&record.code) {
                state.watch_list.push(record.clone());
                state.last_update = Some(Local::now());
                appended = true;
            }
        });

        if !appended {
            let err = EngineError::Duplicate(record.code.clone());
            self.set_error(&err);
            return Err(err);
        }
        info!(code = %record.code, name = %record.name, "Added fund");
        Ok(record)
    }

    /// Drops `code` from the watch-list; absent codes are ignored.
    pub fn remove_fund(&self, code: &str) {
        let code = code.trim();
        self.state.send_if_modified(|state| {
            let before = state.watch_list.len();
            state.watch_list.retain(|fund| fund.code != code);
            before != state.watch_list.len()
        });
        debug!(code, "Removed fund");
    }

    /// Refreshes every fund in the watch-list.
    ///
    /// Unless `force_refresh` is set, a cached snapshot for the same code
    /// list is adopted without any network call. Fresh records are merged by
    /// code, so a fund whose fetch failed keeps its last known record.
    pub async fn refresh_funds(&self, force_refresh: bool) -> Result<RefreshOutcome, EngineError> {
        let codes = self.state.borrow().codes();
        if codes.is_empty() {
            return Ok(RefreshOutcome::Empty);
        }

        if self
            .refreshing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Refresh already in flight, skipping");
            return Ok(RefreshOutcome::Skipped);
        }
        let _slot = RefreshSlot(&self.refreshing);
        let _busy = BusyGuard::begin(self);

        let key = cache_key("funds", &codes);
        if !force_refresh && let Some(cached) = self.valuation_cache.get(&key).await {
            debug!(funds = codes.len(), "Using cached valuations");
            self.state.send_modify(|state| {
                merge_records(&mut state.watch_list, &cached);
                state.last_update = Some(Local::now());
            });
            return Ok(RefreshOutcome::Cached);
        }

        let mut batch = self.provider.fetch_valuations(&codes).await;
        let mut fresh = Vec::with_capacity(codes.len());
        let mut failures: Vec<(String, FetchError)> = Vec::new();
        for code in &codes {
            match batch.remove(code) {
                Some(Ok(record)) => fresh.push(record),
                Some(Err(e)) => failures.push((code.clone(), e)),
                None => failures.push((
                    code.clone(),
                    FetchError::EmptyResult("no result returned".to_string()),
                )),
            }
        }

        for (code, e) in &failures {
            warn!(code = %code, error = %e, "Fund refresh failed");
        }

        if fresh.is_empty() {
            let reason = failures
                .first()
                .map(|(_, e)| e.to_string())
                .unwrap_or_default();
            let err = EngineError::AllFailed(reason);
            self.set_error(&err);
            return Err(err);
        }

        self.valuation_cache.set(key, fresh.clone()).await;

        let mut updated = 0;
        self.state.send_modify(|state| {
            updated = merge_records(&mut state.watch_list, &fresh);
            state.last_update = Some(Local::now());
        });

        let failed: Vec<String> = failures.into_iter().map(|(code, _)| code).collect();
        info!(updated, failed = failed.len(), "Refreshed funds");
        Ok(RefreshOutcome::Fetched { updated, failed })
    }

    /// Searches the provider's index; failures surface only through
    /// `EngineState::error`.
    pub async fn search_funds(&self, keyword: &str) -> Vec<SearchResult> {
        if keyword.trim().is_empty() {
            return Vec::new();
        }
        self.clear_error();
        match self.provider.search(keyword).await {
            Ok(results) => results,
            Err(e) => {
                warn!(keyword, error = %e, "Search failed");
                self.set_error(&EngineError::from(e));
                Vec::new()
            }
        }
    }

    pub async fn fetch_history(
        &self,
        code: &str,
        range: HistoryRange,
    ) -> Result<Vec<HistoryPoint>, EngineError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(EngineError::InvalidCode);
        }
        Ok(self.provider.fetch_history(code, range).await?)
    }

    pub fn set_auto_refresh(&self, enabled: bool) {
        self.state.send_if_modified(|state| {
            let changed = state.auto_refresh_enabled != enabled;
            state.auto_refresh_enabled = enabled;
            changed
        });
    }

    /// Accepts any positive number of milliseconds.
    pub fn set_refresh_interval(&self, interval_ms: u64) -> Result<(), EngineError> {
        if interval_ms == 0 {
            return Err(EngineError::InvalidInterval);
        }
        self.state.send_if_modified(|state| {
            let changed = state.refresh_interval_ms != interval_ms;
            state.refresh_interval_ms = interval_ms;
            changed
        });
        Ok(())
    }

    pub fn clear_error(&self) {
        self.state.send_if_modified(|state| state.error.take().is_some());
    }
}
