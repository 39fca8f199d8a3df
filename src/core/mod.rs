//! Fund monitoring engine: data model, caching, state and scheduling

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod fund;
pub mod log;
pub mod scheduler;

// Re-export main types for cleaner imports
pub use cache::TtlCache;
pub use engine::{EngineState, FundStore, PersistedState, RefreshOutcome};
pub use error::{EngineError, FetchError};
pub use fund::{FundProvider, FundRecord, HistoryPoint, HistoryRange, SearchResult};
pub use scheduler::{AutoRefresh, Debouncer, RefreshScheduler};
