// Card Tracking System - Core Library
// Merges bank, manufacturer and logistics updates into one record per card

pub mod model;
pub mod error;
pub mod path_query;
pub mod config;      // Provider mappings (paths, identity keys, status tables)
pub mod normalize;
pub mod extractor;
pub mod resolver;
pub mod merger;      // Timeline engine
pub mod store;
pub mod processor;
pub mod analytics;

// Re-export commonly used types
pub use model::{
    Card, CardInfo, Customer, CustomerInfo, CurrentStatus, ProviderType, Stage,
    TimelineEvent, TrackingIdKind, TrackingStatus,
};
pub use error::{ConfigError, ProcessError, RecordError, StoreError};
pub use path_query::{PathQuery, PathSyntaxError};
pub use config::{ConfigRegistry, FieldRule, ProviderConfig, StatusMapping};
pub use extractor::{extract, extract_events, ExtractedFields};
pub use resolver::{resolve, Resolution};
pub use merger::{merge, next_status, MergeOutcome, MergeResult};
pub use store::{CardLocator, ContactKind, CustomerStore, MemoryStore, SqliteStore};
pub use processor::{load_records, CardTrackingProcessor, ProcessingReport, RecordFailure, RecordOutcome};
pub use analytics::{AnalyticsReport, BankPerformance};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
