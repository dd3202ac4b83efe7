// ⚠️ Error taxonomy
// ConfigError and ProcessError abort a run; RecordError is per-record and
// ends up in the ProcessingReport; StoreError may be either.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::{ProviderType, TrackingIdKind};
use crate::path_query::PathSyntaxError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Unknown provider type: {0}")]
    UnknownProvider(String),
    #[error("No configuration loaded for provider type `{0}`")]
    MissingProvider(ProviderType),
    #[error("Provider `{provider}`: invalid path query for `{target}`: {source}")]
    InvalidPath {
        provider: ProviderType,
        target: String,
        #[source]
        source: PathSyntaxError,
    },
    #[error("Provider `{provider}`: `{kind}` is not a recognised tracking-id kind")]
    UnknownTrackingKind { provider: ProviderType, kind: String },
    #[error("Provider `{provider}`: status `{code}` maps to unknown stage `{stage}`")]
    UnknownStage {
        provider: ProviderType,
        code: String,
        stage: String,
    },
    #[error("Provider `{provider}`: {reason}")]
    Invalid { provider: ProviderType, reason: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Failed to (de)serialize customer document: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Customer {customer_id} was modified concurrently (expected version {expected}, found {found})")]
    VersionConflict {
        customer_id: String,
        expected: i64,
        found: i64,
    },
    #[error("{kind} `{value}` already belongs to card {existing_card}, cannot index it for card {card_id}")]
    IndexConflict {
        kind: TrackingIdKind,
        value: String,
        existing_card: String,
        card_id: String,
    },
    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Errors worth one retry: lock contention and lost optimistic races
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            StoreError::VersionConflict { .. } => true,
            _ => false,
        }
    }
}

/// Failure of a single input record. The batch carries on.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Missing required field: {rule}")]
    MissingRequiredField { rule: String },
    #[error("Unknown {provider} status code `{code}`")]
    UnknownStatusCode { provider: ProviderType, code: String },
    #[error("Card {card_id} already has {kind} `{existing}`, refusing to overwrite with `{incoming}`")]
    TrackingIdConflict {
        card_id: String,
        kind: TrackingIdKind,
        existing: String,
        incoming: String,
    },
    #[error("No existing card matches {provider} payload ({lookup})")]
    UnresolvedCard { provider: ProviderType, lookup: String },
    #[error("Tracking ids point at two different cards: {first_card} and {second_card}")]
    AmbiguousIdentity {
        first_card: String,
        second_card: String,
    },
    #[error("Unparseable timestamp `{value}`")]
    InvalidTimestamp { value: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RecordError {
    /// Stable name used as `error_kind` in processing reports
    pub fn kind(&self) -> &'static str {
        match self {
            RecordError::MissingRequiredField { .. } => "MissingRequiredFieldError",
            RecordError::UnknownStatusCode { .. } => "UnknownStatusCodeError",
            RecordError::TrackingIdConflict { .. } => "TrackingIdConflictError",
            RecordError::UnresolvedCard { .. } => "UnresolvedCardError",
            RecordError::AmbiguousIdentity { .. } => "AmbiguousIdentityError",
            RecordError::InvalidTimestamp { .. } => "InvalidTimestampError",
            RecordError::Store(_) => "StoreError",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, RecordError::Store(e) if e.is_transient())
    }
}

/// Fatal errors that stop processing of a whole input file
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to read input file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Input file {path} is not valid JSON: {source}")]
    InvalidInput {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Input file {path} must contain a JSON object or an array of objects")]
    UnsupportedInput { path: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_error_kinds() {
        let err = RecordError::MissingRequiredField {
            rule: "application_id".to_string(),
        };
        assert_eq!(err.kind(), "MissingRequiredFieldError");
        assert_eq!(err.to_string(), "Missing required field: application_id");

        let err = RecordError::UnknownStatusCode {
            provider: ProviderType::Logistics,
            code: "LOST".to_string(),
        };
        assert_eq!(err.kind(), "UnknownStatusCodeError");
        assert!(err.to_string().contains("logistics"));
    }

    #[test]
    fn test_transient_store_errors() {
        let conflict = StoreError::VersionConflict {
            customer_id: "CUST_001".to_string(),
            expected: 1,
            found: 2,
        };
        assert!(conflict.is_transient());
        assert!(RecordError::from(conflict).is_transient());

        let busy = StoreError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ));
        assert!(busy.is_transient());

        assert!(!StoreError::LockPoisoned.is_transient());
        assert!(!RecordError::InvalidTimestamp {
            value: "yesterday".to_string()
        }
        .is_transient());
    }
}
