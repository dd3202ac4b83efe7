// ⚙️ Processing Pipeline - payload file → extract → resolve → merge → save
//
// One record at a time. A failing record is reported and skipped; only
// configuration problems and unreadable input files abort the run.

use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::analytics::AnalyticsReport;
use crate::config::{ConfigRegistry, ProviderConfig};
use crate::error::{ProcessError, RecordError, StoreError};
use crate::extractor::{extract_events, ExtractedFields};
use crate::merger::{merge, MergeOutcome};
use crate::model::{Customer, ProviderType};
use crate::resolver::resolve;
use crate::store::CustomerStore;

const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(50);

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A new card was created
    Created,
    /// An existing card received at least one new event
    Updated,
    /// Every event was already recorded; nothing written
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordFailure {
    pub record_ref: String,
    pub error_kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingReport {
    pub source: String,
    pub provider_type: ProviderType,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cards_created: usize,
    /// Succeeded records that changed nothing
    pub duplicates: usize,
    pub errors: Vec<RecordFailure>,
}

impl ProcessingReport {
    fn new(source: &str, provider_type: ProviderType) -> Self {
        ProcessingReport {
            source: source.to_string(),
            provider_type,
            total: 0,
            succeeded: 0,
            failed: 0,
            cards_created: 0,
            duplicates: 0,
            errors: Vec::new(),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} ({}): {} records | {} succeeded ({} new cards, {} duplicates), {} failed",
            self.source,
            self.provider_type,
            self.total,
            self.succeeded,
            self.cards_created,
            self.duplicates,
            self.failed
        )
    }

    fn record(&mut self, record_ref: String, result: Result<RecordOutcome, RecordError>) {
        self.total += 1;
        match result {
            Ok(outcome) => {
                self.succeeded += 1;
                match outcome {
                    RecordOutcome::Created => self.cards_created += 1,
                    RecordOutcome::Duplicate => {
                        warn!("{}: already processed, skipped", record_ref);
                        self.duplicates += 1;
                    }
                    RecordOutcome::Updated => {}
                }
            }
            Err(err) => {
                warn!("{}: {} - {}", record_ref, err.kind(), err);
                self.failed += 1;
                self.errors.push(RecordFailure {
                    record_ref,
                    error_kind: err.kind().to_string(),
                    message: err.to_string(),
                });
            }
        }
    }
}

// ============================================================================
// PROCESSOR
// ============================================================================

pub struct CardTrackingProcessor<S: CustomerStore> {
    registry: ConfigRegistry,
    store: S,
    retry_backoff: Duration,
}

impl<S: CustomerStore> CardTrackingProcessor<S> {
    pub fn new(registry: ConfigRegistry, store: S) -> Self {
        CardTrackingProcessor {
            registry,
            store,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Process every record of a payload file for one provider type
    pub fn process(&self, file_path: &Path, provider_type: ProviderType) -> Result<ProcessingReport, ProcessError> {
        // Configuration is a precondition: check it before touching the input
        self.registry.get_config(provider_type)?;

        let records = load_records(file_path)?;
        let source = file_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_path.display().to_string());

        self.process_records(&source, &records, provider_type)
    }

    pub fn process_records(
        &self,
        source: &str,
        records: &[Value],
        provider_type: ProviderType,
    ) -> Result<ProcessingReport, ProcessError> {
        let config = self.registry.get_config(provider_type)?;
        info!("Processing {} {} records from {}", records.len(), provider_type, source);

        let mut report = ProcessingReport::new(source, provider_type);
        for (index, payload) in records.iter().enumerate() {
            let record_ref = format!("{}[{}]", source, index);
            report.record(record_ref, self.process_record(config, payload));
        }

        info!("{}", report.summary());
        Ok(report)
    }

    /// One payload, all-or-nothing. Transient store failures are retried once.
    pub fn process_record(&self, config: &ProviderConfig, payload: &Value) -> Result<RecordOutcome, RecordError> {
        let mut events = extract_events(payload, config)?;
        for event in events.iter_mut() {
            event.normalize_contacts();
        }

        match self.apply(config, &events) {
            Err(err) if err.is_transient() => {
                warn!("Transient store failure ({}), retrying in {:?}", err, self.retry_backoff);
                thread::sleep(self.retry_backoff);
                self.apply(config, &events)
            }
            result => result,
        }
    }

    pub fn analytics(&self) -> Result<AnalyticsReport, StoreError> {
        AnalyticsReport::from_store(&self.store)
    }

    /// resolve → load → merge every event → save
    fn apply(&self, config: &ProviderConfig, events: &[ExtractedFields]) -> Result<RecordOutcome, RecordError> {
        let mut identity = ExtractedFields::new();
        for event in events {
            identity.overlay(event);
        }

        let resolution = resolve(config, &identity, &self.store)?;
        let now = Utc::now();

        let loaded = match self.store.load(&resolution.customer_id)? {
            Some(customer) => customer,
            None if resolution.is_new_customer => Customer::new(resolution.customer_id.clone(), now),
            None => {
                return Err(RecordError::UnresolvedCard {
                    provider: config.provider_type,
                    lookup: format!("customer {} is not stored", resolution.customer_id),
                })
            }
        };

        let mut customer = loaded.clone();
        let mut appended = 0;
        for event in events {
            let result = merge(&customer, &resolution.card_id, event, config, now)?;
            if let MergeOutcome::Appended { .. } = result.outcome {
                appended += 1;
            }
            customer = result.customer;
        }

        if customer == loaded {
            return Ok(RecordOutcome::Duplicate);
        }

        self.store.save(&customer)?;
        debug!(
            "Customer {}: {} of {} events appended to {}",
            customer.customer_id,
            appended,
            events.len(),
            resolution.card_id
        );

        if loaded.version == 0 {
            info!("Created customer {}", customer.customer_id);
        }
        if resolution.is_new_card {
            info!("Created card {} for customer {}", resolution.card_id, customer.customer_id);
            Ok(RecordOutcome::Created)
        } else {
            Ok(RecordOutcome::Updated)
        }
    }
}

/// A JSON array of records, or a single object treated as one record
pub fn load_records(path: &Path) -> Result<Vec<Value>, ProcessError> {
    let content = fs::read_to_string(path).map_err(|source| ProcessError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&content).map_err(|source| ProcessError::InvalidInput {
        path: path.to_path_buf(),
        source,
    })?;

    match value {
        Value::Array(records) => Ok(records),
        Value::Object(_) => Ok(vec![value]),
        _ => Err(ProcessError::UnsupportedInput {
            path: path.to_path_buf(),
        }),
    }
}
