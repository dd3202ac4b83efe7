// 📊 Analytics - Cross-record statistics over stored customers
// Read-only: computed from a full store scan, never written back.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::model::{Customer, ProviderType, Stage, TrackingStatus};
use crate::store::CustomerStore;

const UNKNOWN_BANK: &str = "Unknown";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BankPerformance {
    pub total_cards: usize,
    pub completed_cards: usize,
}

impl BankPerformance {
    /// Share of cards that reached a terminal status (0.0 - 1.0)
    pub fn completion_rate(&self) -> f64 {
        if self.total_cards == 0 {
            0.0
        } else {
            self.completed_cards as f64 / self.total_cards as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyticsReport {
    pub total_customers: usize,
    pub total_cards: usize,
    /// Cards by current canonical status
    pub status_counts: BTreeMap<String, usize>,
    /// Cards by current stage
    pub stage_counts: BTreeMap<Stage, usize>,
    /// Timeline events by the provider that reported them
    pub provider_counts: BTreeMap<ProviderType, usize>,
    pub bank_performance: BTreeMap<String, BankPerformance>,
}

impl AnalyticsReport {
    pub fn from_customers(customers: &[Customer]) -> Self {
        let mut report = AnalyticsReport {
            total_customers: customers.len(),
            ..Default::default()
        };

        for card in customers.iter().flat_map(|c| c.cards.iter()) {
            report.total_cards += 1;

            if let Some(current) = &card.current_status {
                *report.status_counts.entry(current.status.clone()).or_default() += 1;
                *report.stage_counts.entry(current.stage).or_default() += 1;
            }

            for event in card.timeline.values().flatten() {
                *report.provider_counts.entry(event.source_provider).or_default() += 1;
            }

            let bank = card
                .card_info
                .bank_name
                .clone()
                .unwrap_or_else(|| UNKNOWN_BANK.to_string());
            let performance = report.bank_performance.entry(bank).or_default();
            performance.total_cards += 1;
            if card.tracking_status == TrackingStatus::Completed {
                performance.completed_cards += 1;
            }
        }

        report
    }

    pub fn from_store<S: CustomerStore + ?Sized>(store: &S) -> Result<Self, StoreError> {
        Ok(Self::from_customers(&store.scan()?))
    }

    pub fn summary(&self) -> String {
        let completed: usize = self.bank_performance.values().map(|b| b.completed_cards).sum();
        format!(
            "{} customers, {} cards | {} completed, {} distinct statuses",
            self.total_customers,
            self.total_cards,
            completed,
            self.status_counts.len()
        )
    }
}
