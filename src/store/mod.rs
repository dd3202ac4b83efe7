// 💾 Store Adapter - Customer documents keyed by customer id
//
// The store is the only writer of persisted state. Besides load/save it
// maintains two secondary indexes alongside the documents:
// - tracking index: (tracking-id kind, value) → (customer id, card id)
// - contact index: (mobile | email, value) → customer id
// Both are updated in the same atomic step as the document they describe.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{setup_database, SqliteStore};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{Customer, TrackingIdKind};

/// Where a card lives
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardLocator {
    pub customer_id: String,
    pub card_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContactKind {
    Mobile,
    Email,
}

impl ContactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactKind::Mobile => "mobile",
            ContactKind::Email => "email",
        }
    }
}

/// Document-store contract used by the processing pipeline.
///
/// `save` must be atomic per customer and must reject a document whose
/// `version` no longer matches the stored one (someone else saved in
/// between) with `StoreError::VersionConflict`.
pub trait CustomerStore {
    fn load(&self, customer_id: &str) -> Result<Option<Customer>, StoreError>;

    fn save(&self, customer: &Customer) -> Result<(), StoreError>;

    fn find_card(&self, kind: TrackingIdKind, value: &str) -> Result<Option<CardLocator>, StoreError>;

    fn find_customer_by_contact(&self, kind: ContactKind, value: &str) -> Result<Option<String>, StoreError>;

    /// Full read-only scan, ordered by customer id
    fn scan(&self) -> Result<Vec<Customer>, StoreError>;

    fn contains_customer(&self, customer_id: &str) -> Result<bool, StoreError> {
        Ok(self.load(customer_id)?.is_some())
    }
}

/// Contact index entries a customer document should produce
pub(crate) fn contact_entries(customer: &Customer) -> Vec<(ContactKind, String)> {
    let info = &customer.customer_info;
    [
        (ContactKind::Mobile, info.mobile.as_ref()),
        (ContactKind::Email, info.email.as_ref()),
    ]
    .into_iter()
    .filter_map(|(kind, value)| value.filter(|v| !v.is_empty()).map(|v| (kind, v.clone())))
    .collect()
}
