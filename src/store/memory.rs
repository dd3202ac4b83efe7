// 🧠 In-memory Store - Same contract as SqliteStore, no persistence

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{contact_entries, CardLocator, ContactKind, CustomerStore};
use crate::error::StoreError;
use crate::model::{Customer, TrackingIdKind};

#[derive(Debug, Default)]
struct MemoryState {
    customers: HashMap<String, Customer>,
    tracking: HashMap<(TrackingIdKind, String), CardLocator>,
    contacts: HashMap<(ContactKind, String), String>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.customers.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>, StoreError> {
        self.state.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>, StoreError> {
        self.state.write().map_err(|_| StoreError::LockPoisoned)
    }
}

impl CustomerStore for MemoryStore {
    fn load(&self, customer_id: &str) -> Result<Option<Customer>, StoreError> {
        Ok(self.read()?.customers.get(customer_id).cloned())
    }

    fn save(&self, customer: &Customer) -> Result<(), StoreError> {
        let mut state = self.write()?;

        let found = state
            .customers
            .get(&customer.customer_id)
            .map(|c| c.version)
            .unwrap_or(0);
        if found != customer.version {
            return Err(StoreError::VersionConflict {
                customer_id: customer.customer_id.clone(),
                expected: customer.version,
                found,
            });
        }

        // Validate every index entry before touching anything
        let mut new_entries = Vec::new();
        for card in &customer.cards {
            for (kind, value) in &card.tracking_ids {
                let locator = CardLocator {
                    customer_id: customer.customer_id.clone(),
                    card_id: card.card_id.clone(),
                };
                match state.tracking.get(&(*kind, value.clone())) {
                    Some(existing) if *existing != locator => {
                        return Err(StoreError::IndexConflict {
                            kind: *kind,
                            value: value.clone(),
                            existing_card: existing.card_id.clone(),
                            card_id: card.card_id.clone(),
                        });
                    }
                    Some(_) => {}
                    None => new_entries.push(((*kind, value.clone()), locator)),
                }
            }
        }

        let mut next = customer.clone();
        next.version = found + 1;

        state.tracking.extend(new_entries);
        state.contacts.retain(|_, owner| *owner != next.customer_id);
        for (kind, value) in contact_entries(&next) {
            state.contacts.insert((kind, value), next.customer_id.clone());
        }
        state.customers.insert(next.customer_id.clone(), next);
        Ok(())
    }

    fn find_card(&self, kind: TrackingIdKind, value: &str) -> Result<Option<CardLocator>, StoreError> {
        Ok(self.read()?.tracking.get(&(kind, value.to_string())).cloned())
    }

    fn find_customer_by_contact(&self, kind: ContactKind, value: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read()?.contacts.get(&(kind, value.to_string())).cloned())
    }

    fn scan(&self) -> Result<Vec<Customer>, StoreError> {
        let mut customers: Vec<Customer> = self.read()?.customers.values().cloned().collect();
        customers.sort_by(|a, b| a.customer_id.cmp(&b.customer_id));
        Ok(customers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Card;
    use chrono::{TimeZone, Utc};

    fn customer(customer_id: &str, card_id: &str, application_id: &str) -> Customer {
        let now = Utc.with_ymd_and_hms(2025, 8, 15, 9, 30, 0).unwrap();
        let mut customer = Customer::new(customer_id, now);
        customer.customer_info.email = Some("jane@example.com".to_string());
        let mut card = Card::new(card_id, now);
        card.tracking_ids
            .insert(TrackingIdKind::ApplicationId, application_id.to_string());
        customer.cards.push(card);
        customer
    }

    #[test]
    fn test_changed_email_replaces_old_index_entry() {
        let store = MemoryStore::new();
        store.save(&customer("CUST_001", "CARD_A", "APP_001")).unwrap();

        let mut updated = store.load("CUST_001").unwrap().unwrap();
        updated.customer_info.email = Some("jane.doe@example.com".to_string());
        store.save(&updated).unwrap();

        assert_eq!(
            store
                .find_customer_by_contact(ContactKind::Email, "jane@example.com")
                .unwrap(),
            None
        );
        assert_eq!(
            store
                .find_customer_by_contact(ContactKind::Email, "jane.doe@example.com")
                .unwrap()
                .as_deref(),
            Some("CUST_001")
        );
    }

    #[test]
    fn test_save_bumps_version_and_indexes() {
        let store = MemoryStore::new();
        assert!(store.is_empty().unwrap());

        store.save(&customer("CUST_001", "CARD_A", "APP_001")).unwrap();

        let loaded = store.load("CUST_001").unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(
            store.find_card(TrackingIdKind::ApplicationId, "APP_001").unwrap(),
            Some(CardLocator {
                customer_id: "CUST_001".to_string(),
                card_id: "CARD_A".to_string()
            })
        );
        assert_eq!(
            store
                .find_customer_by_contact(ContactKind::Email, "jane@example.com")
                .unwrap()
                .as_deref(),
            Some("CUST_001")
        );
    }

    #[test]
    fn test_version_conflict() {
        let store = MemoryStore::new();
        store.save(&customer("CUST_001", "CARD_A", "APP_001")).unwrap();

        // Never-saved copy claims version 0
        let err = store.save(&customer("CUST_001", "CARD_A", "APP_001")).unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { expected: 0, found: 1, .. }));
    }

    #[test]
    fn test_index_conflict_leaves_state_untouched() {
        let store = MemoryStore::new();
        store.save(&customer("CUST_001", "CARD_A", "APP_001")).unwrap();

        let err = store.save(&customer("CUST_002", "CARD_B", "APP_001")).unwrap_err();
        assert!(matches!(err, StoreError::IndexConflict { .. }));
        assert!(store.load("CUST_002").unwrap().is_none());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_scan_sorted() {
        let store = MemoryStore::new();
        store.save(&customer("CUST_B", "CARD_B", "APP_002")).unwrap();
        store.save(&customer("CUST_A", "CARD_A", "APP_001")).unwrap();

        let ids: Vec<String> = store.scan().unwrap().into_iter().map(|c| c.customer_id).collect();
        assert_eq!(ids, vec!["CUST_A", "CUST_B"]);
    }
}
