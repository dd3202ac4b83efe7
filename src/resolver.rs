// 🔗 Identity Resolver - Which customer/card does a payload belong to?
//
// 1. Look up every tracking id present in the payload (any kind) in the
//    store's tracking index. All hits must agree on one card.
// 2. No hit: only providers that originate records may create a card.
//    The customer is taken from an explicit customer_id, else matched by
//    mobile, then by email, else created.

use log::debug;
use uuid::Uuid;

use crate::config::ProviderConfig;
use crate::error::RecordError;
use crate::extractor::ExtractedFields;
use crate::model::{attr, TrackingIdKind};
use crate::store::{CardLocator, ContactKind, CustomerStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub customer_id: String,
    pub card_id: String,
    pub is_new_card: bool,
    /// Customer document does not exist yet and must be created
    pub is_new_customer: bool,
}

pub fn resolve<S: CustomerStore + ?Sized>(
    provider: &ProviderConfig,
    fields: &ExtractedFields,
    store: &S,
) -> Result<Resolution, RecordError> {
    let tracking_ids = fields.tracking_ids();

    let mut matched: Option<CardLocator> = None;
    for (kind, value) in &tracking_ids {
        let locator = match store.find_card(*kind, value)? {
            Some(locator) => locator,
            None => continue,
        };
        if let Some(first) = &matched {
            if *first != locator {
                return Err(RecordError::AmbiguousIdentity {
                    first_card: first.card_id.clone(),
                    second_card: locator.card_id,
                });
            }
            continue;
        }
        debug!("{}={} resolves to card {}", kind, value, locator.card_id);
        matched = Some(locator);
    }

    if let Some(locator) = matched {
        return Ok(Resolution {
            customer_id: locator.customer_id,
            card_id: locator.card_id,
            is_new_card: false,
            is_new_customer: false,
        });
    }

    if !provider.identity.originates_records {
        return Err(RecordError::UnresolvedCard {
            provider: provider.provider_type,
            lookup: describe_lookup(&tracking_ids),
        });
    }

    let natural_key = provider.identity.natural_key;
    let key_value = fields
        .get_str(natural_key.as_str())
        .ok_or_else(|| RecordError::MissingRequiredField {
            rule: natural_key.as_str().to_string(),
        })?;

    let (customer_id, is_new_customer) = resolve_customer(fields, store)?;
    let card_id = new_card_id(&key_value);
    debug!(
        "New card {} for customer {} (new customer: {})",
        card_id, customer_id, is_new_customer
    );

    Ok(Resolution {
        customer_id,
        card_id,
        is_new_card: true,
        is_new_customer,
    })
}

fn resolve_customer<S: CustomerStore + ?Sized>(
    fields: &ExtractedFields,
    store: &S,
) -> Result<(String, bool), RecordError> {
    if let Some(customer_id) = fields.get_str(attr::CUSTOMER_ID) {
        let exists = store.contains_customer(&customer_id)?;
        return Ok((customer_id, !exists));
    }

    for (kind, attribute) in [(ContactKind::Mobile, attr::MOBILE), (ContactKind::Email, attr::EMAIL)] {
        if let Some(value) = fields.get_str(attribute) {
            if let Some(customer_id) = store.find_customer_by_contact(kind, &value)? {
                debug!("Matched customer {} by {}", customer_id, kind.as_str());
                return Ok((customer_id, false));
            }
        }
    }

    Ok((new_customer_id(), true))
}

fn short_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_uppercase()
}

pub fn new_customer_id() -> String {
    format!("CUST_{}", short_suffix())
}

/// Card ids are derived from the originating natural key plus a random suffix
pub fn new_card_id(natural_key: &str) -> String {
    format!("CARD_{}_{}", natural_key, short_suffix())
}

fn describe_lookup(tracking_ids: &[(TrackingIdKind, String)]) -> String {
    if tracking_ids.is_empty() {
        return "no tracking ids".to_string();
    }
    tracking_ids
        .iter()
        .map(|(kind, value)| format!("{}={}", kind, value))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigRegistry;
    use crate::model::{Card, Customer, ProviderType};
    use crate::store::MemoryStore;
    use chrono::Utc;
    use serde_json::json;

    fn registry() -> ConfigRegistry {
        ConfigRegistry::from_json_str(include_str!("../config/provider_config.json")).unwrap()
    }

    fn fields(pairs: &[(&str, &str)]) -> ExtractedFields {
        let mut fields = ExtractedFields::new();
        for (k, v) in pairs {
            fields.insert(*k, json!(v));
        }
        fields
    }

    fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        let mut customer = Customer::new("CUST_001", Utc::now());
        customer.customer_info.mobile = Some("+919876543210".to_string());
        customer.customer_info.email = Some("john@example.com".to_string());
        let mut card = Card::new("CARD_APP_001_AAAA", Utc::now());
        card.tracking_ids
            .insert(TrackingIdKind::ApplicationId, "APP_001".to_string());
        card.tracking_ids
            .insert(TrackingIdKind::ManufacturerOrderId, "MFG_001".to_string());
        customer.cards.push(card);
        store.save(&customer).unwrap();
        store
    }

    #[test]
    fn test_cross_kind_match() {
        let registry = registry();
        let store = seeded_store();
        let logistics = registry.get_config(ProviderType::Logistics).unwrap();

        let resolution = resolve(
            logistics,
            &fields(&[("logistics_tracking_number", "DTDC123"), ("manufacturer_order_id", "MFG_001")]),
            &store,
        )
        .unwrap();
        assert_eq!(resolution.card_id, "CARD_APP_001_AAAA");
        assert_eq!(resolution.customer_id, "CUST_001");
        assert!(!resolution.is_new_card);
    }

    #[test]
    fn test_non_originating_provider_unresolved() {
        let registry = registry();
        let store = seeded_store();
        let logistics = registry.get_config(ProviderType::Logistics).unwrap();

        let err = resolve(logistics, &fields(&[("logistics_tracking_number", "DTDC999")]), &store).unwrap_err();
        match err {
            RecordError::UnresolvedCard { provider, lookup } => {
                assert_eq!(provider, ProviderType::Logistics);
                assert_eq!(lookup, "logistics_tracking_number=DTDC999");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bank_creates_card_for_existing_customer_by_mobile() {
        let registry = registry();
        let store = seeded_store();
        let bank = registry.get_config(ProviderType::Bank).unwrap();

        let resolution = resolve(
            bank,
            &fields(&[("application_id", "APP_002"), ("mobile", "+919876543210")]),
            &store,
        )
        .unwrap();
        assert!(resolution.is_new_card);
        assert!(!resolution.is_new_customer);
        assert_eq!(resolution.customer_id, "CUST_001");
        assert!(resolution.card_id.starts_with("CARD_APP_002_"));
        assert_eq!(resolution.card_id.len(), "CARD_APP_002_".len() + 8);
    }

    #[test]
    fn test_email_match_and_new_customer() {
        let registry = registry();
        let store = seeded_store();
        let bank = registry.get_config(ProviderType::Bank).unwrap();

        let by_email = resolve(
            bank,
            &fields(&[("application_id", "APP_003"), ("mobile", "+919000000000"), ("email", "john@example.com")]),
            &store,
        )
        .unwrap();
        assert_eq!(by_email.customer_id, "CUST_001");

        let fresh = resolve(bank, &fields(&[("application_id", "APP_004")]), &store).unwrap();
        assert!(fresh.is_new_customer);
        assert!(fresh.customer_id.starts_with("CUST_"));
        assert_ne!(fresh.customer_id, "CUST_001");
    }

    #[test]
    fn test_explicit_customer_id() {
        let registry = registry();
        let store = seeded_store();
        let bank = registry.get_config(ProviderType::Bank).unwrap();

        let existing = resolve(
            bank,
            &fields(&[("application_id", "APP_005"), ("customer_id", "CUST_001")]),
            &store,
        )
        .unwrap();
        assert_eq!(existing.customer_id, "CUST_001");
        assert!(!existing.is_new_customer);

        let new = resolve(
            bank,
            &fields(&[("application_id", "APP_006"), ("customer_id", "CUST_777")]),
            &store,
        )
        .unwrap();
        assert_eq!(new.customer_id, "CUST_777");
        assert!(new.is_new_customer);
    }

    #[test]
    fn test_ambiguous_identity() {
        let registry = registry();
        let store = seeded_store();
        let mut other = Customer::new("CUST_002", Utc::now());
        let mut card = Card::new("CARD_APP_009_BBBB", Utc::now());
        card.tracking_ids
            .insert(TrackingIdKind::ApplicationId, "APP_009".to_string());
        other.cards.push(card);
        store.save(&other).unwrap();

        let mfg = registry.get_config(ProviderType::CardManufacturer).unwrap();
        let err = resolve(
            mfg,
            &fields(&[("application_id", "APP_009"), ("manufacturer_order_id", "MFG_001")]),
            &store,
        )
        .unwrap_err();
        assert_eq!(err.kind(), "AmbiguousIdentityError");
    }
}
