// 🔎 Field Extractor - Config-driven extraction from provider payloads
//
// Policy:
// - each rule tries its paths in order; the first path with a non-null
//   match wins, and within a path the first match in document order wins
// - no match → attribute is absent, unless the rule is required
// - strings are trimmed; blank strings count as absent
// - no other coercion: numbers stay numbers, objects stay objects

use serde_json::Value;
use std::collections::BTreeMap;

use crate::config::{FieldRule, ProviderConfig};
use crate::error::RecordError;
use crate::model::{attr, TrackingIdKind};
use crate::normalize::{normalize_email, normalize_mobile};

// ============================================================================
// EXTRACTED FIELDS
// ============================================================================

/// Target attribute → value, as pulled out of one payload (or one history item)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedFields {
    values: BTreeMap<String, Value>,
}

impl ExtractedFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, attribute: impl Into<String>, value: Value) {
        self.values.insert(attribute.into(), value);
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.values.get(attribute)
    }

    /// String view of scalar values (numbers and booleans are rendered)
    pub fn get_str(&self, attribute: &str) -> Option<String> {
        match self.values.get(attribute)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn contains(&self, attribute: &str) -> bool {
        self.values.contains_key(attribute)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Copy every attribute of `other` over this set
    pub fn overlay(&mut self, other: &ExtractedFields) {
        for (k, v) in &other.values {
            self.values.insert(k.clone(), v.clone());
        }
    }

    /// Tracking ids present in this set, in kind order
    pub fn tracking_ids(&self) -> Vec<(TrackingIdKind, String)> {
        TrackingIdKind::ALL
            .into_iter()
            .filter_map(|kind| self.get_str(kind.as_str()).map(|v| (kind, v)))
            .collect()
    }

    /// Attributes with no fixed meaning; they feed `application_metadata`
    pub fn auxiliary(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter().filter(|(k, _)| !attr::is_reserved(k))
    }

    /// Bring contact attributes to their canonical form in place
    pub fn normalize_contacts(&mut self) {
        if let Some(mobile) = self.get_str(attr::MOBILE) {
            self.insert(attr::MOBILE, Value::String(normalize_mobile(&mobile)));
        }
        if let Some(email) = self.get_str(attr::EMAIL) {
            self.insert(attr::EMAIL, Value::String(normalize_email(&email)));
        }
    }
}

// ============================================================================
// EXTRACTION
// ============================================================================

/// Apply `rules` to `payload`
pub fn extract(payload: &Value, rules: &[FieldRule]) -> Result<ExtractedFields, RecordError> {
    let mut fields = ExtractedFields::new();

    for rule in rules {
        let found = rule
            .paths
            .iter()
            .find_map(|path| path.find(payload).into_iter().find_map(clean_value));

        match found {
            Some(value) => fields.insert(rule.target_attribute.clone(), value),
            None if rule.required => {
                return Err(RecordError::MissingRequiredField {
                    rule: rule.target_attribute.clone(),
                })
            }
            None => {}
        }
    }

    Ok(fields)
}

/// One field set per timeline event carried by the payload.
///
/// Providers with a `history` section send a list of events; each matched
/// history item is extracted with the history rules and laid over the base
/// fields. Without history (or when the history query matches nothing) the
/// payload is a single event.
pub fn extract_events(payload: &Value, config: &ProviderConfig) -> Result<Vec<ExtractedFields>, RecordError> {
    let base = extract(payload, &config.field_mapping)?;

    let history = match &config.history {
        Some(history) => history,
        None => return Ok(vec![base]),
    };

    let items: Vec<&Value> = history.path.find(payload).into_iter().filter(|v| !v.is_null()).collect();
    if items.is_empty() {
        return Ok(vec![base]);
    }

    items
        .into_iter()
        .map(|item| {
            let item_fields = extract(item, &history.field_mapping)?;
            let mut fields = base.clone();
            fields.overlay(&item_fields);
            Ok(fields)
        })
        .collect()
}

fn clean_value(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(Value::String(trimmed.to_string()))
            }
        }
        other => Some(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigRegistry;
    use crate::model::ProviderType;
    use serde_json::json;

    fn registry() -> ConfigRegistry {
        ConfigRegistry::from_json_str(include_str!("../config/provider_config.json")).unwrap()
    }

    #[test]
    fn test_extract_trims_and_keeps_types() {
        let rules = vec![
            FieldRule::new("application_id", "$.application_id").unwrap().required(),
            FieldRule::new("priority", "$.priority").unwrap(),
            FieldRule::new("limit", "$.credit.limit").unwrap(),
        ];
        let payload = json!({ "application_id": "  APP_001 ", "credit": { "limit": 50000 } });

        let fields = extract(&payload, &rules).unwrap();
        assert_eq!(fields.get("application_id"), Some(&json!("APP_001")));
        assert_eq!(fields.get("limit"), Some(&json!(50000)));
        assert!(!fields.contains("priority"));
        assert_eq!(fields.get_str("limit"), Some("50000".to_string()));
    }

    #[test]
    fn test_missing_required_field_names_rule() {
        let rules = vec![FieldRule::new("application_id", "$.application_id").unwrap().required()];
        let err = extract(&json!({ "application_id": "   " }), &rules).unwrap_err();
        match err {
            RecordError::MissingRequiredField { rule } => assert_eq!(rule, "application_id"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_first_match_and_fallbacks() {
        let mut rule = FieldRule::new("timestamp", "$.approval_date").unwrap();
        rule.paths.push("$.application_date".parse().unwrap());
        let rules = vec![rule, FieldRule::new("status", "$..status").unwrap()];

        let payload = json!({
            "approval_date": null,
            "application_date": "2025-08-15T09:30:00Z",
            "events": [{ "status": "first" }, { "status": "second" }]
        });
        let fields = extract(&payload, &rules).unwrap();
        assert_eq!(fields.get_str("timestamp").as_deref(), Some("2025-08-15T09:30:00Z"));
        assert_eq!(fields.get_str("status").as_deref(), Some("first"));
    }

    #[test]
    fn test_tracking_ids_and_auxiliary() {
        let mut fields = ExtractedFields::new();
        fields.insert("application_id", json!("APP_001"));
        fields.insert("logistics_tracking_number", json!("DTDC123"));
        fields.insert("status", json!("delivered"));
        fields.insert("courier_partner", json!("DTDC"));

        assert_eq!(
            fields.tracking_ids(),
            vec![
                (TrackingIdKind::ApplicationId, "APP_001".to_string()),
                (TrackingIdKind::LogisticsTrackingNumber, "DTDC123".to_string()),
            ]
        );
        let aux: Vec<&String> = fields.auxiliary().map(|(k, _)| k).collect();
        assert_eq!(aux, vec!["courier_partner"]);
    }

    #[test]
    fn test_normalize_contacts() {
        let mut fields = ExtractedFields::new();
        fields.insert("mobile", json!("98765 43210"));
        fields.insert("email", json!("Jane@Example.com"));
        fields.normalize_contacts();
        assert_eq!(fields.get_str("mobile").as_deref(), Some("+919876543210"));
        assert_eq!(fields.get_str("email").as_deref(), Some("jane@example.com"));
    }

    #[test]
    fn test_history_expands_events() {
        let registry = registry();
        let config = registry.get_config(ProviderType::CardManufacturer).unwrap();
        let payload = json!({
            "bank_reference": "APP_001",
            "order_id": "MFG_ORDER_001",
            "batch_number": "BATCH_2025_08_001",
            "facility": "Chennai Production Unit",
            "production_history": [
                { "status": "received", "timestamp": "2025-08-16T08:00:00Z", "location": "Chennai Production Unit" },
                { "status": "dispatched", "timestamp": "2025-08-17T09:00:00Z", "location": "Chennai Hub",
                  "courier_partner": "DTDC", "tracking_number": "DTDC123456789" }
            ]
        });

        let events = extract_events(&payload, config).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].get_str("status").as_deref(), Some("received"));
        assert_eq!(events[0].get_str("manufacturer_order_id").as_deref(), Some("MFG_ORDER_001"));
        assert!(!events[0].contains("logistics_tracking_number"));
        assert_eq!(events[1].get_str("location").as_deref(), Some("Chennai Hub"));
        assert_eq!(
            events[1].get_str("logistics_tracking_number").as_deref(),
            Some("DTDC123456789")
        );
    }

    #[test]
    fn test_flat_payload_is_single_event() {
        let registry = registry();
        let config = registry.get_config(ProviderType::CardManufacturer).unwrap();
        let payload = json!({ "manufacturer_order_id": "MFG_001", "application_id": "APP_001", "status": "PRINTED" });

        let events = extract_events(&payload, config).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].get_str("manufacturer_order_id").as_deref(), Some("MFG_001"));
        assert_eq!(events[0].get_str("application_id").as_deref(), Some("APP_001"));
    }

    #[test]
    fn test_history_item_missing_required_status() {
        let registry = registry();
        let config = registry.get_config(ProviderType::Logistics).unwrap();
        let payload = json!({
            "awb_number": "DTDC123",
            "tracking_history": [ { "timestamp": "2025-08-17T10:00:00Z" } ]
        });
        let err = extract_events(&payload, config).unwrap_err();
        assert_eq!(err.kind(), "MissingRequiredFieldError");
    }
}
