// 🔀 Record Merger - Timeline engine over the Customer aggregate
//
// merge() is pure: it takes the loaded aggregate by reference and returns a
// new one. Any error leaves the caller's copy untouched, so a failed record
// never reaches the store half-applied.

use chrono::{DateTime, Duration, Utc};
use log::debug;

use crate::config::ProviderConfig;
use crate::error::RecordError;
use crate::extractor::ExtractedFields;
use crate::model::{attr, Card, CurrentStatus, Customer, ProviderType, Stage, TimelineEvent, TrackingStatus};
use crate::normalize::timestamp_from_value;

// ============================================================================
// STATUS PRECEDENCE
// ============================================================================

/// Next (stage, status) pointer of a card.
///
/// The incoming pair wins when there is no current status or when its stage
/// is at least the current one (latest processed wins within a stage). A
/// strictly lower stage never moves the pointer backwards.
pub fn next_status<'a>(current: Option<(Stage, &'a str)>, incoming: (Stage, &'a str)) -> (Stage, &'a str) {
    match current {
        Some(current) if current.0 > incoming.0 => current,
        _ => incoming,
    }
}

// ============================================================================
// MERGE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Event added to the timeline of `stage`
    Appended { stage: Stage, status_changed: bool },
    /// Event already recorded for that stage. Tracking ids it carried that
    /// the card did not hold yet are still attached.
    Duplicate { tracking_ids_added: usize },
}

#[derive(Debug, Clone)]
pub struct MergeResult {
    pub customer: Customer,
    pub outcome: MergeOutcome,
}

/// Merge one extracted event into `card_id` of `customer`.
/// The card is created if the customer does not hold it yet.
pub fn merge(
    customer: &Customer,
    card_id: &str,
    fields: &ExtractedFields,
    provider: &ProviderConfig,
    processed_at: DateTime<Utc>,
) -> Result<MergeResult, RecordError> {
    let raw_code = fields
        .get_str(attr::STATUS)
        .ok_or_else(|| RecordError::MissingRequiredField {
            rule: attr::STATUS.to_string(),
        })?;
    let mapping = provider
        .map_status(&raw_code)
        .ok_or_else(|| RecordError::UnknownStatusCode {
            provider: provider.provider_type,
            code: raw_code.clone(),
        })?;

    let dated = fields.get(attr::TIMESTAMP).is_some();
    let timestamp = match fields.get(attr::TIMESTAMP) {
        Some(value) => timestamp_from_value(value).ok_or_else(|| RecordError::InvalidTimestamp {
            value: fields.get_str(attr::TIMESTAMP).unwrap_or_else(|| value.to_string()),
        })?,
        None => processed_at,
    };

    let mut updated = customer.clone();
    let index = match updated.cards.iter().position(|c| c.card_id == card_id) {
        Some(index) => index,
        None => {
            updated.cards.push(Card::new(card_id, processed_at));
            updated.cards.len() - 1
        }
    };
    let card = &mut updated.cards[index];

    let tracking_ids_added = merge_tracking_ids(card, fields)?;

    let event = TimelineEvent {
        status: mapping.canonical_status.clone(),
        timestamp,
        location: fields.get_str(attr::LOCATION),
        source_provider: provider.provider_type,
        raw_status_code: raw_code,
        description: mapping.description.clone(),
    };

    let events = card.timeline.entry(mapping.stage).or_default();
    // Undated events carry the processing time, so a resubmission never
    // matches on timestamp; compare against the stage's latest event instead.
    let duplicate = if dated {
        events.iter().any(|e| e.is_duplicate_of(&event))
    } else {
        events.last().is_some_and(|e| e.repeats(&event))
    };
    if duplicate {
        debug!(
            "Card {}: {} at {} already recorded in {} ({} tracking ids added)",
            card.card_id, event.raw_status_code, event.timestamp, mapping.stage, tracking_ids_added
        );
        let outcome = MergeOutcome::Duplicate { tracking_ids_added };
        return Ok(finish(customer, updated, outcome, processed_at));
    }
    let position = events.partition_point(|e| e.timestamp <= event.timestamp);
    events.insert(position, event.clone());

    let current = card
        .current_status
        .as_ref()
        .map(|c| (c.stage, c.status.as_str()));
    let incoming = (mapping.stage, mapping.canonical_status.as_str());
    let advance = next_status(current, incoming) == incoming;
    let status_changed = advance && current != Some(incoming);

    if advance {
        card.current_status = Some(CurrentStatus {
            status: mapping.canonical_status.clone(),
            stage: mapping.stage,
            location: event.location.clone(),
            last_updated: timestamp,
        });
        card.tracking_status = if mapping.terminal {
            TrackingStatus::Completed
        } else {
            TrackingStatus::Active
        };
        if let Some(days) = mapping.delivery_estimate_days {
            let estimate = Duration::try_days(days)
                .and_then(|offset| timestamp.checked_add_signed(offset))
                .ok_or_else(|| RecordError::InvalidTimestamp {
                    value: fields
                        .get_str(attr::TIMESTAMP)
                        .unwrap_or_else(|| timestamp.to_rfc3339()),
                })?;
            card.estimated_delivery = Some(estimate);
        }
        debug!("Card {} now {} ({})", card.card_id, mapping.canonical_status, mapping.stage);
    } else {
        debug!(
            "Card {}: late {} event recorded, current status kept",
            card.card_id, mapping.stage
        );
    }

    merge_card_info(card, fields, provider);
    for (key, value) in fields.auxiliary() {
        card.application_metadata.insert(key.clone(), value.clone());
    }
    merge_customer_info(&mut updated, fields);

    let outcome = MergeOutcome::Appended {
        stage: mapping.stage,
        status_changed,
    };
    Ok(finish(customer, updated, outcome, processed_at))
}

/// Attach tracking ids the card does not hold yet; returns how many were added
fn merge_tracking_ids(card: &mut Card, fields: &ExtractedFields) -> Result<usize, RecordError> {
    let mut added = 0;
    for (kind, value) in fields.tracking_ids() {
        match card.tracking_ids.get(&kind) {
            Some(existing) if *existing != value => {
                return Err(RecordError::TrackingIdConflict {
                    card_id: card.card_id.clone(),
                    kind,
                    existing: existing.clone(),
                    incoming: value,
                });
            }
            Some(_) => {}
            None => {
                card.tracking_ids.insert(kind, value);
                added += 1;
            }
        }
    }
    Ok(added)
}

fn merge_card_info(card: &mut Card, fields: &ExtractedFields, provider: &ProviderConfig) {
    let info = &mut card.card_info;
    if let Some(bank_name) = fields.get_str(attr::BANK_NAME) {
        info.bank_name = Some(bank_name);
    } else if provider.provider_type == ProviderType::Bank && info.bank_name.is_none() {
        info.bank_name = Some(provider.provider_name.clone());
    }
    if let Some(card_type) = fields.get_str(attr::CARD_TYPE) {
        info.card_type = Some(card_type);
    }
    if let Some(card_variant) = fields.get_str(attr::CARD_VARIANT) {
        info.card_variant = Some(card_variant);
    }
}

fn merge_customer_info(customer: &mut Customer, fields: &ExtractedFields) {
    let info = &mut customer.customer_info;
    for (attribute, slot) in [
        (attr::CUSTOMER_NAME, &mut info.name),
        (attr::MOBILE, &mut info.mobile),
        (attr::EMAIL, &mut info.email),
    ] {
        if let Some(value) = fields.get_str(attribute) {
            *slot = Some(value);
        }
    }
}

/// Stamp last_updated only when something actually changed
fn finish(original: &Customer, mut updated: Customer, outcome: MergeOutcome, now: DateTime<Utc>) -> MergeResult {
    if updated != *original {
        updated.metadata.last_updated = now;
        for card in updated.cards.iter_mut() {
            let before = original.card(&card.card_id);
            if before != Some(&*card) {
                card.metadata.last_updated = now;
            }
        }
    }
    MergeResult {
        customer: updated,
        outcome,
    }
}
