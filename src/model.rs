// 🗂️ Card Tracking Model - Customer aggregate, cards and timelines
// One Customer document owns its Cards; each Card owns its tracking ids and timeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

// ============================================================================
// PROVIDER TYPE
// ============================================================================

/// ProviderType - Which kind of upstream system produced a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    Bank,
    CardManufacturer,
    Logistics,
}

impl ProviderType {
    pub const ALL: [ProviderType; 3] = [
        ProviderType::Bank,
        ProviderType::CardManufacturer,
        ProviderType::Logistics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Bank => "bank",
            ProviderType::CardManufacturer => "card_manufacturer",
            ProviderType::Logistics => "logistics",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderType::ALL
            .into_iter()
            .find(|p| p.as_str() == s.trim())
            .ok_or_else(|| ConfigError::UnknownProvider(s.to_string()))
    }
}

// ============================================================================
// STAGE
// ============================================================================

/// Stage - The three lifecycle phases of a card, totally ordered.
///
/// The derive order of the variants IS the stage precedence:
/// `ApplicationAndApproval < CardProduction < ShippingAndDelivery`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ApplicationAndApproval,
    CardProduction,
    ShippingAndDelivery,
}

impl Stage {
    pub const ALL: [Stage; 3] = [
        Stage::ApplicationAndApproval,
        Stage::CardProduction,
        Stage::ShippingAndDelivery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ApplicationAndApproval => "application_and_approval",
            Stage::CardProduction => "card_production",
            Stage::ShippingAndDelivery => "shipping_and_delivery",
        }
    }

    pub fn parse(s: &str) -> Option<Stage> {
        Stage::ALL.into_iter().find(|stage| stage.as_str() == s.trim())
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TRACKING-ID KIND
// ============================================================================

/// TrackingIdKind - Category of external identifier used to correlate payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingIdKind {
    ApplicationId,
    ManufacturerOrderId,
    LogisticsTrackingNumber,
}

impl TrackingIdKind {
    pub const ALL: [TrackingIdKind; 3] = [
        TrackingIdKind::ApplicationId,
        TrackingIdKind::ManufacturerOrderId,
        TrackingIdKind::LogisticsTrackingNumber,
    ];

    /// Name of the kind; also the target attribute that carries it
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingIdKind::ApplicationId => "application_id",
            TrackingIdKind::ManufacturerOrderId => "manufacturer_order_id",
            TrackingIdKind::LogisticsTrackingNumber => "logistics_tracking_number",
        }
    }

    pub fn parse(s: &str) -> Option<TrackingIdKind> {
        TrackingIdKind::ALL.into_iter().find(|kind| kind.as_str() == s.trim())
    }
}

impl fmt::Display for TrackingIdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// WELL-KNOWN ATTRIBUTES
// ============================================================================

/// Target attribute names with a fixed meaning to the merge engine.
/// Anything else a provider extracts is auxiliary and lands in
/// `Card::application_metadata`.
pub mod attr {
    pub const STATUS: &str = "status";
    pub const TIMESTAMP: &str = "timestamp";
    pub const LOCATION: &str = "location";
    pub const CUSTOMER_ID: &str = "customer_id";
    pub const CUSTOMER_NAME: &str = "customer_name";
    pub const MOBILE: &str = "mobile";
    pub const EMAIL: &str = "email";
    pub const BANK_NAME: &str = "bank_name";
    pub const CARD_TYPE: &str = "card_type";
    pub const CARD_VARIANT: &str = "card_variant";

    pub const RESERVED: [&str; 13] = [
        STATUS,
        TIMESTAMP,
        LOCATION,
        CUSTOMER_ID,
        CUSTOMER_NAME,
        MOBILE,
        EMAIL,
        BANK_NAME,
        CARD_TYPE,
        CARD_VARIANT,
        "application_id",
        "manufacturer_order_id",
        "logistics_tracking_number",
    ];

    pub fn is_reserved(name: &str) -> bool {
        RESERVED.contains(&name)
    }
}

// ============================================================================
// TIMELINE EVENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Canonical status after mapping
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub location: Option<String>,
    pub source_provider: ProviderType,
    /// Status code exactly as the provider sent it
    pub raw_status_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TimelineEvent {
    /// Same timestamp and same raw status code = same event.
    /// Codes compare case-insensitively, like the status mapping lookup.
    pub fn is_duplicate_of(&self, other: &TimelineEvent) -> bool {
        self.timestamp == other.timestamp && self.raw_status_code.eq_ignore_ascii_case(&other.raw_status_code)
    }

    /// Same raw status code at the same location, regardless of time
    pub fn repeats(&self, other: &TimelineEvent) -> bool {
        self.raw_status_code.eq_ignore_ascii_case(&other.raw_status_code) && self.location == other.location
    }
}

// ============================================================================
// CARD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentStatus {
    pub status: String,
    pub stage: Stage,
    pub location: Option<String>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    #[default]
    Active,
    Completed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardInfo {
    pub bank_name: Option<String>,
    pub card_type: Option<String>,
    pub card_variant: Option<String>,
}

/// Creation / last-change timestamps shared by customers and cards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl RecordMetadata {
    pub fn new(now: DateTime<Utc>) -> Self {
        RecordMetadata {
            created_at: now,
            last_updated: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    /// Stable once assigned
    pub card_id: String,

    #[serde(default)]
    pub tracking_ids: BTreeMap<TrackingIdKind, String>,

    #[serde(default)]
    pub tracking_status: TrackingStatus,

    #[serde(default)]
    pub card_info: CardInfo,

    /// None only until the first event has been merged
    pub current_status: Option<CurrentStatus>,

    /// Per-stage event lists, each kept in timestamp order
    #[serde(default)]
    pub timeline: BTreeMap<Stage, Vec<TimelineEvent>>,

    #[serde(default)]
    pub estimated_delivery: Option<DateTime<Utc>>,

    /// Auxiliary attributes (courier_partner, production_batch, ...).
    /// Later values for the same key overwrite earlier ones.
    #[serde(default)]
    pub application_metadata: BTreeMap<String, Value>,

    pub metadata: RecordMetadata,
}

impl Card {
    pub fn new(card_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Card {
            card_id: card_id.into(),
            tracking_ids: BTreeMap::new(),
            tracking_status: TrackingStatus::Active,
            card_info: CardInfo::default(),
            current_status: None,
            timeline: Stage::ALL.into_iter().map(|s| (s, Vec::new())).collect(),
            estimated_delivery: None,
            application_metadata: BTreeMap::new(),
            metadata: RecordMetadata::new(now),
        }
    }

    pub fn tracking_id(&self, kind: TrackingIdKind) -> Option<&str> {
        self.tracking_ids.get(&kind).map(String::as_str)
    }

    pub fn current_stage(&self) -> Option<Stage> {
        self.current_status.as_ref().map(|c| c.stage)
    }

    pub fn events(&self, stage: Stage) -> &[TimelineEvent] {
        self.timeline.get(&stage).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Highest stage that holds at least one event
    pub fn highest_timeline_stage(&self) -> Option<Stage> {
        self.timeline
            .iter()
            .filter(|(_, events)| !events.is_empty())
            .map(|(stage, _)| *stage)
            .max()
    }

    pub fn event_count(&self) -> usize {
        self.timeline.values().map(Vec::len).sum()
    }
}

// ============================================================================
// CUSTOMER
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub name: Option<String>,
    /// Normalised to +91XXXXXXXXXX where possible
    pub mobile: Option<String>,
    pub email: Option<String>,
}

/// Customer - The aggregate root persisted as one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: String,

    #[serde(default)]
    pub customer_info: CustomerInfo,

    /// Insertion order = first-seen order
    #[serde(default)]
    pub cards: Vec<Card>,

    /// Store version this aggregate was loaded at (0 = never saved)
    #[serde(default)]
    pub version: i64,

    pub metadata: RecordMetadata,
}

impl Customer {
    pub fn new(customer_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Customer {
            customer_id: customer_id.into(),
            customer_info: CustomerInfo::default(),
            cards: Vec::new(),
            version: 0,
            metadata: RecordMetadata::new(now),
        }
    }

    pub fn card(&self, card_id: &str) -> Option<&Card> {
        self.cards.iter().find(|c| c.card_id == card_id)
    }
}
