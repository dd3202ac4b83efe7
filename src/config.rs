// ⚙️ Config Registry - Provider mappings as data
// Field extraction paths, identity keys and status tables, per provider type.
//
// Loaded once per process and immutable afterwards. Everything that can be
// checked without a payload (path syntax, tracking-id kinds, stage names,
// mandatory mappings) is checked at load time.

use log::debug;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::model::{attr, ProviderType, Stage, TrackingIdKind};
use crate::path_query::PathQuery;

/// Upper bound for `delivery_estimate_days`
pub const MAX_DELIVERY_ESTIMATE_DAYS: i64 = 365;

// ============================================================================
// RAW DOCUMENT (as written in the JSON file)
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawFieldRule {
    target_attribute: String,
    path_query: String,
    #[serde(default)]
    fallback_paths: Vec<String>,
    #[serde(default)]
    required: bool,
}

#[derive(Debug, Deserialize)]
struct RawIdentityExtraction {
    natural_key: String,
    #[serde(default)]
    originates_records: bool,
}

#[derive(Debug, Deserialize)]
struct RawHistory {
    path_query: String,
    field_mapping: Vec<RawFieldRule>,
}

#[derive(Debug, Deserialize)]
struct RawStatusMapping {
    canonical_status: String,
    stage: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    terminal: bool,
    #[serde(default)]
    delivery_estimate_days: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawProviderConfig {
    #[serde(default)]
    provider_name: Option<String>,
    identity_extraction: RawIdentityExtraction,
    field_mapping: Vec<RawFieldRule>,
    #[serde(default)]
    history: Option<RawHistory>,
    status_mapping: BTreeMap<String, RawStatusMapping>,
}

// ============================================================================
// COMPILED CONFIGURATION
// ============================================================================

/// One extraction rule: target attribute <- first path that matches
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub target_attribute: String,
    /// Primary query first, then fallbacks in order
    pub paths: Vec<PathQuery>,
    pub required: bool,
}

impl FieldRule {
    pub fn new(target_attribute: &str, path: &str) -> Result<Self, crate::path_query::PathSyntaxError> {
        Ok(FieldRule {
            target_attribute: target_attribute.to_string(),
            paths: vec![PathQuery::parse(path)?],
            required: false,
        })
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Repeated-event section of a payload (e.g. a production history array)
#[derive(Debug, Clone)]
pub struct HistoryRule {
    pub path: PathQuery,
    pub field_mapping: Vec<FieldRule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityExtraction {
    /// Tracking-id kind this provider supplies as its natural key
    pub natural_key: TrackingIdKind,
    /// Whether an unmatched payload may create a new card
    pub originates_records: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMapping {
    pub canonical_status: String,
    pub stage: Stage,
    pub description: Option<String>,
    pub terminal: bool,
    pub delivery_estimate_days: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider_type: ProviderType,
    pub provider_name: String,
    pub identity: IdentityExtraction,
    pub field_mapping: Vec<FieldRule>,
    pub history: Option<HistoryRule>,
    /// Keyed by lower-cased raw status code
    status_mapping: HashMap<String, StatusMapping>,
}

impl ProviderConfig {
    /// Raw status codes match case-insensitively
    pub fn map_status(&self, raw_code: &str) -> Option<&StatusMapping> {
        self.status_mapping.get(&raw_code.trim().to_lowercase())
    }

    pub fn status_code_count(&self) -> usize {
        self.status_mapping.len()
    }

    fn all_rules(&self) -> impl Iterator<Item = &FieldRule> {
        self.field_mapping
            .iter()
            .chain(self.history.iter().flat_map(|h| h.field_mapping.iter()))
    }

    fn compile(provider_type: ProviderType, raw: RawProviderConfig) -> Result<Self, ConfigError> {
        let natural_key = TrackingIdKind::parse(&raw.identity_extraction.natural_key).ok_or_else(|| {
            ConfigError::UnknownTrackingKind {
                provider: provider_type,
                kind: raw.identity_extraction.natural_key.clone(),
            }
        })?;

        let field_mapping = compile_rules(provider_type, raw.field_mapping)?;
        let history = match raw.history {
            Some(h) => Some(HistoryRule {
                path: PathQuery::parse(&h.path_query).map_err(|source| ConfigError::InvalidPath {
                    provider: provider_type,
                    target: "history".to_string(),
                    source,
                })?,
                field_mapping: compile_rules(provider_type, h.field_mapping)?,
            }),
            None => None,
        };

        if raw.status_mapping.is_empty() {
            return Err(ConfigError::Invalid {
                provider: provider_type,
                reason: "status_mapping is empty".to_string(),
            });
        }

        let mut status_mapping = HashMap::new();
        for (code, mapping) in raw.status_mapping {
            let stage = Stage::parse(&mapping.stage).ok_or_else(|| ConfigError::UnknownStage {
                provider: provider_type,
                code: code.clone(),
                stage: mapping.stage.clone(),
            })?;
            if let Some(days) = mapping.delivery_estimate_days {
                if !(0..=MAX_DELIVERY_ESTIMATE_DAYS).contains(&days) {
                    return Err(ConfigError::Invalid {
                        provider: provider_type,
                        reason: format!(
                            "status `{code}`: delivery_estimate_days must be between 0 and {MAX_DELIVERY_ESTIMATE_DAYS}, got {days}"
                        ),
                    });
                }
            }
            let compiled = StatusMapping {
                canonical_status: mapping.canonical_status,
                stage,
                description: mapping.description,
                terminal: mapping.terminal,
                delivery_estimate_days: mapping.delivery_estimate_days,
            };
            if status_mapping.insert(code.trim().to_lowercase(), compiled).is_some() {
                return Err(ConfigError::Invalid {
                    provider: provider_type,
                    reason: format!("status code `{code}` is mapped more than once"),
                });
            }
        }

        let config = ProviderConfig {
            provider_type,
            provider_name: raw
                .provider_name
                .unwrap_or_else(|| provider_type.as_str().to_string()),
            identity: IdentityExtraction {
                natural_key,
                originates_records: raw.identity_extraction.originates_records,
            },
            field_mapping,
            history,
            status_mapping,
        };

        for required_target in [natural_key.as_str(), attr::STATUS] {
            if !config.all_rules().any(|r| r.target_attribute == required_target) {
                return Err(ConfigError::Invalid {
                    provider: provider_type,
                    reason: format!("no field_mapping rule targets `{required_target}`"),
                });
            }
        }

        Ok(config)
    }
}

fn compile_rules(provider: ProviderType, raw: Vec<RawFieldRule>) -> Result<Vec<FieldRule>, ConfigError> {
    raw.into_iter()
        .map(|rule| {
            if rule.target_attribute.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    provider,
                    reason: "field_mapping rule with empty target_attribute".to_string(),
                });
            }
            let paths = std::iter::once(&rule.path_query)
                .chain(rule.fallback_paths.iter())
                .map(|p| {
                    PathQuery::parse(p).map_err(|source| ConfigError::InvalidPath {
                        provider,
                        target: rule.target_attribute.clone(),
                        source,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(FieldRule {
                target_attribute: rule.target_attribute.trim().to_string(),
                paths,
                required: rule.required,
            })
        })
        .collect()
}

// ============================================================================
// REGISTRY
// ============================================================================

#[derive(Debug, Clone)]
pub struct ConfigRegistry {
    providers: HashMap<ProviderType, ProviderConfig>,
}

impl ConfigRegistry {
    /// Load and validate the configuration document from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let raw: BTreeMap<String, RawProviderConfig> = serde_json::from_str(content)?;

        let mut providers = HashMap::new();
        for (key, section) in raw {
            let provider_type: ProviderType = key.parse()?;
            let config = ProviderConfig::compile(provider_type, section)?;
            debug!(
                "Loaded {} config: {} rules, {} status codes",
                provider_type,
                config.field_mapping.len(),
                config.status_code_count()
            );
            providers.insert(provider_type, config);
        }

        Ok(ConfigRegistry { providers })
    }

    /// Fails with ConfigError when the provider type has no section
    pub fn get_config(&self, provider_type: ProviderType) -> Result<&ProviderConfig, ConfigError> {
        self.providers
            .get(&provider_type)
            .ok_or(ConfigError::MissingProvider(provider_type))
    }

    pub fn provider_types(&self) -> Vec<ProviderType> {
        let mut types: Vec<_> = self.providers.keys().copied().collect();
        types.sort();
        types
    }
}

// ============================================================================
// TESTS
// ============================================================================
