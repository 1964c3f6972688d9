//! Configuration loading, validation, and management for PromptSmith.
//!
//! Loads configuration from `~/.promptsmith/config.toml` with environment
//! variable overrides. Validates all settings before an engine is built.

use promptsmith_core::AdapterRole;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.promptsmith/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding category and template documents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definitions_dir: Option<PathBuf>,

    /// Request parsing (markers, keyword weights, confidence floor)
    #[serde(default)]
    pub parser: ParserConfig,

    /// Adapter stacking policy
    #[serde(default)]
    pub composition: CompositionConfig,

    /// Template selection weights
    #[serde(default)]
    pub selection: SelectionConfig,

    /// Content tiers and allow/deny lists
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Logging bootstrap for front ends embedding the engine
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Reserved prefix for explicit markers (`@portrait`)
    #[serde(default = "default_marker_prefix")]
    pub marker_prefix: String,

    /// Inferred matches below this confidence never reach the resolver
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,

    /// How many suggestions an unknown marker reports
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,

    /// Largest edit distance still worth suggesting
    #[serde(default = "default_max_suggestion_distance")]
    pub max_suggestion_distance: usize,

    #[serde(default)]
    pub weights: KeywordWeights,
}

fn default_marker_prefix() -> String {
    "@".into()
}
fn default_confidence_floor() -> f64 {
    0.4
}
fn default_max_suggestions() -> usize {
    3
}
fn default_max_suggestion_distance() -> usize {
    3
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            marker_prefix: default_marker_prefix(),
            confidence_floor: default_confidence_floor(),
            max_suggestions: default_max_suggestions(),
            max_suggestion_distance: default_max_suggestion_distance(),
            weights: KeywordWeights::default(),
        }
    }
}

/// Confidence contributed by a keyword match, per tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordWeights {
    #[serde(default = "default_specific_weight")]
    pub specific: f64,

    #[serde(default = "default_primary_weight")]
    pub primary: f64,

    #[serde(default = "default_secondary_weight")]
    pub secondary: f64,

    /// Added per extra word in a multi-word phrase
    #[serde(default = "default_bonus")]
    pub phrase_bonus: f64,

    /// Added per additional distinct keyword for the same category
    #[serde(default = "default_bonus")]
    pub repeat_bonus: f64,
}

fn default_specific_weight() -> f64 {
    0.9
}
fn default_primary_weight() -> f64 {
    0.75
}
fn default_secondary_weight() -> f64 {
    0.45
}
fn default_bonus() -> f64 {
    0.05
}

impl Default for KeywordWeights {
    fn default() -> Self {
        Self {
            specific: default_specific_weight(),
            primary: default_primary_weight(),
            secondary: default_secondary_weight(),
            phrase_bonus: default_bonus(),
            repeat_bonus: default_bonus(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionConfig {
    /// Adapter cap when the request names no base family
    #[serde(default = "default_adapter_cap")]
    pub adapter_cap: usize,

    /// Per base family adapter caps (e.g. `sdxl = 4`)
    #[serde(default)]
    pub family_caps: BTreeMap<String, usize>,

    /// Stacking order for recommended adapters
    #[serde(default = "default_role_priority")]
    pub role_priority: Vec<AdapterRole>,
}

fn default_adapter_cap() -> usize {
    4
}
fn default_role_priority() -> Vec<AdapterRole> {
    AdapterRole::DEFAULT_PRIORITY.to_vec()
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self {
            adapter_cap: default_adapter_cap(),
            family_caps: BTreeMap::new(),
            role_priority: default_role_priority(),
        }
    }
}

impl CompositionConfig {
    /// Adapter cap for the given base family.
    pub fn cap_for(&self, base_family: Option<&str>) -> usize {
        base_family
            .and_then(|f| self.family_caps.get(f).copied())
            .unwrap_or(self.adapter_cap)
    }

    /// Position of a role in the stacking order. Unlisted roles sort last.
    pub fn role_rank(&self, role: AdapterRole) -> usize {
        self.role_priority
            .iter()
            .position(|r| *r == role)
            .unwrap_or(self.role_priority.len())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Modality assumed when the request does not name one
    #[serde(default = "default_modality")]
    pub default_modality: String,

    /// Score for a category's first preferred template (halved for the second, ...)
    #[serde(default = "default_preference_weight")]
    pub preference_weight: f64,

    /// Score per matching `best_for` tag
    #[serde(default = "default_best_for_bonus")]
    pub best_for_bonus: f64,
}

fn default_modality() -> String {
    "image".into()
}
fn default_preference_weight() -> f64 {
    10.0
}
fn default_best_for_bonus() -> f64 {
    2.0
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            default_modality: default_modality(),
            preference_weight: default_preference_weight(),
            best_for_bonus: default_best_for_bonus(),
        }
    }
}

/// Content tiers, per-category tier overrides and per-tier allow/deny lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Tier used when a request does not name one
    #[serde(default = "default_tier")]
    pub default_tier: String,

    /// Tier ladder, least to most permissive
    #[serde(default = "default_tiers")]
    pub tiers: Vec<TierPolicy>,

    /// Overrides of a category's declared tier (category id → tier)
    #[serde(default)]
    pub category_tiers: BTreeMap<String, String>,
}

fn default_tier() -> String {
    "general".into()
}
fn default_tiers() -> Vec<TierPolicy> {
    ["general", "mature", "explicit"]
        .into_iter()
        .map(TierPolicy::open)
        .collect()
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default_tier: default_tier(),
            tiers: default_tiers(),
            category_tiers: BTreeMap::new(),
        }
    }
}

impl PolicyConfig {
    /// Position of a tier on the ladder.
    pub fn tier_rank(&self, name: &str) -> Option<usize> {
        self.tiers.iter().position(|t| t.name == name)
    }

    pub fn tier(&self, name: &str) -> Option<&TierPolicy> {
        self.tiers.iter().find(|t| t.name == name)
    }
}

/// Allow/deny lists applied to the final template and adapters at one tier.
///
/// An empty allow list (or one containing `"*"`) allows everything. Deny
/// entries always win.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierPolicy {
    pub name: String,

    #[serde(default)]
    pub allow_templates: Vec<String>,

    #[serde(default)]
    pub deny_templates: Vec<String>,

    #[serde(default)]
    pub allow_adapters: Vec<String>,

    #[serde(default)]
    pub deny_adapters: Vec<String>,
}

impl TierPolicy {
    /// A tier with no restrictions.
    pub fn open(name: &str) -> Self {
        Self {
            name: name.into(),
            allow_templates: vec![],
            deny_templates: vec![],
            allow_adapters: vec![],
            deny_adapters: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the default path (~/.promptsmith/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `PROMPTSMITH_DEFINITIONS`: definitions directory
    /// - `PROMPTSMITH_TIER`: default policy tier
    /// - `PROMPTSMITH_LOG`: log level
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(dir) = std::env::var("PROMPTSMITH_DEFINITIONS") {
            config.definitions_dir = Some(PathBuf::from(dir));
        }
        if let Ok(tier) = std::env::var("PROMPTSMITH_TIER") {
            config.policy.default_tier = tier;
        }
        if let Ok(level) = std::env::var("PROMPTSMITH_LOG") {
            config.logging.level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config = Self::from_toml(&content).map_err(|e| match e {
            ConfigError::ParseError { reason, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".promptsmith")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let parser = &self.parser;
        if parser.marker_prefix.is_empty() || parser.marker_prefix.chars().any(char::is_whitespace)
        {
            return Err(ConfigError::ValidationError(
                "parser.marker_prefix must be non-empty and contain no whitespace".into(),
            ));
        }
        if !(0.0..=1.0).contains(&parser.confidence_floor) {
            return Err(ConfigError::ValidationError(
                "parser.confidence_floor must be between 0.0 and 1.0".into(),
            ));
        }
        let w = &parser.weights;
        for (name, value) in [
            ("specific", w.specific),
            ("primary", w.primary),
            ("secondary", w.secondary),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::ValidationError(format!(
                    "parser.weights.{name} must be in (0.0, 1.0]"
                )));
            }
        }
        if w.phrase_bonus < 0.0 || w.repeat_bonus < 0.0 {
            return Err(ConfigError::ValidationError(
                "parser.weights bonuses must not be negative".into(),
            ));
        }

        let composition = &self.composition;
        if composition.adapter_cap == 0 {
            return Err(ConfigError::ValidationError(
                "composition.adapter_cap must be > 0".into(),
            ));
        }
        if let Some((family, _)) = composition.family_caps.iter().find(|(_, cap)| **cap == 0) {
            return Err(ConfigError::ValidationError(format!(
                "composition.family_caps.{family} must be > 0"
            )));
        }
        let unique_roles: BTreeSet<_> = composition.role_priority.iter().collect();
        if unique_roles.len() != composition.role_priority.len() {
            return Err(ConfigError::ValidationError(
                "composition.role_priority contains duplicate roles".into(),
            ));
        }

        if self.selection.preference_weight < 0.0 || self.selection.best_for_bonus < 0.0 {
            return Err(ConfigError::ValidationError(
                "selection weights must not be negative".into(),
            ));
        }

        let policy = &self.policy;
        if policy.tiers.is_empty() {
            return Err(ConfigError::ValidationError(
                "policy.tiers must define at least one tier".into(),
            ));
        }
        let names: BTreeSet<_> = policy.tiers.iter().map(|t| t.name.as_str()).collect();
        if names.len() != policy.tiers.len() {
            return Err(ConfigError::ValidationError(
                "policy.tiers contains duplicate tier names".into(),
            ));
        }
        if !names.contains(policy.default_tier.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "policy.default_tier '{}' is not a configured tier",
                policy.default_tier
            )));
        }
        if let Some((category, tier)) = policy
            .category_tiers
            .iter()
            .find(|(_, tier)| !names.contains(tier.as_str()))
        {
            return Err(ConfigError::ValidationError(format!(
                "policy.category_tiers.{category} names unknown tier '{tier}'"
            )));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Install a global `tracing` subscriber according to `config`.
///
/// `RUST_LOG` takes precedence over `config.level`. Fails if a subscriber is
/// already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| ConfigError::LoggingError(e.to_string()))
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Failed to initialise logging: {0}")]
    LoggingError(String),
}

impl From<ConfigError> for promptsmith_core::Error {
    fn from(e: ConfigError) -> Self {
        promptsmith_core::Error::Config {
            message: e.to_string(),
        }
    }
}
