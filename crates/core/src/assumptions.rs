//! Smart assumption rule table and resolution engine.
//!
//! The [`RuleTable`] is static configuration loaded once at startup. The
//! [`SmartAssumptionEngine`] resolves every [`FeatureRecord`] to a
//! [`Resolution`] using a fixed decision tree:
//!
//! 1. A direct mapping for `(category, java_signature)` wins.
//! 2. Otherwise the rule for the feature's category applies, provided the
//!    target version offers the capability the rule requires.
//! 3. Otherwise the feature is excluded with `no_mapping_rule`.
//!
//! Resolution never fails and depends only on the feature, the table and
//! the engine's capability set.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::feature::{FeatureCategory, FeatureRecord, MappingDecision, Resolution};

/// Rule table shipped with the service.
const BUILTIN_RULES: &str = include_str!("../rules/assumption_rules.json");

/// Signature wildcard in a direct mapping.
pub const ANY_SIGNATURE: &str = "*";

/// Exclusion reason when no rule covers a category.
pub const REASON_NO_MAPPING_RULE: &str = "no_mapping_rule";

/// Exclusion reason when smart assumptions were switched off for a job.
pub const REASON_SMART_ASSUMPTIONS_DISABLED: &str = "smart_assumptions_disabled";

// ---------------------------------------------------------------------------
// Table entries
// ---------------------------------------------------------------------------

/// A Java construct with a one-to-one Bedrock equivalent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMapping {
    pub category: FeatureCategory,
    /// Superclass simple name, or `*` for any signature in the category.
    pub java_signature: String,
    pub bedrock_component: String,
}

impl DirectMapping {
    fn matches(&self, feature: &FeatureRecord) -> bool {
        self.category == feature.category
            && (self.java_signature == ANY_SIGNATURE
                || self.java_signature == feature.java_signature)
    }
}

/// What a triggered rule does to the feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleOutcome {
    SmartAssumption { assumption_type: String },
    Excluded { reason: String },
}

impl RuleOutcome {
    fn decision(&self) -> MappingDecision {
        match self {
            Self::SmartAssumption { assumption_type } => {
                MappingDecision::smart_assumption(assumption_type.clone())
            }
            Self::Excluded { reason } => MappingDecision::excluded(reason.clone()),
        }
    }
}

/// Fallback transformation for one feature category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssumptionRule {
    pub category: FeatureCategory,
    /// Target capability the rule depends on; `None` always triggers.
    #[serde(default)]
    pub requires_capability: Option<String>,
    pub transform_strategy: String,
    pub outcome: RuleOutcome,
    pub confidence: f64,
    pub functional_loss_description: String,
}

impl AssumptionRule {
    fn triggers(&self, feature: &FeatureRecord, capabilities: &BTreeSet<&'static str>) -> bool {
        self.category == feature.category
            && self
                .requires_capability
                .as_deref()
                .map_or(true, |cap| capabilities.contains(cap))
    }
}

// ---------------------------------------------------------------------------
// RuleTable
// ---------------------------------------------------------------------------

/// Versioned decision table. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTable {
    pub version: String,
    pub direct_mappings: Vec<DirectMapping>,
    pub rules: Vec<AssumptionRule>,
}

impl RuleTable {
    /// The table compiled into the binary.
    pub fn builtin() -> Result<Self, CoreError> {
        Self::from_json(BUILTIN_RULES)
    }

    /// Parse and validate a table from JSON text.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let table: Self = serde_json::from_str(json)
            .map_err(|e| CoreError::Validation(format!("Invalid rule table: {e}")))?;
        table.validate()?;
        Ok(table)
    }

    /// Read a table from a JSON file.
    pub fn load_from_path(path: &Path) -> Result<Self, CoreError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Internal(format!("Cannot read rule table {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Check table-wide invariants.
    ///
    /// - `version` is non-empty.
    /// - Every confidence lies in `[0.0, 1.0]`.
    /// - No two direct mappings share a `(category, java_signature)` key.
    /// - At most one rule per category.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.version.trim().is_empty() {
            return Err(CoreError::Validation("Rule table version must not be empty".into()));
        }

        let mut keys = HashSet::new();
        for mapping in &self.direct_mappings {
            if !keys.insert((mapping.category, mapping.java_signature.as_str())) {
                return Err(CoreError::Validation(format!(
                    "Duplicate direct mapping for {}/{}",
                    mapping.category, mapping.java_signature
                )));
            }
        }

        let mut categories = HashSet::new();
        for rule in &self.rules {
            if !(0.0..=1.0).contains(&rule.confidence) {
                return Err(CoreError::Validation(format!(
                    "Rule for {} has confidence {} outside 0.0-1.0",
                    rule.category, rule.confidence
                )));
            }
            if !categories.insert(rule.category) {
                return Err(CoreError::Validation(format!(
                    "More than one rule for category {}",
                    rule.category
                )));
            }
        }

        Ok(())
    }

    fn direct_mapping_for(&self, feature: &FeatureRecord) -> Option<&DirectMapping> {
        // Exact signatures take precedence over the category wildcard.
        self.direct_mappings
            .iter()
            .find(|m| m.matches(feature) && m.java_signature != ANY_SIGNATURE)
            .or_else(|| self.direct_mappings.iter().find(|m| m.matches(feature)))
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Resolves features against a rule table for one target capability set.
#[derive(Debug, Clone)]
pub struct SmartAssumptionEngine {
    table: Arc<RuleTable>,
    capabilities: BTreeSet<&'static str>,
}

impl SmartAssumptionEngine {
    pub fn new(table: Arc<RuleTable>, capabilities: BTreeSet<&'static str>) -> Self {
        Self {
            table,
            capabilities,
        }
    }

    pub fn table_version(&self) -> &str {
        &self.table.version
    }

    /// Resolve one feature. Never fails; the worst case is `Excluded`.
    pub fn resolve(&self, feature: &FeatureRecord) -> Resolution {
        if let Some(mapping) = self.table.direct_mapping_for(feature) {
            return Resolution {
                decision: MappingDecision::Direct,
                confidence: 1.0,
                functional_loss: String::new(),
                target: Some(mapping.bedrock_component.clone()),
            };
        }

        match self
            .table
            .rules
            .iter()
            .find(|rule| rule.triggers(feature, &self.capabilities))
        {
            Some(rule) => Resolution {
                decision: rule.outcome.decision(),
                confidence: rule.confidence,
                functional_loss: rule.functional_loss_description.clone(),
                target: Some(rule.transform_strategy.clone()),
            },
            None => Resolution {
                decision: MappingDecision::excluded(REASON_NO_MAPPING_RULE),
                confidence: 0.0,
                functional_loss: format!(
                    "No Bedrock mapping exists for {} feature '{}'; it was not converted.",
                    feature.category, feature.java_signature
                ),
                target: None,
            },
        }
    }

    /// Shorthand for the decision alone.
    pub fn decide(&self, feature: &FeatureRecord) -> MappingDecision {
        self.resolve(feature).decision
    }
}
