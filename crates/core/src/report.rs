//! Per-feature conversion report surfaced to the user on completion.

use serde::{Deserialize, Serialize};

use crate::feature::{FeatureCategory, FeatureRecord, MappingDecision};
use crate::types::JobId;

/// Overall verdict of a completed conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionOutcome {
    /// Every feature mapped directly.
    Success,
    /// At least one feature was approximated or dropped.
    SuccessWithCompromises,
}

/// One line of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureReportEntry {
    pub feature_id: String,
    pub category: FeatureCategory,
    pub java_signature: String,
    pub decision: MappingDecision,
    pub confidence: f64,
    pub functional_loss: String,
}

/// Decision counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub direct: usize,
    pub smart_assumption: usize,
    pub excluded: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionReport {
    pub job_id: JobId,
    pub mod_name: String,
    pub rule_table_version: String,
    pub features: Vec<FeatureReportEntry>,
    pub summary: ReportSummary,
    pub outcome: ConversionOutcome,
}

impl ConversionReport {
    /// Build the report from resolved feature records.
    ///
    /// Unresolved records are reported as excluded so that nothing detected
    /// silently disappears from the report.
    pub fn build(
        job_id: JobId,
        mod_name: impl Into<String>,
        rule_table_version: impl Into<String>,
        features: &[FeatureRecord],
    ) -> Self {
        let mut summary = ReportSummary::default();
        let entries: Vec<FeatureReportEntry> = features
            .iter()
            .map(|f| {
                let (decision, confidence, functional_loss) = match &f.resolution {
                    Some(r) => (r.decision.clone(), r.confidence, r.functional_loss.clone()),
                    None => (
                        MappingDecision::excluded("unresolved"),
                        0.0,
                        "The feature was detected but never resolved.".to_string(),
                    ),
                };
                match decision {
                    MappingDecision::Direct => summary.direct += 1,
                    MappingDecision::SmartAssumption { .. } => summary.smart_assumption += 1,
                    MappingDecision::Excluded { .. } => summary.excluded += 1,
                }
                FeatureReportEntry {
                    feature_id: f.feature_id.clone(),
                    category: f.category,
                    java_signature: f.java_signature.clone(),
                    decision,
                    confidence,
                    functional_loss,
                }
            })
            .collect();
        summary.total = entries.len();

        let outcome = if summary.total == summary.direct {
            ConversionOutcome::Success
        } else {
            ConversionOutcome::SuccessWithCompromises
        };

        Self {
            job_id,
            mod_name: mod_name.into(),
            rule_table_version: rule_table_version.into(),
            features: entries,
            summary,
            outcome,
        }
    }
}
