use async_trait::async_trait;
use modporter_core::assumptions::REASON_SMART_ASSUMPTIONS_DISABLED;
use modporter_core::feature::{FeatureRecord, MappingDecision, Resolution};
use modporter_db::models::status::JobStatus;
use serde_json::json;

use crate::context::StageContext;
use crate::stage::{Stage, StageError, StageResult, STAGE_BEDROCK_ARCHITECT};

/// Plans the conversion by resolving every feature through the assumption
/// engine.
pub struct BedrockArchitect;

#[async_trait]
impl Stage for BedrockArchitect {
    fn name(&self) -> &'static str {
        STAGE_BEDROCK_ARCHITECT
    }

    fn status(&self) -> JobStatus {
        JobStatus::Converting
    }

    fn progress_start(&self) -> u8 {
        20
    }

    async fn execute(&self, ctx: &mut StageContext) -> Result<StageResult, StageError> {
        if ctx.artifact.is_none() {
            return Err(StageError::AgentExecution(
                "Mod artifact has not been analyzed".into(),
            ));
        }

        let smart_assumptions = ctx.options.smart_assumptions;
        let engine = &ctx.engine;
        let (mut direct, mut assumed, mut excluded) = (0usize, 0usize, 0usize);

        for feature in ctx.features.iter_mut() {
            let mut resolution = engine.resolve(feature);
            if !smart_assumptions {
                resolution = without_assumptions(feature, resolution);
            }
            match resolution.decision {
                MappingDecision::Direct => direct += 1,
                MappingDecision::SmartAssumption { .. } => assumed += 1,
                MappingDecision::Excluded { .. } => excluded += 1,
            }
            tracing::trace!(
                feature_id = %feature.feature_id,
                decision = resolution.decision.label(),
                "Feature resolved",
            );
            feature.resolution = Some(resolution);
        }
        ctx.planned = true;

        let message = format!(
            "Planned {} features: {direct} direct, {assumed} smart assumptions, {excluded} excluded",
            ctx.features.len()
        );
        let output = json!({
            "rule_table_version": ctx.engine.table_version(),
            "direct": direct,
            "smart_assumption": assumed,
            "excluded": excluded,
        });
        Ok(StageResult::new(20, message).with_output(output))
    }
}

/// With smart assumptions switched off, anything that would have been
/// approximated is dropped instead.
fn without_assumptions(feature: &FeatureRecord, resolution: Resolution) -> Resolution {
    match resolution.decision {
        MappingDecision::SmartAssumption { .. } => Resolution {
            decision: MappingDecision::excluded(REASON_SMART_ASSUMPTIONS_DISABLED),
            confidence: 0.0,
            functional_loss: format!(
                "Smart assumptions are disabled for this conversion; {} feature '{}' was not converted.",
                feature.category, feature.java_signature
            ),
            target: None,
        },
        _ => resolution,
    }
}
