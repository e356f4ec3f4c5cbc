use async_trait::async_trait;
use modporter_core::feature::{FeatureCategory, FeatureRecord, MappingDecision};
use modporter_db::models::status::JobStatus;
use serde_json::{json, Value};

use super::require_mod_id;
use crate::context::{BehaviorFile, StageContext};
use crate::stage::{Stage, StageError, StageResult, STAGE_LOGIC_TRANSLATOR};

pub const ASSUMPTION_STRUCTURE: &str = "structure_in_existing_dimension";
pub const ASSUMPTION_DECORATIVE_BLOCK: &str = "decorative_block";
pub const ASSUMPTION_BOOK_INTERFACE: &str = "book_or_sign_interface";

/// Writes behaviour-pack definitions for every converted feature.
pub struct LogicTranslator;

#[async_trait]
impl Stage for LogicTranslator {
    fn name(&self) -> &'static str {
        STAGE_LOGIC_TRANSLATOR
    }

    fn status(&self) -> JobStatus {
        JobStatus::Converting
    }

    fn progress_start(&self) -> u8 {
        40
    }

    async fn execute(&self, ctx: &mut StageContext) -> Result<StageResult, StageError> {
        let mod_id = require_mod_id(ctx)?;
        if !ctx.planned {
            return Err(StageError::AgentExecution(
                "Conversion plan is missing".into(),
            ));
        }

        let format_version = ctx.target.to_string();
        let mut files = Vec::new();
        for feature in ctx.features.iter().filter(|f| f.category.has_behavior()) {
            let Some(decision) = feature.decision() else {
                continue;
            };
            if let Some(file) = translate(&mod_id, &format_version, feature, decision)? {
                files.push(file);
            }
        }

        let message = format!("Translated {} behaviour definitions", files.len());
        let output = json!({
            "behavior_files": files.iter().map(|f| f.path.as_str()).collect::<Vec<_>>(),
        });
        ctx.behaviors = files;
        Ok(StageResult::new(20, message).with_output(output))
    }
}

fn translate(
    mod_id: &str,
    format_version: &str,
    feature: &FeatureRecord,
    decision: &MappingDecision,
) -> Result<Option<BehaviorFile>, StageError> {
    let name = feature.snake_name();
    let file = match (decision, feature.category) {
        (MappingDecision::Excluded { .. }, _) => return Ok(None),

        (MappingDecision::Direct, FeatureCategory::Block) => {
            let identifier = format!("{mod_id}:{name}");
            BehaviorFile {
                path: format!("blocks/{name}.json"),
                content: block_definition(format_version, &identifier, &name, "construction"),
                identifier,
                feature_id: feature.feature_id.clone(),
            }
        }
        (MappingDecision::Direct, FeatureCategory::Item) => {
            let identifier = format!("{mod_id}:{name}");
            BehaviorFile {
                path: format!("items/{name}.json"),
                content: item_definition(format_version, &identifier, &name, 64),
                identifier,
                feature_id: feature.feature_id.clone(),
            }
        }
        (MappingDecision::Direct, FeatureCategory::Entity) => {
            let identifier = format!("{mod_id}:{name}");
            BehaviorFile {
                path: format!("entities/{name}.json"),
                content: entity_definition(format_version, &identifier),
                identifier,
                feature_id: feature.feature_id.clone(),
            }
        }

        (MappingDecision::SmartAssumption { assumption_type }, _) => {
            match assumption_type.as_str() {
                ASSUMPTION_STRUCTURE => {
                    let identifier = format!("{mod_id}:{name}_structure");
                    BehaviorFile {
                        path: format!("features/{name}_structure.json"),
                        content: structure_feature(&identifier, &format!("{mod_id}:{name}")),
                        identifier,
                        feature_id: feature.feature_id.clone(),
                    }
                }
                ASSUMPTION_DECORATIVE_BLOCK => {
                    let identifier = format!("{mod_id}:{name}");
                    BehaviorFile {
                        path: format!("blocks/{name}.json"),
                        content: block_definition(format_version, &identifier, &name, "items"),
                        identifier,
                        feature_id: feature.feature_id.clone(),
                    }
                }
                ASSUMPTION_BOOK_INTERFACE => {
                    let identifier = format!("{mod_id}:{name}_guide");
                    BehaviorFile {
                        path: format!("items/{name}_guide.json"),
                        content: item_definition(format_version, &identifier, &name, 1),
                        identifier,
                        feature_id: feature.feature_id.clone(),
                    }
                }
                other => {
                    return Err(StageError::AgentExecution(format!(
                        "No translation for assumption type '{other}' ({})",
                        feature.feature_id
                    )))
                }
            }
        }

        (MappingDecision::Direct, category) => {
            return Err(StageError::AgentExecution(format!(
                "No direct translation for {category} feature {}",
                feature.feature_id
            )))
        }
    };
    Ok(Some(file))
}

fn block_definition(format_version: &str, identifier: &str, texture: &str, menu: &str) -> Value {
    json!({
        "format_version": format_version,
        "minecraft:block": {
            "description": {
                "identifier": identifier,
                "menu_category": { "category": menu }
            },
            "components": {
                "minecraft:destructible_by_mining": { "seconds_to_destroy": 1.5 },
                "minecraft:material_instances": {
                    "*": { "texture": texture, "render_method": "opaque" }
                }
            }
        }
    })
}

fn item_definition(format_version: &str, identifier: &str, icon: &str, max_stack: u8) -> Value {
    json!({
        "format_version": format_version,
        "minecraft:item": {
            "description": {
                "identifier": identifier,
                "menu_category": { "category": "items" }
            },
            "components": {
                "minecraft:icon": { "texture": icon },
                "minecraft:max_stack_size": max_stack
            }
        }
    })
}

fn entity_definition(format_version: &str, identifier: &str) -> Value {
    json!({
        "format_version": format_version,
        "minecraft:entity": {
            "description": {
                "identifier": identifier,
                "is_spawnable": true,
                "is_summonable": true
            },
            "components": {
                "minecraft:health": { "value": 20, "max": 20 },
                "minecraft:physics": {},
                "minecraft:movement": { "value": 0.25 },
                "minecraft:movement.basic": {},
                "minecraft:navigation.walk": { "can_walk": true }
            }
        }
    })
}

fn structure_feature(identifier: &str, structure_name: &str) -> Value {
    json!({
        "format_version": "1.13.0",
        "minecraft:structure_template_feature": {
            "description": { "identifier": identifier },
            "structure_name": structure_name,
            "adjustment_radius": 4,
            "facing_direction": "random",
            "constraints": {
                "unburied": {},
                "block_intersection": { "block_allowlist": ["minecraft:air"] }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use modporter_core::artifact::AssetKind;
    use modporter_core::conversion::ConversionOptions;

    use super::*;
    use crate::stages::fixtures::{self, class};
    use crate::stages::{BedrockArchitect, JavaAnalyzer};

    async fn planned(artifact: modporter_core::artifact::ModArtifact) -> StageContext {
        let mut ctx = fixtures::context_for(artifact, ConversionOptions::default()).await;
        JavaAnalyzer.execute(&mut ctx).await.expect("analysis succeeds");
        BedrockArchitect.execute(&mut ctx).await.expect("planning succeeds");
        ctx
    }

    #[tokio::test]
    async fn emits_namespaced_definitions_for_converted_features() {
        let mut ctx = planned(fixtures::gem_mod()).await;
        LogicTranslator.execute(&mut ctx).await.expect("translation succeeds");

        let paths: Vec<&str> = ctx.behaviors.iter().map(|b| b.path.as_str()).collect();
        assert_eq!(
            paths,
            ["blocks/ruby_block.json", "features/crystal_dimension_structure.json"]
        );
        assert!(ctx.behaviors.iter().all(|b| b.identifier.starts_with("gems:")));
        assert_eq!(
            ctx.behaviors[0].content["minecraft:block"]["description"]["identifier"],
            "gems:ruby_block"
        );
        assert_eq!(
            ctx.behaviors[1].content["minecraft:structure_template_feature"]["structure_name"],
            "gems:crystal_dimension"
        );
    }

    #[tokio::test]
    async fn machinery_and_gui_use_their_assumptions() {
        let mut artifact = fixtures::gem_mod();
        artifact.java_classes = vec![
            class("com.ex.gems.PolisherMachine", "com.ex.gems.TickingBlockEntity"),
            class("com.ex.gems.PolisherScreen", "net.minecraft.client.gui.Screen"),
        ];
        artifact.assets = vec![fixtures::asset(
            "assets/gems/textures/block/polisher_machine.png",
            AssetKind::Texture,
        )];
        let mut ctx = planned(artifact).await;
        LogicTranslator.execute(&mut ctx).await.expect("translation succeeds");

        let ids: Vec<&str> = ctx.behaviors.iter().map(|b| b.identifier.as_str()).collect();
        assert_eq!(ids, ["gems:polisher_machine", "gems:polisher_screen_guide"]);
        assert_eq!(
            ctx.behaviors[1].content["minecraft:item"]["components"]["minecraft:max_stack_size"],
            1
        );
    }

    #[tokio::test]
    async fn unknown_assumption_type_fails() {
        let mut ctx = planned(fixtures::gem_mod()).await;
        ctx.features[1].resolution.as_mut().expect("resolved").decision =
            MappingDecision::smart_assumption("teleport_anywhere");
        assert_matches!(
            LogicTranslator.execute(&mut ctx).await,
            Err(StageError::AgentExecution(msg)) if msg.contains("teleport_anywhere")
        );
    }

    #[tokio::test]
    async fn requires_a_plan() {
        let mut ctx = fixtures::context().await;
        JavaAnalyzer.execute(&mut ctx).await.expect("analysis succeeds");
        assert_matches!(
            LogicTranslator.execute(&mut ctx).await,
            Err(StageError::AgentExecution(msg)) if msg.contains("plan")
        );
    }
}
