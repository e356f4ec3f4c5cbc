use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use modporter_core::artifact::JavaClass;
use modporter_core::feature::FeatureRecord;
use modporter_db::models::status::JobStatus;
use serde_json::json;

use crate::context::StageContext;
use crate::stage::{Stage, StageError, StageResult, STAGE_JAVA_ANALYZER};

/// Loads the mod artifact and turns its classes into feature records.
pub struct JavaAnalyzer;

#[async_trait]
impl Stage for JavaAnalyzer {
    fn name(&self) -> &'static str {
        STAGE_JAVA_ANALYZER
    }

    fn status(&self) -> JobStatus {
        JobStatus::Analyzing
    }

    fn progress_start(&self) -> u8 {
        0
    }

    async fn execute(&self, ctx: &mut StageContext) -> Result<StageResult, StageError> {
        let artifact = ctx
            .artifacts
            .find_artifact(&ctx.file_id)
            .await
            .map_err(|e| StageError::AgentExecution(format!("Cannot load mod artifact: {e}")))?
            .ok_or_else(|| {
                StageError::AgentExecution(format!("Mod artifact {} not found", ctx.file_id))
            })?;

        if artifact.java_classes.is_empty() {
            return Err(StageError::AgentExecution(
                "Mod artifact contains no Java classes".into(),
            ));
        }

        let include_deps = ctx.options.include_dependencies;
        let classes: Vec<&JavaClass> = artifact
            .java_classes
            .iter()
            .filter(|c| include_deps || !artifact.is_dependency_class(c))
            .collect();
        let skipped = artifact.java_classes.len() - classes.len();

        if classes.is_empty() {
            return Err(StageError::AgentExecution(
                "Mod artifact contains only dependency classes".into(),
            ));
        }

        let (features, graph) = detect_features(&classes);

        let mut categories: BTreeMap<&str, usize> = BTreeMap::new();
        for feature in &features {
            *categories.entry(feature.category.as_str()).or_default() += 1;
        }

        tracing::debug!(
            job_id = %ctx.job_id,
            mod_id = %artifact.mod_id,
            classes = classes.len(),
            features = features.len(),
            skipped_dependency_classes = skipped,
            "Mod analyzed",
        );

        let message = format!(
            "Detected {} features in {} classes",
            features.len(),
            classes.len()
        );
        let output = json!({
            "mod_id": artifact.mod_id,
            "classes_analyzed": classes.len(),
            "skipped_dependency_classes": skipped,
            "features_detected": features.len(),
            "categories": categories,
        });

        ctx.features = features;
        ctx.dependency_graph = graph;
        ctx.artifact = Some(artifact);

        Ok(StageResult::new(20, message).with_output(output))
    }
}

/// One record per class with unique feature ids, plus the edges from each
/// feature to the in-mod types it extends or implements.
fn detect_features(
    classes: &[&JavaClass],
) -> (Vec<FeatureRecord>, BTreeMap<String, Vec<String>>) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut by_class: HashMap<&str, String> = HashMap::new();
    let mut features = Vec::with_capacity(classes.len());

    for class in classes {
        let mut record = FeatureRecord::from_class(class);
        let count = seen.entry(record.feature_id.clone()).or_default();
        *count += 1;
        if *count > 1 {
            record.feature_id = format!("{}#{}", record.feature_id, count);
        }
        by_class.insert(class.name.as_str(), record.feature_id.clone());
        features.push(record);
    }

    let mut graph = BTreeMap::new();
    for (class, feature) in classes.iter().zip(&features) {
        let edges: Vec<String> = class
            .referenced_types()
            .filter_map(|name| by_class.get(name).cloned())
            .collect();
        graph.insert(feature.feature_id.clone(), edges);
    }

    (features, graph)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use modporter_core::conversion::ConversionOptions;
    use modporter_core::feature::FeatureCategory;

    use super::*;
    use crate::stages::fixtures::{self, class};

    #[tokio::test]
    async fn detects_features_in_class_order() {
        let mut ctx = fixtures::context().await;
        let result = JavaAnalyzer.execute(&mut ctx).await.expect("analysis succeeds");

        assert_eq!(ctx.mod_id(), Some("gems"));
        let ids: Vec<&str> = ctx.features.iter().map(|f| f.feature_id.as_str()).collect();
        assert_eq!(
            ids,
            ["block:RubyBlock", "dimension:CrystalDimension", "client_rendering:RubyRenderer"]
        );
        assert!(ctx.features.iter().all(|f| f.resolution.is_none()));
        assert_eq!(result.progress_delta, 20);
        assert_eq!(result.output["skipped_dependency_classes"], 0);
        assert_eq!(result.output["categories"]["block"], 1);
    }

    #[tokio::test]
    async fn dependency_classes_are_included_by_default() {
        let mut ctx =
            fixtures::context_for(fixtures::shaded_mod(), ConversionOptions::default()).await;
        JavaAnalyzer.execute(&mut ctx).await.expect("analysis succeeds");

        assert_eq!(ctx.features.len(), 4);
        assert_eq!(ctx.features[3].category, FeatureCategory::Item);
    }

    #[tokio::test]
    async fn skips_dependency_classes_when_asked() {
        let options = ConversionOptions {
            include_dependencies: false,
            ..ConversionOptions::default()
        };
        let mut ctx = fixtures::context_for(fixtures::shaded_mod(), options).await;
        let result = JavaAnalyzer.execute(&mut ctx).await.expect("analysis succeeds");

        assert_eq!(ctx.features.len(), 3);
        assert_eq!(result.output["skipped_dependency_classes"], 1);
    }

    #[tokio::test]
    async fn missing_artifact_is_an_execution_error() {
        let mut ctx = fixtures::context().await;
        ctx.file_id = "does-not-exist".into();
        assert_matches!(
            JavaAnalyzer.execute(&mut ctx).await,
            Err(StageError::AgentExecution(msg)) if msg.contains("not found")
        );
    }

    #[tokio::test]
    async fn artifact_without_classes_fails() {
        let mut artifact = fixtures::gem_mod();
        artifact.java_classes.clear();
        let mut ctx = fixtures::context_for(artifact, ConversionOptions::default()).await;
        assert_matches!(
            JavaAnalyzer.execute(&mut ctx).await,
            Err(StageError::AgentExecution(_))
        );
    }

    #[test]
    fn duplicate_simple_names_get_distinct_ids() {
        let a = class("com.ex.a.RubyBlock", "Block");
        let b = class("com.ex.b.RubyBlock", "Block");
        let (features, _) = detect_features(&[&a, &b]);
        assert_eq!(features[0].feature_id, "block:RubyBlock");
        assert_eq!(features[1].feature_id, "block:RubyBlock#2");
    }

    #[test]
    fn graph_links_in_mod_supertypes() {
        let base = class("com.ex.gems.GemBlock", "Block");
        let ruby = class("com.ex.gems.RubyBlock", "com.ex.gems.GemBlock");
        let (_, graph) = detect_features(&[&base, &ruby]);
        assert_eq!(graph["block:RubyBlock"], vec!["block:GemBlock".to_string()]);
        assert!(graph["block:GemBlock"].is_empty());
    }
}
