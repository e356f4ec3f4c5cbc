//! State threaded through the stages of one pipeline run.
//!
//! Each stage reads what earlier stages left behind and fills in its own
//! section. Feature records are written by the analyzer and architect and
//! only read afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use modporter_core::artifact::{AssetKind, ModArtifact};
use modporter_core::assumptions::SmartAssumptionEngine;
use modporter_core::conversion::{BedrockVersion, ConversionOptions};
use modporter_core::feature::FeatureRecord;
use modporter_core::types::JobId;
use modporter_db::ArtifactRepo;

/// A behaviour-pack definition produced by the logic translator.
#[derive(Debug, Clone, PartialEq)]
pub struct BehaviorFile {
    /// Pack-relative path, e.g. `blocks/ruby_block.json`.
    pub path: String,
    /// Namespaced identifier, e.g. `gems:ruby_block`.
    pub identifier: String,
    pub feature_id: String,
    pub content: serde_json::Value,
}

/// Payload of a resource-pack file.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceContent {
    /// Copied from the mod jar by the storage collaborator.
    CopyFrom { source: String, kind: AssetKind },
    /// Generated definition.
    Json(serde_json::Value),
}

/// A resource-pack file produced by the asset converter.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceFile {
    /// Pack-relative path, e.g. `textures/blocks/ruby_block.png`.
    pub path: String,
    pub content: ResourceContent,
}

pub struct StageContext {
    pub job_id: JobId,
    pub file_id: String,
    pub options: ConversionOptions,
    pub target: BedrockVersion,
    pub artifacts: Arc<dyn ArtifactRepo>,
    pub engine: SmartAssumptionEngine,

    // Analyzer
    pub artifact: Option<ModArtifact>,
    pub features: Vec<FeatureRecord>,
    /// Feature id -> ids of the features it extends or implements.
    pub dependency_graph: BTreeMap<String, Vec<String>>,

    // Architect
    pub planned: bool,

    // Translator / converter
    pub behaviors: Vec<BehaviorFile>,
    pub resources: Vec<ResourceFile>,

    // Packaging
    pub package_reference: Option<String>,
}

impl StageContext {
    pub fn new(
        job_id: JobId,
        file_id: impl Into<String>,
        options: ConversionOptions,
        target: BedrockVersion,
        artifacts: Arc<dyn ArtifactRepo>,
        engine: SmartAssumptionEngine,
    ) -> Self {
        Self {
            job_id,
            file_id: file_id.into(),
            options,
            target,
            artifacts,
            engine,
            artifact: None,
            features: Vec::new(),
            dependency_graph: BTreeMap::new(),
            planned: false,
            behaviors: Vec::new(),
            resources: Vec::new(),
            package_reference: None,
        }
    }

    /// Mod namespace, once the analyzer has loaded the artifact.
    pub fn mod_id(&self) -> Option<&str> {
        self.artifact.as_ref().map(|a| a.mod_id.as_str())
    }
}
