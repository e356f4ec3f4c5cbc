//! The six stage agents, in execution order.

mod asset_converter;
mod bedrock_architect;
mod java_analyzer;
mod logic_translator;
mod packaging_agent;
mod qa_validator;

use std::sync::Arc;

pub use asset_converter::AssetConverter;
pub use bedrock_architect::BedrockArchitect;
pub use java_analyzer::JavaAnalyzer;
pub use logic_translator::LogicTranslator;
pub use packaging_agent::{PackagingAgent, ASSET_MAP_FILE, MANIFEST_FILE};
pub use qa_validator::QaValidator;

use crate::stage::{Stage, StageError};
use crate::context::StageContext;

/// The production stage list.
pub fn standard_stages() -> Vec<Arc<dyn Stage>> {
    vec![
        Arc::new(JavaAnalyzer),
        Arc::new(BedrockArchitect),
        Arc::new(LogicTranslator),
        Arc::new(AssetConverter),
        Arc::new(PackagingAgent),
        Arc::new(QaValidator),
    ]
}

/// Pack directory names inside the archive.
pub fn pack_dirs(mod_id: &str) -> (String, String) {
    (format!("{mod_id}_BP"), format!("{mod_id}_RP"))
}

/// Mod namespace, or an execution error if the analyzer has not run.
fn require_mod_id(ctx: &StageContext) -> Result<String, StageError> {
    ctx.mod_id()
        .map(str::to_owned)
        .ok_or_else(|| StageError::AgentExecution("Mod artifact has not been analyzed".into()))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::Arc;

    use modporter_core::artifact::{AssetEntry, AssetKind, JavaClass, ModArtifact};
    use modporter_core::assumptions::{RuleTable, SmartAssumptionEngine};
    use modporter_core::conversion::ConversionOptions;
    use modporter_core::types::JobId;
    use modporter_db::{ArtifactRepo, MemoryArtifactRepo};

    use crate::context::StageContext;

    pub fn class(name: &str, superclass: &str) -> JavaClass {
        JavaClass {
            name: name.into(),
            superclass: Some(superclass.into()),
            interfaces: vec![],
        }
    }

    pub fn asset(path: &str, kind: AssetKind) -> AssetEntry {
        AssetEntry {
            path: path.into(),
            kind,
        }
    }

    /// Ruby block (direct), a portal dimension (assumption) and a renderer
    /// (excluded).
    pub fn gem_mod() -> ModArtifact {
        ModArtifact {
            mod_id: "gems".into(),
            name: "Gems".into(),
            version: "1.2.0".into(),
            loader: Some("forge".into()),
            java_classes: vec![
                class("com.ex.gems.RubyBlock", "net.minecraft.world.level.block.Block"),
                class("com.ex.gems.CrystalDimension", "com.ex.gems.BaseChunkGenerator"),
                class("com.ex.gems.RubyRenderer", "net.minecraft.client.BlockEntityRenderer"),
            ],
            assets: vec![
                asset("assets/gems/textures/block/ruby_block.png", AssetKind::Texture),
                asset("assets/gems/textures/block/ruby_renderer.png", AssetKind::Texture),
                asset("assets/gems/sounds/chime.ogg", AssetKind::Sound),
                asset("assets/gems/lang/en_us.json", AssetKind::Lang),
            ],
            dependencies: vec![],
        }
    }

    /// `gem_mod` with one class shaded in from a library jar.
    pub fn shaded_mod() -> ModArtifact {
        let mut artifact = gem_mod();
        artifact
            .java_classes
            .push(class("dev.shaded.lib.UtilItem", "net.minecraft.world.item.Item"));
        artifact.dependencies = vec!["dev.shaded.lib".into()];
        artifact
    }

    pub async fn context_for(artifact: ModArtifact, options: ConversionOptions) -> StageContext {
        let repo = Arc::new(MemoryArtifactRepo::new());
        let file_id = repo
            .put_artifact(artifact)
            .await
            .expect("artifact stored");
        let target = options.target().expect("valid target");
        let table = Arc::new(RuleTable::builtin().expect("builtin table"));
        let engine = SmartAssumptionEngine::new(table, target.capabilities());
        StageContext::new(JobId::new_v4(), file_id, options, target, repo, engine)
    }

    pub async fn context() -> StageContext {
        context_for(gem_mod(), ConversionOptions::default()).await
    }
}
