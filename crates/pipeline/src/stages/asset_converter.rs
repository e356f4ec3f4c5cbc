use std::collections::BTreeMap;

use async_trait::async_trait;
use modporter_core::artifact::{AssetEntry, AssetKind};
use modporter_core::feature::FeatureRecord;
use modporter_db::models::status::JobStatus;
use serde_json::json;

use super::require_mod_id;
use crate::context::{ResourceContent, ResourceFile, StageContext};
use crate::stage::{Stage, StageError, StageResult, STAGE_ASSET_CONVERTER};

/// Maps Java asset paths onto the Bedrock resource-pack layout.
pub struct AssetConverter;

#[async_trait]
impl Stage for AssetConverter {
    fn name(&self) -> &'static str {
        STAGE_ASSET_CONVERTER
    }

    fn status(&self) -> JobStatus {
        JobStatus::Converting
    }

    fn progress_start(&self) -> u8 {
        60
    }

    async fn execute(&self, ctx: &mut StageContext) -> Result<StageResult, StageError> {
        let mod_id = require_mod_id(ctx)?;
        let assets = ctx
            .artifact
            .as_ref()
            .map(|a| a.assets.clone())
            .unwrap_or_default();

        let mut files = Vec::new();
        let mut block_textures = BTreeMap::new();
        let mut item_textures = BTreeMap::new();
        let (mut dropped, mut skipped) = (0usize, 0usize);

        for asset in &assets {
            if belongs_only_to_excluded(asset, &ctx.features) {
                dropped += 1;
                continue;
            }
            let Some(path) = bedrock_path(asset) else {
                tracing::debug!(path = %asset.path, "Asset has no Bedrock location, skipped");
                skipped += 1;
                continue;
            };

            let texture_key = path.rsplit_once('.').map_or(path.as_str(), |(key, _)| key);
            if path.starts_with("textures/blocks/") {
                block_textures.insert(asset.stem().to_string(), json!({ "textures": texture_key }));
            } else if path.starts_with("textures/items/") {
                item_textures.insert(asset.stem().to_string(), json!({ "textures": texture_key }));
            }

            files.push(ResourceFile {
                path,
                content: ResourceContent::CopyFrom {
                    source: asset.path.clone(),
                    kind: asset.kind,
                },
            });
        }

        let converted = files.len();
        if !block_textures.is_empty() {
            files.push(ResourceFile {
                path: "textures/terrain_texture.json".into(),
                content: ResourceContent::Json(json!({
                    "resource_pack_name": mod_id,
                    "texture_name": "atlas.terrain",
                    "padding": 8,
                    "num_mip_levels": 4,
                    "texture_data": block_textures,
                })),
            });
        }
        if !item_textures.is_empty() {
            files.push(ResourceFile {
                path: "textures/item_texture.json".into(),
                content: ResourceContent::Json(json!({
                    "resource_pack_name": mod_id,
                    "texture_name": "atlas.items",
                    "texture_data": item_textures,
                })),
            });
        }

        let message = format!("Converted {converted} assets, dropped {dropped}");
        let output = json!({
            "converted": converted,
            "dropped": dropped,
            "skipped": skipped,
            "generated": files.len() - converted,
        });
        ctx.resources = files;
        Ok(StageResult::new(15, message).with_output(output))
    }
}

/// An asset named after features that were all excluded has nothing left to
/// decorate. Assets matching no feature (sounds, lang files) are kept.
fn belongs_only_to_excluded(asset: &AssetEntry, features: &[FeatureRecord]) -> bool {
    let stem = asset.stem();
    let mut owners = features.iter().filter(|f| f.snake_name() == stem).peekable();
    owners.peek().is_some() && owners.all(|f| !f.is_converted())
}

/// Bedrock resource-pack path for a Java asset, if it has one.
fn bedrock_path(asset: &AssetEntry) -> Option<String> {
    let file = asset.path.rsplit('/').next().unwrap_or(&asset.path);
    match asset.kind {
        AssetKind::Texture => {
            let rest = after_segment(&asset.path, "textures")?;
            let mapped = if let Some(name) = rest.strip_prefix("block/") {
                format!("textures/blocks/{name}")
            } else if let Some(name) = rest.strip_prefix("item/") {
                format!("textures/items/{name}")
            } else {
                format!("textures/{rest}")
            };
            Some(mapped)
        }
        AssetKind::Model => Some(format!("models/blocks/{file}")),
        AssetKind::Sound => {
            let rest = after_segment(&asset.path, "sounds").unwrap_or(file);
            Some(format!("sounds/{rest}"))
        }
        AssetKind::Lang => Some(format!("texts/{}.lang", asset.stem())),
        AssetKind::Other => None,
    }
}

/// Path remainder after the first `/<segment>/` (or a leading `<segment>/`).
fn after_segment<'a>(path: &'a str, segment: &str) -> Option<&'a str> {
    let leading = format!("{segment}/");
    if let Some(rest) = path.strip_prefix(leading.as_str()) {
        return Some(rest);
    }
    let inner = format!("/{segment}/");
    path.find(&inner).map(|idx| &path[idx + inner.len()..])
}
