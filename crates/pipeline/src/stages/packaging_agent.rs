use std::io::{Cursor, Write};

use async_trait::async_trait;
use modporter_core::artifact::ModArtifact;
use modporter_core::conversion::BedrockVersion;
use modporter_db::models::status::JobStatus;
use serde_json::{json, Value};
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::pack_dirs;
use crate::context::{ResourceContent, StageContext};
use crate::stage::{Stage, StageError, StageResult, STAGE_PACKAGING_AGENT};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Resource-pack index of assets to be copied from the mod jar.
pub const ASSET_MAP_FILE: &str = "asset_map.json";

/// Assembles the `.mcaddon` archive and hands it to storage.
pub struct PackagingAgent;

#[async_trait]
impl Stage for PackagingAgent {
    fn name(&self) -> &'static str {
        STAGE_PACKAGING_AGENT
    }

    fn status(&self) -> JobStatus {
        JobStatus::Packaging
    }

    fn progress_start(&self) -> u8 {
        75
    }

    async fn execute(&self, ctx: &mut StageContext) -> Result<StageResult, StageError> {
        let artifact = ctx.artifact.as_ref().ok_or_else(|| {
            StageError::Packaging("Nothing to package: mod artifact was not analyzed".into())
        })?;

        let entries = pack_entries(artifact, ctx)?;
        let file_count = entries.len();
        let bytes = write_archive(&entries)
            .map_err(|e| StageError::Packaging(format!("Cannot write add-on archive: {e}")))?;
        let size = bytes.len();

        let reference = ctx
            .artifacts
            .put_package(ctx.job_id, bytes)
            .await
            .map_err(|e| StageError::Packaging(format!("Cannot store add-on: {e}")))?;

        tracing::info!(
            job_id = %ctx.job_id,
            reference = %reference,
            files = file_count,
            size_bytes = size,
            "Add-on packaged",
        );

        let output = json!({
            "result_reference": reference,
            "files": file_count,
            "size_bytes": size,
        });
        ctx.package_reference = Some(reference);
        Ok(StageResult::new(15, format!("Packaged {file_count} files")).with_output(output))
    }
}

/// Every archive entry as `(path, json)`, manifests first.
fn pack_entries(
    artifact: &ModArtifact,
    ctx: &StageContext,
) -> Result<Vec<(String, Value)>, StageError> {
    let (bp_dir, rp_dir) = pack_dirs(&artifact.mod_id);
    let version = pack_version(&artifact.version);
    let rp_uuid = Uuid::new_v4();

    let rp_manifest = manifest(
        &format!("{} Resources", artifact.name),
        rp_uuid,
        "resources",
        version,
        ctx.target,
        None,
    );
    let bp_manifest = manifest(
        &format!("{} Behaviors", artifact.name),
        Uuid::new_v4(),
        "data",
        version,
        ctx.target,
        Some(rp_uuid),
    );

    let mut entries = vec![
        (format!("{bp_dir}/{MANIFEST_FILE}"), bp_manifest),
        (format!("{rp_dir}/{MANIFEST_FILE}"), rp_manifest),
    ];
    for behavior in &ctx.behaviors {
        entries.push((format!("{bp_dir}/{}", behavior.path), behavior.content.clone()));
    }

    let mut copies = Vec::new();
    for resource in &ctx.resources {
        match &resource.content {
            ResourceContent::Json(value) => {
                entries.push((format!("{rp_dir}/{}", resource.path), value.clone()));
            }
            ResourceContent::CopyFrom { source, kind } => copies.push(json!({
                "source": source,
                "target": resource.path,
                "kind": kind,
            })),
        }
    }
    if !copies.is_empty() {
        entries.push((
            format!("{rp_dir}/{ASSET_MAP_FILE}"),
            json!({ "file_id": ctx.file_id, "assets": copies }),
        ));
    }

    let mut seen = std::collections::HashSet::new();
    if let Some((path, _)) = entries.iter().find(|(path, _)| !seen.insert(path.as_str())) {
        return Err(StageError::Packaging(format!("Duplicate archive entry {path}")));
    }
    Ok(entries)
}

fn manifest(
    name: &str,
    header_uuid: Uuid,
    module_type: &str,
    version: [u32; 3],
    target: BedrockVersion,
    depends_on: Option<Uuid>,
) -> Value {
    let mut manifest = json!({
        "format_version": 2,
        "header": {
            "name": name,
            "description": "Converted from a Java Edition mod",
            "uuid": header_uuid.to_string(),
            "version": version,
            "min_engine_version": target.triple(),
        },
        "modules": [{
            "type": module_type,
            "uuid": Uuid::new_v4().to_string(),
            "version": version,
        }],
    });
    if let Some(dependency) = depends_on {
        manifest["dependencies"] = json!([{ "uuid": dependency.to_string(), "version": version }]);
    }
    manifest
}

/// `major.minor.patch` prefix of a mod version; anything unparseable is 1.0.0.
fn pack_version(mod_version: &str) -> [u32; 3] {
    let core = mod_version.split(&['-', '+'][..]).next().unwrap_or_default();
    let parts: Vec<u32> = core
        .split('.')
        .map_while(|p| p.parse().ok())
        .take(3)
        .collect();
    match parts.as_slice() {
        [] => [1, 0, 0],
        [major] => [*major, 0, 0],
        [major, minor] => [*major, *minor, 0],
        [major, minor, patch, ..] => [*major, *minor, *patch],
    }
}

fn write_archive(
    entries: &[(String, Value)],
) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (path, value) in entries {
        zip.start_file(path.as_str(), options)?;
        zip.write_all(&serde_json::to_vec_pretty(value)?)?;
    }
    Ok(zip.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use assert_matches::assert_matches;
    use zip::ZipArchive;

    use super::*;
    use crate::stages::fixtures;
    use crate::stages::{AssetConverter, BedrockArchitect, JavaAnalyzer, LogicTranslator};

    async fn converted() -> StageContext {
        let mut ctx = fixtures::context().await;
        JavaAnalyzer.execute(&mut ctx).await.expect("analysis succeeds");
        BedrockArchitect.execute(&mut ctx).await.expect("planning succeeds");
        LogicTranslator.execute(&mut ctx).await.expect("translation succeeds");
        AssetConverter.execute(&mut ctx).await.expect("assets succeed");
        ctx
    }

    fn read_json(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> Value {
        let mut text = String::new();
        archive
            .by_name(name)
            .expect("entry present")
            .read_to_string(&mut text)
            .expect("utf-8 entry");
        serde_json::from_str(&text).expect("json entry")
    }

    #[tokio::test]
    async fn writes_and_stores_the_archive() {
        let mut ctx = converted().await;
        PackagingAgent.execute(&mut ctx).await.expect("packaging succeeds");

        let reference = ctx.package_reference.clone().expect("reference recorded");
        assert!(reference.ends_with(".mcaddon"));
        let bytes = ctx
            .artifacts
            .find_package(&reference)
            .await
            .expect("repo available")
            .expect("package stored");

        let mut archive = ZipArchive::new(Cursor::new(bytes)).expect("valid zip");
        let bp = read_json(&mut archive, "gems_BP/manifest.json");
        let rp = read_json(&mut archive, "gems_RP/manifest.json");
        assert_eq!(bp["format_version"], 2);
        assert_eq!(bp["header"]["min_engine_version"], json!([1, 20, 0]));
        assert_eq!(bp["header"]["version"], json!([1, 2, 0]));
        assert_eq!(bp["dependencies"][0]["uuid"], rp["header"]["uuid"]);
        assert_eq!(rp["modules"][0]["type"], "resources");

        let block = read_json(&mut archive, "gems_BP/blocks/ruby_block.json");
        assert_eq!(block["minecraft:block"]["description"]["identifier"], "gems:ruby_block");

        let asset_map = read_json(&mut archive, "gems_RP/asset_map.json");
        assert_eq!(asset_map["assets"].as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn requires_an_analyzed_artifact() {
        let mut ctx = fixtures::context().await;
        assert_matches!(
            PackagingAgent.execute(&mut ctx).await,
            Err(StageError::Packaging(_))
        );
    }

    #[test]
    fn pack_version_takes_the_numeric_prefix() {
        assert_eq!(pack_version("1.2.3"), [1, 2, 3]);
        assert_eq!(pack_version("2.1"), [2, 1, 0]);
        assert_eq!(pack_version("1.20.1-forge-47.2"), [1, 20, 1]);
        assert_eq!(pack_version("beta"), [1, 0, 0]);
    }
}
