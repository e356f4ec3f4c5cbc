use std::io::{Cursor, Read};

use async_trait::async_trait;
use modporter_db::models::status::JobStatus;
use serde_json::{json, Value};
use uuid::Uuid;
use zip::ZipArchive;

use super::{pack_dirs, require_mod_id, ASSET_MAP_FILE, MANIFEST_FILE};
use crate::context::StageContext;
use crate::stage::{Stage, StageError, StageResult, STAGE_QA_VALIDATOR};

/// Reopens the stored archive and checks its structure.
///
/// Rules, in order; the first one broken fails the stage:
///
/// 1. Both pack manifests exist, parse, and carry `format_version` 2 with
///    valid header and module uuids.
/// 2. The two header uuids differ.
/// 3. Every `identifier` in a behaviour file is namespaced with the mod id.
/// 4. The archive holds converted content besides the manifests. An asset
///    map counts only when it lists at least one asset.
pub struct QaValidator;

#[async_trait]
impl Stage for QaValidator {
    fn name(&self) -> &'static str {
        STAGE_QA_VALIDATOR
    }

    fn status(&self) -> JobStatus {
        JobStatus::Packaging
    }

    fn progress_start(&self) -> u8 {
        90
    }

    async fn execute(&self, ctx: &mut StageContext) -> Result<StageResult, StageError> {
        let mod_id = require_mod_id(ctx)?;
        let reference = ctx
            .package_reference
            .clone()
            .ok_or_else(|| StageError::QaValidation("No package was produced".into()))?;

        let bytes = ctx
            .artifacts
            .find_package(&reference)
            .await
            .map_err(|e| StageError::QaValidation(format!("Cannot read package: {e}")))?
            .ok_or_else(|| StageError::QaValidation(format!("Package {reference} not found")))?;

        let report = validate_archive(bytes, &mod_id).map_err(StageError::QaValidation)?;

        tracing::debug!(
            job_id = %ctx.job_id,
            entries = report.entries,
            content_files = report.content_files,
            "Package validated",
        );
        let output = json!({
            "entries": report.entries,
            "content_files": report.content_files,
            "identifiers_checked": report.identifiers,
        });
        Ok(StageResult::new(10, "Package passed validation").with_output(output))
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ArchiveReport {
    entries: usize,
    content_files: usize,
    identifiers: usize,
}

fn validate_archive(bytes: Vec<u8>, mod_id: &str) -> Result<ArchiveReport, String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| format!("Package is not a readable archive: {e}"))?;
    let (bp_dir, rp_dir) = pack_dirs(mod_id);
    let bp_manifest = format!("{bp_dir}/{MANIFEST_FILE}");
    let rp_manifest = format!("{rp_dir}/{MANIFEST_FILE}");
    let asset_map = format!("{rp_dir}/{ASSET_MAP_FILE}");

    let bp_uuid = check_manifest(&read_json(&mut archive, &bp_manifest)?, &bp_manifest)?;
    let rp_uuid = check_manifest(&read_json(&mut archive, &rp_manifest)?, &rp_manifest)?;
    if bp_uuid == rp_uuid {
        return Err("Behaviour and resource pack share the same header uuid".into());
    }

    let names: Vec<String> = archive.file_names().map(str::to_owned).collect();
    let bp_prefix = format!("{bp_dir}/");
    let mut report = ArchiveReport {
        entries: names.len(),
        ..ArchiveReport::default()
    };

    for name in &names {
        if name.ends_with('/') || *name == bp_manifest || *name == rp_manifest {
            continue;
        }
        if *name == asset_map {
            let listed = read_json(&mut archive, name)?["assets"]
                .as_array()
                .is_some_and(|assets| !assets.is_empty());
            if listed {
                report.content_files += 1;
            }
            continue;
        }
        report.content_files += 1;
        if name.starts_with(&bp_prefix) {
            let value = read_json(&mut archive, name)?;
            let mut identifiers = Vec::new();
            collect_identifiers(&value, &mut identifiers);
            let namespace = format!("{mod_id}:");
            if let Some(bad) = identifiers.iter().find(|id| !id.starts_with(&namespace)) {
                return Err(format!(
                    "Identifier '{bad}' in {name} is not namespaced with '{mod_id}'"
                ));
            }
            report.identifiers += identifiers.len();
        }
    }

    if report.content_files == 0 {
        return Err("Package contains no converted content".into());
    }
    Ok(report)
}

fn read_json(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> Result<Value, String> {
    let mut entry = archive
        .by_name(name)
        .map_err(|_| format!("Missing {name}"))?;
    let mut text = String::new();
    entry
        .read_to_string(&mut text)
        .map_err(|e| format!("Cannot read {name}: {e}"))?;
    serde_json::from_str(&text).map_err(|e| format!("{name} is not valid JSON: {e}"))
}

/// Header uuid of a well-formed manifest.
fn check_manifest(manifest: &Value, name: &str) -> Result<Uuid, String> {
    if manifest["format_version"] != 2 {
        return Err(format!("{name} must declare format_version 2"));
    }
    let header = parse_uuid(&manifest["header"]["uuid"])
        .ok_or_else(|| format!("{name} has a missing or invalid header uuid"))?;

    let modules = manifest["modules"]
        .as_array()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| format!("{name} declares no modules"))?;
    if modules.iter().any(|m| parse_uuid(&m["uuid"]).is_none()) {
        return Err(format!("{name} has a module with an invalid uuid"));
    }
    Ok(header)
}

fn parse_uuid(value: &Value) -> Option<Uuid> {
    value.as_str().and_then(|s| Uuid::parse_str(s).ok())
}

fn collect_identifiers(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                match (key.as_str(), child) {
                    ("identifier", Value::String(id)) => out.push(id.clone()),
                    _ => collect_identifiers(child, out),
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_identifiers(item, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    use super::*;
    use crate::stages::fixtures;
    use crate::stages::{
        AssetConverter, BedrockArchitect, JavaAnalyzer, LogicTranslator, PackagingAgent,
    };

    fn manifest(uuid: &str) -> Value {
        json!({
            "format_version": 2,
            "header": { "uuid": uuid, "version": [1, 0, 0] },
            "modules": [{ "type": "data", "uuid": Uuid::new_v4().to_string() }],
        })
    }

    fn archive(entries: &[(&str, Value)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, value) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).expect("entry");
            zip.write_all(value.to_string().as_bytes()).expect("write");
        }
        zip.finish().expect("finish").into_inner()
    }

    fn valid_entries() -> Vec<(&'static str, Value)> {
        vec![
            ("gems_BP/manifest.json", manifest(&Uuid::new_v4().to_string())),
            ("gems_RP/manifest.json", manifest(&Uuid::new_v4().to_string())),
            (
                "gems_BP/blocks/ruby_block.json",
                json!({ "minecraft:block": { "description": { "identifier": "gems:ruby_block" } } }),
            ),
        ]
    }

    #[test]
    fn accepts_a_well_formed_archive() {
        let report = validate_archive(archive(&valid_entries()), "gems").expect("valid");
        assert_eq!(report.entries, 3);
        assert_eq!(report.content_files, 1);
        assert_eq!(report.identifiers, 1);
    }

    #[test]
    fn rejects_missing_manifest() {
        let entries = valid_entries().into_iter().skip(1).collect::<Vec<_>>();
        assert_matches!(
            validate_archive(archive(&entries), "gems"),
            Err(msg) if msg.contains("Missing gems_BP/manifest.json")
        );
    }

    #[test]
    fn rejects_shared_header_uuid() {
        let shared = Uuid::new_v4().to_string();
        let mut entries = valid_entries();
        entries[0].1 = manifest(&shared);
        entries[1].1 = manifest(&shared);
        assert_matches!(
            validate_archive(archive(&entries), "gems"),
            Err(msg) if msg.contains("same header uuid")
        );
    }

    #[test]
    fn rejects_invalid_header_uuid() {
        let mut entries = valid_entries();
        entries[1].1 = manifest("not-a-uuid");
        assert_matches!(
            validate_archive(archive(&entries), "gems"),
            Err(msg) if msg.contains("header uuid")
        );
    }

    #[test]
    fn rejects_foreign_identifiers() {
        let mut entries = valid_entries();
        entries[2].1 = json!({ "minecraft:item": { "description": { "identifier": "minecraft:ruby" } } });
        assert_matches!(
            validate_archive(archive(&entries), "gems"),
            Err(msg) if msg.contains("minecraft:ruby")
        );
    }

    #[test]
    fn rejects_manifest_only_archives() {
        let mut entries = valid_entries();
        entries.truncate(2);
        entries.push(("gems_RP/asset_map.json", json!({ "assets": [] })));
        assert_matches!(
            validate_archive(archive(&entries), "gems"),
            Err(msg) if msg.contains("no converted content")
        );
    }

    #[test]
    fn asset_map_with_entries_is_content() {
        let mut entries = valid_entries();
        entries.truncate(2);
        entries.push((
            "gems_RP/asset_map.json",
            json!({ "assets": [{ "source": "assets/gems/sounds/chime.ogg", "target": "sounds/chime.ogg" }] }),
        ));
        let report = validate_archive(archive(&entries), "gems").expect("valid");
        assert_eq!(report.content_files, 1);
        assert_eq!(report.identifiers, 0);
    }

    #[tokio::test]
    async fn validates_a_packaged_conversion() {
        let mut ctx = fixtures::context().await;
        JavaAnalyzer.execute(&mut ctx).await.expect("analysis");
        BedrockArchitect.execute(&mut ctx).await.expect("planning");
        LogicTranslator.execute(&mut ctx).await.expect("translation");
        AssetConverter.execute(&mut ctx).await.expect("assets");
        PackagingAgent.execute(&mut ctx).await.expect("packaging");

        let result = QaValidator.execute(&mut ctx).await.expect("validation passes");
        assert_eq!(result.progress_delta, 10);
        assert_eq!(result.output["identifiers_checked"], 2);
    }

    #[tokio::test]
    async fn missing_package_is_a_validation_error() {
        let mut ctx = fixtures::context().await;
        JavaAnalyzer.execute(&mut ctx).await.expect("analysis");
        assert_matches!(
            QaValidator.execute(&mut ctx).await,
            Err(StageError::QaValidation(_))
        );
    }
}
