//! Contract for uploaded Java mod artifacts.
//!
//! Upload handling and bytecode parsing live outside this service. What
//! reaches the conversion pipeline is a [`ModArtifact`]: the already
//! extracted class hierarchy and asset listing of one mod jar, addressed
//! by an opaque `file_id`.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Maximum length of an artifact handle.
pub const MAX_FILE_ID_LEN: usize = 128;

static FILE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid regex"));

/// Validate the shape of an artifact handle.
///
/// Handles are 1-128 characters of ASCII letters, digits, `_` and `-`.
pub fn validate_file_id(file_id: &str) -> Result<(), CoreError> {
    if file_id.is_empty() {
        return Err(CoreError::Validation("file_id is required".into()));
    }
    if file_id.len() > MAX_FILE_ID_LEN {
        return Err(CoreError::Validation(format!(
            "file_id must be at most {MAX_FILE_ID_LEN} characters"
        )));
    }
    if !FILE_ID_RE.is_match(file_id) {
        return Err(CoreError::Validation(format!(
            "file_id '{file_id}' contains invalid characters"
        )));
    }
    Ok(())
}

/// One Java class as reported by the artifact extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JavaClass {
    /// Fully qualified name, e.g. `com.example.mymod.block.RubyBlock`.
    pub name: String,
    /// Fully qualified superclass name, if any.
    #[serde(default)]
    pub superclass: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
}

impl JavaClass {
    /// The unqualified class name.
    pub fn simple_name(&self) -> &str {
        simple_name(&self.name)
    }

    /// The unqualified superclass name, if any.
    pub fn superclass_simple_name(&self) -> Option<&str> {
        self.superclass.as_deref().map(simple_name)
    }

    /// Every type this class directly names (superclass first).
    pub fn referenced_types(&self) -> impl Iterator<Item = &str> {
        self.superclass
            .as_deref()
            .into_iter()
            .chain(self.interfaces.iter().map(String::as_str))
    }
}

/// Strip the package from a fully qualified Java name.
pub fn simple_name(qualified: &str) -> &str {
    qualified.rsplit('.').next().unwrap_or(qualified)
}

/// Kind of a packaged resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Texture,
    Model,
    Sound,
    Lang,
    Other,
}

/// One resource file inside the mod jar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntry {
    /// Jar-relative path, e.g. `assets/mymod/textures/block/ruby_block.png`.
    pub path: String,
    pub kind: AssetKind,
}

impl AssetEntry {
    /// File stem of the asset (`ruby_block` for `.../ruby_block.png`).
    pub fn stem(&self) -> &str {
        let file = self.path.rsplit('/').next().unwrap_or(&self.path);
        file.split('.').next().unwrap_or(file)
    }
}

/// Extracted description of one Java-Edition mod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModArtifact {
    /// Mod namespace, e.g. `mymod`. Used as the Bedrock identifier namespace.
    pub mod_id: String,
    pub name: String,
    pub version: String,
    /// Mod loader the jar was built for (`forge`, `fabric`, ...).
    #[serde(default)]
    pub loader: Option<String>,
    #[serde(default)]
    pub java_classes: Vec<JavaClass>,
    #[serde(default)]
    pub assets: Vec<AssetEntry>,
    /// Package prefixes of bundled third-party dependencies.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl ModArtifact {
    /// Check the fields the pipeline relies on.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.mod_id.trim().is_empty() {
            return Err(CoreError::Validation("mod_id must not be empty".into()));
        }
        if !self
            .mod_id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(CoreError::Validation(format!(
                "mod_id '{}' must be lowercase letters, digits or '_'",
                self.mod_id
            )));
        }
        if self.name.trim().is_empty() {
            return Err(CoreError::Validation("name must not be empty".into()));
        }
        Ok(())
    }

    /// Whether a class belongs to one of the bundled dependencies.
    pub fn is_dependency_class(&self, class: &JavaClass) -> bool {
        self.dependencies
            .iter()
            .any(|prefix| class.name.starts_with(prefix.as_str()))
    }
}
