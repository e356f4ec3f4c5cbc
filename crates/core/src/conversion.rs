//! Conversion request options and Bedrock target-version capabilities.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Target Bedrock version used when the request does not name one.
pub const DEFAULT_TARGET_VERSION: &str = "1.20.0";

/// Structure blocks and `.mcstructure` placement.
pub const CAP_STRUCTURES: &str = "structures";
/// Blocks with container inventories.
pub const CAP_CONTAINER_BLOCKS: &str = "container_blocks";
/// Data-driven block permutations and states.
pub const CAP_BLOCK_STATES: &str = "block_states";
/// Script-backed block and item custom components.
pub const CAP_CUSTOM_COMPONENTS: &str = "custom_components";

/// Each capability and the first Bedrock version that supports it.
const CAPABILITY_FLOORS: &[(&str, BedrockVersion)] = &[
    (CAP_STRUCTURES, BedrockVersion::new(1, 16, 0)),
    (CAP_CONTAINER_BLOCKS, BedrockVersion::new(1, 19, 0)),
    (CAP_BLOCK_STATES, BedrockVersion::new(1, 19, 70)),
    (CAP_CUSTOM_COMPONENTS, BedrockVersion::new(1, 21, 0)),
];

/// A `MAJOR.MINOR.PATCH` Bedrock engine version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BedrockVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl BedrockVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// The version as the `[major, minor, patch]` triple used in manifests.
    pub fn triple(self) -> [u32; 3] {
        [self.major, self.minor, self.patch]
    }

    /// Capabilities available when targeting this version.
    pub fn capabilities(self) -> BTreeSet<&'static str> {
        CAPABILITY_FLOORS
            .iter()
            .filter(|(_, floor)| self >= *floor)
            .map(|(cap, _)| *cap)
            .collect()
    }
}

impl FromStr for BedrockVersion {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            CoreError::Validation(format!(
                "targetVersion '{s}' must have the form MAJOR.MINOR.PATCH"
            ))
        };

        let mut parts = s.split('.');
        let mut next = || -> Result<u32, CoreError> {
            let part = parts.next().ok_or_else(invalid)?;
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse().map_err(|_| invalid())
        };

        let version = Self::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(version)
    }
}

impl fmt::Display for BedrockVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Options recognised on a conversion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConversionOptions {
    /// Apply smart assumptions to features without a direct mapping.
    pub smart_assumptions: bool,
    /// Convert classes belonging to bundled dependencies as well.
    pub include_dependencies: bool,
    pub target_version: String,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            smart_assumptions: true,
            include_dependencies: true,
            target_version: DEFAULT_TARGET_VERSION.to_string(),
        }
    }
}

impl ConversionOptions {
    /// Validate and parse the target version.
    pub fn target(&self) -> Result<BedrockVersion, CoreError> {
        self.target_version.parse()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn options_default_when_fields_are_missing() {
        let options: ConversionOptions = serde_json::from_str("{}").unwrap();
        assert!(options.smart_assumptions);
        assert!(options.include_dependencies);
        assert_eq!(options.target_version, DEFAULT_TARGET_VERSION);
    }

    #[test]
    fn options_use_camel_case_keys() {
        let options: ConversionOptions = serde_json::from_value(serde_json::json!({
            "smartAssumptions": false,
            "targetVersion": "1.21.0"
        }))
        .unwrap();
        assert!(!options.smart_assumptions);
        assert!(options.include_dependencies);
        assert_eq!(options.target().unwrap(), BedrockVersion::new(1, 21, 0));
    }

    #[test]
    fn version_parsing_rejects_malformed_input() {
        for bad in ["", "1.20", "1.20.0.1", "1.x.0", "v1.20.0", "1..0", "1.20.-1"] {
            assert_matches!(bad.parse::<BedrockVersion>(), Err(CoreError::Validation(_)), "{bad}");
        }
    }

    #[test]
    fn versions_order_numerically() {
        let a: BedrockVersion = "1.19.70".parse().unwrap();
        let b: BedrockVersion = "1.20.0".parse().unwrap();
        assert!(a < b);
        assert_eq!(b.to_string(), "1.20.0");
        assert_eq!(b.triple(), [1, 20, 0]);
    }

    #[test]
    fn capabilities_grow_with_version() {
        let old = BedrockVersion::new(1, 16, 0).capabilities();
        assert!(old.contains(CAP_STRUCTURES));
        assert!(!old.contains(CAP_CONTAINER_BLOCKS));

        let default_caps = BedrockVersion::new(1, 20, 0).capabilities();
        assert!(default_caps.contains(CAP_BLOCK_STATES));
        assert!(!default_caps.contains(CAP_CUSTOM_COMPONENTS));

        assert!(BedrockVersion::new(1, 21, 0)
            .capabilities()
            .contains(CAP_CUSTOM_COMPONENTS));
        assert!(BedrockVersion::new(1, 15, 9).capabilities().is_empty());
    }
}
