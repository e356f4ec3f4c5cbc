//! Detected Java features and their Bedrock mapping decisions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::artifact::JavaClass;

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// What kind of construct a Java class represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureCategory {
    Dimension,
    Machinery,
    Gui,
    ClientRendering,
    Block,
    Item,
    Recipe,
    Entity,
    #[serde(other)]
    Other,
}

impl FeatureCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dimension => "dimension",
            Self::Machinery => "machinery",
            Self::Gui => "gui",
            Self::ClientRendering => "client_rendering",
            Self::Block => "block",
            Self::Item => "item",
            Self::Recipe => "recipe",
            Self::Entity => "entity",
            Self::Other => "other",
        }
    }

    /// Whether features of this category produce a behaviour definition.
    pub fn has_behavior(self) -> bool {
        matches!(
            self,
            Self::Dimension | Self::Machinery | Self::Gui | Self::Block | Self::Item | Self::Entity
        )
    }
}

impl fmt::Display for FeatureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name fragments that mark a category, checked in order.
///
/// Rendering and dimension markers come first: a `PortalBlock` is a
/// dimension feature, a `ChestRenderer` is rendering, not a block.
const CATEGORY_MARKERS: &[(FeatureCategory, &[&str])] = &[
    (
        FeatureCategory::ClientRendering,
        &["Renderer", "Shader", "ModelLayer", "ParticleProvider"],
    ),
    (
        FeatureCategory::Dimension,
        &["ChunkGenerator", "Dimension", "PortalBlock", "BiomeSource"],
    ),
    (
        FeatureCategory::Machinery,
        &["EnergyStorage", "TickingBlockEntity", "Machine", "Generator"],
    ),
    (
        FeatureCategory::Gui,
        &["ContainerScreen", "Screen", "Menu"],
    ),
    (FeatureCategory::Recipe, &["Recipe"]),
    (FeatureCategory::Entity, &["Entity", "Mob", "Monster", "Animal"]),
    (FeatureCategory::Block, &["Block"]),
    (FeatureCategory::Item, &["Item"]),
];

/// Derive the category of a class from its own name and the types it
/// extends or implements.
pub fn classify(class: &JavaClass) -> FeatureCategory {
    let names: Vec<&str> = std::iter::once(class.name.as_str())
        .chain(class.referenced_types())
        .map(crate::artifact::simple_name)
        .collect();

    CATEGORY_MARKERS
        .iter()
        .find(|(_, markers)| {
            names
                .iter()
                .any(|name| markers.iter().any(|marker| name.contains(marker)))
        })
        .map(|(category, _)| *category)
        .unwrap_or(FeatureCategory::Other)
}

/// The signature used for direct-mapping lookups: the superclass simple
/// name when present, otherwise the class's own simple name.
pub fn java_signature(class: &JavaClass) -> String {
    class
        .superclass_simple_name()
        .unwrap_or_else(|| class.simple_name())
        .to_string()
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// How a feature is carried over to Bedrock.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MappingDecision {
    /// A Bedrock equivalent exists.
    Direct,
    /// A lossy replacement chosen from the rule table.
    SmartAssumption { assumption_type: String },
    /// The feature is dropped.
    Excluded { reason: String },
}

impl MappingDecision {
    pub fn smart_assumption(assumption_type: impl Into<String>) -> Self {
        Self::SmartAssumption {
            assumption_type: assumption_type.into(),
        }
    }

    pub fn excluded(reason: impl Into<String>) -> Self {
        Self::Excluded {
            reason: reason.into(),
        }
    }

    pub fn is_excluded(&self) -> bool {
        matches!(self, Self::Excluded { .. })
    }

    /// Short label used in reports and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::SmartAssumption { .. } => "smart_assumption",
            Self::Excluded { .. } => "excluded",
        }
    }
}

/// A decision plus the metadata surfaced in the conversion report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub decision: MappingDecision,
    /// Confidence that the converted feature behaves as intended (0.0-1.0).
    pub confidence: f64,
    /// Human-readable description of what is lost. Empty for direct mappings.
    pub functional_loss: String,
    /// Bedrock component or strategy the feature is mapped onto.
    pub target: Option<String>,
}

// ---------------------------------------------------------------------------
// FeatureRecord
// ---------------------------------------------------------------------------

/// One detected Java construct and, once the architect has run, its
/// resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Stable within one analysis: `<category>:<class simple name>`.
    pub feature_id: String,
    pub category: FeatureCategory,
    pub java_signature: String,
    /// Fully qualified class the feature was detected from.
    pub class_name: String,
    pub resolution: Option<Resolution>,
}

impl FeatureRecord {
    /// Build an unresolved record from a class.
    pub fn from_class(class: &JavaClass) -> Self {
        let category = classify(class);
        Self {
            feature_id: format!("{category}:{}", class.simple_name()),
            category,
            java_signature: java_signature(class),
            class_name: class.name.clone(),
            resolution: None,
        }
    }

    /// Return a copy carrying the given resolution.
    pub fn resolved(&self, resolution: Resolution) -> Self {
        Self {
            resolution: Some(resolution),
            ..self.clone()
        }
    }

    pub fn decision(&self) -> Option<&MappingDecision> {
        self.resolution.as_ref().map(|r| &r.decision)
    }

    /// `true` once resolved to anything other than `Excluded`.
    pub fn is_converted(&self) -> bool {
        self.decision().is_some_and(|d| !d.is_excluded())
    }

    /// Bedrock-style snake_case name derived from the class name,
    /// e.g. `RubyOreBlock` -> `ruby_ore_block`.
    pub fn snake_name(&self) -> String {
        to_snake_case(crate::artifact::simple_name(&self.class_name))
    }
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else if ch.is_ascii_alphanumeric() {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    out
}
