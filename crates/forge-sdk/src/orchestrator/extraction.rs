//! Feature extraction from generated artifacts.
//!
//! Reads the generator's `tech_stack`/`features` metadata, detects common
//! features from artifact content, and keeps a snippet for pattern building.

use std::collections::{BTreeMap, BTreeSet};

use crate::memory::{ArtifactFeatures, SNIPPET_CHARS};
use crate::{ForgeError, ForgeResult};

/// Artifact preferred as the snippet source
const PRIMARY_ARTIFACT: &str = "index.html";

/// Content markers and the feature they indicate
const FEATURE_MARKERS: &[(&str, &str)] = &[
    ("@media", "responsive"),
    ("localStorage", "local_storage"),
    ("aria-", "accessibility"),
    ("addEventListener", "interactivity"),
    ("fetch(", "network"),
    ("<form", "forms"),
    ("<canvas", "canvas"),
    ("WebSocket", "websocket"),
];

/// Extract features from a generation's artifacts and metadata.
///
/// # Errors
///
/// Returns [`ForgeError::PatternExtraction`] when there are no artifacts or
/// the metadata's `tech_stack`/`features` are not lists of strings.
pub fn extract_features(
    artifacts: &BTreeMap<String, String>,
    metadata: &BTreeMap<String, serde_json::Value>,
) -> ForgeResult<ArtifactFeatures> {
    if artifacts.is_empty() {
        return Err(ForgeError::pattern_extraction("no artifacts to extract from"));
    }

    let mut tech_stack: BTreeSet<String> = artifacts
        .keys()
        .filter_map(|name| tech_for_extension(name))
        .map(str::to_string)
        .collect();
    tech_stack.extend(string_list(metadata, "tech_stack")?);

    let mut features: BTreeSet<String> = string_list(metadata, "features")?
        .iter()
        .map(|f| slug(f))
        .filter(|f| !f.is_empty())
        .collect();
    for content in artifacts.values() {
        for (marker, feature) in FEATURE_MARKERS {
            if content.contains(marker) {
                features.insert((*feature).to_string());
            }
        }
    }

    let source = artifacts
        .get(PRIMARY_ARTIFACT)
        .or_else(|| artifacts.values().next())
        .map(String::as_str)
        .unwrap_or_default();
    let snippet: String = source.chars().take(SNIPPET_CHARS).collect();

    Ok(ArtifactFeatures {
        features,
        tech_stack,
        snippet: (!snippet.is_empty()).then_some(snippet),
    })
}

fn tech_for_extension(name: &str) -> Option<&'static str> {
    let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "html" | "htm" => Some("HTML"),
        "css" => Some("CSS"),
        "js" | "mjs" => Some("JavaScript"),
        "ts" => Some("TypeScript"),
        "tsx" | "jsx" => Some("React"),
        "py" => Some("Python"),
        "rs" => Some("Rust"),
        "json" => Some("JSON"),
        _ => None,
    }
}

fn string_list(metadata: &BTreeMap<String, serde_json::Value>, key: &str) -> ForgeResult<Vec<String>> {
    let Some(value) = metadata.get(key) else {
        return Ok(Vec::new());
    };
    let items = value
        .as_array()
        .ok_or_else(|| ForgeError::pattern_extraction(format!("metadata `{key}` is not a list")))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| ForgeError::pattern_extraction(format!("metadata `{key}` holds a non-string")))
        })
        .collect()
}

/// "Local storage" -> "local_storage"
fn slug(s: &str) -> String {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}
