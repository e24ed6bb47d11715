//! Repair plans: an ordered list of operations kept in a TOML or JSON file.
//!
//! ```toml
//! [[ops]]
//! op = "insert-field"
//! topic = "array-push"
//! field = "syntax"
//! anchor = "voiceExplanation"
//! value = { style = "template", text = "arr.push(value)" }
//!
//! [[ops]]
//! op = "dedupe-field"
//! field = "example"
//! keep = "first"
//! ```

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::transform::Transform;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepairPlan {
    #[serde(default)]
    pub ops: Vec<Transform>,
}

impl RepairPlan {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid TOML repair plan")
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid JSON repair plan")
    }

    /// Load by extension: `.toml` or `.json`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read plan {}", path.display()))?;
        let plan = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&text),
            Some("json") => Self::from_json(&text),
            _ => bail!("plan {} must end in .toml or .json", path.display()),
        }
        .with_context(|| format!("load plan {}", path.display()))?;
        Ok(plan)
    }
}
