use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};
use crate::core::corpus::RecordKeys;
use crate::core::report::ReportFormat;
use crate::core::scan::RequiredFields;

pub const CONFIG_FILES: [&str; 4] = ["tmend.toml", "tmend.yaml", "tmend.json", ".tmend.toml"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Keys that carry record identity and grouping
    pub corpus: RecordKeys,

    /// Fields every topic must carry
    pub required: RequiredConfig,

    /// Default report settings
    pub report: ReportConfig,

    /// Write-back settings
    pub write: WriteConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequiredConfig
{
    pub default: Vec<String>,

    /// Per-category overrides; a list so category names keep their case
    pub category: Vec<CategoryRequirement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRequirement
{
    pub name: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig
{
    pub format: ReportFormat,
    pub color: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteConfig
{
    /// Snapshot the corpus before every write-back
    pub backup: bool,

    /// Where backups live; defaults to `.tmend` next to the corpus
    pub state_dir: Option<PathBuf>,
}

impl Default for RequiredConfig
{
    fn default() -> Self
    {
        Self {
            default: vec![
                "example".to_string(),
                "syntax".to_string(),
                "voiceExplanation".to_string(),
            ],
            category: Vec::new(),
        }
    }
}

impl Default for ReportConfig
{
    fn default() -> Self
    {
        Self { format: ReportFormat::Text, color: true }
    }
}

impl Default for WriteConfig
{
    fn default() -> Self
    {
        Self { backup: true, state_dir: None }
    }
}

impl From<&RequiredConfig> for RequiredFields
{
    fn from(cfg: &RequiredConfig) -> Self
    {
        cfg.category
            .iter()
            .fold(RequiredFields::new(cfg.default.iter().cloned()), |acc, c| {
                acc.with_category(c.name.clone(), c.fields.iter().cloned())
            })
    }
}

impl WriteConfig
{
    /// State directory for a given corpus file.
    pub fn state_dir_for(
        &self,
        corpus: &Path,
    ) -> PathBuf
    {
        match &self.state_dir
        {
            Some(dir) => dir.clone(),
            None => corpus
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."))
                .join(".tmend"),
        }
    }
}

/// Layered load: an explicit file, else the first config file found in
/// `dir`, then `TMEND_*` environment variables (`TMEND_WRITE__BACKUP=false`).
pub fn load_config(
    explicit: Option<&Path>,
    dir: &Path,
) -> Result<Config>
{
    let mut builder = config::Config::builder();

    match explicit
    {
        Some(path) =>
        {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        None =>
        {
            if let Some(found) = CONFIG_FILES
                .iter()
                .map(|name| dir.join(name))
                .find(|p| p.exists())
            {
                builder = builder.add_source(config::File::from(found));
            }
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TMEND")
            .prefix_separator("_")
            .separator("__"),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path = args
        .path
        .join("tmend.toml");

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_survive_toml_round_trip()
    {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back, Config::default());
    }

    #[test]
    fn category_overrides_keep_their_case()
    {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("tmend.toml"),
            "[required]\ndefault = [\"example\"]\n\n[[required.category]]\nname = \"Graph Theory\"\nfields = [\"pseudocode\"]\n",
        )
        .unwrap();

        let cfg = load_config(None, tmp.path()).unwrap();
        let required = RequiredFields::from(&cfg.required);
        assert_eq!(required.for_category(Some("Graph Theory")), ["pseudocode"]);
        assert_eq!(required.for_category(None), ["example"]);
        assert!(cfg.write.backup);
    }

    #[test]
    fn state_dir_defaults_next_to_corpus()
    {
        let w = WriteConfig::default();
        assert_eq!(
            w.state_dir_for(Path::new("content/topics.ts")),
            Path::new("content/.tmend")
        );
        assert_eq!(w.state_dir_for(Path::new("topics.ts")), Path::new("./.tmend"));
    }
}
