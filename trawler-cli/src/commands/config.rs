//! `trawler config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use trawler_core::config::TrawlerConfig;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Section names accepted by `config show --section`.
pub const SECTIONS: &[&str] = &["general", "executor", "parser", "enrichment", "inventory"];

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, writer).await,
        ConfigAction::Show { section } => execute_show(config_path, section, writer).await,
    }
}

/// Loads and validates the configuration file, reporting any errors.
///
/// # Errors
///
/// Returns `CliError::Config` if the file is missing, malformed or invalid.
async fn execute_validate(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");

    let report = match TrawlerConfig::load(config_path).await {
        Ok(_) => ConfigValidationReport {
            source: config_path.display().to_string(),
            valid: true,
            errors: Vec::new(),
        },
        Err(e) => ConfigValidationReport {
            source: config_path.display().to_string(),
            valid: false,
            errors: vec![e.to_string()],
        },
    };

    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }
    Ok(())
}

/// Shows the effective configuration (file + env overrides + defaults).
///
/// A missing file shows the defaults.
async fn execute_show(
    config_path: &Path,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), "loading configuration");

    let config = TrawlerConfig::load_or_default(config_path).await?;
    let report = build_report(&config, config_path, section)?;
    writer.render(&report)
}

fn build_report(
    config: &TrawlerConfig,
    config_path: &Path,
    section: Option<String>,
) -> Result<ConfigReport, CliError> {
    let rendered = match section.as_deref() {
        None => toml::to_string_pretty(config),
        Some("general") => toml::to_string_pretty(&config.general),
        Some("executor") => toml::to_string_pretty(&config.executor),
        Some("parser") => toml::to_string_pretty(&config.parser),
        Some("enrichment") => toml::to_string_pretty(&config.enrichment),
        Some("inventory") => toml::to_string_pretty(&config.inventory),
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {other} (expected: {})",
                SECTIONS.join(", ")
            )));
        }
    };

    Ok(ConfigReport {
        source: config_path.display().to_string(),
        section,
        config: serde_json::to_value(config)?,
        config_toml: rendered.map_err(|e| CliError::Config(format!("serialization failed: {e}")))?,
    })
}

/// Configuration display report.
///
/// `config_toml` is only used for text rendering. JSON output carries the
/// full effective configuration under `config`.
#[derive(Serialize)]
pub struct ConfigReport {
    /// Configuration file path
    pub source: String,
    /// Optional section name (None = full config)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Effective configuration
    pub config: serde_json::Value,
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if let Some(section) = &self.section {
            let label = format!("[{section}]");
            writeln!(w, "Configuration {} (source: {})", label.bold(), self.source)?;
        } else {
            writeln!(w, "Configuration (source: {})", self.source.bold())?;
        }

        writeln!(w)?;
        write!(w, "{}", self.config_toml)
    }
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    /// Configuration file path
    pub source: String,
    /// Whether the configuration is valid
    pub valid: bool,
    /// Validation error messages (empty if valid)
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;

        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }
        Ok(())
    }
}
