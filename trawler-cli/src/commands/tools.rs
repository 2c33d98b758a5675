//! `trawler tools` command handler

use std::io::Write;

use serde::Serialize;

use trawler_core::config::TrawlerConfig;
use trawler_executor::{ToolRegistry, ToolStatus};

use crate::cli::ToolsArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `tools` command.
pub fn execute(args: ToolsArgs, config: &TrawlerConfig, writer: &OutputWriter) -> Result<(), CliError> {
    let registry = ToolRegistry::from_config(&config.executor);
    let report = ToolsReport::from_registry(&registry, args.available_only);
    writer.render(&report)
}

/// `tools` output payload.
#[derive(Debug, Serialize)]
pub struct ToolsReport {
    pub sudo_enabled: bool,
    pub sudo_available: bool,
    pub installed: usize,
    pub tools: Vec<ToolStatus>,
}

impl ToolsReport {
    pub fn from_registry(registry: &ToolRegistry, available_only: bool) -> Self {
        let mut tools = registry.statuses();
        let installed = tools.iter().filter(|t| t.available).count();
        if available_only {
            tools.retain(|t| t.available);
        }
        Self {
            sudo_enabled: registry.sudo_enabled(),
            sudo_available: registry.sudo_available(),
            installed,
            tools,
        }
    }
}

impl Render for ToolsReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "{:<16} {}", "TOOL".bold(), "STATUS".bold())?;
        for tool in &self.tools {
            let status = if tool.available {
                "installed".green()
            } else {
                "missing".red()
            };
            writeln!(w, "{:<16} {}", tool.name, status)?;
        }
        writeln!(w)?;
        writeln!(w, "{} installed", self.installed)?;
        let sudo = match (self.sudo_enabled, self.sudo_available) {
            (false, _) => "disabled".normal(),
            (true, true) => "enabled".green(),
            (true, false) => "enabled but not installed".yellow(),
        };
        writeln!(w, "sudo: {sudo}")
    }
}
