//! `trawler validate` command handler

use std::io::Write;
use std::sync::Arc;

use serde::Serialize;

use trawler_core::config::TrawlerConfig;
use trawler_executor::{CommandValidator, ToolRegistry, ValidationError};

use crate::cli::ValidateArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `validate` command.
///
/// The report is printed in both cases. A rejected command exits with the
/// validation exit code.
pub fn execute(
    args: ValidateArgs,
    config: &TrawlerConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let validator = CommandValidator::new(Arc::new(ToolRegistry::from_config(&config.executor)));
    let result = match &args.target {
        Some(target) => validator.validate_for_target(&args.command, target),
        None => validator.validate(&args.command),
    };

    let report = ValidateReport::new(args.command, args.target, &result);
    writer.render(&report)?;

    result.map(|_| ()).map_err(CliError::from)
}

/// `validate` output payload.
#[derive(Debug, Serialize)]
pub struct ValidateReport {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    pub sudo: bool,
    pub argv: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidateReport {
    fn new(
        command: String,
        target: Option<String>,
        result: &Result<trawler_executor::CommandSpec, ValidationError>,
    ) -> Self {
        match result {
            Ok(spec) => Self {
                command,
                target,
                valid: true,
                tool: Some(spec.tool().to_owned()),
                sudo: spec.sudo(),
                argv: spec.argv(),
                error: None,
            },
            Err(e) => Self {
                command,
                target,
                valid: false,
                tool: None,
                sudo: false,
                argv: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }
}

impl Render for ValidateReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Command: {}", self.command.bold())?;
        if let Some(target) = &self.target {
            writeln!(w, "Target:  {target}")?;
        }
        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
            if let Some(tool) = &self.tool {
                writeln!(w, "  Tool:   {tool}{}", if self.sudo { " (sudo)" } else { "" })?;
            }
            writeln!(w, "  Argv:")?;
            for (i, arg) in self.argv.iter().enumerate() {
                writeln!(w, "    [{i}] {arg}")?;
            }
        } else {
            writeln!(w, "  Result: {}", "REJECTED".red().bold())?;
            if let Some(error) = &self.error {
                writeln!(w, "  Error:  {}", error.red())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_command_reports_reason() {
        let result = Err(ValidationError::ForbiddenPattern {
            pattern: ";".to_owned(),
        });
        let report = ValidateReport::new("nmap; id".to_owned(), None, &result);
        assert!(!report.valid);

        let mut buffer = Vec::new();
        report.render_text(&mut buffer).unwrap();
        let output = String::from_utf8(buffer).unwrap();
        assert!(output.contains("REJECTED"));
        assert!(output.contains("forbidden pattern ';'"));
    }

    #[test]
    fn json_report_for_rejection_has_no_argv() {
        let result = Err(ValidationError::ToolNotAllowed {
            tool: "rm".to_owned(),
        });
        let report = ValidateReport::new("rm -rf /".to_owned(), None, &result);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["valid"], false);
        assert_eq!(json["argv"].as_array().unwrap().len(), 0);
        assert!(json.get("tool").is_none());
        assert!(json["error"].as_str().unwrap().contains("'rm'"));
    }
}
