//! `trawler parse` command handler

use std::io::Write;

use serde::Serialize;
use tracing::info;

use trawler_core::config::TrawlerConfig;
use trawler_core::types::{ParsedScanResult, ParsedVulnerability, ScannerKind};
use trawler_parser::ParserRouter;

use crate::cli::ParseArgs;
use crate::commands::parse_format;
use crate::error::CliError;
use crate::output::{OutputWriter, Render, write_json_block};

/// Execute the `parse` command.
pub async fn execute(
    args: ParseArgs,
    config: &TrawlerConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let forced = parse_format(args.format.as_deref())?;
    let text = tokio::fs::read_to_string(&args.file).await?;
    info!(path = %args.file.display(), bytes = text.len(), "parsing saved output");

    let router = ParserRouter::from_config(&config.parser);
    let parsed = match forced {
        Some(kind) => router.parse_as(kind, &text)?,
        None => router.parse(&text)?,
    };

    let report = ParseReport {
        source: args.file.display().to_string(),
        kind: parsed.kind,
        scan: parsed.scan,
        vulnerabilities: args.vulns.then_some(parsed.vulnerabilities),
    };
    writer.render(&report)
}

/// `parse` output payload.
#[derive(Debug, Serialize)]
pub struct ParseReport {
    pub source: String,
    pub kind: ScannerKind,
    pub scan: ParsedScanResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vulnerabilities: Option<Vec<ParsedVulnerability>>,
}

impl Render for ParseReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Source: {}", self.source)?;
        writeln!(
            w,
            "Format: {} ({} hosts, {} services)",
            self.kind.as_str().bold(),
            self.scan.host_count(),
            self.scan.service_count()
        )?;
        if self.scan.hosts.is_empty() && self.vulnerabilities.as_ref().is_none_or(Vec::is_empty) {
            writeln!(
                w,
                "{}",
                "0 hosts / 0 vulnerabilities found - review the raw output".yellow()
            )?;
        }
        writeln!(w)?;
        write_json_block(w, &self.scan)?;

        if let Some(vulns) = &self.vulnerabilities {
            writeln!(w)?;
            writeln!(w, "Vulnerabilities ({}):", vulns.len())?;
            for vuln in vulns {
                writeln!(w, "  {vuln}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use trawler_core::types::Severity;

    use super::*;

    #[test]
    fn text_shows_format_and_normalized_json() {
        let report = ParseReport {
            source: "scan.txt".to_owned(),
            kind: ScannerKind::Unknown,
            scan: ParsedScanResult::empty(ScannerKind::Unknown, "garbage"),
            vulnerabilities: None,
        };
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).unwrap();
        let output = String::from_utf8(buffer).unwrap();
        assert!(output.contains("unknown"));
        assert!(output.contains("0 hosts / 0 vulnerabilities found"));
        assert!(output.contains("\"rawOutput\": \"garbage\""));
    }

    #[test]
    fn vulnerabilities_listed_when_requested() {
        let vuln = ParsedVulnerability::new(
            ScannerKind::Nuclei,
            "git-config",
            "http://10.0.0.5/.git/config",
            "Git Config Exposure",
            Severity::Medium,
        );
        let report = ParseReport {
            source: "nuclei.jsonl".to_owned(),
            kind: ScannerKind::Nuclei,
            scan: ParsedScanResult::empty(ScannerKind::Nuclei, ""),
            vulnerabilities: Some(vec![vuln]),
        };
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).unwrap();
        let output = String::from_utf8(buffer).unwrap();
        assert!(output.contains("Vulnerabilities (1):"));
        assert!(output.contains("git-config"));
        assert!(!output.contains("0 hosts / 0 vulnerabilities found"));
    }
}
