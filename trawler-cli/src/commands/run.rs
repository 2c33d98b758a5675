//! `trawler run` command handler
//!
//! Validates the command once, binds every target before anything is spawned,
//! submits one job per target and waits for each. Each finished job's stdout is
//! parsed and, unless `--no-import` is given, reconciled into the inventory.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use trawler_core::config::TrawlerConfig;
use trawler_executor::{CommandValidator, JobManager, JobStatus, ToolRegistry};
use trawler_inventory::Scope;

use crate::cli::RunArgs;
use crate::commands::ingest::{Ingest, IngestReport};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `run` command.
pub async fn execute(
    args: RunArgs,
    config: &TrawlerConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let registry = Arc::new(ToolRegistry::from_config(&config.executor));
    let validator = CommandValidator::new(registry);

    let spec = validator.validate(&args.command)?;
    let bound = args
        .targets
        .iter()
        .map(|target| Ok((target.clone(), validator.validate_for_target(&args.command, target)?)))
        .collect::<Result<Vec<_>, CliError>>()?;

    let ingest = Ingest::from_config(config, !args.no_import).await?;
    let scope = Scope::new(args.scope.project.clone(), args.scope.company.clone());
    let jobs = JobManager::from_config(&config.executor)?;
    let timeout = args.timeout.map(Duration::from_secs);

    info!(tool = spec.tool(), targets = bound.len(), "submitting jobs");
    let mut submitted = Vec::with_capacity(bound.len());
    for (target, bound_spec) in bound {
        let argv = bound_spec.argv();
        let id = jobs.submit(bound_spec, timeout).await;
        submitted.push((target, argv, id));
    }

    let mut runs = Vec::with_capacity(submitted.len());
    for (target, argv, id) in submitted {
        let record = jobs.wait(id).await?;
        let Some(result) = record.result else {
            runs.push(TargetRun {
                target,
                job_id: id.to_string(),
                argv,
                status: record.status,
                exit_code: None,
                duration_ms: 0,
                timed_out: false,
                truncated: false,
                error: Some("job finished without a result".to_owned()),
                transcript: String::new(),
                ingest: None,
            });
            continue;
        };

        let targets = std::slice::from_ref(&target);
        let ingest = match ingest.ingest(&result.stdout, None, &scope, targets).await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(job_id = %id, error = %e, "output not ingested");
                None
            }
        };

        runs.push(TargetRun {
            target: target.clone(),
            job_id: id.to_string(),
            argv,
            status: record.status,
            exit_code: result.exit_code,
            duration_ms: u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
            timed_out: result.timed_out,
            truncated: result.truncated,
            error: result.error,
            transcript: result.output,
            ingest,
        });
    }

    let report = RunReport {
        command: args.command,
        tool: spec.tool().to_owned(),
        show_transcript: args.transcript,
        runs,
    };
    writer.render(&report)?;

    let failed = report.failed_count();
    if failed > 0 {
        return Err(CliError::Execution(format!(
            "{failed} of {} jobs did not complete",
            report.runs.len()
        )));
    }
    Ok(())
}

/// Result of one target's job.
#[derive(Debug, Serialize)]
pub struct TargetRun {
    pub target: String,
    pub job_id: String,
    pub argv: Vec<String>,
    pub status: JobStatus,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub timed_out: bool,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Combined execution report (`[DURATION]`, stdout, `[STDERR]`, `[TIMEOUT]`).
    pub transcript: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingest: Option<IngestReport>,
}

/// `run` output payload.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub command: String,
    pub tool: String,
    #[serde(skip)]
    pub show_transcript: bool,
    pub runs: Vec<TargetRun>,
}

impl RunReport {
    /// Number of jobs that did not complete successfully.
    pub fn failed_count(&self) -> usize {
        self.runs
            .iter()
            .filter(|run| run.status != JobStatus::Completed)
            .count()
    }
}

impl Render for RunReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Command: {}", self.command.bold())?;
        for run in &self.runs {
            writeln!(w)?;
            let status = match run.status {
                JobStatus::Completed => run.status.as_str().green().bold(),
                JobStatus::TimedOut | JobStatus::Cancelled => run.status.as_str().yellow().bold(),
                _ => run.status.as_str().red().bold(),
            };
            writeln!(w, "Target {} [{}] job {}", run.target.bold(), status, run.job_id)?;
            writeln!(w, "  argv: {}", run.argv.join(" "))?;
            match run.exit_code {
                Some(code) => writeln!(w, "  exit: {code} in {}ms", run.duration_ms)?,
                None => writeln!(w, "  exit: none in {}ms", run.duration_ms)?,
            }
            if run.truncated {
                writeln!(w, "  {}", "output truncated at the capture limit".yellow())?;
            }
            if let Some(error) = &run.error {
                writeln!(w, "  {} {}", "error:".red(), error)?;
            }
            if let Some(ingest) = &run.ingest {
                ingest.render_summary(w, "  ")?;
            }
            // 실패한 작업은 부분 출력을 항상 보여줌
            if self.show_transcript || run.status != JobStatus::Completed {
                writeln!(w, "  transcript:")?;
                for line in run.transcript.lines() {
                    writeln!(w, "    {line}")?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(status: JobStatus, transcript: &str) -> TargetRun {
        TargetRun {
            target: "10.0.0.1".to_owned(),
            job_id: "job-1".to_owned(),
            argv: vec!["nmap".to_owned(), "10.0.0.1".to_owned()],
            status,
            exit_code: None,
            duration_ms: 1500,
            timed_out: status == JobStatus::TimedOut,
            truncated: false,
            error: None,
            transcript: transcript.to_owned(),
            ingest: None,
        }
    }

    fn render(report: &RunReport) -> String {
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render");
        String::from_utf8(buffer).expect("valid UTF-8")
    }

    #[test]
    fn timed_out_job_shows_partial_transcript() {
        let report = RunReport {
            command: "nmap $TARGET".to_owned(),
            tool: "nmap".to_owned(),
            show_transcript: false,
            runs: vec![run(
                JobStatus::TimedOut,
                "[DURATION] 1.50s\nStarting Nmap\n[TIMEOUT] process exceeded 1s limit and was terminated",
            )],
        };
        let output = render(&report);
        assert!(output.contains("timed_out"));
        assert!(output.contains("Starting Nmap"));
        assert!(output.contains("[TIMEOUT]"));
        assert_eq!(report.failed_count(), 1);
    }

    #[test]
    fn completed_job_hides_transcript_by_default() {
        let report = RunReport {
            command: "nmap $TARGET".to_owned(),
            tool: "nmap".to_owned(),
            show_transcript: false,
            runs: vec![run(JobStatus::Completed, "[DURATION] 0.10s\nsecret stdout")],
        };
        let output = render(&report);
        assert!(!output.contains("secret stdout"));
        assert_eq!(report.failed_count(), 0);
    }

    #[test]
    fn json_omits_render_flag() {
        let report = RunReport {
            command: "nmap $TARGET".to_owned(),
            tool: "nmap".to_owned(),
            show_transcript: true,
            runs: vec![run(JobStatus::Completed, "")],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("show_transcript").is_none());
        assert_eq!(json["runs"][0]["status"], "completed");
    }
}
