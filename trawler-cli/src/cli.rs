//! CLI argument parsing using clap derive API
//!
//! Purely declarative. No side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// trawler -- supervised scanner execution and inventory reconciliation.
///
/// Use `trawler <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "trawler", version, about, long_about = None)]
pub struct Cli {
    /// Path to the trawler.toml configuration file.
    #[arg(short, long, global = true, default_value = "trawler.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a command, run it against each target, parse and import the output.
    Run(RunArgs),

    /// Detect the format of a saved scanner output file and print the normalized result.
    Parse(ParseArgs),

    /// Parse a saved scanner output file and reconcile it into the inventory.
    Import(ImportArgs),

    /// Validate a command without running it.
    Validate(ValidateArgs),

    /// List allowed tools and whether they are installed.
    Tools(ToolsArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

/// Inventory scope (project + company).
#[derive(Args, Debug, Clone)]
pub struct ScopeArgs {
    /// Project identifier.
    #[arg(long, default_value = "default")]
    pub project: String,

    /// Company identifier.
    #[arg(long, default_value = "default")]
    pub company: String,
}

// ---- run ----

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Command line, e.g. "nmap -sV $TARGET". Placeholders: $IP $TARGET $HOST $DOMAIN $URL.
    pub command: String,

    /// Target to bind (repeatable). Each target runs as its own job.
    #[arg(short, long = "target", required = true)]
    pub targets: Vec<String>,

    /// Timeout in seconds (0 = unbounded). Defaults to executor.default_timeout_secs.
    #[arg(long)]
    pub timeout: Option<u64>,

    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Parse only; do not write to the inventory.
    #[arg(long)]
    pub no_import: bool,

    /// Include the full execution transcript in text output.
    #[arg(long)]
    pub transcript: bool,
}

// ---- parse ----

#[derive(Args, Debug)]
pub struct ParseArgs {
    /// Saved scanner output file.
    pub file: PathBuf,

    /// Also extract vulnerabilities.
    #[arg(long)]
    pub vulns: bool,

    /// Skip detection and parse as this format (e.g. nmap-xml, nuclei).
    #[arg(long)]
    pub format: Option<String>,
}

// ---- import ----

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Saved scanner output file.
    pub file: PathBuf,

    /// Original scan target (repeatable). Used to attach findings without a host.
    #[arg(short, long = "target")]
    pub targets: Vec<String>,

    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Skip detection and parse as this format.
    #[arg(long)]
    pub format: Option<String>,
}

// ---- validate ----

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Command line to validate.
    pub command: String,

    /// Bind this target and show the resulting argv.
    #[arg(short, long)]
    pub target: Option<String>,
}

// ---- tools ----

#[derive(Args, Debug)]
pub struct ToolsArgs {
    /// Show only installed tools.
    #[arg(long)]
    pub available_only: bool,
}

// ---- config ----

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only one section (general, executor, parser, enrichment, inventory).
        #[arg(long)]
        section: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_collects_repeated_targets() {
        let cli = Cli::try_parse_from([
            "trawler", "run", "nmap -sV $TARGET", "-t", "10.0.0.1", "--target", "web.local",
            "--timeout", "30", "--project", "p1", "--company", "acme",
        ])
        .expect("run should parse");
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.command, "nmap -sV $TARGET");
                assert_eq!(args.targets, vec!["10.0.0.1", "web.local"]);
                assert_eq!(args.timeout, Some(30));
                assert_eq!(args.scope.project, "p1");
                assert_eq!(args.scope.company, "acme");
                assert!(!args.no_import);
            }
            other => panic!("expected Run, got {other:?}"),
        }
    }

    #[test]
    fn run_requires_a_target() {
        assert!(Cli::try_parse_from(["trawler", "run", "nmap $TARGET"]).is_err());
    }

    #[test]
    fn scope_defaults_apply() {
        let cli = Cli::try_parse_from(["trawler", "import", "out.xml"]).expect("import should parse");
        match cli.command {
            Commands::Import(args) => {
                assert_eq!(args.scope.project, "default");
                assert_eq!(args.scope.company, "default");
                assert!(args.targets.is_empty());
            }
            other => panic!("expected Import, got {other:?}"),
        }
    }

    #[test]
    fn parse_accepts_vulns_and_format() {
        let cli = Cli::try_parse_from(["trawler", "parse", "scan.jsonl", "--vulns", "--format", "nuclei"])
            .expect("parse should parse");
        match cli.command {
            Commands::Parse(args) => {
                assert!(args.vulns);
                assert_eq!(args.format.as_deref(), Some("nuclei"));
            }
            other => panic!("expected Parse, got {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["trawler", "tools", "--output", "json", "--log-level", "debug"])
            .expect("global flags should parse");
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.config, PathBuf::from("trawler.toml"));
    }

    #[test]
    fn config_show_section() {
        let cli = Cli::try_parse_from(["trawler", "config", "show", "--section", "executor"])
            .expect("config show should parse");
        match cli.command {
            Commands::Config(ConfigArgs {
                action: ConfigAction::Show { section },
            }) => assert_eq!(section.as_deref(), Some("executor")),
            other => panic!("expected Config Show, got {other:?}"),
        }
    }

    #[test]
    fn unknown_output_format_is_rejected() {
        assert!(Cli::try_parse_from(["trawler", "tools", "--output", "yaml"]).is_err());
    }
}
