//! `trawler import` command handler

use std::io::Write;

use serde::Serialize;
use tracing::info;

use trawler_core::config::TrawlerConfig;
use trawler_inventory::Scope;

use crate::cli::ImportArgs;
use crate::commands::ingest::{Ingest, IngestReport};
use crate::commands::parse_format;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `import` command.
pub async fn execute(
    args: ImportArgs,
    config: &TrawlerConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let forced = parse_format(args.format.as_deref())?;
    let text = tokio::fs::read_to_string(&args.file).await?;
    let scope = Scope::new(args.scope.project, args.scope.company);
    info!(path = %args.file.display(), scope = %scope, "importing saved output");

    let ingest = Ingest::from_config(config, true).await?;
    let result = ingest.ingest(&text, forced, &scope, &args.targets).await?;

    let report = ImportReport {
        source: args.file.display().to_string(),
        scope: scope.to_string(),
        store: config.inventory.store_path.clone(),
        result,
    };
    writer.render(&report)
}

/// `import` output payload.
#[derive(Debug, Serialize)]
pub struct ImportReport {
    pub source: String,
    pub scope: String,
    pub store: String,
    pub result: IngestReport,
}

impl Render for ImportReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "Import: {} -> {} ({})", self.source, self.scope, self.store)?;
        self.result.render_summary(w, "  ")
    }
}
