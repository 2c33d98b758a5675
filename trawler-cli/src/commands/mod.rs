//! Command handlers -- one module per subcommand

pub mod config;
pub mod import;
pub mod ingest;
pub mod parse;
pub mod run;
pub mod tools;
pub mod validate;

use trawler_core::types::ScannerKind;

use crate::error::CliError;

/// `--format` 값을 스캐너 종류로 변환합니다.
pub(crate) fn parse_format(format: Option<&str>) -> Result<Option<ScannerKind>, CliError> {
    let Some(name) = format else {
        return Ok(None);
    };
    ScannerKind::from_str_loose(name).map(Some).ok_or_else(|| {
        let known: Vec<&str> = ScannerKind::ALL.iter().map(|k| k.as_str()).collect();
        CliError::Command(format!(
            "unknown format: {name} (expected one of: {})",
            known.join(", ")
        ))
    })
}
