//! 출력 하나를 파싱 -> 보강 -> 조정하는 공통 단계 (`run`, `import`)

use std::io::Write;

use serde::Serialize;
use tracing::{info, warn};

use trawler_core::config::TrawlerConfig;
use trawler_core::error::TrawlerError;
use trawler_core::types::ScannerKind;
use trawler_inventory::{DnsResolver, ImportSummary, JsonFileStore, Reconciler, Scope};
use trawler_parser::{EnrichStats, Enricher, LocalCveDb, ParserRouter};

use crate::error::CliError;

/// 출력 하나의 처리 결과
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub scanner: ScannerKind,
    pub hosts: usize,
    pub services: usize,
    pub vulnerabilities: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<EnrichStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import: Option<ImportSummary>,
}

impl IngestReport {
    /// 아무것도 추출하지 못했는지 여부
    pub fn is_empty(&self) -> bool {
        self.hosts == 0 && self.vulnerabilities == 0
    }

    /// 들여쓰기된 텍스트 요약
    pub fn render_summary(&self, w: &mut dyn Write, indent: &str) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "{indent}Format: {}", self.scanner.as_str().bold())?;
        if self.is_empty() {
            writeln!(
                w,
                "{indent}{}",
                "0 hosts / 0 vulnerabilities found - review the raw output".yellow()
            )?;
        } else {
            writeln!(
                w,
                "{indent}Found: {} hosts, {} services, {} vulnerabilities",
                self.hosts, self.services, self.vulnerabilities
            )?;
        }
        if let Some(stats) = &self.enrichment {
            writeln!(
                w,
                "{indent}Enrichment: {} looked up, {} enriched, {} missing, {} failed",
                stats.looked_up, stats.enriched, stats.missing, stats.failed
            )?;
        }
        if let Some(summary) = &self.import {
            writeln!(w, "{indent}Inventory:")?;
            writeln!(w, "{indent}  hosts:           {}", summary.hosts)?;
            writeln!(w, "{indent}  services:        {}", summary.services)?;
            writeln!(w, "{indent}  vulnerabilities: {}", summary.vulnerabilities)?;
            for err in &summary.errors {
                writeln!(w, "{indent}  {} {}", "error:".red(), err)?;
            }
        }
        Ok(())
    }
}

/// 파서, 선택적 보강기, 선택적 조정 엔진 묶음
pub struct Ingest {
    router: ParserRouter,
    enricher: Option<Enricher<LocalCveDb>>,
    reconciler: Option<Reconciler<JsonFileStore, DnsResolver>>,
}

impl Ingest {
    /// 설정에서 구성합니다. `import`가 false면 인벤토리를 열지 않습니다.
    ///
    /// CVE DB를 읽지 못하면 경고를 남기고 보강 없이 진행합니다.
    pub async fn from_config(config: &TrawlerConfig, import: bool) -> Result<Self, CliError> {
        let enricher = if config.enrichment.enabled {
            match LocalCveDb::load(&config.enrichment.cve_db_path).await {
                Ok(db) => Some(Enricher::new(db)),
                Err(e) => {
                    warn!(error = %e, "cve database unavailable, continuing without enrichment");
                    None
                }
            }
        } else {
            None
        };

        let reconciler = if import {
            let store = JsonFileStore::open(&config.inventory.store_path)
                .await
                .map_err(TrawlerError::from)?;
            info!(path = %config.inventory.store_path, "inventory opened");
            Some(
                Reconciler::new(store, DnsResolver::from_config(&config.inventory))
                    .with_config(&config.inventory),
            )
        } else {
            None
        };

        Ok(Self {
            router: ParserRouter::from_config(&config.parser),
            enricher,
            reconciler,
        })
    }

    /// 텍스트를 처리합니다. `forced`가 있으면 탐지를 생략합니다.
    pub async fn ingest(
        &self,
        text: &str,
        forced: Option<ScannerKind>,
        scope: &Scope,
        targets: &[String],
    ) -> Result<IngestReport, CliError> {
        let mut parsed = match forced {
            Some(kind) => self.router.parse_as(kind, text)?,
            None => self.router.parse(text)?,
        };

        let enrichment = match &self.enricher {
            Some(enricher) if !parsed.vulnerabilities.is_empty() => {
                Some(enricher.enrich(&mut parsed.vulnerabilities).await)
            }
            _ => None,
        };

        let import = match &self.reconciler {
            Some(reconciler) => {
                let mut summary = reconciler.import_scan(scope, &parsed.scan, targets).await;
                if !parsed.vulnerabilities.is_empty() {
                    let vulns = reconciler
                        .import_vulnerabilities(
                            scope,
                            &parsed.vulnerabilities,
                            &parsed.scan.raw_output,
                            targets,
                        )
                        .await;
                    summary.merge(vulns);
                }
                Some(summary)
            }
            None => None,
        };

        Ok(IngestReport {
            scanner: parsed.kind,
            hosts: parsed.scan.host_count(),
            services: parsed.scan.service_count(),
            vulnerabilities: parsed.vulnerabilities.len(),
            enrichment,
            import,
        })
    }
}
