//! CVE 보강 -- 로컬 JSON CVE DB 및 비어 있는 필드 채우기
//!
//! [`Enricher`]는 CVE ID가 있는 발견마다 [`CveSource`]를 조회하고, 발견에 비어 있는
//! 필드(cvss, cwe, description, solution, references)만 채웁니다. 조회 실패나
//! DB 미등록은 `warn!`으로 남기고 계속 진행합니다.
//!
//! # JSON 형식
//!
//! 평탄한 배열:
//!
//! ```json
//! [
//!   {
//!     "cve": "CVE-2021-44228",
//!     "cvss": 10.0,
//!     "cwe": "CWE-502",
//!     "description": "Apache Log4j2 JNDI features ...",
//!     "solution": "Upgrade to 2.17.1",
//!     "references": ["https://logging.apache.org/log4j/2.x/security.html"]
//!   }
//! ]
//! ```
//!
//! 또는 NVD API 응답과 같은 `{"vulnerabilities": [{"cve": {...}}]}` 객체.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use trawler_core::types::ParsedVulnerability;

use crate::error::ParserError;

/// CVE DB 파일 최대 크기 (50 MB)
const MAX_CVE_DB_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// CVE DB 엔트리 최대 개수
const MAX_CVE_DB_ENTRIES: usize = 500_000;

/// CVE 한 건의 보강 정보
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CveRecord {
    /// CVE ID (대문자)
    #[serde(alias = "cve_id", alias = "id")]
    pub cve: String,
    /// CVSS 기본 점수
    #[serde(default, alias = "cvss_score")]
    pub cvss: Option<f32>,
    /// CWE ID
    #[serde(default, alias = "cwe_id")]
    pub cwe: Option<String>,
    /// 설명
    #[serde(default)]
    pub description: Option<String>,
    /// 조치 방법
    #[serde(default, alias = "remediation")]
    pub solution: Option<String>,
    /// 참고 URL
    #[serde(default)]
    pub references: Vec<String>,
}

/// CVE 정보 조회 소스
///
/// 로컬 DB 외에 원격 API 등을 붙일 수 있도록 비동기 시그니처를 사용합니다.
pub trait CveSource: Send + Sync {
    /// CVE ID로 레코드를 조회합니다. 미등록이면 `Ok(None)`.
    fn lookup(
        &self,
        cve: &str,
    ) -> impl Future<Output = Result<Option<CveRecord>, ParserError>> + Send;
}

/// 로컬 JSON 파일에서 로드한 CVE DB
#[derive(Debug, Default)]
pub struct LocalCveDb {
    records: HashMap<String, CveRecord>,
}

impl LocalCveDb {
    /// 빈 DB를 생성합니다.
    pub fn empty() -> Self {
        Self::default()
    }

    /// 레코드 목록으로 DB를 생성합니다. 같은 CVE가 여러 번 나오면 먼저 나온 것을 씁니다.
    pub fn from_records(records: impl IntoIterator<Item = CveRecord>) -> Self {
        let mut map = HashMap::new();
        for mut record in records.into_iter().take(MAX_CVE_DB_ENTRIES) {
            record.cve = record.cve.trim().to_uppercase();
            if record.cve.is_empty() {
                continue;
            }
            map.entry(record.cve.clone()).or_insert(record);
        }
        Self { records: map }
    }

    /// JSON 문자열에서 DB를 파싱합니다.
    pub fn from_json(json: &str) -> Result<Self, ParserError> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| ParserError::CveDbParse(format!("failed to parse cve db JSON: {e}")))?;

        let records: Vec<CveRecord> = match value {
            Value::Array(items) => {
                if items.len() > MAX_CVE_DB_ENTRIES {
                    warn!(
                        entries = items.len(),
                        max = MAX_CVE_DB_ENTRIES,
                        "cve db entry limit reached, truncating"
                    );
                }
                items
                    .into_iter()
                    .take(MAX_CVE_DB_ENTRIES)
                    .map(serde_json::from_value)
                    .collect::<Result<_, _>>()
                    .map_err(|e| ParserError::CveDbParse(format!("invalid cve record: {e}")))?
            }
            Value::Object(mut object) => {
                let Some(Value::Array(items)) = object.remove("vulnerabilities") else {
                    return Err(ParserError::CveDbParse(
                        "expected an array or an object with a `vulnerabilities` array".to_owned(),
                    ));
                };
                if items.len() > MAX_CVE_DB_ENTRIES {
                    warn!(
                        entries = items.len(),
                        max = MAX_CVE_DB_ENTRIES,
                        "cve db entry limit reached, truncating"
                    );
                }
                items
                    .iter()
                    .take(MAX_CVE_DB_ENTRIES)
                    .filter_map(|item| item.get("cve").and_then(nvd_record))
                    .collect()
            }
            _ => {
                return Err(ParserError::CveDbParse(
                    "expected an array or an object with a `vulnerabilities` array".to_owned(),
                ));
            }
        };

        Ok(Self::from_records(records))
    }

    /// 파일에서 DB를 로드합니다.
    ///
    /// # 보안 제한
    ///
    /// - 파일 최대 50MB (`MAX_CVE_DB_FILE_SIZE`)
    /// - 엔트리 최대 500,000개 (`MAX_CVE_DB_ENTRIES`)
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ParserError> {
        let path = path.as_ref();
        let load_err = |reason: String| ParserError::CveDbLoad {
            path: path.display().to_string(),
            reason,
        };

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| load_err(e.to_string()))?;
        if metadata.len() > MAX_CVE_DB_FILE_SIZE {
            return Err(load_err(format!(
                "file size {} bytes exceeds maximum {} bytes",
                metadata.len(),
                MAX_CVE_DB_FILE_SIZE
            )));
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| load_err(e.to_string()))?;
        let db = Self::from_json(&content)?;

        info!(path = %path.display(), entries = db.len(), "loaded cve db");
        Ok(db)
    }

    /// 레코드 수
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// CVE ID로 레코드를 찾습니다 (대소문자 무시).
    pub fn get(&self, cve: &str) -> Option<&CveRecord> {
        self.records.get(&cve.trim().to_uppercase())
    }
}

impl CveSource for LocalCveDb {
    async fn lookup(&self, cve: &str) -> Result<Option<CveRecord>, ParserError> {
        Ok(self.get(cve).cloned())
    }
}

/// 영어 설명 우선, 없으면 첫 번째 항목의 `value`
fn english_value(items: Option<&Value>) -> Option<String> {
    let items = items?.as_array()?;
    let pick = items
        .iter()
        .find(|d| d.get("lang").and_then(Value::as_str) == Some("en"))
        .or_else(|| items.first())?;
    pick.get("value")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// NVD `cve` 객체를 [`CveRecord`]로 변환합니다.
fn nvd_record(cve: &Value) -> Option<CveRecord> {
    let id = cve.get("id").and_then(Value::as_str)?.to_owned();

    let metrics = cve.get("metrics");
    let cvss = ["cvssMetricV31", "cvssMetricV30", "cvssMetricV2"]
        .iter()
        .find_map(|key| {
            metrics?
                .get(key)?
                .as_array()?
                .first()?
                .get("cvssData")?
                .get("baseScore")?
                .as_f64()
        })
        .map(|score| score as f32);

    let cwe = cve
        .get("weaknesses")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|w| english_value(w.get("description")))
        .find(|v| v.starts_with("CWE-"));

    let references = cve
        .get("references")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|r| r.get("url").and_then(Value::as_str))
        .map(str::to_owned)
        .collect();

    Some(CveRecord {
        cve: id,
        cvss,
        cwe,
        description: english_value(cve.get("descriptions")),
        solution: None,
        references,
    })
}

/// 보강 결과 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnrichStats {
    /// 조회한 발견 수 (CVE ID 보유)
    pub looked_up: usize,
    /// 하나 이상 필드를 채운 발견 수
    pub enriched: usize,
    /// 소스에 없는 CVE 수
    pub missing: usize,
    /// 조회 에러 수
    pub failed: usize,
}

/// CVE 보강기
pub struct Enricher<S> {
    source: S,
}

impl<S: CveSource> Enricher<S> {
    /// 조회 소스로 보강기를 생성합니다.
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// 조회 소스 참조
    pub fn source(&self) -> &S {
        &self.source
    }

    /// CVE ID가 있는 발견의 빈 필드를 채웁니다.
    pub async fn enrich(&self, vulns: &mut [ParsedVulnerability]) -> EnrichStats {
        let mut stats = EnrichStats::default();

        for vuln in vulns.iter_mut() {
            let Some(cve) = vuln.cve.clone() else {
                continue;
            };
            stats.looked_up += 1;

            match self.source.lookup(&cve).await {
                Ok(Some(record)) => {
                    if backfill(vuln, record) {
                        stats.enriched += 1;
                    }
                }
                Ok(None) => {
                    stats.missing += 1;
                    warn!(cve = %cve, template_id = %vuln.template_id, "cve not found in source");
                }
                Err(e) => {
                    stats.failed += 1;
                    warn!(cve = %cve, error = %e, "cve lookup failed");
                }
            }
        }

        debug!(
            looked_up = stats.looked_up,
            enriched = stats.enriched,
            missing = stats.missing,
            failed = stats.failed,
            "enrichment finished"
        );
        stats
    }
}

fn is_blank(field: &Option<String>) -> bool {
    field.as_deref().is_none_or(|s| s.trim().is_empty())
}

/// 비어 있는 필드만 채우고, 하나라도 채웠으면 true를 반환합니다.
fn backfill(vuln: &mut ParsedVulnerability, record: CveRecord) -> bool {
    let mut changed = false;

    if vuln.cvss.is_none() && record.cvss.is_some() {
        vuln.cvss = record.cvss;
        changed = true;
    }
    if is_blank(&vuln.cwe) && !is_blank(&record.cwe) {
        vuln.cwe = record.cwe;
        changed = true;
    }
    if is_blank(&vuln.description) && !is_blank(&record.description) {
        vuln.description = record.description;
        changed = true;
    }
    if is_blank(&vuln.solution) && !is_blank(&record.solution) {
        vuln.solution = record.solution;
        changed = true;
    }
    if vuln.references.is_empty() && !record.references.is_empty() {
        vuln.references = record.references;
        changed = true;
    }
    changed
}
