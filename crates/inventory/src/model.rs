//! 인벤토리 엔티티 -- 범위(Scope)별로 영속되는 호스트/서비스/취약점
//!
//! 파서가 만드는 `Parsed*` 타입은 한 번의 호출에만 유효한 반면, 이 모듈의 엔티티는
//! 처음 발견될 때 생성되고 이후 정보가 늘어날 때만 갱신됩니다. 삭제되지 않습니다.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use trawler_core::types::{HostState, PortState, Protocol, ScannerKind, Severity};

/// 인벤토리 분할 단위 (프로젝트 + 회사)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    /// 프로젝트 ID
    pub project_id: String,
    /// 회사 ID
    pub company_id: String,
}

impl Scope {
    /// 새 범위를 생성합니다.
    pub fn new(project_id: impl Into<String>, company_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            company_id: company_id.into(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.company_id, self.project_id)
    }
}

/// 인벤토리 호스트
///
/// 식별은 `ip` 우선, `domain` 차순입니다. 둘 중 하나는 항상 채워져 있습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub id: Uuid,
    pub ip: Option<String>,
    /// 스캔 대상으로 주어진 원래 호스트명
    pub domain: Option<String>,
    /// 스캐너가 보고한 이름 (PTR, NetBIOS 등)
    pub hostname: Option<String>,
    pub os: Option<String>,
    pub state: HostState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Host {
    /// 새 ID로 호스트를 생성합니다.
    pub fn new(ip: Option<String>, domain: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            ip,
            domain,
            hostname: None,
            os: None,
            state: HostState::Unknown,
            created_at: now,
            updated_at: now,
        }
    }

    /// 표시용 식별자 (IP, 없으면 도메인)
    pub fn label(&self) -> &str {
        self.ip
            .as_deref()
            .or(self.domain.as_deref())
            .unwrap_or_default()
    }
}

/// 인벤토리 서비스
///
/// 식별 키는 `(host_id, port, protocol)`이며 `protocol`은 대문자(`TCP`/`UDP`)입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    pub host_id: Uuid,
    pub port: u16,
    pub protocol: String,
    pub service_name: String,
    pub state: PortState,
    /// product, version, extra_info를 공백으로 이은 값
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Service {
    /// 새 ID로 서비스를 생성합니다.
    pub fn new(host_id: Uuid, port: u16, protocol: Protocol) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            host_id,
            port,
            protocol: protocol.as_upper().to_owned(),
            service_name: "unknown".to_owned(),
            state: PortState::Unknown,
            comment: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 식별 키가 일치하는지 확인합니다.
    pub fn matches(&self, host_id: Uuid, port: u16, protocol: &str) -> bool {
        self.host_id == host_id && self.port == port && self.protocol.eq_ignore_ascii_case(protocol)
    }
}

/// 취약점 처리 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VulnStatus {
    /// 새로 발견됨
    #[default]
    Open,
    /// 검증됨
    Confirmed,
    /// 오탐
    FalsePositive,
    /// 조치 완료
    Fixed,
}

impl VulnStatus {
    /// 소문자 라벨
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Confirmed => "confirmed",
            Self::FalsePositive => "false_positive",
            Self::Fixed => "fixed",
        }
    }
}

impl fmt::Display for VulnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 인벤토리 취약점
///
/// 식별 키는 `(template_id, matched_at)`입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: Uuid,
    pub host_id: Option<Uuid>,
    pub template_id: String,
    pub matched_at: String,
    pub name: String,
    pub severity: Severity,
    pub scanner: ScannerKind,
    pub cve: Option<String>,
    pub cwe: Option<String>,
    pub cvss: Option<f32>,
    pub port: Option<u16>,
    pub description: Option<String>,
    pub solution: Option<String>,
    pub references: Vec<String>,
    pub proof: Option<String>,
    pub status: VulnStatus,
    /// 생성 당시 원본 출력 일부
    pub provenance: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 엔티티 종류별 조정 결과 수
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCounts {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl fmt::Display for EntityCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} skipped",
            self.created, self.updated, self.skipped
        )
    }
}

/// 가져오기 한 번의 결과
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub hosts: EntityCounts,
    pub services: EntityCounts,
    pub vulnerabilities: EntityCounts,
    /// 단위 작업별 실패 메시지
    pub errors: Vec<String>,
}

impl ImportSummary {
    /// 다른 요약을 더합니다 (여러 타겟의 결과 합산).
    pub fn merge(&mut self, other: ImportSummary) {
        for (mine, theirs) in [
            (&mut self.hosts, other.hosts),
            (&mut self.services, other.services),
            (&mut self.vulnerabilities, other.vulnerabilities),
        ] {
            mine.created += theirs.created;
            mine.updated += theirs.updated;
            mine.skipped += theirs.skipped;
        }
        self.errors.extend(other.errors);
    }

    /// 새로 만든 엔티티 수
    pub fn created(&self) -> usize {
        self.hosts.created + self.services.created + self.vulnerabilities.created
    }
}
