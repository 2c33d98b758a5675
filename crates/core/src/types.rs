//! 도메인 타입: 시스템 전역에서 사용되는 공통 타입
//!
//! 추출기(parser)가 생성하고 조정 엔진(inventory)이 소비하는 정규화된
//! 스캔 결과 구조를 정의합니다. 문자열 라벨 대신 열거형을 사용하므로
//! 새 스캐너/상태를 추가하면 컴파일러가 누락된 분기를 찾아줍니다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 심각도 레벨
///
/// `Ord` 구현으로 심각도 비교가 가능합니다 (`Info < Low < Medium < High < Critical`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 정보성 발견
    #[default]
    Info,
    /// 낮은 심각도
    Low,
    /// 중간 심각도
    Medium,
    /// 높은 심각도
    High,
    /// 치명적: 즉시 대응 필요
    Critical,
}

impl Severity {
    /// 문자열에서 심각도를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "info" | "informational" | "none" => Some(Self::Info),
            "low" => Some(Self::Low),
            "medium" | "med" | "moderate" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }

    /// 소문자 라벨을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "Info"),
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}

/// 전송 계층 프로토콜
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    /// 문자열에서 프로토콜을 파싱합니다 (대소문자 무시).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "tcp" => Some(Self::Tcp),
            "udp" => Some(Self::Udp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }

    /// 인벤토리 키에 사용되는 대문자 표기 (`TCP`, `UDP`)
    pub fn as_upper(&self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 포트 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortState {
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "closed")]
    Closed,
    #[serde(rename = "filtered")]
    Filtered,
    #[serde(rename = "open|filtered")]
    OpenFiltered,
    /// 도구가 상태를 보고하지 않음 (일반 텍스트 추출 등)
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl PortState {
    /// nmap/masscan 상태 문자열을 파싱합니다.
    ///
    /// 알 수 없는 값은 `Unknown`으로 처리합니다.
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "open" => Self::Open,
            "closed" => Self::Closed,
            "filtered" | "closed|filtered" => Self::Filtered,
            "open|filtered" => Self::OpenFiltered,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Filtered => "filtered",
            Self::OpenFiltered => "open|filtered",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 호스트 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostState {
    Up,
    Down,
    #[default]
    Unknown,
}

impl HostState {
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "up" => Self::Up,
            "down" => Self::Down,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 출력 형식을 생성한 스캐너 종류
///
/// 형식 탐지기가 반환하는 값이며, 추출기 선택은 이 열거형에 대한
/// 완전한 `match`로 이루어집니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScannerKind {
    #[serde(rename = "nmap-xml")]
    NmapXml,
    #[serde(rename = "nmap-text")]
    NmapText,
    #[serde(rename = "nmap-greppable")]
    NmapGreppable,
    #[serde(rename = "masscan")]
    Masscan,
    #[serde(rename = "nuclei")]
    Nuclei,
    #[serde(rename = "nikto")]
    Nikto,
    #[serde(rename = "gobuster")]
    Gobuster,
    #[serde(rename = "ffuf")]
    Ffuf,
    #[serde(rename = "feroxbuster")]
    Feroxbuster,
    #[serde(rename = "wfuzz")]
    Wfuzz,
    #[serde(rename = "testssl")]
    Testssl,
    #[serde(rename = "whatweb")]
    Whatweb,
    #[serde(rename = "wpscan")]
    Wpscan,
    #[serde(rename = "enum4linux")]
    Enum4linux,
    #[serde(rename = "httpx")]
    Httpx,
    #[serde(rename = "sqlmap")]
    Sqlmap,
    #[serde(rename = "hydra")]
    Hydra,
    #[serde(rename = "amass")]
    Amass,
    #[serde(rename = "subfinder")]
    Subfinder,
    #[serde(rename = "crackmapexec")]
    Crackmapexec,
    /// 알려진 배너는 없지만 IP/호스트 토큰이 발견됨
    #[serde(rename = "generic")]
    Generic,
    /// 인식 불가: 원본 텍스트만 보존
    #[serde(rename = "unknown")]
    Unknown,
}

impl ScannerKind {
    /// 모든 스캐너 종류 (탐지 순서와 무관)
    pub const ALL: [ScannerKind; 22] = [
        Self::NmapXml,
        Self::NmapText,
        Self::NmapGreppable,
        Self::Masscan,
        Self::Nuclei,
        Self::Nikto,
        Self::Gobuster,
        Self::Ffuf,
        Self::Feroxbuster,
        Self::Wfuzz,
        Self::Testssl,
        Self::Whatweb,
        Self::Wpscan,
        Self::Enum4linux,
        Self::Httpx,
        Self::Sqlmap,
        Self::Hydra,
        Self::Amass,
        Self::Subfinder,
        Self::Crackmapexec,
        Self::Generic,
        Self::Unknown,
    ];

    /// 형식 라벨 (정규화 스키마의 `scanner` 필드 값)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NmapXml => "nmap-xml",
            Self::NmapText => "nmap-text",
            Self::NmapGreppable => "nmap-greppable",
            Self::Masscan => "masscan",
            Self::Nuclei => "nuclei",
            Self::Nikto => "nikto",
            Self::Gobuster => "gobuster",
            Self::Ffuf => "ffuf",
            Self::Feroxbuster => "feroxbuster",
            Self::Wfuzz => "wfuzz",
            Self::Testssl => "testssl",
            Self::Whatweb => "whatweb",
            Self::Wpscan => "wpscan",
            Self::Enum4linux => "enum4linux",
            Self::Httpx => "httpx",
            Self::Sqlmap => "sqlmap",
            Self::Hydra => "hydra",
            Self::Amass => "amass",
            Self::Subfinder => "subfinder",
            Self::Crackmapexec => "crackmapexec",
            Self::Generic => "generic",
            Self::Unknown => "unknown",
        }
    }

    /// 스캔 유형 (정규화 스키마의 `scanType` 필드 값)
    pub fn scan_type(&self) -> &'static str {
        match self {
            Self::NmapXml | Self::NmapText | Self::NmapGreppable | Self::Masscan => "port-scan",
            Self::Nuclei => "vulnerability-scan",
            Self::Nikto => "web-vulnerability-scan",
            Self::Gobuster | Self::Ffuf | Self::Feroxbuster | Self::Wfuzz => "content-discovery",
            Self::Testssl => "tls-audit",
            Self::Whatweb | Self::Httpx => "web-fingerprint",
            Self::Wpscan => "cms-scan",
            Self::Enum4linux | Self::Crackmapexec => "smb-enumeration",
            Self::Sqlmap => "sql-injection",
            Self::Hydra => "credential-attack",
            Self::Amass | Self::Subfinder => "subdomain-enumeration",
            Self::Generic => "generic",
            Self::Unknown => "raw",
        }
    }

    /// 형식 라벨에서 스캐너 종류를 파싱합니다.
    ///
    /// 도구 이름(`nmap`)만 주어지면 텍스트 형식으로 간주합니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "nmap" => return Some(Self::NmapText),
            "testssl.sh" => return Some(Self::Testssl),
            "netexec" | "nxc" | "cme" => return Some(Self::Crackmapexec),
            "enum4linux-ng" => return Some(Self::Enum4linux),
            _ => {}
        }
        Self::ALL.iter().copied().find(|k| k.as_str() == lower)
    }

    /// 취약점 추출을 지원하는 형식인지 여부
    pub fn yields_vulnerabilities(&self) -> bool {
        matches!(self, Self::Nuclei | Self::Nikto)
    }
}

impl fmt::Display for ScannerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 서비스에 첨부된 스크립트/발견 출력
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptOutput {
    /// 스크립트 ID (nmap NSE 이름, 또는 도구명)
    pub id: String,
    /// 디코딩된 출력 본문
    pub output: String,
}

/// 정규화된 서비스
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedService {
    /// 소속 호스트 키 (IP 또는 호스트명)
    pub host: String,
    /// 포트 번호 (1-65535)
    pub port: u16,
    pub protocol: Protocol,
    pub state: PortState,
    /// 서비스 이름 (`ssh`, `http` 등). 알 수 없으면 `unknown`
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_info: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scripts: Vec<ScriptOutput>,
}

/// 서비스 이름을 알 수 없을 때 사용하는 센티널 값
pub const UNKNOWN_SERVICE: &str = "unknown";

impl ParsedService {
    /// 새 서비스를 생성합니다. 포트 0은 거부됩니다.
    pub fn new(host: impl Into<String>, port: u16, protocol: Protocol) -> Option<Self> {
        if port == 0 {
            return None;
        }
        Some(Self {
            host: host.into(),
            port,
            protocol,
            state: PortState::Unknown,
            service: UNKNOWN_SERVICE.to_owned(),
            product: None,
            version: None,
            extra_info: None,
            scripts: Vec::new(),
        })
    }

    /// 원시 포트 값(u32)을 검증하여 서비스를 생성합니다.
    pub fn from_raw_port(host: impl Into<String>, port: u32, protocol: Protocol) -> Option<Self> {
        let port = u16::try_from(port).ok()?;
        Self::new(host, port, protocol)
    }

    pub fn with_state(mut self, state: PortState) -> Self {
        self.state = state;
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        let service = service.into();
        if !service.trim().is_empty() {
            self.service = service;
        }
        self
    }

    /// 스크립트 출력을 추가합니다. 같은 ID가 있으면 줄바꿈으로 이어 붙입니다.
    pub fn push_script(&mut self, id: &str, output: &str) {
        if let Some(existing) = self.scripts.iter_mut().find(|s| s.id == id) {
            if !existing.output.is_empty() {
                existing.output.push('\n');
            }
            existing.output.push_str(output);
        } else {
            self.scripts.push(ScriptOutput {
                id: id.to_owned(),
                output: output.to_owned(),
            });
        }
    }

    /// product/version/extra_info를 공백으로 이은 요약을 반환합니다.
    pub fn banner(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.product, &self.version, &self.extra_info]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// 정규화된 호스트
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedHost {
    /// IP 또는 호스트명 (호스트 키)
    pub ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub state: HostState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default)]
    pub services: Vec<ParsedService>,
}

impl ParsedHost {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            ip: key.into(),
            hostname: None,
            state: HostState::Unknown,
            os: None,
            services: Vec::new(),
        }
    }

    /// 호스트 키를 반환합니다.
    pub fn key(&self) -> &str {
        &self.ip
    }

    /// (port, protocol)이 같은 서비스를 찾습니다.
    pub fn find_service_mut(&mut self, port: u16, protocol: Protocol) -> Option<&mut ParsedService> {
        self.services
            .iter_mut()
            .find(|s| s.port == port && s.protocol == protocol)
    }
}

/// 형식 탐지 + 추출 파이프라인의 정규화 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedScanResult {
    pub scanner: ScannerKind,
    pub scan_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    pub hosts: Vec<ParsedHost>,
    /// 원본 입력 (파싱 성공 여부와 무관하게 그대로 보존)
    pub raw_output: String,
}

impl ParsedScanResult {
    /// 호스트가 없는 결과를 생성합니다.
    pub fn empty(scanner: ScannerKind, raw: &str) -> Self {
        Self {
            scanner,
            scan_type: scanner.scan_type().to_owned(),
            start_time: None,
            end_time: None,
            hosts: Vec::new(),
            raw_output: raw.to_owned(),
        }
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    pub fn service_count(&self) -> usize {
        self.hosts.iter().map(|h| h.services.len()).sum()
    }
}

/// 정규화된 취약점 발견
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedVulnerability {
    pub name: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cve: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvss: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub scanner: ScannerKind,
    /// 스캐너가 부여한 규칙 ID (중복 제거 키 1)
    pub template_id: String,
    /// 발견 위치 (중복 제거 키 2)
    pub matched_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<String>,
}

impl ParsedVulnerability {
    /// 필수 필드만으로 발견을 생성합니다.
    pub fn new(
        scanner: ScannerKind,
        template_id: impl Into<String>,
        matched_at: impl Into<String>,
        name: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            name: name.into(),
            severity,
            cve: None,
            cwe: None,
            cvss: None,
            host: None,
            port: None,
            scanner,
            template_id: template_id.into(),
            matched_at: matched_at.into(),
            description: None,
            solution: None,
            references: Vec::new(),
            proof: None,
        }
    }

    /// 중복 제거 키 `(template_id, matched_at)`
    pub fn dedup_key(&self) -> (&str, &str) {
        (&self.template_id, &self.matched_at)
    }
}

impl fmt::Display for ParsedVulnerability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}) at {}",
            self.severity, self.name, self.template_id, self.matched_at,
        )
    }
}
