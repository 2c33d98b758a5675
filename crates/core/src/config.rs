//! 설정 관리: trawler.toml 파싱 및 런타임 설정
//!
//! [`TrawlerConfig`]는 모든 크레이트의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`TRAWLER_EXECUTOR_DEFAULT_TIMEOUT_SECS=600` 형식)
//! 3. 설정 파일 (`trawler.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), trawler_core::error::TrawlerError> {
//! use trawler_core::config::TrawlerConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = TrawlerConfig::load("trawler.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = TrawlerConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, TrawlerError};

/// 기본 허용 도구 목록
///
/// `sudo`는 여기 포함되지 않으며 접두어로만 취급됩니다.
pub const DEFAULT_ALLOWED_TOOLS: &[&str] = &[
    "nmap",
    "masscan",
    "nuclei",
    "nikto",
    "gobuster",
    "ffuf",
    "feroxbuster",
    "wfuzz",
    "testssl.sh",
    "testssl",
    "whatweb",
    "wpscan",
    "enum4linux",
    "enum4linux-ng",
    "httpx",
    "sqlmap",
    "hydra",
    "amass",
    "subfinder",
    "crackmapexec",
    "netexec",
    "nxc",
    "dirb",
    "sslscan",
    "dnsrecon",
];

/// 설정 상한값 상수
const MAX_KILL_GRACE_SECS: u64 = 300;
const MAX_DNS_TIMEOUT_MS: u64 = 60_000;
const MAX_OUTPUT_BYTES_LIMIT: usize = 256 * 1024 * 1024; // 256 MB

/// trawler 통합 설정
///
/// `trawler.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 크레이트는 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrawlerConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 명령 검증/실행 설정
    #[serde(default)]
    pub executor: ExecutorConfig,
    /// 출력 파서 설정
    #[serde(default)]
    pub parser: ParserConfig,
    /// CVE 보강 설정
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    /// 인벤토리 조정 설정
    #[serde(default)]
    pub inventory: InventoryConfig,
}

impl TrawlerConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    /// 3. 유효성 검증
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, TrawlerError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 파일이 없으면 기본값을 사용하여 로드합니다.
    ///
    /// CLI가 설정 파일 없이도 동작하도록 할 때 사용합니다.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self, TrawlerError> {
        let path = path.as_ref();
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Self::load(path).await;
        }
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, TrawlerError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TrawlerError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                TrawlerError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, TrawlerError> {
        toml::from_str(toml_str).map_err(|e| {
            TrawlerError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `TRAWLER_{SECTION}_{FIELD}`
    /// 예: `TRAWLER_EXECUTOR_ALLOW_SUDO=true`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "TRAWLER_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "TRAWLER_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "TRAWLER_GENERAL_DATA_DIR");

        // Executor
        override_csv(
            &mut self.executor.allowed_tools,
            "TRAWLER_EXECUTOR_ALLOWED_TOOLS",
        );
        override_bool(&mut self.executor.allow_sudo, "TRAWLER_EXECUTOR_ALLOW_SUDO");
        override_u64(
            &mut self.executor.default_timeout_secs,
            "TRAWLER_EXECUTOR_DEFAULT_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.executor.kill_grace_secs,
            "TRAWLER_EXECUTOR_KILL_GRACE_SECS",
        );
        override_usize(
            &mut self.executor.max_output_bytes,
            "TRAWLER_EXECUTOR_MAX_OUTPUT_BYTES",
        );
        override_usize(
            &mut self.executor.max_concurrent_jobs,
            "TRAWLER_EXECUTOR_MAX_CONCURRENT_JOBS",
        );

        // Parser
        override_usize(
            &mut self.parser.max_input_size,
            "TRAWLER_PARSER_MAX_INPUT_SIZE",
        );

        // Enrichment
        override_bool(&mut self.enrichment.enabled, "TRAWLER_ENRICHMENT_ENABLED");
        override_string(
            &mut self.enrichment.cve_db_path,
            "TRAWLER_ENRICHMENT_CVE_DB_PATH",
        );

        // Inventory
        override_string(
            &mut self.inventory.store_path,
            "TRAWLER_INVENTORY_STORE_PATH",
        );
        override_u64(
            &mut self.inventory.dns_timeout_ms,
            "TRAWLER_INVENTORY_DNS_TIMEOUT_MS",
        );
        override_usize(
            &mut self.inventory.provenance_max_chars,
            "TRAWLER_INVENTORY_PROVENANCE_MAX_CHARS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), TrawlerError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.executor.allowed_tools.is_empty() {
            return Err(invalid(
                "executor.allowed_tools",
                "at least one tool must be allowed".to_owned(),
            ));
        }

        for tool in &self.executor.allowed_tools {
            if tool.is_empty() || tool.contains('/') || tool.chars().any(char::is_whitespace) {
                return Err(invalid(
                    "executor.allowed_tools",
                    format!("'{tool}' must be a bare executable name"),
                ));
            }
            if tool == "sudo" {
                return Err(invalid(
                    "executor.allowed_tools",
                    "sudo is a prefix, not an allowed tool (use executor.allow_sudo)".to_owned(),
                ));
            }
        }

        if self.executor.kill_grace_secs == 0 || self.executor.kill_grace_secs > MAX_KILL_GRACE_SECS
        {
            return Err(invalid(
                "executor.kill_grace_secs",
                format!("must be 1-{MAX_KILL_GRACE_SECS}"),
            ));
        }

        if self.executor.max_output_bytes == 0
            || self.executor.max_output_bytes > MAX_OUTPUT_BYTES_LIMIT
        {
            return Err(invalid(
                "executor.max_output_bytes",
                format!("must be 1-{MAX_OUTPUT_BYTES_LIMIT}"),
            ));
        }

        if self.executor.max_concurrent_jobs == 0 {
            return Err(invalid(
                "executor.max_concurrent_jobs",
                "must be at least 1".to_owned(),
            ));
        }

        if self.parser.max_input_size == 0 {
            return Err(invalid(
                "parser.max_input_size",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.enrichment.enabled && self.enrichment.cve_db_path.is_empty() {
            return Err(invalid(
                "enrichment.cve_db_path",
                "cve_db_path must not be empty when enrichment is enabled".to_owned(),
            ));
        }

        if self.inventory.dns_timeout_ms == 0 || self.inventory.dns_timeout_ms > MAX_DNS_TIMEOUT_MS
        {
            return Err(invalid(
                "inventory.dns_timeout_ms",
                format!("must be 1-{MAX_DNS_TIMEOUT_MS}"),
            ));
        }

        if self.inventory.provenance_max_chars == 0 {
            return Err(invalid(
                "inventory.provenance_max_chars",
                "must be at least 1".to_owned(),
            ));
        }

        if self.inventory.store_path.is_empty() {
            return Err(invalid(
                "inventory.store_path",
                "store_path must not be empty".to_owned(),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> TrawlerError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 데이터 디렉토리
    pub data_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
            data_dir: "/var/lib/trawler".to_owned(),
        }
    }
}

/// 명령 검증/실행 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// 실행 허용 도구 목록 (bare name)
    pub allowed_tools: Vec<String>,
    /// `sudo` 접두어 허용 여부
    pub allow_sudo: bool,
    /// 기본 타임아웃 (초). 0이면 무제한
    pub default_timeout_secs: u64,
    /// SIGTERM 이후 SIGKILL까지 대기 시간 (초)
    pub kill_grace_secs: u64,
    /// 스트림별 최대 캡처 크기 (바이트)
    pub max_output_bytes: usize,
    /// 동시 실행 작업 수
    pub max_concurrent_jobs: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            allowed_tools: DEFAULT_ALLOWED_TOOLS.iter().map(|t| (*t).to_owned()).collect(),
            allow_sudo: false,
            default_timeout_secs: 3600,
            kill_grace_secs: 5,
            max_output_bytes: 16 * 1024 * 1024, // 16 MB
            max_concurrent_jobs: 4,
        }
    }
}

/// 출력 파서 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// 파싱 대상 입력 최대 크기 (바이트)
    pub max_input_size: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_input_size: 64 * 1024 * 1024, // 64 MB
        }
    }
}

/// CVE 보강 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// 보강 활성화 여부
    pub enabled: bool,
    /// 로컬 CVE DB(JSON) 경로
    pub cve_db_path: String,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cve_db_path: "/var/lib/trawler/cve-db.json".to_owned(),
        }
    }
}

/// 인벤토리 조정 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    /// JSON 인벤토리 파일 경로
    pub store_path: String,
    /// 호스트별 DNS 해석 타임아웃 (밀리초)
    pub dns_timeout_ms: u64,
    /// 신규 취약점에 저장할 원본 출력 최대 길이 (문자 수)
    pub provenance_max_chars: usize,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            store_path: "/var/lib/trawler/inventory.json".to_owned(),
            dns_timeout_ms: 3000,
            provenance_max_chars: 10_000,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
