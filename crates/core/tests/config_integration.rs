//! trawler.toml 통합 설정 테스트
//!
//! - trawler.toml.example과 코드 기본값 일치
//! - 부분 설정 (일부 섹션만) 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 타입/범위 에러 테스트

use trawler_core::config::TrawlerConfig;
use trawler_core::error::{ConfigError, TrawlerError};

/// 환경변수를 설정한 상태에서 클로저를 실행하고 원래 값을 복원합니다.
fn with_env<T>(key: &str, value: &str, f: impl FnOnce() -> T) -> T {
    let original = std::env::var(key).ok();
    // SAFETY: 테스트는 serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var(key, value);
    }

    let result = f();

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var(key, val),
            None => std::env::remove_var(key),
        }
    }
    result
}

// =============================================================================
// trawler.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_matches_code_defaults() {
    let content = include_str!("../../../trawler.toml.example");
    let example = TrawlerConfig::parse(content).expect("should parse");
    let defaults = TrawlerConfig::default();

    assert_eq!(
        example.executor.allowed_tools,
        defaults.executor.allowed_tools
    );
    assert_eq!(example.executor.allow_sudo, defaults.executor.allow_sudo);
    assert_eq!(
        example.executor.default_timeout_secs,
        defaults.executor.default_timeout_secs
    );
    assert_eq!(
        example.executor.kill_grace_secs,
        defaults.executor.kill_grace_secs
    );
    assert_eq!(
        example.executor.max_output_bytes,
        defaults.executor.max_output_bytes
    );
    assert_eq!(
        example.executor.max_concurrent_jobs,
        defaults.executor.max_concurrent_jobs
    );
    assert_eq!(
        example.parser.max_input_size,
        defaults.parser.max_input_size
    );
    assert_eq!(example.enrichment.enabled, defaults.enrichment.enabled);
    assert_eq!(
        example.enrichment.cve_db_path,
        defaults.enrichment.cve_db_path
    );
    assert_eq!(example.inventory.store_path, defaults.inventory.store_path);
    assert_eq!(
        example.inventory.dns_timeout_ms,
        defaults.inventory.dns_timeout_ms
    );
    assert_eq!(
        example.inventory.provenance_max_chars,
        defaults.inventory.provenance_max_chars
    );
}

// =============================================================================
// 부분 설정 테스트
// =============================================================================

#[test]
fn partial_config_two_sections() {
    let toml = r#"
[enrichment]
enabled = true
cve_db_path = "/tmp/cves.json"

[inventory]
dns_timeout_ms = 500
"#;
    let config = TrawlerConfig::parse(toml).expect("should parse");
    assert!(config.enrichment.enabled);
    assert_eq!(config.enrichment.cve_db_path, "/tmp/cves.json");
    assert_eq!(config.inventory.dns_timeout_ms, 500);
    assert_eq!(
        config.inventory.store_path,
        "/var/lib/trawler/inventory.json"
    );
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_toml() {
    let toml = r#"
[general]
log_level = "info"
"#;
    let result = with_env("TRAWLER_GENERAL_LOG_LEVEL", "error", || {
        let mut config = TrawlerConfig::parse(toml).expect("should parse");
        config.apply_env_overrides();
        config.general.log_level
    });
    assert_eq!(result, "error");
}

#[test]
#[serial_test::serial]
fn env_override_csv_for_allowed_tools() {
    let result = with_env("TRAWLER_EXECUTOR_ALLOWED_TOOLS", "nmap, nuclei ,,ffuf", || {
        let mut config = TrawlerConfig::default();
        config.apply_env_overrides();
        config.executor.allowed_tools
    });
    assert_eq!(result, vec!["nmap", "nuclei", "ffuf"]);
}

#[test]
#[serial_test::serial]
fn env_override_bool_field() {
    let result = with_env("TRAWLER_EXECUTOR_ALLOW_SUDO", "true", || {
        let mut config = TrawlerConfig::default();
        config.apply_env_overrides();
        config.executor.allow_sudo
    });
    assert!(result);
}

#[test]
#[serial_test::serial]
fn env_override_numeric_field() {
    let result = with_env("TRAWLER_INVENTORY_DNS_TIMEOUT_MS", "1500", || {
        let mut config = TrawlerConfig::default();
        config.apply_env_overrides();
        config.inventory.dns_timeout_ms
    });
    assert_eq!(result, 1500);
}

#[test]
#[serial_test::serial]
fn env_override_invalid_number_keeps_value() {
    let result = with_env("TRAWLER_EXECUTOR_KILL_GRACE_SECS", "soon", || {
        let mut config = TrawlerConfig::default();
        config.apply_env_overrides();
        config.executor.kill_grace_secs
    });
    assert_eq!(result, 5);
}

#[test]
#[serial_test::serial]
fn env_override_missing_var_keeps_toml_value() {
    // SAFETY: serial_test로 직렬화됨
    unsafe {
        std::env::remove_var("TRAWLER_EXECUTOR_MAX_CONCURRENT_JOBS");
    }
    let toml = r#"
[executor]
max_concurrent_jobs = 9
"#;
    let mut config = TrawlerConfig::parse(toml).expect("should parse");
    config.apply_env_overrides();
    assert_eq!(config.executor.max_concurrent_jobs, 9);
}

// =============================================================================
// 에러 케이스 테스트
// =============================================================================

#[test]
fn wrong_type_for_numeric_field() {
    let toml = r#"
[executor]
kill_grace_secs = "five"
"#;
    assert!(TrawlerConfig::parse(toml).is_err());
}

#[test]
fn unknown_section_is_ignored() {
    let toml = r#"
[general]
log_level = "warn"

[unknown_section]
key = "value"
"#;
    let config = TrawlerConfig::parse(toml).expect("unknown sections are ignored");
    assert_eq!(config.general.log_level, "warn");
}

#[test]
fn out_of_range_grace_fails_validation() {
    let toml = r#"
[executor]
kill_grace_secs = 301
"#;
    let config = TrawlerConfig::parse(toml).expect("should parse");
    let err = config.validate().expect_err("grace above 300 is invalid");
    assert!(matches!(
        err,
        TrawlerError::Config(ConfigError::InvalidValue { .. })
    ));
}

#[tokio::test]
async fn from_file_nonexistent_returns_file_not_found() {
    let result = TrawlerConfig::from_file("/tmp/trawler_test_nonexistent_12345.toml").await;
    assert!(matches!(
        result,
        Err(TrawlerError::Config(ConfigError::FileNotFound { .. }))
    ));
}

#[tokio::test]
#[serial_test::serial]
async fn load_or_default_without_file_uses_defaults() {
    let config = TrawlerConfig::load_or_default("/tmp/trawler_test_nonexistent_67890.toml")
        .await
        .expect("missing file falls back to defaults");
    assert_eq!(config.executor.kill_grace_secs, 5);
}

#[tokio::test]
async fn from_file_reads_temp_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("trawler.toml");
    std::fs::write(&path, "[executor]\nmax_concurrent_jobs = 2\n").expect("write");

    let config = TrawlerConfig::from_file(&path).await.expect("should load");
    assert_eq!(config.executor.max_concurrent_jobs, 2);
}

#[tokio::test]
async fn from_file_rejects_invalid_values() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("trawler.toml");
    std::fs::write(&path, "[inventory]\ndns_timeout_ms = 0\n").expect("write");

    let result = TrawlerConfig::from_file(&path).await;
    assert!(matches!(
        result,
        Err(TrawlerError::Config(ConfigError::InvalidValue { .. }))
    ));
}

