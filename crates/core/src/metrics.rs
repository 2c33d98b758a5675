//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::histogram!()`
//! 매크로를 호출합니다. 레코더가 설치되지 않으면 모든 호출은 no-op입니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `trawler_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(trawler_core::metrics::JOBS_STARTED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 결과 레이블 키 (success, failure, timeout, cancelled, spawn_failure)
pub const LABEL_RESULT: &str = "result";

/// 스캐너 레이블 키 (nmap-xml, nuclei, ...)
pub const LABEL_SCANNER: &str = "scanner";

/// 엔티티 레이블 키 (host, service, vulnerability)
pub const LABEL_ENTITY: &str = "entity";

/// 조정 결과 레이블 키 (created, updated, skipped)
pub const LABEL_OUTCOME: &str = "outcome";

/// 거부 사유 레이블 키
pub const LABEL_REASON: &str = "reason";

// ─── Executor 메트릭 ────────────────────────────────────────────────

/// Executor: 검증 단계에서 거부된 명령 수 (counter, label: reason)
pub const VALIDATION_REJECTED_TOTAL: &str = "trawler_validation_rejected_total";

/// Executor: 시작된 프로세스 수 (counter, 생성 실패 제외)
pub const JOBS_STARTED_TOTAL: &str = "trawler_jobs_started_total";

/// Executor: 종료된 프로세스 수 (counter, label: result). `spawn_failure`는 시작 수에 포함되지 않음
pub const JOBS_FINISHED_TOTAL: &str = "trawler_jobs_finished_total";

/// Executor: 프로세스 실행 시간 (histogram, 초)
pub const JOB_DURATION_SECONDS: &str = "trawler_job_duration_seconds";

// ─── Parser 메트릭 ──────────────────────────────────────────────────

/// Parser: 처리된 출력 수 (counter, label: scanner)
pub const PARSE_TOTAL: &str = "trawler_parse_total";

/// Parser: 추출된 취약점 수 (counter, label: scanner)
pub const VULNERABILITIES_EXTRACTED_TOTAL: &str = "trawler_vulnerabilities_extracted_total";

// ─── Inventory 메트릭 ───────────────────────────────────────────────

/// Inventory: 엔티티별 조정 결과 (counter, labels: entity, outcome)
pub const RECONCILE_ENTITIES_TOTAL: &str = "trawler_reconcile_entities_total";

/// Inventory: 조정 중 기록된 에러 수 (counter)
pub const RECONCILE_ERRORS_TOTAL: &str = "trawler_reconcile_errors_total";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    // Executor
    describe_counter!(
        VALIDATION_REJECTED_TOTAL,
        "Total number of commands rejected before execution"
    );
    describe_counter!(
        JOBS_STARTED_TOTAL,
        "Total number of tool processes spawned"
    );
    describe_counter!(
        JOBS_FINISHED_TOTAL,
        "Total number of tool processes finished by result"
    );
    describe_histogram!(
        JOB_DURATION_SECONDS,
        "Wall-clock duration of a tool process in seconds"
    );

    // Parser
    describe_counter!(PARSE_TOTAL, "Total number of outputs parsed by scanner kind");
    describe_counter!(
        VULNERABILITIES_EXTRACTED_TOTAL,
        "Total number of vulnerabilities extracted from scanner output"
    );

    // Inventory
    describe_counter!(
        RECONCILE_ENTITIES_TOTAL,
        "Inventory entities reconciled by entity and outcome"
    );
    describe_counter!(
        RECONCILE_ERRORS_TOTAL,
        "Total number of per-unit errors recorded during reconciliation"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        VALIDATION_REJECTED_TOTAL,
        JOBS_STARTED_TOTAL,
        JOBS_FINISHED_TOTAL,
        JOB_DURATION_SECONDS,
        PARSE_TOTAL,
        VULNERABILITIES_EXTRACTED_TOTAL,
        RECONCILE_ENTITIES_TOTAL,
        RECONCILE_ERRORS_TOTAL,
    ];

    #[test]
    fn all_metrics_start_with_trawler_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("trawler_"),
                "Metric '{}' does not start with 'trawler_' prefix",
                name
            );
        }
    }

    #[test]
    fn counters_end_with_total() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.ends_with("_total") || name.ends_with("_seconds"),
                "Metric '{}' has no unit suffix",
                name
            );
        }
    }

    #[test]
    fn describe_all_does_not_panic() {
        // 레코더 없이도 panic 없어야 함
        describe_all();
    }

    #[test]
    fn label_keys_are_lowercase() {
        let labels = [
            LABEL_RESULT,
            LABEL_SCANNER,
            LABEL_ENTITY,
            LABEL_OUTCOME,
            LABEL_REASON,
        ];
        for label in &labels {
            assert_eq!(label.to_lowercase(), *label);
        }
    }
}
