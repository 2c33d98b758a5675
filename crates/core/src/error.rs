//! 에러 타입: 도메인별 에러 정의
//!
//! 각 크레이트는 고유 에러 타입(`ValidationError`, `ExecutorError`, `ParserError`,
//! `ReconcileError`)을 가지며, `From` 구현을 통해 [`TrawlerError`]로 전파됩니다.

/// trawler 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum TrawlerError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 명령 검증/실행 에러
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// 파싱/보강 에러
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// 인벤토리 조정 에러
    #[error("reconcile error: {0}")]
    Reconcile(#[from] ReconcileFailure),

    /// 스토리지 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 명령 검증/실행 에러 카테고리
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// 실행 전 거부됨 (문법, 허용되지 않은 도구, 미설치 도구)
    #[error("command rejected: {0}")]
    Rejected(String),

    /// 실행 실패 (spawn 실패, 비정상 종료, 타임아웃)
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// 존재하지 않는 작업 ID
    #[error("job not found: {0}")]
    JobNotFound(String),
}

/// 파싱 에러 카테고리
///
/// 추출기 자체는 에러를 반환하지 않습니다. 이 타입은 입력 크기 제한,
/// CVE DB 로딩 등 추출 외부의 실패에만 사용됩니다.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// 입력 데이터 초과
    #[error("input too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },

    /// CVE 데이터베이스 로딩/조회 실패
    #[error("cve database error: {0}")]
    CveDb(String),
}

/// 조정 엔진 에러 카테고리
#[derive(Debug, thiserror::Error)]
pub enum ReconcileFailure {
    /// DNS 해석 실패
    #[error("dns resolution failed for '{target}': {reason}")]
    Dns { target: String, reason: String },

    /// 스토리지 협력자 실패로 단위 작업 중단
    #[error("aborted: {0}")]
    Aborted(String),
}

/// 스토리지 에러
///
/// 인벤토리 영속화 계층(외부 협력자)이 반환하는 에러입니다.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 연결 실패
    #[error("connection failed: {0}")]
    Connection(String),

    /// 쿼리 실패
    #[error("query failed: {0}")]
    Query(String),

    /// 대상 엔티티 없음
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// 직렬화/역직렬화 실패
    #[error("serialization failed: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_to_trawler_error() {
        let err: TrawlerError = ConfigError::InvalidValue {
            field: "executor.kill_grace_secs".to_owned(),
            reason: "must be 1-300".to_owned(),
        }
        .into();
        assert!(matches!(err, TrawlerError::Config(_)));
        assert!(err.to_string().contains("kill_grace_secs"));
    }

    #[test]
    fn storage_not_found_display() {
        let err = StorageError::NotFound {
            entity: "host",
            id: "h-1".to_owned(),
        };
        assert_eq!(err.to_string(), "host not found: h-1");
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: TrawlerError = io.into();
        assert!(matches!(err, TrawlerError::Io(_)));
    }
}
