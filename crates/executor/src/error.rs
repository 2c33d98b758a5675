//! Executor 에러 타입
//!
//! - [`ValidationError`]: 실행 전 거부. 프로세스는 생성되지 않습니다.
//! - [`ExecutionError`]: 실행 중 실패. `ExecutionResult.error`와 작업 기록에 문자열로
//!   남으며 비동기 경계를 `Err`로 넘지 않습니다.
//! - [`ExecutorError`]: 작업 조회, 설정 문제 등 호출자에게 반환되는 에러
//!
//! 모두 `From` 구현을 통해 [`TrawlerError`]로 전파됩니다.

use trawler_core::error::{CommandError, TrawlerError};

/// 명령 검증 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// 공백 제거 후 빈 명령
    #[error("command is empty")]
    Empty,

    /// 셸 메타문자 또는 제어 문자 포함
    #[error("command contains forbidden pattern '{pattern}'")]
    ForbiddenPattern {
        /// 발견된 패턴 (제어 문자는 `\xNN` 형식)
        pattern: String,
    },

    /// 토큰이 없음 (또는 `sudo`만 있음)
    #[error("command has no executable tokens")]
    NoTokens,

    /// 닫히지 않은 따옴표
    #[error("command has an unterminated quote")]
    UnterminatedQuote,

    /// 허용 목록에 없는 도구이거나 경로 형태의 도구
    #[error("tool '{tool}' is not allowed")]
    ToolNotAllowed {
        /// 요청된 도구 토큰
        tool: String,
    },

    /// sudo가 비활성화되었거나 설치되지 않음
    #[error("sudo is disabled or not installed")]
    SudoUnavailable,

    /// 도구가 PATH에 없음
    #[error("tool '{tool}' is not installed")]
    ToolNotInstalled {
        /// 도구 이름
        tool: String,
    },

    /// 치환할 타겟이 유효하지 않음
    #[error("invalid target '{target}': {reason}")]
    InvalidTarget {
        /// 요청된 타겟
        target: String,
        /// 거부 사유
        reason: String,
    },
}

impl ValidationError {
    /// 메트릭 `reason` 레이블 값을 반환합니다.
    pub fn reason_label(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::ForbiddenPattern { .. } => "forbidden_pattern",
            Self::NoTokens => "no_tokens",
            Self::UnterminatedQuote => "unterminated_quote",
            Self::ToolNotAllowed { .. } => "tool_not_allowed",
            Self::SudoUnavailable => "sudo_unavailable",
            Self::ToolNotInstalled { .. } => "tool_not_installed",
            Self::InvalidTarget { .. } => "invalid_target",
        }
    }
}

/// 프로세스 실행 실패
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// 프로세스 생성 실패
    #[error("failed to start '{tool}': {reason}")]
    Spawn {
        /// 실행하려던 프로그램
        tool: String,
        /// OS 에러 메시지
        reason: String,
    },

    /// 0이 아닌 종료 코드
    #[error("process exited with code {code}")]
    NonZeroExit {
        /// 종료 코드
        code: i32,
    },

    /// 시그널로 종료됨
    #[error("process terminated by signal {signal}")]
    Signaled {
        /// 시그널 번호
        signal: i32,
    },

    /// 타임아웃 초과로 강제 종료됨
    #[error("process exceeded {limit} limit and was terminated")]
    TimedOut {
        /// 표시용 제한 시간 (예: "30s")
        limit: String,
    },

    /// 호출자가 취소함
    #[error("process was cancelled and terminated")]
    Cancelled,

    /// 대기 중 I/O 실패
    #[error("failed to wait for process: {0}")]
    Wait(String),
}

/// Executor 호출자 에러
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// 검증 실패
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// 존재하지 않는 작업 ID
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },
}

impl From<ValidationError> for TrawlerError {
    fn from(err: ValidationError) -> Self {
        TrawlerError::Command(CommandError::Rejected(err.to_string()))
    }
}

impl From<ExecutionError> for TrawlerError {
    fn from(err: ExecutionError) -> Self {
        TrawlerError::Command(CommandError::ExecutionFailed(err.to_string()))
    }
}

impl From<ExecutorError> for TrawlerError {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::Validation(e) => e.into(),
            ExecutorError::JobNotFound(id) => TrawlerError::Command(CommandError::JobNotFound(id)),
            ExecutorError::Config { field, reason } => {
                TrawlerError::Config(trawler_core::error::ConfigError::InvalidValue {
                    field,
                    reason,
                })
            }
        }
    }
}
