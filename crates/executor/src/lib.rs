#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: 도메인 에러 타입 (`ValidationError`, `ExecutionError`, `ExecutorError`)
//! - [`registry`]: 허용 도구 목록과 설치 여부 캐시 (`ToolRegistry`, `ToolProbe`, `PathProbe`)
//! - [`tokenizer`]: 따옴표 인식 공백 분리기
//! - [`validator`]: 명령 검증과 타겟 치환 (`CommandValidator`, `CommandSpec`)
//! - [`supervisor`]: 하위 프로세스 실행/타임아웃/종료 에스컬레이션 (`ProcessSupervisor`)
//! - [`job`]: 비동기 작업 제출/조회/구독/취소 (`JobManager`, `JobRecord`)

pub mod error;
pub mod job;
pub mod registry;
pub mod supervisor;
pub mod tokenizer;
pub mod validator;

// --- Public API Re-exports ---

// Error
pub use error::{ExecutionError, ExecutorError, ValidationError};

// Registry
pub use registry::{PathProbe, ToolProbe, ToolRegistry, ToolStatus};

// Validation
pub use validator::{CommandSpec, CommandValidator};

// Execution
pub use job::{JobId, JobManager, JobRecord, JobStatus};
pub use supervisor::{ExecutionResult, ProcessSupervisor, SupervisorConfig};
