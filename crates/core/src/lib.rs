//! trawler-core -- 스캔 실행/결과 조정 파이프라인의 공통 기반
//!
//! 모든 trawler 크레이트가 공유하는 도메인 타입, 에러 분류, 설정, 메트릭 이름을 정의합니다.
//!
//! # Module Structure
//!
//! - [`error`]: 최상위 에러 타입 (`TrawlerError`)과 공통 에러 카테고리
//! - [`config`]: `trawler.toml` 파싱 및 환경변수 오버라이드 (`TrawlerConfig`)
//! - [`types`]: 심각도, 프로토콜, 스캐너 종류, 정규화된 스캔 결과 구조
//! - [`metrics`]: 메트릭 이름 상수 및 설명 등록

pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, StorageError, TrawlerError};

// 설정
pub use config::TrawlerConfig;

// 도메인 타입
pub use types::{
    HostState, ParsedHost, ParsedScanResult, ParsedService, ParsedVulnerability, PortState,
    Protocol, ScannerKind, Severity,
};
