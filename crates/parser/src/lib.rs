#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: 도메인 에러 타입 (`ParserError`)
//! - [`detect`]: 형식 탐지 시그니처 (`detect`)
//! - [`extract`]: 스캐너별 호스트/서비스 추출기 (`extract`, `HostTable`)
//! - [`vuln`]: 취약점 추출 (nuclei JSONL/텍스트, nikto)
//! - [`enrich`]: CVE 보강 (`CveSource`, `LocalCveDb`, `Enricher`)
//! - [`router`]: 크기 검사 + 탐지 + 추출을 묶은 진입점 (`ParserRouter`)

pub mod detect;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod router;
pub mod vuln;

mod text;

// --- Public API Re-exports ---

pub use detect::detect;
pub use enrich::{CveRecord, CveSource, EnrichStats, Enricher, LocalCveDb};
pub use error::ParserError;
pub use extract::{HostTable, extract};
pub use router::{ParsedOutput, ParserRouter};
pub use vuln::extract_vulnerabilities;
