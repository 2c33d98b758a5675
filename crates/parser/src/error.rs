//! 파서 에러 타입
//!
//! 추출기는 에러를 반환하지 않으므로 [`ParserError`]는 입력 크기 제한, CVE DB 로딩,
//! 파일 I/O에만 사용됩니다. `From<ParserError> for TrawlerError` 구현으로 상위로 전파됩니다.

use trawler_core::error::{ParseError, TrawlerError};

/// 파서 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ParserError {
    /// 입력 크기 초과
    #[error("input too large: {size} bytes (max: {max})")]
    TooLarge {
        /// 입력 크기 (바이트)
        size: usize,
        /// 최대 허용 크기 (바이트)
        max: usize,
    },

    /// CVE DB 로딩 실패
    #[error("cve db load error: {path}: {reason}")]
    CveDbLoad {
        /// DB 파일 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// CVE DB 파싱 실패
    #[error("cve db parse error: {0}")]
    CveDbParse(String),

    /// CVE 조회 실패 (외부 소스)
    #[error("cve lookup failed for {cve}: {reason}")]
    Lookup {
        /// 조회한 CVE ID
        cve: String,
        /// 실패 사유
        reason: String,
    },

    /// 파일 I/O 에러
    #[error("io error: {path}: {source}")]
    Io {
        /// 관련 파일 경로
        path: String,
        /// 원본 I/O 에러
        source: std::io::Error,
    },
}

impl From<ParserError> for TrawlerError {
    fn from(err: ParserError) -> Self {
        match err {
            ParserError::TooLarge { size, max } => {
                TrawlerError::Parse(ParseError::TooLarge { size, max })
            }
            ParserError::CveDbLoad { path, reason } => {
                TrawlerError::Parse(ParseError::CveDb(format!("{path}: {reason}")))
            }
            ParserError::CveDbParse(msg) => TrawlerError::Parse(ParseError::CveDb(msg)),
            ParserError::Lookup { cve, reason } => {
                TrawlerError::Parse(ParseError::CveDb(format!("{cve}: {reason}")))
            }
            ParserError::Io { source, .. } => TrawlerError::Io(source),
        }
    }
}
