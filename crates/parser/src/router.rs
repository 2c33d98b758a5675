//! 파서 라우터 -- 크기 검사, 형식 탐지, 추출을 묶은 진입점

use metrics::counter;
use serde::Serialize;
use tracing::{debug, info};

use trawler_core::config::ParserConfig;
use trawler_core::metrics as m;
use trawler_core::types::{ParsedScanResult, ParsedVulnerability, ScannerKind};

use crate::detect::detect;
use crate::error::ParserError;
use crate::extract::extract;
use crate::vuln::extract_vulnerabilities;

/// 한 출력의 파싱 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedOutput {
    /// 탐지(또는 지정)된 형식
    pub kind: ScannerKind,
    /// 정규화된 호스트/서비스
    pub scan: ParsedScanResult,
    /// 추출된 취약점 (지원하지 않는 형식이면 빈 목록)
    pub vulnerabilities: Vec<ParsedVulnerability>,
}

/// 입력 크기 제한을 적용하는 파서 진입점
#[derive(Debug, Clone)]
pub struct ParserRouter {
    max_input_size: usize,
}

impl ParserRouter {
    /// 최대 입력 크기(바이트)로 라우터를 생성합니다.
    pub fn new(max_input_size: usize) -> Self {
        Self { max_input_size }
    }

    /// 설정에서 라우터를 생성합니다.
    pub fn from_config(config: &ParserConfig) -> Self {
        Self::new(config.max_input_size)
    }

    /// 최대 입력 크기
    pub fn max_input_size(&self) -> usize {
        self.max_input_size
    }

    /// 형식을 탐지한 뒤 추출합니다.
    pub fn parse(&self, text: &str) -> Result<ParsedOutput, ParserError> {
        self.check_size(text)?;
        let kind = detect(text);
        debug!(scanner = kind.as_str(), bytes = text.len(), "format detected");
        Ok(self.run(kind, text))
    }

    /// 지정한 형식으로 추출합니다 (탐지 생략).
    pub fn parse_as(&self, kind: ScannerKind, text: &str) -> Result<ParsedOutput, ParserError> {
        self.check_size(text)?;
        Ok(self.run(kind, text))
    }

    fn check_size(&self, text: &str) -> Result<(), ParserError> {
        if text.len() > self.max_input_size {
            return Err(ParserError::TooLarge {
                size: text.len(),
                max: self.max_input_size,
            });
        }
        Ok(())
    }

    fn run(&self, kind: ScannerKind, text: &str) -> ParsedOutput {
        let scan = extract(kind, text);
        let vulnerabilities = if kind.yields_vulnerabilities() {
            extract_vulnerabilities(kind, text)
        } else {
            Vec::new()
        };

        counter!(m::PARSE_TOTAL, m::LABEL_SCANNER => kind.as_str()).increment(1);
        if !vulnerabilities.is_empty() {
            counter!(m::VULNERABILITIES_EXTRACTED_TOTAL, m::LABEL_SCANNER => kind.as_str())
                .increment(vulnerabilities.len() as u64);
        }

        info!(
            scanner = kind.as_str(),
            hosts = scan.host_count(),
            services = scan.service_count(),
            vulnerabilities = vulnerabilities.len(),
            "output parsed"
        );

        ParsedOutput {
            kind,
            scan,
            vulnerabilities,
        }
    }
}

impl Default for ParserRouter {
    fn default() -> Self {
        Self::from_config(&ParserConfig::default())
    }
}
