//! 스캐너별 호스트/서비스 추출기
//!
//! 모든 추출기는 `&str -> ParsedScanResult` 순수 함수이며, 잘린 입력을 만나면
//! 완성된 부분까지만 반환합니다. 실패를 에러로 올리지 않습니다.
//!
//! 호스트는 [`HostTable`]을 통해서만 만들어지므로 한 번의 추출에서 같은 키의
//! 호스트는 하나뿐입니다.

pub mod generic;
pub mod hydra;
pub mod masscan;
pub mod nmap;
pub mod nuclei;
pub mod smb;
pub mod subdomain;
pub mod testssl;
pub mod web;

use std::collections::HashMap;

use trawler_core::types::{ParsedHost, ParsedScanResult, ParsedService, Protocol, ScannerKind};

/// 형식에 맞는 추출기로 디스패치합니다.
pub fn extract(kind: ScannerKind, text: &str) -> ParsedScanResult {
    match kind {
        ScannerKind::NmapXml => nmap::parse_xml(text),
        ScannerKind::NmapText => nmap::parse_text(text),
        ScannerKind::NmapGreppable => nmap::parse_greppable(text),
        ScannerKind::Masscan => masscan::parse(text),
        ScannerKind::Nuclei => nuclei::parse(text),
        ScannerKind::Nikto
        | ScannerKind::Gobuster
        | ScannerKind::Ffuf
        | ScannerKind::Feroxbuster
        | ScannerKind::Wfuzz
        | ScannerKind::Whatweb
        | ScannerKind::Wpscan
        | ScannerKind::Httpx
        | ScannerKind::Sqlmap => web::parse(kind, text),
        ScannerKind::Testssl => testssl::parse(text),
        ScannerKind::Enum4linux => smb::parse_enum4linux(text),
        ScannerKind::Crackmapexec => smb::parse_crackmapexec(text),
        ScannerKind::Hydra => hydra::parse(text),
        ScannerKind::Amass => subdomain::parse(ScannerKind::Amass, text),
        ScannerKind::Subfinder => subdomain::parse(ScannerKind::Subfinder, text),
        ScannerKind::Generic => generic::parse(text),
        ScannerKind::Unknown => ParsedScanResult::empty(ScannerKind::Unknown, text),
    }
}

/// 키 중복 없는 호스트 누적기
///
/// 키는 소문자로 정규화됩니다. 삽입 순서가 결과 순서입니다.
#[derive(Debug, Default)]
pub struct HostTable {
    hosts: Vec<ParsedHost>,
    index: HashMap<String, usize>,
}

impl HostTable {
    /// 빈 테이블을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(key: &str) -> String {
        key.trim().to_ascii_lowercase()
    }

    /// 호스트를 찾거나 새로 만듭니다.
    pub fn host(&mut self, key: &str) -> &mut ParsedHost {
        let key = Self::normalize(key);
        let idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                let idx = self.hosts.len();
                self.hosts.push(ParsedHost::new(key.clone()));
                self.index.insert(key, idx);
                idx
            }
        };
        &mut self.hosts[idx]
    }

    /// 호스트가 있으면 반환합니다.
    pub fn get(&self, key: &str) -> Option<&ParsedHost> {
        self.index
            .get(&Self::normalize(key))
            .map(|&idx| &self.hosts[idx])
    }

    /// 호스트가 있는지 확인합니다.
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(&Self::normalize(key))
    }

    /// 호스트의 (port, protocol) 서비스를 찾거나 새로 만듭니다.
    ///
    /// 포트가 0이면 None입니다. 새 서비스는 `unknown` 상태/이름으로 시작합니다.
    pub fn service(&mut self, key: &str, port: u16, protocol: Protocol) -> Option<&mut ParsedService> {
        let host = self.host(key);
        let pos = match host
            .services
            .iter()
            .position(|s| s.port == port && s.protocol == protocol)
        {
            Some(pos) => pos,
            None => {
                let service = ParsedService::new(host.ip.clone(), port, protocol)?;
                host.services.push(service);
                host.services.len() - 1
            }
        };
        host.services.get_mut(pos)
    }

    /// 호스트 수
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }


    /// 결과 구조로 마무리합니다.
    pub fn finish(self, kind: ScannerKind, raw: &str) -> ParsedScanResult {
        ParsedScanResult {
            hosts: self.hosts,
            ..ParsedScanResult::empty(kind, raw)
        }
    }
}
