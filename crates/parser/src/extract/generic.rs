//! 알려진 배너가 없는 출력에서 IPv4/호스트명 토큰을 추출합니다.
//!
//! `host:port` 형태면 상태 unknown인 tcp 서비스를 만듭니다. 버전 문자열,
//! 파일명, 이메일 주소는 호스트로 취급하지 않습니다.

use std::net::Ipv4Addr;
use std::sync::LazyLock;

use regex::Regex;

use trawler_core::types::{ParsedScanResult, Protocol, ScannerKind};

use super::HostTable;
use crate::text::{compile, strip_ansi};

static IPV4: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\b(\d{1,3}(?:\.\d{1,3}){3})(?::(\d{1,5}))?\b"));
static HOSTNAME: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?i)\b((?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,24})(?::(\d{1,5}))?\b")
});

/// 호스트명 TLD로 보이지만 실제로는 파일 확장자인 것들
const FILE_EXTENSIONS: &[&str] = &[
    "asp", "aspx", "bak", "bat", "cfg", "cgi", "class", "conf", "crt", "csr", "css", "csv",
    "dll", "doc", "docx", "exe", "gif", "gz", "htm", "html", "ini", "jar", "java", "jpg",
    "jpeg", "js", "json", "jsp", "key", "lock", "log", "md", "old", "pdf", "pem", "php",
    "pid", "pl", "png", "py", "rb", "rs", "sh", "so", "sock", "sql", "svg", "tar", "tmp",
    "toml", "txt", "war", "xml", "yaml", "yml", "zip",
];

/// 매치 앞뒤 문맥이 더 긴 토큰의 일부인지 확인합니다.
fn is_embedded(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = &text[end..];
    // `v1.2.3.4`, `1.2.3.4.5`, `user@host` 형태 제외
    let bad_before = matches!(before, Some(c) if c == '.' || c == '@' || c == '-' || c.is_ascii_alphanumeric());
    let bad_after = after.starts_with('@')
        || after
            .strip_prefix('.')
            .and_then(|rest| rest.chars().next())
            .is_some_and(|c| c.is_ascii_alphanumeric());
    bad_before || bad_after
}

/// `version 10.2.1.3`, `ver 1.0.0.1`처럼 버전 키워드 뒤에 오는지 확인합니다.
fn follows_version_word(text: &str, start: usize) -> bool {
    let word = text[..start]
        .trim_end()
        .rsplit(|c: char| c.is_whitespace())
        .next()
        .unwrap_or_default()
        .trim_end_matches([':', '='])
        .to_ascii_lowercase();
    matches!(word.as_str(), "version" | "ver" | "v" | "release" | "build")
}

fn port_of(port: Option<regex::Match<'_>>) -> Option<u16> {
    port?.as_str().parse::<u16>().ok().filter(|p| *p != 0)
}

/// 텍스트에서 IPv4/호스트명 토큰을 추출합니다.
pub fn parse(text: &str) -> ParsedScanResult {
    let clean = strip_ansi(text);
    let mut table = HostTable::new();

    for caps in IPV4.captures_iter(&clean) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let ip = &caps[1];
        if ip.parse::<Ipv4Addr>().is_err()
            || is_embedded(&clean, whole.start(), whole.end())
            || follows_version_word(&clean, whole.start())
        {
            continue;
        }
        add(&mut table, ip, port_of(caps.get(2)));
    }

    for caps in HOSTNAME.captures_iter(&clean) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let name = caps[1].to_ascii_lowercase();
        let tld = name.rsplit('.').next().unwrap_or_default();
        if FILE_EXTENSIONS.contains(&tld) || is_embedded(&clean, whole.start(), whole.end()) {
            continue;
        }
        add(&mut table, &name, port_of(caps.get(2)));
    }

    table.finish(ScannerKind::Generic, text)
}

fn add(table: &mut HostTable, key: &str, port: Option<u16>) {
    match port {
        Some(port) => {
            table.service(key, port, Protocol::Tcp);
        }
        None => {
            table.host(key);
        }
    }
}
