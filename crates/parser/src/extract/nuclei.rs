//! nuclei 출력에서 호스트/서비스 추출
//!
//! 취약점 자체는 [`crate::vuln`]이 담당합니다. 여기서는 매칭된 URL이 가리키는
//! 호스트와 포트만 모읍니다.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use trawler_core::types::{HostState, ParsedScanResult, PortState, Protocol, ScannerKind};

use super::HostTable;
use crate::text::{compile, is_ip, parse_endpoint, strip_ansi};

/// `[timestamp] [template] [proto] [severity] target extra` 텍스트 줄
///
/// 캡처: 1=template, 2=proto, 3=severity, 4=target, 5=나머지
pub(crate) static TEXT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"^\s*(?:\[\d{4}-\d{2}-\d{2}[^\]]*\]\s+)?\[([^\]\s]+)\](?:\s+\[([A-Za-z0-9-]+)\])?\s+\[(info|low|medium|high|critical|unknown)\]\s+(\S+)(.*)$",
    )
});

/// JSON 줄에서 문자열 또는 숫자 필드를 문자열로 읽습니다.
pub(crate) fn json_str<'a>(value: &'a Value, key: &str) -> Option<std::borrow::Cow<'a, str>> {
    match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(std::borrow::Cow::Borrowed(s.trim())),
        Value::Number(n) => Some(std::borrow::Cow::Owned(n.to_string())),
        _ => None,
    }
}

/// JSON 객체 줄을 순서대로 반환합니다. `{`로 시작하지 않거나 깨진 줄은 건너뜁니다.
pub(crate) fn json_lines(text: &str) -> impl Iterator<Item = Value> + '_ {
    text.lines().filter_map(|line| {
        let line = line.trim().trim_end_matches(',');
        if !line.starts_with('{') {
            return None;
        }
        serde_json::from_str::<Value>(line)
            .ok()
            .filter(Value::is_object)
    })
}

/// nuclei 출력을 추출합니다.
pub fn parse(text: &str) -> ParsedScanResult {
    let mut table = HostTable::new();
    let mut saw_json = false;

    for record in json_lines(text) {
        saw_json = true;
        let target = json_str(&record, "matched-at").or_else(|| json_str(&record, "host"));
        let Some(target) = target else {
            continue;
        };
        let ip = json_str(&record, "ip");
        let port = json_str(&record, "port").and_then(|p| p.parse::<u16>().ok());
        let kind = json_str(&record, "type");
        add_target(&mut table, &target, ip.as_deref(), port, kind.as_deref());
    }

    if !saw_json {
        let clean = strip_ansi(text);
        for line in clean.lines() {
            if let Some(caps) = TEXT_LINE.captures(line) {
                let proto = caps.get(2).map(|m| m.as_str().to_ascii_lowercase());
                add_target(&mut table, &caps[4], None, None, proto.as_deref());
            }
        }
    }

    table.finish(ScannerKind::Nuclei, text)
}

/// 매칭 대상 하나를 호스트 테이블에 반영합니다.
///
/// `ip`가 주어지고 대상이 호스트명이면 IP를 키로, 호스트명을 hostname으로 둡니다.
fn add_target(
    table: &mut HostTable,
    target: &str,
    ip: Option<&str>,
    port: Option<u16>,
    kind: Option<&str>,
) {
    let Some(endpoint) = parse_endpoint(target) else {
        return;
    };

    let (key, hostname) = match ip {
        Some(ip) if is_ip(ip) && !is_ip(&endpoint.host) => (ip.to_owned(), Some(endpoint.host.clone())),
        _ => (endpoint.host.clone(), None),
    };

    {
        let host = table.host(&key);
        host.state = HostState::Up;
        if hostname.is_some() && host.hostname.is_none() {
            host.hostname = hostname;
        }
    }

    let Some(port) = endpoint.port.or(port).or_else(|| endpoint.effective_port()) else {
        return;
    };
    let protocol = match kind {
        Some("dns") | Some("udp") => Protocol::Udp,
        _ => Protocol::Tcp,
    };
    let name = endpoint
        .service_name()
        .map(str::to_owned)
        .or_else(|| kind.filter(|k| matches!(*k, "http" | "dns" | "ssl")).map(str::to_owned));

    if let Some(service) = table.service(&key, port, protocol) {
        service.state = PortState::Open;
        if let Some(name) = name {
            service.service = name;
        }
    }
}
