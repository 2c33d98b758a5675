//! masscan 출력 추출기 -- 텍스트(`Discovered open port`) 및 JSON(`-oJ`)
//!
//! masscan JSON은 배열 괄호와 줄 끝 쉼표가 섞인 반쯤 깨진 형태로 나올 수 있어
//! 줄 단위로 정리한 뒤 객체마다 역직렬화합니다.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use trawler_core::types::{HostState, ParsedScanResult, PortState, Protocol, ScannerKind};

use super::HostTable;
use crate::text::compile;

static DISCOVERED: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"Discovered (open|closed) port (\d{1,6})/(tcp|udp) on ([0-9A-Fa-f.:]+)")
});
static BANNER: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"Banner on port (\d{1,6})/(tcp|udp) on ([0-9A-Fa-f.:]+): \[([^\]]*)\]\s*(.*)$")
});

#[derive(Debug, Deserialize)]
struct JsonRecord {
    ip: String,
    #[serde(default)]
    ports: Vec<JsonPort>,
}

#[derive(Debug, Deserialize)]
struct JsonPort {
    port: u32,
    #[serde(default)]
    proto: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    service: Option<JsonService>,
}

#[derive(Debug, Deserialize)]
struct JsonService {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    banner: Option<String>,
}

/// masscan 출력을 추출합니다.
pub fn parse(text: &str) -> ParsedScanResult {
    let mut table = HostTable::new();

    parse_json_lines(&mut table, text);
    if table.is_empty() {
        parse_json_document(&mut table, text);
    }

    for line in text.lines() {
        if let Some(caps) = DISCOVERED.captures(line) {
            let Some((port, protocol)) = port_proto(&caps[2], &caps[3]) else {
                continue;
            };
            let key = &caps[4];
            table.host(key).state = HostState::Up;
            if let Some(service) = table.service(key, port, protocol) {
                service.state = PortState::from_str_loose(&caps[1]);
            }
        } else if let Some(caps) = BANNER.captures(line) {
            let Some((port, protocol)) = port_proto(&caps[1], &caps[2]) else {
                continue;
            };
            if let Some(service) = table.service(&caps[3], port, protocol) {
                let name = caps[4].trim();
                if !name.is_empty() {
                    service.service = name.to_owned();
                }
                let banner = caps[5].trim();
                if !banner.is_empty() {
                    service.extra_info = Some(banner.to_owned());
                }
            }
        }
    }

    table.finish(ScannerKind::Masscan, text)
}

fn port_proto(port: &str, proto: &str) -> Option<(u16, Protocol)> {
    let port = u16::try_from(port.parse::<u32>().ok()?).ok()?;
    Some((port, Protocol::from_str_loose(proto)?))
}

/// `{ ... },` 형태의 줄을 객체 하나로 간주합니다.
fn parse_json_lines(table: &mut HostTable, text: &str) {
    for line in text.lines() {
        let line = line.trim().trim_start_matches('[').trim_end_matches(']');
        let line = line.trim().trim_end_matches(',').trim();
        if !line.starts_with('{') || !line.ends_with('}') {
            continue;
        }
        if let Ok(record) = serde_json::from_str::<JsonRecord>(line) {
            apply_record(table, record);
        }
    }
}

/// 여러 줄에 걸친 JSON 배열 문서 전체를 시도합니다.
fn parse_json_document(table: &mut HostTable, text: &str) {
    let trimmed = text.trim().trim_end_matches(',');
    if !trimmed.starts_with('[') {
        return;
    }
    // masscan은 마지막 원소 뒤에 쉼표를 남기기도 합니다
    let repaired = trimmed
        .trim_end_matches(']')
        .trim_end()
        .trim_end_matches(',')
        .to_owned()
        + "]";
    if let Ok(records) = serde_json::from_str::<Vec<JsonRecord>>(&repaired) {
        for record in records {
            apply_record(table, record);
        }
    }
}

fn apply_record(table: &mut HostTable, record: JsonRecord) {
    let key = record.ip.trim();
    if key.is_empty() {
        return;
    }
    table.host(key).state = HostState::Up;
    for entry in record.ports {
        let Some(protocol) = Protocol::from_str_loose(&entry.proto) else {
            continue;
        };
        let Ok(port) = u16::try_from(entry.port) else {
            continue;
        };
        let Some(service) = table.service(key, port, protocol) else {
            continue;
        };
        if let Some(status) = entry.status.as_deref() {
            service.state = PortState::from_str_loose(status);
        }
        if let Some(svc) = entry.service {
            if let Some(name) = svc.name.filter(|n| !n.trim().is_empty()) {
                service.service = name;
            }
            if let Some(banner) = svc.banner.filter(|b| !b.trim().is_empty()) {
                service.extra_info = Some(banner);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_discoveries() {
        let text = "\
Starting masscan 1.3.2 (http://bit.ly/14GZzcT) at 2024-03-01 10:00:00 GMT
Initiating SYN Stealth Scan
Scanning 256 hosts [2 ports/host]
Discovered open port 80/tcp on 10.0.0.1
Discovered open port 443/tcp on 10.0.0.1
Discovered open port 53/udp on 10.0.0.2
Banner on port 80/tcp on 10.0.0.1: [http] HTTP/1.1 200 OK
";
        let result = parse(text);
        assert_eq!(result.scanner, ScannerKind::Masscan);
        assert_eq!(result.hosts.len(), 2);
        let first = &result.hosts[0];
        assert_eq!(first.ip, "10.0.0.1");
        assert_eq!(first.state, HostState::Up);
        assert_eq!(first.services.len(), 2);
        assert_eq!(first.services[0].state, PortState::Open);
        assert_eq!(first.services[0].service, "http");
        assert_eq!(first.services[0].extra_info.as_deref(), Some("HTTP/1.1 200 OK"));
        assert_eq!(result.hosts[1].services[0].protocol, Protocol::Udp);
    }

    #[test]
    fn parses_json_lines_with_brackets_and_commas() {
        let text = r#"[
{   "ip": "10.0.0.1",   "timestamp": "1709287200", "ports": [ {"port": 22, "proto": "tcp", "status": "open", "reason": "syn-ack", "ttl": 64} ] },
{   "ip": "10.0.0.1",   "timestamp": "1709287201", "ports": [ {"port": 80, "proto": "tcp", "status": "open", "reason": "syn-ack", "ttl": 64} ] },
{   "ip": "10.0.0.3",   "timestamp": "1709287202", "ports": [ {"port": 80, "proto": "tcp", "service": {"name": "http", "banner": "nginx"} } ] },
]
"#;
        let result = parse(text);
        assert_eq!(result.hosts.len(), 2);
        assert_eq!(result.hosts[0].services.len(), 2);
        let banner = &result.hosts[1].services[0];
        assert_eq!(banner.service, "http");
        assert_eq!(banner.extra_info.as_deref(), Some("nginx"));
    }

    #[test]
    fn parses_multiline_json_document() {
        let text = r#"[
  {
    "ip": "192.168.1.10",
    "ports": [{"port": 3389, "proto": "tcp", "status": "open"}]
  },
]"#;
        let result = parse(text);
        assert_eq!(result.hosts.len(), 1);
        assert_eq!(result.hosts[0].services[0].port, 3389);
    }

    #[test]
    fn ignores_invalid_ports() {
        let text = "Discovered open port 99999/tcp on 10.0.0.1\nDiscovered open port 0/tcp on 10.0.0.2";
        let result = parse(text);
        assert!(result.hosts.iter().all(|h| h.services.is_empty()));
    }

    #[test]
    fn static_patterns_compile() {
        LazyLock::force(&DISCOVERED);
        LazyLock::force(&BANNER);
    }
}
