//! testssl.sh 출력 추출기 (텍스트 및 `--jsonfile`)

use std::sync::LazyLock;

use regex::Regex;

use trawler_core::types::{HostState, ParsedScanResult, PortState, Protocol, ScannerKind};

use super::HostTable;
use super::nuclei::{json_lines, json_str};
use crate::text::{compile, is_ip, strip_ansi};

const TOOL: &str = "testssl";
const SERVICE: &str = "tls";

pub(crate) static START: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"Start\s+(\S+\s+\S+)\s+-->>\s+(\[[^\]]+\]|[^\s\[]+?):(\d{1,5})\s+\(([^)]*)\)\s+<<--")
});
static DONE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"Done\s+(\S+\s+\S+)\s+\[[^\]]*\]\s+-->>")
});

/// 문제로 보고된 줄인지 여부
fn is_problem(line: &str) -> bool {
    line.contains("VULNERABLE") || line.contains("NOT ok")
}

/// testssl.sh 출력을 추출합니다.
pub fn parse(text: &str) -> ParsedScanResult {
    let mut table = HostTable::new();
    let mut start_time = None;
    let mut end_time = None;
    let mut current: Option<(String, u16)> = None;

    for record in json_lines(text) {
        // `"ip": "web01.local/10.0.0.5"`
        let Some(ip_field) = json_str(&record, "ip") else {
            continue;
        };
        let Some(port) = json_str(&record, "port").and_then(|p| p.parse::<u16>().ok()) else {
            continue;
        };
        let (name, ip) = match ip_field.split_once('/') {
            Some((name, ip)) => (Some(name.trim()), ip.trim()),
            None => (None, ip_field.trim()),
        };
        open_target(&mut table, ip, port, name);

        let severity = json_str(&record, "severity").unwrap_or_default();
        if matches!(&*severity, "OK" | "INFO" | "DEBUG" | "") {
            continue;
        }
        let id = json_str(&record, "id").unwrap_or_default();
        let finding = json_str(&record, "finding").unwrap_or_default();
        if let Some(service) = table.service(ip, port, Protocol::Tcp) {
            service.push_script(TOOL, &format!("{id} [{severity}] {finding}"));
        }
    }

    let clean = strip_ansi(text);
    for line in clean.lines() {
        if let Some(caps) = START.captures(line) {
            start_time.get_or_insert_with(|| caps[1].to_owned());
            let ip = caps[2].trim_start_matches('[').trim_end_matches(']');
            let Ok(port) = caps[3].parse::<u16>() else {
                current = None;
                continue;
            };
            current = open_target(&mut table, ip, port, Some(&caps[4]));
            continue;
        }
        if let Some(caps) = DONE.captures(line) {
            end_time = Some(caps[1].to_owned());
            current = None;
            continue;
        }
        if !is_problem(line) {
            continue;
        }
        let Some((key, port)) = current.as_ref() else {
            continue;
        };
        if let Some(service) = table.service(key, *port, Protocol::Tcp) {
            let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
            service.push_script(TOOL, &line);
        }
    }

    ParsedScanResult {
        start_time,
        end_time,
        ..table.finish(ScannerKind::Testssl, text)
    }
}

fn open_target(
    table: &mut HostTable,
    ip: &str,
    port: u16,
    name: Option<&str>,
) -> Option<(String, u16)> {
    if ip.is_empty() {
        return None;
    }
    let host = table.host(ip);
    host.state = HostState::Up;
    if let Some(name) = name.map(str::trim)
        && !name.is_empty()
        && !is_ip(name)
        && !name.eq_ignore_ascii_case(ip)
    {
        host.hostname = Some(name.to_ascii_lowercase());
    }
    let key = host.ip.clone();
    let service = table.service(&key, port, Protocol::Tcp)?;
    service.state = PortState::Open;
    service.service = SERVICE.to_owned();
    Some((key, port))
}
