//! nmap 출력 추출기 -- XML(`-oX`), 일반 텍스트(`-oN`), greppable(`-oG`)
//!
//! XML은 별도 파서 없이 `<host>...</host>` 블록 단위로 걷습니다. 잘린 문서는
//! 완성된 블록까지만 반영됩니다.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use trawler_core::types::{HostState, ParsedScanResult, PortState, Protocol, ScannerKind};

use super::HostTable;
use crate::text::{compile, split_product_version};

// ─── 일반 텍스트 (-oN) ──────────────────────────────────────────────

static REPORT_LINE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^Nmap scan report for (\S+)(?:\s+\(([^)]+)\))?"));
static PORT_LINE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^(\d{1,6})/(tcp|udp)\s+(\S+)\s+(\S+)(?:\s+(.*))?$"));
static SCRIPT_HEAD: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^\|_?\s?([A-Za-z0-9][A-Za-z0-9_.-]*):\s?(.*)$"));
static STARTING: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^Starting Nmap .*? at (.+)$"));

/// OS 정보 출처 우선순위 (높을수록 신뢰)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum OsSource {
    ServiceInfo,
    Running,
    Details,
}

/// nmap 일반 텍스트 출력을 추출합니다.
pub fn parse_text(text: &str) -> ParsedScanResult {
    let mut table = HostTable::new();
    let mut start_time = None;
    let mut os_source: HashMap<String, OsSource> = HashMap::new();

    let mut cursor: Option<String> = None;
    // 마지막 서비스 (port, proto)와 마지막 스크립트 id
    let mut last_service: Option<(u16, Protocol)> = None;
    let mut last_script: Option<String> = None;
    let mut in_host_scripts = false;

    for raw_line in text.lines() {
        let line = raw_line.trim_end();

        if let Some(caps) = STARTING.captures(line) {
            start_time = Some(caps[1].trim().to_owned());
            continue;
        }

        if let Some(caps) = REPORT_LINE.captures(line) {
            let first = caps[1].to_owned();
            let (key, hostname) = match caps.get(2) {
                Some(ip) => (ip.as_str().to_owned(), Some(first)),
                None => (first, None),
            };
            let host = table.host(&key);
            if hostname.is_some() {
                host.hostname = hostname;
            }
            cursor = Some(host.ip.clone());
            last_service = None;
            last_script = None;
            in_host_scripts = false;
            continue;
        }

        let Some(key) = cursor.as_deref() else {
            continue;
        };

        if line.starts_with("Host is up") {
            table.host(key).state = HostState::Up;
            continue;
        }
        if line.contains("Host seems down") {
            table.host(key).state = HostState::Down;
            continue;
        }
        if line.starts_with("Host script results:") {
            in_host_scripts = true;
            last_service = None;
            last_script = None;
            continue;
        }

        if let Some(caps) = PORT_LINE.captures(line) {
            in_host_scripts = false;
            last_script = None;
            let Ok(port) = caps[1].parse::<u32>() else {
                continue;
            };
            let Some(protocol) = Protocol::from_str_loose(&caps[2]) else {
                continue;
            };
            let Ok(port) = u16::try_from(port) else {
                continue;
            };
            let state = PortState::from_str_loose(&caps[3]);
            let name = caps[4].to_owned();
            let rest = caps.get(5).map(|m| m.as_str()).unwrap_or_default();
            let (product, version, extra) = split_product_version(rest);

            if let Some(service) = table.service(key, port, protocol) {
                service.state = state;
                if name != "unknown" {
                    service.service = name.trim_end_matches('?').to_owned();
                }
                service.product = product;
                service.version = version;
                service.extra_info = extra;
                last_service = Some((port, protocol));
            }
            continue;
        }

        if line.starts_with('|') {
            if in_host_scripts {
                continue;
            }
            let Some((port, protocol)) = last_service else {
                continue;
            };
            let Some(service) = table.host(key).find_service_mut(port, protocol) else {
                continue;
            };
            // `| id: value`는 새 스크립트, `|   ...`는 이전 스크립트의 이어지는 줄
            let is_head = line.starts_with("|_") || !line.starts_with("|  ");
            match SCRIPT_HEAD.captures(line) {
                Some(caps) if is_head => {
                    let id = caps[1].to_owned();
                    service.push_script(&id, caps[2].trim());
                    last_script = Some(id);
                }
                _ => {
                    if let Some(id) = last_script.as_deref() {
                        let body = line.trim_start_matches(['|', '_']).trim();
                        if !body.is_empty() {
                            service.push_script(id, body);
                        }
                    }
                }
            }
            continue;
        }

        let os_line = if let Some(os) = line.strip_prefix("OS details:") {
            Some((OsSource::Details, os.trim()))
        } else if let Some(os) = line.strip_prefix("Running:") {
            Some((OsSource::Running, os.trim()))
        } else if let Some(info) = line.strip_prefix("Service Info:") {
            info.split(';')
                .find_map(|part| part.trim().strip_prefix("OS:"))
                .map(|os| (OsSource::ServiceInfo, os.trim()))
        } else {
            None
        };

        if let Some((source, os)) = os_line {
            if os.is_empty() {
                continue;
            }
            let better = os_source.get(key).is_none_or(|current| source > *current);
            if better {
                table.host(key).os = Some(os.to_owned());
                os_source.insert(key.to_owned(), source);
            }
        }
    }

    ParsedScanResult {
        start_time,
        ..table.finish(ScannerKind::NmapText, text)
    }
}

// ─── XML (-oX) ─────────────────────────────────────────────────────

static HOST_BLOCK: LazyLock<Regex> = LazyLock::new(|| compile(r"(?s)<host[\s>].*?</host>"));
static PORT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?s)<port\s[^>]*?(?:/>|>.*?</port>)"));
static ATTR: LazyLock<Regex> = LazyLock::new(|| compile(r#"([A-Za-z_:][A-Za-z0-9_.:-]*)\s*=\s*"([^"]*)""#));

/// XML 엔티티를 디코딩합니다.
fn decode_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_owned();
    }
    value
        .replace("&#xa;", "\n")
        .replace("&#xA;", "\n")
        .replace("&#10;", "\n")
        .replace("&#x9;", "\t")
        .replace("&#9;", "\t")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// `<name ...>` 여는 태그들의 속성 텍스트를 순서대로 반환합니다.
fn tags<'a>(block: &'a str, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    let open = format!("<{name}");
    let mut rest = block;
    std::iter::from_fn(move || {
        loop {
            let start = rest.find(&open)?;
            let after = &rest[start + open.len()..];
            // `<host`가 `<hostname`에 맞지 않도록 다음 문자 검사
            let boundary = after
                .chars()
                .next()
                .is_some_and(|c| c.is_whitespace() || c == '>' || c == '/');
            if !boundary {
                rest = after;
                continue;
            }
            let end = after.find('>')?;
            let tag = &after[..end];
            rest = &after[end..];
            return Some(tag);
        }
    })
}

fn attrs(tag: &str) -> HashMap<&str, String> {
    ATTR.captures_iter(tag)
        .filter_map(|caps| {
            let key = caps.get(1)?.as_str();
            let value = caps.get(2)?.as_str();
            Some((key, decode_entities(value)))
        })
        .collect()
}

fn first_attrs<'a>(block: &'a str, name: &'a str) -> Option<HashMap<&'a str, String>> {
    tags(block, name).next().map(attrs)
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// nmap XML 출력을 추출합니다.
pub fn parse_xml(text: &str) -> ParsedScanResult {
    let mut table = HostTable::new();

    let run = first_attrs(text, "nmaprun");
    let start_time = run
        .as_ref()
        .and_then(|a| non_empty(a.get("startstr")).or_else(|| non_empty(a.get("start"))));
    let end_time = first_attrs(text, "finished")
        .and_then(|a| non_empty(a.get("timestr")).or_else(|| non_empty(a.get("time"))));

    for block in HOST_BLOCK.find_iter(text) {
        let block = block.as_str();

        let mut ipv4 = None;
        let mut ipv6 = None;
        for address in tags(block, "address").map(attrs) {
            match address.get("addrtype").map(String::as_str) {
                Some("ipv4") => ipv4 = ipv4.or_else(|| non_empty(address.get("addr"))),
                Some("ipv6") => ipv6 = ipv6.or_else(|| non_empty(address.get("addr"))),
                _ => {}
            }
        }
        let hostname = first_attrs(block, "hostname").and_then(|a| non_empty(a.get("name")));

        let Some(key) = ipv4.or(ipv6).or_else(|| hostname.clone()) else {
            continue;
        };

        let state = first_attrs(block, "status")
            .and_then(|a| a.get("state").map(|s| HostState::from_str_loose(s)))
            .unwrap_or(HostState::Unknown);
        let os = first_attrs(block, "osmatch").and_then(|a| non_empty(a.get("name")));

        {
            let host = table.host(&key);
            host.state = state;
            if hostname.as_deref().is_some_and(|h| !h.eq_ignore_ascii_case(&key)) {
                host.hostname = hostname;
            }
            if os.is_some() {
                host.os = os;
            }
        }

        for port_block in PORT_BLOCK.find_iter(block) {
            let port_block = port_block.as_str();
            let Some(port_attrs) = first_attrs(port_block, "port") else {
                continue;
            };
            let Some(protocol) = port_attrs
                .get("protocol")
                .and_then(|p| Protocol::from_str_loose(p))
            else {
                continue;
            };
            let Some(port) = port_attrs
                .get("portid")
                .and_then(|p| p.parse::<u32>().ok())
                .and_then(|p| u16::try_from(p).ok())
            else {
                continue;
            };

            let state = first_attrs(port_block, "state")
                .and_then(|a| a.get("state").map(|s| PortState::from_str_loose(s)))
                .unwrap_or_default();
            let service_attrs = first_attrs(port_block, "service");
            let scripts: Vec<(String, String)> = tags(port_block, "script")
                .map(attrs)
                .filter_map(|a| {
                    let id = non_empty(a.get("id"))?;
                    let output = a.get("output").map(|o| o.trim().to_owned()).unwrap_or_default();
                    Some((id, output))
                })
                .collect();

            let Some(service) = table.service(&key, port, protocol) else {
                continue;
            };
            service.state = state;
            if let Some(svc) = service_attrs {
                if let Some(name) = non_empty(svc.get("name")) {
                    service.service = name;
                }
                service.product = non_empty(svc.get("product"));
                service.version = non_empty(svc.get("version"));
                service.extra_info = non_empty(svc.get("extrainfo"));
            }
            for (id, output) in &scripts {
                service.push_script(id, output);
            }
        }
    }

    ParsedScanResult {
        start_time,
        end_time,
        ..table.finish(ScannerKind::NmapXml, text)
    }
}

// ─── Greppable (-oG) ───────────────────────────────────────────────

static GREP_HOST: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^Host:\s+(\S+)\s+\(([^)]*)\)"));
static GREP_HEADER: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^# Nmap .*? scan initiated (.+?) as:"));
static GREP_DONE: LazyLock<Regex> = LazyLock::new(|| compile(r"^# Nmap done at (.+?) --"));

/// nmap greppable 출력을 추출합니다.
pub fn parse_greppable(text: &str) -> ParsedScanResult {
    let mut table = HostTable::new();
    let mut start_time = None;
    let mut end_time = None;

    for line in text.lines() {
        if let Some(caps) = GREP_HEADER.captures(line) {
            start_time = Some(caps[1].trim().to_owned());
            continue;
        }
        if let Some(caps) = GREP_DONE.captures(line) {
            end_time = Some(caps[1].trim().to_owned());
            continue;
        }
        let Some(caps) = GREP_HOST.captures(line) else {
            continue;
        };
        let key = caps[1].to_owned();
        let name = caps[2].trim().to_owned();

        {
            let host = table.host(&key);
            if !name.is_empty() {
                host.hostname = Some(name);
            }
        }

        for field in line.split('\t').skip(1) {
            let field = field.trim();
            if let Some(status) = field.strip_prefix("Status:") {
                table.host(&key).state = HostState::from_str_loose(status.trim());
            } else if let Some(ports) = field.strip_prefix("Ports:") {
                for entry in ports.split(',') {
                    add_greppable_port(&mut table, &key, entry.trim());
                }
            } else if let Some(os) = field.strip_prefix("OS:") {
                let os = os.trim();
                if !os.is_empty() {
                    table.host(&key).os = Some(os.to_owned());
                }
            }
        }
    }

    ParsedScanResult {
        start_time,
        end_time,
        ..table.finish(ScannerKind::NmapGreppable, text)
    }
}

/// `22/open/tcp//ssh//OpenSSH 8.9/` 항목 하나를 반영합니다.
fn add_greppable_port(table: &mut HostTable, key: &str, entry: &str) {
    let parts: Vec<&str> = entry.split('/').collect();
    if parts.len() < 3 {
        return;
    }
    let Some(port) = parts[0]
        .trim()
        .parse::<u32>()
        .ok()
        .and_then(|p| u16::try_from(p).ok())
    else {
        return;
    };
    let Some(protocol) = Protocol::from_str_loose(parts[2]) else {
        return;
    };
    let state = PortState::from_str_loose(parts[1]);
    let name = parts.get(4).map(|s| s.trim()).unwrap_or_default();
    let version = parts.get(6).map(|s| s.trim()).unwrap_or_default();

    let Some(service) = table.service(key, port, protocol) else {
        return;
    };
    service.state = state;
    if !name.is_empty() && name != "unknown" {
        service.service = name.trim_end_matches('?').to_owned();
    }
    let (product, version, extra) = split_product_version(version);
    service.product = product;
    service.version = version;
    service.extra_info = extra;
}
