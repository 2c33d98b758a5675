//! 웹 도구 출력 추출기
//!
//! nikto, gobuster, ffuf, feroxbuster, wfuzz, whatweb, wpscan, httpx, sqlmap.
//! 각 도구의 대상 줄(또는 URL)에서 호스트와 http/https 서비스 하나를 만들고,
//! 발견 줄은 도구 이름을 ID로 하는 스크립트 출력으로 붙입니다.

use std::sync::LazyLock;

use regex::Regex;

use trawler_core::types::{HostState, ParsedScanResult, PortState, Protocol, ScannerKind};

use super::HostTable;
use super::nuclei::{json_lines, json_str};
use crate::text::{Endpoint, compile, find_urls, is_ip, parse_endpoint, strip_ansi};

/// 대상으로 취급하지 않는 배너/홈페이지 호스트
const BANNER_HOSTS: &[&str] = &[
    "github.com",
    "sqlmap.org",
    "cirt.net",
    "wpscan.com",
    "www.wpscan.com",
    "ffuf.io",
    "projectdiscovery.io",
    "morningstarsecurity.com",
];

static WHATWEB_LINE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^(https?://\S+)\s+\[(\d{3})[^\]]*\]\s*(.*)$"));
static HTTPX_LINE: LazyLock<Regex> = LazyLock::new(|| compile(r"^(https?://\S+)(?:\s+(\[.*))?$"));
pub(crate) static FEROX_RESULT: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^\s*(\d{3})\s+(?:GET|POST|PUT|HEAD|OPTIONS|DELETE|PATCH)\s+.*?(https?://\S+)"));
pub(crate) static WFUZZ_RESULT: LazyLock<Regex> = LazyLock::new(|| compile(r"^\d{9}:\s+\d{3}\s"));
pub(crate) static WPSCAN_URL: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^\[\+\] URL:\s+(\S+)(?:\s+\[([0-9A-Fa-f.:]+)\])?"));
const SQLMAP_OS: &str = "web server operating system:";

pub(crate) static SQLMAP_TIME: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^\[\*\] (starting|ending) @ (.+?)\s*$"));

/// 도구별 누적 상태
struct WebScan {
    tool: &'static str,
    table: HostTable,
    current: Option<(String, u16)>,
    start_time: Option<String>,
    end_time: Option<String>,
}

impl WebScan {
    fn new(kind: ScannerKind) -> Self {
        Self {
            tool: kind.as_str(),
            table: HostTable::new(),
            current: None,
            start_time: None,
            end_time: None,
        }
    }

    /// 접속 지점을 반영하고 현재 대상으로 둡니다.
    ///
    /// `ip`가 있고 호스트가 이름이면 IP를 키로 쓰고 이름은 hostname이 됩니다.
    fn target(&mut self, endpoint: &Endpoint, ip: Option<&str>) -> Option<(String, u16)> {
        if BANNER_HOSTS.contains(&endpoint.host.as_str()) {
            return None;
        }
        let (key, hostname) = match ip {
            Some(ip) if is_ip(ip) && !is_ip(&endpoint.host) => (ip.to_owned(), Some(endpoint.host.clone())),
            _ => (endpoint.host.clone(), None),
        };
        let scheme = endpoint.scheme.as_deref().unwrap_or("http");
        let port = endpoint.effective_port().unwrap_or(80);

        let host = self.table.host(&key);
        host.state = HostState::Up;
        if host.hostname.is_none() {
            host.hostname = hostname;
        }
        let key = host.ip.clone();

        let service = self.table.service(&key, port, Protocol::Tcp)?;
        service.state = PortState::Open;
        if service.service == trawler_core::types::UNKNOWN_SERVICE || scheme == "https" {
            service.service = scheme.to_owned();
        }

        let target = (key, port);
        self.current = Some(target.clone());
        Some(target)
    }

    fn target_url(&mut self, url: &str, ip: Option<&str>) -> Option<(String, u16)> {
        let endpoint = parse_endpoint(url)?;
        self.target(&endpoint, ip)
    }

    /// 현재 대상이 없으면 텍스트의 첫 URL을 대상으로 둡니다.
    fn fallback_to_urls(&mut self, text: &str) {
        if self.current.is_some() || !self.table.is_empty() {
            return;
        }
        for url in find_urls(text) {
            if self.target_url(url, None).is_some() {
                return;
            }
        }
    }

    fn current_service(&mut self) -> Option<&mut trawler_core::types::ParsedService> {
        let (key, port) = self.current.clone()?;
        self.table.service(&key, port, Protocol::Tcp)
    }

    fn finding(&mut self, line: &str) {
        let Some((key, port)) = self.current.clone() else {
            return;
        };
        self.finding_at(&key, port, line);
    }

    fn finding_at(&mut self, key: &str, port: u16, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        let tool = self.tool;
        if let Some(service) = self.table.service(key, port, Protocol::Tcp) {
            service.push_script(tool, line);
        }
    }

    fn finish(self, kind: ScannerKind, raw: &str) -> ParsedScanResult {
        ParsedScanResult {
            start_time: self.start_time,
            end_time: self.end_time,
            ..self.table.finish(kind, raw)
        }
    }
}

/// 웹 도구 출력을 추출합니다.
pub fn parse(kind: ScannerKind, text: &str) -> ParsedScanResult {
    let clean = strip_ansi(text);
    let mut scan = WebScan::new(kind);

    match kind {
        ScannerKind::Nikto => parse_nikto(&mut scan, &clean),
        ScannerKind::Gobuster => parse_gobuster(&mut scan, &clean),
        ScannerKind::Ffuf => parse_ffuf(&mut scan, &clean),
        ScannerKind::Feroxbuster => parse_feroxbuster(&mut scan, &clean),
        ScannerKind::Wfuzz => parse_wfuzz(&mut scan, &clean),
        ScannerKind::Whatweb => parse_whatweb(&mut scan, &clean),
        ScannerKind::Wpscan => parse_wpscan(&mut scan, &clean),
        ScannerKind::Httpx => parse_httpx(&mut scan, &clean),
        ScannerKind::Sqlmap => parse_sqlmap(&mut scan, &clean),
        _ => {}
    }
    scan.fallback_to_urls(&clean);

    scan.finish(kind, text)
}

// ─── nikto ─────────────────────────────────────────────────────────

#[derive(Default)]
struct NiktoTarget {
    ip: Option<String>,
    hostname: Option<String>,
}

fn parse_nikto(scan: &mut WebScan, text: &str) {
    let mut pending = NiktoTarget::default();

    for line in text.lines() {
        let Some(body) = line.strip_prefix("+ ") else {
            continue;
        };
        let field = |name: &str| {
            body.strip_prefix(name)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        if let Some(ip) = field("Target IP:") {
            pending = NiktoTarget {
                ip: Some(ip),
                hostname: None,
            };
            scan.current = None;
        } else if let Some(hostname) = field("Target Hostname:") {
            pending.hostname = Some(hostname);
        } else if let Some(port) = field("Target Port:") {
            let host = pending.hostname.as_deref().or(pending.ip.as_deref());
            let Some(host) = host else {
                continue;
            };
            let Ok(port) = port.parse::<u16>() else {
                continue;
            };
            let scheme = if port == 443 { "https" } else { "http" };
            let endpoint = Endpoint {
                scheme: Some(scheme.to_owned()),
                host: host.to_ascii_lowercase(),
                port: Some(port),
            };
            scan.target(&endpoint, pending.ip.as_deref());
        } else if body.starts_with("SSL Info:") {
            if let Some(service) = scan.current_service() {
                service.service = "https".to_owned();
            }
        } else if let Some(time) = field("Start Time:") {
            scan.start_time.get_or_insert(time);
        } else if let Some(time) = field("End Time:") {
            scan.end_time = Some(time);
        } else if let Some(server) = field("Server:") {
            if let Some(service) = scan.current_service() {
                // `Apache/2.4.41 (Ubuntu)` -> Apache, 2.4.41, (Ubuntu)
                let (head, extra) = match server.split_once(' ') {
                    Some((head, extra)) => (head, Some(extra.trim().to_owned())),
                    None => (server.as_str(), None),
                };
                let (product, version) = match head.split_once('/') {
                    Some((product, version)) => (product, Some(version.to_owned())),
                    None => (head, None),
                };
                service.product = Some(product.to_owned());
                service.version = version.filter(|v| !v.is_empty());
                service.extra_info = extra.filter(|e| !e.is_empty());
            }
        } else if is_nikto_finding(body) {
            scan.finding(body);
        }
    }

    // 포트 줄 전에 잘린 경우 호스트만 남깁니다
    if scan.table.is_empty() {
        if let Some(ip) = pending.ip {
            let host = scan.table.host(&ip);
            host.state = HostState::Up;
            host.hostname = pending.hostname;
        }
    }
}

fn is_nikto_finding(body: &str) -> bool {
    body.starts_with('/')
        || body.starts_with('[')
        || body.starts_with("OSVDB-")
        || body.starts_with("Retrieved ")
        || body.starts_with("The ")
        || body.starts_with("Uncommon header")
}

// ─── content discovery ─────────────────────────────────────────────

fn parse_gobuster(scan: &mut WebScan, text: &str) {
    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(url) = trimmed.strip_prefix("[+] Url:") {
            scan.target_url(url.trim(), None);
        } else if trimmed.contains("(Status:") {
            scan.finding(trimmed);
        }
    }
}

fn parse_ffuf(scan: &mut WebScan, text: &str) {
    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix(":: URL") {
            let url = rest.trim_start().trim_start_matches(':').trim();
            scan.target_url(url, None);
        } else if trimmed.contains("[Status:") {
            scan.finding(trimmed);
        }
    }

    // `-of json` 결과
    for record in json_lines(text) {
        let Some(results) = record.get("results").and_then(|r| r.as_array()) else {
            continue;
        };
        for result in results {
            let Some(url) = json_str(result, "url") else {
                continue;
            };
            if let Some((key, port)) = scan.target_url(&url, None) {
                let status = json_str(result, "status").unwrap_or_default();
                scan.finding_at(&key, port, &format!("{url} [Status: {status}]"));
            }
        }
    }
}

fn parse_feroxbuster(scan: &mut WebScan, text: &str) {
    for line in text.lines() {
        if line.contains("Target Url") {
            if let Some(url) = find_urls(line).next() {
                scan.target_url(url, None);
            }
        } else if let Some(caps) = FEROX_RESULT.captures(line) {
            if let Some((key, port)) = scan.target_url(&caps[2], None) {
                scan.finding_at(&key, port, line);
            }
        }
    }
}

fn parse_wfuzz(scan: &mut WebScan, text: &str) {
    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(url) = trimmed.strip_prefix("Target:") {
            scan.target_url(url.trim(), None);
        } else if WFUZZ_RESULT.is_match(trimmed) {
            scan.finding(trimmed);
        }
    }
}

// ─── fingerprinting ────────────────────────────────────────────────

fn parse_whatweb(scan: &mut WebScan, text: &str) {
    for line in text.lines() {
        let Some(caps) = WHATWEB_LINE.captures(line.trim()) else {
            continue;
        };
        if let Some((key, port)) = scan.target_url(&caps[1], None) {
            let status = &caps[2];
            let rest = caps[3].trim();
            scan.finding_at(&key, port, &format!("[{status}] {rest}"));
        }
    }
}

fn parse_httpx(scan: &mut WebScan, text: &str) {
    let mut saw_json = false;
    for record in json_lines(text) {
        saw_json = true;
        let Some(url) = json_str(&record, "url") else {
            continue;
        };
        let ip = json_str(&record, "host").filter(|h| is_ip(h));
        if let Some((key, port)) = scan.target_url(&url, ip.as_deref()) {
            let status = json_str(&record, "status_code").or_else(|| json_str(&record, "status-code"));
            let title = json_str(&record, "title");
            let summary = [status.as_deref(), title.as_deref()]
                .into_iter()
                .flatten()
                .map(|part| format!("[{part}]"))
                .collect::<Vec<_>>()
                .join(" ");
            scan.finding_at(&key, port, &format!("{url} {summary}"));
        }
    }
    if saw_json {
        return;
    }

    for line in text.lines() {
        let Some(caps) = HTTPX_LINE.captures(line.trim()) else {
            continue;
        };
        let Some((key, port)) = scan.target_url(&caps[1], None) else {
            continue;
        };
        if let Some(rest) = caps.get(2) {
            scan.finding_at(&key, port, rest.as_str());
        }
    }
}

fn parse_wpscan(scan: &mut WebScan, text: &str) {
    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(caps) = WPSCAN_URL.captures(trimmed) {
            let ip = caps.get(2).map(|m| m.as_str());
            scan.target_url(&caps[1], ip);
        } else if let Some(time) = trimmed.strip_prefix("[+] Started:") {
            scan.start_time = Some(time.trim().to_owned());
        } else if let Some(time) = trimmed.strip_prefix("[+] Finished:") {
            scan.end_time = Some(time.trim().to_owned());
        } else if trimmed.starts_with("[+]") || trimmed.starts_with("[!]") {
            scan.finding(trimmed);
        }
    }
}

// ─── sqlmap ────────────────────────────────────────────────────────

fn parse_sqlmap(scan: &mut WebScan, text: &str) {
    // 주입 지점 요약이 대상 URL보다 먼저 나올 수 있어 끝에서 붙입니다
    let mut findings: Vec<&str> = Vec::new();
    let mut os: Option<String> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(caps) = SQLMAP_TIME.captures(trimmed) {
            let time = caps[2].to_owned();
            if &caps[1] == "starting" {
                scan.start_time.get_or_insert(time);
            } else {
                scan.end_time = Some(time);
            }
            continue;
        }

        if scan.current.is_none() {
            for url in find_urls(trimmed) {
                if scan.target_url(url, None).is_some() {
                    break;
                }
            }
        }

        let lower = trimmed.to_ascii_lowercase();
        if let Some(idx) = lower.find(SQLMAP_OS) {
            let value = trimmed[idx + SQLMAP_OS.len()..].trim();
            if !value.is_empty() {
                os = Some(value.to_owned());
            }
        } else if trimmed.starts_with("Parameter:")
            || trimmed.starts_with("Type:")
            || trimmed.starts_with("Title:")
            || trimmed.starts_with("Payload:")
            || lower.contains("back-end dbms:")
            || lower.contains("is vulnerable")
        {
            findings.push(trimmed);
        }
    }

    let Some((key, _)) = scan.current.clone() else {
        return;
    };
    if os.is_some() {
        scan.table.host(&key).os = os;
    }
    for finding in findings {
        scan.finding(finding);
    }
}
