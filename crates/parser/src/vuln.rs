//! 취약점 추출 -- nuclei(JSONL/텍스트), nikto
//!
//! 취약점을 보고하지 않는 형식은 빈 목록을 반환합니다. 같은 입력 안의 중복도
//! 그대로 반환하며, 중복 병합은 조정 단계가 `(template_id, matched_at)` 키로 처리합니다.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use trawler_core::types::{ParsedVulnerability, ScannerKind, Severity};

use crate::extract::nuclei::{TEXT_LINE, json_lines, json_str};
use crate::text::{Endpoint, compile, extract_cves, find_urls, is_ip, parse_endpoint, stable_hash, strip_ansi};

/// 형식에 맞는 취약점 추출기로 디스패치합니다.
pub fn extract_vulnerabilities(kind: ScannerKind, text: &str) -> Vec<ParsedVulnerability> {
    let found = match kind {
        ScannerKind::Nuclei => nuclei(text),
        ScannerKind::Nikto => nikto(text),
        _ => Vec::new(),
    };
    debug!(scanner = kind.as_str(), count = found.len(), "vulnerabilities extracted");
    found
}

// ─── nuclei ────────────────────────────────────────────────────────

fn nuclei(text: &str) -> Vec<ParsedVulnerability> {
    let mut out = Vec::new();
    let mut saw_json = false;

    for record in json_lines(text) {
        saw_json = true;
        if let Some(vuln) = nuclei_record(&record) {
            out.push(vuln);
        }
    }
    if saw_json {
        return out;
    }

    let clean = strip_ansi(text);
    for line in clean.lines() {
        if let Some(vuln) = nuclei_line(line) {
            out.push(vuln);
        }
    }
    out
}

/// 문자열 또는 문자열 배열 필드를 펼칩니다.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect(),
        _ => Vec::new(),
    }
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn nuclei_record(record: &Value) -> Option<ParsedVulnerability> {
    let template_id = json_str(record, "template-id")?.into_owned();
    let info = record.get("info");
    let classification = info.and_then(|i| i.get("classification"));

    let name = non_empty(info.and_then(|i| i.get("name"))).unwrap_or_else(|| template_id.clone());
    let severity = info
        .and_then(|i| i.get("severity"))
        .and_then(Value::as_str)
        .and_then(Severity::from_str_loose)
        .unwrap_or_default();

    let host_field = json_str(record, "host");
    let matched_at = json_str(record, "matched-at")
        .or_else(|| host_field.clone())
        .map(|m| m.into_owned())
        .unwrap_or_default();

    let mut vuln = ParsedVulnerability::new(ScannerKind::Nuclei, &template_id, &matched_at, name, severity);

    let cves = string_list(classification.and_then(|c| c.get("cve-id")));
    vuln.cve = cves
        .first()
        .map(|c| c.to_uppercase())
        .or_else(|| extract_cves(&template_id).into_iter().next());
    vuln.cwe = string_list(classification.and_then(|c| c.get("cwe-id")))
        .into_iter()
        .next()
        .map(|c| c.to_uppercase());
    vuln.cvss = classification
        .and_then(|c| c.get("cvss-score"))
        .and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
        .map(|score| score as f32);
    vuln.description = non_empty(info.and_then(|i| i.get("description")));
    vuln.solution = non_empty(info.and_then(|i| i.get("remediation")));
    vuln.references = string_list(info.and_then(|i| i.get("reference")));

    // 호스트: IP가 있으면 IP, 없으면 matched-at/host의 호스트 부분
    let endpoint = parse_endpoint(&matched_at)
        .or_else(|| host_field.as_deref().and_then(parse_endpoint));
    let ip = json_str(record, "ip").filter(|ip| is_ip(ip));
    vuln.host = ip
        .map(|ip| ip.into_owned())
        .or_else(|| endpoint.as_ref().map(|e| e.host.clone()));
    vuln.port = json_str(record, "port")
        .and_then(|p| p.parse::<u16>().ok())
        .filter(|p| *p != 0)
        .or_else(|| endpoint.as_ref().and_then(Endpoint::effective_port));

    let extracted = string_list(record.get("extracted-results"));
    vuln.proof = if extracted.is_empty() {
        non_empty(record.get("curl-command"))
    } else {
        Some(extracted.join(", "))
    };

    Some(vuln)
}

fn nuclei_line(line: &str) -> Option<ParsedVulnerability> {
    let caps = TEXT_LINE.captures(line)?;
    let bracket = &caps[1];
    // `[template:matcher]`
    let (template_id, matcher) = match bracket.split_once(':') {
        Some((id, matcher)) => (id, Some(matcher)),
        None => (bracket, None),
    };
    if template_id.is_empty() {
        return None;
    }
    let severity = Severity::from_str_loose(&caps[3]).unwrap_or_default();
    let target = &caps[4];
    let extra = caps.get(5).map(|m| m.as_str().trim()).unwrap_or_default();

    let mut vuln = ParsedVulnerability::new(ScannerKind::Nuclei, template_id, target, template_id, severity);
    vuln.cve = extract_cves(template_id)
        .into_iter()
        .next()
        .or_else(|| extract_cves(line).into_iter().next());
    if let Some(endpoint) = parse_endpoint(target) {
        vuln.port = endpoint.effective_port();
        vuln.host = Some(endpoint.host);
    }
    let proof = match (matcher, extra.is_empty()) {
        (Some(m), false) => Some(format!("matcher: {m} {extra}")),
        (Some(m), true) => Some(format!("matcher: {m}")),
        (None, false) => Some(extra.to_owned()),
        (None, true) => None,
    };
    vuln.proof = proof;
    Some(vuln)
}

// ─── nikto ─────────────────────────────────────────────────────────

/// `+ [ID] /path: msg`, `+ OSVDB-N: /path: msg`, `+ /path: msg`
static NIKTO_FINDING: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^\+ (?:\[(\d+)\] |(OSVDB-\d+): )?(/\S*?):\s+(.+?)\s*$"));
static OSVDB: LazyLock<Regex> = LazyLock::new(|| compile(r"\bOSVDB-\d+\b"));

fn nikto(text: &str) -> Vec<ParsedVulnerability> {
    let clean = strip_ansi(text);
    let mut out = Vec::new();

    let mut ip: Option<String> = None;
    let mut hostname: Option<String> = None;
    let mut base: Option<Endpoint> = None;

    for line in clean.lines() {
        let line = line.trim_end();
        if let Some(v) = line.strip_prefix("+ Target IP:") {
            ip = Some(v.trim().to_owned());
            hostname = None;
            base = None;
            continue;
        }
        if let Some(v) = line.strip_prefix("+ Target Hostname:") {
            hostname = Some(v.trim().to_ascii_lowercase());
            continue;
        }
        if let Some(v) = line.strip_prefix("+ Target Port:") {
            let port = v.trim().parse::<u16>().ok();
            let host = hostname.clone().or_else(|| ip.clone());
            base = host.map(|host| Endpoint {
                scheme: Some(if port == Some(443) { "https" } else { "http" }.to_owned()),
                host,
                port,
            });
            continue;
        }
        if line.starts_with("+ SSL Info:") {
            if let Some(base) = base.as_mut() {
                base.scheme = Some("https".to_owned());
            }
            continue;
        }

        let Some(caps) = NIKTO_FINDING.captures(line) else {
            continue;
        };
        let path = &caps[3];
        let message = caps[4].to_owned();

        let id = caps
            .get(1)
            .map(|m| m.as_str().to_owned())
            .or_else(|| caps.get(2).map(|m| m.as_str().to_ascii_lowercase()))
            .unwrap_or_else(|| format!("{:016x}", stable_hash(&message)));
        let template_id = format!("nikto-{id}");

        let matched_at = match &base {
            Some(base) => format!("{}{path}", base.base_url()),
            None => path.to_owned(),
        };

        let cves = extract_cves(line);
        let referenced = !cves.is_empty() || OSVDB.is_match(line);
        let severity = if referenced { Severity::Medium } else { Severity::Info };

        let mut vuln = ParsedVulnerability::new(
            ScannerKind::Nikto,
            template_id,
            matched_at,
            message.clone(),
            severity,
        );
        vuln.cve = cves.into_iter().next();
        vuln.description = Some(message.clone());
        vuln.references = find_urls(&message).map(str::to_owned).collect();
        vuln.host = ip.clone().or_else(|| base.as_ref().map(|b| b.host.clone()));
        vuln.port = base.as_ref().and_then(Endpoint::effective_port);
        out.push(vuln);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nuclei_json_full_record() {
        let text = r#"{"template-id":"CVE-2021-44228","info":{"name":"Apache Log4j RCE","severity":"critical","description":"JNDI lookup RCE","remediation":"Upgrade to 2.17.1","reference":["https://logging.apache.org/log4j/2.x/security.html"],"classification":{"cve-id":["cve-2021-44228"],"cwe-id":["cwe-502"],"cvss-score":10.0}},"type":"http","host":"https://app.local","matched-at":"https://app.local/api","ip":"10.0.0.5","port":"443","extracted-results":["jndi:ldap"],"curl-command":"curl -X GET https://app.local/api"}"#;
        let vulns = extract_vulnerabilities(ScannerKind::Nuclei, text);
        assert_eq!(vulns.len(), 1);
        let v = &vulns[0];
        assert_eq!(v.template_id, "CVE-2021-44228");
        assert_eq!(v.name, "Apache Log4j RCE");
        assert_eq!(v.severity, Severity::Critical);
        assert_eq!(v.cve.as_deref(), Some("CVE-2021-44228"));
        assert_eq!(v.cwe.as_deref(), Some("CWE-502"));
        assert_eq!(v.cvss, Some(10.0));
        assert_eq!(v.host.as_deref(), Some("10.0.0.5"));
        assert_eq!(v.port, Some(443));
        assert_eq!(v.matched_at, "https://app.local/api");
        assert_eq!(v.solution.as_deref(), Some("Upgrade to 2.17.1"));
        assert_eq!(v.references.len(), 1);
        assert_eq!(v.proof.as_deref(), Some("jndi:ldap"));
    }

    #[test]
    fn nuclei_json_string_cve_and_minimal_fields() {
        let text = r#"{"template-id":"exposed-git","info":{"severity":"medium","classification":{"cve-id":"CVE-2020-1234","cvss-score":"5.3"}},"matched-at":"http://10.0.0.1:8080/.git/config"}
not json
{"no-template":true}"#;
        let vulns = extract_vulnerabilities(ScannerKind::Nuclei, text);
        assert_eq!(vulns.len(), 1);
        let v = &vulns[0];
        assert_eq!(v.name, "exposed-git");
        assert_eq!(v.cve.as_deref(), Some("CVE-2020-1234"));
        assert_eq!(v.cvss, Some(5.3));
        assert_eq!(v.host.as_deref(), Some("10.0.0.1"));
        assert_eq!(v.port, Some(8080));
        assert_eq!(v.proof, None);
    }

    #[test]
    fn nuclei_text_lines() {
        let text = "\
[2024-03-01 10:00:00] [CVE-2021-41773] [http] [high] http://10.0.0.5/cgi-bin/.%2e/etc/passwd
[tech-detect:nginx] [http] [info] https://app.local
[INF] Using Nuclei Engine 3.1.0
";
        let vulns = extract_vulnerabilities(ScannerKind::Nuclei, text);
        assert_eq!(vulns.len(), 2);

        assert_eq!(vulns[0].template_id, "CVE-2021-41773");
        assert_eq!(vulns[0].cve.as_deref(), Some("CVE-2021-41773"));
        assert_eq!(vulns[0].severity, Severity::High);
        assert_eq!(vulns[0].port, Some(80));

        assert_eq!(vulns[1].template_id, "tech-detect");
        assert_eq!(vulns[1].name, "tech-detect");
        assert_eq!(vulns[1].proof.as_deref(), Some("matcher: nginx"));
        assert_eq!(vulns[1].host.as_deref(), Some("app.local"));
        assert_eq!(vulns[1].port, Some(443));
    }

    const NIKTO: &str = "\
- Nikto v2.5.0
+ Target IP:          10.0.0.5
+ Target Hostname:    web01.local
+ Target Port:        8443
+ SSL Info:        Subject:  /CN=web01.local
+ /: The anti-clickjacking X-Frame-Options header is not present. See: https://developer.mozilla.org/en-US/docs/Web/HTTP/Headers/X-Frame-Options
+ [999986] /admin/: Admin login page/section found.
+ OSVDB-3092: /backup/: This might be interesting.
+ /cgi-bin/test.cgi: Site appears vulnerable to the 'shellshock' vulnerability. See: CVE-2014-6271
+ 8102 requests: 0 error(s) and 4 item(s) reported on remote host
";

    #[test]
    fn nikto_findings() {
        let vulns = extract_vulnerabilities(ScannerKind::Nikto, NIKTO);
        assert_eq!(vulns.len(), 4);

        let header = &vulns[0];
        assert!(header.template_id.starts_with("nikto-"));
        assert_eq!(header.template_id.len(), "nikto-".len() + 16);
        assert_eq!(header.matched_at, "https://web01.local:8443/");
        assert_eq!(header.severity, Severity::Info);
        assert_eq!(header.host.as_deref(), Some("10.0.0.5"));
        assert_eq!(header.port, Some(8443));
        assert_eq!(header.references.len(), 1);

        assert_eq!(vulns[1].template_id, "nikto-999986");
        assert_eq!(vulns[1].matched_at, "https://web01.local:8443/admin/");

        assert_eq!(vulns[2].template_id, "nikto-osvdb-3092");
        assert_eq!(vulns[2].severity, Severity::Medium);

        assert_eq!(vulns[3].cve.as_deref(), Some("CVE-2014-6271"));
        assert_eq!(vulns[3].severity, Severity::Medium);
    }

    #[test]
    fn nikto_template_ids_are_stable() {
        let a = extract_vulnerabilities(ScannerKind::Nikto, NIKTO);
        let b = extract_vulnerabilities(ScannerKind::Nikto, NIKTO);
        let ids_a: Vec<_> = a.iter().map(|v| v.dedup_key()).collect();
        let ids_b: Vec<_> = b.iter().map(|v| v.dedup_key()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn other_formats_yield_nothing() {
        for kind in ScannerKind::ALL {
            if kind.yields_vulnerabilities() {
                continue;
            }
            assert!(extract_vulnerabilities(kind, NIKTO).is_empty());
        }
    }

    #[test]
    fn static_patterns_compile() {
        LazyLock::force(&NIKTO_FINDING);
        LazyLock::force(&OSVDB);
    }
}
