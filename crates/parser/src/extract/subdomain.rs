//! 서브도메인 열거 추출기 -- amass, subfinder
//!
//! 발견된 FQDN마다 호스트 하나(state unknown)를 만듭니다. amass의
//! `a_record`/`aaaa_record` 관계로 IP를 알게 되면, 그 IP를 아직 다른 이름이
//! 차지하지 않은 경우 IP를 키로 하고 FQDN을 hostname으로 둡니다.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use trawler_core::types::{ParsedScanResult, ScannerKind};

use super::HostTable;
use super::nuclei::{json_lines, json_str};
use crate::text::{compile, is_ip, strip_ansi};

static FQDN: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"^(?:[a-z0-9_](?:[a-z0-9_-]{0,61}[a-z0-9])?\.)+[a-z][a-z0-9-]{0,61}[a-z0-9]$")
});
/// `www.example.com (FQDN) --> a_record --> 93.184.216.34 (IPAddress)`
static RELATION: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^(\S+) \((\w+)\) --> (\w+) --> (\S+) \((\w+)\)"));

/// 로그 줄 접두사 (subfinder/amass 진단 출력)
const LOG_PREFIXES: &[&str] = &["[INF]", "[WRN]", "[ERR]", "[FTL]", "[DBG]"];

fn normalize_fqdn(token: &str) -> Option<String> {
    let name = token.trim().trim_end_matches('.').to_ascii_lowercase();
    FQDN.is_match(&name).then_some(name)
}

/// 발견 순서를 보존하는 FQDN -> IP 수집기
#[derive(Default)]
struct Discovery {
    names: Vec<String>,
    seen: HashSet<String>,
    addresses: HashMap<String, String>,
}

impl Discovery {
    fn name(&mut self, token: &str) {
        if let Some(name) = normalize_fqdn(token)
            && self.seen.insert(name.clone())
        {
            self.names.push(name);
        }
    }

    fn address(&mut self, token: &str, ip: &str) {
        let Some(name) = normalize_fqdn(token) else {
            return;
        };
        if !is_ip(ip) {
            return;
        }
        self.name(&name);
        self.addresses.entry(name).or_insert_with(|| ip.to_owned());
    }

    fn into_table(self) -> HostTable {
        let mut table = HostTable::new();
        let mut claimed: HashSet<&str> = HashSet::new();
        for name in &self.names {
            match self.addresses.get(name) {
                Some(ip) if claimed.insert(ip.as_str()) => {
                    table.host(ip).hostname = Some(name.clone());
                }
                _ => {
                    table.host(name);
                }
            }
        }
        table
    }
}

/// amass/subfinder 출력을 추출합니다.
pub fn parse(kind: ScannerKind, text: &str) -> ParsedScanResult {
    let clean = strip_ansi(text);
    let mut discovery = Discovery::default();

    for record in json_lines(&clean) {
        if let Some(host) = json_str(&record, "host").or_else(|| json_str(&record, "name")) {
            match json_str(&record, "ip") {
                Some(ip) => discovery.address(&host, &ip),
                None => discovery.name(&host),
            }
        }
    }

    for line in clean.lines() {
        let line = line.trim();
        if line.is_empty()
            || line.starts_with('{')
            || LOG_PREFIXES.iter().any(|p| line.starts_with(p))
        {
            continue;
        }

        if let Some(caps) = RELATION.captures(line) {
            let (src, src_kind, relation, dst, dst_kind) = (&caps[1], &caps[2], &caps[3], &caps[4], &caps[5]);
            if src_kind == "FQDN" {
                if matches!(relation, "a_record" | "aaaa_record") && dst_kind == "IPAddress" {
                    discovery.address(src, dst);
                } else {
                    discovery.name(src);
                }
            }
            if dst_kind == "FQDN" {
                discovery.name(dst);
            }
            continue;
        }

        // `host,ip` (subfinder -oI) 또는 `[source] host` (amass -src)
        if let Some((host, ip)) = line.split_once(',') {
            discovery.address(host, ip.trim());
            continue;
        }
        if let Some(token) = line.split_whitespace().last() {
            discovery.name(token);
        }
    }

    discovery.into_table().finish(kind, text)
}

#[cfg(test)]
mod tests {
    use trawler_core::types::HostState;

    use super::*;

    #[test]
    fn amass_relations_attach_ips() {
        let text = "\
www.example.com (FQDN) --> a_record --> 93.184.216.34 (IPAddress)
example.com (FQDN) --> ns_record --> ns1.example.com (FQDN)
mail.example.com (FQDN) --> a_record --> 93.184.216.34 (IPAddress)
93.184.216.0/24 (Netblock) --> contains --> 93.184.216.34 (IPAddress)
";
        let result = parse(ScannerKind::Amass, text);
        assert_eq!(result.scan_type, "subdomain-enumeration");

        let keys: Vec<&str> = result.hosts.iter().map(|h| h.ip.as_str()).collect();
        assert_eq!(
            keys,
            vec!["93.184.216.34", "example.com", "ns1.example.com", "mail.example.com"]
        );
        assert_eq!(result.hosts[0].hostname.as_deref(), Some("www.example.com"));
        assert!(result.hosts.iter().all(|h| h.state == HostState::Unknown));
        assert!(result.hosts.iter().all(|h| h.services.is_empty()));
    }

    #[test]
    fn plain_lists_and_source_prefixes() {
        let text = "\
OWASP Amass v3.23.3
[crtsh]   api.example.com
[dnsdump] Dev.Example.com.
api.example.com
1.2.3.4
";
        let result = parse(ScannerKind::Amass, text);
        let keys: Vec<&str> = result.hosts.iter().map(|h| h.ip.as_str()).collect();
        assert_eq!(keys, vec!["api.example.com", "dev.example.com"]);
    }

    #[test]
    fn subfinder_json_and_logs() {
        let text = r#"[INF] Enumerating subdomains for example.com
{"host":"a.example.com","input":"example.com","source":"crtsh"}
{"host":"b.example.com","input":"example.com","source":"alienvault","ip":"10.0.0.8"}
[INF] Found 2 subdomains for example.com in 3 seconds
"#;
        let result = parse(ScannerKind::Subfinder, text);
        assert_eq!(result.hosts.len(), 2);
        assert_eq!(result.hosts[0].ip, "a.example.com");
        assert_eq!(result.hosts[1].ip, "10.0.0.8");
        assert_eq!(result.hosts[1].hostname.as_deref(), Some("b.example.com"));
    }

    #[test]
    fn subfinder_host_ip_pairs() {
        let result = parse(ScannerKind::Subfinder, "x.example.com,10.1.1.1\ny.example.com\n");
        assert_eq!(result.hosts[0].ip, "10.1.1.1");
        assert_eq!(result.hosts[1].ip, "y.example.com");
    }

    #[test]
    fn rejects_non_hostnames() {
        assert_eq!(normalize_fqdn("localhost"), None);
        assert_eq!(normalize_fqdn("10.0.0.1"), None);
        assert_eq!(normalize_fqdn("-bad.example.com"), None);
        assert_eq!(normalize_fqdn("Good.Example.COM."), Some("good.example.com".to_owned()));
    }

    #[test]
    fn static_patterns_compile() {
        LazyLock::force(&FQDN);
        LazyLock::force(&RELATION);
    }
}
