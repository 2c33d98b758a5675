//! hydra 출력 추출기
//!
//! `[PORT][SERVICE] host: H   login: L   password: P` 줄마다 서비스 하나를 만들고,
//! 자격 증명은 `hydra` 스크립트 출력으로 남깁니다.

use std::sync::LazyLock;

use regex::Regex;

use trawler_core::types::{HostState, ParsedScanResult, PortState, Protocol, ScannerKind};

use super::HostTable;
use crate::text::{compile, strip_ansi};

pub(crate) static HIT: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"^\[(\d{1,6})\]\[([^\]]+)\]\s+host:\s+(\S+)(?:\s+login:\s+(\S*))?(?:\s+password:\s+(.*?))?\s*$",
    )
});
static STARTED: LazyLock<Regex> = LazyLock::new(|| compile(r"starting at (.+?)\s*$"));
static FINISHED: LazyLock<Regex> = LazyLock::new(|| compile(r"finished at (.+?)\s*$"));

/// UDP로 동작하는 hydra 모듈
const UDP_MODULES: &[&str] = &["snmp", "sip", "tftp"];

/// hydra 출력을 추출합니다.
pub fn parse(text: &str) -> ParsedScanResult {
    let clean = strip_ansi(text);
    let mut table = HostTable::new();
    let mut start_time = None;
    let mut end_time = None;

    for line in clean.lines() {
        let line = line.trim();
        if line.starts_with("Hydra") {
            if let Some(caps) = STARTED.captures(line) {
                start_time = Some(caps[1].to_owned());
            } else if let Some(caps) = FINISHED.captures(line) {
                end_time = Some(caps[1].to_owned());
            }
            continue;
        }

        let Some(caps) = HIT.captures(line) else {
            continue;
        };
        let Some(port) = caps[1].parse::<u32>().ok().and_then(|p| u16::try_from(p).ok()) else {
            continue;
        };
        let module = caps[2].to_ascii_lowercase();
        let key = &caps[3];
        let protocol = if UDP_MODULES.contains(&module.as_str()) {
            Protocol::Udp
        } else {
            Protocol::Tcp
        };

        table.host(key).state = HostState::Up;
        let Some(service) = table.service(key, port, protocol) else {
            continue;
        };
        service.state = PortState::Open;
        service.service = module;

        let login = caps.get(4).map(|m| m.as_str()).unwrap_or_default();
        let password = caps.get(5).map(|m| m.as_str()).unwrap_or_default();
        service.push_script(
            ScannerKind::Hydra.as_str(),
            &format!("login: {login} password: {password}"),
        );
    }

    ParsedScanResult {
        start_time,
        end_time,
        ..table.finish(ScannerKind::Hydra, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Hydra v9.5 (c) 2023 by van Hauser/THC & David Maciejak - Please do not use in military or secret service organizations.

Hydra (https://github.com/vanhauser-thc/thc-hydra) starting at 2024-03-01 10:00:00
[DATA] max 4 tasks per 1 server, overall 4 tasks, 12 login tries (l:3/p:4), ~3 tries per task
[DATA] attacking ssh://10.0.0.5:22/
[22][ssh] host: 10.0.0.5   login: admin   password: admin123
[22][ssh] host: 10.0.0.5   login: backup   password: backup pass
[161][snmp] host: 10.0.0.6   password: public
1 of 1 target successfully completed, 2 valid passwords found
Hydra (https://github.com/vanhauser-thc/thc-hydra) finished at 2024-03-01 10:00:30
";

    #[test]
    fn hits_become_services_with_credentials() {
        let result = parse(SAMPLE);
        assert_eq!(result.scan_type, "credential-attack");
        assert_eq!(result.start_time.as_deref(), Some("2024-03-01 10:00:00"));
        assert_eq!(result.end_time.as_deref(), Some("2024-03-01 10:00:30"));
        assert_eq!(result.hosts.len(), 2);

        let ssh = &result.hosts[0].services;
        assert_eq!(ssh.len(), 1);
        assert_eq!(ssh[0].service, "ssh");
        assert_eq!(
            ssh[0].scripts[0].output,
            "login: admin password: admin123\nlogin: backup password: backup pass"
        );

        let snmp = &result.hosts[1].services[0];
        assert_eq!(snmp.protocol, Protocol::Udp);
        assert_eq!(snmp.scripts[0].output, "login:  password: public");
    }

    #[test]
    fn attack_banner_without_hits_yields_no_hosts() {
        let result = parse("Hydra v9.5\n[DATA] attacking ssh://10.0.0.5:22/\n0 valid passwords found\n");
        assert!(result.hosts.is_empty());
    }

    #[test]
    fn static_patterns_compile() {
        LazyLock::force(&HIT);
        LazyLock::force(&STARTED);
        LazyLock::force(&FINISHED);
    }
}
