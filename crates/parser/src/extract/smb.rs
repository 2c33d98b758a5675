//! SMB 열거 도구 추출기 -- enum4linux(-ng), crackmapexec/netexec

use std::sync::LazyLock;

use regex::Regex;

use trawler_core::types::{HostState, ParsedScanResult, PortState, Protocol, ScannerKind};

use super::HostTable;
use crate::text::{compile, strip_ansi};

// ─── enum4linux ────────────────────────────────────────────────────

pub(crate) static E4L_TARGET: LazyLock<Regex> = LazyLock::new(|| compile(r"^\s*(?:\[\*\]\s*)?Target\s*\.{3,}\s*(\S+)"));
static E4L_WORKGROUP: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?i)(?:Got domain/workgroup name:|NetBIOS domain name:|Domain=\[)\s*([^\]\s]+)")
});
static E4L_OS: LazyLock<Regex> = LazyLock::new(|| compile(r"(?:OS=\[([^\]]+)\]|^\s*OS:\s+(.+?)\s*$)"));
static E4L_NETBIOS: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)NetBIOS computer name:\s*(\S+)"));

/// enum4linux 출력을 추출합니다.
///
/// 세션 확인이 성공하면 445/tcp(smb)와 139/tcp(netbios-ssn)를 만듭니다.
pub fn parse_enum4linux(text: &str) -> ParsedScanResult {
    let clean = strip_ansi(text);
    let mut table = HostTable::new();

    let mut target: Option<String> = None;
    let mut session = false;
    let mut workgroup: Option<String> = None;
    let mut os: Option<String> = None;
    let mut netbios: Option<String> = None;

    for line in clean.lines() {
        if target.is_none() {
            if let Some(caps) = E4L_TARGET.captures(line) {
                target = Some(caps[1].to_owned());
            }
            continue;
        }
        if line.contains("allows sessions") || line.contains("allows session using") {
            session = true;
        }
        if workgroup.is_none() {
            if let Some(caps) = E4L_WORKGROUP.captures(line) {
                workgroup = Some(caps[1].to_owned());
            }
        }
        if os.is_none() {
            if let Some(caps) = E4L_OS.captures(line) {
                os = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str().trim().to_owned())
                    .filter(|v| !v.is_empty());
            }
        }
        if netbios.is_none() {
            if let Some(caps) = E4L_NETBIOS.captures(line) {
                netbios = Some(caps[1].to_owned());
            }
        }
    }

    let Some(target) = target else {
        return table.finish(ScannerKind::Enum4linux, text);
    };

    {
        let host = table.host(&target);
        if session {
            host.state = HostState::Up;
        }
        host.hostname = netbios;
        host.os = match (os, workgroup.as_deref()) {
            (Some(os), _) => Some(os),
            (None, Some(group)) => Some(format!("Windows (workgroup {group})")),
            (None, None) => None,
        };
    }

    if session {
        let key = target.as_str();
        for (port, name) in [(445, "smb"), (139, "netbios-ssn")] {
            if let Some(service) = table.service(key, port, Protocol::Tcp) {
                service.state = PortState::Open;
                service.service = name.to_owned();
                if let Some(group) = workgroup.as_deref() {
                    service.extra_info = Some(format!("workgroup: {group}"));
                }
            }
        }
    }

    table.finish(ScannerKind::Enum4linux, text)
}

// ─── crackmapexec / netexec ────────────────────────────────────────

pub(crate) static CME_LINE: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"^(SMB|LDAP|LDAPS|WINRM|MSSQL|SSH|RDP|FTP|WMI|VNC|NFS)\s+(\S+)\s+(\d{1,5})\s+(\S+)\s+(.*)$",
    )
});
static CME_NAME: LazyLock<Regex> = LazyLock::new(|| compile(r"\(name:([^)]*)\)"));
static CME_DOMAIN: LazyLock<Regex> = LazyLock::new(|| compile(r"\(domain:([^)]*)\)"));

/// crackmapexec/netexec 출력을 추출합니다. (ip, port)마다 서비스 하나.
pub fn parse_crackmapexec(text: &str) -> ParsedScanResult {
    let clean = strip_ansi(text);
    let mut table = HostTable::new();

    for line in clean.lines() {
        let Some(caps) = CME_LINE.captures(line.trim_end()) else {
            continue;
        };
        let proto = caps[1].to_ascii_lowercase();
        let key = &caps[2];
        let Ok(port) = caps[3].parse::<u16>() else {
            continue;
        };
        let name = &caps[4];
        let message = caps[5].trim();

        {
            let host = table.host(key);
            host.state = HostState::Up;
            let reported = CME_NAME
                .captures(message)
                .map(|c| c[1].trim().to_owned())
                .or_else(|| (name != "NONE" && !name.is_empty()).then(|| name.to_owned()))
                .filter(|n| !n.is_empty());
            if host.hostname.is_none() {
                host.hostname = reported;
            }
            if host.os.is_none() {
                if let Some(banner) = message.strip_prefix("[*]") {
                    let os = banner.split(" (").next().unwrap_or_default().trim();
                    if !os.is_empty() && !os.starts_with("http") {
                        host.os = Some(os.to_owned());
                    }
                }
            }
        }

        let Some(service) = table.service(key, port, Protocol::Tcp) else {
            continue;
        };
        service.state = PortState::Open;
        service.service = proto;
        if let Some(domain) = CME_DOMAIN.captures(message) {
            service.extra_info = Some(format!("domain: {}", domain[1].trim()));
        }
        if message.starts_with("[+]") || message.starts_with("[-]") {
            service.push_script(ScannerKind::Crackmapexec.as_str(), message);
        }
    }

    table.finish(ScannerKind::Crackmapexec, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const E4L: &str = "\
Starting enum4linux v0.9.1 ( http://labs.portcullis.co.uk/application/enum4linux/ ) on Fri Mar  1 10:00:00 2024

 =========================================( Target Information )=========================================

Target ........... 10.0.0.10
RID Range ........ 500-550,1000-1050
Username ......... ''

 ============================( Enumerating Workgroup/Domain on 10.0.0.10 )============================

[+] Got domain/workgroup name: CORP

 ===================================( Session Check on 10.0.0.10 )===================================

[+] Server 10.0.0.10 allows sessions using username '', password ''

 =================================( OS information on 10.0.0.10 )=================================

[+] Got OS info for 10.0.0.10 from smbclient: Domain=[CORP] OS=[Windows Server 2016 Standard 14393] Server=[Windows Server 2016 Standard 6.3]
";

    #[test]
    fn enum4linux_session_yields_smb_services() {
        let result = parse_enum4linux(E4L);
        assert_eq!(result.scan_type, "smb-enumeration");
        assert_eq!(result.hosts.len(), 1);
        let host = &result.hosts[0];
        assert_eq!(host.ip, "10.0.0.10");
        assert_eq!(host.state, HostState::Up);
        assert_eq!(host.os.as_deref(), Some("Windows Server 2016 Standard 14393"));
        let ports: Vec<u16> = host.services.iter().map(|s| s.port).collect();
        assert_eq!(ports, vec![445, 139]);
        assert_eq!(host.services[0].service, "smb");
        assert_eq!(host.services[1].service, "netbios-ssn");
        assert_eq!(host.services[0].extra_info.as_deref(), Some("workgroup: CORP"));
    }

    #[test]
    fn enum4linux_without_session_has_no_services() {
        let text = "Target ........... 10.0.0.11\n[+] Got domain/workgroup name: WORKGROUP\n[E] Server doesn't allow session using username '', password ''.\n";
        let result = parse_enum4linux(text);
        let host = &result.hosts[0];
        assert!(host.services.is_empty());
        assert_eq!(host.os.as_deref(), Some("Windows (workgroup WORKGROUP)"));
    }

    #[test]
    fn enum4linux_ng_style() {
        let text = "\
ENUM4LINUX - next generation (v1.3.1)
 ==========================
|    Target Information    |
 ==========================
[*] Target ........... 10.0.0.12
[+] Server allows session using username '', password ''
[+] Determining NetBIOS computer name
NetBIOS computer name: FS01
NetBIOS domain name: CORP
OS: Windows Server 2019 Standard 17763
";
        let result = parse_enum4linux(text);
        let host = &result.hosts[0];
        assert_eq!(host.ip, "10.0.0.12");
        assert_eq!(host.hostname.as_deref(), Some("FS01"));
        assert_eq!(host.os.as_deref(), Some("Windows Server 2019 Standard 17763"));
        assert_eq!(host.services.len(), 2);
        assert_eq!(host.services[0].extra_info.as_deref(), Some("workgroup: CORP"));
    }

    #[test]
    fn crackmapexec_lines() {
        let text = "\
SMB         10.0.0.10       445    DC01             [*] Windows Server 2019 Standard 17763 x64 (name:DC01) (domain:corp.local) (signing:True) (SMBv1:False)
SMB         10.0.0.10       445    DC01             [+] corp.local\\admin:Passw0rd! (Pwn3d!)
SMB         10.0.0.11       445    WS01             [-] corp.local\\admin:Passw0rd! STATUS_LOGON_FAILURE
WINRM       10.0.0.11       5985   WS01             [*] http://10.0.0.11:5985/wsman
";
        let result = parse_crackmapexec(text);
        assert_eq!(result.hosts.len(), 2);

        let dc = &result.hosts[0];
        assert_eq!(dc.hostname.as_deref(), Some("DC01"));
        assert_eq!(dc.os.as_deref(), Some("Windows Server 2019 Standard 17763 x64"));
        assert_eq!(dc.services.len(), 1);
        assert_eq!(dc.services[0].service, "smb");
        assert_eq!(dc.services[0].extra_info.as_deref(), Some("domain: corp.local"));
        assert!(dc.services[0].scripts[0].output.contains("Pwn3d!"));

        let ws = &result.hosts[1];
        assert_eq!(ws.services.len(), 2);
        assert_eq!(ws.services[1].service, "winrm");
        assert_eq!(ws.os, None);
    }

    #[test]
    fn static_patterns_compile() {
        for re in [
            &E4L_TARGET,
            &E4L_WORKGROUP,
            &E4L_OS,
            &E4L_NETBIOS,
            &CME_LINE,
            &CME_NAME,
            &CME_DOMAIN,
        ] {
            LazyLock::force(re);
        }
    }
}
