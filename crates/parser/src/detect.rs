//! 형식 탐지 -- 순서가 있는 시그니처 테이블
//!
//! 시그니처는 위에서부터 차례로 검사하며 처음 일치한 형식을 반환합니다.
//! 각 형식은 다른 형식과 겹치지 않는 고유 앵커(배너 문자열 또는 줄 모양)를
//! 가집니다. 어떤 시그니처도 맞지 않으면 generic 추출기가 호스트 토큰을
//! 하나라도 찾을 때 `Generic`, 아니면 `Unknown`입니다.

use std::sync::LazyLock;

use regex::Regex;

use trawler_core::types::ScannerKind;

use crate::extract::{generic, hydra, nuclei, smb, testssl, web};
use crate::text::{compile, strip_ansi};

static FFUF_RESULT: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?m)\[Status: \d{3}, Size: \d+"));
static WHATWEB_LINE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?m)^https?://\S+ \[\d{3} [A-Za-z]"));
static HTTPX_LINE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?m)^https?://\S+ \[\d{3}\]"));
static AMASS_RELATION: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?m)^\S+ \(FQDN\) --> \w+ --> "));
static TESTSSL_BANNER: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?m)^\s*testssl\.sh\s+\d+\.\d+\S*\s+from\s"));

type Signature = (ScannerKind, fn(&str) -> bool);

/// 탐지 순서 (앞이 우선)
const SIGNATURES: &[Signature] = &[
    (ScannerKind::NmapXml, is_nmap_xml),
    (ScannerKind::NmapText, is_nmap_text),
    (ScannerKind::NmapGreppable, is_nmap_greppable),
    (ScannerKind::Masscan, is_masscan),
    (ScannerKind::Nuclei, is_nuclei),
    (ScannerKind::Nikto, is_nikto),
    (ScannerKind::Gobuster, is_gobuster),
    (ScannerKind::Ffuf, is_ffuf),
    (ScannerKind::Feroxbuster, is_feroxbuster),
    (ScannerKind::Wfuzz, is_wfuzz),
    (ScannerKind::Testssl, is_testssl),
    (ScannerKind::Whatweb, is_whatweb),
    (ScannerKind::Wpscan, is_wpscan),
    (ScannerKind::Enum4linux, is_enum4linux),
    (ScannerKind::Httpx, is_httpx),
    (ScannerKind::Sqlmap, is_sqlmap),
    (ScannerKind::Hydra, is_hydra),
    (ScannerKind::Amass, is_amass),
    (ScannerKind::Subfinder, is_subfinder),
    (ScannerKind::Crackmapexec, is_crackmapexec),
];

/// 출력 텍스트의 형식을 탐지합니다.
pub fn detect(text: &str) -> ScannerKind {
    let clean = strip_ansi(text);
    let clean = clean.as_ref();

    if let Some((kind, _)) = SIGNATURES.iter().find(|(_, matches)| matches(clean)) {
        return *kind;
    }
    if !generic::parse(clean).hosts.is_empty() {
        return ScannerKind::Generic;
    }
    ScannerKind::Unknown
}

fn any_line(text: &str, pred: impl Fn(&str) -> bool) -> bool {
    text.lines().any(|line| pred(line.trim()))
}

fn is_nmap_xml(text: &str) -> bool {
    text.contains("<nmaprun")
}

fn is_nmap_text(text: &str) -> bool {
    text.contains("Nmap scan report for") || text.contains("Starting Nmap")
}

fn is_nmap_greppable(text: &str) -> bool {
    any_line(text, |l| l.starts_with("# Nmap"))
        && any_line(text, |l| {
            l.starts_with("Host: ") && (l.contains("Ports:") || l.contains("Status:"))
        })
}

fn is_masscan(text: &str) -> bool {
    text.contains("Discovered open port")
        || text.contains("Starting masscan")
        || any_line(text, |l| {
            l.starts_with('{')
                && l.contains("\"ip\"")
                && l.contains("\"ports\"")
                && l.contains("\"proto\"")
        })
}

fn is_nuclei(text: &str) -> bool {
    any_line(text, |l| {
        (l.starts_with('{') && l.contains("\"template-id\"")) || nuclei::TEXT_LINE.is_match(l)
    })
}

fn is_nikto(text: &str) -> bool {
    text.contains("- Nikto v") || text.contains("+ Target IP:")
}

fn is_gobuster(text: &str) -> bool {
    text.contains("Gobuster v") || text.contains("by OJ Reeves")
}

fn is_ffuf(text: &str) -> bool {
    any_line(text, |l| l.starts_with(":: Method") || l.starts_with(":: URL"))
        || FFUF_RESULT.is_match(text)
}

fn is_feroxbuster(text: &str) -> bool {
    text.contains("by Ben \"epi\" Risher") || any_line(text, |l| web::FEROX_RESULT.is_match(l))
}

fn is_wfuzz(text: &str) -> bool {
    text.contains("The Web Fuzzer") || any_line(text, |l| web::WFUZZ_RESULT.is_match(l))
}

fn is_testssl(text: &str) -> bool {
    TESTSSL_BANNER.is_match(text) || any_line(text, |l| testssl::START.is_match(l))
}

fn is_whatweb(text: &str) -> bool {
    WHATWEB_LINE.is_match(text)
}

fn is_wpscan(text: &str) -> bool {
    text.contains("WordPress Security Scanner")
        || (text.contains("WPScan") && any_line(text, |l| web::WPSCAN_URL.is_match(l)))
}

fn is_enum4linux(text: &str) -> bool {
    any_line(text, |l| {
        l.starts_with("Starting enum4linux v")
            || l.starts_with("ENUM4LINUX - next generation")
            || smb::E4L_TARGET.is_match(l)
    })
}

fn is_httpx(text: &str) -> bool {
    text.contains("Current httpx version")
        || HTTPX_LINE.is_match(text)
        || any_line(text, |l| {
            l.starts_with('{') && l.contains("\"url\"") && l.contains("\"status_code\"")
        })
}

fn is_sqlmap(text: &str) -> bool {
    text.contains("sqlmap identified") || any_line(text, |l| web::SQLMAP_TIME.is_match(l))
}

fn is_hydra(text: &str) -> bool {
    text.contains("Hydra v") || any_line(text, |l| hydra::HIT.is_match(l))
}

fn is_amass(text: &str) -> bool {
    text.contains("OWASP Amass") || AMASS_RELATION.is_match(text)
}

fn is_subfinder(text: &str) -> bool {
    text.contains("Current subfinder version")
        || any_line(text, |l| l.starts_with("[INF] Enumerating subdomains for "))
}

fn is_crackmapexec(text: &str) -> bool {
    any_line(text, |l| smb::CME_LINE.is_match(l))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detects(text: &str) -> ScannerKind {
        detect(text)
    }

    #[test]
    fn nmap_variants() {
        assert_eq!(
            detects("<?xml version=\"1.0\"?>\n<nmaprun scanner=\"nmap\">"),
            ScannerKind::NmapXml
        );
        assert_eq!(
            detects("Starting Nmap 7.94 ( https://nmap.org ) at 2024-03-01 10:00 UTC"),
            ScannerKind::NmapText
        );
        assert_eq!(
            detects("# Nmap 7.94 scan initiated Fri Mar 1 as: nmap -oN - x\nNmap scan report for 10.0.0.1\n"),
            ScannerKind::NmapText
        );
        assert_eq!(
            detects("# Nmap 7.94 scan initiated Fri Mar 1 as: nmap -oG -\nHost: 10.0.0.1 ()\tStatus: Up\n"),
            ScannerKind::NmapGreppable
        );
    }

    #[test]
    fn xml_prologue_without_nmaprun_is_not_nmap() {
        let kind = detects("<?xml version=\"1.0\"?>\n<report><item/></report>");
        assert_ne!(kind, ScannerKind::NmapXml);
        assert_eq!(kind, ScannerKind::Unknown);
    }

    #[test]
    fn masscan_variants() {
        assert_eq!(detects("Discovered open port 80/tcp on 10.0.0.1"), ScannerKind::Masscan);
        assert_eq!(
            detects(r#"{"ip": "10.0.0.1", "ports": [{"port": 80, "proto": "tcp"}]},"#),
            ScannerKind::Masscan
        );
    }

    #[test]
    fn nuclei_variants() {
        assert_eq!(
            detects(r#"{"template-id":"x","matched-at":"http://h/"}"#),
            ScannerKind::Nuclei
        );
        assert_eq!(
            detects("[git-config] [http] [medium] http://h/.git/config"),
            ScannerKind::Nuclei
        );
        assert_eq!(
            detects("\x1b[92m[tech]\x1b[0m [http] [\x1b[34minfo\x1b[0m] http://h/"),
            ScannerKind::Nuclei
        );
    }

    #[test]
    fn tool_banners() {
        let cases = [
            ("- Nikto v2.5.0\n+ Target IP: 10.0.0.5", ScannerKind::Nikto),
            ("Gobuster v3.6\nby OJ Reeves (@TheColonial)", ScannerKind::Gobuster),
            (" :: Method           : GET\n :: URL              : http://h/FUZZ", ScannerKind::Ffuf),
            ("admin [Status: 200, Size: 10, Words: 1, Lines: 1]", ScannerKind::Ffuf),
            ("by Ben \"epi\" Risher 🤓", ScannerKind::Feroxbuster),
            ("* Wfuzz 3.1.0 - The Web Fuzzer *", ScannerKind::Wfuzz),
            ("    testssl.sh       3.0.8 from https://testssl.sh/", ScannerKind::Testssl),
            ("http://10.0.0.5 [200 OK] Apache[2.4.41]", ScannerKind::Whatweb),
            ("WordPress Security Scanner by the WPScan Team", ScannerKind::Wpscan),
            ("Starting enum4linux v0.9.1", ScannerKind::Enum4linux),
            ("ENUM4LINUX - next generation (v1.3.1)", ScannerKind::Enum4linux),
            ("https://a.example.com [200] [Home]", ScannerKind::Httpx),
            ("[INF] Current httpx version v1.3.7 (latest)", ScannerKind::Httpx),
            ("sqlmap identified the following injection point(s)", ScannerKind::Sqlmap),
            ("[*] starting @ 10:00:00 /2024-03-01/", ScannerKind::Sqlmap),
            ("Hydra v9.5 (c) 2023 by van Hauser/THC", ScannerKind::Hydra),
            ("[22][ssh] host: 10.0.0.5   login: a   password: b", ScannerKind::Hydra),
            ("OWASP Amass v3.23.3", ScannerKind::Amass),
            ("a.example.com (FQDN) --> a_record --> 1.2.3.4 (IPAddress)", ScannerKind::Amass),
            ("[INF] Current subfinder version v2.6.3 (latest)", ScannerKind::Subfinder),
            (
                "SMB         10.0.0.10       445    DC01             [*] Windows Server 2019",
                ScannerKind::Crackmapexec,
            ),
        ];
        for (text, expected) in cases {
            assert_eq!(detects(text), expected, "input: {text}");
        }
    }

    #[test]
    fn tool_names_in_prose_do_not_anchor() {
        for text in [
            "notes: try subfinder next week",
            "feroxbuster crashed again",
            "we should install enum4linux",
            "WPScan license expired",
            "testssl.sh is in the toolbox",
            "Wfuzz is slower than ffuf",
        ] {
            assert_eq!(detects(text), ScannerKind::Unknown, "input: {text}");
        }
        // 호스트가 있으면 generic 추출로 넘어감
        assert_eq!(
            detects("subfinder found nothing for 10.0.0.9"),
            ScannerKind::Generic
        );
        assert_eq!(detects("docs at sqlmap.org"), ScannerKind::Generic);
    }

    #[test]
    fn line_shape_anchors() {
        let cases = [
            (
                "200      GET       10l       20w      300c http://10.0.0.5/admin",
                ScannerKind::Feroxbuster,
            ),
            (
                " Start 2024-03-01 10:00:00        -->> 10.0.0.70:443 (mail.corp.local) <<--",
                ScannerKind::Testssl,
            ),
            (
                "WPScan\n[+] URL: http://blog.local/ [10.0.0.8]",
                ScannerKind::Wpscan,
            ),
            ("Target ........... 10.0.0.10", ScannerKind::Enum4linux),
            ("[INF] Enumerating subdomains for example.com", ScannerKind::Subfinder),
        ];
        for (text, expected) in cases {
            assert_eq!(detects(text), expected, "input: {text}");
        }
    }

    #[test]
    fn generic_and_unknown_fallbacks() {
        assert_eq!(detects("connect 10.0.0.1:22 ok"), ScannerKind::Generic);
        assert_eq!(detects("nothing to see here"), ScannerKind::Unknown);
        assert_eq!(detects(""), ScannerKind::Unknown);
    }

    #[test]
    fn every_signature_kind_is_distinct() {
        let kinds: std::collections::HashSet<ScannerKind> =
            SIGNATURES.iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds.len(), SIGNATURES.len());
        assert_eq!(kinds.len() + 2, ScannerKind::ALL.len());
        assert!(!kinds.contains(&ScannerKind::Generic));
        assert!(!kinds.contains(&ScannerKind::Unknown));
    }

    #[test]
    fn static_patterns_compile() {
        for re in [&FFUF_RESULT, &WHATWEB_LINE, &HTTPX_LINE, &AMASS_RELATION, &TESTSSL_BANNER] {
            LazyLock::force(re);
        }
    }
}
