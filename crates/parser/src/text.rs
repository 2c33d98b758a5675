//! 추출기 공용 텍스트 유틸리티

use std::borrow::Cow;
use std::net::IpAddr;
use std::sync::LazyLock;

use regex::Regex;

/// 정적 패턴을 컴파일합니다. 패턴은 모두 리터럴이며 테스트에서 검증됩니다.
pub(crate) fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex {pattern:?}: {e}"))
}

static ANSI: LazyLock<Regex> = LazyLock::new(|| compile(r"\x1b\[[0-9;?]*[ -/]*[@-~]"));
static CVE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)\bCVE-\d{4}-\d{4,}\b"));
static URL: LazyLock<Regex> = LazyLock::new(|| compile(r#"(?i)\bhttps?://[^\s"'<>\]\[)(,]+"#));

/// ANSI 색상/제어 시퀀스를 제거합니다.
pub(crate) fn strip_ansi(text: &str) -> Cow<'_, str> {
    ANSI.replace_all(text, "")
}

/// 텍스트에서 CVE ID를 대문자로, 등장 순서대로 중복 없이 추출합니다.
pub(crate) fn extract_cves(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for m in CVE.find_iter(text) {
        let id = m.as_str().to_uppercase();
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

/// 텍스트의 http(s) URL을 등장 순서대로 반환합니다.
pub(crate) fn find_urls(text: &str) -> impl Iterator<Item = &str> {
    URL.find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ';', ':', '\'', '"']))
}

/// IPv4/IPv6 리터럴인지 확인합니다.
pub(crate) fn is_ip(s: &str) -> bool {
    s.parse::<IpAddr>().is_ok()
}

/// 스킴별 기본 포트
pub(crate) fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" | "ws" => Some(80),
        "https" | "wss" => Some(443),
        "ftp" => Some(21),
        "ssh" => Some(22),
        "smb" => Some(445),
        "ldap" => Some(389),
        "ldaps" => Some(636),
        "rdp" => Some(3389),
        _ => None,
    }
}

/// URL 또는 `host:port`에서 분해한 접속 지점
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Endpoint {
    pub scheme: Option<String>,
    pub host: String,
    pub port: Option<u16>,
}

impl Endpoint {
    /// 명시 포트 또는 스킴 기본 포트
    pub fn effective_port(&self) -> Option<u16> {
        self.port
            .or_else(|| self.scheme.as_deref().and_then(default_port))
    }

    /// 서비스 이름 (스킴, 없으면 None)
    pub fn service_name(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    /// `scheme://host[:port]` 기준 URL (기본 포트 생략)
    pub fn base_url(&self) -> String {
        let scheme = self.scheme.as_deref().unwrap_or("http");
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        match self.port {
            Some(port) if Some(port) != default_port(scheme) => {
                format!("{scheme}://{host}:{port}")
            }
            _ => format!("{scheme}://{host}"),
        }
    }
}

/// URL(`https://h:8443/x`) 또는 `host[:port]`를 분해합니다.
///
/// 호스트가 비었거나, 허용되지 않는 문자를 포함하거나, 포트가 1-65535 밖이면 None.
pub(crate) fn parse_endpoint(input: &str) -> Option<Endpoint> {
    let input = input.trim().trim_matches(|c| c == '"' || c == '\'');
    let (scheme, rest) = match input.split_once("://") {
        Some((scheme, rest)) => {
            let scheme = scheme.to_ascii_lowercase();
            if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+') {
                return None;
            }
            (Some(scheme), rest)
        }
        None => (None, input),
    };

    let authority = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let authority = authority.rsplit_once('@').map_or(authority, |(_, a)| a);

    let (host, port) = if let Some(stripped) = authority.strip_prefix('[') {
        let (host, after) = stripped.split_once(']')?;
        let port = match after.strip_prefix(':') {
            Some(p) => Some(parse_port(p)?),
            None if after.is_empty() => None,
            None => return None,
        };
        (host, port)
    } else if authority.matches(':').count() > 1 {
        // 괄호 없는 IPv6
        (authority, None)
    } else {
        match authority.rsplit_once(':') {
            Some((host, p)) => (host, Some(parse_port(p)?)),
            None => (authority, None),
        }
    };

    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty()
        || !host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':'))
    {
        return None;
    }

    Some(Endpoint { scheme, host, port })
}

fn parse_port(s: &str) -> Option<u16> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse::<u16>().ok().filter(|p| *p != 0)
}

/// nmap 스타일 버전 문자열을 product/version/extra로 나눕니다.
///
/// 첫 단어가 product, 다음 단어가 숫자로 시작하면 version, 나머지는 extra_info.
pub(crate) fn split_product_version(rest: &str) -> (Option<String>, Option<String>, Option<String>) {
    let mut words = rest.split_whitespace();
    let Some(product) = words.next() else {
        return (None, None, None);
    };
    let remaining: Vec<&str> = words.collect();
    let (version, extra) = match remaining.split_first() {
        Some((first, tail)) if first.starts_with(|c: char| c.is_ascii_digit()) => {
            (Some((*first).to_owned()), tail)
        }
        _ => (None, remaining.as_slice()),
    };
    let extra = (!extra.is_empty()).then(|| extra.join(" "));
    (Some(product.to_owned()), version, extra)
}

/// 64비트 FNV-1a 해시 (실행 간 안정적인 식별자 생성용)
pub(crate) fn stable_hash(text: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    text.bytes()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(b)).wrapping_mul(PRIME))
}
