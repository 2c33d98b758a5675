//! 호스트명 해석 -- DNS 조회와 타임아웃
//!
//! 조정 엔진은 IP가 아닌 호스트 키를 [`HostResolver`]로 해석합니다. 해석은 호스트마다
//! 독립적이며, 한 호스트의 실패는 다른 호스트 처리를 막지 않습니다.

use std::collections::HashMap;
use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;

use tracing::debug;

use trawler_core::config::InventoryConfig;

use crate::error::ReconcileError;

/// 호스트명 -> IP 해석기
pub trait HostResolver: Send + Sync {
    /// 호스트명을 IP 하나로 해석합니다. IPv4 주소를 우선합니다.
    fn resolve(&self, name: &str) -> impl Future<Output = Result<IpAddr, ReconcileError>> + Send;
}

/// 시스템 DNS 해석기 (`tokio::net::lookup_host`)
#[derive(Debug, Clone)]
pub struct DnsResolver {
    timeout: Duration,
}

impl DnsResolver {
    /// 조회 타임아웃으로 해석기를 생성합니다.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// 설정의 `dns_timeout_ms`로 해석기를 생성합니다.
    pub fn from_config(config: &InventoryConfig) -> Self {
        Self::new(Duration::from_millis(config.dns_timeout_ms))
    }

    /// 조회 타임아웃
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl HostResolver for DnsResolver {
    async fn resolve(&self, name: &str) -> Result<IpAddr, ReconcileError> {
        let dns_err = |reason: String| ReconcileError::Dns {
            target: name.to_owned(),
            reason,
        };

        let lookup = tokio::net::lookup_host((name, 0));
        let addrs = match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(addrs)) => addrs.map(|a| a.ip()).collect::<Vec<_>>(),
            Ok(Err(e)) => return Err(dns_err(e.to_string())),
            Err(_) => {
                return Err(dns_err(format!(
                    "timed out after {}ms",
                    self.timeout.as_millis()
                )));
            }
        };

        let ip = addrs
            .iter()
            .find(|ip| ip.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| dns_err("no addresses returned".to_owned()))?;
        debug!(host = name, ip = %ip, "resolved");
        Ok(ip)
    }
}

/// 고정 테이블 해석기
///
/// 오프라인 가져오기와 테스트에 사용합니다. 테이블에 없는 이름은 실패합니다.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    entries: HashMap<String, IpAddr>,
}

impl StaticResolver {
    /// 빈 테이블로 생성합니다 (모든 조회 실패).
    pub fn new() -> Self {
        Self::default()
    }

    /// 항목을 추가합니다. 이름은 대소문자를 구분하지 않습니다.
    pub fn with(mut self, name: &str, ip: IpAddr) -> Self {
        self.entries.insert(name.to_ascii_lowercase(), ip);
        self
    }
}

impl HostResolver for StaticResolver {
    async fn resolve(&self, name: &str) -> Result<IpAddr, ReconcileError> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .copied()
            .ok_or_else(|| ReconcileError::Dns {
                target: name.to_owned(),
                reason: "no static entry".to_owned(),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[tokio::test]
    async fn static_resolver_is_case_insensitive() {
        let resolver =
            StaticResolver::new().with("Web.Local", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(
            resolver.resolve("web.local").await.unwrap(),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))
        );
        let err = resolver.resolve("other.local").await.unwrap_err();
        assert!(err.to_string().contains("other.local"));
    }

    #[tokio::test]
    async fn dns_resolver_handles_localhost() {
        let resolver = DnsResolver::new(Duration::from_secs(2));
        let ip = resolver.resolve("localhost").await.unwrap();
        assert!(ip.is_loopback());
    }

    #[tokio::test]
    async fn dns_resolver_reports_invalid_names() {
        let resolver = DnsResolver::new(Duration::from_secs(2));
        let err = resolver.resolve("no such host..invalid").await.unwrap_err();
        assert!(matches!(err, ReconcileError::Dns { .. }));
    }

    #[test]
    fn from_config_uses_timeout() {
        let config = InventoryConfig {
            dns_timeout_ms: 250,
            ..InventoryConfig::default()
        };
        assert_eq!(DnsResolver::from_config(&config).timeout(), Duration::from_millis(250));
    }
}
