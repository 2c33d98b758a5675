//! 조정 엔진 -- 파싱 결과를 인벤토리에 멱등하게 병합
//!
//! # 매칭 규칙
//!
//! - 호스트: IP 리터럴 키는 그대로 IP, 그 외에는 DNS로 해석하고 원래 문자열을 도메인으로
//!   둡니다. IP로 먼저, 도메인으로 다음에 찾습니다. 찾으면 비어 있던 필드만 채웁니다.
//! - 서비스: `(host_id, port, 대문자 프로토콜)`. 이름/상태/코멘트는 새 값이 다르고
//!   `unknown`이나 빈 값이 아닐 때만 바꿉니다.
//! - 취약점: `(template_id, matched_at)`. 설명/cvss/cwe/조치/참고는 새 값이 비어 있지 않고
//!   다를 때만 바꿉니다. 새 취약점은 `Open` 상태와 원본 출력 일부를 함께 저장합니다.
//!
//! 단위 작업(호스트, 서비스, 취약점 하나)의 실패는 `ImportSummary.errors`에 남고
//! 나머지 작업은 계속됩니다.

use std::collections::HashMap;
use std::net::IpAddr;

use chrono::Utc;
use metrics::counter;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use trawler_core::config::InventoryConfig;
use trawler_core::metrics as m;
use trawler_core::types::{
    HostState, ParsedHost, ParsedScanResult, ParsedService, ParsedVulnerability, PortState,
};

use crate::error::ReconcileError;
use crate::model::{EntityCounts, Host, ImportSummary, Scope, Service, VulnStatus, Vulnerability};
use crate::resolve::HostResolver;
use crate::store::InventoryStore;

/// 신규 취약점에 저장하는 원본 출력 기본 최대 길이 (문자 수)
pub const DEFAULT_PROVENANCE_MAX_CHARS: usize = 10_000;

const ENTITY_HOST: &str = "host";
const ENTITY_SERVICE: &str = "service";
const ENTITY_VULNERABILITY: &str = "vulnerability";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Created,
    Updated,
    Skipped,
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Skipped => "skipped",
        }
    }
}

fn tally(counts: &mut EntityCounts, entity: &'static str, outcome: Outcome) {
    match outcome {
        Outcome::Created => counts.created += 1,
        Outcome::Updated => counts.updated += 1,
        Outcome::Skipped => counts.skipped += 1,
    }
    counter!(
        m::RECONCILE_ENTITIES_TOTAL,
        m::LABEL_ENTITY => entity,
        m::LABEL_OUTCOME => outcome.as_str()
    )
    .increment(1);
}

fn record(summary: &mut ImportSummary, err: ReconcileError) {
    warn!(error = %err, "reconcile unit failed");
    counter!(m::RECONCILE_ERRORS_TOTAL).increment(1);
    summary.errors.push(err.to_string());
}

/// 호스트 식별 정보
#[derive(Debug, Clone, Default)]
struct Identity {
    ip: Option<String>,
    domain: Option<String>,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn is_sentinel(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.eq_ignore_ascii_case("unknown")
}

/// URL, `host:port`, 또는 호스트명에서 호스트 부분을 소문자로 꺼냅니다.
fn host_of(input: &str) -> Option<String> {
    let input = input.trim();
    let rest = input.split_once("://").map_or(input, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let authority = authority.rsplit_once('@').map_or(authority, |(_, a)| a);

    let host = if let Some(bracketed) = authority.strip_prefix('[') {
        bracketed.split_once(']')?.0
    } else if authority.matches(':').count() > 1 {
        authority
    } else {
        authority.split(':').next().unwrap_or_default()
    };

    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let valid = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':'));
    valid.then_some(host)
}

/// 서비스 코멘트: product, version, extra_info를 공백으로 잇습니다.
fn service_comment(svc: &ParsedService) -> Option<String> {
    let parts: Vec<&str> = [&svc.product, &svc.version, &svc.extra_info]
        .into_iter()
        .filter_map(|part| non_blank(part.as_deref()))
        .collect();
    (!parts.is_empty()).then(|| parts.join(" "))
}

/// 문자 경계에서 최대 `max_chars`자로 자릅니다.
fn provenance_snippet(raw: &str, max_chars: usize) -> String {
    match raw.char_indices().nth(max_chars) {
        Some((idx, _)) => raw[..idx].to_owned(),
        None => raw.to_owned(),
    }
}

/// 비어 있던 필드만 채우고 바뀌었으면 true
fn merge_host(host: &mut Host, identity: &Identity, parsed: &ParsedHost) -> bool {
    let mut changed = false;

    if host.ip.is_none() && identity.ip.is_some() {
        host.ip.clone_from(&identity.ip);
        changed = true;
    }
    if host.domain.is_none() && identity.domain.is_some() {
        host.domain.clone_from(&identity.domain);
        changed = true;
    }
    if non_blank(host.hostname.as_deref()).is_none()
        && let Some(name) = non_blank(parsed.hostname.as_deref())
    {
        host.hostname = Some(name.to_owned());
        changed = true;
    }
    if non_blank(host.os.as_deref()).is_none()
        && let Some(os) = non_blank(parsed.os.as_deref())
    {
        host.os = Some(os.to_owned());
        changed = true;
    }
    if host.state == HostState::Unknown && parsed.state != HostState::Unknown {
        host.state = parsed.state;
        changed = true;
    }
    changed
}

/// 다르고 sentinel이 아닌 값만 반영하고 바뀌었으면 true
fn merge_service(service: &mut Service, parsed: &ParsedService) -> bool {
    let mut changed = false;

    let name = parsed.service.trim();
    if !is_sentinel(name) && name != service.service_name {
        service.service_name = name.to_owned();
        changed = true;
    }
    if parsed.state != PortState::Unknown && parsed.state != service.state {
        service.state = parsed.state;
        changed = true;
    }
    if let Some(comment) = service_comment(parsed)
        && service.comment.as_deref() != Some(comment.as_str())
    {
        service.comment = Some(comment);
        changed = true;
    }
    changed
}

/// 비어 있지 않고 다른 값만 반영하고 바뀌었으면 true
fn merge_vulnerability(
    stored: &mut Vulnerability,
    parsed: &ParsedVulnerability,
    host_id: Option<Uuid>,
) -> bool {
    let mut changed = false;

    let mut patch = |slot: &mut Option<String>, value: &Option<String>| {
        if let Some(v) = non_blank(value.as_deref())
            && slot.as_deref() != Some(v)
        {
            *slot = Some(v.to_owned());
            changed = true;
        }
    };
    patch(&mut stored.description, &parsed.description);
    patch(&mut stored.cwe, &parsed.cwe);
    patch(&mut stored.solution, &parsed.solution);

    if parsed.cvss.is_some() && parsed.cvss != stored.cvss {
        stored.cvss = parsed.cvss;
        changed = true;
    }
    if !parsed.references.is_empty() && parsed.references != stored.references {
        stored.references.clone_from(&parsed.references);
        changed = true;
    }
    if stored.host_id.is_none() && host_id.is_some() {
        stored.host_id = host_id;
        changed = true;
    }
    changed
}

/// 조정 엔진
///
/// 가져오기는 엔진마다 비동기 뮤텍스로 직렬화됩니다. 같은 엔진을 통한 동시 가져오기는
/// 조회-후-생성 사이에 끼어들 수 없습니다.
pub struct Reconciler<S, R> {
    store: S,
    resolver: R,
    provenance_max_chars: usize,
    import_lock: Mutex<()>,
}

impl<S: InventoryStore, R: HostResolver> Reconciler<S, R> {
    /// 저장소와 해석기로 엔진을 생성합니다.
    pub fn new(store: S, resolver: R) -> Self {
        Self {
            store,
            resolver,
            provenance_max_chars: DEFAULT_PROVENANCE_MAX_CHARS,
            import_lock: Mutex::new(()),
        }
    }

    /// 설정의 `provenance_max_chars`를 적용합니다.
    pub fn with_config(self, config: &InventoryConfig) -> Self {
        self.with_provenance_max_chars(config.provenance_max_chars)
    }

    /// 원본 출력 저장 최대 길이(문자 수)를 지정합니다.
    pub fn with_provenance_max_chars(mut self, max_chars: usize) -> Self {
        self.provenance_max_chars = max_chars;
        self
    }

    /// 저장소 참조
    pub fn store(&self) -> &S {
        &self.store
    }

    /// 스캔 결과의 호스트/서비스를 병합합니다.
    ///
    /// `targets`가 하나의 호스트명이고 결과가 IP 키 호스트 하나뿐이면, 그 호스트명을
    /// 도메인으로 기록합니다.
    pub async fn import_scan(
        &self,
        scope: &Scope,
        scan: &ParsedScanResult,
        targets: &[String],
    ) -> ImportSummary {
        let _guard = self.import_lock.lock().await;
        let mut summary = ImportSummary::default();

        let mut hosts = match self.store.get_hosts(scope).await {
            Ok(hosts) => hosts,
            Err(e) => {
                record(&mut summary, e.into());
                summary.hosts.skipped += scan.host_count();
                summary.services.skipped += scan.service_count();
                return summary;
            }
        };

        let target_domain = match (targets, scan.hosts.as_slice()) {
            ([target], [_]) => host_of(target).filter(|h| h.parse::<IpAddr>().is_err()),
            _ => None,
        };

        for parsed in &scan.hosts {
            let Some(host) = self
                .ensure_host(scope, &mut hosts, parsed, target_domain.as_deref(), &mut summary)
                .await
            else {
                for _ in &parsed.services {
                    tally(&mut summary.services, ENTITY_SERVICE, Outcome::Skipped);
                }
                continue;
            };
            self.import_services(scope, &host, &parsed.services, &mut summary)
                .await;
        }

        info!(
            scope = %scope,
            scanner = scan.scanner.as_str(),
            hosts = %summary.hosts,
            services = %summary.services,
            errors = summary.errors.len(),
            "scan imported"
        );
        summary
    }

    /// 취약점 목록을 병합합니다.
    ///
    /// 호스트는 취약점의 `host`, `matched_at` URL의 호스트, 하나뿐인 타겟 순서로 정하며
    /// 없으면 생성합니다.
    pub async fn import_vulnerabilities(
        &self,
        scope: &Scope,
        vulns: &[ParsedVulnerability],
        raw_output: &str,
        targets: &[String],
    ) -> ImportSummary {
        let _guard = self.import_lock.lock().await;
        let mut summary = ImportSummary::default();

        let loaded = match self.store.get_hosts(scope).await {
            Ok(hosts) => match self.store.get_vulnerabilities(scope).await {
                Ok(existing) => Ok((hosts, existing)),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        let (mut hosts, mut existing) = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                record(&mut summary, e.into());
                summary.vulnerabilities.skipped += vulns.len();
                return summary;
            }
        };

        let provenance = provenance_snippet(raw_output, self.provenance_max_chars);
        let sole_target = match targets {
            [target] => host_of(target),
            _ => None,
        };
        // 이번 가져오기에서 이미 확인한 호스트 키 -> ID
        let mut attached: HashMap<String, Option<Uuid>> = HashMap::new();

        for vuln in vulns {
            let key = non_blank(vuln.host.as_deref())
                .and_then(host_of)
                .or_else(|| host_of(&vuln.matched_at))
                .or_else(|| sole_target.clone());

            let host_id = match key {
                Some(key) => match attached.get(&key) {
                    Some(id) => *id,
                    None => {
                        let parsed = ParsedHost::new(key.clone());
                        let id = self
                            .ensure_host(scope, &mut hosts, &parsed, None, &mut summary)
                            .await
                            .map(|h| h.id);
                        attached.insert(key, id);
                        id
                    }
                },
                None => None,
            };

            let outcome = match existing
                .iter_mut()
                .find(|v| v.template_id == vuln.template_id && v.matched_at == vuln.matched_at)
            {
                Some(stored) => {
                    let mut next = stored.clone();
                    if merge_vulnerability(&mut next, vuln, host_id) {
                        next.updated_at = Utc::now();
                        match self.store.update_vulnerability(scope, &next).await {
                            Ok(()) => {
                                *stored = next;
                                Outcome::Updated
                            }
                            Err(e) => {
                                record(&mut summary, e.into());
                                Outcome::Skipped
                            }
                        }
                    } else {
                        Outcome::Skipped
                    }
                }
                None => {
                    let created = self.new_vulnerability(vuln, host_id, &provenance);
                    match self.store.create_vulnerability(scope, created).await {
                        Ok(stored) => {
                            existing.push(stored);
                            Outcome::Created
                        }
                        Err(e) => {
                            record(&mut summary, e.into());
                            Outcome::Skipped
                        }
                    }
                }
            };
            debug!(template_id = %vuln.template_id, matched_at = %vuln.matched_at, outcome = outcome.as_str(), "vulnerability reconciled");
            tally(&mut summary.vulnerabilities, ENTITY_VULNERABILITY, outcome);
        }

        info!(
            scope = %scope,
            hosts = %summary.hosts,
            vulnerabilities = %summary.vulnerabilities,
            errors = summary.errors.len(),
            "vulnerabilities imported"
        );
        summary
    }

    /// 호스트 키를 식별 정보로 바꿉니다. DNS 실패는 기록하고 도메인만 남깁니다.
    async fn identify(
        &self,
        key: &str,
        target_domain: Option<&str>,
        summary: &mut ImportSummary,
    ) -> Identity {
        let key = key.trim();
        let literal = key
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>();
        if let Ok(ip) = literal {
            return Identity {
                ip: Some(ip.to_string()),
                domain: target_domain.map(str::to_owned),
            };
        }

        let domain = key.trim_end_matches('.').to_ascii_lowercase();
        let ip = match self.resolver.resolve(&domain).await {
            Ok(ip) => Some(ip.to_string()),
            Err(e) => {
                record(summary, e);
                None
            }
        };
        Identity {
            ip,
            domain: Some(domain),
        }
    }

    /// 호스트를 찾거나 만들고 저장된 값을 반환합니다. 저장소 실패 시 None.
    async fn ensure_host(
        &self,
        scope: &Scope,
        hosts: &mut Vec<Host>,
        parsed: &ParsedHost,
        target_domain: Option<&str>,
        summary: &mut ImportSummary,
    ) -> Option<Host> {
        let identity = self.identify(parsed.key(), target_domain, summary).await;

        let by_ip = identity
            .ip
            .as_deref()
            .and_then(|ip| hosts.iter().position(|h| h.ip.as_deref() == Some(ip)));
        let found = by_ip.or_else(|| {
            identity.domain.as_deref().and_then(|domain| {
                hosts.iter().position(|h| {
                    h.domain
                        .as_deref()
                        .is_some_and(|d| d.eq_ignore_ascii_case(domain))
                })
            })
        });

        match found {
            Some(idx) => {
                let mut next = hosts[idx].clone();
                if !merge_host(&mut next, &identity, parsed) {
                    tally(&mut summary.hosts, ENTITY_HOST, Outcome::Skipped);
                    return Some(next);
                }
                next.updated_at = Utc::now();
                match self.store.update_host(scope, &next).await {
                    Ok(()) => {
                        debug!(host = next.label(), "host updated");
                        tally(&mut summary.hosts, ENTITY_HOST, Outcome::Updated);
                        hosts[idx] = next.clone();
                        Some(next)
                    }
                    Err(e) => {
                        record(summary, e.into());
                        tally(&mut summary.hosts, ENTITY_HOST, Outcome::Skipped);
                        None
                    }
                }
            }
            None => {
                let mut host = Host::new(identity.ip.clone(), identity.domain.clone());
                merge_host(&mut host, &identity, parsed);
                match self.store.create_host(scope, host).await {
                    Ok(stored) => {
                        debug!(host = stored.label(), "host created");
                        tally(&mut summary.hosts, ENTITY_HOST, Outcome::Created);
                        hosts.push(stored.clone());
                        Some(stored)
                    }
                    Err(e) => {
                        record(summary, e.into());
                        tally(&mut summary.hosts, ENTITY_HOST, Outcome::Skipped);
                        None
                    }
                }
            }
        }
    }

    async fn import_services(
        &self,
        scope: &Scope,
        host: &Host,
        services: &[ParsedService],
        summary: &mut ImportSummary,
    ) {
        if services.is_empty() {
            return;
        }
        let mut existing = match self.store.get_services(scope, host.id).await {
            Ok(existing) => existing,
            Err(e) => {
                record(summary, e.into());
                for _ in services {
                    tally(&mut summary.services, ENTITY_SERVICE, Outcome::Skipped);
                }
                return;
            }
        };

        for parsed in services {
            let protocol = parsed.protocol.as_upper();
            let outcome = match existing
                .iter_mut()
                .find(|s| s.matches(host.id, parsed.port, protocol))
            {
                Some(current) => {
                    let mut next = current.clone();
                    if merge_service(&mut next, parsed) {
                        next.updated_at = Utc::now();
                        match self.store.update_service(scope, &next).await {
                            Ok(()) => {
                                *current = next;
                                Outcome::Updated
                            }
                            Err(e) => {
                                record(summary, e.into());
                                Outcome::Skipped
                            }
                        }
                    } else {
                        Outcome::Skipped
                    }
                }
                None => {
                    let mut service = Service::new(host.id, parsed.port, parsed.protocol);
                    if !parsed.service.trim().is_empty() {
                        service.service_name = parsed.service.trim().to_owned();
                    }
                    service.state = parsed.state;
                    service.comment = service_comment(parsed);
                    match self.store.create_service(scope, service).await {
                        Ok(stored) => {
                            existing.push(stored);
                            Outcome::Created
                        }
                        Err(e) => {
                            record(summary, e.into());
                            Outcome::Skipped
                        }
                    }
                }
            };
            tally(&mut summary.services, ENTITY_SERVICE, outcome);
        }
    }

    fn new_vulnerability(
        &self,
        vuln: &ParsedVulnerability,
        host_id: Option<Uuid>,
        provenance: &str,
    ) -> Vulnerability {
        let now = Utc::now();
        Vulnerability {
            id: Uuid::new_v4(),
            host_id,
            template_id: vuln.template_id.clone(),
            matched_at: vuln.matched_at.clone(),
            name: vuln.name.clone(),
            severity: vuln.severity,
            scanner: vuln.scanner,
            cve: vuln.cve.clone(),
            cwe: vuln.cwe.clone(),
            cvss: vuln.cvss,
            port: vuln.port,
            description: vuln.description.clone(),
            solution: vuln.solution.clone(),
            references: vuln.references.clone(),
            proof: vuln.proof.clone(),
            status: VulnStatus::Open,
            provenance: provenance.to_owned(),
            created_at: now,
            updated_at: now,
        }
    }
}
