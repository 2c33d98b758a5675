//! 저장소 + 조정 엔진 통합 테스트

use std::net::{IpAddr, Ipv4Addr};

use proptest::prelude::*;
use trawler_core::types::{
    HostState, ParsedHost, ParsedScanResult, ParsedService, ParsedVulnerability, PortState,
    Protocol, ScannerKind, Severity,
};
use trawler_inventory::{
    InventoryStore, JsonFileStore, MemoryStore, Reconciler, Scope, StaticResolver,
};

fn scope() -> Scope {
    Scope::new("pentest-2026", "acme")
}

fn resolver() -> StaticResolver {
    StaticResolver::new().with("db01.corp.local", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 20)))
}

fn nmap_like_scan() -> ParsedScanResult {
    let mut db = ParsedHost::new("db01.corp.local");
    db.state = HostState::Up;
    db.os = Some("Linux 5.x".to_owned());
    let mut pg = ParsedService::new("db01.corp.local", 5432, Protocol::Tcp)
        .unwrap()
        .with_state(PortState::Open)
        .with_service("postgresql");
    pg.product = Some("PostgreSQL DB".to_owned());
    pg.version = Some("12.4".to_owned());
    db.services.push(pg);

    let mut web = ParsedHost::new("10.0.0.5");
    web.state = HostState::Up;
    web.services.push(
        ParsedService::new("10.0.0.5", 443, Protocol::Tcp)
            .unwrap()
            .with_state(PortState::Open)
            .with_service("https"),
    );

    ParsedScanResult {
        hosts: vec![db, web],
        ..ParsedScanResult::empty(ScannerKind::NmapXml, "<nmaprun/>")
    }
}

#[tokio::test]
async fn json_store_survives_reopen_and_replay() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("inventory.json");
    let scan = nmap_like_scan();

    {
        let store = JsonFileStore::open(&path).await.unwrap();
        let engine = Reconciler::new(store, resolver());
        let summary = engine.import_scan(&scope(), &scan, &[]).await;
        assert_eq!(summary.hosts.created, 2);
        assert_eq!(summary.services.created, 2);
        assert!(summary.errors.is_empty());
    }

    let store = JsonFileStore::open(&path).await.unwrap();
    let hosts = store.get_hosts(&scope()).await.unwrap();
    let db = hosts
        .iter()
        .find(|h| h.domain.as_deref() == Some("db01.corp.local"))
        .unwrap();
    assert_eq!(db.ip.as_deref(), Some("10.0.0.20"));
    let services = store.get_services(&scope(), db.id).await.unwrap();
    assert_eq!(services[0].protocol, "TCP");
    assert_eq!(services[0].comment.as_deref(), Some("PostgreSQL DB 12.4"));

    let engine = Reconciler::new(store, resolver());
    let replay = engine.import_scan(&scope(), &scan, &[]).await;
    assert_eq!(replay.created(), 0);
    assert_eq!(replay.hosts.skipped, 2);
    assert_eq!(replay.services.skipped, 2);
}

#[tokio::test]
async fn scopes_do_not_see_each_other() {
    let engine = Reconciler::new(MemoryStore::new(), resolver());
    let other = Scope::new("pentest-2026", "globex");
    let scan = nmap_like_scan();

    engine.import_scan(&scope(), &scan, &[]).await;
    let summary = engine.import_scan(&other, &scan, &[]).await;
    assert_eq!(summary.hosts.created, 2);
    assert_eq!(engine.store().counts(&scope()).await, (2, 2, 0));
    assert_eq!(engine.store().counts(&other).await, (2, 2, 0));
}

#[tokio::test]
async fn vulnerabilities_link_to_scanned_hosts() {
    let engine = Reconciler::new(MemoryStore::new(), resolver());
    engine.import_scan(&scope(), &nmap_like_scan(), &[]).await;

    let mut finding = ParsedVulnerability::new(
        ScannerKind::Nuclei,
        "CVE-2021-41773",
        "https://10.0.0.5/cgi-bin/.%2e/etc/passwd",
        "Apache 2.4.49 Path Traversal",
        Severity::Critical,
    );
    finding.cve = Some("CVE-2021-41773".to_owned());
    finding.port = Some(443);

    let summary = engine
        .import_vulnerabilities(&scope(), &[finding], "{\"template-id\":\"CVE-2021-41773\"}", &[])
        .await;
    assert_eq!(summary.vulnerabilities.created, 1);
    assert_eq!(summary.hosts.created, 0);

    let hosts = engine.store().get_hosts(&scope()).await.unwrap();
    let web = hosts.iter().find(|h| h.ip.as_deref() == Some("10.0.0.5")).unwrap();
    let vulns = engine.store().get_vulnerabilities(&scope()).await.unwrap();
    assert_eq!(vulns[0].host_id, Some(web.id));
    assert!(vulns[0].provenance.contains("CVE-2021-41773"));
}

fn arb_scan() -> impl Strategy<Value = ParsedScanResult> {
    let service = (1u16..=1024, prop::bool::ANY, "[a-z]{0,6}");
    let host = (1u8..=254, prop::collection::vec(service, 0..6));
    prop::collection::vec(host, 0..6).prop_map(|hosts| {
        let mut scan = ParsedScanResult::empty(ScannerKind::Masscan, "");
        for (octet, services) in hosts {
            let ip = format!("192.0.2.{octet}");
            if scan.hosts.iter().any(|h| h.ip == ip) {
                continue;
            }
            let mut host = ParsedHost::new(ip.clone());
            for (port, udp, name) in services {
                let protocol = if udp { Protocol::Udp } else { Protocol::Tcp };
                if host.find_service_mut(port, protocol).is_some() {
                    continue;
                }
                if let Some(svc) = ParsedService::new(ip.clone(), port, protocol) {
                    host.services.push(svc.with_state(PortState::Open).with_service(name));
                }
            }
            scan.hosts.push(host);
        }
        scan
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn importing_twice_is_idempotent(scan in arb_scan()) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let engine = Reconciler::new(MemoryStore::new(), StaticResolver::new());
            let first = engine.import_scan(&scope(), &scan, &[]).await;
            prop_assert_eq!(first.hosts.created, scan.host_count());
            prop_assert_eq!(first.services.created, scan.service_count());

            let second = engine.import_scan(&scope(), &scan, &[]).await;
            prop_assert_eq!(second.created(), 0);
            prop_assert_eq!(second.hosts.skipped + second.services.skipped,
                scan.host_count() + scan.service_count());
            Ok(())
        })?;
    }
}
