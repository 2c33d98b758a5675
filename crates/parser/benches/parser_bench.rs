//! 파서 벤치마크
//!
//! 형식 탐지, nmap XML/텍스트 추출, nuclei 취약점 추출 성능을 측정합니다.

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use trawler_core::types::ScannerKind;
use trawler_parser::{ParserRouter, detect, extract, extract_vulnerabilities};

/// nmap XML 생성 (count개 호스트, 호스트당 3개 포트)
fn generate_nmap_xml(count: usize) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<nmaprun scanner="nmap" start="1709287200" startstr="Fri Mar  1 10:00:00 2024" version="7.94">
"#,
    );
    for i in 0..count {
        xml.push_str(&format!(
            r#"<host><status state="up"/><address addr="10.{}.{}.{}" addrtype="ipv4"/>
<hostnames><hostname name="host-{i}.corp.local" type="PTR"/></hostnames>
<ports>
<port protocol="tcp" portid="22"><state state="open"/><service name="ssh" product="OpenSSH" version="8.9p1"/></port>
<port protocol="tcp" portid="80"><state state="open"/><service name="http" product="nginx" version="1.18.0"/><script id="http-title" output="Welcome &amp; hello"/></port>
<port protocol="tcp" portid="443"><state state="open"/><service name="https" product="nginx" version="1.18.0"/></port>
</ports></host>
"#,
            (i >> 16) & 0xff,
            (i >> 8) & 0xff,
            i & 0xff,
        ));
    }
    xml.push_str("</nmaprun>\n");
    xml
}

/// nmap 텍스트 출력 생성 (count개 호스트)
fn generate_nmap_text(count: usize) -> String {
    let mut text = String::from("Starting Nmap 7.94 ( https://nmap.org ) at 2024-03-01 10:00 UTC\n");
    for i in 0..count {
        text.push_str(&format!(
            "Nmap scan report for host-{i}.corp.local (10.0.{}.{})\nHost is up (0.00042s latency).\n\
             PORT    STATE SERVICE VERSION\n\
             22/tcp  open  ssh     OpenSSH 8.9p1 Ubuntu 3ubuntu0.1 (Ubuntu Linux; protocol 2.0)\n\
             80/tcp  open  http    nginx 1.18.0 (Ubuntu)\n\
             |_http-title: Welcome to nginx!\n\n",
            (i >> 8) & 0xff,
            i & 0xff,
        ));
    }
    text
}

/// nuclei JSONL 생성 (count개 발견)
fn generate_nuclei_jsonl(count: usize) -> String {
    (0..count)
        .map(|i| {
            format!(
                r#"{{"template-id":"CVE-2021-{:05}","info":{{"name":"Finding {i}","severity":"high","classification":{{"cve-id":["CVE-2021-{:05}"],"cvss-score":7.5}}}},"type":"http","host":"http://10.0.0.{}","matched-at":"http://10.0.0.{}/path/{i}","ip":"10.0.0.{}","port":"80"}}"#,
                i,
                i,
                i % 250,
                i % 250,
                i % 250,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn bench_detection(c: &mut Criterion) {
    let xml = generate_nmap_xml(10);
    let text = generate_nmap_text(10);
    let nuclei = generate_nuclei_jsonl(10);
    let unknown = "line without any host tokens\n".repeat(200);

    let mut group = c.benchmark_group("detection");
    group.bench_function("nmap_xml", |b| b.iter(|| detect(black_box(&xml))));
    group.bench_function("nmap_text", |b| b.iter(|| detect(black_box(&text))));
    group.bench_function("nuclei_jsonl", |b| b.iter(|| detect(black_box(&nuclei))));
    // 모든 시그니처를 거친 뒤 generic 폴백까지 도달
    group.bench_function("unknown_fallback", |b| b.iter(|| detect(black_box(&unknown))));
    group.finish();
}

fn bench_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("extraction");

    for count in [10usize, 500] {
        let xml = generate_nmap_xml(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_function(format!("nmap_xml_{count}_hosts"), |b| {
            b.iter(|| extract(ScannerKind::NmapXml, black_box(&xml)))
        });

        let text = generate_nmap_text(count);
        group.bench_function(format!("nmap_text_{count}_hosts"), |b| {
            b.iter(|| extract(ScannerKind::NmapText, black_box(&text)))
        });
    }

    group.finish();
}

fn bench_vulnerabilities(c: &mut Criterion) {
    let jsonl = generate_nuclei_jsonl(1000);

    let mut group = c.benchmark_group("vulnerabilities");
    group.throughput(Throughput::Elements(1000));
    group.bench_function("nuclei_jsonl_1000", |b| {
        b.iter(|| extract_vulnerabilities(ScannerKind::Nuclei, black_box(&jsonl)))
    });

    let router = ParserRouter::default();
    group.bench_function("router_nuclei_1000", |b| {
        b.iter(|| router.parse(black_box(&jsonl)).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_detection, bench_extraction, bench_vulnerabilities);
criterion_main!(benches);
