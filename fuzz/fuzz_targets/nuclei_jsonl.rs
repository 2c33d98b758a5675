#![no_main]

use libfuzzer_sys::fuzz_target;
use trawler_core::types::ScannerKind;
use trawler_parser::extract_vulnerabilities;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    for vuln in extract_vulnerabilities(ScannerKind::Nuclei, text) {
        assert!(!vuln.template_id.is_empty());
    }
    let _ = extract_vulnerabilities(ScannerKind::Nikto, text);
});
