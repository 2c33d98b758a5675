#![no_main]

use libfuzzer_sys::fuzz_target;
use trawler_core::types::ScannerKind;
use trawler_parser::ParserRouter;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let router = ParserRouter::default();

    if let Ok(parsed) = router.parse(&text) {
        assert_eq!(parsed.scan.raw_output, text);
        for host in &parsed.scan.hosts {
            assert!(host.services.iter().all(|s| s.port > 0));
        }
    }

    // 탐지와 무관하게 모든 추출기가 패닉 없이 동작해야 함
    for kind in ScannerKind::ALL {
        let _ = router.parse_as(kind, &text);
    }
});
