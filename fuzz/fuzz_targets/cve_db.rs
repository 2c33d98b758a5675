#![no_main]

use libfuzzer_sys::fuzz_target;
use trawler_parser::LocalCveDb;

fuzz_target!(|data: &[u8]| {
    let Ok(json) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(db) = LocalCveDb::from_json(json) {
        let _ = db.get("CVE-2021-44228");
    }
});
