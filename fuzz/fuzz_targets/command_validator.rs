#![no_main]

use std::sync::{Arc, OnceLock};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use trawler_executor::validator::FORBIDDEN_PATTERNS;
use trawler_executor::{CommandValidator, ToolProbe, ToolRegistry};

/// 모든 도구가 설치된 것으로 응답
struct AlwaysInstalled;

impl ToolProbe for AlwaysInstalled {
    fn is_available(&self, _tool: &str) -> bool {
        true
    }
}

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    command: &'a str,
    target: &'a str,
}

fn validator() -> &'static CommandValidator {
    static VALIDATOR: OnceLock<CommandValidator> = OnceLock::new();
    VALIDATOR.get_or_init(|| {
        let registry = ToolRegistry::new(["nmap", "nuclei", "nikto"], true, AlwaysInstalled);
        CommandValidator::new(Arc::new(registry))
    })
}

fuzz_target!(|input: Input<'_>| {
    let _ = trawler_executor::tokenizer::tokenize(input.command);

    let Ok(spec) = validator().validate_for_target(input.command, input.target) else {
        return;
    };
    // 검증을 통과한 명령은 금지 패턴을 포함하지 않음
    for arg in spec.argv() {
        for pattern in FORBIDDEN_PATTERNS {
            assert!(!arg.contains(pattern), "accepted argv contains {pattern:?}");
        }
    }
});
