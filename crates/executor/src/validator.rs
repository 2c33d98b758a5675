//! 명령 검증기 -- 허용 목록, 셸 인젝션 패턴, 타겟 치환
//!
//! 검증을 통과한 명령만 [`CommandSpec`]이 되며, 실행 계층은 `CommandSpec`만
//! 받습니다. 검증 순서:
//!
//! 1. 빈 명령 (`Empty`)
//! 2. 금지 패턴 / 제어 문자 (`ForbiddenPattern`)
//! 3. 토큰화 (`UnterminatedQuote`, `NoTokens`)
//! 4. sudo 접두어 분리 (`sudo` 단독이면 `NoTokens`)
//! 5. 허용 목록 (`ToolNotAllowed`)
//! 6. sudo 사용 가능 여부 (`SudoUnavailable`)
//! 7. 설치 여부 (`ToolNotInstalled`)

use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use tracing::{debug, warn};

use trawler_core::metrics as m;

use crate::error::ValidationError;
use crate::registry::{SUDO, ToolRegistry};
use crate::tokenizer::tokenize;

/// 셸 메타문자 패턴 (부분 문자열 검사)
pub const FORBIDDEN_PATTERNS: &[&str] = &[";", "&", "|", "`", "$(", "${"];

/// 타겟 치환 자리표시자
pub const PLACEHOLDERS: &[&str] = &["$IP", "$TARGET", "$HOST", "$DOMAIN", "$URL"];

/// 타겟 최대 길이 (DNS 이름 최대 길이)
pub const MAX_TARGET_LEN: usize = 253;

/// 검증된 명령
///
/// 검증 후 불변이며, 타겟 치환은 새 `CommandSpec`을 반환합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    raw: String,
    tokens: Vec<String>,
    tool: String,
    args: Vec<String>,
    sudo: bool,
}

impl CommandSpec {
    pub(crate) fn from_parts(tool: impl Into<String>, args: Vec<String>, sudo: bool) -> Self {
        let tool = tool.into();
        let mut tokens = Vec::with_capacity(args.len() + 2);
        if sudo {
            tokens.push(SUDO.to_owned());
        }
        tokens.push(tool.clone());
        tokens.extend(args.iter().cloned());
        Self {
            raw: tokens.join(" "),
            tokens,
            tool,
            args,
            sudo,
        }
    }

    /// 원본 명령 문자열 (치환 후에는 치환된 argv의 표시 형태)
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// 전체 토큰 (sudo 포함)
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// 실행할 도구 이름
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// 도구 인자
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// sudo 접두어 여부
    pub fn sudo(&self) -> bool {
        self.sudo
    }

    /// exec 할 프로그램 (`sudo` 또는 도구)
    pub fn program(&self) -> &str {
        if self.sudo { SUDO } else { &self.tool }
    }

    /// 프로그램에 전달할 인자
    pub fn program_args(&self) -> &[String] {
        if self.sudo {
            &self.tokens[1..]
        } else {
            &self.args
        }
    }

    /// 전체 argv
    pub fn argv(&self) -> Vec<String> {
        self.tokens.clone()
    }

    /// 인자 중 자리표시자가 있는지 확인합니다.
    pub fn has_placeholder(&self) -> bool {
        self.args.iter().any(|arg| contains_placeholder(arg))
    }

    /// 타겟을 자리표시자에 치환한 새 명령을 반환합니다.
    ///
    /// 치환은 인자 토큰 단위로 이루어지므로 타겟은 하나의 argv 슬롯을 벗어나지
    /// 않습니다. 자리표시자가 없으면 타겟을 마지막 인자로 덧붙입니다.
    ///
    /// # Errors
    ///
    /// 타겟이 비어 있거나, 금지 패턴/공백을 포함하거나, `-`로 시작하거나,
    /// 253자를 넘으면 [`ValidationError::InvalidTarget`]을 반환합니다.
    pub fn bind_target(&self, target: &str) -> Result<CommandSpec, ValidationError> {
        validate_target(target)?;

        let args = if self.has_placeholder() {
            self.args
                .iter()
                .map(|arg| substitute(arg, target))
                .collect()
        } else {
            let mut args = self.args.clone();
            args.push(target.to_owned());
            args
        };

        // `$$TARGET` + `(x` 처럼 치환 결과가 새 금지 패턴을 만들 수 있음
        for arg in &args {
            if let Err(ValidationError::ForbiddenPattern { pattern }) = check_forbidden(arg) {
                return Err(ValidationError::InvalidTarget {
                    target: target.chars().take(64).collect(),
                    reason: format!("substitution produces forbidden pattern '{pattern}'"),
                });
            }
        }

        Ok(Self::from_parts(self.tool.clone(), args, self.sudo))
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

fn contains_placeholder(token: &str) -> bool {
    PLACEHOLDERS.iter().any(|p| token.contains(p))
}

fn substitute(token: &str, target: &str) -> String {
    PLACEHOLDERS
        .iter()
        .fold(token.to_owned(), |acc, p| acc.replace(p, target))
}

/// 금지 패턴 또는 제어 문자가 있으면 에러를 반환합니다.
pub fn check_forbidden(input: &str) -> Result<(), ValidationError> {
    if let Some(pattern) = FORBIDDEN_PATTERNS.iter().find(|p| input.contains(*p)) {
        return Err(ValidationError::ForbiddenPattern {
            pattern: (*pattern).to_owned(),
        });
    }
    if let Some(c) = input.chars().find(|c| c.is_control()) {
        return Err(ValidationError::ForbiddenPattern {
            pattern: format!("\\x{:02x}", u32::from(c)),
        });
    }
    Ok(())
}

/// 치환할 타겟을 검증합니다.
pub fn validate_target(target: &str) -> Result<(), ValidationError> {
    let reject = |reason: &str| ValidationError::InvalidTarget {
        target: target.chars().take(64).collect(),
        reason: reason.to_owned(),
    };

    if target.is_empty() {
        return Err(reject("target is empty"));
    }
    if target.chars().count() > MAX_TARGET_LEN {
        return Err(reject("target exceeds 253 characters"));
    }
    if target.starts_with('-') {
        return Err(reject("target must not start with '-'"));
    }
    if target.chars().any(char::is_whitespace) {
        return Err(reject("target must not contain whitespace"));
    }
    if let Err(ValidationError::ForbiddenPattern { pattern }) = check_forbidden(target) {
        return Err(reject(&format!("target contains forbidden pattern '{pattern}'")));
    }
    Ok(())
}

/// 명령 검증기
#[derive(Debug, Clone)]
pub struct CommandValidator {
    registry: Arc<ToolRegistry>,
}

impl CommandValidator {
    /// 공유 레지스트리로 검증기를 생성합니다.
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// 레지스트리 참조를 반환합니다.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 명령 문자열을 검증하여 [`CommandSpec`]을 반환합니다.
    pub fn validate(&self, raw: &str) -> Result<CommandSpec, ValidationError> {
        match self.check(raw) {
            Ok(spec) => {
                debug!(tool = spec.tool(), sudo = spec.sudo(), "command validated");
                Ok(spec)
            }
            Err(err) => {
                counter!(m::VALIDATION_REJECTED_TOTAL, m::LABEL_REASON => err.reason_label())
                    .increment(1);
                warn!(error = %err, "command rejected");
                Err(err)
            }
        }
    }

    /// 명령을 검증하고 타겟을 치환합니다.
    pub fn validate_for_target(
        &self,
        raw: &str,
        target: &str,
    ) -> Result<CommandSpec, ValidationError> {
        let spec = self.validate(raw)?;
        spec.bind_target(target).inspect_err(|err| {
            counter!(m::VALIDATION_REJECTED_TOTAL, m::LABEL_REASON => err.reason_label())
                .increment(1);
        })
    }

    fn check(&self, raw: &str) -> Result<CommandSpec, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Empty);
        }

        check_forbidden(trimmed)?;

        let tokens = tokenize(trimmed)?;
        let Some(first) = tokens.first() else {
            return Err(ValidationError::NoTokens);
        };

        let sudo = first == SUDO;
        let tool_index = usize::from(sudo);
        let Some(tool) = tokens.get(tool_index) else {
            return Err(ValidationError::NoTokens);
        };

        // `sudo -u root nmap` 같은 sudo 옵션과 경로 형태는 모두 거부
        if tool.is_empty()
            || tool.starts_with('-')
            || tool.contains('/')
            || !self.registry.is_allowed(tool)
        {
            return Err(ValidationError::ToolNotAllowed { tool: tool.clone() });
        }

        if sudo && !self.registry.sudo_available() {
            return Err(ValidationError::SudoUnavailable);
        }

        if !self.registry.is_available(tool) {
            return Err(ValidationError::ToolNotInstalled { tool: tool.clone() });
        }

        let args = tokens[tool_index + 1..].to_vec();
        let mut spec = CommandSpec::from_parts(tool.clone(), args, sudo);
        spec.raw = trimmed.to_owned();
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::registry::tests::MockProbe;

    fn validator_with(installed: &[&str], allow_sudo: bool) -> CommandValidator {
        let registry = ToolRegistry::new(
            ["nmap", "nuclei", "ffuf", "gobuster"],
            allow_sudo,
            MockProbe::installed(installed),
        );
        CommandValidator::new(Arc::new(registry))
    }

    fn validator() -> CommandValidator {
        validator_with(&["nmap", "nuclei", "ffuf", "gobuster", "sudo"], false)
    }

    #[test]
    fn accepts_allowlisted_command() {
        let spec = validator().validate("nmap -sV -sC $IP").unwrap();
        assert_eq!(spec.tool(), "nmap");
        assert_eq!(spec.args(), ["-sV", "-sC", "$IP"]);
        assert!(!spec.sudo());
        assert_eq!(spec.raw(), "nmap -sV -sC $IP");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let spec = validator().validate("   nmap 10.0.0.1  ").unwrap();
        assert_eq!(spec.raw(), "nmap 10.0.0.1");
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(validator().validate("   "), Err(ValidationError::Empty));
    }

    #[test]
    fn rejects_each_forbidden_pattern() {
        let v = validator();
        for (input, pattern) in [
            ("nmap 10.0.0.1; rm -rf /", ";"),
            ("nmap 10.0.0.1 & sleep 1", "&"),
            ("nmap 10.0.0.1 | tee out", "|"),
            ("nmap `id`", "`"),
            ("nmap $(whoami)", "$("),
            ("nmap ${HOME}", "${"),
        ] {
            assert_eq!(
                v.validate(input),
                Err(ValidationError::ForbiddenPattern {
                    pattern: pattern.to_owned()
                }),
                "input: {input}"
            );
        }
    }

    #[test]
    fn rejects_control_characters() {
        let err = validator().validate("nmap 10.0.0.1\nid").unwrap_err();
        assert_eq!(
            err,
            ValidationError::ForbiddenPattern {
                pattern: "\\x0a".to_owned()
            }
        );
    }

    #[test]
    fn forbidden_inside_quotes_is_still_rejected() {
        let err = validator().validate(r#"nmap "a;b""#).unwrap_err();
        assert!(matches!(err, ValidationError::ForbiddenPattern { .. }));
    }

    #[test]
    fn rejects_unterminated_quote() {
        assert_eq!(
            validator().validate(r#"nmap "10.0.0.1"#),
            Err(ValidationError::UnterminatedQuote)
        );
    }

    #[test]
    fn rejects_quotes_only_as_not_allowed() {
        // `""`는 빈 토큰 하나가 되어 도구 이름이 빈 문자열
        assert_eq!(
            validator().validate(r#""""#),
            Err(ValidationError::ToolNotAllowed {
                tool: String::new()
            })
        );
    }

    #[test]
    fn rejects_lone_sudo() {
        assert_eq!(validator().validate("sudo"), Err(ValidationError::NoTokens));
    }

    #[test]
    fn rejects_unlisted_tool() {
        assert_eq!(
            validator().validate("rm -rf /"),
            Err(ValidationError::ToolNotAllowed {
                tool: "rm".to_owned()
            })
        );
    }

    #[test]
    fn rejects_path_tool() {
        assert_eq!(
            validator().validate("/usr/bin/nmap 10.0.0.1"),
            Err(ValidationError::ToolNotAllowed {
                tool: "/usr/bin/nmap".to_owned()
            })
        );
    }

    #[test]
    fn rejects_sudo_option_injection() {
        let v = validator_with(&["nmap", "sudo"], true);
        assert_eq!(
            v.validate("sudo -u root nmap"),
            Err(ValidationError::ToolNotAllowed {
                tool: "-u".to_owned()
            })
        );
    }

    #[test]
    fn rejects_sudo_when_disabled() {
        assert_eq!(
            validator().validate("sudo nmap -sS 10.0.0.1"),
            Err(ValidationError::SudoUnavailable)
        );
    }

    #[test]
    fn rejects_sudo_when_not_installed() {
        let v = validator_with(&["nmap"], true);
        assert_eq!(
            v.validate("sudo nmap -sS 10.0.0.1"),
            Err(ValidationError::SudoUnavailable)
        );
    }

    #[test]
    fn accepts_sudo_when_enabled_and_installed() {
        let v = validator_with(&["nmap", "sudo"], true);
        let spec = v.validate("sudo nmap -sS 10.0.0.1").unwrap();
        assert!(spec.sudo());
        assert_eq!(spec.program(), "sudo");
        assert_eq!(spec.program_args(), ["nmap", "-sS", "10.0.0.1"]);
        assert_eq!(spec.argv(), vec!["sudo", "nmap", "-sS", "10.0.0.1"]);
    }

    #[test]
    fn rejects_not_installed_tool() {
        let v = validator_with(&["nmap"], false);
        assert_eq!(
            v.validate("nuclei -u http://x"),
            Err(ValidationError::ToolNotInstalled {
                tool: "nuclei".to_owned()
            })
        );
    }

    #[test]
    fn binds_placeholder_per_token() {
        let spec = validator().validate("nmap -sV -sC $IP").unwrap();
        let bound = spec.bind_target("10.0.0.5").unwrap();
        assert_eq!(bound.argv(), vec!["nmap", "-sV", "-sC", "10.0.0.5"]);
        assert!(!bound.has_placeholder());
        assert_eq!(bound.raw(), "nmap -sV -sC 10.0.0.5");
    }

    #[test]
    fn binds_placeholder_inside_token() {
        let spec = validator().validate("ffuf -u $URL/FUZZ -H Host:$HOST").unwrap();
        let bound = spec.bind_target("example.com").unwrap();
        assert_eq!(bound.args(), ["-u", "example.com/FUZZ", "-H", "Host:example.com"]);
    }

    #[test]
    fn appends_target_without_placeholder() {
        let spec = validator().validate("nmap -sV").unwrap();
        let bound = spec.bind_target("scanme.nmap.org").unwrap();
        assert_eq!(bound.argv(), vec!["nmap", "-sV", "scanme.nmap.org"]);
    }

    #[test]
    fn rejects_target_that_forms_forbidden_pattern() {
        let spec = validator().validate("nmap $$TARGET").unwrap();
        let err = spec.bind_target("(x").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidTarget { .. }));
        assert!(err.to_string().contains("$("));
    }

    #[test]
    fn binding_keeps_sudo() {
        let v = validator_with(&["nmap", "sudo"], true);
        let bound = v
            .validate("sudo nmap -sS $TARGET")
            .unwrap()
            .bind_target("10.1.1.1")
            .unwrap();
        assert_eq!(bound.argv(), vec!["sudo", "nmap", "-sS", "10.1.1.1"]);
    }

    #[test]
    fn rejects_bad_targets() {
        let spec = validator().validate("nmap $IP").unwrap();
        for target in [
            "",
            "-oN /tmp/x",
            "--script=evil",
            "10.0.0.1 10.0.0.2",
            "a;b",
            "$(id)",
            "x|y",
            "a\tb",
        ] {
            assert!(
                matches!(
                    spec.bind_target(target),
                    Err(ValidationError::InvalidTarget { .. })
                ),
                "target: {target:?}"
            );
        }
        let long = "a".repeat(MAX_TARGET_LEN + 1);
        assert!(spec.bind_target(&long).is_err());
        let max = "a".repeat(MAX_TARGET_LEN);
        assert!(spec.bind_target(&max).is_ok());
    }

    #[test]
    fn validate_for_target_combines_both_steps() {
        let spec = validator()
            .validate_for_target("gobuster dir -u http://$HOST/", "10.0.0.9")
            .unwrap();
        assert_eq!(spec.args(), ["dir", "-u", "http://10.0.0.9/"]);
    }

    proptest! {
        #[test]
        fn any_forbidden_pattern_is_rejected(
            prefix in "[a-z0-9 .-]{0,20}",
            suffix in "[a-z0-9 .-]{0,20}",
            idx in 0usize..FORBIDDEN_PATTERNS.len(),
        ) {
            let input = format!("nmap {prefix}{}{suffix}", FORBIDDEN_PATTERNS[idx]);
            let result = validator().validate(&input);
            let is_forbidden = matches!(result, Err(ValidationError::ForbiddenPattern { .. }));
            prop_assert!(is_forbidden);
        }

        #[test]
        fn unlisted_tools_are_rejected(tool in "[a-z]{1,12}") {
            prop_assume!(!["nmap", "nuclei", "ffuf", "gobuster", "sudo"].contains(&tool.as_str()));
            let result = validator().validate(&format!("{tool} -h"));
            prop_assert_eq!(result, Err(ValidationError::ToolNotAllowed { tool }));
        }

        #[test]
        fn bound_target_stays_in_one_slot(target in "[a-z0-9][a-z0-9.:-]{0,40}") {
            let spec = validator().validate("nmap -p 80 $IP").unwrap();
            let bound = spec.bind_target(&target).unwrap();
            prop_assert_eq!(bound.args().len(), 3);
            prop_assert_eq!(&bound.args()[2], &target);
        }

        #[test]
        fn validate_never_panics(input in "\\PC{0,80}") {
            let _ = validator().validate(&input);
        }
    }
}
