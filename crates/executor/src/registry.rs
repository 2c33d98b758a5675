//! 도구 레지스트리 -- 허용 목록과 설치 여부 캐시
//!
//! [`ToolRegistry`]는 프로세스 시작 시 한 번 생성되어 `Arc`로 공유됩니다.
//! 설치 여부는 [`ToolProbe`]로 확인하며, 도구별 결과는 레지스트리 수명 동안
//! 메모이즈됩니다.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use serde::Serialize;
use tracing::debug;

use trawler_core::config::ExecutorConfig;

/// sudo 접두어 이름
pub const SUDO: &str = "sudo";

/// 도구 설치 여부 확인기
///
/// 테스트에서는 고정 응답을 주는 목(mock)으로 대체합니다.
pub trait ToolProbe: Send + Sync {
    /// 도구가 실행 가능한 상태로 설치되어 있는지 확인합니다.
    fn is_available(&self, tool: &str) -> bool;
}

/// `PATH` 탐색 기반 확인기 (`command -v`와 동등)
#[derive(Debug, Clone)]
pub struct PathProbe {
    path: Option<OsString>,
}

impl PathProbe {
    /// 현재 프로세스의 `PATH`를 사용합니다.
    pub fn from_env() -> Self {
        Self {
            path: std::env::var_os("PATH"),
        }
    }

    /// 지정한 `PATH` 값을 사용합니다.
    pub fn with_path(path: impl Into<OsString>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }
}

impl ToolProbe for PathProbe {
    fn is_available(&self, tool: &str) -> bool {
        if tool.is_empty() || tool.contains('/') {
            return false;
        }
        let Some(path) = self.path.as_ref() else {
            return false;
        };
        std::env::split_paths(path).any(|dir| is_executable(&dir.join(tool)))
    }
}

#[cfg(unix)]
fn is_executable(candidate: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(candidate)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(candidate: &Path) -> bool {
    candidate.is_file()
}

/// 도구 상태 (CLI `tools` 출력용)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolStatus {
    /// 도구 이름
    pub name: String,
    /// 설치 여부
    pub available: bool,
}

/// 허용 도구 레지스트리
pub struct ToolRegistry {
    allowed: Vec<String>,
    sudo_enabled: bool,
    probe: Box<dyn ToolProbe>,
    cache: RwLock<HashMap<String, bool>>,
}

impl ToolRegistry {
    /// 허용 목록, sudo 허용 여부, 확인기로 레지스트리를 생성합니다.
    ///
    /// `sudo`가 목록에 포함되어 있으면 무시합니다. sudo는 접두어로만 취급됩니다.
    pub fn new(
        allowed: impl IntoIterator<Item = impl Into<String>>,
        sudo_enabled: bool,
        probe: impl ToolProbe + 'static,
    ) -> Self {
        let allowed = allowed
            .into_iter()
            .map(Into::into)
            .filter(|tool: &String| tool != SUDO)
            .collect();
        Self {
            allowed,
            sudo_enabled,
            probe: Box::new(probe),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// 설정에서 레지스트리를 생성합니다 (`PATH` 탐색 사용).
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(
            config.allowed_tools.iter().cloned(),
            config.allow_sudo,
            PathProbe::from_env(),
        )
    }

    /// 허용 목록을 반환합니다.
    pub fn allowed_tools(&self) -> &[String] {
        &self.allowed
    }

    /// 도구가 허용 목록에 있는지 확인합니다.
    pub fn is_allowed(&self, tool: &str) -> bool {
        self.allowed.iter().any(|t| t == tool)
    }

    /// 설정에서 sudo가 활성화되었는지 반환합니다.
    pub fn sudo_enabled(&self) -> bool {
        self.sudo_enabled
    }

    /// sudo 접두어 사용 가능 여부 (활성화 + 설치)
    pub fn sudo_available(&self) -> bool {
        self.sudo_enabled && self.is_available(SUDO)
    }

    /// 도구 설치 여부를 반환합니다. 첫 조회 결과가 캐시됩니다.
    pub fn is_available(&self, tool: &str) -> bool {
        if let Some(&cached) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tool)
        {
            return cached;
        }

        let available = self.probe.is_available(tool);
        debug!(tool, available, "probed tool availability");

        // 동시 최초 기록은 같은 값을 쓰므로 덮어써도 무방
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tool.to_owned(), available);
        available
    }

    /// 캐시된 항목 수를 반환합니다.
    pub fn cached_count(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// 캐시를 비웁니다. 다음 조회 시 다시 확인합니다.
    pub fn refresh(&self) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// 허용 목록 전체의 설치 상태를 반환합니다.
    pub fn statuses(&self) -> Vec<ToolStatus> {
        self.allowed
            .iter()
            .map(|name| ToolStatus {
                name: name.clone(),
                available: self.is_available(name),
            })
            .collect()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("allowed", &self.allowed)
            .field("sudo_enabled", &self.sudo_enabled)
            .field("cached", &self.cached_count())
            .finish()
    }
}
