//! 인벤토리 저장소 협력자
//!
//! [`InventoryStore`]는 조정 엔진이 사용하는 조회/생성/갱신 표면입니다. 모든 메서드는
//! [`Scope`]로 범위가 제한되며, 다른 범위의 엔티티는 보이지도 바뀌지도 않습니다.
//!
//! # 구현
//!
//! - [`MemoryStore`]: 프로세스 메모리에 보관합니다. 테스트와 다른 구현의 기반으로 씁니다.
//! - [`JsonFileStore`]: 쓰기가 끝날 때마다 전체 스냅샷을 JSON 파일로 저장합니다.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use trawler_core::error::StorageError;

use crate::model::{Host, Scope, Service, Vulnerability};

/// 인벤토리 파일 최대 크기 (256 MB)
const MAX_STORE_FILE_SIZE: u64 = 256 * 1024 * 1024;

/// 인벤토리 저장소 협력자
///
/// 구현체는 `Send + Sync`여야 하며 조정 엔진이 `&self`로 동시에 호출할 수 있습니다.
pub trait InventoryStore: Send + Sync {
    /// 범위 안의 모든 호스트
    fn get_hosts(
        &self,
        scope: &Scope,
    ) -> impl Future<Output = Result<Vec<Host>, StorageError>> + Send;

    /// 호스트를 저장하고 저장된 값을 반환합니다.
    fn create_host(
        &self,
        scope: &Scope,
        host: Host,
    ) -> impl Future<Output = Result<Host, StorageError>> + Send;

    /// 같은 ID의 호스트를 교체합니다. 없으면 `StorageError::NotFound`.
    fn update_host(
        &self,
        scope: &Scope,
        host: &Host,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// 호스트에 속한 서비스
    fn get_services(
        &self,
        scope: &Scope,
        host_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Service>, StorageError>> + Send;

    /// 서비스를 저장하고 저장된 값을 반환합니다.
    fn create_service(
        &self,
        scope: &Scope,
        service: Service,
    ) -> impl Future<Output = Result<Service, StorageError>> + Send;

    /// 같은 ID의 서비스를 교체합니다.
    fn update_service(
        &self,
        scope: &Scope,
        service: &Service,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// 범위 안의 모든 취약점
    fn get_vulnerabilities(
        &self,
        scope: &Scope,
    ) -> impl Future<Output = Result<Vec<Vulnerability>, StorageError>> + Send;

    /// 취약점을 저장하고 저장된 값을 반환합니다.
    fn create_vulnerability(
        &self,
        scope: &Scope,
        vulnerability: Vulnerability,
    ) -> impl Future<Output = Result<Vulnerability, StorageError>> + Send;

    /// 같은 ID의 취약점을 교체합니다.
    fn update_vulnerability(
        &self,
        scope: &Scope,
        vulnerability: &Vulnerability,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// 한 범위의 엔티티 묶음
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeInventory {
    pub scope: Option<Scope>,
    pub hosts: Vec<Host>,
    pub services: Vec<Service>,
    pub vulnerabilities: Vec<Vulnerability>,
}

/// 저장소 전체 스냅샷 (JSON 파일 형식)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub scopes: Vec<ScopeInventory>,
}

impl Snapshot {
    /// 범위의 엔티티 묶음
    pub fn scope(&self, scope: &Scope) -> Option<&ScopeInventory> {
        self.scopes.iter().find(|s| s.scope.as_ref() == Some(scope))
    }
}

/// 메모리 저장소
#[derive(Debug, Default)]
pub struct MemoryStore {
    scopes: RwLock<HashMap<Scope, ScopeInventory>>,
}

fn replace<T: Clone>(
    items: &mut [T],
    item: &T,
    id_of: impl Fn(&T) -> Uuid,
    entity: &'static str,
) -> Result<(), StorageError> {
    let id = id_of(item);
    match items.iter_mut().find(|existing| id_of(existing) == id) {
        Some(slot) => {
            *slot = item.clone();
            Ok(())
        }
        None => Err(StorageError::NotFound {
            entity,
            id: id.to_string(),
        }),
    }
}

impl MemoryStore {
    /// 빈 저장소를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 스냅샷에서 저장소를 복원합니다. 범위가 없는 묶음은 버립니다.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let scopes = snapshot
            .scopes
            .into_iter()
            .filter_map(|inv| inv.scope.clone().map(|scope| (scope, inv)))
            .collect();
        Self {
            scopes: RwLock::new(scopes),
        }
    }

    /// 현재 내용을 스냅샷으로 복사합니다. 범위 순서는 회사/프로젝트 기준으로 정렬합니다.
    pub async fn snapshot(&self) -> Snapshot {
        let guard = self.scopes.read().await;
        let mut scopes: Vec<ScopeInventory> = guard.values().cloned().collect();
        scopes.sort_by(|a, b| {
            let key = |s: &ScopeInventory| {
                s.scope
                    .as_ref()
                    .map(|sc| (sc.company_id.clone(), sc.project_id.clone()))
            };
            key(a).cmp(&key(b))
        });
        Snapshot { scopes }
    }

    /// 범위 안의 엔티티 수 `(hosts, services, vulnerabilities)`
    pub async fn counts(&self, scope: &Scope) -> (usize, usize, usize) {
        let guard = self.scopes.read().await;
        guard.get(scope).map_or((0, 0, 0), |inv| {
            (inv.hosts.len(), inv.services.len(), inv.vulnerabilities.len())
        })
    }

    async fn with_scope<T>(&self, scope: &Scope, f: impl FnOnce(&mut ScopeInventory) -> T) -> T {
        let mut guard = self.scopes.write().await;
        let inv = guard.entry(scope.clone()).or_insert_with(|| ScopeInventory {
            scope: Some(scope.clone()),
            ..ScopeInventory::default()
        });
        f(inv)
    }
}

impl InventoryStore for MemoryStore {
    async fn get_hosts(&self, scope: &Scope) -> Result<Vec<Host>, StorageError> {
        let guard = self.scopes.read().await;
        Ok(guard.get(scope).map(|inv| inv.hosts.clone()).unwrap_or_default())
    }

    async fn create_host(&self, scope: &Scope, host: Host) -> Result<Host, StorageError> {
        let host = self
            .with_scope(scope, |inv| {
                inv.hosts.push(host.clone());
                host
            })
            .await;
        Ok(host)
    }

    async fn update_host(&self, scope: &Scope, host: &Host) -> Result<(), StorageError> {
        self.with_scope(scope, |inv| replace(&mut inv.hosts, host, |h| h.id, "host"))
            .await
    }

    async fn get_services(&self, scope: &Scope, host_id: Uuid) -> Result<Vec<Service>, StorageError> {
        let guard = self.scopes.read().await;
        Ok(guard
            .get(scope)
            .map(|inv| {
                inv.services
                    .iter()
                    .filter(|s| s.host_id == host_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_service(&self, scope: &Scope, service: Service) -> Result<Service, StorageError> {
        self.with_scope(scope, |inv| {
            if !inv.hosts.iter().any(|h| h.id == service.host_id) {
                return Err(StorageError::NotFound {
                    entity: "host",
                    id: service.host_id.to_string(),
                });
            }
            inv.services.push(service.clone());
            Ok(service)
        })
        .await
    }

    async fn update_service(&self, scope: &Scope, service: &Service) -> Result<(), StorageError> {
        self.with_scope(scope, |inv| replace(&mut inv.services, service, |s| s.id, "service"))
            .await
    }

    async fn get_vulnerabilities(&self, scope: &Scope) -> Result<Vec<Vulnerability>, StorageError> {
        let guard = self.scopes.read().await;
        Ok(guard
            .get(scope)
            .map(|inv| inv.vulnerabilities.clone())
            .unwrap_or_default())
    }

    async fn create_vulnerability(
        &self,
        scope: &Scope,
        vulnerability: Vulnerability,
    ) -> Result<Vulnerability, StorageError> {
        let vulnerability = self
            .with_scope(scope, |inv| {
                inv.vulnerabilities.push(vulnerability.clone());
                vulnerability
            })
            .await;
        Ok(vulnerability)
    }

    async fn update_vulnerability(
        &self,
        scope: &Scope,
        vulnerability: &Vulnerability,
    ) -> Result<(), StorageError> {
        self.with_scope(scope, |inv| {
            replace(&mut inv.vulnerabilities, vulnerability, |v| v.id, "vulnerability")
        })
        .await
    }
}

/// JSON 파일 저장소
///
/// 쓰기마다 스냅샷 전체를 임시 파일에 쓴 뒤 rename으로 교체합니다.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
    persist_lock: Mutex<()>,
}

impl JsonFileStore {
    /// 파일에서 저장소를 엽니다. 파일이 없으면 빈 저장소로 시작합니다.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        let snapshot = match tokio::fs::metadata(&path).await {
            Ok(metadata) => {
                if metadata.len() > MAX_STORE_FILE_SIZE {
                    return Err(StorageError::Connection(format!(
                        "{}: file size {} bytes exceeds maximum {} bytes",
                        path.display(),
                        metadata.len(),
                        MAX_STORE_FILE_SIZE
                    )));
                }
                let content = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| StorageError::Connection(format!("{}: {e}", path.display())))?;
                if content.trim().is_empty() {
                    Snapshot::default()
                } else {
                    serde_json::from_str(&content).map_err(|e| {
                        StorageError::Serialization(format!("{}: {e}", path.display()))
                    })?
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "inventory file not found, starting empty");
                Snapshot::default()
            }
            Err(e) => {
                return Err(StorageError::Connection(format!("{}: {e}", path.display())));
            }
        };

        Ok(Self {
            path,
            inner: MemoryStore::from_snapshot(snapshot),
            persist_lock: Mutex::new(()),
        })
    }

    /// 저장 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }


    async fn persist(&self) -> Result<(), StorageError> {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.inner.snapshot().await;
        let json = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Query(format!("{}: {e}", parent.display())))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| StorageError::Query(format!("{}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StorageError::Query(format!("{}: {e}", self.path.display())))?;
        debug!(path = %self.path.display(), bytes = json.len(), "inventory persisted");
        Ok(())
    }
}

impl InventoryStore for JsonFileStore {
    async fn get_hosts(&self, scope: &Scope) -> Result<Vec<Host>, StorageError> {
        self.inner.get_hosts(scope).await
    }

    async fn create_host(&self, scope: &Scope, host: Host) -> Result<Host, StorageError> {
        let host = self.inner.create_host(scope, host).await?;
        self.persist().await?;
        Ok(host)
    }

    async fn update_host(&self, scope: &Scope, host: &Host) -> Result<(), StorageError> {
        self.inner.update_host(scope, host).await?;
        self.persist().await
    }

    async fn get_services(&self, scope: &Scope, host_id: Uuid) -> Result<Vec<Service>, StorageError> {
        self.inner.get_services(scope, host_id).await
    }

    async fn create_service(&self, scope: &Scope, service: Service) -> Result<Service, StorageError> {
        let service = self.inner.create_service(scope, service).await?;
        self.persist().await?;
        Ok(service)
    }

    async fn update_service(&self, scope: &Scope, service: &Service) -> Result<(), StorageError> {
        self.inner.update_service(scope, service).await?;
        self.persist().await
    }

    async fn get_vulnerabilities(&self, scope: &Scope) -> Result<Vec<Vulnerability>, StorageError> {
        self.inner.get_vulnerabilities(scope).await
    }

    async fn create_vulnerability(
        &self,
        scope: &Scope,
        vulnerability: Vulnerability,
    ) -> Result<Vulnerability, StorageError> {
        let vulnerability = self.inner.create_vulnerability(scope, vulnerability).await?;
        self.persist().await?;
        Ok(vulnerability)
    }

    async fn update_vulnerability(
        &self,
        scope: &Scope,
        vulnerability: &Vulnerability,
    ) -> Result<(), StorageError> {
        self.inner.update_vulnerability(scope, vulnerability).await?;
        self.persist().await
    }
}
