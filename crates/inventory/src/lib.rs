#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: 도메인 에러 타입 (`ReconcileError`)
//! - [`model`]: 인벤토리 엔티티와 가져오기 요약 (`Scope`, `Host`, `Service`, `Vulnerability`)
//! - [`store`]: 저장소 협력자 트레이트와 구현 (`InventoryStore`, `MemoryStore`, `JsonFileStore`)
//! - [`resolve`]: 호스트명 해석 (`HostResolver`, `DnsResolver`, `StaticResolver`)
//! - [`reconcile`]: 조정 엔진 (`Reconciler`)

pub mod error;
pub mod model;
pub mod reconcile;
pub mod resolve;
pub mod store;

// --- Public API Re-exports ---

pub use error::ReconcileError;
pub use model::{EntityCounts, Host, ImportSummary, Scope, Service, VulnStatus, Vulnerability};
pub use reconcile::Reconciler;
pub use resolve::{DnsResolver, HostResolver, StaticResolver};
pub use store::{InventoryStore, JsonFileStore, MemoryStore, Snapshot};
