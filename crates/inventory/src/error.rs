//! 조정 엔진 에러 타입
//!
//! 조정 엔진은 에러로 가져오기를 중단하지 않습니다. [`ReconcileError`]는 단위 작업
//! (호스트 하나, 서비스 하나, 취약점 하나)의 실패를 나타내며 `ImportSummary.errors`에
//! 문자열로 기록됩니다.

use trawler_core::error::{ReconcileFailure, StorageError, TrawlerError};

/// 조정 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// DNS 해석 실패
    #[error("dns resolution failed for '{target}': {reason}")]
    Dns {
        /// 해석 대상 호스트명
        target: String,
        /// 실패 사유
        reason: String,
    },

    /// 저장소 협력자 실패
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<ReconcileError> for TrawlerError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Dns { target, reason } => {
                TrawlerError::Reconcile(ReconcileFailure::Dns { target, reason })
            }
            ReconcileError::Storage(e) => TrawlerError::Storage(e),
        }
    }
}
