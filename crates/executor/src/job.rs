//! 비동기 작업 관리 -- 제출, 조회(폴링), 구독, 대기, 취소
//!
//! [`JobManager::submit`]은 즉시 [`JobId`]를 반환하고, 별도 tokio 태스크가
//! 세마포어 허가를 얻은 뒤 [`ProcessSupervisor`]로 명령을 실행합니다.
//! 실패는 작업 기록에 남으며 제출자에게 전파되지 않습니다.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use trawler_core::config::ExecutorConfig;

use crate::error::ExecutorError;
use crate::supervisor::{ExecutionResult, ProcessSupervisor, SupervisorConfig};
use crate::validator::CommandSpec;

/// 작업 식별자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl std::str::FromStr for JobId {
    type Err = ExecutorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| ExecutorError::JobNotFound(s.to_owned()))
    }
}

/// 작업 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// 실행 허가 대기 중
    Queued,
    /// 실행 중
    Running,
    /// 종료 코드 0으로 완료
    Completed,
    /// 실패 (비정상 종료, 생성 실패, 시그널)
    Failed,
    /// 타임아웃으로 종료
    TimedOut,
    /// 취소됨
    Cancelled,
}

impl JobStatus {
    /// 종료 상태인지 확인합니다.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Queued | Self::Running)
    }

    /// 실행 결과에서 종료 상태를 결정합니다.
    pub fn from_result(result: &ExecutionResult) -> Self {
        if result.timed_out {
            Self::TimedOut
        } else if result.cancelled {
            Self::Cancelled
        } else if result.success {
            Self::Completed
        } else {
            Self::Failed
        }
    }

    /// 상태 문자열
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 작업 기록 (조회 시 스냅샷)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// 작업 ID
    pub id: JobId,
    /// 실행 명령 (표시용)
    pub command: String,
    /// 도구 이름
    pub tool: String,
    /// 현재 상태
    pub status: JobStatus,
    /// 제출 시각
    pub submitted_at: DateTime<Utc>,
    /// 실행 시작 시각
    pub started_at: Option<DateTime<Utc>>,
    /// 종료 시각
    pub finished_at: Option<DateTime<Utc>>,
    /// 실행 결과 (종료 후)
    pub result: Option<ExecutionResult>,
}

struct JobEntry {
    record: JobRecord,
    status_tx: watch::Sender<JobStatus>,
    cancel: CancellationToken,
}

type JobTable = Arc<Mutex<HashMap<JobId, JobEntry>>>;

/// 비동기 작업 관리자
#[derive(Clone)]
pub struct JobManager {
    supervisor: Arc<ProcessSupervisor>,
    jobs: JobTable,
    permits: Arc<Semaphore>,
}

impl JobManager {
    /// 감독자와 동시 실행 한도로 관리자를 생성합니다.
    ///
    /// # Errors
    ///
    /// `max_concurrent`가 0이면 [`ExecutorError::Config`]를 반환합니다.
    pub fn new(supervisor: ProcessSupervisor, max_concurrent: usize) -> Result<Self, ExecutorError> {
        if max_concurrent == 0 {
            return Err(ExecutorError::Config {
                field: "max_concurrent_jobs".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        Ok(Self {
            supervisor: Arc::new(supervisor),
            jobs: Arc::new(Mutex::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(max_concurrent)),
        })
    }

    /// 설정에서 관리자를 생성합니다.
    pub fn from_config(config: &ExecutorConfig) -> Result<Self, ExecutorError> {
        Self::new(
            ProcessSupervisor::new(SupervisorConfig::from(config)),
            config.max_concurrent_jobs,
        )
    }

    /// 명령을 제출하고 즉시 작업 ID를 반환합니다.
    pub async fn submit(&self, spec: CommandSpec, timeout: Option<Duration>) -> JobId {
        let id = JobId::new();
        let (status_tx, _) = watch::channel(JobStatus::Queued);
        let cancel = CancellationToken::new();

        let record = JobRecord {
            id,
            command: spec.raw().to_owned(),
            tool: spec.tool().to_owned(),
            status: JobStatus::Queued,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
            result: None,
        };

        self.jobs.lock().await.insert(
            id,
            JobEntry {
                record,
                status_tx,
                cancel: cancel.clone(),
            },
        );
        debug!(job_id = %id, tool = spec.tool(), "job submitted");

        let supervisor = Arc::clone(&self.supervisor);
        let jobs = Arc::clone(&self.jobs);
        let permits = Arc::clone(&self.permits);

        tokio::spawn(async move {
            let permit = tokio::select! {
                permit = permits.acquire_owned() => permit,
                () = cancel.cancelled() => {
                    info!(job_id = %id, "job cancelled before start");
                    finish(&jobs, id, JobStatus::Cancelled, None).await;
                    return;
                }
            };
            let Ok(_permit) = permit else {
                warn!(job_id = %id, "job semaphore closed");
                finish(&jobs, id, JobStatus::Failed, None).await;
                return;
            };

            mark_running(&jobs, id).await;
            let result = supervisor.run_with_cancel(&spec, timeout, &cancel).await;
            let status = JobStatus::from_result(&result);
            info!(job_id = %id, tool = spec.tool(), status = %status, "job finished");
            finish(&jobs, id, status, Some(result)).await;
        });

        id
    }

    /// 작업 기록 스냅샷을 반환합니다.
    pub async fn get(&self, id: JobId) -> Option<JobRecord> {
        self.jobs
            .lock()
            .await
            .get(&id)
            .map(|entry| entry.record.clone())
    }

    /// 작업 상태 변화를 구독합니다.
    pub async fn subscribe(&self, id: JobId) -> Result<watch::Receiver<JobStatus>, ExecutorError> {
        self.jobs
            .lock()
            .await
            .get(&id)
            .map(|entry| entry.status_tx.subscribe())
            .ok_or_else(|| ExecutorError::JobNotFound(id.to_string()))
    }

    /// 작업이 종료될 때까지 기다린 뒤 최종 기록을 반환합니다.
    pub async fn wait(&self, id: JobId) -> Result<JobRecord, ExecutorError> {
        let mut rx = self.subscribe(id).await?;
        // 송신측이 사라져도 최종 기록은 테이블에 남아 있음
        let _ = rx.wait_for(|status| status.is_terminal()).await;
        self.get(id)
            .await
            .ok_or_else(|| ExecutorError::JobNotFound(id.to_string()))
    }

    /// 작업을 취소합니다. 실행 중이면 종료 에스컬레이션이 시작됩니다.
    ///
    /// 이미 종료된 작업의 취소는 아무 효과가 없습니다.
    pub async fn cancel(&self, id: JobId) -> Result<(), ExecutorError> {
        let jobs = self.jobs.lock().await;
        let entry = jobs
            .get(&id)
            .ok_or_else(|| ExecutorError::JobNotFound(id.to_string()))?;
        if !entry.record.status.is_terminal() {
            info!(job_id = %id, "cancelling job");
            entry.cancel.cancel();
        }
        Ok(())
    }

    /// 모든 작업 기록을 제출 순서로 반환합니다.
    pub async fn list(&self) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = self
            .jobs
            .lock()
            .await
            .values()
            .map(|entry| entry.record.clone())
            .collect();
        records.sort_by_key(|r| r.submitted_at);
        records
    }

    /// 종료된 지 `max_age`가 지난 작업 기록을 제거하고 제거 수를 반환합니다.
    pub async fn prune_finished(&self, max_age: Duration) -> usize {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|_, entry| match entry.record.finished_at {
            Some(finished) if entry.record.status.is_terminal() => now - finished < max_age,
            _ => true,
        });
        let pruned = before - jobs.len();
        if pruned > 0 {
            debug!(pruned, "pruned finished jobs");
        }
        pruned
    }
}

impl std::fmt::Debug for JobManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobManager")
            .field("supervisor", &self.supervisor)
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}

async fn mark_running(jobs: &JobTable, id: JobId) {
    let mut jobs = jobs.lock().await;
    if let Some(entry) = jobs.get_mut(&id) {
        entry.record.status = JobStatus::Running;
        entry.record.started_at = Some(Utc::now());
        entry.status_tx.send_replace(JobStatus::Running);
    }
}

async fn finish(jobs: &JobTable, id: JobId, status: JobStatus, result: Option<ExecutionResult>) {
    let mut jobs = jobs.lock().await;
    if let Some(entry) = jobs.get_mut(&id) {
        entry.record.status = status;
        entry.record.finished_at = Some(Utc::now());
        entry.record.result = result;
        entry.status_tx.send_replace(status);
    }
}
