//! 프로세스 감독 -- 직접 exec, 출력 캡처, 타임아웃/취소 시 종료 에스컬레이션
//!
//! 셸을 거치지 않고 [`tokio::process::Command`]로 직접 실행합니다.
//! stdout/stderr는 별도 태스크가 공유 버퍼로 점진적으로 읽으므로, 강제 종료
//! 이후에도 그때까지의 부분 출력이 남습니다.
//!
//! 자식은 자신의 프로세스 그룹에서 실행되며, 시그널은 그룹 전체(`-pgid`)로 보냅니다.
//! 따라서 도구가 띄운 손자 프로세스도 함께 종료됩니다.
//!
//! # 종료 절차
//! 1. `libc::kill(-pgid, SIGTERM)`
//! 2. grace 기간 동안 종료 대기
//! 3. 살아 있으면 그룹에 SIGKILL
//! 4. 남은 grace 기간 안에서 리더 태스크 수거, 이후 그룹에 SIGKILL
//!
//! 전체 대기 시간은 timeout + grace + [`READER_SLACK`]을 넘지 않습니다.

use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use trawler_core::config::ExecutorConfig;
use trawler_core::metrics as m;

use crate::error::ExecutionError;
use crate::validator::CommandSpec;

const READ_CHUNK: usize = 8 * 1024;

/// 그룹 SIGKILL 이후 리더가 EOF를 읽을 때까지 기다리는 시간
pub const READER_SLACK: Duration = Duration::from_millis(100);

/// 실행 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// 종료 코드 0이면 true
    pub success: bool,
    /// 통합 보고서 (`[DURATION]`, stdout, `[STDERR]`, `[TIMEOUT]`)
    pub output: String,
    /// 캡처된 stdout
    pub stdout: String,
    /// 캡처된 stderr
    pub stderr: String,
    /// 종료 코드 (시그널 종료/미실행 시 None)
    pub exit_code: Option<i32>,
    /// 실패 설명
    pub error: Option<String>,
    /// 실행 시간
    pub duration: Duration,
    /// 타임아웃으로 종료되었는지 여부
    pub timed_out: bool,
    /// 취소로 종료되었는지 여부
    pub cancelled: bool,
    /// 출력 상한으로 잘렸는지 여부
    pub truncated: bool,
    /// 프로세스 생성에 성공했는지 여부
    pub spawned: bool,
}

impl ExecutionResult {
    fn spawn_failure(tool: &str, reason: String, duration: Duration) -> Self {
        let error = ExecutionError::Spawn {
            tool: tool.to_owned(),
            reason,
        }
        .to_string();
        Self {
            success: false,
            output: format!("{}\n[ERROR] {error}\n", duration_line(duration)),
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            error: Some(error),
            duration,
            timed_out: false,
            cancelled: false,
            truncated: false,
            spawned: false,
        }
    }

    /// 메트릭 `result` 레이블 값
    pub fn result_label(&self) -> &'static str {
        if !self.spawned {
            "spawn_failure"
        } else if self.timed_out {
            "timeout"
        } else if self.cancelled {
            "cancelled"
        } else if self.success {
            "success"
        } else {
            "failure"
        }
    }
}

/// 감독자 설정
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// SIGTERM 이후 SIGKILL까지 대기 시간
    pub kill_grace: Duration,
    /// 스트림별 최대 캡처 바이트
    pub max_output_bytes: usize,
    /// 호출자가 지정하지 않았을 때 적용할 타임아웃 (None = 무제한)
    pub default_timeout: Option<Duration>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::from(&ExecutorConfig::default())
    }
}

impl From<&ExecutorConfig> for SupervisorConfig {
    fn from(config: &ExecutorConfig) -> Self {
        Self {
            kill_grace: Duration::from_secs(config.kill_grace_secs),
            max_output_bytes: config.max_output_bytes,
            default_timeout: (config.default_timeout_secs > 0)
                .then(|| Duration::from_secs(config.default_timeout_secs)),
        }
    }
}

/// 스트림 캡처 버퍼
#[derive(Debug)]
struct Capture {
    data: Vec<u8>,
    limit: usize,
    dropped: usize,
}

impl Capture {
    fn new(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit,
            dropped: 0,
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        let room = self.limit.saturating_sub(self.data.len());
        let take = room.min(chunk.len());
        self.data.extend_from_slice(&chunk[..take]);
        self.dropped += chunk.len() - take;
    }

    fn render(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.data).into_owned();
        if self.dropped > 0 {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&format!(
                "[TRUNCATED] output exceeded {} bytes, {} bytes dropped\n",
                self.limit, self.dropped
            ));
        }
        text
    }
}

type SharedCapture = Arc<Mutex<Capture>>;

fn spawn_reader<R>(mut reader: R, capture: SharedCapture) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => capture
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(&buf[..n]),
                Err(e) => {
                    debug!(error = %e, "output reader stopped");
                    break;
                }
            }
        }
    })
}

/// 대기 결과
enum WaitOutcome {
    Exited(std::io::Result<ExitStatus>),
    TimedOut(Duration),
    Cancelled,
}

/// 프로세스 감독자
#[derive(Debug, Clone, Default)]
pub struct ProcessSupervisor {
    config: SupervisorConfig,
}

impl ProcessSupervisor {
    /// 설정으로 감독자를 생성합니다.
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config }
    }

    /// 감독자 설정을 반환합니다.
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// 요청된 타임아웃을 정규화합니다. `Some(0)`은 무제한입니다.
    pub fn effective_timeout(&self, requested: Option<Duration>) -> Option<Duration> {
        requested
            .or(self.config.default_timeout)
            .filter(|d| !d.is_zero())
    }

    /// 명령을 실행합니다 (취소 불가).
    pub async fn run(&self, spec: &CommandSpec, timeout: Option<Duration>) -> ExecutionResult {
        self.run_with_cancel(spec, timeout, &CancellationToken::new())
            .await
    }

    /// 취소 토큰과 함께 명령을 실행합니다.
    ///
    /// 실패(생성 실패 포함)는 `Err`가 아니라 `success = false`인 결과로 반환됩니다.
    pub async fn run_with_cancel(
        &self,
        spec: &CommandSpec,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let timeout = self.effective_timeout(timeout);
        let started = Instant::now();

        let mut command = Command::new(spec.program());
        command
            .args(spec.program_args())
            .env("TERM", "xterm")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(tool = spec.tool(), error = %e, "failed to spawn process");
                let result =
                    ExecutionResult::spawn_failure(spec.program(), e.to_string(), started.elapsed());
                record_finished(&result);
                return result;
            }
        };

        // 그룹 리더이므로 pgid == pid
        let pgid = child.id();
        counter!(m::JOBS_STARTED_TOTAL).increment(1);
        info!(
            tool = spec.tool(),
            pid = pgid,
            timeout_secs = timeout.map(|d| d.as_secs_f64()),
            "process started"
        );

        let stdout_capture = Arc::new(Mutex::new(Capture::new(self.config.max_output_bytes)));
        let stderr_capture = Arc::new(Mutex::new(Capture::new(self.config.max_output_bytes)));
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, Arc::clone(&stdout_capture)));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, Arc::clone(&stderr_capture)));
        }

        let outcome = tokio::select! {
            status = child.wait() => WaitOutcome::Exited(status),
            () = deadline(timeout) => WaitOutcome::TimedOut(timeout.unwrap_or_default()),
            () = cancel.cancelled() => WaitOutcome::Cancelled,
        };

        let stopping = !matches!(outcome, WaitOutcome::Exited(_));
        let stop_deadline = tokio::time::Instant::now() + self.config.kill_grace;
        let (status, failure) = match outcome {
            WaitOutcome::Exited(Ok(status)) => (Some(status), None),
            WaitOutcome::Exited(Err(e)) => (None, Some(ExecutionError::Wait(e.to_string()))),
            WaitOutcome::TimedOut(limit) => {
                warn!(tool = spec.tool(), limit = %format_limit(limit), "process timed out");
                let status = self.terminate(&mut child, pgid, stop_deadline).await;
                (
                    status,
                    Some(ExecutionError::TimedOut {
                        limit: format_limit(limit),
                    }),
                )
            }
            WaitOutcome::Cancelled => {
                info!(tool = spec.tool(), "process cancelled");
                let status = self.terminate(&mut child, pgid, stop_deadline).await;
                (status, Some(ExecutionError::Cancelled))
            }
        };

        drain_readers(readers, stop_deadline, pgid).await;
        if stopping && let Some(pgid) = pgid {
            signal_group(pgid, libc::SIGKILL);
        }
        let duration = started.elapsed();

        let failure = failure.or_else(|| status.and_then(exit_failure));
        let exit_code = status.and_then(|s| s.code());
        let success = failure.is_none() && exit_code == Some(0);

        let (stdout, stdout_truncated) = render_capture(&stdout_capture);
        let (stderr, stderr_truncated) = render_capture(&stderr_capture);
        let timed_out = matches!(failure, Some(ExecutionError::TimedOut { .. }));
        let cancelled = matches!(failure, Some(ExecutionError::Cancelled));

        let output = build_report(duration, &stdout, &stderr, failure.as_ref());

        let result = ExecutionResult {
            success,
            output,
            stdout,
            stderr,
            exit_code,
            error: failure.map(|e| e.to_string()),
            duration,
            timed_out,
            cancelled,
            truncated: stdout_truncated || stderr_truncated,
            spawned: true,
        };

        record_finished(&result);
        info!(
            tool = spec.tool(),
            success = result.success,
            exit_code = result.exit_code,
            duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            "process finished"
        );
        result
    }

    /// 그룹에 SIGTERM을 보내고 `stop_deadline`까지 기다린 뒤 SIGKILL로 회수합니다.
    async fn terminate(
        &self,
        child: &mut Child,
        pgid: Option<u32>,
        stop_deadline: tokio::time::Instant,
    ) -> Option<ExitStatus> {
        if let Some(pgid) = pgid {
            signal_group(pgid, libc::SIGTERM);
        }

        match tokio::time::timeout_at(stop_deadline, child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                warn!(error = %e, "wait after SIGTERM failed");
                None
            }
            Err(_) => {
                warn!(
                    grace_secs = self.config.kill_grace.as_secs_f64(),
                    "process ignored SIGTERM, sending SIGKILL"
                );
                if let Some(pgid) = pgid {
                    signal_group(pgid, libc::SIGKILL);
                }
                if let Err(e) = child.start_kill() {
                    debug!(error = %e, "SIGKILL to leader failed");
                }
                child.wait().await.ok()
            }
        }
    }
}

/// 리더 태스크를 `deadline`까지 수거합니다.
///
/// 파이프를 잡은 자손이 남아 EOF가 오지 않으면 그룹에 SIGKILL을 보내고
/// [`READER_SLACK`] 후 중단합니다.
async fn drain_readers(
    readers: Vec<JoinHandle<()>>,
    deadline: tokio::time::Instant,
    pgid: Option<u32>,
) {
    let mut pending = Vec::new();
    for mut handle in readers {
        if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
            pending.push(handle);
        }
    }
    if pending.is_empty() {
        return;
    }

    if let Some(pgid) = pgid {
        debug!(pgid, "descendants still hold output pipes, killing group");
        signal_group(pgid, libc::SIGKILL);
    }
    let slack = tokio::time::Instant::now() + READER_SLACK;
    for mut handle in pending {
        if tokio::time::timeout_at(slack, &mut handle).await.is_err() {
            debug!("output reader did not finish in time, aborting");
            handle.abort();
        }
    }
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending::<()>().await,
    }
}

fn signal_group(pgid: u32, signal: libc::c_int) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: kill(2)은 메모리 안전성에 영향을 주지 않습니다. 음수 pid는 자식이
    // 리더인 프로세스 그룹을 가리키며, 그룹에 구성원이 남아 있는 동안 ID는 재사용되지 않습니다.
    let rc = unsafe { libc::kill(-pgid, signal) };
    if rc != 0 {
        debug!(pgid, signal, error = %std::io::Error::last_os_error(), "group signal not delivered");
    }
}

#[cfg(unix)]
fn exit_failure(status: ExitStatus) -> Option<ExecutionError> {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(0), _) => None,
        (Some(code), _) => Some(ExecutionError::NonZeroExit { code }),
        (None, Some(signal)) => Some(ExecutionError::Signaled { signal }),
        (None, None) => Some(ExecutionError::Wait("unknown exit status".to_owned())),
    }
}

#[cfg(not(unix))]
fn exit_failure(status: ExitStatus) -> Option<ExecutionError> {
    match status.code() {
        Some(0) => None,
        Some(code) => Some(ExecutionError::NonZeroExit { code }),
        None => Some(ExecutionError::Wait("unknown exit status".to_owned())),
    }
}

fn render_capture(capture: &SharedCapture) -> (String, bool) {
    let guard = capture.lock().unwrap_or_else(PoisonError::into_inner);
    (guard.render(), guard.dropped > 0)
}

fn record_finished(result: &ExecutionResult) {
    counter!(m::JOBS_FINISHED_TOTAL, m::LABEL_RESULT => result.result_label()).increment(1);
    histogram!(m::JOB_DURATION_SECONDS).record(result.duration.as_secs_f64());
}

fn duration_line(duration: Duration) -> String {
    format!("[DURATION] {:.3}s", duration.as_secs_f64())
}

/// 제한 시간 표시 (`30s`, `1.500s`)
fn format_limit(limit: Duration) -> String {
    if limit.subsec_nanos() == 0 {
        format!("{}s", limit.as_secs())
    } else {
        format!("{:.3}s", limit.as_secs_f64())
    }
}

fn push_section(report: &mut String, text: &str) {
    report.push_str(text);
    if !text.is_empty() && !text.ends_with('\n') {
        report.push('\n');
    }
}

/// 통합 보고서를 만듭니다. `[TIMEOUT]`/`[CANCELLED]` 마커는 항상 마지막입니다.
fn build_report(
    duration: Duration,
    stdout: &str,
    stderr: &str,
    failure: Option<&ExecutionError>,
) -> String {
    let mut report = duration_line(duration);
    report.push('\n');
    push_section(&mut report, stdout);
    if !stderr.is_empty() {
        report.push_str("[STDERR]\n");
        push_section(&mut report, stderr);
    }
    match failure {
        Some(err @ ExecutionError::TimedOut { .. }) => {
            report.push_str(&format!("[TIMEOUT] {err}\n"));
        }
        Some(err @ ExecutionError::Cancelled) => {
            report.push_str(&format!("[CANCELLED] {err}\n"));
        }
        _ => {}
    }
    report
}
