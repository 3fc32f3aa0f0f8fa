//! Tracking long-running middleware jobs by polling `core.get_jobs`.
//!
//! Jobs are looked up by id with an exact-match filter, so each poll
//! carries one job's row back instead of the whole job table. The poll
//! cadence backs off from a snappy first interval toward a ceiling,
//! which keeps short jobs fast to observe without hammering the
//! middleware on long ones.

use std::time::Duration;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use tn_ddp::{JobId, JobSnapshot, JobState, Params};

use crate::client::{CallReply, Client};
use crate::error::ClientError;

/// Poll cadence for the job tracker.
///
/// Delay for poll `n` is `initial * factor^n`, capped at `max`.
#[derive(Debug, Clone)]
pub struct PollInterval {
    pub initial: Duration,
    pub factor: f64,
    pub max: Duration,
}

impl Default for PollInterval {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(250),
            factor: 2.0,
            max: Duration::from_secs(5),
        }
    }
}

impl PollInterval {
    /// Delay before poll `n` (0-based; poll 0 happens immediately, so
    /// this is the gap after it).
    pub fn delay_for_poll(&self, n: u32) -> Duration {
        let scaled = self.initial.as_secs_f64() * self.factor.powi(n.min(32) as i32);
        Duration::from_secs_f64(scaled.min(self.max.as_secs_f64()))
    }

    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        if self.initial.is_zero() {
            return Err(ClientError::Config("poll interval must be non-zero".into()));
        }
        if !self.factor.is_finite() || self.factor < 1.0 {
            return Err(ClientError::Config(
                "poll backoff factor must be at least 1.0".into(),
            ));
        }
        Ok(())
    }
}

/// The terminal state of a finished job.
///
/// A failed or aborted job is still a successfully *tracked* job, so
/// this comes back inside `Ok`; inspect [`succeeded`](Self::succeeded)
/// or [`error`](Self::error) to tell the cases apart.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub id: JobId,
    pub state: JobState,
    /// Completion percentage at the final poll.
    pub progress: f64,
    /// The job's result payload; `Null` for failed jobs.
    pub result: Value,
    /// The middleware's failure message, when the job did not succeed.
    pub error: Option<String>,
}

impl JobReport {
    pub fn succeeded(&self) -> bool {
        self.state == JobState::Success
    }

    /// The result payload of a successful job, or the failure message
    /// as a typed error otherwise.
    pub fn into_result(self) -> Result<Value, ClientError> {
        if self.succeeded() {
            Ok(self.result)
        } else {
            Err(ClientError::JobFailed {
                id: self.id,
                state: self.state,
                message: self
                    .error
                    .unwrap_or_else(|| "no failure detail reported".into()),
            })
        }
    }
}

impl From<JobSnapshot> for JobReport {
    fn from(snap: JobSnapshot) -> Self {
        Self {
            id: snap.id,
            state: snap.state,
            progress: snap.percent(),
            result: snap.result,
            error: snap.error,
        }
    }
}

/// What a method ultimately produced: either its direct result, or the
/// report of the job it spawned, already tracked to completion.
#[derive(Debug, Clone)]
pub enum CallOutcome {
    Value(Value),
    Job(JobReport),
}

impl CallOutcome {
    /// Collapse both cases to the payload a caller usually wants,
    /// treating a failed job as an error.
    pub fn into_value(self) -> Result<Value, ClientError> {
        match self {
            Self::Value(v) => Ok(v),
            Self::Job(report) => report.into_result(),
        }
    }
}

impl Client {
    /// Fetch the current snapshot of one job.
    pub async fn query_job(&self, id: JobId) -> Result<JobSnapshot, ClientError> {
        self.query_job_within(id, self.config.call_timeout, &CancellationToken::new())
            .await
    }

    async fn query_job_within(
        &self,
        id: JobId,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<JobSnapshot, ClientError> {
        let filter = Params::positional([json!([["id", "=", id.0]])]);
        let raw = self
            .call_raw_cancellable("core.get_jobs", filter, deadline, cancel)
            .await?;
        let mut jobs: Vec<JobSnapshot> = serde_json::from_value(raw)
            .map_err(|e| ClientError::Protocol(format!("malformed job listing: {e}")))?;
        if jobs.is_empty() {
            return Err(ClientError::Protocol(format!(
                "job {id} not reported by middleware"
            )));
        }
        Ok(jobs.swap_remove(0))
    }

    /// Poll a job until it reaches a terminal state or `timeout`
    /// elapses.
    ///
    /// A job that is already terminal at the first poll returns
    /// immediately. The timeout bounds the whole wait, not a single
    /// poll, and a zero timeout is a configuration error rather than
    /// an instant expiry.
    pub async fn wait_for_job(
        &self,
        id: JobId,
        timeout: Duration,
    ) -> Result<JobReport, ClientError> {
        self.wait_for_job_cancellable(id, timeout, &CancellationToken::new())
            .await
    }

    /// [`wait_for_job`](Self::wait_for_job) that also stops, with
    /// [`ClientError::Cancelled`], when `cancel` fires. Cancellation
    /// is observed within one poll tick.
    pub async fn wait_for_job_cancellable(
        &self,
        id: JobId,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<JobReport, ClientError> {
        if timeout.is_zero() {
            return Err(ClientError::Config("job timeout must be non-zero".into()));
        }
        let deadline = tokio::time::Instant::now() + timeout;

        let mut poll: u32 = 0;
        loop {
            // The wait's budget bounds the whole operation, so a poll
            // against a stalled middleware may not outlive what is
            // left of it.
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(ClientError::Timeout(timeout));
            }
            let poll_deadline = self.config.call_timeout.min(remaining);

            let snapshot = match self.query_job_within(id, poll_deadline, cancel).await {
                Ok(snapshot) => snapshot,
                Err(ClientError::Timeout(_)) => return Err(ClientError::Timeout(timeout)),
                Err(e) => return Err(e),
            };

            tracing::debug!(
                job = %id,
                state = %snapshot.state,
                percent = snapshot.percent(),
                "job polled"
            );

            if snapshot.state.is_terminal() {
                return Ok(snapshot.into());
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(ClientError::Timeout(timeout));
            }
            let delay = self.config.poll.delay_for_poll(poll).min(deadline - now);
            poll = poll.saturating_add(1);

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => return Err(ClientError::Cancelled),
            }
        }
    }

    /// Call a method and, if it spawned a job, track the job to
    /// completion under `timeout`.
    pub async fn call_and_wait(
        &self,
        method: &str,
        params: Params,
        timeout: Duration,
    ) -> Result<CallOutcome, ClientError> {
        match self.call(method, params).await? {
            CallReply::Immediate(value) => Ok(CallOutcome::Value(value)),
            CallReply::Job(id) => {
                tracing::debug!(method, job = %id, "method spawned a job");
                Ok(CallOutcome::Job(self.wait_for_job(id, timeout).await?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_delays_back_off_to_the_ceiling() {
        let poll = PollInterval::default();
        assert_eq!(poll.delay_for_poll(0), Duration::from_millis(250));
        assert_eq!(poll.delay_for_poll(1), Duration::from_millis(500));
        assert_eq!(poll.delay_for_poll(2), Duration::from_secs(1));
        assert_eq!(poll.delay_for_poll(10), Duration::from_secs(5));
        assert_eq!(poll.delay_for_poll(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn poll_validation_rejects_shrinking_factor() {
        let mut poll = PollInterval::default();
        poll.factor = 0.5;
        assert!(poll.validate().is_err());
        poll.factor = 1.0;
        assert!(poll.validate().is_ok());
    }

    #[test]
    fn failed_report_becomes_a_typed_error() {
        let report = JobReport {
            id: JobId(9),
            state: JobState::Failed,
            progress: 40.0,
            result: Value::Null,
            error: Some("dataset busy".into()),
        };
        let err = report.into_result().unwrap_err();
        assert!(matches!(err, ClientError::JobFailed { id: JobId(9), .. }));
        assert!(err.to_string().contains("dataset busy"));
    }

    #[test]
    fn successful_report_yields_its_payload() {
        let report = JobReport {
            id: JobId(3),
            state: JobState::Success,
            progress: 100.0,
            result: json!("rolled back"),
            error: None,
        };
        assert_eq!(report.into_result().unwrap(), json!("rolled back"));
    }
}
