use crate::backends::Backend;
use crate::config::StatsPolicy;
use crate::model::{QueryOutcome, QueryStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Pending,
    /// `n` polls have come back empty, failed, or without an official time.
    Retry(u32),
    Resolved,
    /// Terminal: the budget ran out before the warehouse reported a time.
    Unresolved,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PollState::Resolved | PollState::Unresolved)
    }

    /// Advances after one poll.
    pub fn next(self, observed_resolved: bool, max_attempts: u32) -> PollState {
        let done = match self {
            PollState::Resolved | PollState::Unresolved => return self,
            _ if observed_resolved => return PollState::Resolved,
            PollState::Pending => 1,
            PollState::Retry(n) => n + 1,
        };
        if done >= max_attempts.max(1) {
            PollState::Unresolved
        } else {
            PollState::Retry(done)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsPoll {
    pub state: PollState,
    pub attempts: u32,
    pub stats: Option<QueryStats>,
}

/// Polls `fetch_stats` until it reports a positive official time or the
/// policy's attempts are used up. Poll errors are logged and count as a
/// retry. An unresolved poll keeps the last partial figures but never a
/// non-positive official time.
pub async fn poll_stats(
    backend: &mut dyn Backend,
    outcome: &QueryOutcome,
    policy: &StatsPolicy,
) -> StatsPoll {
    let mut state = PollState::Pending;
    let mut attempts = 0u32;
    let mut last: Option<QueryStats> = None;

    while !state.is_terminal() {
        if attempts > 0 && !policy.retry_delay.is_zero() {
            tokio::time::sleep(policy.retry_delay).await;
        }
        attempts += 1;

        let resolved = match backend.fetch_stats(outcome).await {
            Ok(Some(stats)) => {
                let ok = stats.is_resolved();
                last = Some(stats);
                ok
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(
                    backend = backend.name(),
                    attempt = attempts,
                    error = %format!("{:#}", e),
                    "statistics poll failed"
                );
                false
            }
        };
        state = state.next(resolved, policy.max_attempts);
        tracing::debug!(attempt = attempts, state = ?state, "statistics poll");
    }

    if state == PollState::Unresolved {
        if let Some(s) = last.as_mut() {
            s.official_time_ms = None;
        }
        tracing::warn!(
            backend = backend.name(),
            query_id = outcome.query_id.as_deref().unwrap_or(""),
            attempts,
            "statistics not available, leaving them empty"
        );
    }

    StatsPoll {
        state,
        attempts,
        stats: last,
    }
}
