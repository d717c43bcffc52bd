use super::Backend;
use crate::model::{QueryOutcome, QueryStats};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One scripted answer to a statistics poll.
#[derive(Debug, Clone)]
pub enum FakeStats {
    NotReady,
    Fails(String),
    Ready(QueryStats),
}

#[derive(Debug, Default)]
struct ProbeState {
    executed: Vec<String>,
    stats_polls: u32,
    closes: u32,
}

/// Shared view into what a `FakeBackend` was asked to do, readable after the
/// backend has been boxed and consumed by the runner.
#[derive(Debug, Clone, Default)]
pub struct FakeProbe {
    inner: Arc<Mutex<ProbeState>>,
}

impl FakeProbe {
    pub fn executed(&self) -> Vec<String> {
        self.inner.lock().map(|s| s.executed.clone()).unwrap_or_default()
    }

    pub fn stats_polls(&self) -> u32 {
        self.inner.lock().map(|s| s.stats_polls).unwrap_or_default()
    }

    pub fn closes(&self) -> u32 {
        self.inner.lock().map(|s| s.closes).unwrap_or_default()
    }

    fn with<F: FnOnce(&mut ProbeState)>(&self, f: F) {
        if let Ok(mut s) = self.inner.lock() {
            f(&mut s);
        }
    }
}

/// In-process backend for dry runs and tests.
pub struct FakeBackend {
    failures: Vec<(String, String)>,
    stats: Option<VecDeque<FakeStats>>,
    rows: u64,
    next_id: u64,
    probe: FakeProbe,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            failures: Vec::new(),
            stats: None,
            rows: 1,
            next_id: 0,
            probe: FakeProbe::default(),
        }
    }

    /// Statements containing `pattern` fail with `message`.
    pub fn fail_on(mut self, pattern: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.push((pattern.into(), message.into()));
        self
    }

    /// Enables statistics; each poll consumes the next scripted answer, then `NotReady`.
    pub fn with_stats<I: IntoIterator<Item = FakeStats>>(mut self, script: I) -> Self {
        self.stats = Some(script.into_iter().collect());
        self
    }

    pub fn with_rows(mut self, rows: u64) -> Self {
        self.rows = rows;
        self
    }

    pub fn probe(&self) -> FakeProbe {
        self.probe.clone()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn target(&self) -> String {
        "in-memory".to_string()
    }

    async fn execute(&mut self, sql: &str) -> anyhow::Result<QueryOutcome> {
        self.probe.with(|s| s.executed.push(sql.to_string()));

        if let Some((_, msg)) = self.failures.iter().find(|(p, _)| sql.contains(p.as_str())) {
            anyhow::bail!("{}", msg);
        }

        self.next_id += 1;
        Ok(QueryOutcome {
            query_id: Some(format!("fake-{}", self.next_id)),
            rows: Some(self.rows),
            first_row: Some(format!("({})", sql.len())),
        })
    }

    fn supports_stats(&self) -> bool {
        self.stats.is_some()
    }

    async fn fetch_stats(&mut self, _outcome: &QueryOutcome) -> anyhow::Result<Option<QueryStats>> {
        self.probe.with(|s| s.stats_polls += 1);
        let next = self
            .stats
            .as_mut()
            .and_then(|q| q.pop_front())
            .unwrap_or(FakeStats::NotReady);
        match next {
            FakeStats::NotReady => Ok(None),
            FakeStats::Fails(msg) => Err(anyhow::anyhow!(msg)),
            FakeStats::Ready(stats) => Ok(Some(stats)),
        }
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.probe.with(|s| s.closes += 1);
        Ok(())
    }
}
