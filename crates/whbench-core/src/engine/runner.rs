use crate::backends::Backend;
use crate::config::RunSettings;
use crate::engine::clock::{Clock, MonotonicClock};
use crate::engine::record::RecordContext;
use crate::engine::stats::poll_stats;
use crate::model::{ExecutionRecord, QueryOutcome, QuerySpec, RunSummary};
use crate::report::console;
use crate::storage::CsvStore;
use anyhow::Context;
use std::sync::Arc;

pub struct Runner {
    pub store: CsvStore,
    pub settings: RunSettings,
    pub clock: Arc<dyn Clock>,
}

impl Runner {
    pub fn new(settings: RunSettings) -> Self {
        Self {
            store: CsvStore::new(&settings.output),
            settings,
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Runs every query in order and closes the backend afterwards, whether
    /// the batch finished or stopped on a store error.
    pub async fn run(
        &self,
        mut backend: Box<dyn Backend>,
        queries: &[QuerySpec],
    ) -> anyhow::Result<RunSummary> {
        let result = self.run_queries(backend.as_mut(), queries).await;
        if let Err(e) = backend.close().await {
            tracing::warn!(backend = backend.name(), error = %format!("{:#}", e), "failed to close backend");
        }
        result
    }

    async fn run_queries(
        &self,
        backend: &mut dyn Backend,
        queries: &[QuerySpec],
    ) -> anyhow::Result<RunSummary> {
        let ctx = RecordContext {
            backend: backend.name().to_string(),
            target: backend.target(),
            run_type: self.settings.run_type.clone(),
            tag: self.settings.query_tag.clone(),
        };
        tracing::info!(
            backend = %ctx.backend,
            target = %ctx.target,
            queries = queries.len(),
            output = %self.store.path().display(),
            "starting run"
        );
        console::print_run_header(&ctx.backend, &ctx.target, queries.len());

        let mut summary = RunSummary::default();
        for (i, q) in queries.iter().enumerate() {
            if i > 0 && !self.settings.query_delay.is_zero() {
                tokio::time::sleep(self.settings.query_delay).await;
            }
            console::print_query_start(i + 1, queries.len(), &q.description);

            let (rec, outcome) = self.run_one(backend, &ctx, q).await;
            console::print_query_result(&rec, outcome.as_ref());

            self.store
                .append(&rec)
                .with_context(|| format!("failed to record result of '{}'", q.description))?;
            summary.record(&rec);
        }

        tracing::info!(
            attempted = summary.attempted,
            failed = summary.failed,
            "run finished"
        );
        console::print_summary(&summary, self.store.path());
        Ok(summary)
    }

    /// One attempt. Execution errors become a failure record; statistics
    /// problems only leave the statistics empty.
    pub async fn run_one(
        &self,
        backend: &mut dyn Backend,
        ctx: &RecordContext,
        q: &QuerySpec,
    ) -> (ExecutionRecord, Option<QueryOutcome>) {
        let start = self.clock.now_ms();
        let mut outcome = match backend.execute(&q.sql).await {
            Ok(o) => o,
            Err(e) => {
                tracing::warn!(query = %q.description, error = %format!("{:#}", e), "query failed");
                return (ctx.failure(&q.description, &e), None);
            }
        };
        let elapsed = self.clock.now_ms() - start;

        if outcome.query_id.is_none() {
            match backend.resolve_query_id().await {
                Ok(id) => outcome.query_id = id,
                Err(e) => {
                    tracing::warn!(query = %q.description, error = %format!("{:#}", e), "could not resolve query id")
                }
            }
        }

        let stats = if !backend.supports_stats() {
            None
        } else if outcome.query_id.is_none() {
            tracing::debug!(query = %q.description, "no query id, skipping statistics");
            None
        } else {
            poll_stats(backend, &outcome, &self.settings.stats).await.stats
        };

        let rec = ctx.success(&q.description, elapsed, &outcome, stats);
        (rec, Some(outcome))
    }
}
