//! Scan Orchestrator: background, bounded-concurrency scans feeding the registry
//!
//! `start` registers the run and returns at once; a detached driver task keeps
//! up to `concurrency` Per-Symbol Tasks in flight and records every completion.
//! There is no deadline on a single task: a provider call that never returns
//! holds its slot and the run stays `running`. The HTTP providers carry a
//! request timeout, which bounds this in practice.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{error, info};

use crate::provider::MarketDataProvider;
use crate::registry::{RunTicket, ScanRegistry, ScanResults, ScanStatus};
use crate::scanner::{analyze_market, clamp_concurrency, run_symbol_task, scan_market};
use crate::signal_engine::SignalEngine;
use crate::types::{SymbolAnalysis, SymbolResult, WindowSpec};

/// Answer to a start request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartOutcome {
    pub started: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StartOutcome {
    fn started() -> Self {
        Self {
            started: true,
            message: None,
        }
    }

    fn already_running() -> Self {
        Self {
            started: false,
            message: Some("Scan already running".to_string()),
        }
    }
}

/// Drives background scans and serves the one-shot scans over the same
/// provider and signal engine
#[derive(Clone)]
pub struct ScanOrchestrator {
    registry: Arc<ScanRegistry>,
    provider: Arc<dyn MarketDataProvider>,
    engine: Arc<dyn SignalEngine>,
}

impl ScanOrchestrator {
    pub fn new(provider: Arc<dyn MarketDataProvider>, engine: Arc<dyn SignalEngine>) -> Self {
        Self {
            registry: Arc::new(ScanRegistry::new()),
            provider,
            engine,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Start a background scan of `symbols` under `identity`. Returns without
    /// waiting for any symbol; rejected while a run for `identity` is in flight.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        &self,
        identity: &str,
        symbols: Vec<String>,
        window: WindowSpec,
        concurrency: usize,
    ) -> StartOutcome {
        let Some(ticket) = self.registry.begin_run(identity, symbols.len()) else {
            info!(identity, "Scan already running");
            return StartOutcome::already_running();
        };

        let concurrency = clamp_concurrency(concurrency);
        info!(
            identity,
            symbols = symbols.len(),
            concurrency,
            interval = %window.interval,
            provider = self.provider.name(),
            "Background scan started"
        );

        tokio::spawn(drive_run(
            self.registry.clone(),
            self.provider.clone(),
            self.engine.clone(),
            ticket,
            symbols,
            window,
            concurrency,
        ));

        StartOutcome::started()
    }

    pub fn status(&self, identity: &str) -> ScanStatus {
        self.registry.status(identity)
    }

    pub fn results(&self, identity: &str) -> ScanResults {
        self.registry.results(identity)
    }

    /// One-shot scan that bypasses the registry
    pub async fn scan_now(
        &self,
        symbols: &[String],
        window: &WindowSpec,
        concurrency: usize,
    ) -> Vec<SymbolResult> {
        scan_market(
            self.provider.as_ref(),
            self.engine.as_ref(),
            symbols,
            window,
            concurrency,
        )
        .await
    }

    /// One-shot analysis that bypasses the registry
    pub async fn analyze_now(
        &self,
        symbols: &[String],
        window: &WindowSpec,
        concurrency: usize,
    ) -> Vec<SymbolAnalysis> {
        analyze_market(
            self.provider.as_ref(),
            self.engine.as_ref(),
            symbols,
            window,
            concurrency,
        )
        .await
    }
}

async fn drive_run(
    registry: Arc<ScanRegistry>,
    provider: Arc<dyn MarketDataProvider>,
    engine: Arc<dyn SignalEngine>,
    ticket: RunTicket,
    symbols: Vec<String>,
    window: WindowSpec,
    concurrency: usize,
) {
    let started = Instant::now();
    let mut pending = symbols.into_iter();
    let mut workers: JoinSet<SymbolResult> = JoinSet::new();
    let mut in_flight: HashMap<Id, String> = HashMap::new();
    let mut degraded = 0usize;

    loop {
        while workers.len() < concurrency {
            let Some(symbol) = pending.next() else {
                break;
            };
            let provider = provider.clone();
            let engine = engine.clone();
            let window = window.clone();
            let task_symbol = symbol.clone();
            let handle = workers.spawn(async move {
                run_symbol_task(provider.as_ref(), engine.as_ref(), &task_symbol, &window).await
            });
            in_flight.insert(handle.id(), symbol);
        }

        let Some(joined) = workers.join_next_with_id().await else {
            break;
        };
        if record_joined(&registry, &ticket, &mut in_flight, joined) {
            degraded += 1;
        }
    }

    registry.finish_run(&ticket);

    let status = registry.status(ticket.identity());
    info!(
        identity = %ticket.identity(),
        processed = status.progress,
        degraded,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Background scan complete"
    );
}

/// Record one finished worker; a worker that died without a result still
/// counts, as a degraded record. Returns true when the record is degraded.
fn record_joined(
    registry: &ScanRegistry,
    ticket: &RunTicket,
    in_flight: &mut HashMap<Id, String>,
    joined: Result<(Id, SymbolResult), JoinError>,
) -> bool {
    let result = match joined {
        Ok((id, result)) => {
            in_flight.remove(&id);
            result
        }
        // Per-symbol panics are caught inside the task; this is a cancellation
        Err(e) => {
            let Some(symbol) = in_flight.remove(&e.id()) else {
                error!(
                    identity = %ticket.identity(),
                    error = %e,
                    "Unknown scan worker aborted"
                );
                return false;
            };
            error!(
                identity = %ticket.identity(),
                symbol = %symbol,
                error = %e,
                "Scan worker aborted"
            );
            SymbolResult::degraded(symbol)
        }
    };
    let is_degraded = result.is_degraded();
    registry.record_completion(ticket, result);
    is_degraded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal_engine::RuleBasedEngine;
    use crate::testing::{FailingEngine, StubBehavior, StubProvider};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn symbols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn orchestrator(provider: StubProvider) -> ScanOrchestrator {
        ScanOrchestrator::new(Arc::new(provider), Arc::new(RuleBasedEngine::default()))
    }

    async fn wait_until_finished(orchestrator: &ScanOrchestrator, identity: &str) -> ScanStatus {
        loop {
            let status = orchestrator.status(identity);
            if !status.running {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_background_scan_records_every_symbol() {
        let orchestrator = orchestrator(
            StubProvider::new()
                .with("A", StubBehavior::Flat(dec!(100)))
                .with("B", StubBehavior::Empty)
                .with("C", StubBehavior::Flat(dec!(50))),
        );

        let outcome = orchestrator.start(
            "TESTIDX",
            symbols(&["A", "B", "C"]),
            WindowSpec::historical(),
            2,
        );
        assert_eq!(outcome, StartOutcome::started());

        let status = wait_until_finished(&orchestrator, "TESTIDX").await;
        assert_eq!(status.progress, 3);
        assert_eq!(status.total, 3);
        assert!(status.last_updated.is_some());

        let mut results = orchestrator.results("TESTIDX").results;
        results.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].last_price, Some(dec!(100)));
        assert_eq!(results[0].momentum_return, Some(Decimal::ZERO));
        // No data: present with null fields rather than left out
        assert_eq!(results[1], SymbolResult::degraded("B"));
        assert_eq!(results[2].last_price, Some(dec!(50)));
    }

    #[tokio::test]
    async fn test_second_start_rejected_while_running() {
        let orchestrator = orchestrator(
            StubProvider::new()
                .with("A", StubBehavior::Flat(dec!(100)))
                .with_delay(Duration::from_millis(50)),
        );

        let first = orchestrator.start("TESTIDX", symbols(&["A"]), WindowSpec::historical(), 1);
        assert!(first.started);

        let second =
            orchestrator.start("TESTIDX", symbols(&["A", "B"]), WindowSpec::historical(), 1);
        assert!(!second.started);
        assert_eq!(second.message.as_deref(), Some("Scan already running"));
        // The rejected start did not touch the running entry
        assert_eq!(orchestrator.status("TESTIDX").total, 1);

        let status = wait_until_finished(&orchestrator, "TESTIDX").await;
        assert_eq!(status.progress, 1);
    }

    #[tokio::test]
    async fn test_rerun_replaces_previous_results() {
        let orchestrator = orchestrator(
            StubProvider::new()
                .with("A", StubBehavior::Flat(dec!(100)))
                .with("B", StubBehavior::Flat(dec!(200))),
        );

        orchestrator.start("TESTIDX", symbols(&["A"]), WindowSpec::historical(), 1);
        wait_until_finished(&orchestrator, "TESTIDX").await;

        let outcome = orchestrator.start("TESTIDX", symbols(&["B"]), WindowSpec::historical(), 1);
        assert!(outcome.started);
        wait_until_finished(&orchestrator, "TESTIDX").await;

        let results = orchestrator.results("TESTIDX").results;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].symbol, "B");
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_limit_bounds_parallelism() {
        let provider = Arc::new(StubProvider::new().with_delay(Duration::from_millis(100)));
        let orchestrator =
            ScanOrchestrator::new(provider.clone(), Arc::new(RuleBasedEngine::default()));
        let names: Vec<String> = (0..10).map(|i| format!("S{}", i)).collect();

        let begin = tokio::time::Instant::now();
        assert!(orchestrator.start("TESTIDX", names, WindowSpec::historical(), 2).started);
        let status = wait_until_finished(&orchestrator, "TESTIDX").await;
        let elapsed = begin.elapsed();

        assert_eq!(status.progress, 10);
        assert_eq!(provider.peak_in_flight(), 2);
        // Five waves of two 100ms fetches
        assert!(elapsed >= Duration::from_millis(500), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(600), "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_progress_never_outruns_results() {
        let orchestrator = orchestrator(StubProvider::new().with_delay(Duration::from_millis(2)));
        let names: Vec<String> = (0..20).map(|i| format!("S{}", i)).collect();

        orchestrator.start("TESTIDX", names, WindowSpec::historical(), 4);
        loop {
            let status = orchestrator.status("TESTIDX");
            assert!(status.progress <= status.total);
            assert!(orchestrator.results("TESTIDX").results.len() <= status.total);
            if !status.running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(orchestrator.results("TESTIDX").results.len(), 20);
    }

    #[tokio::test]
    async fn test_broken_engine_still_completes() {
        let orchestrator = ScanOrchestrator::new(
            Arc::new(
                StubProvider::new()
                    .with("A", StubBehavior::Flat(dec!(100)))
                    .with("B", StubBehavior::Panic),
            ),
            Arc::new(FailingEngine),
        );

        orchestrator.start("TESTIDX", symbols(&["A", "B"]), WindowSpec::live(), 5);
        let status = wait_until_finished(&orchestrator, "TESTIDX").await;

        assert_eq!(status.progress, status.total);
        let results = orchestrator.results("TESTIDX").results;
        assert!(results.iter().all(SymbolResult::is_degraded));
    }

    #[tokio::test]
    async fn test_empty_symbol_list_finishes() {
        let orchestrator = orchestrator(StubProvider::new());
        assert!(orchestrator.start("EMPTY", Vec::new(), WindowSpec::historical(), 5).started);

        let status = wait_until_finished(&orchestrator, "EMPTY").await;
        assert_eq!(status.progress, 0);
        assert_eq!(status.total, 0);
        assert_eq!(status.last_updated, None);
    }

    #[tokio::test]
    async fn test_identities_are_independent() {
        let orchestrator = orchestrator(
            StubProvider::new()
                .with("A", StubBehavior::Flat(dec!(100)))
                .with_delay(Duration::from_millis(20)),
        );

        assert!(orchestrator.start("ONE", symbols(&["A"]), WindowSpec::historical(), 1).started);
        assert!(orchestrator.start("TWO", symbols(&["A"]), WindowSpec::historical(), 1).started);

        assert_eq!(wait_until_finished(&orchestrator, "ONE").await.progress, 1);
        assert_eq!(wait_until_finished(&orchestrator, "TWO").await.progress, 1);
        assert_eq!(orchestrator.status("NEVER"), ScanStatus::default());
    }

    #[tokio::test]
    async fn test_aborted_worker_recorded_as_degraded() {
        let registry = ScanRegistry::new();
        let ticket = registry.begin_run("TESTIDX", 1).unwrap();
        let mut workers: JoinSet<SymbolResult> = JoinSet::new();
        let mut in_flight = HashMap::new();

        let handle = workers.spawn(std::future::pending::<SymbolResult>());
        in_flight.insert(handle.id(), "HUNG".to_string());
        handle.abort();

        let joined = workers.join_next_with_id().await.unwrap();
        assert!(joined.is_err());
        assert!(record_joined(&registry, &ticket, &mut in_flight, joined));
        assert!(in_flight.is_empty());

        registry.finish_run(&ticket);
        let status = registry.status("TESTIDX");
        assert_eq!(status.progress, status.total);
        assert_eq!(registry.results("TESTIDX").results, vec![SymbolResult::degraded("HUNG")]);
    }

    #[tokio::test]
    async fn test_scan_now_skips_registry() {
        let orchestrator =
            orchestrator(StubProvider::new().with("A", StubBehavior::Flat(dec!(100))));
        let results = orchestrator
            .scan_now(&symbols(&["A", "B"]), &WindowSpec::historical(), 5)
            .await;

        assert_eq!(results.len(), 1);
        assert_eq!(orchestrator.status("A"), ScanStatus::default());
    }
}
