//! Scan Registry: identity → scan state, with every access serialized per identity
//!
//! Each identity owns its own mutex, so completions for one index never wait
//! on another. The map lock is only held to look up or install an entry, and
//! never while waiting on an entry lock from another path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, warn};

use crate::types::SymbolResult;

/// State of one run. `progress` is the length of `results`, so the two can
/// never disagree.
#[derive(Debug)]
struct ScanEntry {
    generation: u64,
    running: bool,
    total: usize,
    results: Vec<SymbolResult>,
    last_updated: Option<DateTime<Utc>>,
}

impl ScanEntry {
    fn new(generation: u64, total: usize) -> Self {
        Self {
            generation,
            running: true,
            total,
            results: Vec::with_capacity(total),
            last_updated: None,
        }
    }
}

/// Proof that a run was accepted; completions must present it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTicket {
    identity: String,
    generation: u64,
}

impl RunTicket {
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

/// Counters snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanStatus {
    pub running: bool,
    pub progress: usize,
    pub total: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Accumulated records snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanResults {
    pub results: Vec<SymbolResult>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// In-memory, process-lifetime registry of scans
#[derive(Default)]
pub struct ScanRegistry {
    entries: RwLock<HashMap<String, Arc<Mutex<ScanEntry>>>>,
    next_generation: AtomicU64,
}

impl ScanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, identity: &str) -> Option<Arc<Mutex<ScanEntry>>> {
        self.entries.read().get(identity).cloned()
    }

    /// Install a fresh running entry for `identity`, replacing a finished one.
    /// Returns `None` while a run for `identity` is still in flight.
    pub fn begin_run(&self, identity: &str, total: usize) -> Option<RunTicket> {
        let mut entries = self.entries.write();

        if let Some(existing) = entries.get(identity) {
            if existing.lock().running {
                debug!(identity, "Scan already running, start rejected");
                return None;
            }
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        entries.insert(
            identity.to_string(),
            Arc::new(Mutex::new(ScanEntry::new(generation, total))),
        );

        Some(RunTicket {
            identity: identity.to_string(),
            generation,
        })
    }

    /// Append one result and advance progress. Returns `false` (and changes
    /// nothing) if the run was superseded, already finished, or full.
    pub fn record_completion(&self, ticket: &RunTicket, result: SymbolResult) -> bool {
        let Some(entry) = self.entry(&ticket.identity) else {
            debug!(identity = %ticket.identity, "Completion for unknown scan dropped");
            return false;
        };
        let mut entry = entry.lock();

        if entry.generation != ticket.generation || !entry.running {
            debug!(identity = %ticket.identity, symbol = %result.symbol, "Completion for stale run dropped");
            return false;
        }
        if entry.results.len() >= entry.total {
            warn!(identity = %ticket.identity, symbol = %result.symbol, "Completion beyond scan total dropped");
            return false;
        }

        entry.results.push(result);
        entry.last_updated = Some(Utc::now());
        true
    }

    /// Mark the run finished. Idempotent; ignores superseded tickets.
    pub fn finish_run(&self, ticket: &RunTicket) {
        if let Some(entry) = self.entry(&ticket.identity) {
            let mut entry = entry.lock();
            if entry.generation == ticket.generation {
                entry.running = false;
            }
        }
    }

    /// Counters for `identity`; zero values when it was never started
    pub fn status(&self, identity: &str) -> ScanStatus {
        match self.entry(identity) {
            Some(entry) => {
                let entry = entry.lock();
                ScanStatus {
                    running: entry.running,
                    progress: entry.results.len(),
                    total: entry.total,
                    last_updated: entry.last_updated,
                }
            }
            None => ScanStatus::default(),
        }
    }

    /// Records for `identity` in completion order; empty when it was never started
    pub fn results(&self, identity: &str) -> ScanResults {
        match self.entry(identity) {
            Some(entry) => {
                let entry = entry.lock();
                ScanResults {
                    results: entry.results.clone(),
                    last_updated: entry.last_updated,
                }
            }
            None => ScanResults::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn result(symbol: &str) -> SymbolResult {
        SymbolResult {
            symbol: symbol.to_string(),
            last_price: Some(dec!(100)),
            momentum_return: Some(dec!(1.5)),
            mean_rev_return: None,
        }
    }

    #[test]
    fn test_unknown_identity_defaults() {
        let registry = ScanRegistry::new();
        assert_eq!(
            registry.status("NOPE"),
            ScanStatus {
                running: false,
                progress: 0,
                total: 0,
                last_updated: None,
            }
        );
        assert_eq!(registry.results("NOPE"), ScanResults::default());
    }

    #[test]
    fn test_begin_run_installs_fresh_entry() {
        let registry = ScanRegistry::new();
        let ticket = registry.begin_run("TESTIDX", 3).unwrap();
        assert_eq!(ticket.identity(), "TESTIDX");

        let status = registry.status("TESTIDX");
        assert!(status.running);
        assert_eq!(status.progress, 0);
        assert_eq!(status.total, 3);
        assert_eq!(status.last_updated, None);
    }

    #[test]
    fn test_second_begin_rejected_while_running() {
        let registry = ScanRegistry::new();
        let ticket = registry.begin_run("TESTIDX", 2).unwrap();
        assert!(registry.begin_run("TESTIDX", 5).is_none());
        // Rejection leaves the running entry untouched
        assert_eq!(registry.status("TESTIDX").total, 2);

        // Other identities are independent
        assert!(registry.begin_run("OTHER", 1).is_some());

        registry.finish_run(&ticket);
        assert!(registry.begin_run("TESTIDX", 5).is_some());
    }

    #[test]
    fn test_record_completion_keeps_progress_and_results_together() {
        let registry = ScanRegistry::new();
        let ticket = registry.begin_run("TESTIDX", 2).unwrap();

        assert!(registry.record_completion(&ticket, result("A")));
        let status = registry.status("TESTIDX");
        let results = registry.results("TESTIDX");
        assert_eq!(status.progress, 1);
        assert_eq!(results.results.len(), 1);
        assert!(status.last_updated.is_some());
        assert_eq!(status.last_updated, results.last_updated);

        assert!(registry.record_completion(&ticket, result("B")));
        // Full: a third completion cannot push progress past total
        assert!(!registry.record_completion(&ticket, result("C")));
        assert_eq!(registry.status("TESTIDX").progress, 2);
    }

    #[test]
    fn test_new_run_resets_results() {
        let registry = ScanRegistry::new();
        let first = registry.begin_run("TESTIDX", 1).unwrap();
        registry.record_completion(&first, result("OLD"));
        registry.finish_run(&first);

        let second = registry.begin_run("TESTIDX", 1).unwrap();
        assert!(registry.results("TESTIDX").results.is_empty());
        assert_eq!(registry.status("TESTIDX").last_updated, None);

        // Completions and finishes from the superseded run are ignored
        assert!(!registry.record_completion(&first, result("STALE")));
        registry.finish_run(&first);
        assert!(registry.status("TESTIDX").running);

        assert!(registry.record_completion(&second, result("NEW")));
        let symbols: Vec<String> = registry
            .results("TESTIDX")
            .results
            .into_iter()
            .map(|r| r.symbol)
            .collect();
        assert_eq!(symbols, vec!["NEW".to_string()]);
    }

    #[test]
    fn test_finish_run_idempotent() {
        let registry = ScanRegistry::new();
        let ticket = registry.begin_run("TESTIDX", 0).unwrap();
        registry.finish_run(&ticket);
        registry.finish_run(&ticket);
        assert!(!registry.status("TESTIDX").running);
        assert!(!registry.record_completion(&ticket, result("LATE")));
    }

    #[test]
    fn test_snapshots_are_repeatable() {
        let registry = ScanRegistry::new();
        let ticket = registry.begin_run("TESTIDX", 3).unwrap();
        registry.record_completion(&ticket, result("A"));

        assert_eq!(registry.status("TESTIDX"), registry.status("TESTIDX"));
        assert_eq!(registry.results("TESTIDX"), registry.results("TESTIDX"));
    }

    #[test]
    fn test_concurrent_begin_accepts_exactly_one() {
        let registry = ScanRegistry::new();
        let accepted: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| s.spawn(|| registry.begin_run("TESTIDX", 4).is_some()))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap() as usize)
                .sum()
        });
        assert_eq!(accepted, 1);
    }

    #[test]
    fn test_concurrent_completions_never_tear() {
        let registry = ScanRegistry::new();
        let ticket = registry.begin_run("TESTIDX", 400).unwrap();

        std::thread::scope(|s| {
            for t in 0..4 {
                let registry = &registry;
                let ticket = &ticket;
                s.spawn(move || {
                    for i in 0..100 {
                        registry.record_completion(ticket, result(&format!("S{}-{}", t, i)));
                    }
                });
            }
            s.spawn(|| {
                for _ in 0..200 {
                    let status = registry.status("TESTIDX");
                    assert!(status.progress <= status.total);
                    let results = registry.results("TESTIDX");
                    assert!(results.results.len() <= 400);
                }
            });
        });

        assert_eq!(registry.status("TESTIDX").progress, 400);
        assert_eq!(registry.results("TESTIDX").results.len(), 400);
    }
}
