//! In-memory page storage for deterministic testing.
//!
//! Pages live in a map keyed by page index. A seeded RNG drives fault
//! injection so the same seed always produces the same sequence of failures.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::storage::io::{StorageError, StorageManager};
use crate::storage::page::{Page, PageIndex};

/// Configuration for fault injection.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Probability of a read error (0.0 - 1.0).
    pub read_error_rate: f64,
    /// Probability of a write error (0.0 - 1.0).
    pub write_error_rate: f64,
    /// Probability of a sync error (0.0 - 1.0).
    pub sync_error_rate: f64,
}

impl FaultConfig {
    /// Create a fault config with no faults.
    #[must_use]
    pub fn no_faults() -> Self {
        Self::default()
    }

    /// Every write fails.
    #[must_use]
    pub const fn failing_writes() -> Self {
        Self {
            read_error_rate: 0.0,
            write_error_rate: 1.0,
            sync_error_rate: 0.0,
        }
    }

    /// Every read fails.
    #[must_use]
    pub const fn failing_reads() -> Self {
        Self {
            read_error_rate: 1.0,
            write_error_rate: 0.0,
            sync_error_rate: 0.0,
        }
    }
}

/// Statistics about storage operations.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorageStats {
    /// Number of page reads.
    pub reads: u64,
    /// Number of page writes.
    pub writes: u64,
    /// Number of syncs.
    pub syncs: u64,
    /// Number of injected read errors.
    pub injected_read_errors: u64,
    /// Number of injected write errors.
    pub injected_write_errors: u64,
    /// Number of injected sync errors.
    pub injected_sync_errors: u64,
}

/// In-memory page storage.
///
/// Not thread-safe; the tree is single-threaded.
#[derive(Debug)]
pub struct MemoryStorage {
    pages: HashMap<PageIndex, Page>,
    fault_config: FaultConfig,
    rng: StdRng,
    stats: MemoryStorageStats,
}

impl MemoryStorage {
    /// Create an empty store with the given seed and no faults.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, FaultConfig::default())
    }

    /// Create an empty store with custom fault configuration.
    #[must_use]
    pub fn with_config(seed: u64, fault_config: FaultConfig) -> Self {
        Self {
            pages: HashMap::new(),
            fault_config,
            rng: StdRng::seed_from_u64(seed),
            stats: MemoryStorageStats::default(),
        }
    }

    /// Get the current statistics.
    #[must_use]
    pub const fn stats(&self) -> &MemoryStorageStats {
        &self.stats
    }

    /// Update the fault configuration.
    pub fn set_fault_config(&mut self, config: FaultConfig) {
        self.fault_config = config;
    }

    /// Check if a fault should be injected based on the given rate.
    fn should_inject_fault(&mut self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        self.rng.random::<f64>() < rate
    }
}

impl StorageManager for MemoryStorage {
    fn read_page(&mut self, index: PageIndex) -> Result<Page, StorageError> {
        self.stats.reads += 1;

        if self.should_inject_fault(self.fault_config.read_error_rate) {
            self.stats.injected_read_errors += 1;
            return Err(StorageError::InjectedFault(format!(
                "simulated read error at page {index}"
            )));
        }

        Ok(self.pages.get(&index).cloned().unwrap_or_default())
    }

    fn write_page(&mut self, index: PageIndex, page: &Page) -> Result<(), StorageError> {
        self.stats.writes += 1;

        if self.should_inject_fault(self.fault_config.write_error_rate) {
            self.stats.injected_write_errors += 1;
            return Err(StorageError::InjectedFault(format!(
                "simulated write error at page {index}"
            )));
        }

        self.pages.insert(index, page.clone());
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        self.stats.syncs += 1;

        if self.should_inject_fault(self.fault_config.sync_error_rate) {
            self.stats.injected_sync_errors += 1;
            return Err(StorageError::InjectedFault("simulated sync error".to_string()));
        }

        Ok(())
    }
}
