//! Address-keyed ledger of live allocations.
//!
//! Only populated in peak mode. Lookup by address dominates, so a plain hash
//! map is enough.

use std::collections::HashMap;

/// Exit status used when the ledger cannot allocate its own bookkeeping.
pub const EXIT_LEDGER_FAILURE: i32 = 255;

/// One live block as seen by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationRecord {
    pub address: usize,
    pub size: usize,
}

#[derive(Debug, Default)]
pub struct Ledger {
    records: HashMap<usize, usize>,
    outstanding: usize,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a live block. An existing record at the same address is replaced.
    ///
    /// If the map cannot grow, the process exits with [`EXIT_LEDGER_FAILURE`]:
    /// a ledger that silently drops records would corrupt every later decision.
    pub fn remember(&mut self, address: usize, size: usize) {
        if self.records.try_reserve(1).is_err() {
            ledger_exhausted();
        }
        if let Some(previous) = self.records.insert(address, size) {
            self.outstanding -= previous;
        }
        self.outstanding += size;
    }

    /// Remove the record for `address`, returning its size if it was tracked.
    pub fn forget(&mut self, address: usize) -> Option<usize> {
        let size = self.records.remove(&address)?;
        self.outstanding -= size;
        Some(size)
    }

    pub fn size_of(&self, address: usize) -> Option<usize> {
        self.records.get(&address).copied()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.outstanding = 0;
    }

    /// Sum of all tracked sizes.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Live records in address order.
    pub fn records(&self) -> Vec<AllocationRecord> {
        let mut out: Vec<AllocationRecord> = self
            .records
            .iter()
            .map(|(&address, &size)| AllocationRecord { address, size })
            .collect();
        out.sort_by_key(|r| r.address);
        out
    }
}

#[cold]
fn ledger_exhausted() -> ! {
    eprintln!("libipd_alloc: out of memory while recording an allocation");
    std::process::exit(EXIT_LEDGER_FAILURE)
}
