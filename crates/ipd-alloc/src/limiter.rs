//! Budget state machine.
//!
//! The limiter decides whether a request may proceed and books successful
//! requests. It never talks to the heap itself; the interposer calls
//! `check_*` before the heap and `did_*` after it.
//!
//! Invariants:
//! - peak mode: `remaining + ledger.outstanding() == budget`
//! - total mode: `remaining` only decreases until the next reconfiguration

use ipd_core::config::LimitConfig;

use crate::error::{Error, Result};
use crate::ledger::Ledger;
use crate::tracking::HighWater;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitMode {
    /// Nothing configured yet; the first interposed call resolves the environment.
    Uninitialized,
    NoLimit,
    Total,
    Peak,
}

impl LimitMode {
    pub fn enforces(self) -> bool {
        matches!(self, LimitMode::Total | LimitMode::Peak)
    }
}

/// What a resize will book if the heap call succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizePlan {
    pub old_address: usize,
    /// Size in the ledger, `None` when the block is untracked.
    pub old_size: Option<usize>,
    pub new_size: usize,
}

#[derive(Debug)]
pub struct Limiter {
    mode: LimitMode,
    budget: usize,
    remaining: usize,
    ledger: Ledger,
    high_water: HighWater,
}

impl Default for Limiter {
    fn default() -> Self {
        Self::new()
    }
}

impl Limiter {
    pub fn new() -> Self {
        Self {
            mode: LimitMode::Uninitialized,
            budget: 0,
            remaining: 0,
            ledger: Ledger::new(),
            high_water: HighWater::new(),
        }
    }

    /// Reset to `config`, forgetting every tracked block.
    pub fn configure(&mut self, config: LimitConfig) {
        let (mode, budget) = match config {
            LimitConfig::NoLimit => (LimitMode::NoLimit, 0),
            LimitConfig::Total(n) => (LimitMode::Total, n),
            LimitConfig::Peak(n) => (LimitMode::Peak, n),
        };
        self.mode = mode;
        self.budget = budget;
        self.remaining = budget;
        self.ledger.clear();
        self.high_water.reset();
    }

    pub fn set_no_limit(&mut self) {
        self.configure(LimitConfig::NoLimit);
    }

    pub fn set_total_limit(&mut self, bytes: usize) {
        self.configure(LimitConfig::Total(bytes));
    }

    pub fn set_peak_limit(&mut self, bytes: usize) {
        self.configure(LimitConfig::Peak(bytes));
    }

    pub fn is_initialized(&self) -> bool {
        self.mode != LimitMode::Uninitialized
    }

    pub fn mode(&self) -> LimitMode {
        self.mode
    }

    /// Configured budget; 0 when not enforcing.
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Bytes still available. Meaningful only while enforcing.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn high_water(&self) -> usize {
        self.high_water.peak()
    }

    /// Refuse `bytes` if enforcing and it exceeds the remaining budget.
    pub fn check(&self, bytes: usize) -> Result<()> {
        if self.mode.enforces() && bytes > self.remaining {
            return Err(Error::OutOfMemory {
                requested: bytes,
                remaining: self.remaining,
            });
        }
        Ok(())
    }

    /// Book a successful fresh allocation.
    pub fn did_allocate(&mut self, address: usize, bytes: usize) {
        match self.mode {
            LimitMode::Peak => {
                self.ledger.remember(address, bytes);
                self.remaining -= bytes;
                self.high_water.record(self.ledger.outstanding());
            }
            LimitMode::Total => self.remaining -= bytes,
            LimitMode::NoLimit | LimitMode::Uninitialized => {}
        }
    }

    /// Forget a block that is about to be released, crediting peak budget.
    pub fn will_release(&mut self, address: usize) {
        if self.mode == LimitMode::Peak {
            if let Some(size) = self.ledger.forget(address) {
                self.remaining += size;
            }
        }
    }

    /// Decide whether a resize of the block at `address` may go ahead.
    ///
    /// Total mode charges the whole new size. Peak mode charges only growth
    /// beyond the tracked size (untracked blocks count as size 0).
    pub fn check_resize(&self, address: usize, new_size: usize) -> Result<ResizePlan> {
        let old_size = match self.mode {
            LimitMode::Peak => self.ledger.size_of(address),
            _ => None,
        };
        let demand = match self.mode {
            LimitMode::Total => new_size,
            LimitMode::Peak => new_size.saturating_sub(old_size.unwrap_or(0)),
            LimitMode::NoLimit | LimitMode::Uninitialized => 0,
        };
        self.check(demand)?;
        Ok(ResizePlan {
            old_address: address,
            old_size,
            new_size,
        })
    }

    /// Book a successful resize whose result lives at `new_address`.
    pub fn did_resize(&mut self, plan: ResizePlan, new_address: usize) {
        match self.mode {
            LimitMode::Peak => {
                let old_size = self.ledger.forget(plan.old_address).unwrap_or(0);
                if plan.new_size >= old_size {
                    self.remaining -= plan.new_size - old_size;
                } else {
                    self.remaining += old_size - plan.new_size;
                }
                self.ledger.remember(new_address, plan.new_size);
                self.high_water.record(self.ledger.outstanding());
            }
            LimitMode::Total => self.remaining -= plan.new_size,
            LimitMode::NoLimit | LimitMode::Uninitialized => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Event {
        Allocate(usize),
        Resize(usize, usize),
        Release(usize),
    }

    fn event() -> impl Strategy<Value = Event> {
        prop_oneof![
            (0usize..64).prop_map(Event::Allocate),
            (any::<usize>(), 0usize..64).prop_map(|(i, n)| Event::Resize(i, n)),
            any::<usize>().prop_map(Event::Release),
        ]
    }

    proptest! {
        #[test]
        fn prop_peak_ledger_matches_budget(
            budget in 0usize..256,
            events in prop::collection::vec(event(), 0..80),
        ) {
            let mut limiter = Limiter::new();
            limiter.set_peak_limit(budget);
            let mut live: Vec<usize> = Vec::new();
            let mut next_address = 0x1000usize;

            for ev in events {
                match ev {
                    Event::Allocate(n) => {
                        if limiter.check(n).is_ok() {
                            limiter.did_allocate(next_address, n);
                            live.push(next_address);
                            next_address += 0x100;
                        }
                    }
                    Event::Resize(i, n) if !live.is_empty() => {
                        let i = i % live.len();
                        if let Ok(plan) = limiter.check_resize(live[i], n) {
                            // Every other resize moves the block.
                            let moved = if n % 2 == 0 { next_address } else { live[i] };
                            next_address += 0x100;
                            limiter.did_resize(plan, moved);
                            live[i] = moved;
                        }
                    }
                    Event::Release(i) if !live.is_empty() => {
                        limiter.will_release(live.swap_remove(i % live.len()));
                    }
                    _ => {}
                }
                prop_assert_eq!(limiter.budget(), budget);
                prop_assert_eq!(limiter.remaining() + limiter.ledger().outstanding(), budget);
                prop_assert_eq!(limiter.ledger().len(), live.len());
                prop_assert!(limiter.high_water() <= budget);
            }
        }
    }

    #[test]
    fn test_uninitialized_does_not_enforce() {
        let limiter = Limiter::new();
        assert!(!limiter.is_initialized());
        assert!(limiter.check(usize::MAX).is_ok());
    }

    #[test]
    fn test_peak_books_and_credits() {
        let mut limiter = Limiter::new();
        limiter.set_peak_limit(100);
        limiter.check(60).unwrap();
        limiter.did_allocate(0x10, 60);
        assert_eq!(limiter.remaining(), 40);
        assert_eq!(
            limiter.check(41),
            Err(Error::OutOfMemory { requested: 41, remaining: 40 })
        );

        limiter.will_release(0x10);
        assert_eq!(limiter.remaining(), 100);
        assert!(limiter.ledger().is_empty());
        assert_eq!(limiter.high_water(), 60);
    }

    #[test]
    fn test_total_never_credits() {
        let mut limiter = Limiter::new();
        limiter.set_total_limit(100);
        limiter.did_allocate(0x10, 60);
        limiter.will_release(0x10);
        assert_eq!(limiter.remaining(), 40);
        assert!(limiter.ledger().is_empty());
    }

    #[test]
    fn test_peak_resize_charges_only_growth() {
        let mut limiter = Limiter::new();
        limiter.set_peak_limit(100);
        limiter.did_allocate(0x10, 80);

        let plan = limiter.check_resize(0x10, 100).unwrap();
        assert_eq!(plan.old_size, Some(80));
        limiter.did_resize(plan, 0x20);
        assert_eq!(limiter.remaining(), 0);
        assert_eq!(limiter.ledger().size_of(0x20), Some(100));
        assert_eq!(limiter.ledger().size_of(0x10), None);
    }

    #[test]
    fn test_peak_shrink_credits_budget() {
        let mut limiter = Limiter::new();
        limiter.set_peak_limit(100);
        limiter.did_allocate(0x10, 90);

        let plan = limiter.check_resize(0x10, 30).unwrap();
        limiter.did_resize(plan, 0x10);
        assert_eq!(limiter.remaining(), 70);
        assert_eq!(limiter.ledger().outstanding(), 30);
    }

    #[test]
    fn test_total_resize_charges_full_size() {
        let mut limiter = Limiter::new();
        limiter.set_total_limit(100);
        limiter.did_allocate(0x10, 50);
        assert!(limiter.check_resize(0x10, 60).is_err());
        let plan = limiter.check_resize(0x10, 50).unwrap();
        limiter.did_resize(plan, 0x10);
        assert_eq!(limiter.remaining(), 0);
    }

    #[test]
    fn test_reconfigure_clears_ledger() {
        let mut limiter = Limiter::new();
        limiter.set_peak_limit(100);
        limiter.did_allocate(0x10, 10);
        limiter.set_no_limit();
        assert_eq!(limiter.mode(), LimitMode::NoLimit);
        assert!(limiter.ledger().is_empty());
        assert_eq!(limiter.remaining(), 0);
        assert!(limiter.check(usize::MAX).is_ok());
    }
}
