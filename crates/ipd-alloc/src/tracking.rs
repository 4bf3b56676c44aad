//! High-water tracking for outstanding bytes.
//!
//! Keep this cheap: one comparison per successful peak-mode change.

#[derive(Debug, Default, Clone, Copy)]
pub struct HighWater {
    peak_bytes: usize,
}

impl HighWater {
    pub fn new() -> Self {
        Self { peak_bytes: 0 }
    }

    /// Record a new outstanding-bytes value; updates the mark if higher.
    pub fn record(&mut self, outstanding: usize) {
        if outstanding > self.peak_bytes {
            self.peak_bytes = outstanding;
            #[cfg(feature = "tracing")]
            tracing::trace!(outstanding, "new allocation high-water mark");
        }
    }

    pub fn peak(&self) -> usize {
        self.peak_bytes
    }

    pub fn reset(&mut self) {
        self.peak_bytes = 0;
    }
}
