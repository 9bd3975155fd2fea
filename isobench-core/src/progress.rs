//! Progress Windows
//!
//! Overall progress is a percentage in `[0, 100]`. Each level of the execution
//! tree owns a contiguous window of it and splits that window equally among
//! its children:
//! - orchestrator: one window per suite
//! - suite: one window per operation group
//! - group: one window per run
//! - run: one window per repetition
//!
//! Sibling windows are contiguous, so progress is monotonic and the sizes at
//! every level add back up to the parent's size.

/// A `(start, size)` slice of overall progress, in percent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressWindow {
    /// First percentage covered by this window
    pub start: f64,
    /// Width of the window
    pub size: f64,
}

impl ProgressWindow {
    /// The whole batch: `[0, 100)`
    pub const FULL: ProgressWindow = ProgressWindow {
        start: 0.0,
        size: 100.0,
    };

    /// Create a window
    pub fn new(start: f64, size: f64) -> Self {
        Self { start, size }
    }

    /// Percentage right after this window
    pub fn end(&self) -> f64 {
        self.start + self.size
    }

    /// Window of child `index` out of `count` equal children
    pub fn slice(&self, index: usize, count: usize) -> ProgressWindow {
        if count == 0 {
            return ProgressWindow::new(self.end(), 0.0);
        }
        let size = self.size / count as f64;
        ProgressWindow::new(self.start + index as f64 * size, size)
    }

    /// Split into `count` contiguous equal windows
    pub fn split(self, count: usize) -> impl ExactSizeIterator<Item = ProgressWindow> {
        (0..count).map(move |i| self.slice(i, count))
    }
}

impl Default for ProgressWindow {
    fn default() -> Self {
        Self::FULL
    }
}

/// Format a percentage for log lines: truncated, right-aligned to width 3
pub fn format_progress(percent: f64) -> String {
    let clamped = percent.clamp(0.0, 100.0) as u32;
    format!("{clamped:>3}%")
}
