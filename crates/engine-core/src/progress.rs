use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Number of trailing batches kept for estimates.
pub const RUNTIME_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSample {
    pub millis: u64,
    pub files: usize,
    pub bytes: u64,
}

/// Trailing window of batch runtimes used for remaining-time estimates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeWindow {
    samples: VecDeque<BatchSample>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub remaining_files: usize,
    pub remaining_bytes: u64,
    pub avg_batch_millis: u64,
    pub eta_secs: Option<u64>,
}

impl RuntimeWindow {
    pub fn record(&mut self, sample: BatchSample) {
        if self.samples.len() == RUNTIME_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn avg_batch_millis(&self) -> u64 {
        if self.samples.is_empty() {
            return 0;
        }
        self.samples.iter().map(|s| s.millis).sum::<u64>() / self.samples.len() as u64
    }

    /// Projects the window's per-file rate onto the remaining work.
    pub fn estimate(&self, remaining_files: usize, remaining_bytes: u64) -> Estimate {
        let files: usize = self.samples.iter().map(|s| s.files).sum();
        let millis: u64 = self.samples.iter().map(|s| s.millis).sum();
        let eta_secs = (files > 0).then(|| {
            let per_file = millis as f64 / files as f64;
            ((per_file * remaining_files as f64) / 1000.0).ceil() as u64
        });
        Estimate {
            remaining_files,
            remaining_bytes,
            avg_batch_millis: self.avg_batch_millis(),
            eta_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(millis: u64, files: usize) -> BatchSample {
        BatchSample {
            millis,
            files,
            bytes: 0,
        }
    }

    #[test]
    fn keeps_only_recent_samples() {
        let mut window = RuntimeWindow::default();
        for i in 0..15 {
            window.record(sample(i * 100, 1));
        }
        assert_eq!(window.len(), RUNTIME_WINDOW);
        // 500..=1400 step 100
        assert_eq!(window.avg_batch_millis(), 950);
    }

    #[test]
    fn estimates_from_per_file_rate() {
        let mut window = RuntimeWindow::default();
        window.record(sample(1000, 10));
        window.record(sample(3000, 10));
        let est = window.estimate(100, 1 << 20);
        assert_eq!(est.eta_secs, Some(20));
        assert_eq!(est.avg_batch_millis, 2000);

        assert_eq!(RuntimeWindow::default().estimate(5, 0).eta_secs, None);
    }
}
