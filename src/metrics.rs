//! Append-only in-memory ledger of processing outcomes

use chrono::Utc;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use crate::models::SummaryMetrics;

/// Naive input token estimate: whitespace-separated words
pub fn estimate_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Process-local record of [`SummaryMetrics`] samples
#[derive(Debug, Default)]
pub struct MetricsLedger {
    samples: Mutex<Vec<SummaryMetrics>>,
}

impl MetricsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SummaryMetrics>> {
        self.samples
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, sample: SummaryMetrics) {
        self.lock().push(sample);
    }

    /// Copy of all samples recorded so far
    pub fn snapshot(&self) -> Vec<SummaryMetrics> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Aggregate view over the current samples
    pub fn stats(&self) -> MetricsStats {
        MetricsStats::from_samples(&self.lock())
    }

    /// Start timing one processing unit. The sample is recorded when the
    /// guard drops, whatever path the caller exits through.
    pub fn start(&self, token_count: usize, batch_size: Option<usize>) -> MetricsGuard<'_> {
        MetricsGuard {
            ledger: self,
            started: Instant::now(),
            token_count,
            completion_tokens: 0,
            batch_size,
            failed: true,
        }
    }
}

/// Records a sample on drop. Starts out marked as failed; call
/// [`MetricsGuard::succeed`] once the work has produced output.
#[derive(Debug)]
pub struct MetricsGuard<'a> {
    ledger: &'a MetricsLedger,
    started: Instant,
    token_count: usize,
    completion_tokens: usize,
    batch_size: Option<usize>,
    failed: bool,
}

impl MetricsGuard<'_> {
    pub fn set_token_count(&mut self, token_count: usize) {
        self.token_count = token_count;
    }

    pub fn set_completion_tokens(&mut self, completion_tokens: usize) {
        self.completion_tokens = completion_tokens;
    }

    pub fn succeed(&mut self) {
        self.failed = false;
    }
}

impl Drop for MetricsGuard<'_> {
    fn drop(&mut self) {
        self.ledger.record(SummaryMetrics {
            processing_time: self.started.elapsed().as_secs_f64(),
            token_count: self.token_count,
            completion_tokens: self.completion_tokens,
            total_tokens: self.token_count + self.completion_tokens,
            batch_size: self.batch_size,
            error_count: u32::from(self.failed),
            timestamp: Utc::now(),
        });
    }
}

/// Summary statistics over a set of samples
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsStats {
    pub samples: usize,
    pub errors: usize,
    pub items_processed: usize,
    pub total_tokens: usize,
    pub total_processing_time: f64,
    pub average_processing_time: f64,
}

impl MetricsStats {
    pub fn from_samples(samples: &[SummaryMetrics]) -> Self {
        let total_processing_time: f64 = samples.iter().map(|m| m.processing_time).sum();
        Self {
            samples: samples.len(),
            errors: samples.iter().map(|m| m.error_count as usize).sum(),
            items_processed: samples.iter().map(|m| m.batch_size.unwrap_or(1)).sum(),
            total_tokens: samples.iter().map(|m| m.total_tokens).sum(),
            total_processing_time,
            average_processing_time: if samples.is_empty() {
                0.0
            } else {
                total_processing_time / samples.len() as f64
            },
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.errors as f64 / self.samples as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens("one two  three\nfour"), 4);
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("   "), 0);
    }

    #[test]
    fn test_guard_records_failure_by_default() {
        let ledger = MetricsLedger::new();
        {
            let _guard = ledger.start(12, None);
        }
        let samples = ledger.snapshot();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].error_count, 1);
        assert_eq!(samples[0].token_count, 12);
        assert_eq!(samples[0].total_tokens, 12);
        assert_eq!(samples[0].batch_size, None);
    }

    #[test]
    fn test_guard_records_success() {
        let ledger = MetricsLedger::new();
        {
            let mut guard = ledger.start(10, Some(3));
            guard.set_completion_tokens(6);
            guard.succeed();
        }
        let sample = &ledger.snapshot()[0];
        assert_eq!(sample.error_count, 0);
        assert_eq!(sample.token_count, 10);
        assert_eq!(sample.completion_tokens, 6);
        assert_eq!(sample.total_tokens, 16);
        assert_eq!(sample.batch_size, Some(3));
        assert!(sample.processing_time >= 0.0);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let ledger = MetricsLedger::new();
        drop(ledger.start(1, None));
        let mut copy = ledger.snapshot();
        copy.clear();
        assert_eq!(ledger.len(), 1);

        ledger.clear();
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_stats() {
        let ledger = MetricsLedger::new();
        {
            let mut ok = ledger.start(5, Some(4));
            ok.set_completion_tokens(5);
            ok.succeed();
        }
        drop(ledger.start(3, None));

        let stats = ledger.stats();
        assert_eq!(stats.samples, 2);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.items_processed, 5);
        assert_eq!(stats.total_tokens, 13);
        assert!((stats.error_rate() - 0.5).abs() < f64::EPSILON);
        assert_eq!(MetricsStats::from_samples(&[]).average_processing_time, 0.0);
    }
}
