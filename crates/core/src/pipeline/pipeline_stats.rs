use std::sync::atomic::{AtomicU64, Ordering};

/// Event counters shared by every pipeline stage.
#[derive(Debug, Default)]
pub struct PipelineCounters {
    frames_collected: AtomicU64,
    frames_sampled: AtomicU64,
    frames_dropped: AtomicU64,
    frames_processed: AtomicU64,
    detection_failures: AtomicU64,
    known_detections: AtomicU64,
    alerts_emitted: AtomicU64,
    alerts_suppressed: AtomicU64,
    snapshot_failures: AtomicU64,
}

macro_rules! counter {
    ($incr:ident, $get:ident) => {
        pub fn $incr(&self) {
            self.$get.fetch_add(1, Ordering::Relaxed);
        }

        pub fn $get(&self) -> u64 {
            self.$get.load(Ordering::Relaxed)
        }
    };
}

impl PipelineCounters {
    counter!(frame_collected, frames_collected);
    counter!(frame_sampled, frames_sampled);
    counter!(frame_dropped, frames_dropped);
    counter!(frame_processed, frames_processed);
    counter!(detection_failed, detection_failures);
    counter!(known_detected, known_detections);
    counter!(alert_emitted, alerts_emitted);
    counter!(alert_suppressed, alerts_suppressed);
    counter!(snapshot_failed, snapshot_failures);
}

/// Point-in-time view of the pipeline.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PipelineStatistics {
    pub running: bool,
    pub workers: usize,
    pub detection_queue_depth: usize,
    pub results_queue_depth: usize,
    pub known_people: usize,
    pub known_encodings: usize,
    pub frames_collected: u64,
    /// Frames that passed the every-Nth sampling step.
    pub frames_sampled: u64,
    /// Sampled frames discarded because the detection queue was full.
    pub frames_dropped: u64,
    pub frames_processed: u64,
    pub detection_failures: u64,
    pub known_detections: u64,
    pub alerts_emitted: u64,
    pub alerts_suppressed: u64,
    pub snapshot_failures: u64,
}

impl PipelineStatistics {
    pub fn with_counters(mut self, counters: &PipelineCounters) -> Self {
        self.frames_collected = counters.frames_collected();
        self.frames_sampled = counters.frames_sampled();
        self.frames_dropped = counters.frames_dropped();
        self.frames_processed = counters.frames_processed();
        self.detection_failures = counters.detection_failures();
        self.known_detections = counters.known_detections();
        self.alerts_emitted = counters.alerts_emitted();
        self.alerts_suppressed = counters.alerts_suppressed();
        self.snapshot_failures = counters.snapshot_failures();
        self
    }

    /// Multi-line summary for periodic logging.
    pub fn summary(&self) -> String {
        let state = if self.running { "running" } else { "stopped" };
        let drop_pct = if self.frames_sampled > 0 {
            self.frames_dropped as f64 / self.frames_sampled as f64 * 100.0
        } else {
            0.0
        };
        [
            format!("Pipeline {state} ({} workers):", self.workers),
            format!(
                "  Known faces : {} people, {} encodings",
                self.known_people, self.known_encodings
            ),
            format!(
                "  Queues      : detection {}  results {}",
                self.detection_queue_depth, self.results_queue_depth
            ),
            format!(
                "  Frames      : collected {}  sampled {}  dropped {} ({drop_pct:.1}%)  processed {}",
                self.frames_collected, self.frames_sampled, self.frames_dropped, self.frames_processed
            ),
            format!(
                "  Detections  : known {}  failures {}",
                self.known_detections, self.detection_failures
            ),
            format!(
                "  Alerts      : emitted {}  suppressed {}  snapshot failures {}",
                self.alerts_emitted, self.alerts_suppressed, self.snapshot_failures
            ),
        ]
        .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_feed_statistics() {
        let counters = PipelineCounters::default();
        counters.frame_collected();
        counters.frame_collected();
        counters.frame_sampled();
        counters.alert_emitted();

        let stats = PipelineStatistics::default().with_counters(&counters);
        assert_eq!(stats.frames_collected, 2);
        assert_eq!(stats.frames_sampled, 1);
        assert_eq!(stats.alerts_emitted, 1);
        assert_eq!(stats.frames_dropped, 0);
    }

    #[test]
    fn test_summary_reports_drop_rate() {
        let stats = PipelineStatistics {
            running: true,
            workers: 4,
            frames_sampled: 8,
            frames_dropped: 2,
            ..Default::default()
        };
        let summary = stats.summary();
        assert!(summary.starts_with("Pipeline running (4 workers):"));
        assert!(summary.contains("dropped 2 (25.0%)"));
    }

    #[test]
    fn test_summary_without_frames() {
        let summary = PipelineStatistics::default().summary();
        assert!(summary.contains("dropped 0 (0.0%)"));
        assert_eq!(summary.lines().count(), 6);
    }
}
