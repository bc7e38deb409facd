use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Select, Sender, TryRecvError, TrySendError};

use crate::capture::domain::frame_queue_source::FrameQueueSource;
use crate::capture::domain::frame_sample::FrameSample;
use crate::pipeline::pipeline_stats::PipelineCounters;
use crate::shared::graceful_thread::GracefulThread;

/// Moves frames from the per-camera queues into the detection-input queue,
/// keeping every Nth frame by a counter shared across all cameras.
///
/// Both ends are non-blocking: a sweep takes at most one frame per camera,
/// and a full detection-input queue drops the frame being offered. When a
/// sweep finds nothing, the collector waits on all queues at once for at
/// most `wait`.
pub struct FrameCollector {
    source: Arc<dyn FrameQueueSource>,
    output: Sender<FrameSample>,
    sample_interval: u64,
    wait: Duration,
    counter: u64,
    queues: Vec<Receiver<FrameSample>>,
    counters: Arc<PipelineCounters>,
}

impl FrameCollector {
    pub fn new(
        source: Arc<dyn FrameQueueSource>,
        output: Sender<FrameSample>,
        sample_interval: u64,
        wait: Duration,
        counters: Arc<PipelineCounters>,
    ) -> Self {
        Self {
            source,
            output,
            sample_interval: sample_interval.max(1),
            wait,
            counter: 0,
            queues: Vec::new(),
            counters,
        }
    }

    /// Picks up queues of newly running sessions. Queues of stopped
    /// sessions are kept until drained and disconnected.
    fn refresh_queues(&mut self) {
        for queue in self.source.running_queues() {
            if !self.queues.iter().any(|q| q.same_channel(&queue)) {
                self.queues.push(queue);
            }
        }
    }

    /// Takes at most one frame from every queue and offers each to the
    /// detection-input queue. Returns how many frames were dequeued.
    pub fn sweep(&mut self) -> usize {
        self.refresh_queues();
        self.sweep_known()
    }

    fn sweep_known(&mut self) -> usize {
        let mut samples = Vec::new();
        self.queues.retain(|queue| match queue.try_recv() {
            Ok(sample) => {
                samples.push(sample);
                true
            }
            Err(TryRecvError::Empty) => true,
            Err(TryRecvError::Disconnected) => false,
        });
        let dequeued = samples.len();
        for sample in samples {
            self.offer(sample);
        }
        dequeued
    }

    fn offer(&mut self, sample: FrameSample) {
        self.counter += 1;
        self.counters.frame_collected();
        if self.counter % self.sample_interval != 0 {
            return;
        }
        self.counters.frame_sampled();
        match self.output.try_send(sample) {
            Ok(()) => {}
            Err(TrySendError::Full(sample)) => {
                self.counters.frame_dropped();
                log::debug!(
                    "Detection queue full, dropping frame from {}",
                    sample.camera_name
                );
            }
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("Detection queue closed, dropping frame");
            }
        }
    }

    /// Blocks until some queue has a frame, or `wait` elapses.
    fn wait_for_frames(&self) {
        let mut select = Select::new();
        for queue in &self.queues {
            select.recv(queue);
        }
        let _ = select.ready_timeout(self.wait);
    }

    /// Collects until `running` is cleared, then drains whatever is left in
    /// the known queues. Dropping `self` afterwards closes the
    /// detection-input queue for the workers.
    pub fn run(mut self, running: &AtomicBool) {
        log::info!("Frame collector started (every {} frames)", self.sample_interval);
        while running.load(Ordering::Acquire) {
            if self.sweep() == 0 {
                self.wait_for_frames();
            }
        }
        self.refresh_queues();
        while self.sweep_known() > 0 {}
        log::info!("Frame collector stopped after {} frames", self.counter);
    }

    pub fn spawn(self, running: Arc<AtomicBool>) -> std::io::Result<GracefulThread> {
        GracefulThread::spawn("frame-collector", move || self.run(&running))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::camera_id::CameraId;
    use crate::shared::frame::Frame;
    use std::sync::Mutex;
    use std::time::{Instant, SystemTime};

    /// Hands out a fixed set of queues.
    struct StaticQueues(Mutex<Vec<Receiver<FrameSample>>>);

    impl FrameQueueSource for StaticQueues {
        fn running_queues(&self) -> Vec<Receiver<FrameSample>> {
            self.0.lock().unwrap().clone()
        }
    }

    fn sample(camera: u32, index: usize) -> FrameSample {
        FrameSample {
            camera_id: CameraId(camera),
            camera_name: format!("cam-{camera}"),
            timestamp: SystemTime::now(),
            frame: Frame::new(vec![0u8; 3], 1, 1, 3, index),
        }
    }

    fn collector(
        queues: Vec<Receiver<FrameSample>>,
        interval: u64,
        capacity: usize,
    ) -> (FrameCollector, Receiver<FrameSample>, Arc<PipelineCounters>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        let counters = Arc::new(PipelineCounters::default());
        let collector = FrameCollector::new(
            Arc::new(StaticQueues(Mutex::new(queues))),
            tx,
            interval,
            Duration::from_millis(10),
            counters.clone(),
        );
        (collector, rx, counters)
    }

    #[test]
    fn test_every_third_frame_is_forwarded_in_order() {
        let (cam_tx, cam_rx) = crossbeam_channel::bounded(32);
        for i in 1..=9 {
            cam_tx.send(sample(1, i)).unwrap();
        }
        let (mut collector, out, counters) = collector(vec![cam_rx], 3, 32);

        while collector.sweep() > 0 {}

        let forwarded: Vec<usize> = out.try_iter().map(|s| s.frame.index()).collect();
        assert_eq!(forwarded, vec![3, 6, 9]);
        assert_eq!(counters.frames_collected(), 9);
        assert_eq!(counters.frames_sampled(), 3);
    }

    #[test]
    fn test_counter_is_global_across_cameras() {
        let (a_tx, a_rx) = crossbeam_channel::bounded(8);
        let (b_tx, b_rx) = crossbeam_channel::bounded(8);
        for i in 0..2 {
            a_tx.send(sample(1, i)).unwrap();
            b_tx.send(sample(2, i)).unwrap();
        }
        let (mut collector, out, _) = collector(vec![a_rx, b_rx], 2, 8);

        // Sweep order: a0 b0 a1 b1; the 2nd and 4th are kept.
        while collector.sweep() > 0 {}

        let forwarded: Vec<(CameraId, usize)> = out
            .try_iter()
            .map(|s| (s.camera_id, s.frame.index()))
            .collect();
        assert_eq!(forwarded, vec![(CameraId(2), 0), (CameraId(2), 1)]);
    }

    #[test]
    fn test_full_output_drops_newest() {
        let (cam_tx, cam_rx) = crossbeam_channel::bounded(8);
        for i in 0..5 {
            cam_tx.send(sample(1, i)).unwrap();
        }
        let (mut collector, out, counters) = collector(vec![cam_rx], 1, 2);

        while collector.sweep() > 0 {}

        let forwarded: Vec<usize> = out.try_iter().map(|s| s.frame.index()).collect();
        assert_eq!(forwarded, vec![0, 1]);
        assert_eq!(counters.frames_dropped(), 3);
    }

    #[test]
    fn test_run_drains_and_closes_output_on_stop() {
        let (cam_tx, cam_rx) = crossbeam_channel::bounded(8);
        let (collector, out, _) = collector(vec![cam_rx], 1, 16);
        let running = Arc::new(AtomicBool::new(true));
        let thread = collector.spawn(running.clone()).unwrap();

        for i in 0..4 {
            cam_tx.send(sample(1, i)).unwrap();
        }
        running.store(false, Ordering::Release);
        assert_eq!(
            thread.join_within(Duration::from_secs(2)),
            crate::shared::graceful_thread::StopOutcome::Stopped
        );

        // The sender went away with the collector; every frame got through.
        let forwarded: Vec<usize> = out.iter().map(|s| s.frame.index()).collect();
        assert_eq!(forwarded, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_idle_wait_is_bounded() {
        let (_cam_tx, cam_rx) = crossbeam_channel::bounded::<FrameSample>(8);
        let (collector, _out, _) = collector(vec![cam_rx], 1, 4);
        let running = Arc::new(AtomicBool::new(true));
        let thread = collector.spawn(running.clone()).unwrap();

        std::thread::sleep(Duration::from_millis(30));
        let started = Instant::now();
        running.store(false, Ordering::Release);
        thread.join_within(Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_disconnected_queue_is_forgotten() {
        let (cam_tx, cam_rx) = crossbeam_channel::bounded(8);
        cam_tx.send(sample(1, 0)).unwrap();
        drop(cam_tx);
        let (mut collector, out, _) = collector(vec![cam_rx], 1, 8);

        assert_eq!(collector.sweep(), 1);
        assert_eq!(out.try_iter().count(), 1);
        collector.sweep_known();
        assert!(collector.queues.is_empty());
    }
}
