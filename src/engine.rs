//! Engine worker thread and thread-safe control surface.
//!
//! One worker drives queue -> trigger scan -> capture -> accumulator.
//! Setters write a *requested* configuration under the control mutex;
//! the worker copies it into its *active* configuration at reset points
//! only, so the hot path never holds the mutex across block processing.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, trace, warn};
use ndarray::{Array1, Array2};
use parking_lot::Mutex;

use crate::average::{baseline_columns, time_axis, AverageMode, EpochAccumulator, Evoked};
use crate::buffers::{BackBuffer, FrontBuffer};
use crate::epoch;
use crate::error::EngineError;
use crate::info::StreamInfo;
use crate::queue::BlockQueue;
use crate::trigger;

/// Reconfigurable engine parameters.
///
/// The control surface stores the requested copy; the worker owns the
/// active copy and adopts changes at the next reset point. Changing any
/// of the window sizes, the trigger channel, the averaging mode, or the
/// history depth discards in-flight state; the threshold and the
/// baseline settings apply without a reset.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Columns kept ahead of the trigger sample (0 is legal).
    pub pre_stim_samples: usize,
    /// Columns kept from the trigger sample onwards (must be positive).
    pub post_stim_samples: usize,
    /// Row index of the stimulus channel watched for rising edges.
    pub trigger_channel: usize,
    /// History depth in running-mean mode (must be positive).
    pub num_averages: usize,
    /// Running mean or cumulative sum.
    pub mode: AverageMode,
    /// Whether baseline correction is applied to emitted data.
    pub baseline_enabled: bool,
    /// Baseline window start in seconds; `None` = from the first sample.
    pub baseline_from: Option<f64>,
    /// Baseline window end in seconds; `None` = to the zero point.
    pub baseline_to: Option<f64>,
    /// Level the stim-channel difference must exceed for a rising edge.
    pub trigger_threshold: f64,
    /// Window sizes in seconds as last reported by the caller. Purely
    /// informational; the sample counts are authoritative.
    pub pre_stim_secs: f32,
    pub post_stim_secs: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pre_stim_samples: 100,
            post_stim_samples: 400,
            trigger_channel: 0,
            num_averages: 10,
            mode: AverageMode::RunningMean,
            baseline_enabled: false,
            baseline_from: None,
            baseline_to: None,
            trigger_threshold: 0.5,
            pre_stim_secs: 0.0,
            post_stim_secs: 0.0,
        }
    }
}

impl EngineConfig {
    /// True when the difference to `other` requires a full worker reset.
    fn needs_reset(&self, other: &Self) -> bool {
        self.pre_stim_samples != other.pre_stim_samples
            || self.post_stim_samples != other.post_stim_samples
            || self.trigger_channel != other.trigger_channel
            || self.mode != other.mode
            || self.num_averages != other.num_averages
    }
}

/// Counters tracked with atomics (no locking needed).
struct AtomicStats {
    blocks_processed: AtomicU64,
    triggers_detected: AtomicU64,
    epochs_emitted: AtomicU64,
    captures_discarded: AtomicU64,
    blocks_rejected: AtomicU64,
}

impl AtomicStats {
    fn new() -> Self {
        Self {
            blocks_processed: AtomicU64::new(0),
            triggers_detected: AtomicU64::new(0),
            epochs_emitted: AtomicU64::new(0),
            captures_discarded: AtomicU64::new(0),
            blocks_rejected: AtomicU64::new(0),
        }
    }
}

/// Statistics snapshot for external monitoring.
#[derive(Debug, Default, Clone)]
pub struct EngineStats {
    /// Blocks popped and processed by the worker.
    pub blocks_processed: u64,
    /// Rising edges that started a capture.
    pub triggers_detected: u64,
    /// Evoked emissions.
    pub epochs_emitted: u64,
    /// Captures dropped (reconfiguration or underfilled buffers).
    pub captures_discarded: u64,
    /// Producer pushes rejected for shape mismatch.
    pub blocks_rejected: u64,
}

/// State guarded by the single control mutex.
struct Shared {
    running: bool,
    requested: EngineConfig,
    latest: Option<Arc<Evoked>>,
}

type EvokedCallback = Box<dyn Fn(&Arc<Evoked>) + Send>;
type NumAveragesCallback = Box<dyn Fn(usize) + Send>;

/// Real-time stimulus-locked averaging engine.
///
/// A producer pushes `channels x cols` blocks; a worker thread detects
/// rising edges on the configured stimulus channel, extracts epochs of
/// `pre_stim + post_stim` columns around each trigger and emits the
/// accumulated [`Evoked`] after every capture.
///
/// All control-surface methods are callable from any thread. Evoked
/// subscribers run on the worker thread and must not call back into
/// `start`; pollers can use [`EvokedEngine::latest_evoked`] instead.
pub struct EvokedEngine {
    info: StreamInfo,
    queue: Arc<BlockQueue>,
    shared: Arc<Mutex<Shared>>,
    stats: Arc<AtomicStats>,
    evoked_subs: Arc<Mutex<Vec<EvokedCallback>>>,
    num_averages_subs: Mutex<Vec<NumAveragesCallback>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EvokedEngine {
    pub fn new(info: StreamInfo) -> Self {
        Self::build(info, EngineConfig::default())
    }

    /// Create an engine with an explicit starting configuration,
    /// validated the same way the setters validate.
    pub fn with_config(info: StreamInfo, config: EngineConfig) -> Result<Self, EngineError> {
        if config.post_stim_samples == 0 {
            return Err(EngineError::InvalidConfig(
                "post_stim_samples must be positive".into(),
            ));
        }
        if config.num_averages == 0 {
            return Err(EngineError::InvalidConfig(
                "num_averages must be positive".into(),
            ));
        }
        // null bounds resolve to "from start" / "to zero"
        let from = config.baseline_from.unwrap_or(f64::NEG_INFINITY);
        let to = config.baseline_to.unwrap_or(0.0);
        if from > to {
            return Err(EngineError::InvalidConfig(format!(
                "baseline window starts at {} s, after its end at {} s",
                from, to
            )));
        }
        Ok(Self::build(info, config))
    }

    fn build(info: StreamInfo, config: EngineConfig) -> Self {
        Self {
            info,
            queue: Arc::new(BlockQueue::new()),
            shared: Arc::new(Mutex::new(Shared {
                running: false,
                requested: config,
                latest: None,
            })),
            stats: Arc::new(AtomicStats::new()),
            evoked_subs: Arc::new(Mutex::new(Vec::new())),
            num_averages_subs: Mutex::new(Vec::new()),
            worker: Mutex::new(None),
        }
    }

    /// Stream metadata the engine was constructed with.
    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    /// Queue one `channels x cols` block. Blocks while the queue is
    /// full. Accepted and buffered even before [`EvokedEngine::start`].
    pub fn push(&self, block: Array2<f64>) -> Result<(), EngineError> {
        let res = self.queue.push(block);
        if res.is_err() {
            self.stats.blocks_rejected.fetch_add(1, Ordering::Relaxed);
        }
        res
    }

    /// Alias for [`EvokedEngine::push`].
    pub fn append(&self, block: Array2<f64>) -> Result<(), EngineError> {
        self.push(block)
    }

    /// Spawn the worker thread. Returns false if already running; a
    /// worker still winding down from a prior stop is joined first.
    pub fn start(&self) -> bool {
        let mut worker = self.worker.lock();
        {
            let mut shared = self.shared.lock();
            if shared.running {
                return false;
            }
            shared.running = true;
        }
        if let Some(handle) = worker.take() {
            let _ = handle.join();
        }
        self.queue.reopen();

        let ctx = Worker {
            info: self.info.clone(),
            queue: self.queue.clone(),
            shared: self.shared.clone(),
            stats: self.stats.clone(),
            evoked_subs: self.evoked_subs.clone(),
        };
        *worker = Some(thread::spawn(move || ctx.run()));
        true
    }

    /// Request the worker to stop and release the queue to unblock it.
    /// Cooperative: the worker returns at its next pop. Returns false
    /// if not running. Idempotent.
    pub fn stop(&self) -> bool {
        {
            let mut shared = self.shared.lock();
            if !shared.running {
                return false;
            }
            shared.running = false;
        }
        self.queue.release();
        true
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    /// Set the running-mean history depth and notify subscribers.
    pub fn set_num_averages(&self, n: usize) -> Result<(), EngineError> {
        if n == 0 {
            return Err(EngineError::InvalidConfig(
                "num_averages must be positive".into(),
            ));
        }
        self.shared.lock().requested.num_averages = n;
        for cb in self.num_averages_subs.lock().iter() {
            cb(n);
        }
        Ok(())
    }

    pub fn set_average_mode(&self, mode: AverageMode) {
        self.shared.lock().requested.mode = mode;
    }

    /// Set the pre-stimulus window. The seconds value is informational;
    /// the sample count is authoritative. Zero is legal.
    pub fn set_pre_stim(&self, samples: usize, seconds: f32) {
        let mut shared = self.shared.lock();
        shared.requested.pre_stim_samples = samples;
        shared.requested.pre_stim_secs = seconds;
    }

    /// Set the post-stimulus window. The seconds value is informational;
    /// the sample count is authoritative and must be positive.
    pub fn set_post_stim(&self, samples: usize, seconds: f32) -> Result<(), EngineError> {
        if samples == 0 {
            return Err(EngineError::InvalidConfig(
                "post_stim_samples must be positive".into(),
            ));
        }
        let mut shared = self.shared.lock();
        shared.requested.post_stim_samples = samples;
        shared.requested.post_stim_secs = seconds;
        Ok(())
    }

    /// Select the stimulus channel watched for rising edges. A channel
    /// that is out of range or not stim-kind yields no triggers.
    pub fn set_trigger_channel(&self, index: usize) {
        if !self.info.is_trigger_candidate(index) {
            warn!(
                "channel {} is not a usable trigger source, no epochs will be produced",
                index
            );
        }
        self.shared.lock().requested.trigger_channel = index;
    }

    pub fn set_trigger_threshold(&self, threshold: f64) {
        self.shared.lock().requested.trigger_threshold = threshold;
    }

    pub fn set_baseline_active(&self, enabled: bool) {
        self.shared.lock().requested.baseline_enabled = enabled;
    }

    /// Set the baseline window start. Canonical storage is in seconds
    /// (`milliseconds / 1000`); the samples value is informational.
    pub fn set_baseline_from(&self, _samples: i32, milliseconds: i32) -> Result<(), EngineError> {
        let from = f64::from(milliseconds) / 1000.0;
        let mut shared = self.shared.lock();
        // a null end resolves to the zero point
        let to = shared.requested.baseline_to.unwrap_or(0.0);
        if from > to {
            return Err(EngineError::InvalidConfig(format!(
                "baseline window starts at {} s, after its end at {} s",
                from, to
            )));
        }
        shared.requested.baseline_from = Some(from);
        Ok(())
    }

    /// Revert the baseline window start to "from the first sample".
    pub fn clear_baseline_from(&self) {
        self.shared.lock().requested.baseline_from = None;
    }

    /// Set the baseline window end. Canonical storage is in seconds
    /// (`milliseconds / 1000`); the samples value is informational.
    pub fn set_baseline_to(&self, _samples: i32, milliseconds: i32) -> Result<(), EngineError> {
        let to = f64::from(milliseconds) / 1000.0;
        let mut shared = self.shared.lock();
        // a null start resolves to "from the first sample"
        let from = shared.requested.baseline_from.unwrap_or(f64::NEG_INFINITY);
        if from > to {
            return Err(EngineError::InvalidConfig(format!(
                "baseline window ends at {} s, before its start at {} s",
                to, from
            )));
        }
        shared.requested.baseline_to = Some(to);
        Ok(())
    }

    /// Revert the baseline window end to "to the zero point".
    pub fn clear_baseline_to(&self) {
        self.shared.lock().requested.baseline_to = None;
    }

    /// Snapshot of the requested configuration.
    pub fn config(&self) -> EngineConfig {
        self.shared.lock().requested.clone()
    }

    pub fn num_averages(&self) -> usize {
        self.shared.lock().requested.num_averages
    }

    pub fn average_mode(&self) -> AverageMode {
        self.shared.lock().requested.mode
    }

    /// Latest emitted evoked, if any. Lossy: pollers see the most
    /// recent snapshot only.
    pub fn latest_evoked(&self) -> Option<Arc<Evoked>> {
        self.shared.lock().latest.clone()
    }

    /// Subscribe to evoked emissions. Callbacks run on the worker
    /// thread, once per captured epoch, in capture order. There is no
    /// replay; late subscribers see only future emissions.
    pub fn on_evoked(&self, callback: impl Fn(&Arc<Evoked>) + Send + 'static) {
        self.evoked_subs.lock().push(Box::new(callback));
    }

    /// Subscribe to history-depth changes made through
    /// [`EvokedEngine::set_num_averages`].
    pub fn on_num_averages_changed(&self, callback: impl Fn(usize) + Send + 'static) {
        self.num_averages_subs.lock().push(Box::new(callback));
    }

    /// Counters snapshot.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            blocks_processed: self.stats.blocks_processed.load(Ordering::Relaxed),
            triggers_detected: self.stats.triggers_detected.load(Ordering::Relaxed),
            epochs_emitted: self.stats.epochs_emitted.load(Ordering::Relaxed),
            captures_discarded: self.stats.captures_discarded.load(Ordering::Relaxed),
            blocks_rejected: self.stats.blocks_rejected.load(Ordering::Relaxed),
        }
    }
}

impl Drop for EvokedEngine {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

/// Everything the worker thread needs, cloned out of the engine handle.
struct Worker {
    info: StreamInfo,
    queue: Arc<BlockQueue>,
    shared: Arc<Mutex<Shared>>,
    stats: Arc<AtomicStats>,
    evoked_subs: Arc<Mutex<Vec<EvokedCallback>>>,
}

/// In-flight capture, latched when the trigger fired.
struct Capture {
    /// Pre-stimulus region, already assembled.
    left: Array2<f64>,
    trigger_block: Array2<f64>,
    trigger_col: usize,
}

impl Worker {
    fn run(self) {
        let mut active = self.shared.lock().requested.clone();
        let stim_channels = self.info.stim_channels();

        let mut times = self.rebuild_times(&active);
        let mut front = FrontBuffer::new(active.pre_stim_samples);
        let mut back = BackBuffer::new();
        let mut accum = EpochAccumulator::new(active.mode, active.num_averages);
        let mut capture: Option<Capture> = None;
        let mut detected: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        let mut trigger_ok = stim_channels.contains(&active.trigger_channel);
        if !trigger_ok {
            warn!(
                "channel {} is not a usable trigger source, no epochs will be produced",
                active.trigger_channel
            );
        }

        debug!(
            "worker started: pre={} post={} trigger_channel={} stim_channels={:?}",
            active.pre_stim_samples, active.post_stim_samples, active.trigger_channel, stim_channels
        );

        loop {
            // Reset point: adopt the requested configuration.
            {
                let shared = self.shared.lock();
                if !shared.running {
                    break;
                }
                if shared.requested.needs_reset(&active) {
                    active = shared.requested.clone();
                    times = self.rebuild_times(&active);
                    front.reset(active.pre_stim_samples);
                    back.reset();
                    accum.reset(active.mode, active.num_averages);
                    if capture.take().is_some() {
                        self.stats.captures_discarded.fetch_add(1, Ordering::Relaxed);
                        debug!("reconfiguration discarded in-flight capture");
                    }
                    trigger_ok = stim_channels.contains(&active.trigger_channel);
                    if !trigger_ok {
                        warn!(
                            "channel {} is not a usable trigger source, no epochs will be produced",
                            active.trigger_channel
                        );
                    }
                } else {
                    // These apply without a reset.
                    active.trigger_threshold = shared.requested.trigger_threshold;
                    active.baseline_enabled = shared.requested.baseline_enabled;
                    active.baseline_from = shared.requested.baseline_from;
                    active.baseline_to = shared.requested.baseline_to;
                }
            }

            let block = match self.queue.pop() {
                Some(block) => block,
                None => {
                    debug!("block queue released, worker exiting");
                    break;
                }
            };
            self.stats.blocks_processed.fetch_add(1, Ordering::Relaxed);

            if capture.is_none() {
                detected.clear();
                for &ch in &stim_channels {
                    if trigger_ok && ch == active.trigger_channel {
                        continue; // scanned below, first edge only
                    }
                    let edges =
                        trigger::rising_edges(&block, ch, active.trigger_threshold, 0);
                    if !edges.is_empty() {
                        detected.insert(ch, edges);
                    }
                }
                let trigger_col = if trigger_ok {
                    trigger::first_rising_edge(
                        &block,
                        active.trigger_channel,
                        active.trigger_threshold,
                        0,
                    )
                } else {
                    None
                };

                if let Some(col) = trigger_col {
                    detected.insert(active.trigger_channel, vec![col]);
                    self.stats.triggers_detected.fetch_add(1, Ordering::Relaxed);
                    trace!(
                        "rising edge on channel {} at column {}",
                        active.trigger_channel,
                        col
                    );
                    // Latch the pre-stim region before this block rolls
                    // into the front buffer.
                    match epoch::left_region(&front, &block, col, active.pre_stim_samples) {
                        Some(left) => {
                            let covered =
                                active.post_stim_samples.min(block.ncols() - col);
                            back.begin(active.post_stim_samples - covered);
                            capture = Some(Capture {
                                left,
                                trigger_block: block.clone(),
                                trigger_col: col,
                            });
                        }
                        None => {
                            self.stats.captures_discarded.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }

                front.ingest(&block);
                // A short post-stim window can complete inside the
                // trigger block itself.
                if capture.is_some() && back.is_full() {
                    self.finish_capture(&mut capture, &mut back, &mut accum, &active, &times);
                }
            } else {
                front.ingest(&block);
                if back.ingest(&block) {
                    self.finish_capture(&mut capture, &mut back, &mut accum, &active, &times);
                }
            }
        }

        debug!("worker stopped");
    }

    fn rebuild_times(&self, active: &EngineConfig) -> Array1<f64> {
        time_axis(
            active.pre_stim_samples,
            active.post_stim_samples,
            self.info.sample_rate(),
        )
    }

    /// Assemble the finished capture, fold it into the accumulator and
    /// emit the evoked snapshot.
    fn finish_capture(
        &self,
        capture: &mut Option<Capture>,
        back: &mut BackBuffer,
        accum: &mut EpochAccumulator,
        active: &EngineConfig,
        times: &Array1<f64>,
    ) {
        let cap = match capture.take() {
            Some(cap) => cap,
            None => return,
        };
        let epoch = epoch::assemble(
            &cap.left,
            &cap.trigger_block,
            cap.trigger_col,
            back,
            active.post_stim_samples,
        );
        back.reset();
        let epoch = match epoch {
            Some(epoch) => epoch,
            None => {
                self.stats.captures_discarded.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let baseline_cols = if active.baseline_enabled {
            baseline_columns(times, active.baseline_from, active.baseline_to)
        } else {
            None
        };
        let (data, nave) = accum.push(epoch, baseline_cols);

        let evoked = Arc::new(Evoked {
            data,
            times: times.clone(),
            first: times[0],
            last: times[times.len() - 1],
            nave,
            baseline: (active.baseline_from, active.baseline_to),
        });
        self.shared.lock().latest = Some(evoked.clone());
        self.stats.epochs_emitted.fetch_add(1, Ordering::Relaxed);
        for cb in self.evoked_subs.lock().iter() {
            cb(&evoked);
        }
    }
}
