//! Running-mean / cumulative-sum accumulation of captured epochs, with
//! optional baseline correction, and the emitted evoked snapshot type.

use std::collections::VecDeque;

use log::warn;
use ndarray::{s, Array1, Array2};

/// How captured epochs are folded into the emitted data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AverageMode {
    /// Mean over the most recent `num_averages` epochs.
    RunningMean,
    /// Unbounded element-wise sum of every epoch seen.
    CumulativeSum,
}

/// Substitute sampling rate when the stream metadata carries a
/// non-positive one.
pub const FALLBACK_SAMPLE_RATE: f64 = 600.0;

/// Averaged (or summed) epoch together with its time axis and counter.
///
/// Emitted as an immutable `Arc` snapshot; consumers must not rely on
/// `nave` for normalization in cumulative-sum mode, where it merely
/// counts the epochs summed so far.
#[derive(Debug, Clone)]
pub struct Evoked {
    /// `channels x (pre + post)` data matrix.
    pub data: Array2<f64>,
    /// Seconds relative to the trigger sample; `times[pre] == 0`.
    pub times: Array1<f64>,
    /// `times[0]`.
    pub first: f64,
    /// `times[len - 1]`.
    pub last: f64,
    /// Running mean: the configured target; cumulative sum: epochs summed.
    pub nave: usize,
    /// Baseline window in seconds; `None` bounds mean "from the first
    /// sample" and "to the zero point".
    pub baseline: (Option<f64>, Option<f64>),
}

/// Epoch time axis: constant `1 / rate` step with zero at column `pre`.
///
/// A non-positive sampling rate falls back to
/// [`FALLBACK_SAMPLE_RATE`] with a warning.
pub fn time_axis(pre: usize, post: usize, sample_rate: f64) -> Array1<f64> {
    let rate = if sample_rate > 0.0 {
        sample_rate
    } else {
        warn!(
            "sampling rate {} is not positive, falling back to {} Hz",
            sample_rate, FALLBACK_SAMPLE_RATE
        );
        FALLBACK_SAMPLE_RATE
    };
    Array1::from_shape_fn(pre + post, |i| (i as f64 - pre as f64) / rate)
}

/// Map the baseline window in seconds onto an inclusive column range of
/// `times`. `None` bounds resolve to `times[0]` and `0.0`. Returns
/// `None` when no column falls inside the window.
pub fn baseline_columns(
    times: &Array1<f64>,
    from: Option<f64>,
    to: Option<f64>,
) -> Option<(usize, usize)> {
    if times.is_empty() {
        return None;
    }
    let from_s = from.unwrap_or(times[0]);
    let to_s = to.unwrap_or(0.0);

    let mut first = None;
    let mut last = None;
    for (i, &t) in times.iter().enumerate() {
        if t >= from_s && t <= to_s {
            if first.is_none() {
                first = Some(i);
            }
            last = Some(i);
        }
    }
    Some((first?, last?))
}

/// Subtract each channel's mean over the inclusive column window
/// `from_col..=to_col` from the whole channel.
pub fn correct_baseline(data: &mut Array2<f64>, from_col: usize, to_col: usize) {
    if from_col > to_col || to_col >= data.ncols() {
        return;
    }
    let span = (to_col - from_col + 1) as f64;
    for mut row in data.rows_mut() {
        let mean = row.slice(s![from_col..=to_col]).sum() / span;
        row.mapv_inplace(|v| v - mean);
    }
}

/// Folds captured epochs into the data emitted to consumers.
pub struct EpochAccumulator {
    mode: AverageMode,
    num_averages: usize,
    /// Bounded history, running-mean mode only.
    history: VecDeque<Array2<f64>>,
    /// Running sum, cumulative mode only.
    sum: Option<Array2<f64>>,
    summed: usize,
}

impl EpochAccumulator {
    pub fn new(mode: AverageMode, num_averages: usize) -> Self {
        Self {
            mode,
            num_averages: num_averages.max(1),
            history: VecDeque::new(),
            sum: None,
            summed: 0,
        }
    }

    /// Drop all accumulated state and adopt new parameters (reset point).
    pub fn reset(&mut self, mode: AverageMode, num_averages: usize) {
        self.mode = mode;
        self.num_averages = num_averages.max(1);
        self.history.clear();
        self.sum = None;
        self.summed = 0;
    }

    /// Fold one epoch in and return `(data to emit, nave)`.
    ///
    /// `baseline` is the inclusive column window to correct over, if
    /// enabled. In running-mean mode the correction applies to the
    /// computed mean; in cumulative mode it applies to the incoming
    /// epoch before summation, so the emitted matrix is the sum of
    /// individually corrected epochs.
    pub fn push(
        &mut self,
        epoch: Array2<f64>,
        baseline: Option<(usize, usize)>,
    ) -> (Array2<f64>, usize) {
        match self.mode {
            AverageMode::RunningMean => {
                self.history.push_back(epoch);
                while self.history.len() > self.num_averages {
                    self.history.pop_front();
                }
                let mut mean = mean_of(&self.history);
                if let Some((a, b)) = baseline {
                    correct_baseline(&mut mean, a, b);
                }
                (mean, self.num_averages)
            }
            AverageMode::CumulativeSum => {
                let mut epoch = epoch;
                if let Some((a, b)) = baseline {
                    correct_baseline(&mut epoch, a, b);
                }
                let sum = match self.sum.take() {
                    Some(sum) => sum + &epoch,
                    None => epoch,
                };
                self.summed += 1;
                let out = sum.clone();
                self.sum = Some(sum);
                (out, self.summed)
            }
        }
    }

    /// Number of epochs currently held in the running-mean history.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

fn mean_of(history: &VecDeque<Array2<f64>>) -> Array2<f64> {
    // callers guarantee a non-empty history
    let mut acc = Array2::zeros(history[0].dim());
    for epoch in history {
        acc += epoch;
    }
    let n = history.len() as f64;
    acc.mapv_inplace(|v| v / n);
    acc
}
