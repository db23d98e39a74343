//! Real-time stimulus-locked averaging for continuous multichannel
//! sample streams.
//!
//! A producer pushes fixed-shape `channels x cols` sample blocks
//! (`ndarray::Array2<f64>`) into an [`EvokedEngine`]. A worker thread
//! detects rising edges on a configured stimulus channel, extracts an
//! epoch of `pre_stim + post_stim` columns around every trigger sample
//! and emits the running mean (or cumulative sum) of the captured
//! epochs as immutable [`Evoked`] snapshots, optionally
//! baseline-corrected.
//!
//! Memory stays bounded throughout: the block queue applies
//! backpressure to the producer, the pre-stimulus context is a rolling
//! window, and the post-stimulus context accumulates only until the
//! epoch is complete.
//!
//! ```no_run
//! use ndarray::Array2;
//! use rt_evoked::{ChannelInfo, ChannelKind, EvokedEngine, StreamInfo};
//!
//! let info = StreamInfo::new(
//!     1000.0,
//!     vec![
//!         ChannelInfo::new("EEG 001", ChannelKind::Data),
//!         ChannelInfo::new("STI 001", ChannelKind::Stim),
//!     ],
//! );
//! let engine = EvokedEngine::new(info);
//! engine.set_pre_stim(100, 0.1);
//! engine.set_post_stim(400, 0.4).unwrap();
//! engine.set_trigger_channel(1);
//! engine.on_evoked(|evoked| println!("nave = {}", evoked.nave));
//! engine.start();
//!
//! // producer side, from any thread
//! engine.push(Array2::zeros((2, 100))).unwrap();
//! ```

pub mod average;
pub mod buffers;
pub mod engine;
pub mod epoch;
pub mod error;
pub mod info;
pub mod queue;
pub mod trigger;

pub use average::{AverageMode, Evoked, FALLBACK_SAMPLE_RATE};
pub use engine::{EngineConfig, EngineStats, EvokedEngine};
pub use error::EngineError;
pub use info::{ChannelInfo, ChannelKind, StreamInfo};
pub use queue::{BlockQueue, DEFAULT_QUEUE_CAPACITY};
