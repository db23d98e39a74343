//! Stream metadata consumed by the engine.
//! Only the sampling rate and the channel kinds are read in the hot path.

/// Role of a channel within the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Ordinary data channel.
    Data,
    /// Stimulus channel carrying piecewise-constant trigger pulses.
    Stim,
}

/// Per-channel descriptor.
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    /// Channel name as reported by the acquisition side.
    pub name: String,
    /// Channel role.
    pub kind: ChannelKind,
}

impl ChannelInfo {
    pub fn new(name: impl Into<String>, kind: ChannelKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Composite stim summary channel. It aggregates the individual stim
/// lines and is therefore not usable as a trigger source.
const COMPOSITE_STIM_NAME: &str = "STI 014";

/// Immutable stream description: sampling rate plus channel descriptors.
///
/// Fixed once the engine is constructed; the trigger-channel registry is
/// derived from the channel kinds.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    sample_rate: f64,
    channels: Vec<ChannelInfo>,
}

impl StreamInfo {
    pub fn new(sample_rate: f64, channels: Vec<ChannelInfo>) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Sampling rate in Hz.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Number of channels per block.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// All channel descriptors, in row order.
    pub fn channels(&self) -> &[ChannelInfo] {
        &self.channels
    }

    /// Indices of channels eligible as trigger sources: stim-kind
    /// channels, excluding the composite summary channel.
    pub fn stim_channels(&self) -> Vec<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, ch)| ch.kind == ChannelKind::Stim && ch.name != COMPOSITE_STIM_NAME)
            .map(|(i, _)| i)
            .collect()
    }

    /// Whether `index` may serve as a trigger channel.
    pub fn is_trigger_candidate(&self, index: usize) -> bool {
        self.channels
            .get(index)
            .map(|ch| ch.kind == ChannelKind::Stim && ch.name != COMPOSITE_STIM_NAME)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> StreamInfo {
        StreamInfo::new(
            1000.0,
            vec![
                ChannelInfo::new("EEG 001", ChannelKind::Data),
                ChannelInfo::new("STI 001", ChannelKind::Stim),
                ChannelInfo::new("STI 014", ChannelKind::Stim),
                ChannelInfo::new("EEG 002", ChannelKind::Data),
            ],
        )
    }

    #[test]
    fn test_stim_registry_skips_composite_channel() {
        assert_eq!(info().stim_channels(), vec![1]);
    }

    #[test]
    fn test_trigger_candidates() {
        let info = info();
        assert!(info.is_trigger_candidate(1));
        assert!(!info.is_trigger_candidate(0)); // data channel
        assert!(!info.is_trigger_candidate(2)); // composite summary
        assert!(!info.is_trigger_candidate(99)); // out of range
    }
}
