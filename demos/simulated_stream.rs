//! Streams synthetic blocks through the averaging engine and prints a
//! summary line for every emitted evoked.
//!
//! Two data channels carry a noisy sine burst that starts at each
//! stimulus pulse; the running mean over the last few epochs converges
//! toward the clean burst. Run with RUST_LOG=debug for engine logs.

use std::thread;
use std::time::Duration;

use ndarray::Array2;
use rt_evoked::{ChannelInfo, ChannelKind, EvokedEngine, StreamInfo};

const SAMPLE_RATE: f64 = 1000.0;
const BLOCK_COLS: usize = 100;

fn main() {
    env_logger::init();

    let info = StreamInfo::new(
        SAMPLE_RATE,
        vec![
            ChannelInfo::new("EEG 001", ChannelKind::Data),
            ChannelInfo::new("EEG 002", ChannelKind::Data),
            ChannelInfo::new("STI 001", ChannelKind::Stim),
        ],
    );
    let engine = EvokedEngine::new(info);
    engine.set_pre_stim(100, 0.1);
    engine.set_post_stim(300, 0.3).expect("post-stim window");
    engine.set_trigger_channel(2);
    engine.set_num_averages(4).expect("history depth");

    engine.on_evoked(|evoked| {
        let peak = evoked
            .data
            .iter()
            .cloned()
            .fold(f64::MIN, f64::max);
        println!(
            "evoked: {} x {} samples, nave = {}, window [{:.3}, {:.3}] s, peak {:.3}",
            evoked.data.nrows(),
            evoked.data.ncols(),
            evoked.nave,
            evoked.first,
            evoked.last,
            peak
        );
    });
    engine.start();

    // Pulse every 800 samples, held high for 50.
    let mut phase = 0u64;
    let mut global = 0usize;
    for _ in 0..100 {
        let mut block = Array2::zeros((3, BLOCK_COLS));
        for c in 0..BLOCK_COLS {
            let sample = global + c;
            let in_pulse = sample % 800 < 50;
            if in_pulse {
                block[[2, c]] = 5.0;
            }
            // burst follows the pulse onset for 200 samples
            let since_onset = sample % 800;
            if since_onset < 200 {
                let t = since_onset as f64 / SAMPLE_RATE;
                let burst = (2.0 * std::f64::consts::PI * 12.0 * t).sin();
                let noise = pseudo_noise(&mut phase);
                block[[0, c]] = burst + 0.3 * noise;
                block[[1, c]] = 0.5 * burst + 0.3 * noise;
            } else {
                block[[0, c]] = 0.3 * pseudo_noise(&mut phase);
                block[[1, c]] = 0.3 * pseudo_noise(&mut phase);
            }
        }
        engine.push(block).expect("push block");
        global += BLOCK_COLS;
        thread::sleep(Duration::from_millis(10));
    }

    engine.stop();
    let stats = engine.stats();
    println!(
        "done: {} blocks, {} triggers, {} emissions",
        stats.blocks_processed, stats.triggers_detected, stats.epochs_emitted
    );
}

/// Cheap deterministic noise in [-1, 1] (xorshift).
fn pseudo_noise(state: &mut u64) -> f64 {
    *state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let bits = (*state >> 33) as u32;
    (bits as f64 / u32::MAX as f64) * 2.0 - 1.0
}
