//! Rising-edge detection on stimulus channels.
//!
//! Stim channels carry piecewise-constant coded pulses; the first-order
//! difference isolates the leading edge of a pulse regardless of its
//! absolute level.

use ndarray::Array2;

/// Column index of the first rising edge at or after `from_col`, if any.
///
/// An edge fires at column `c` when `x[c] - x[c-1] > threshold`. At
/// `c == 0` the previous sample is an assumed 0 baseline, so a block
/// that opens already high fires at its first column. An out-of-range
/// channel index never detects.
pub fn first_rising_edge(
    block: &Array2<f64>,
    channel: usize,
    threshold: f64,
    from_col: usize,
) -> Option<usize> {
    if channel >= block.nrows() {
        return None;
    }
    let row = block.row(channel);
    for c in from_col..row.len() {
        let prev = if c == 0 { 0.0 } else { row[c - 1] };
        if row[c] - prev > threshold {
            return Some(c);
        }
    }
    None
}

/// All rising-edge columns at or after `from_col` on one channel,
/// left to right.
pub fn rising_edges(
    block: &Array2<f64>,
    channel: usize,
    threshold: f64,
    from_col: usize,
) -> Vec<usize> {
    let mut edges = Vec::new();
    if channel >= block.nrows() {
        return edges;
    }
    let row = block.row(channel);
    for c in from_col..row.len() {
        let prev = if c == 0 { 0.0 } else { row[c - 1] };
        if row[c] - prev > threshold {
            edges.push(c);
        }
    }
    edges
}
