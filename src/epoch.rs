//! Stitches front-buffer, trigger-block, and back-buffer columns into a
//! single stimulus-aligned epoch matrix.
//!
//! The pre-stimulus half is latched the moment the trigger is detected,
//! from the front-buffer state that precedes the trigger block; the
//! post-stimulus half is completed once the back buffer has filled.
//! Placement is by cumulative column offsets, so blocks of unequal width
//! stitch correctly.

use log::debug;
use ndarray::{s, Array2};

use crate::buffers::{BackBuffer, FrontBuffer};

/// Pre-stimulus region of an epoch: `pre` columns ending just before the
/// trigger sample.
///
/// The last `k = min(pre, trigger_col)` columns come from the trigger
/// block itself; the remaining `pre - k` columns are the tail of the
/// front buffer. Returns `None` (capture discarded) when the stream has
/// not yet produced enough pre-stimulus context.
pub fn left_region(
    front: &FrontBuffer,
    trigger_block: &Array2<f64>,
    trigger_col: usize,
    pre: usize,
) -> Option<Array2<f64>> {
    let rows = trigger_block.nrows();
    let k = pre.min(trigger_col);
    let from_front = pre - k;

    let mut left = Array2::zeros((rows, pre));
    if from_front > 0 {
        let tail = match front.tail(from_front) {
            Some(tail) => tail,
            None => {
                debug!(
                    "front buffer holds {} of {} pre-stimulus columns, discarding capture",
                    front.total_cols(),
                    from_front
                );
                return None;
            }
        };
        left.slice_mut(s![.., ..from_front]).assign(&tail);
    }
    if k > 0 {
        left.slice_mut(s![.., from_front..])
            .assign(&trigger_block.slice(s![.., trigger_col - k..trigger_col]));
    }
    Some(left)
}

/// Assemble the complete `channels x (pre + post)` epoch once the back
/// buffer has reached its target.
///
/// Column `pre` of the result is the trigger sample: the trigger block
/// supplies columns `[trigger_col, trigger_col + r)` with
/// `r = min(post, block_cols - trigger_col)`, and the back buffer
/// supplies the remaining `post - r`.
pub fn assemble(
    left: &Array2<f64>,
    trigger_block: &Array2<f64>,
    trigger_col: usize,
    back: &BackBuffer,
    post: usize,
) -> Option<Array2<f64>> {
    let rows = trigger_block.nrows();
    let pre = left.ncols();
    let r = post.min(trigger_block.ncols() - trigger_col);

    let mut epoch = Array2::zeros((rows, pre + post));
    epoch.slice_mut(s![.., ..pre]).assign(left);
    epoch
        .slice_mut(s![.., pre..pre + r])
        .assign(&trigger_block.slice(s![.., trigger_col..trigger_col + r]));

    if post > r {
        let rest = match back.leading(post - r) {
            Some(rest) => rest,
            None => {
                debug!(
                    "back buffer holds {} of {} post-stimulus columns, discarding capture",
                    back.total_cols(),
                    post - r
                );
                return None;
            }
        };
        epoch.slice_mut(s![.., pre + r..]).assign(&rest);
    }
    Some(epoch)
}
