//! Rolling pre-stimulus and accumulating post-stimulus block storage.
//!
//! Both buffers keep blocks as-is and defer concatenation into a single
//! matrix to epoch assembly, so ingestion stays O(1) per block and
//! partial blocks at the window boundary are handled by slicing.

use std::collections::VecDeque;

use ndarray::{s, Array2};

/// Rolling window over the most recent blocks, trimmed to a fixed
/// pre-stimulus column budget.
///
/// After every `ingest` the aggregate column count equals
/// `min(capacity, columns observed since reset)`; once the budget is
/// reached it stays there until the next reset.
pub struct FrontBuffer {
    blocks: VecDeque<Array2<f64>>,
    total_cols: usize,
    capacity: usize,
}

impl FrontBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            blocks: VecDeque::new(),
            total_cols: 0,
            capacity,
        }
    }

    /// Append a block, then drop or tail-trim the head until the column
    /// budget holds again.
    pub fn ingest(&mut self, block: &Array2<f64>) {
        if self.capacity == 0 || block.ncols() == 0 {
            return;
        }
        self.blocks.push_back(block.clone());
        self.total_cols += block.ncols();

        while self.total_cols > self.capacity {
            let overflow = self.total_cols - self.capacity;
            let head_cols = self.blocks.front().map(|b| b.ncols()).unwrap_or(0);
            if head_cols <= overflow {
                self.blocks.pop_front();
                self.total_cols -= head_cols;
            } else if let Some(head) = self.blocks.front_mut() {
                // shrink the oldest block from its left
                *head = head.slice(s![.., overflow..]).to_owned();
                self.total_cols -= overflow;
            }
        }
    }

    /// The last `n` buffered columns concatenated oldest-first, or
    /// `None` when fewer than `n` columns are held.
    pub fn tail(&self, n: usize) -> Option<Array2<f64>> {
        if n > self.total_cols {
            return None;
        }
        let rows = self.blocks.front()?.nrows();
        let mut out = Array2::zeros((rows, n));
        let mut write_end = n;
        for block in self.blocks.iter().rev() {
            if write_end == 0 {
                break;
            }
            let take = block.ncols().min(write_end);
            let src = block.slice(s![.., block.ncols() - take..]);
            out.slice_mut(s![.., write_end - take..write_end]).assign(&src);
            write_end -= take;
        }
        Some(out)
    }

    /// Aggregate buffered column count.
    pub fn total_cols(&self) -> usize {
        self.total_cols
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the column budget has been reached.
    pub fn is_full(&self) -> bool {
        self.total_cols >= self.capacity
    }

    /// Drop everything and adopt a new column budget.
    pub fn reset(&mut self, capacity: usize) {
        self.blocks.clear();
        self.total_cols = 0;
        self.capacity = capacity;
    }
}

/// Accumulates post-stimulus blocks until a target column count is met.
///
/// The target is fixed at capture start (the post-stimulus span minus
/// whatever the trigger block itself already covers). A block that would
/// overshoot contributes only its leading columns.
pub struct BackBuffer {
    blocks: Vec<Array2<f64>>,
    total_cols: usize,
    target: usize,
}

impl BackBuffer {
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            total_cols: 0,
            target: 0,
        }
    }

    /// Begin a capture that still needs `target` columns.
    pub fn begin(&mut self, target: usize) {
        self.blocks.clear();
        self.total_cols = 0;
        self.target = target;
    }

    /// Append a block, keeping only the leading columns that fit.
    /// Returns true once the target has been reached.
    pub fn ingest(&mut self, block: &Array2<f64>) -> bool {
        if self.is_full() {
            return true;
        }
        let need = self.target - self.total_cols;
        if block.ncols() <= need {
            self.blocks.push(block.clone());
            self.total_cols += block.ncols();
        } else {
            self.blocks.push(block.slice(s![.., ..need]).to_owned());
            self.total_cols = self.target;
        }
        self.is_full()
    }

    /// The leading `n` accumulated columns in arrival order, or `None`
    /// when fewer than `n` columns are held.
    pub fn leading(&self, n: usize) -> Option<Array2<f64>> {
        if n > self.total_cols {
            return None;
        }
        let rows = self.blocks.first()?.nrows();
        let mut out = Array2::zeros((rows, n));
        let mut written = 0;
        for block in &self.blocks {
            if written == n {
                break;
            }
            let take = block.ncols().min(n - written);
            out.slice_mut(s![.., written..written + take])
                .assign(&block.slice(s![.., ..take]));
            written += take;
        }
        Some(out)
    }

    pub fn total_cols(&self) -> usize {
        self.total_cols
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn is_full(&self) -> bool {
        self.total_cols >= self.target
    }

    /// Drop everything and clear the target.
    pub fn reset(&mut self) {
        self.blocks.clear();
        self.total_cols = 0;
        self.target = 0;
    }
}

impl Default for BackBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    /// Block of `cols` columns whose samples are `start, start+1, ...`
    /// on every row, so column identity survives slicing.
    fn counting_block(rows: usize, cols: usize, start: f64) -> Array2<f64> {
        Array2::from_shape_fn((rows, cols), |(_, c)| start + c as f64)
    }

    #[test]
    fn test_front_budget_invariant() {
        let mut front = FrontBuffer::new(250);
        let mut pushed = 0usize;
        for i in 0..6 {
            let block = counting_block(2, 100, (i * 100) as f64);
            front.ingest(&block);
            pushed += 100;
            assert_eq!(front.total_cols(), pushed.min(250));
        }
        assert!(front.is_full());
    }

    #[test]
    fn test_front_tail_trims_oldest_block() {
        let mut front = FrontBuffer::new(150);
        front.ingest(&counting_block(1, 100, 0.0));
        front.ingest(&counting_block(1, 100, 100.0));
        // oldest block shrunk from the left: columns 50..200 remain
        let tail = front.tail(150).unwrap();
        assert_eq!(tail[[0, 0]], 50.0);
        assert_eq!(tail[[0, 149]], 199.0);
    }

    #[test]
    fn test_front_tail_spans_blocks() {
        let mut front = FrontBuffer::new(300);
        front.ingest(&counting_block(1, 100, 0.0));
        front.ingest(&counting_block(1, 100, 100.0));
        front.ingest(&counting_block(1, 100, 200.0));
        let tail = front.tail(120).unwrap();
        assert_eq!(tail.ncols(), 120);
        assert_eq!(tail[[0, 0]], 180.0);
        assert_eq!(tail[[0, 119]], 299.0);
    }

    #[test]
    fn test_front_tail_underfilled() {
        let mut front = FrontBuffer::new(500);
        front.ingest(&counting_block(1, 100, 0.0));
        assert!(front.tail(200).is_none());
        assert!(front.tail(100).is_some());
    }

    #[test]
    fn test_front_zero_capacity_holds_nothing() {
        let mut front = FrontBuffer::new(0);
        front.ingest(&counting_block(1, 100, 0.0));
        assert_eq!(front.total_cols(), 0);
        assert!(front.is_full());
    }

    #[test]
    fn test_back_keeps_leading_columns_of_overshooting_block() {
        let mut back = BackBuffer::new();
        back.begin(250);
        assert!(!back.ingest(&counting_block(1, 100, 0.0)));
        assert!(!back.ingest(&counting_block(1, 100, 100.0)));
        assert!(back.ingest(&counting_block(1, 100, 200.0)));
        assert_eq!(back.total_cols(), 250);
        let data = back.leading(250).unwrap();
        assert_eq!(data[[0, 0]], 0.0);
        assert_eq!(data[[0, 249]], 249.0);
    }

    #[test]
    fn test_back_zero_target_is_immediately_full() {
        let mut back = BackBuffer::new();
        back.begin(0);
        assert!(back.is_full());
    }

    #[test]
    fn test_back_ingest_after_full_is_ignored() {
        let mut back = BackBuffer::new();
        back.begin(50);
        assert!(back.ingest(&counting_block(1, 100, 0.0)));
        assert!(back.ingest(&counting_block(1, 100, 100.0)));
        assert_eq!(back.total_cols(), 50);
    }
}
