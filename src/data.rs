use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use crate::error::{CoxError, Result};

/// most feature blocks a cohort can carry (cooperative fits use 2 or 3)
pub const MAX_BLOCKS: usize = 3;

/// survival data - times, events, and one or more aligned feature blocks
#[derive(Debug, Clone)]
pub struct SurvivalData {
    times: Array1<f64>,       // time to event/censoring
    events: Array1<bool>,     // true = event, false = censored
    blocks: Vec<Array2<f64>>, // feature blocks, each n_samples x p_k, same row order
}

impl SurvivalData {
    /// make new survival data from raw vecs and a list of feature blocks
    pub fn new(
        times: Vec<f64>,          // survival/censoring times
        events: Vec<bool>,        // true = event occurred, false = censored
        blocks: Vec<Array2<f64>>, // one matrix per omics layer
    ) -> Result<Self> {
        let n_samples = times.len();

        if events.len() != n_samples {
            return Err(CoxError::shape_mismatch(
                format!("times len ({}) != events len ({})", n_samples, events.len())
            ));
        }

        if blocks.is_empty() || blocks.len() > MAX_BLOCKS {
            return Err(CoxError::invalid_parameter("n_blocks", blocks.len()));
        }

        for (k, block) in blocks.iter().enumerate() {
            if block.nrows() != n_samples {
                return Err(CoxError::shape_mismatch(
                    format!("block {} rows ({}) != n_samples ({})", k, block.nrows(), n_samples)
                ));
            }
            if block.iter().any(|x| !x.is_finite()) {
                return Err(CoxError::invalid_cohort(
                    format!("block {} has non-finite feature values", k)
                ));
            }
        }

        if times.iter().any(|&t| t < 0.0 || !t.is_finite()) {
            return Err(CoxError::invalid_cohort(
                "survival times must be non-negative & finite"
            ));
        }

        Ok(Self {
            times: Array1::from(times),
            events: Array1::from(events),
            blocks,
        })
    }

    /// shorthand for a cohort with a single feature block
    pub fn single_block(times: Vec<f64>, events: Vec<bool>, covariates: Array2<f64>) -> Result<Self> {
        Self::new(times, events, vec![covariates])
    }

    /// how many patients
    pub fn n_samples(&self) -> usize {
        self.times.len()
    }

    /// how many feature blocks
    pub fn n_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// total features across all blocks
    pub fn n_features(&self) -> usize {
        self.blocks.iter().map(|b| b.ncols()).sum()
    }

    /// feature count per block, in block order
    pub fn block_widths(&self) -> Vec<usize> {
        self.blocks.iter().map(|b| b.ncols()).collect()
    }

    /// survival/censoring times
    pub fn times(&self) -> ArrayView1<'_, f64> {
        self.times.view()
    }

    /// event indicators (true = event, false = censored)
    pub fn events(&self) -> ArrayView1<'_, bool> {
        self.events.view()
    }

    /// feature block `k`
    pub fn block(&self, k: usize) -> Result<ArrayView2<'_, f64>> {
        self.blocks
            .get(k)
            .map(|b| b.view())
            .ok_or_else(|| CoxError::invalid_parameter("block", k))
    }

    pub fn blocks(&self) -> &[Array2<f64>] {
        &self.blocks
    }

    /// all blocks glued column-wise, in block order
    pub fn concatenated(&self) -> Array2<f64> {
        // every block has n_samples rows, checked in new()
        stack_columns(self.n_samples(), &self.blocks)
    }

    /// unique event times in order
    pub fn event_times(&self) -> Vec<f64> {
        distinct_event_times(self.times.view(), self.events.view())
    }

    /// grab a subset of patients by indices (every block keeps the same rows)
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        if indices.iter().any(|&i| i >= self.n_samples()) {
            return Err(CoxError::shape_mismatch(
                "subset index out of bounds"
            ));
        }

        let times: Vec<f64> = indices.iter().map(|&i| self.times[i]).collect();
        let events: Vec<bool> = indices.iter().map(|&i| self.events[i]).collect();
        let blocks = self.blocks
            .iter()
            .map(|b| b.select(Axis(0), indices))
            .collect();

        Self::new(times, events, blocks)
    }
}

/// column-wise concatenation of same-height blocks
pub fn concatenate_blocks(blocks: &[Array2<f64>]) -> Result<Array2<f64>> {
    let n_rows = match blocks.first() {
        Some(first) => first.nrows(),
        None => return Err(CoxError::invalid_parameter("blocks", "none to concatenate")),
    };
    if let Some(bad) = blocks.iter().find(|b| b.nrows() != n_rows) {
        return Err(CoxError::shape_mismatch(
            format!("block with {} rows among blocks of {}", bad.nrows(), n_rows)
        ));
    }
    Ok(stack_columns(n_rows, blocks))
}

fn stack_columns(n_rows: usize, blocks: &[Array2<f64>]) -> Array2<f64> {
    let total: usize = blocks.iter().map(|b| b.ncols()).sum();
    let mut joined = Array2::zeros((n_rows, total));
    let mut start = 0;
    for block in blocks {
        let end = start + block.ncols();
        joined.slice_mut(s![.., start..end]).assign(block);
        start = end;
    }
    joined
}

/// sorted distinct times at which an event was observed
pub fn distinct_event_times(times: ArrayView1<f64>, events: ArrayView1<bool>) -> Vec<f64> {
    let mut event_times: Vec<f64> = times
        .iter()
        .zip(events.iter())
        .filter_map(|(time, event)| if *event { Some(*time) } else { None })
        .collect();

    event_times.sort_by(|a, b| a.total_cmp(b));
    event_times.dedup(); // remove duplicate event times
    event_times
}
