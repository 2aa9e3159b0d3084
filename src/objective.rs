//! objectives handed to the minimizers - all of them are minimized
//!
//! - pilot: `-(1/n) loglik(b)`, no penalty
//! - adaptive lasso: pilot + `lambda * sum_j w_j |b_j|`
//! - cooperative: per-block pilot losses + adaptive lasso over the stacked
//!   vector + `alpha * sum ||Z_k b_k - Z_l b_l||^2` over linked block pairs

use ndarray::{Array1, ArrayView1, ArrayView2};
use crate::{
    error::{CoxError, Result},
    likelihood::{linear_predictor, RiskSetOrder},
};

/// scalar function of a coefficient vector
pub trait Objective {
    /// length of the coefficient vector
    fn dim(&self) -> usize;

    /// objective value at `beta`
    ///
    /// may be +inf, and NaN for a `beta` of the wrong length; never panics
    fn evaluate(&self, beta: ArrayView1<f64>) -> f64;
}

/// which block pairs the cooperation term links
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CooperationTopology {
    /// adjacent blocks only: 1-2, 2-3 (block 1 and 3 never meet directly)
    #[default]
    Chain,
    /// every pair of blocks
    FullPairwise,
}

impl CooperationTopology {
    pub fn pairs(&self, n_blocks: usize) -> Vec<(usize, usize)> {
        match self {
            Self::Chain => (1..n_blocks).map(|k| (k - 1, k)).collect(),
            Self::FullPairwise => (0..n_blocks)
                .flat_map(|a| (a + 1..n_blocks).map(move |b| (a, b)))
                .collect(),
        }
    }
}

/// adaptive lasso weights `1 / |pilot_j|`
///
/// coordinates with a zero pilot get the largest finite weight instead of inf.
/// if nothing is finite every weight falls back to 1.
pub fn adaptive_weights(pilot: ArrayView1<f64>) -> Array1<f64> {
    let raw = pilot.mapv(|p| 1.0 / p.abs());
    let max_finite = raw
        .iter()
        .copied()
        .filter(|w| w.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);

    let cap = if max_finite.is_finite() { max_finite } else { 1.0 };
    let capped = raw.iter().filter(|w| !w.is_finite()).count();
    if capped > 0 {
        log::warn!(
            "{} of {} pilot coefficients are zero or non-finite, capping their weight at {:.4e}",
            capped, raw.len(), cap
        );
    }

    raw.mapv(|w| if w.is_finite() { w } else { cap })
}

fn check_penalty(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(CoxError::invalid_parameter(name, value));
    }
    Ok(())
}

fn check_rows(rows: usize, events: usize) -> Result<()> {
    if rows != events {
        return Err(CoxError::shape_mismatch(
            format!("design rows ({}) != n_samples ({})", rows, events)
        ));
    }
    Ok(())
}

/// mean negative partial log-likelihood of one design matrix
#[derive(Debug, Clone)]
pub struct PilotObjective<'a> {
    design: ArrayView2<'a, f64>,
    events: ArrayView1<'a, bool>,
    risk_order: RiskSetOrder,
}

impl<'a> PilotObjective<'a> {
    pub fn new(
        times: ArrayView1<'a, f64>,
        events: ArrayView1<'a, bool>,
        design: ArrayView2<'a, f64>,
    ) -> Result<Self> {
        check_rows(times.len(), events.len())?;
        check_rows(design.nrows(), events.len())?;
        Ok(Self {
            design,
            events,
            risk_order: RiskSetOrder::new(times),
        })
    }

    fn loss_of(&self, design: ArrayView2<f64>, beta: ArrayView1<f64>) -> f64 {
        let n = self.events.len().max(1) as f64;
        linear_predictor(design, beta)
            .and_then(|eta| self.risk_order.log_likelihood(eta.view(), self.events))
            .map_or(f64::NAN, |loglik| -loglik / n)
    }
}

impl Objective for PilotObjective<'_> {
    fn dim(&self) -> usize {
        self.design.ncols()
    }

    fn evaluate(&self, beta: ArrayView1<f64>) -> f64 {
        self.loss_of(self.design, beta)
    }
}

/// single-block adaptive lasso
#[derive(Debug, Clone)]
pub struct AdaptiveLassoObjective<'a> {
    likelihood: PilotObjective<'a>,
    weights: Array1<f64>,
    lambda: f64,
}

impl<'a> AdaptiveLassoObjective<'a> {
    pub fn new(likelihood: PilotObjective<'a>, weights: Array1<f64>, lambda: f64) -> Result<Self> {
        check_penalty("lambda", lambda)?;
        if weights.len() != likelihood.dim() {
            return Err(CoxError::shape_mismatch(
                format!("{} weights for {} coefficients", weights.len(), likelihood.dim())
            ));
        }
        Ok(Self { likelihood, weights, lambda })
    }

    pub fn penalty(&self, beta: ArrayView1<f64>) -> f64 {
        self.lambda * weighted_l1(self.weights.view(), beta)
    }
}

impl Objective for AdaptiveLassoObjective<'_> {
    fn dim(&self) -> usize {
        self.likelihood.dim()
    }

    fn evaluate(&self, beta: ArrayView1<f64>) -> f64 {
        if beta.len() != self.dim() {
            return f64::NAN;
        }
        self.likelihood.evaluate(beta) + self.penalty(beta)
    }
}

fn weighted_l1(weights: ArrayView1<f64>, beta: ArrayView1<f64>) -> f64 {
    weights.iter().zip(beta.iter()).map(|(w, b)| w * b.abs()).sum()
}

/// cooperative multi-block adaptive lasso (2 or 3 blocks)
#[derive(Debug, Clone)]
pub struct CooperativeObjective<'a> {
    likelihood: PilotObjective<'a>, // shared times/events/risk order, design unused
    blocks: Vec<ArrayView2<'a, f64>>,
    offsets: Vec<usize>,            // start of each block's sub-vector, plus total at the end
    weights: Array1<f64>,
    lambda: f64,
    alpha: f64,
    topology: CooperationTopology,
}

impl<'a> CooperativeObjective<'a> {
    pub fn new(
        times: ArrayView1<'a, f64>,
        events: ArrayView1<'a, bool>,
        blocks: Vec<ArrayView2<'a, f64>>,
        weights: Array1<f64>,
        lambda: f64,
        alpha: f64,
    ) -> Result<Self> {
        if !(2..=3).contains(&blocks.len()) {
            return Err(CoxError::invalid_block_count(blocks.len()));
        }
        check_penalty("lambda", lambda)?;
        check_penalty("alpha", alpha)?;

        let likelihood = PilotObjective::new(times, events, blocks[0])?;
        let mut offsets = vec![0];
        for block in &blocks {
            check_rows(block.nrows(), events.len())?;
            offsets.push(offsets[offsets.len() - 1] + block.ncols());
        }

        let total = offsets[blocks.len()];
        if weights.len() != total {
            return Err(CoxError::shape_mismatch(
                format!("{} weights for {} coefficients", weights.len(), total)
            ));
        }

        Ok(Self {
            likelihood,
            blocks,
            offsets,
            weights,
            lambda,
            alpha,
            topology: CooperationTopology::default(),
        })
    }

    pub fn with_topology(mut self, topology: CooperationTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn n_blocks(&self) -> usize {
        self.blocks.len()
    }

    fn sub_vector<'b>(&self, beta: ArrayView1<'b, f64>, k: usize) -> ArrayView1<'b, f64> {
        beta.slice_move(ndarray::s![self.offsets[k]..self.offsets[k + 1]])
    }

    fn block_predictors(&self, beta: ArrayView1<f64>) -> Vec<Array1<f64>> {
        (0..self.blocks.len())
            .map(|k| self.blocks[k].dot(&self.sub_vector(beta, k)))
            .collect()
    }

    /// sum of per-block mean negative log-likelihoods
    pub fn likelihood_loss(&self, beta: ArrayView1<f64>) -> f64 {
        if beta.len() != self.dim() {
            return f64::NAN;
        }
        (0..self.blocks.len())
            .map(|k| self.likelihood.loss_of(self.blocks[k], self.sub_vector(beta, k)))
            .sum()
    }

    pub fn lasso_penalty(&self, beta: ArrayView1<f64>) -> f64 {
        self.lambda * weighted_l1(self.weights.view(), beta)
    }

    /// `alpha * sum ||Z_a b_a - Z_b b_b||^2` over the topology's pairs
    pub fn cooperation_penalty(&self, beta: ArrayView1<f64>) -> f64 {
        if beta.len() != self.dim() {
            return f64::NAN;
        }
        if self.alpha == 0.0 {
            return 0.0;
        }
        let eta = self.block_predictors(beta);
        let agreement: f64 = self.topology
            .pairs(self.blocks.len())
            .into_iter()
            .map(|(a, b)| {
                eta[a].iter().zip(eta[b].iter()).map(|(x, y)| (x - y).powi(2)).sum::<f64>()
            })
            .sum();
        self.alpha * agreement
    }
}

impl Objective for CooperativeObjective<'_> {
    fn dim(&self) -> usize {
        self.offsets[self.blocks.len()]
    }

    fn evaluate(&self, beta: ArrayView1<f64>) -> f64 {
        if beta.len() != self.dim() {
            return f64::NAN;
        }
        self.likelihood_loss(beta) + self.lasso_penalty(beta) + self.cooperation_penalty(beta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use approx::assert_relative_eq;

    struct Cohort {
        times: Array1<f64>,
        events: Array1<bool>,
        blocks: Vec<Array2<f64>>,
    }

    fn cohort() -> Cohort {
        Cohort {
            times: array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            events: array![true, false, true, true, false, true],
            blocks: vec![
                Array2::from_shape_vec((6, 2), vec![
                    1.0, 0.0,
                    0.0, 1.0,
                    1.0, 1.0,
                    -1.0, 0.0,
                    0.0, -1.0,
                    0.5, 0.5,
                ]).unwrap(),
                Array2::from_shape_vec((6, 1), vec![0.3, -0.2, 0.1, 0.9, -0.4, 0.0]).unwrap(),
                Array2::from_shape_vec((6, 2), vec![
                    0.2, 1.0,
                    -0.5, 0.3,
                    0.8, -0.1,
                    0.0, 0.4,
                    1.1, 0.2,
                    -0.3, -0.6,
                ]).unwrap(),
            ],
        }
    }

    fn views(c: &Cohort, n: usize) -> Vec<ArrayView2<'_, f64>> {
        c.blocks.iter().take(n).map(|b| b.view()).collect()
    }

    #[test]
    fn test_adaptive_weights_cap_zero_pilot() {
        let weights = adaptive_weights(array![0.5, 0.0, -0.25, f64::NAN].view());
        assert_relative_eq!(weights[0], 2.0);
        assert_relative_eq!(weights[2], 4.0);
        // zero/NaN pilots take the largest finite weight
        assert_relative_eq!(weights[1], 4.0);
        assert_relative_eq!(weights[3], 4.0);
    }

    #[test]
    fn test_adaptive_weights_all_zero() {
        let weights = adaptive_weights(array![0.0, 0.0].view());
        assert!(weights.iter().all(|&w| w == 1.0));
    }

    #[test]
    fn test_adaptive_lasso_adds_weighted_penalty() {
        let c = cohort();
        let pilot = PilotObjective::new(c.times.view(), c.events.view(), c.blocks[0].view()).unwrap();
        let beta = array![0.3, -0.6];
        let base = pilot.evaluate(beta.view());

        let lasso = AdaptiveLassoObjective::new(pilot, array![2.0, 0.5], 0.1).unwrap();
        assert_relative_eq!(lasso.evaluate(beta.view()), base + 0.1 * (2.0 * 0.3 + 0.5 * 0.6), epsilon = 1e-12);
    }

    #[test]
    fn test_negative_lambda_rejected() {
        let c = cohort();
        let pilot = PilotObjective::new(c.times.view(), c.events.view(), c.blocks[0].view()).unwrap();
        assert!(AdaptiveLassoObjective::new(pilot, array![1.0, 1.0], -0.1).is_err());
    }

    #[test]
    fn test_cooperative_block_count() {
        let c = cohort();
        let one = CooperativeObjective::new(
            c.times.view(), c.events.view(), views(&c, 1), Array1::ones(2), 0.1, 0.5,
        );
        assert!(matches!(one.unwrap_err(), CoxError::InvalidBlockCount { found: 1 }));

        let mut four = views(&c, 3);
        four.push(c.blocks[0].view());
        let four = CooperativeObjective::new(
            c.times.view(), c.events.view(), four, Array1::ones(7), 0.1, 0.5,
        );
        assert!(matches!(four.unwrap_err(), CoxError::InvalidBlockCount { found: 4 }));
    }

    #[test]
    fn test_zero_alpha_is_sum_of_single_block_objectives() {
        let c = cohort();
        let weights = array![1.5, 0.5, 2.0];
        let beta = array![0.4, -0.2, 0.7];

        let coop = CooperativeObjective::new(
            c.times.view(), c.events.view(), views(&c, 2), weights.clone(), 0.2, 0.0,
        ).unwrap();

        let first = AdaptiveLassoObjective::new(
            PilotObjective::new(c.times.view(), c.events.view(), c.blocks[0].view()).unwrap(),
            weights.slice(ndarray::s![0..2]).to_owned(),
            0.2,
        ).unwrap();
        let second = AdaptiveLassoObjective::new(
            PilotObjective::new(c.times.view(), c.events.view(), c.blocks[1].view()).unwrap(),
            weights.slice(ndarray::s![2..3]).to_owned(),
            0.2,
        ).unwrap();

        let separate = first.evaluate(beta.slice(ndarray::s![0..2]))
            + second.evaluate(beta.slice(ndarray::s![2..3]));
        assert_relative_eq!(coop.evaluate(beta.view()), separate, epsilon = 1e-12);
    }

    #[test]
    fn test_cooperation_penalty_two_blocks() {
        let c = cohort();
        let coop = CooperativeObjective::new(
            c.times.view(), c.events.view(), views(&c, 2), Array1::ones(3), 0.0, 0.5,
        ).unwrap();
        let beta = array![1.0, 0.0, 1.0];

        let eta_a = c.blocks[0].column(0).to_owned();
        let eta_b = c.blocks[1].column(0).to_owned();
        let expected: f64 = 0.5 * (&eta_a - &eta_b).mapv(|d| d * d).sum();
        assert_relative_eq!(coop.cooperation_penalty(beta.view()), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_chain_never_links_first_and_third_block() {
        let c = cohort();
        let coop = CooperativeObjective::new(
            c.times.view(), c.events.view(), views(&c, 3), Array1::ones(5), 0.0, 1.0,
        ).unwrap();

        let before = array![0.2, -0.1, 0.5, 0.3, 0.7];
        let mut after = before.clone();
        after[0] = 1.4; // move block 1 only, block 2 held fixed

        let pair = |beta: &Array1<f64>| -> f64 {
            let eta_a = c.blocks[0].dot(&beta.slice(ndarray::s![0..2]));
            let eta_b = c.blocks[1].dot(&beta.slice(ndarray::s![2..3]));
            (&eta_a - &eta_b).mapv(|d| d * d).sum()
        };

        // the whole change is explained by the 1-2 pair
        let delta = coop.cooperation_penalty(after.view()) - coop.cooperation_penalty(before.view());
        assert_relative_eq!(delta, pair(&after) - pair(&before), epsilon = 1e-10);

        // a full topology does pick up the extra 1-3 interaction
        let full = coop.clone().with_topology(CooperationTopology::FullPairwise);
        let full_delta = full.cooperation_penalty(after.view()) - full.cooperation_penalty(before.view());
        assert!((full_delta - delta).abs() > 1e-6);
    }

    #[test]
    fn test_topology_pairs() {
        assert_eq!(CooperationTopology::Chain.pairs(3), vec![(0, 1), (1, 2)]);
        assert_eq!(CooperationTopology::Chain.pairs(2), vec![(0, 1)]);
        assert_eq!(CooperationTopology::FullPairwise.pairs(3), vec![(0, 1), (0, 2), (1, 2)]);
    }

    #[test]
    fn test_wrong_length_beta_is_nan() {
        let c = cohort();
        let pilot = PilotObjective::new(c.times.view(), c.events.view(), c.blocks[0].view()).unwrap();
        assert!(pilot.evaluate(array![0.1, 0.2, 0.3].view()).is_nan());

        let lasso = AdaptiveLassoObjective::new(pilot, array![1.0, 1.0], 0.1).unwrap();
        assert!(lasso.evaluate(array![0.1].view()).is_nan());

        let coop = CooperativeObjective::new(
            c.times.view(), c.events.view(), views(&c, 3), Array1::ones(5), 0.1, 0.5,
        ).unwrap();
        assert!(coop.evaluate(array![0.1, 0.2].view()).is_nan());
        assert!(coop.cooperation_penalty(Array1::from_elem(6, 0.1).view()).is_nan());
    }
}
