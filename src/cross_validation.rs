//! lambda selection by repeated hold-out
//!
//! subjects are shuffled once; each of the `folds` repetitions takes the
//! next `floor(n/folds)` of them as its validation chunk, so whatever is left
//! after the last chunk is never validated (it always trains). every
//! (fold, lambda) pair refits the model on the remaining subjects, reads each
//! validation subject's survival at the grid time nearest its own time and
//! scores that against the event flag.

use std::sync::Arc;

use ndarray::{Array1, Array2, Axis};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use rayon::prelude::*;
use crate::{
    data::SurvivalData,
    error::{CoxError, Result},
    metrics::{BinaryConcordance, MeanAbsoluteError, MeanSquaredError, RocAuc, ValidationMetric},
    model::CoxModel,
};

/// shuffled validation chunks drawn without replacement
#[derive(Debug, Clone)]
pub struct FoldAssignment {
    n_samples: usize,
    chunks: Vec<Vec<usize>>,
    excluded: Vec<usize>, // never validated
}

impl FoldAssignment {
    pub fn new(n_samples: usize, folds: usize, rng: &mut StdRng) -> Result<Self> {
        if folds < 2 {
            return Err(CoxError::invalid_parameter("folds", folds));
        }
        if n_samples < folds {
            return Err(CoxError::invalid_parameter(
                "folds",
                format!("{} (only {} subjects)", folds, n_samples),
            ));
        }

        let chunk_size = n_samples / folds;
        let mut pool: Vec<usize> = (0..n_samples).collect();
        pool.shuffle(rng);

        let mut chunks = Vec::with_capacity(folds);
        let mut consumed = 0;
        for _ in 0..folds {
            let take = chunk_size.min(pool.len() - consumed);
            chunks.push(pool[consumed..consumed + take].to_vec());
            consumed += take;
        }
        let excluded = pool[consumed..].to_vec();

        Ok(Self { n_samples, chunks, excluded })
    }

    pub fn n_folds(&self) -> usize {
        self.chunks.len()
    }

    pub fn validation(&self, fold: usize) -> Result<&[usize]> {
        self.chunks
            .get(fold)
            .map(|chunk| chunk.as_slice())
            .ok_or_else(|| CoxError::invalid_parameter("fold", format!("{} of {}", fold, self.chunks.len())))
    }

    /// everyone outside the fold's validation chunk, ascending
    pub fn training(&self, fold: usize) -> Result<Vec<usize>> {
        let mut held_out = vec![false; self.n_samples];
        for &i in self.validation(fold)? {
            held_out[i] = true;
        }
        Ok((0..self.n_samples).filter(|&i| !held_out[i]).collect())
    }

    pub fn excluded(&self) -> &[usize] {
        &self.excluded
    }
}

/// folds x lambdas table of one metric; NaN marks an undefined or failed cell
#[derive(Debug, Clone)]
pub struct MetricTable {
    pub name: &'static str,
    pub values: Array2<f64>,
}

impl MetricTable {
    fn new(name: &'static str, folds: usize, lambdas: usize) -> Self {
        Self {
            name,
            values: Array2::from_elem((folds, lambdas), f64::NAN),
        }
    }

    /// per-lambda mean over the folds where the metric was defined (NaN if none)
    pub fn mean_by_lambda(&self) -> Array1<f64> {
        self.values.map_axis(Axis(0), |column| {
            let defined: Vec<f64> = column.iter().copied().filter(|v| !v.is_nan()).collect();
            if defined.is_empty() {
                f64::NAN
            } else {
                defined.iter().sum::<f64>() / defined.len() as f64
            }
        })
    }

    pub fn undefined_cells(&self) -> usize {
        self.values.iter().filter(|v| v.is_nan()).count()
    }
}

/// tables for every metric plus the selected lambda
#[derive(Debug, Clone)]
pub struct CrossValidationResult {
    pub lambdas: Vec<f64>,
    pub best_lambda: f64,
    pub best_index: usize,
    pub mae: MetricTable,
    pub auc: MetricTable,
    pub c_index: MetricTable,
    pub mse: MetricTable,
    pub criterion: MetricTable, // what the selection minimized (mse unless swapped)
    pub folds: FoldAssignment,
}

impl CrossValidationResult {
    /// print the per-lambda averages
    pub fn print(&self) {
        let (mae, auc, c_index, mse, criterion) = (
            self.mae.mean_by_lambda(),
            self.auc.mean_by_lambda(),
            self.c_index.mean_by_lambda(),
            self.mse.mean_by_lambda(),
            self.criterion.mean_by_lambda(),
        );

        println!("cross-validated lambda selection ({} folds)", self.folds.n_folds());
        println!("==========================================");
        println!("{:<10} {:>10} {:>10} {:>10} {:>10} {:>10}",
                 "lambda", "mae", "auc", "c-index", "mse", self.criterion.name);
        println!("{:-<65}", "");
        for (i, &lambda) in self.lambdas.iter().enumerate() {
            let marker = if i == self.best_index { " *" } else { "" };
            println!("{:<10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4}{}",
                     lambda, mae[i], auc[i], c_index[i], mse[i], criterion[i], marker);
        }
        println!("{:-<65}", "");
        println!("best lambda: {:.4}", self.best_lambda);
    }
}

/// grid search over lambda w/ the non-standard hold-out scheme above
#[derive(Debug, Clone)]
pub struct CrossValidator {
    model: CoxModel,    // everything but lambda comes from here
    lambdas: Vec<f64>,
    folds: usize,
    seed: u64,
    parallel: bool,
    selection: Arc<dyn ValidationMetric>,
}

impl CrossValidator {
    pub fn new(model: CoxModel, lambdas: Vec<f64>) -> Self {
        Self {
            model,
            lambdas,
            folds: 5,
            seed: 0,
            parallel: true,
            selection: Arc::new(MeanSquaredError),
        }
    }

    pub fn with_folds(mut self, folds: usize) -> Self {
        self.folds = folds;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// metric whose fold-average is minimized to pick lambda
    pub fn with_selection_metric(mut self, metric: impl ValidationMetric + 'static) -> Self {
        self.selection = Arc::new(metric);
        self
    }

    /// independent stream per (fold, lambda) so scheduling can't change results
    fn task_rng(&self, task: usize) -> StdRng {
        StdRng::seed_from_u64(self.seed ^ (task as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }

    fn score_task(&self, data: &SurvivalData, folds: &FoldAssignment, fold: usize, lambda: f64, task: usize) -> Result<[f64; 5]> {
        let train = data.subset(&folds.training(fold)?)?;
        let validation = data.subset(folds.validation(fold)?)?;

        let mut model = self.model.clone().with_lambda(lambda);
        let mut rng = self.task_rng(task);
        model.fit(&train, &mut rng)?;

        let surface = model.predict_surface(validation.concatenated().view())?;
        let predicted = surface.survival_at_observed(validation.times())?;
        let events = validation.events();

        let metrics: [&dyn ValidationMetric; 5] = [
            &MeanAbsoluteError,
            &RocAuc,
            &BinaryConcordance,
            &MeanSquaredError,
            self.selection.as_ref(),
        ];
        let mut scores = [f64::NAN; 5];
        for (slot, metric) in scores.iter_mut().zip(metrics) {
            match metric.score(predicted.view(), events) {
                Some(value) => *slot = value,
                None => log::warn!(
                    "fold {}, lambda {}: {} undefined, left out of the average",
                    fold, lambda, metric.name()
                ),
            }
        }
        Ok(scores)
    }

    /// run the full sweep and pick lambda
    pub fn run(&self, data: &SurvivalData) -> Result<CrossValidationResult> {
        if self.lambdas.is_empty() {
            return Err(CoxError::invalid_parameter("lambdas", "empty grid"));
        }
        if let Some(&bad) = self.lambdas.iter().find(|l| !l.is_finite() || **l < 0.0) {
            return Err(CoxError::invalid_parameter("lambda", bad));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let folds = FoldAssignment::new(data.n_samples(), self.folds, &mut rng)?;
        let n_lambdas = self.lambdas.len();

        let tasks: Vec<(usize, usize)> = (0..folds.n_folds())
            .flat_map(|f| (0..n_lambdas).map(move |l| (f, l)))
            .collect();

        let evaluate = |&(fold, l): &(usize, usize)| {
            let task = fold * n_lambdas + l;
            match self.score_task(data, &folds, fold, self.lambdas[l], task) {
                Ok(scores) => scores,
                Err(e) => {
                    log::warn!("fold {}, lambda {}: fit failed ({}), fold skipped", fold, self.lambdas[l], e);
                    [f64::NAN; 5]
                }
            }
        };
        let outcomes: Vec<[f64; 5]> = if self.parallel {
            tasks.par_iter().map(evaluate).collect()
        } else {
            tasks.iter().map(evaluate).collect()
        };

        let n_folds = folds.n_folds();
        let mut tables = [
            MetricTable::new(MeanAbsoluteError.name(), n_folds, n_lambdas),
            MetricTable::new(RocAuc.name(), n_folds, n_lambdas),
            MetricTable::new(BinaryConcordance.name(), n_folds, n_lambdas),
            MetricTable::new(MeanSquaredError.name(), n_folds, n_lambdas),
            MetricTable::new(self.selection.name(), n_folds, n_lambdas),
        ];
        for (&(fold, l), scores) in tasks.iter().zip(&outcomes) {
            for (table, &value) in tables.iter_mut().zip(scores) {
                table.values[[fold, l]] = value;
            }
        }

        let averaged = tables[4].mean_by_lambda();
        let best_index = averaged
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nan())
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .ok_or_else(|| CoxError::degenerate(
                format!("{} undefined for every lambda - all folds failed", tables[4].name)
            ))?;
        let best_lambda = self.lambdas[best_index];

        log::info!(
            "selected lambda = {} ({} = {:.6}) over {} folds x {} lambdas, {} undefined cells",
            best_lambda, tables[4].name, averaged[best_index], n_folds, n_lambdas,
            tables[4].undefined_cells()
        );

        let [mae, auc, c_index, mse, criterion] = tables;
        Ok(CrossValidationResult {
            lambdas: self.lambdas.clone(),
            best_lambda,
            best_index,
            mae,
            auc,
            c_index,
            mse,
            criterion,
            folds,
        })
    }

    /// refit on the whole cohort w/ the selected lambda
    pub fn fit_selected(&self, data: &SurvivalData, result: &CrossValidationResult, rng: &mut StdRng) -> Result<CoxModel> {
        let mut model = self.model.clone().with_lambda(result.best_lambda);
        model.fit(data, rng)?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_fold_partition_uneven() {
        let mut rng = StdRng::seed_from_u64(42);
        let folds = FoldAssignment::new(23, 5, &mut rng).unwrap();

        assert_eq!(folds.n_folds(), 5);
        for f in 0..5 {
            assert_eq!(folds.validation(f).unwrap().len(), 4);
            assert_eq!(folds.training(f).unwrap().len(), 19);
        }
        assert_eq!(folds.excluded().len(), 3);

        // chunks are disjoint and, with the leftovers, cover everyone once
        let mut seen = HashSet::new();
        for f in 0..5 {
            for &i in folds.validation(f).unwrap() {
                assert!(i < 23);
                assert!(seen.insert(i));
            }
        }
        for &i in folds.excluded() {
            assert!(seen.insert(i));
        }
        assert_eq!(seen.len(), 23);

        // leftovers always train
        for f in 0..5 {
            let train = folds.training(f).unwrap();
            assert!(folds.excluded().iter().all(|i| train.contains(i)));
        }
    }

    #[test]
    fn test_fold_partition_even() {
        let mut rng = StdRng::seed_from_u64(1);
        let folds = FoldAssignment::new(20, 4, &mut rng).unwrap();
        assert!(folds.excluded().is_empty());
        assert!((0..4).all(|f| folds.validation(f).unwrap().len() == 5));
    }

    #[test]
    fn test_fold_partition_is_seeded() {
        let a = FoldAssignment::new(30, 3, &mut StdRng::seed_from_u64(5)).unwrap();
        let b = FoldAssignment::new(30, 3, &mut StdRng::seed_from_u64(5)).unwrap();
        assert_eq!(a.validation(0).unwrap(), b.validation(0).unwrap());
        assert_eq!(a.validation(2).unwrap(), b.validation(2).unwrap());
    }

    #[test]
    fn test_out_of_range_fold_is_an_error() {
        let folds = FoldAssignment::new(23, 5, &mut StdRng::seed_from_u64(2)).unwrap();
        assert!(matches!(folds.validation(5), Err(CoxError::InvalidParameter { .. })));
        assert!(folds.training(7).is_err());
    }

    #[test]
    fn test_fold_partition_rejects_bad_counts() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(FoldAssignment::new(10, 1, &mut rng).is_err());
        assert!(FoldAssignment::new(3, 5, &mut rng).is_err());
    }

    #[test]
    fn test_mean_by_lambda_skips_undefined() {
        let mut table = MetricTable::new("auc", 3, 2);
        table.values = ndarray::array![
            [0.2, f64::NAN],
            [0.4, f64::NAN],
            [f64::NAN, f64::NAN],
        ];
        let means = table.mean_by_lambda();
        assert!((means[0] - 0.3).abs() < 1e-12);
        assert!(means[1].is_nan());
        assert_eq!(table.undefined_cells(), 4);
    }

    #[test]
    fn test_empty_grid_rejected() {
        let data = SurvivalData::single_block(
            vec![1.0, 2.0, 3.0, 4.0],
            vec![true, true, true, true],
            Array2::zeros((4, 1)),
        ).unwrap();
        let cv = CrossValidator::new(CoxModel::new(), vec![]);
        assert!(cv.run(&data).is_err());

        let cv = CrossValidator::new(CoxModel::new(), vec![0.1, -0.5]);
        assert!(cv.run(&data).is_err());
    }
}
