use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use crate::{
    baseline::{BaselineEstimator, BaselineHazard, BreslowEstimator, PredictionSurface},
    data::SurvivalData,
    error::{CoxError, Result},
    likelihood::linear_predictor,
    metrics::harrell_c_index,
    objective::{
        adaptive_weights, AdaptiveLassoObjective, CooperationTopology, CooperativeObjective,
        Objective, PilotObjective,
    },
    optimization::{normalize_unit, Minimizer, SimulatedAnnealing},
};

/// one design matrix, or 2-3 blocks tied together by the cooperation term
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitMode {
    SingleBlock,
    Cooperative,
}

/// adaptive-lasso cox model, single-block or cooperative
///
/// fit = pilot fit on all features -> adaptive weights -> penalized fit ->
/// breslow baseline from the training times. coefficients are unit-norm
/// after each stage unless normalization is switched off, so `lambda` acts
/// on a fixed-scale direction rather than a free-scale estimate.
#[derive(Debug, Clone)]
pub struct CoxModel {
    mode: FitMode,
    lambda: f64,                          // adaptive lasso strength
    alpha: f64,                           // cooperation strength (0 = off)
    max_iterations: usize,                // penalized-stage budget
    pilot_iterations: Option<usize>,      // defaults to a tenth of max_iterations
    normalize: bool,                      // unit-norm after every stage
    topology: CooperationTopology,
    minimizer: Arc<dyn Minimizer>,
    baseline_estimator: Arc<dyn BaselineEstimator>,
    feature_names: Option<Vec<String>>,
    pilot: Option<Array1<f64>>,
    coefficients: Option<Array1<f64>>,
    block_widths: Vec<usize>,
    baseline: Option<BaselineHazard>,
}

impl Default for CoxModel {
    fn default() -> Self {
        Self {
            mode: FitMode::SingleBlock,
            lambda: 0.1,
            alpha: 0.0,
            max_iterations: 1000,
            pilot_iterations: None,
            normalize: true,
            topology: CooperationTopology::Chain,
            minimizer: Arc::new(SimulatedAnnealing::default()),
            baseline_estimator: Arc::new(BreslowEstimator),
            feature_names: None,
            pilot: None,
            coefficients: None,
            block_widths: Vec::new(),
            baseline: None,
        }
    }
}

impl CoxModel {
    /// single-block adaptive lasso w/ defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// cooperative fit over 2-3 blocks
    pub fn cooperative(alpha: f64) -> Self {
        Self {
            mode: FitMode::Cooperative,
            alpha,
            ..Self::default()
        }
    }

    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// budget for the penalized stage
    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    /// budget for the pilot stage
    pub fn with_pilot_iterations(mut self, pilot_iter: usize) -> Self {
        self.pilot_iterations = Some(pilot_iter);
        self
    }

    pub fn with_normalization(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn with_topology(mut self, topology: CooperationTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_minimizer(mut self, minimizer: impl Minimizer + 'static) -> Self {
        self.minimizer = Arc::new(minimizer);
        self
    }

    pub fn with_baseline_estimator(mut self, estimator: impl BaselineEstimator + 'static) -> Self {
        self.baseline_estimator = Arc::new(estimator);
        self
    }

    /// give names to your features for nicer output
    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        self.feature_names = Some(names);
        self
    }

    pub fn mode(&self) -> FitMode {
        self.mode
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    fn pilot_budget(&self) -> usize {
        self.pilot_iterations.unwrap_or((self.max_iterations / 10).max(1))
    }

    fn validate(&self, data: &SurvivalData) -> Result<()> {
        if !self.lambda.is_finite() || self.lambda < 0.0 {
            return Err(CoxError::invalid_parameter("lambda", self.lambda));
        }
        if !self.alpha.is_finite() || self.alpha < 0.0 {
            return Err(CoxError::invalid_parameter("alpha", self.alpha));
        }
        if self.max_iterations == 0 {
            return Err(CoxError::invalid_parameter("max_iterations", 0));
        }
        match self.mode {
            FitMode::SingleBlock if data.n_blocks() != 1 => {
                Err(CoxError::invalid_parameter("n_blocks", data.n_blocks()))
            }
            FitMode::Cooperative if !(2..=3).contains(&data.n_blocks()) => {
                Err(CoxError::invalid_block_count(data.n_blocks()))
            }
            _ => Ok(()),
        }
    }

    fn run_stage(&self, objective: &dyn Objective, budget: usize, rng: &mut StdRng) -> Result<Array1<f64>> {
        let mut beta = self.minimizer.minimize(objective, budget, rng)?;
        if self.normalize {
            normalize_unit(&mut beta);
        }
        Ok(beta)
    }

    /// fit the model to data - pilot, penalized fit, baseline hazard
    pub fn fit(&mut self, data: &SurvivalData, rng: &mut StdRng) -> Result<&mut Self> {
        self.validate(data)?;

        let design = data.concatenated();
        let pilot_objective = PilotObjective::new(data.times(), data.events(), design.view())?;
        let pilot = self.run_stage(&pilot_objective, self.pilot_budget(), rng)?;
        log::debug!(
            "pilot fit: {} coefficients, budget {}, objective {:.6}",
            pilot.len(), self.pilot_budget(), pilot_objective.evaluate(pilot.view())
        );

        let weights = adaptive_weights(pilot.view());
        let coefficients = match self.mode {
            FitMode::SingleBlock => {
                let objective = AdaptiveLassoObjective::new(pilot_objective, weights, self.lambda)?;
                self.run_stage(&objective, self.max_iterations, rng)?
            }
            FitMode::Cooperative => {
                let blocks: Vec<ArrayView2<'_, f64>> = data.blocks().iter().map(|b| b.view()).collect();
                let objective = CooperativeObjective::new(
                    data.times(), data.events(), blocks, weights, self.lambda, self.alpha,
                )?
                .with_topology(self.topology);
                self.run_stage(&objective, self.max_iterations, rng)?
            }
        };
        log::debug!(
            "penalized fit (lambda = {}, alpha = {}): {} of {} coefficients above 1e-3",
            self.lambda, self.alpha,
            coefficients.iter().filter(|b| b.abs() > 1e-3).count(), coefficients.len()
        );

        let baseline = BaselineHazard::fit(self.baseline_estimator.as_ref(), data.times(), data.events())?;

        self.pilot = Some(pilot);
        self.coefficients = Some(coefficients);
        self.block_widths = data.block_widths();
        self.baseline = Some(baseline);
        Ok(self)
    }

    /// fit on `train`, then predict curves for `validation` (concatenated blocks)
    pub fn fit_predict(
        &mut self,
        train: &SurvivalData,
        validation: ArrayView2<f64>,
        rng: &mut StdRng,
    ) -> Result<CoxFit> {
        self.fit(train, rng)?;
        let surface = self.predict_surface(validation)?;
        Ok(CoxFit {
            coefficients: self.coefficients()?.to_owned(),
            time_grid: surface.times,
            hazard: surface.hazard,
            survival: surface.survival,
        })
    }

    /// get the fitted coefficients (all blocks, in block order)
    pub fn coefficients(&self) -> Result<ArrayView1<'_, f64>> {
        match &self.coefficients {
            Some(coefs) => Ok(coefs.view()),
            None => Err(CoxError::NotFitted),
        }
    }

    /// the pilot estimate the adaptive weights came from
    pub fn pilot_coefficients(&self) -> Result<ArrayView1<'_, f64>> {
        self.pilot.as_ref().map(|p| p.view()).ok_or(CoxError::NotFitted)
    }

    /// coefficients of block `k`
    pub fn block_coefficients(&self, k: usize) -> Result<ArrayView1<'_, f64>> {
        let coefs = self.coefficients()?;
        if k >= self.block_widths.len() {
            return Err(CoxError::invalid_parameter("block", k));
        }
        let start: usize = self.block_widths[..k].iter().sum();
        let end = start + self.block_widths[k];
        Ok(coefs.slice_move(ndarray::s![start..end]))
    }

    pub fn baseline(&self) -> Result<&BaselineHazard> {
        self.baseline.as_ref().ok_or(CoxError::NotFitted)
    }

    /// linear predictors for new patients (blocks concatenated column-wise)
    pub fn predict(&self, covariates: ArrayView2<f64>) -> Result<Array1<f64>> {
        let coefs = self.coefficients()?;

        if covariates.ncols() != coefs.len() {
            return Err(CoxError::shape_mismatch(
                format!("feature count mismatch: expected {}, got {}",
                       coefs.len(), covariates.ncols())
            ));
        }

        linear_predictor(covariates, coefs)
    }

    /// predict hazard ratios (exp of risk scores)
    pub fn predict_hazard_ratios(&self, covariates: ArrayView2<f64>) -> Result<Array1<f64>> {
        let linear_predictors = self.predict(covariates)?;
        Ok(linear_predictors.mapv(f64::exp))
    }

    /// hazard & survival curves on the training event-time grid
    pub fn predict_surface(&self, covariates: ArrayView2<f64>) -> Result<PredictionSurface> {
        let eta = self.predict(covariates)?;
        Ok(self.baseline()?.predict(eta.view()))
    }

    /// harrell's c of the fitted risk scores on a cohort
    pub fn concordance(&self, data: &SurvivalData) -> Result<f64> {
        let risk = self.predict(data.concatenated().view())?;
        harrell_c_index(risk.view(), data.times(), data.events())
    }

    /// feature importance = abs value of coefficients
    pub fn feature_importance(&self) -> Result<Array1<f64>> {
        let coefs = self.coefficients()?;
        Ok(coefs.mapv(f64::abs))
    }

    /// get a nice summary of the fitted model
    pub fn summary(&self) -> Result<ModelSummary> {
        let coefs = self.coefficients()?.to_owned();
        let hazard_ratios = coefs.mapv(f64::exp);
        let nonzero_per_block = (0..self.block_widths.len())
            .map(|k| {
                self.block_coefficients(k)
                    .map(|b| b.iter().filter(|&&x| x.abs() > ModelSummary::ZERO_TOLERANCE).count())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ModelSummary {
            coefficients: coefs,
            hazard_ratios,
            block_widths: self.block_widths.clone(),
            nonzero_per_block,
            lambda: self.lambda,
            alpha: self.alpha,
            mode: self.mode,
            feature_names: self.feature_names.clone(),
        })
    }

    /// has this model been fit to data yet?
    pub fn is_fitted(&self) -> bool {
        self.coefficients.is_some() && self.baseline.is_some()
    }
}

/// everything a single fit hands back
#[derive(Debug, Clone)]
pub struct CoxFit {
    pub coefficients: Array1<f64>, // all blocks, in block order
    pub time_grid: Array1<f64>,    // training event times minus the last
    pub hazard: Array2<f64>,       // n_query x grid
    pub survival: Array2<f64>,     // n_query x grid
}

/// nice summary of what the model learned
#[derive(Debug, Clone)]
pub struct ModelSummary {
    pub coefficients: Array1<f64>,
    pub hazard_ratios: Array1<f64>,
    pub block_widths: Vec<usize>,
    pub nonzero_per_block: Vec<usize>,
    pub lambda: f64,
    pub alpha: f64,
    pub mode: FitMode,
    pub feature_names: Option<Vec<String>>,
}

impl ModelSummary {
    /// coefficients at or below this are reported as zero
    pub const ZERO_TOLERANCE: f64 = 1e-3;

    /// print out what we learned
    pub fn print(&self) {
        println!("adaptive lasso cox model summary ({:?})", self.mode);
        println!("=========================================");
        println!("lambda: {:.6}", self.lambda);
        println!("alpha:  {:.6}", self.alpha);
        println!();

        println!("{:<8} {:<20} {:>12} {:>12}", "block", "feature", "coefficient", "hazard ratio");
        println!("{:-<55}", "");

        let mut i = 0;
        for (k, &width) in self.block_widths.iter().enumerate() {
            for _ in 0..width {
                let default_name = format!("x{}", i);
                let feature_name = match &self.feature_names {
                    Some(names) => names.get(i).map(|s| s.as_str()).unwrap_or(&default_name),
                    None => &default_name,
                };

                println!("{:<8} {:<20} {:>12.6} {:>12.6}",
                        k + 1,
                        feature_name,
                        self.coefficients[i],
                        self.hazard_ratios[i]);
                i += 1;
            }
        }

        println!();
        for (k, (&nonzero, &width)) in self.nonzero_per_block.iter().zip(&self.block_widths).enumerate() {
            println!("block {}: {} of {} coefficients nonzero", k + 1, nonzero, width);
        }
    }
}
