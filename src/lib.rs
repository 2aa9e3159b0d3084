//! # cooperative cox
//!
//! adaptive-lasso cox proportional hazards, optionally fused across 2-3
//! co-registered feature blocks (omics layers) - w/ its own optimizer,
//! baseline hazard and cross-validated lambda selection
//!
//! ## what you get
//!
//! - cox partial likelihood w/ inclusive-tie risk sets
//! - adaptive lasso (weights from an unpenalized pilot fit)
//! - cooperative penalty pulling the blocks' linear predictors together
//! - pluggable derivative-free minimizers (simulated annealing by default)
//! - breslow baseline hazard -> per-subject hazard & survival curves
//! - repeated hold-out lambda selection, run in parallel when you want it
//!
//! ## quick start
//!
//! ```rust
//! use coop_cox::{CoxModel, SurvivalData};
//! use ndarray::Array2;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let times = vec![1.0, 2.5, 3.2, 4.1, 5.0, 6.3];
//! let events = vec![true, false, true, true, false, true]; // true = died, false = censored
//! let expression = Array2::from_shape_vec((6, 2), vec![
//!     1.0, 0.5,
//!     2.0, 1.0,
//!     1.5, 0.0,
//!     3.0, 1.5,
//!     0.2, 0.1,
//!     2.2, 0.9,
//! ])?;
//! let methylation = Array2::from_shape_vec((6, 1), vec![0.3, -0.1, 0.4, 0.8, -0.5, 0.6])?;
//! let data = SurvivalData::new(times, events, vec![expression, methylation])?;
//!
//! // two blocks, cooperation strength 0.5
//! let mut model = CoxModel::cooperative(0.5)
//!     .with_lambda(0.1)
//!     .with_max_iterations(200);
//! model.fit(&data, &mut StdRng::seed_from_u64(42))?;
//!
//! let surface = model.predict_surface(data.concatenated().view())?;
//! assert_eq!(surface.survival.nrows(), 6);
//! # Ok(())
//! # }
//! ```

pub mod data;
pub mod likelihood;
pub mod objective;
pub mod optimization;
pub mod baseline;
pub mod model;
pub mod metrics;
pub mod cross_validation;
pub mod error;

pub use data::SurvivalData;
pub use model::{CoxFit, CoxModel, FitMode};
pub use objective::CooperationTopology;
pub use optimization::{CoordinateSearch, Minimizer, SimulatedAnnealing};
pub use baseline::{BreslowEstimator, PredictionSurface};
pub use cross_validation::{CrossValidationResult, CrossValidator};
pub use error::{CoxError, Result};
