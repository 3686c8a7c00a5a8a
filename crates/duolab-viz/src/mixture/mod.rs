//! Gaussian mixture model with full covariances, fitted by EM.

mod kmeans;
pub mod linalg;

use std::f64::consts::PI;

use ndarray::{Array1, Array2, Array3, Axis, Zip};
use rand::distributions::WeightedIndex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use thiserror::Error;

use linalg::{cholesky, log_det_from_cholesky, logsumexp, solve_lower};

#[derive(Error, Debug, PartialEq)]
pub enum MixtureError {
    #[error("Model has not been fitted yet")]
    NotFitted,

    #[error("Expected at least {n_components} samples, got {n_samples}")]
    TooFewSamples { n_samples: usize, n_components: usize },

    #[error("Covariance of component {component} is not positive definite; try a larger reg_covar")]
    SingularCovariance { component: usize },

    #[error("Empty input")]
    EmptyInput,

    #[error("Dimension mismatch: expected {expected} features, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

#[derive(Debug, Clone)]
struct Params {
    weights: Array1<f64>,
    means: Array2<f64>,
    covariances: Array3<f64>,
    cholesky: Vec<Array2<f64>>,
}

#[derive(Debug, Clone)]
struct Fitted {
    params: Params,
    converged: bool,
    n_iter: usize,
    lower_bound: f64,
}

/// Gaussian mixture with `n_components` full-covariance components.
///
/// Defaults: `max_iter = 100`, `tol = 1e-3` on the mean per-sample
/// log-likelihood, `reg_covar = 1e-6`, k-means initialization.
/// `random_state` seeds both initialization and [`sample`](Self::sample);
/// `None` draws from OS entropy.
#[derive(Debug, Clone)]
pub struct GaussianMixture {
    n_components: usize,
    max_iter: usize,
    tol: f64,
    reg_covar: f64,
    random_state: Option<u64>,
    fitted: Option<Fitted>,
}

impl GaussianMixture {
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            max_iter: 100,
            tol: 1e-3,
            reg_covar: 1e-6,
            random_state: None,
            fitted: None,
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_reg_covar(mut self, reg_covar: f64) -> Self {
        self.reg_covar = reg_covar;
        self
    }

    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }

    pub fn n_components(&self) -> usize {
        self.n_components
    }

    pub fn random_state(&self) -> Option<u64> {
        self.random_state
    }

    fn rng(&self) -> StdRng {
        match self.random_state {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    fn fitted(&self) -> Result<&Fitted, MixtureError> {
        self.fitted.as_ref().ok_or(MixtureError::NotFitted)
    }

    pub fn converged(&self) -> bool {
        self.fitted.as_ref().is_some_and(|f| f.converged)
    }

    /// EM iterations run by the last `fit`.
    pub fn n_iter(&self) -> usize {
        self.fitted.as_ref().map_or(0, |f| f.n_iter)
    }

    /// Mean per-sample log-likelihood at the end of the last `fit`.
    pub fn lower_bound(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.lower_bound)
    }

    pub fn weights(&self) -> Option<&Array1<f64>> {
        self.fitted.as_ref().map(|f| &f.params.weights)
    }

    pub fn means(&self) -> Option<&Array2<f64>> {
        self.fitted.as_ref().map(|f| &f.params.means)
    }

    /// `[n_components, d, d]`.
    pub fn covariances(&self) -> Option<&Array3<f64>> {
        self.fitted.as_ref().map(|f| &f.params.covariances)
    }

    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self, MixtureError> {
        let (n, d) = x.dim();
        if n == 0 || d == 0 {
            return Err(MixtureError::EmptyInput);
        }
        if self.n_components == 0 {
            return Err(MixtureError::InvalidParameter("n_components must be positive".to_string()));
        }
        if n < self.n_components {
            return Err(MixtureError::TooFewSamples {
                n_samples: n,
                n_components: self.n_components,
            });
        }

        let mut rng = self.rng();
        let labels = kmeans::kmeans_labels(x, self.n_components, &mut rng);
        let mut resp = Array2::<f64>::zeros((n, self.n_components));
        for (i, &l) in labels.iter().enumerate() {
            resp[[i, l]] = 1.0;
        }
        let mut params = self.m_step(x, &resp)?;

        let mut lower_bound = f64::NEG_INFINITY;
        let mut converged = false;
        let mut n_iter = 0;
        for iter in 1..=self.max_iter {
            n_iter = iter;
            let prev = lower_bound;
            let (mean_log_prob, log_resp) = Self::e_step(x, &params);
            params = self.m_step(x, &log_resp.mapv(f64::exp))?;
            lower_bound = mean_log_prob;

            let change = lower_bound - prev;
            log::debug!("EM iteration {}: lower bound {:.6} (change {:.3e})", iter, lower_bound, change);
            if change.abs() < self.tol {
                converged = true;
                break;
            }
        }

        if converged {
            log::info!(
                "GaussianMixture converged after {} iterations (lower bound {:.4})",
                n_iter,
                lower_bound
            );
        } else {
            log::warn!(
                "GaussianMixture did not converge in {} iterations; consider raising max_iter or tol",
                self.max_iter
            );
        }

        self.fitted = Some(Fitted {
            params,
            converged,
            n_iter,
            lower_bound,
        });
        Ok(self)
    }

    /// Weighted-mean parameter update from responsibilities `[n, k]`.
    fn m_step(&self, x: &Array2<f64>, resp: &Array2<f64>) -> Result<Params, MixtureError> {
        let (n, d) = x.dim();
        let k = self.n_components;
        let nk = resp.sum_axis(Axis(0)) + 10.0 * f64::EPSILON;

        let means = resp.t().dot(x) / &nk.view().insert_axis(Axis(1));

        let mut covariances = Array3::<f64>::zeros((k, d, d));
        let mut factors = Vec::with_capacity(k);
        for c in 0..k {
            let diff = x - &means.row(c);
            let weighted = &diff * &resp.column(c).insert_axis(Axis(1));
            let mut cov = weighted.t().dot(&diff) / nk[c];
            for i in 0..d {
                cov[[i, i]] += self.reg_covar;
            }
            let l = cholesky(&cov).ok_or(MixtureError::SingularCovariance { component: c })?;
            covariances.index_axis_mut(Axis(0), c).assign(&cov);
            factors.push(l);
        }

        Ok(Params {
            weights: nk / n as f64,
            means,
            covariances,
            cholesky: factors,
        })
    }

    /// `log p(x_n | c) + log π_c` for every sample and component.
    fn weighted_log_prob(x: &Array2<f64>, params: &Params) -> Array2<f64> {
        let (n, d) = x.dim();
        let k = params.weights.len();
        let log_norm: Vec<f64> = params
            .cholesky
            .iter()
            .zip(params.weights.iter())
            .map(|(l, w)| -0.5 * (d as f64 * (2.0 * PI).ln() + log_det_from_cholesky(l)) + w.ln())
            .collect();

        let mut out = Array2::<f64>::zeros((n, k));
        Zip::from(out.rows_mut())
            .and(x.rows())
            .par_for_each(|mut row_out, xi| {
                for c in 0..k {
                    let diff = &xi - &params.means.row(c);
                    let z = solve_lower(&params.cholesky[c], &diff.view());
                    row_out[c] = log_norm[c] - 0.5 * z.dot(&z);
                }
            });
        out
    }

    /// Returns the mean log-likelihood and the log responsibilities.
    fn e_step(x: &Array2<f64>, params: &Params) -> (f64, Array2<f64>) {
        let mut weighted = Self::weighted_log_prob(x, params);
        let log_norm: Array1<f64> = weighted.rows().into_iter().map(|r| logsumexp(&r)).collect();
        weighted -= &log_norm.view().insert_axis(Axis(1));
        let mean = log_norm.mean().unwrap_or(f64::NEG_INFINITY);
        (mean, weighted)
    }

    fn check_input(&self, x: &Array2<f64>) -> Result<&Fitted, MixtureError> {
        let fitted = self.fitted()?;
        if x.nrows() == 0 {
            return Err(MixtureError::EmptyInput);
        }
        let d = fitted.params.means.ncols();
        if x.ncols() != d {
            return Err(MixtureError::DimensionMismatch {
                expected: d,
                got: x.ncols(),
            });
        }
        Ok(fitted)
    }

    /// Per-sample log-likelihood `log p(x)`.
    pub fn score_samples(&self, x: &Array2<f64>) -> Result<Array1<f64>, MixtureError> {
        let fitted = self.check_input(x)?;
        let weighted = Self::weighted_log_prob(x, &fitted.params);
        Ok(weighted.rows().into_iter().map(|r| logsumexp(&r)).collect())
    }

    /// Mean per-sample log-likelihood.
    pub fn score(&self, x: &Array2<f64>) -> Result<f64, MixtureError> {
        let scores = self.score_samples(x)?;
        scores.mean().ok_or(MixtureError::EmptyInput)
    }

    /// Posterior component probabilities `[n, k]`.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>, MixtureError> {
        let fitted = self.check_input(x)?;
        let (_, log_resp) = Self::e_step(x, &fitted.params);
        Ok(log_resp.mapv(f64::exp))
    }

    /// Most likely component per sample.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>, MixtureError> {
        let fitted = self.check_input(x)?;
        let weighted = Self::weighted_log_prob(x, &fitted.params);
        Ok(weighted
            .rows()
            .into_iter()
            .map(|r| {
                r.iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))
                    .map_or(0, |(i, _)| i)
            })
            .collect())
    }

    fn n_parameters(&self, d: usize) -> usize {
        let k = self.n_components;
        k * d * (d + 1) / 2 + k * d + k - 1
    }

    /// Bayesian information criterion on `x`; lower is better.
    pub fn bic(&self, x: &Array2<f64>) -> Result<f64, MixtureError> {
        let n = x.nrows() as f64;
        let p = self.n_parameters(x.ncols()) as f64;
        Ok(-2.0 * self.score(x)? * n + p * n.ln())
    }

    /// Akaike information criterion on `x`; lower is better.
    pub fn aic(&self, x: &Array2<f64>) -> Result<f64, MixtureError> {
        let n = x.nrows() as f64;
        let p = self.n_parameters(x.ncols()) as f64;
        Ok(-2.0 * self.score(x)? * n + 2.0 * p)
    }

    /// Draws `n_samples` points from the fitted mixture.
    ///
    /// Component counts follow a multinomial over the weights; points are
    /// returned grouped by component, together with the component of each.
    pub fn sample(&self, n_samples: usize) -> Result<(Array2<f64>, Array1<usize>), MixtureError> {
        let fitted = self.fitted()?;
        if n_samples == 0 {
            return Err(MixtureError::InvalidParameter(
                "n_samples must be at least 1".to_string(),
            ));
        }
        let params = &fitted.params;
        let d = params.means.ncols();
        let mut rng = self.rng();

        let chooser = WeightedIndex::new(params.weights.iter())
            .map_err(|e| MixtureError::InvalidParameter(format!("mixture weights: {}", e)))?;
        let mut counts = vec![0usize; params.weights.len()];
        for _ in 0..n_samples {
            counts[chooser.sample(&mut rng)] += 1;
        }

        let mut points = Array2::<f64>::zeros((n_samples, d));
        let mut labels = Array1::<usize>::zeros(n_samples);
        let mut row = 0;
        for (c, &count) in counts.iter().enumerate() {
            let l = &params.cholesky[c];
            for _ in 0..count {
                let z: Array1<f64> = Array1::from_shape_fn(d, |_| StandardNormal.sample(&mut rng));
                let point = &params.means.row(c) + &l.dot(&z);
                points.row_mut(row).assign(&point);
                labels[row] = c;
                row += 1;
            }
        }
        Ok((points, labels))
    }
}
