//! Logistic Regression for binary classification
//!
//! L2-regularized logistic regression fit by full-batch gradient descent.
//! The objective follows the `C` convention: `C * Σ log_loss + ½‖w‖²`,
//! so a larger `C` means weaker regularization. The intercept is not
//! penalized.

use ndarray::{Array1, Array2, Axis};
use thiserror::Error;

/// Errors for logistic regression
#[derive(Error, Debug, PartialEq)]
pub enum LogisticRegressionError {
    #[error("Model has not been fitted yet")]
    NotFitted,

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Invalid labels: {0}")]
    InvalidLabels(String),

    #[error("Empty input")]
    EmptyInput,

    #[error("Invalid regularization strength C = {0}; must be positive")]
    InvalidParameter(f64),
}

/// Logistic Regression classifier
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    /// Fitted coefficients, in the units of the input features
    pub coefficients: Option<Array1<f64>>,
    /// Intercept term
    pub intercept: Option<f64>,
    /// Inverse regularization strength
    c: f64,
    max_iter: usize,
    /// Stop when the objective improves by less than this
    tolerance: f64,
    /// Regularized objective per iteration
    pub cost_history: Vec<f64>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self {
            coefficients: None,
            intercept: None,
            c: 1.0,
            max_iter: 1000,
            tolerance: 1e-6,
            cost_history: Vec::new(),
        }
    }
}

impl LogisticRegression {
    pub fn new(c: f64, max_iter: usize, tolerance: f64) -> Result<Self, LogisticRegressionError> {
        if !(c.is_finite() && c > 0.0) {
            return Err(LogisticRegressionError::InvalidParameter(c));
        }
        Ok(Self {
            c,
            max_iter,
            tolerance,
            ..Default::default()
        })
    }

    pub fn c(&self) -> f64 {
        self.c
    }

    pub fn is_fitted(&self) -> bool {
        self.coefficients.is_some()
    }

    /// Iterations run by the last `fit`.
    pub fn n_iter(&self) -> usize {
        self.cost_history.len()
    }

    fn sigmoid(z: f64) -> f64 {
        if z >= 0.0 {
            1.0 / (1.0 + (-z).exp())
        } else {
            let exp_z = z.exp();
            exp_z / (1.0 + exp_z)
        }
    }

    /// Summed binary cross-entropy.
    fn log_loss_sum(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
        let eps = 1e-15;
        -y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(&y, &p)| {
                let p = p.clamp(eps, 1.0 - eps);
                y * p.ln() + (1.0 - y) * (1.0 - p).ln()
            })
            .sum::<f64>()
    }

    fn check_labels(y: &Array1<usize>) -> Result<Array1<f64>, LogisticRegressionError> {
        if let Some(&bad) = y.iter().find(|&&l| l > 1) {
            return Err(LogisticRegressionError::InvalidLabels(format!(
                "expected labels in {{0, 1}}, found {}",
                bad
            )));
        }
        let positives = y.iter().filter(|&&l| l == 1).count();
        if positives == 0 || positives == y.len() {
            return Err(LogisticRegressionError::InvalidLabels(
                "need samples of both classes".to_string(),
            ));
        }
        Ok(y.mapv(|l| l as f64))
    }

    /// Fit using gradient descent.
    ///
    /// Features are standardized internally so a single step size works for
    /// any input scale; the stored coefficients are mapped back to the
    /// original units.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<&mut Self, LogisticRegressionError> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(LogisticRegressionError::EmptyInput);
        }
        if x.nrows() != y.len() {
            return Err(LogisticRegressionError::DimensionMismatch {
                expected: x.nrows(),
                got: y.len(),
            });
        }
        let y = Self::check_labels(y)?;

        let n_features = x.ncols();
        let mean = x.mean_axis(Axis(0)).ok_or(LogisticRegressionError::EmptyInput)?;
        let std = x.std_axis(Axis(0), 0.0).mapv(|s| if s > 1e-12 { s } else { 1.0 });
        let xs = (x - &mean) / &std;

        // Objective divided by C. The penalty acts on original-unit weights,
        // w = v / std.
        let penalty = std.mapv(|s| 1.0 / (s * s * self.c));

        // Lipschitz bound of the gradient: ¼ λmax(X̃ᵀX̃) + max penalty, with
        // the trace standing in for λmax.
        let n = x.nrows() as f64;
        let lipschitz = 0.25 * n * (n_features as f64 + 1.0) + penalty.fold(0.0f64, |a, &b| a.max(b));
        let step = 1.0 / lipschitz;

        let mut weights = Array1::<f64>::zeros(n_features);
        let mut bias = 0.0;
        self.cost_history.clear();

        let objective = |w: &Array1<f64>, predictions: &Array1<f64>| {
            Self::log_loss_sum(&y, predictions) + 0.5 * (w * w * &penalty).sum()
        };

        let mut converged = false;
        for iter in 0..self.max_iter {
            let predictions = (xs.dot(&weights) + bias).mapv(Self::sigmoid);
            let cost = objective(&weights, &predictions);
            self.cost_history.push(cost);

            if iter > 0 && (self.cost_history[iter - 1] - cost).abs() < self.tolerance {
                log::debug!("Converged at iteration {}", iter);
                converged = true;
                break;
            }

            let errors = &predictions - &y;
            let dw = xs.t().dot(&errors) + &weights * &penalty;
            let db = errors.sum();

            weights = &weights - &(dw * step);
            bias -= step * db;
        }
        if !converged {
            log::warn!(
                "LogisticRegression did not converge in {} iterations",
                self.max_iter
            );
        }

        let coefficients = &weights / &std;
        let intercept = bias - (&coefficients * &mean).sum();
        log::info!(
            "LogisticRegression fit: coef {:?}, intercept {:.4}, {} iterations",
            coefficients.to_vec(),
            intercept,
            self.n_iter()
        );

        self.coefficients = Some(coefficients);
        self.intercept = Some(intercept);
        Ok(self)
    }

    fn params(&self, x: &Array2<f64>) -> Result<(&Array1<f64>, f64), LogisticRegressionError> {
        let weights = self
            .coefficients
            .as_ref()
            .ok_or(LogisticRegressionError::NotFitted)?;
        let bias = self.intercept.ok_or(LogisticRegressionError::NotFitted)?;
        if x.ncols() != weights.len() {
            return Err(LogisticRegressionError::DimensionMismatch {
                expected: weights.len(),
                got: x.ncols(),
            });
        }
        Ok((weights, bias))
    }

    /// Get decision function values (log-odds)
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>, LogisticRegressionError> {
        let (weights, bias) = self.params(x)?;
        Ok(x.dot(weights) + bias)
    }

    /// Probability of class 1 per row.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>, LogisticRegressionError> {
        Ok(self.decision_function(x)?.mapv(Self::sigmoid))
    }

    /// Predict class labels (0 or 1)
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>, LogisticRegressionError> {
        Ok(self.decision_function(x)?.mapv(|z| usize::from(z > 0.0)))
    }

    /// Mean accuracy on `(x, y)`.
    pub fn score(&self, x: &Array2<f64>, y: &Array1<usize>) -> Result<f64, LogisticRegressionError> {
        if x.nrows() != y.len() {
            return Err(LogisticRegressionError::DimensionMismatch {
                expected: x.nrows(),
                got: y.len(),
            });
        }
        if y.is_empty() {
            return Err(LogisticRegressionError::EmptyInput);
        }
        let predictions = self.predict(x)?;
        let correct = predictions.iter().zip(y.iter()).filter(|(p, t)| p == t).count();
        Ok(correct as f64 / y.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn separable() -> (Array2<f64>, Array1<usize>) {
        let x = array![
            [0.0, 0.0],
            [0.5, 0.5],
            [1.0, 1.0],
            [5.0, 5.0],
            [5.5, 5.5],
            [6.0, 6.0]
        ];
        (x, array![0, 0, 0, 1, 1, 1])
    }

    #[test]
    fn test_sigmoid() {
        assert!((LogisticRegression::sigmoid(0.0) - 0.5).abs() < 1e-10);
        assert!(LogisticRegression::sigmoid(100.0) > 0.99);
        assert!(LogisticRegression::sigmoid(-800.0) >= 0.0);
    }

    #[test]
    fn test_separable_data_is_fit_perfectly() {
        let (x, y) = separable();
        let mut model = LogisticRegression::default();
        model.fit(&x, &y).unwrap();

        assert_eq!(model.predict(&x).unwrap(), y);
        assert_eq!(model.score(&x, &y).unwrap(), 1.0);

        let proba = model.predict_proba(&x).unwrap();
        assert!(proba[0] < 0.5 && proba[5] > 0.5);
    }

    #[test]
    fn test_cost_decreases() {
        let (x, y) = separable();
        let mut model = LogisticRegression::default();
        model.fit(&x, &y).unwrap();
        let first = model.cost_history[0];
        let last = *model.cost_history.last().unwrap();
        assert!(last < first);
        assert!(model.n_iter() > 1);
    }

    #[test]
    fn test_stronger_regularization_shrinks_coefficients() {
        let (x, y) = separable();
        let mut weak = LogisticRegression::new(10.0, 5000, 1e-9).unwrap();
        let mut strong = LogisticRegression::new(0.01, 5000, 1e-9).unwrap();
        weak.fit(&x, &y).unwrap();
        strong.fit(&x, &y).unwrap();

        let norm = |m: &LogisticRegression| {
            m.coefficients.as_ref().unwrap().iter().map(|c| c * c).sum::<f64>().sqrt()
        };
        assert!(norm(&strong) < norm(&weak));
    }

    #[test]
    fn test_decision_function_sign_matches_predict() {
        let (x, y) = separable();
        let mut model = LogisticRegression::default();
        model.fit(&x, &y).unwrap();
        let z = model.decision_function(&x).unwrap();
        let pred = model.predict(&x).unwrap();
        for (zi, pi) in z.iter().zip(pred.iter()) {
            assert_eq!(*pi == 1, *zi > 0.0);
        }
    }

    #[test]
    fn test_errors() {
        let (x, y) = separable();
        let model = LogisticRegression::default();
        assert_eq!(model.predict(&x).unwrap_err(), LogisticRegressionError::NotFitted);

        let mut model = LogisticRegression::default();
        assert!(matches!(
            model.fit(&x, &array![0, 1]),
            Err(LogisticRegressionError::DimensionMismatch { expected: 6, got: 2 })
        ));
        assert!(matches!(
            model.fit(&x, &array![0, 0, 0, 0, 0, 0]),
            Err(LogisticRegressionError::InvalidLabels(_))
        ));
        assert!(matches!(
            model.fit(&x, &array![0, 1, 2, 0, 1, 2]),
            Err(LogisticRegressionError::InvalidLabels(_))
        ));
        assert_eq!(
            model.fit(&Array2::zeros((0, 2)), &Array1::zeros(0)).unwrap_err(),
            LogisticRegressionError::EmptyInput
        );
        assert!(LogisticRegression::new(0.0, 10, 1e-4).is_err());

        model.fit(&x, &y).unwrap();
        assert!(matches!(
            model.predict(&Array2::zeros((1, 3))),
            Err(LogisticRegressionError::DimensionMismatch { expected: 2, got: 3 })
        ));
    }
}
