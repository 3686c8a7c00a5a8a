//! Linear classifiers.

mod logistic;

pub use logistic::{LogisticRegression, LogisticRegressionError};
