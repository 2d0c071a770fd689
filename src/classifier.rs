use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::label::Label;
use crate::vectorizer::FeatureVector;

pub const DEFAULT_C: f64 = 1.0;
pub const DEFAULT_MAX_ITER: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogisticConfig {
    /// Inverse regularization strength.
    pub c: f64,
    pub max_iter: usize,
    /// Stop once the largest gradient component falls below this.
    pub tolerance: f64,
    /// Number of correction pairs kept by L-BFGS.
    pub memory: usize,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            c: DEFAULT_C,
            max_iter: DEFAULT_MAX_ITER,
            tolerance: 1e-4,
            memory: 10,
        }
    }
}

/// Outcome of a fit, for logging and reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitSummary {
    pub iterations: usize,
    pub converged: bool,
    pub loss: f64,
}

/// Binary logistic model: `P(spam | x) = sigmoid(w · x + b)`.
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticRegression {
    weights: Vec<f64>,
    bias: f64,
}

impl LogisticRegression {
    pub fn from_parameters(weights: Vec<f64>, bias: f64) -> Self {
        Self { weights, bias }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn n_features(&self) -> usize {
        self.weights.len()
    }

    pub fn decision_function(&self, x: &FeatureVector) -> f64 {
        x.dot(&self.weights) + self.bias
    }

    /// Estimated probability that `x` is spam.
    pub fn predict_probability(&self, x: &FeatureVector) -> f64 {
        sigmoid(self.decision_function(x))
    }

    /// Label at the 0.5 cut-off, used for evaluation.
    pub fn predict(&self, x: &FeatureVector) -> Label {
        if self.predict_probability(x) >= 0.5 {
            Label::Spam
        } else {
            Label::Legitimate
        }
    }

    /// Minimize `mean log-loss + ||w||² / (2·C·n)` with L-BFGS. The bias is
    /// not regularized.
    pub fn fit(
        x: &[FeatureVector],
        y: &[Label],
        n_features: usize,
        config: &LogisticConfig,
    ) -> Result<(Self, FitSummary)> {
        if x.is_empty() {
            return Err(Error::Training("no training samples".into()));
        }
        if x.len() != y.len() {
            return Err(Error::Training(format!(
                "{} samples but {} labels",
                x.len(),
                y.len()
            )));
        }
        if !(config.c > 0.0) {
            return Err(Error::Config(format!("C must be positive, got {}", config.c)));
        }
        let spam = y.iter().filter(|label| label.is_spam()).count();
        if spam == 0 || spam == y.len() {
            return Err(Error::Training(
                "training data needs samples of both classes".into(),
            ));
        }

        let objective = Objective {
            x,
            y,
            n_features,
            penalty: 1.0 / (config.c * x.len() as f64),
        };
        let (theta, summary) = minimize(&objective, config);

        if summary.converged {
            info!(
                iterations = summary.iterations,
                loss = summary.loss,
                "logistic regression converged"
            );
        } else {
            warn!(
                iterations = summary.iterations,
                loss = summary.loss,
                "logistic regression did not converge; consider raising max_iter"
            );
        }

        let mut weights = theta;
        let bias = weights.pop().unwrap_or_default();
        Ok((Self { weights, bias }, summary))
    }
}

pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `ln(1 + e^z)` without overflow.
fn softplus(z: f64) -> f64 {
    z.max(0.0) + (-z.abs()).exp().ln_1p()
}

/// Parameters are laid out as `[w_0, .., w_{d-1}, b]`.
struct Objective<'a> {
    x: &'a [FeatureVector],
    y: &'a [Label],
    n_features: usize,
    penalty: f64,
}

impl Objective<'_> {
    fn dim(&self) -> usize {
        self.n_features + 1
    }

    fn evaluate(&self, theta: &[f64], grad: &mut [f64]) -> f64 {
        let (weights, bias) = theta.split_at(self.n_features);
        let bias = bias[0];
        let n = self.x.len() as f64;

        grad.iter_mut().for_each(|g| *g = 0.0);
        let mut loss = 0.0;
        for (x, label) in self.x.iter().zip(self.y) {
            let y = label.as_f64();
            let z = x.dot(weights) + bias;
            loss += softplus(z) - y * z;

            let residual = sigmoid(z) - y;
            for (index, value) in x.iter() {
                if index < self.n_features {
                    grad[index] += residual * value;
                }
            }
            grad[self.n_features] += residual;
        }

        loss /= n;
        grad.iter_mut().for_each(|g| *g /= n);

        let mut norm = 0.0;
        for (g, w) in grad.iter_mut().zip(weights) {
            *g += self.penalty * w;
            norm += w * w;
        }
        loss + 0.5 * self.penalty * norm
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn max_abs(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |acc: f64, x| acc.max(x.abs()))
}

/// L-BFGS with Armijo backtracking.
fn minimize(objective: &Objective<'_>, config: &LogisticConfig) -> (Vec<f64>, FitSummary) {
    const ARMIJO: f64 = 1e-4;
    const MAX_BACKTRACKS: usize = 40;
    const FTOL: f64 = 1e-12;

    let dim = objective.dim();
    let mut theta = vec![0.0; dim];
    let mut grad = vec![0.0; dim];
    let mut loss = objective.evaluate(&theta, &mut grad);

    let mut history: Vec<(Vec<f64>, Vec<f64>, f64)> = Vec::with_capacity(config.memory);
    let mut candidate = vec![0.0; dim];
    let mut candidate_grad = vec![0.0; dim];

    for iteration in 0..config.max_iter {
        if max_abs(&grad) <= config.tolerance {
            return (
                theta,
                FitSummary {
                    iterations: iteration,
                    converged: true,
                    loss,
                },
            );
        }

        let mut direction = two_loop(&grad, &history);
        let mut slope = dot(&grad, &direction);
        if slope >= 0.0 {
            history.clear();
            direction = grad.iter().map(|g| -g).collect();
            slope = -dot(&grad, &grad);
        }

        // The first step is scaled down since there is no curvature yet.
        let mut step = if history.is_empty() {
            (1.0 / max_abs(&grad)).min(1.0)
        } else {
            1.0
        };
        let mut accepted = None;
        for _ in 0..MAX_BACKTRACKS {
            for ((c, t), d) in candidate.iter_mut().zip(&theta).zip(&direction) {
                *c = t + step * d;
            }
            let candidate_loss = objective.evaluate(&candidate, &mut candidate_grad);
            if candidate_loss <= loss + ARMIJO * step * slope {
                accepted = Some(candidate_loss);
                break;
            }
            step *= 0.5;
        }

        let Some(new_loss) = accepted else {
            debug!(iteration, "line search failed");
            return (
                theta,
                FitSummary {
                    iterations: iteration,
                    converged: max_abs(&grad) <= config.tolerance,
                    loss,
                },
            );
        };

        let s: Vec<f64> = candidate.iter().zip(&theta).map(|(c, t)| c - t).collect();
        let y: Vec<f64> = candidate_grad.iter().zip(&grad).map(|(c, g)| c - g).collect();
        let sy = dot(&s, &y);
        if sy > 1e-10 {
            if history.len() == config.memory.max(1) {
                history.remove(0);
            }
            history.push((s, y, 1.0 / sy));
        }

        let previous = loss;
        std::mem::swap(&mut theta, &mut candidate);
        std::mem::swap(&mut grad, &mut candidate_grad);
        loss = new_loss;
        debug!(iteration, loss, step, "lbfgs step");

        if (previous - loss) / previous.abs().max(loss.abs()).max(1.0) <= FTOL {
            return (
                theta,
                FitSummary {
                    iterations: iteration + 1,
                    converged: true,
                    loss,
                },
            );
        }
    }

    (
        theta,
        FitSummary {
            iterations: config.max_iter,
            converged: max_abs(&grad) <= config.tolerance,
            loss,
        },
    )
}

/// Approximate `-H⁻¹ g` from the stored correction pairs.
fn two_loop(grad: &[f64], history: &[(Vec<f64>, Vec<f64>, f64)]) -> Vec<f64> {
    let mut q = grad.to_vec();
    let mut alphas = vec![0.0; history.len()];

    for (i, (s, y, rho)) in history.iter().enumerate().rev() {
        let alpha = rho * dot(s, &q);
        alphas[i] = alpha;
        q.iter_mut().zip(y).for_each(|(q, y)| *q -= alpha * y);
    }

    if let Some((s, y, _)) = history.last() {
        let gamma = dot(s, y) / dot(y, y);
        q.iter_mut().for_each(|q| *q *= gamma);
    }

    for ((s, y, rho), alpha) in history.iter().zip(&alphas) {
        let beta = rho * dot(y, &q);
        q.iter_mut().zip(s).for_each(|(q, s)| *q += s * (alpha - beta));
    }

    q.iter_mut().for_each(|q| *q = -*q);
    q
}
