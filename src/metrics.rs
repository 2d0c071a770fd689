//! Confusion-matrix metrics. Undefined values (zero denominators) are NaN,
//! which keeps them distinguishable from a genuine 0.

use std::fmt;

use crate::label::Label;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub true_positives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    pub true_negatives: u64,
}

impl ConfusionMatrix {
    pub fn new(tp: u64, fp: u64, fn_: u64, tn: u64) -> Self {
        Self {
            true_positives: tp,
            false_positives: fp,
            false_negatives: fn_,
            true_negatives: tn,
        }
    }

    /// Rows are actual Yes/No, columns predicted Yes/No: `[[TP, FN], [FP, TN]]`.
    pub fn from_matrix(matrix: [[u64; 2]; 2]) -> Self {
        let [[tp, fn_], [fp, tn]] = matrix;
        Self::new(tp, fp, fn_, tn)
    }

    pub fn to_matrix(&self) -> [[u64; 2]; 2] {
        [
            [self.true_positives, self.false_negatives],
            [self.false_positives, self.true_negatives],
        ]
    }

    /// Spam is the positive class.
    pub fn from_predictions(actual: &[Label], predicted: &[Label]) -> Self {
        let mut matrix = Self::default();
        for (actual, predicted) in actual.iter().zip(predicted) {
            match (actual.is_spam(), predicted.is_spam()) {
                (true, true) => matrix.true_positives += 1,
                (true, false) => matrix.false_negatives += 1,
                (false, true) => matrix.false_positives += 1,
                (false, false) => matrix.true_negatives += 1,
            }
        }
        matrix
    }

    /// The same counts with the legitimate class as positive.
    pub fn inverted(&self) -> Self {
        Self::new(
            self.true_negatives,
            self.false_negatives,
            self.false_positives,
            self.true_positives,
        )
    }

    pub fn total(&self) -> u64 {
        self.true_positives + self.false_positives + self.false_negatives + self.true_negatives
    }

    pub fn metrics(&self) -> Metrics {
        compute_metrics(
            self.true_positives,
            self.false_positives,
            self.false_negatives,
            self.true_negatives,
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Metrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        f64::NAN
    } else {
        numerator as f64 / denominator as f64
    }
}

pub fn compute_metrics(tp: u64, fp: u64, fn_: u64, tn: u64) -> Metrics {
    let accuracy = ratio(tp + tn, tp + fp + fn_ + tn);
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if !precision.is_nan() && !recall.is_nan() && precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        f64::NAN
    };

    Metrics {
        accuracy,
        precision,
        recall,
        f1,
    }
}

pub fn from_confusion_matrix(matrix: [[u64; 2]; 2]) -> Metrics {
    ConfusionMatrix::from_matrix(matrix).metrics()
}

/// Area under the ROC curve via the rank-sum statistic, ties averaged.
/// `None` when `labels` holds a single class.
pub fn roc_auc(labels: &[Label], scores: &[f64]) -> Option<f64> {
    let n = labels.len().min(scores.len());
    let positives = labels[..n].iter().filter(|label| label.is_spam()).count();
    let negatives = n - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // Ranks are 1-based; tied entries share the average rank.
        let rank = (start + end + 1) as f64 / 2.0;
        positive_rank_sum += rank
            * order[start..end]
                .iter()
                .filter(|&&i| labels[i].is_spam())
                .count() as f64;
        start = end;
    }

    let positives = positives as f64;
    let negatives = negatives as f64;
    Some((positive_rank_sum - positives * (positives + 1.0) / 2.0) / (positives * negatives))
}

#[derive(Debug, Clone, Copy)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: u64,
}

/// Per-class breakdown in the layout of the usual text classification report.
#[derive(Debug, Clone, Copy)]
pub struct ClassificationReport {
    pub legitimate: ClassMetrics,
    pub spam: ClassMetrics,
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    pub fn new(matrix: &ConfusionMatrix) -> Self {
        let class = |matrix: &ConfusionMatrix| {
            let metrics = matrix.metrics();
            ClassMetrics {
                precision: metrics.precision,
                recall: metrics.recall,
                f1: metrics.f1,
                support: matrix.true_positives + matrix.false_negatives,
            }
        };
        let spam = class(matrix);
        let legitimate = class(&matrix.inverted());
        let support = spam.support + legitimate.support;

        let average = |pick: fn(&ClassMetrics) -> f64| (pick(&spam) + pick(&legitimate)) / 2.0;
        let weighted = |pick: fn(&ClassMetrics) -> f64| {
            if support == 0 {
                f64::NAN
            } else {
                (pick(&spam) * spam.support as f64 + pick(&legitimate) * legitimate.support as f64)
                    / support as f64
            }
        };

        Self {
            legitimate,
            spam,
            accuracy: matrix.metrics().accuracy,
            macro_avg: ClassMetrics {
                precision: average(|m| m.precision),
                recall: average(|m| m.recall),
                f1: average(|m| m.f1),
                support,
            },
            weighted_avg: ClassMetrics {
                precision: weighted(|m| m.precision),
                recall: weighted(|m| m.recall),
                f1: weighted(|m| m.f1),
                support,
            },
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let row = |f: &mut fmt::Formatter<'_>, name: &str, m: &ClassMetrics| {
            writeln!(
                f,
                "{name:>12} {:>9.4} {:>9.4} {:>9.4} {:>9}",
                m.precision, m.recall, m.f1, m.support
            )
        };

        writeln!(
            f,
            "{:>12} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        row(f, "legitimate", &self.legitimate)?;
        row(f, "spam", &self.spam)?;
        writeln!(f)?;
        writeln!(
            f,
            "{:>12} {:>9} {:>9} {:>9.4} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        row(f, "macro avg", &self.macro_avg)?;
        row(f, "weighted avg", &self.weighted_avg)
    }
}
