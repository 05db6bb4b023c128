//! Binary classification metrics on probability scores

use ndarray::Array1;

/// Area under the ROC curve via the rank-sum statistic.
///
/// Tied scores share their average rank. Returns 0.5 when only one class is
/// present.
pub fn roc_auc(y_true: &Array1<f64>, scores: &Array1<f64>) -> f64 {
    let n = scores.len().min(y_true.len());

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        scores[a]
            .partial_cmp(&scores[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let n_pos = (0..n).filter(|&i| y_true[i] > 0.5).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    // Sum of ascending ranks of the positives
    let mut rank_sum_pos = 0.0f64;
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && scores[order[j]] == scores[order[i]] {
            j += 1;
        }
        let avg_rank = (i + 1 + j) as f64 / 2.0;
        for &idx in &order[i..j] {
            if y_true[idx] > 0.5 {
                rank_sum_pos += avg_rank;
            }
        }
        i = j;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    (rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg)
}

/// Share of rows classified correctly at `threshold`
pub fn accuracy(y_true: &Array1<f64>, scores: &Array1<f64>, threshold: f64) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true
        .iter()
        .zip(scores.iter())
        .filter(|(t, s)| (**t > 0.5) == (**s > threshold))
        .count();
    correct as f64 / y_true.len() as f64
}

/// Mean squared difference between probability and label
pub fn brier_score(y_true: &Array1<f64>, scores: &Array1<f64>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    y_true
        .iter()
        .zip(scores.iter())
        .map(|(t, s)| (t - s).powi(2))
        .sum::<f64>()
        / y_true.len() as f64
}

/// Root of the Brier score
pub fn rmse(y_true: &Array1<f64>, scores: &Array1<f64>) -> f64 {
    brier_score(y_true, scores).sqrt()
}

/// Binary cross-entropy with probabilities clipped to [1e-15, 1 - 1e-15]
pub fn log_loss(y_true: &Array1<f64>, scores: &Array1<f64>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    const EPS: f64 = 1e-15;
    -y_true
        .iter()
        .zip(scores.iter())
        .map(|(t, s)| {
            let p = s.clamp(EPS, 1.0 - EPS);
            t * p.ln() + (1.0 - t) * (1.0 - p).ln()
        })
        .sum::<f64>()
        / y_true.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_auc_perfect() {
        let y = array![0.0, 0.0, 1.0, 1.0];
        let s = array![0.1, 0.2, 0.8, 0.9];
        assert!((roc_auc(&y, &s) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_auc_worst() {
        let y = array![1.0, 1.0, 0.0, 0.0];
        let s = array![0.1, 0.2, 0.8, 0.9];
        assert!(roc_auc(&y, &s).abs() < 1e-12);
    }

    #[test]
    fn test_auc_ties() {
        let y = array![0.0, 1.0, 0.0, 1.0];
        let s = array![0.5, 0.5, 0.5, 0.5];
        assert!((roc_auc(&y, &s) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_auc_partial() {
        // One of four positive/negative pairs is misordered
        let y = array![0.0, 1.0, 0.0, 1.0];
        let s = array![0.1, 0.3, 0.4, 0.9];
        assert!((roc_auc(&y, &s) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_auc_single_class() {
        let y = array![1.0, 1.0];
        let s = array![0.2, 0.7];
        assert_eq!(roc_auc(&y, &s), 0.5);
    }

    #[test]
    fn test_accuracy_and_brier() {
        let y = array![1.0, 0.0, 1.0, 0.0];
        let s = array![0.9, 0.2, 0.4, 0.6];
        assert_eq!(accuracy(&y, &s, 0.5), 0.5);
        let brier = brier_score(&y, &s);
        assert!((brier - (0.01 + 0.04 + 0.36 + 0.36) / 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_log_loss_clips() {
        let y = array![1.0, 0.0];
        let s = array![0.0, 1.0];
        assert!(log_loss(&y, &s).is_finite());
    }
}
