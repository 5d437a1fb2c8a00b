//! Triplet classification metrics for log-loss training.
//!
//! Predictions are probabilities (or any score where larger means "true")
//! and labels are `1.0` / `0.0`.

/// Fraction of rows where `pred > threshold` agrees with the label.
///
/// With `reverse` the comparison flips to `pred < threshold`, for scores
/// where smaller means "true".
pub fn accuracy(pred: &[f32], labels: &[f32], threshold: f32, reverse: bool) -> f64 {
    if pred.is_empty() {
        return 0.0;
    }
    let correct = pred
        .iter()
        .zip(labels)
        .filter(|&(&p, &y)| {
            let predicted = if reverse { p < threshold } else { p > threshold };
            predicted == (y > 0.5)
        })
        .count();
    correct as f64 / pred.len() as f64
}

/// Area under the ROC curve via the rank-sum statistic.
///
/// Tied predictions share their average rank. Returns `None` when either
/// class is absent.
pub fn auc(pred: &[f32], labels: &[f32]) -> Option<f64> {
    let n_pos = labels.iter().filter(|&&y| y > 0.5).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..pred.len()).collect();
    order.sort_by(|&a, &b| pred[a].total_cmp(&pred[b]));

    let mut ranks = vec![0.0f64; pred.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && pred[order[j + 1]] == pred[order[i]] {
            j += 1;
        }
        // 1-based ranks i+1..=j+1 share their mean
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = ranks
        .iter()
        .zip(labels)
        .filter(|&(_, &y)| y > 0.5)
        .map(|(r, _)| r)
        .sum();
    let n_pos = n_pos as f64;
    Some((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64))
}

/// Threshold in `[min(pred), max(pred))`, stepped by `increment`, with the
/// best [`accuracy`]. The first of equally good thresholds wins; `0.0` if
/// no threshold beats zero accuracy.
pub fn find_threshold(pred: &[f32], labels: &[f32], increment: f32, reverse: bool) -> f32 {
    let (lo, hi) = pred
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &p| {
            (lo.min(p), hi.max(p))
        });
    if pred.is_empty() || increment <= 0.0 {
        return 0.0;
    }

    let mut best = (0.0f32, 0.0f64);
    let mut step = 0u32;
    loop {
        let threshold = lo + increment * step as f32;
        if threshold >= hi {
            break;
        }
        let acc = accuracy(pred, labels, threshold, reverse);
        if acc > best.1 {
            best = (threshold, acc);
        }
        step += 1;
    }
    best.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_counts_agreement() {
        let pred = [0.9, 0.2, 0.6, 0.4];
        let labels = [1.0, 0.0, 0.0, 1.0];
        assert!((accuracy(&pred, &labels, 0.5, false) - 0.5).abs() < 1e-12);
        assert!((accuracy(&pred, &[1.0, 0.0, 1.0, 0.0], 0.5, false) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn reversed_accuracy_treats_low_scores_as_true() {
        let pred = [0.1, 0.9];
        let labels = [1.0, 0.0];
        assert!((accuracy(&pred, &labels, 0.5, true) - 1.0).abs() < 1e-12);
        assert!(accuracy(&pred, &labels, 0.5, false).abs() < 1e-12);
    }

    #[test]
    fn auc_perfect_and_inverted() {
        let labels = [0.0, 0.0, 1.0, 1.0];
        assert_eq!(auc(&[0.1, 0.2, 0.8, 0.9], &labels), Some(1.0));
        assert_eq!(auc(&[0.9, 0.8, 0.2, 0.1], &labels), Some(0.0));
    }

    #[test]
    fn auc_ties_count_half() {
        let labels = [0.0, 1.0];
        assert_eq!(auc(&[0.5, 0.5], &labels), Some(0.5));

        // one positive above both negatives, one tied with a negative
        let labels = [1.0, 1.0, 0.0, 0.0];
        let pred = [0.9, 0.3, 0.3, 0.1];
        assert_eq!(auc(&pred, &labels), Some(0.875));
    }

    #[test]
    fn auc_undefined_for_single_class() {
        assert_eq!(auc(&[0.1, 0.2], &[1.0, 1.0]), None);
    }

    #[test]
    fn threshold_separates_classes() {
        let pred = [0.1, 0.2, 0.3, 0.7, 0.8];
        let labels = [0.0, 0.0, 0.0, 1.0, 1.0];
        let t = find_threshold(&pred, &labels, 0.05, false);
        assert!(t >= 0.3 && t < 0.7);
        assert!((accuracy(&pred, &labels, t, false) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn threshold_of_empty_input_is_zero() {
        assert_eq!(find_threshold(&[], &[], 0.1, false), 0.0);
    }
}
