//! Classification and clustering agreement metrics.
//!
//! All scores guard zero denominators by returning 0.

/// Per-class precision/recall/F1 with support
#[derive(Debug, Clone)]
pub struct ClassMetrics {
    pub class: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Pooled scores over a prediction table
#[derive(Debug, Clone)]
pub struct OverallMetrics {
    pub accuracy: f64,
    pub precision_macro: f64,
    pub recall_macro: f64,
    pub f1_macro: f64,
    pub precision_weighted: f64,
    pub recall_weighted: f64,
    pub f1_weighted: f64,
}

/// Compute accuracy
pub fn accuracy(predictions: &[String], truths: &[String]) -> f64 {
    if predictions.is_empty() {
        return 0.0;
    }
    let correct = predictions
        .iter()
        .zip(truths)
        .filter(|(p, t)| p == t)
        .count();
    correct as f64 / predictions.len() as f64
}

/// Per-class precision, recall and F1 over the given class vocabulary
pub fn per_class(predictions: &[String], truths: &[String], classes: &[String]) -> Vec<ClassMetrics> {
    classes
        .iter()
        .map(|class| {
            let tp = predictions
                .iter()
                .zip(truths)
                .filter(|(p, t)| *p == class && *t == class)
                .count() as f64;
            let predicted = predictions.iter().filter(|p| *p == class).count() as f64;
            let support = truths.iter().filter(|t| *t == class).count();

            let precision = if predicted > 0.0 { tp / predicted } else { 0.0 };
            let recall = if support > 0 { tp / support as f64 } else { 0.0 };
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };

            ClassMetrics {
                class: class.clone(),
                precision,
                recall,
                f1,
                support,
            }
        })
        .collect()
}

/// Accuracy plus macro- and support-weighted precision/recall/F1
pub fn overall(predictions: &[String], truths: &[String], classes: &[String]) -> OverallMetrics {
    let per_class = per_class(predictions, truths, classes);
    let n_classes = per_class.len().max(1) as f64;
    let total_support: usize = per_class.iter().map(|m| m.support).sum();

    let macro_avg = |f: fn(&ClassMetrics) -> f64| -> f64 {
        per_class.iter().map(f).sum::<f64>() / n_classes
    };
    let weighted_avg = |f: fn(&ClassMetrics) -> f64| -> f64 {
        if total_support == 0 {
            return 0.0;
        }
        per_class
            .iter()
            .map(|m| f(m) * m.support as f64)
            .sum::<f64>()
            / total_support as f64
    };

    OverallMetrics {
        accuracy: accuracy(predictions, truths),
        precision_macro: macro_avg(|m| m.precision),
        recall_macro: macro_avg(|m| m.recall),
        f1_macro: macro_avg(|m| m.f1),
        precision_weighted: weighted_avg(|m| m.precision),
        recall_weighted: weighted_avg(|m| m.recall),
        f1_weighted: weighted_avg(|m| m.f1),
    }
}

fn contingency(a: &[usize], b: &[usize]) -> (Vec<Vec<f64>>, Vec<f64>, Vec<f64>, f64) {
    let n_a = a.iter().max().map(|&m| m + 1).unwrap_or(0);
    let n_b = b.iter().max().map(|&m| m + 1).unwrap_or(0);

    let mut table = vec![vec![0.0; n_b]; n_a];
    for (&i, &j) in a.iter().zip(b) {
        table[i][j] += 1.0;
    }

    let row_sums: Vec<f64> = table.iter().map(|row| row.iter().sum()).collect();
    let col_sums: Vec<f64> = (0..n_b)
        .map(|j| table.iter().map(|row| row[j]).sum())
        .collect();

    (table, row_sums, col_sums, a.len() as f64)
}

fn comb2(x: f64) -> f64 {
    x * (x - 1.0) / 2.0
}

/// Adjusted Rand index between two labelings
pub fn adjusted_rand_index(a: &[usize], b: &[usize]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let (table, row_sums, col_sums, n) = contingency(a, b);

    let sum_ij: f64 = table.iter().flatten().map(|&x| comb2(x)).sum();
    let sum_a: f64 = row_sums.iter().map(|&x| comb2(x)).sum();
    let sum_b: f64 = col_sums.iter().map(|&x| comb2(x)).sum();

    let expected = sum_a * sum_b / comb2(n).max(1.0);
    let max_index = (sum_a + sum_b) / 2.0;

    if (max_index - expected).abs() < f64::EPSILON {
        // both labelings are trivial; they agree perfectly
        return 1.0;
    }
    (sum_ij - expected) / (max_index - expected)
}

/// Normalized mutual information (arithmetic normalization)
pub fn normalized_mutual_info(a: &[usize], b: &[usize]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let (table, row_sums, col_sums, n) = contingency(a, b);

    let mut mutual_info = 0.0;
    for (i, row) in table.iter().enumerate() {
        for (j, &n_ij) in row.iter().enumerate() {
            if n_ij > 0.0 {
                mutual_info += (n_ij / n) * ((n * n_ij) / (row_sums[i] * col_sums[j])).ln();
            }
        }
    }

    let entropy = |sums: &[f64]| -> f64 {
        sums.iter()
            .filter(|&&s| s > 0.0)
            .map(|&s| -(s / n) * (s / n).ln())
            .sum()
    };
    let h_a = entropy(&row_sums);
    let h_b = entropy(&col_sums);

    let denom = (h_a + h_b) / 2.0;
    if denom <= f64::EPSILON {
        return 0.0;
    }
    (mutual_info / denom).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_accuracy() {
        let preds = strings(&["B", "T", "B", "NK"]);
        let truths = strings(&["B", "T", "T", "NK"]);
        assert_eq!(accuracy(&preds, &truths), 0.75);
        assert_eq!(accuracy(&[], &[]), 0.0);
    }

    #[test]
    fn test_per_class_metrics() {
        let preds = strings(&["B", "B", "T", "B"]);
        let truths = strings(&["B", "T", "T", "B"]);
        let classes = strings(&["B", "T"]);

        let metrics = per_class(&preds, &truths, &classes);
        // B: tp=2, predicted=3, support=2
        assert!((metrics[0].precision - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(metrics[0].recall, 1.0);
        assert_eq!(metrics[0].support, 2);
        // T: tp=1, predicted=1, support=2
        assert_eq!(metrics[1].precision, 1.0);
        assert_eq!(metrics[1].recall, 0.5);
    }

    #[test]
    fn test_overall_weighting() {
        let preds = strings(&["B", "B", "B", "T"]);
        let truths = strings(&["B", "B", "B", "B"]);
        let classes = strings(&["B", "T"]);

        let metrics = overall(&preds, &truths, &classes);
        assert_eq!(metrics.accuracy, 0.75);
        // all support is B, so weighted recall equals B's recall
        assert_eq!(metrics.recall_weighted, 0.75);
        // T has no support and zero scores drag the macro average down
        assert!(metrics.recall_macro < metrics.recall_weighted);
    }

    #[test]
    fn test_unpredicted_class_scores_zero() {
        let preds = strings(&["B", "B"]);
        let truths = strings(&["B", "T"]);
        let classes = strings(&["B", "T"]);
        let metrics = per_class(&preds, &truths, &classes);
        assert_eq!(metrics[1].precision, 0.0);
        assert_eq!(metrics[1].recall, 0.0);
        assert_eq!(metrics[1].f1, 0.0);
    }

    #[test]
    fn test_ari_perfect_agreement() {
        let a = vec![0, 0, 1, 1, 2, 2];
        // same partition under a label permutation
        let b = vec![2, 2, 0, 0, 1, 1];
        assert!((adjusted_rand_index(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ari_disagreement_is_low() {
        let a = vec![0, 0, 0, 1, 1, 1];
        let b = vec![0, 1, 0, 1, 0, 1];
        let score = adjusted_rand_index(&a, &b);
        assert!(score < 0.1, "expected low ARI, got {}", score);
    }

    #[test]
    fn test_nmi_perfect_agreement() {
        let a = vec![0, 0, 1, 1];
        let b = vec![1, 1, 0, 0];
        assert!((normalized_mutual_info(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_nmi_independent_labelings() {
        let a = vec![0, 0, 1, 1];
        let b = vec![0, 1, 0, 1];
        assert!(normalized_mutual_info(&a, &b) < 1e-9);
    }

    #[test]
    fn test_nmi_trivial_partition() {
        let a = vec![0, 0, 0];
        let b = vec![0, 1, 2];
        assert_eq!(normalized_mutual_info(&a, &b), 0.0);
    }
}
