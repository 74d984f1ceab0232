use crate::cli::Analysis;
use anyhow::{bail, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use tracing::debug;

/// One train/test partition produced by a split strategy.
#[derive(Debug, Clone)]
pub struct SplitFold {
    /// Row indices of the training subset
    pub train: Vec<usize>,
    /// Row indices of the test subset
    pub test: Vec<usize>,
    /// Fold label written to the `index_split` column of result tables
    pub label: String,
    /// Number of held-out groups, set by the leave-P-groups-out strategy
    pub groups_out: Option<usize>,
}

/// Data-splitting strategies, one per analysis mode.
#[derive(Debug, Clone, PartialEq)]
pub enum SplitStrategy {
    /// Single shuffled split with the given test fraction
    TrainTestSplit { test_size: f64 },
    /// Stratified k-fold over the label column
    StratifiedKFold { n_splits: usize },
    /// Stratified k-fold repeated with fresh shuffles
    RepeatedStratifiedKFold { n_splits: usize, n_repeats: usize },
    /// One fold per cell type, that type held out
    LeaveOneGroupOut,
    /// Random draws of P cell types held out together
    LeavePGroupsOut { p_values: Vec<usize>, iterations: usize },
    /// No split: a single fold training on every row
    NoSplit,
}

impl SplitStrategy {
    /// Strategy driven by an analysis mode, with the fixed scheme parameters
    pub fn for_analysis(analysis: Analysis) -> Self {
        match analysis {
            Analysis::Clustering => SplitStrategy::LeavePGroupsOut {
                p_values: vec![2, 4, 6, 8],
                iterations: 20,
            },
            Analysis::Encoding => SplitStrategy::TrainTestSplit { test_size: 0.3 },
            Analysis::Retrieval => SplitStrategy::NoSplit,
            Analysis::RetrievalLof => SplitStrategy::LeaveOneGroupOut,
            Analysis::EvaluateSkf => SplitStrategy::StratifiedKFold { n_splits: 10 },
            Analysis::EvaluateRskf => SplitStrategy::RepeatedStratifiedKFold {
                n_splits: 10,
                n_repeats: 50,
            },
        }
    }

    /// Strategy name used in model output paths
    pub fn name(&self) -> &'static str {
        match self {
            SplitStrategy::TrainTestSplit { .. } => "train_test_split",
            SplitStrategy::StratifiedKFold { .. } => "StratifiedKFold",
            SplitStrategy::RepeatedStratifiedKFold { .. } => "RepeatedStratifiedKFold",
            SplitStrategy::LeaveOneGroupOut => "LeaveOneGroupOut",
            SplitStrategy::LeavePGroupsOut { .. } => "LeavePGroupsOut",
            SplitStrategy::NoSplit => "None",
        }
    }

    /// Generate the ordered fold list for a label column.
    ///
    /// Labels double as the grouping key for the group-based strategies.
    pub fn generate(&self, labels: &[String], seed: u64) -> Result<Vec<SplitFold>> {
        if labels.is_empty() {
            bail!("cannot split an empty dataset");
        }
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let folds = match self {
            SplitStrategy::TrainTestSplit { test_size } => {
                train_test_split(labels.len(), *test_size, &mut rng)?
            }
            SplitStrategy::StratifiedKFold { n_splits } => {
                stratified_kfold(labels, *n_splits, &mut rng)?
                    .into_iter()
                    .enumerate()
                    .map(|(i, (train, test))| SplitFold {
                        train,
                        test,
                        label: format!("fold_{}", i),
                        groups_out: None,
                    })
                    .collect()
            }
            SplitStrategy::RepeatedStratifiedKFold { n_splits, n_repeats } => {
                let mut folds = Vec::with_capacity(n_splits * n_repeats);
                for repeat in 0..*n_repeats {
                    for (i, (train, test)) in
                        stratified_kfold(labels, *n_splits, &mut rng)?.into_iter().enumerate()
                    {
                        folds.push(SplitFold {
                            train,
                            test,
                            label: format!("repeat_{}_fold_{}", repeat, i),
                            groups_out: None,
                        });
                    }
                }
                folds
            }
            SplitStrategy::LeaveOneGroupOut => leave_one_group_out(labels),
            SplitStrategy::LeavePGroupsOut { p_values, iterations } => {
                leave_p_groups_out(labels, p_values, *iterations, &mut rng)?
            }
            SplitStrategy::NoSplit => vec![SplitFold {
                train: (0..labels.len()).collect(),
                test: Vec::new(),
                label: "all".to_string(),
                groups_out: None,
            }],
        };

        debug!("{} generated {} folds", self.name(), folds.len());
        Ok(folds)
    }
}

fn train_test_split(n: usize, test_size: f64, rng: &mut ChaCha8Rng) -> Result<Vec<SplitFold>> {
    if !(0.0..1.0).contains(&test_size) || test_size <= 0.0 {
        bail!("test size must be in (0, 1), got {}", test_size);
    }

    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);

    let n_test = ((n as f64) * test_size).round() as usize;
    let n_test = n_test.clamp(1, n - 1);

    Ok(vec![SplitFold {
        train: indices[n_test..].to_vec(),
        test: indices[..n_test].to_vec(),
        label: "split_0".to_string(),
        groups_out: None,
    }])
}

/// Distribute each class round-robin over `n_splits` folds after a seeded
/// per-class shuffle, then pair every fold as test against the rest.
fn stratified_kfold(
    labels: &[String],
    n_splits: usize,
    rng: &mut ChaCha8Rng,
) -> Result<Vec<(Vec<usize>, Vec<usize>)>> {
    if n_splits < 2 {
        bail!("stratified k-fold needs at least 2 splits");
    }

    let mut by_class: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, label) in labels.iter().enumerate() {
        by_class.entry(label.as_str()).or_default().push(i);
    }

    let mut classes: Vec<&str> = by_class.keys().copied().collect();
    classes.sort();

    let mut fold_members: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
    for class in classes {
        let members = by_class.get_mut(class).unwrap();
        if members.len() < n_splits {
            bail!(
                "cell type '{}' has {} members, fewer than the {} stratified folds",
                class,
                members.len(),
                n_splits
            );
        }
        members.shuffle(rng);
        for (i, &idx) in members.iter().enumerate() {
            fold_members[i % n_splits].push(idx);
        }
    }

    let folds = (0..n_splits)
        .map(|f| {
            let test = fold_members[f].clone();
            let train = fold_members
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != f)
                .flat_map(|(_, m)| m.iter().copied())
                .collect();
            (train, test)
        })
        .collect();

    Ok(folds)
}

fn leave_one_group_out(labels: &[String]) -> Vec<SplitFold> {
    let mut groups: Vec<String> = labels.to_vec();
    groups.sort();
    groups.dedup();

    groups
        .iter()
        .map(|group| {
            let (test, train): (Vec<usize>, Vec<usize>) =
                (0..labels.len()).partition(|&i| &labels[i] == group);
            SplitFold {
                train,
                test,
                label: group.clone(),
                groups_out: Some(1),
            }
        })
        .collect()
}

fn leave_p_groups_out(
    labels: &[String],
    p_values: &[usize],
    iterations: usize,
    rng: &mut ChaCha8Rng,
) -> Result<Vec<SplitFold>> {
    let mut groups: Vec<String> = labels.to_vec();
    groups.sort();
    groups.dedup();

    let mut folds = Vec::new();
    for &p in p_values {
        if p == 0 || p >= groups.len() {
            bail!(
                "cannot leave {} cell types out of {} distinct types",
                p,
                groups.len()
            );
        }

        for iteration in 0..iterations {
            let mut drawn = groups.clone();
            drawn.shuffle(rng);
            drawn.truncate(p);
            drawn.sort();

            let held_out: Vec<&str> = drawn.iter().map(|g| g.as_str()).collect();
            let (test, train): (Vec<usize>, Vec<usize>) =
                (0..labels.len()).partition(|&i| held_out.contains(&labels[i].as_str()));

            folds.push(SplitFold {
                train,
                test,
                label: format!("p{}_iter{}_{}", p, iteration, drawn.join("|")),
                groups_out: Some(p),
            });
        }
    }

    Ok(folds)
}
