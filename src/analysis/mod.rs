pub mod kmeans;
pub mod metrics;
pub mod results;

use crate::cli::Analysis;
use crate::data::knowledge::HiddenLayerMask;
use crate::data::split::SplitStrategy;
use crate::data::{ExpressionMatrix, LabelEncoder};
use crate::model::architecture::{create_feature_tensor, init_model};
use crate::model::checkpoint::{CheckpointMetadata, ModelExporter};
use crate::model::{Activation, ModelConfig};
use crate::training::trainer::Trainer;
use crate::training::{TrainingConfig, TrainingResult};
use crate::utils::{self, OutputPaths, RunLog};
use anyhow::{Context, Result};
use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use results::{ClassificationRow, ClusteringRow, ResultTable};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

/// Everything a single analysis run needs besides the data itself.
#[derive(Debug, Clone)]
pub struct AnalysisRun {
    /// Design name
    pub design: String,
    /// Analysis mode
    pub analysis: Analysis,
    /// Dataset name used in exported file names
    pub dataset: String,
    /// Hidden-layer activation
    pub activation: Activation,
    /// Insert a second dense hidden layer
    pub second_hidden_layer: bool,
    /// Width of the second hidden layer
    pub second_hidden_units: usize,
    /// Training scheme
    pub training: TrainingConfig,
    /// Output directories
    pub paths: OutputPaths,
}

impl AnalysisRun {
    /// Tag shared by every file the run exports
    fn file_tag(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.design,
            self.dataset,
            self.training.optimizer.as_str(),
            self.activation.as_str()
        )
    }
}

/// What a finished run produced
#[derive(Debug, Default)]
pub struct AnalysisSummary {
    /// Number of folds trained
    pub folds: usize,
    /// Result rows accumulated across folds
    pub rows: usize,
    /// Detail table, when any fold produced rows
    pub detail_path: Option<PathBuf>,
    /// Metric tables
    pub metric_paths: Vec<PathBuf>,
    /// Saved model checkpoints
    pub model_paths: Vec<PathBuf>,
}

/// Run the analysis mode end to end: split, train per fold, branch into the
/// mode's evaluation/export behavior, then aggregate and export.
pub fn run<B: AutodiffBackend>(
    run: &AnalysisRun,
    data: &ExpressionMatrix,
    mask: &HiddenLayerMask,
    device: &B::Device,
    log: &mut RunLog,
) -> Result<AnalysisSummary> {
    let strategy = SplitStrategy::for_analysis(run.analysis);
    run_with_strategy::<B>(run, data, mask, &strategy, device, log)
}

/// [`run`] with an explicit split strategy.
pub fn run_with_strategy<B: AutodiffBackend>(
    run: &AnalysisRun,
    data: &ExpressionMatrix,
    mask: &HiddenLayerMask,
    strategy: &SplitStrategy,
    device: &B::Device,
    log: &mut RunLog,
) -> Result<AnalysisSummary> {
    let encoder = LabelEncoder::fit(&data.labels);
    let model_config = ModelConfig::new(encoder.len())
        .with_second_hidden_layer(run.second_hidden_layer)
        .with_second_hidden_units(run.second_hidden_units);

    let folds = strategy.generate(&data.labels, run.training.seed)?;
    log.save(&format!(
        "{} split produced {} folds over {} cells",
        strategy.name(),
        folds.len(),
        data.n_cells()
    ))?;

    let n_genes = data.n_genes();
    let trainer = Trainer::<B>::new(run.training.clone(), device.clone());
    let mut table = ResultTable::for_classes(encoder.classes().to_vec());
    let mut summary = AnalysisSummary {
        folds: folds.len(),
        ..Default::default()
    };

    for (fold_idx, fold) in folds.iter().enumerate() {
        let line = format!("{}/{} -- {}", fold_idx + 1, folds.len(), utils::clock_time());
        info!("{}", line);
        log.save(&line)?;

        let (train_values, train_labels) = data.subset(&fold.train);
        let train_targets = encoder.encode_all(&train_labels)?;

        // fresh weights per fold
        let model = init_model::<B>(
            &model_config,
            mask,
            run.activation,
            run.training.seed.wrapping_add(fold_idx as u64),
            device,
        );
        let (fitted, result) = trainer
            .train(model, &train_values, &train_targets, n_genes)
            .with_context(|| format!("training failed on fold '{}'", fold.label))?;
        let inference = fitted.valid();

        match run.analysis {
            Analysis::Retrieval | Analysis::RetrievalLof => {
                let path = run
                    .paths
                    .models
                    .join(format!("design_{}_{}.mpk", run.file_tag(), fold_idx));
                let metadata = checkpoint_metadata(run, &encoder, mask, &fold.label, &result, "model");
                ModelExporter::save(&inference, &path, &metadata)?;
                log.save(&format!("model saved --> {}", path.display()))?;
                summary.model_paths.push(path);
            }
            Analysis::Encoding => {
                let path = run
                    .paths
                    .models
                    .join(format!("encoding_{}.mpk", run.file_tag()));
                let metadata =
                    checkpoint_metadata(run, &encoder, mask, &fold.label, &result, "encoding");
                ModelExporter::save(&inference, &path, &metadata)?;
                log.save(&format!("encoding model saved --> {}", path.display()))?;
                summary.model_paths.push(path);
            }
            Analysis::Clustering => {
                let (test_values, test_labels) = data.subset(&fold.test);
                if test_labels.is_empty() {
                    continue;
                }

                let input = create_feature_tensor::<B::InnerBackend>(&test_values, n_genes, device);
                let encoded = inference.encode(input);
                let encoding_size = encoded.dims()[1];
                let flat: Vec<f32> = encoded.into_data().convert::<f32>().value;

                let k = fold
                    .groups_out
                    .context("clustering fold is missing its held-out group count")?;
                let clustered = kmeans::cluster(
                    &flat,
                    encoding_size,
                    k,
                    run.training.seed.wrapping_add(fold_idx as u64),
                )?;

                for (cluster, truth) in clustered.assignments.iter().zip(&test_labels) {
                    table.clustering.push(ClusteringRow {
                        cluster: *cluster,
                        ground_truth: truth.clone(),
                        cell_out: format!("cell_out_{}", k),
                        index_split: fold.label.clone(),
                        design: run.design.clone(),
                    });
                }
            }
            Analysis::EvaluateSkf | Analysis::EvaluateRskf => {
                let (test_values, test_labels) = data.subset(&fold.test);
                if test_labels.is_empty() {
                    continue;
                }

                let input = create_feature_tensor::<B::InnerBackend>(&test_values, n_genes, device);
                let output = inference.predict(input);
                let probabilities: Vec<f32> =
                    output.probabilities.into_data().convert::<f32>().value;
                let predictions: Vec<i64> = output.predictions.into_data().convert::<i64>().value;

                let n_classes = encoder.len();
                for (row, truth) in test_labels.iter().enumerate() {
                    table.classification.push(ClassificationRow {
                        probabilities: probabilities[row * n_classes..(row + 1) * n_classes]
                            .to_vec(),
                        prediction: encoder.decode(predictions[row] as usize).to_string(),
                        ground_truth: truth.clone(),
                        index_split: fold.label.clone(),
                        design: run.design.clone(),
                    });
                }
            }
        }
    }

    log.save("********** MODEL DETAILS **********")?;
    let second = if run.second_hidden_layer {
        format!(" -> dense({})", run.second_hidden_units)
    } else {
        String::new()
    };
    log.save(&format!(
        "Model: input({}) -> masked({}){} -> softmax({})",
        mask.genes.len(),
        mask.units.len(),
        second,
        encoder.len()
    ))?;

    summary.rows = table.len();
    if !table.is_empty() {
        let path = run
            .paths
            .reports
            .join(format!("detail_{}.csv", run.file_tag()));
        table.write_detail_csv(&path)?;
        log.save(&format!("{}", path.display()))?;
        summary.detail_path = Some(path);
    }

    match run.analysis {
        Analysis::Clustering => {
            let path = run
                .paths
                .reports
                .join(format!("metrics_{}.csv", run.design));
            write_clustering_metrics(&table, &path, &run.design)?;
            log.save(&format!("clustering metrics saved into {}", path.display()))?;
            summary.metric_paths.push(path);
        }
        Analysis::EvaluateSkf | Analysis::EvaluateRskf => {
            let overall_path = run
                .paths
                .reports
                .join(format!("metrics_overall_{}.csv", run.design));
            let detail_path = run
                .paths
                .reports
                .join(format!("metrics_detail_{}.csv", run.design));
            write_classification_metrics(&table, &overall_path, &detail_path, &run.design)?;
            log.save(&format!(
                "F1-precision-recall metrics saved into {}",
                run.paths.reports.display()
            ))?;
            summary.metric_paths.push(overall_path);
            summary.metric_paths.push(detail_path);
        }
        Analysis::Encoding | Analysis::Retrieval | Analysis::RetrievalLof => {}
    }

    Ok(summary)
}

fn checkpoint_metadata(
    run: &AnalysisRun,
    encoder: &LabelEncoder,
    mask: &HiddenLayerMask,
    fold: &str,
    result: &TrainingResult,
    kind: &str,
) -> CheckpointMetadata {
    CheckpointMetadata {
        kind: kind.to_string(),
        design: run.design.clone(),
        dataset: run.dataset.clone(),
        analysis: run.analysis.as_str().to_string(),
        fold: fold.to_string(),
        optimizer: run.training.optimizer.as_str().to_string(),
        activation: run.activation.as_str().to_string(),
        classes: encoder.classes().to_vec(),
        n_genes: mask.genes.len(),
        n_hidden_units: mask.units.len(),
        second_hidden_layer: run.second_hidden_layer,
        second_hidden_units: run.second_hidden_units,
        epochs_trained: result.state.epoch,
        best_val_loss: result.state.best_val_loss,
        timestamp: utils::timestamp(),
    }
}

/// Mean ARI/NMI per held-out level, one CSV row per `cell_out_*` tag.
fn write_clustering_metrics(table: &ResultTable, path: &PathBuf, design: &str) -> Result<()> {
    let mut by_fold: BTreeMap<&str, Vec<&ClusteringRow>> = BTreeMap::new();
    for row in &table.clustering {
        by_fold.entry(row.index_split.as_str()).or_default().push(row);
    }

    let mut by_level: BTreeMap<String, Vec<(f64, f64)>> = BTreeMap::new();
    for rows in by_fold.values() {
        let clusters: Vec<usize> = rows.iter().map(|r| r.cluster).collect();
        let truth_labels: Vec<String> = rows.iter().map(|r| r.ground_truth.clone()).collect();
        let truth_encoder = LabelEncoder::fit(&truth_labels);
        let truths: Vec<usize> = truth_labels
            .iter()
            .map(|l| truth_encoder.encode(l).unwrap_or(0))
            .collect();

        let ari = metrics::adjusted_rand_index(&clusters, &truths);
        let nmi = metrics::normalized_mutual_info(&clusters, &truths);
        by_level
            .entry(rows[0].cell_out.clone())
            .or_default()
            .push((ari, nmi));
    }

    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("failed to create {:?}", path))?;
    writer.write_record(["design", "cell_out", "ari", "nmi"])?;
    for (level, scores) in &by_level {
        let n = scores.len() as f64;
        let ari: f64 = scores.iter().map(|(a, _)| a).sum::<f64>() / n;
        let nmi: f64 = scores.iter().map(|(_, b)| b).sum::<f64>() / n;
        let record = vec![
            design.to_string(),
            level.clone(),
            format!("{:.6}", ari),
            format!("{:.6}", nmi),
        ];
        writer.write_record(&record)?;
    }
    writer.flush().context("failed to flush clustering metrics")?;
    Ok(())
}

/// Pooled overall scores plus a per-cell-type breakdown.
fn write_classification_metrics(
    table: &ResultTable,
    overall_path: &PathBuf,
    detail_path: &PathBuf,
    design: &str,
) -> Result<()> {
    let predictions: Vec<String> = table
        .classification
        .iter()
        .map(|r| r.prediction.clone())
        .collect();
    let truths: Vec<String> = table
        .classification
        .iter()
        .map(|r| r.ground_truth.clone())
        .collect();

    let overall = metrics::overall(&predictions, &truths, &table.classes);
    let mut writer = csv::Writer::from_path(overall_path)
        .with_context(|| format!("failed to create {:?}", overall_path))?;
    writer.write_record([
        "design",
        "accuracy",
        "precision_macro",
        "recall_macro",
        "f1_macro",
        "precision_weighted",
        "recall_weighted",
        "f1_weighted",
    ])?;
    let record = vec![
        design.to_string(),
        format!("{:.6}", overall.accuracy),
        format!("{:.6}", overall.precision_macro),
        format!("{:.6}", overall.recall_macro),
        format!("{:.6}", overall.f1_macro),
        format!("{:.6}", overall.precision_weighted),
        format!("{:.6}", overall.recall_weighted),
        format!("{:.6}", overall.f1_weighted),
    ];
    writer.write_record(&record)?;
    writer.flush().context("failed to flush overall metrics")?;

    let per_class = metrics::per_class(&predictions, &truths, &table.classes);
    let mut writer = csv::Writer::from_path(detail_path)
        .with_context(|| format!("failed to create {:?}", detail_path))?;
    writer.write_record(["design", "cell_type", "precision", "recall", "f1", "support"])?;
    for class_metrics in &per_class {
        let record = vec![
            design.to_string(),
            class_metrics.class.clone(),
            format!("{:.6}", class_metrics.precision),
            format!("{:.6}", class_metrics.recall),
            format!("{:.6}", class_metrics.f1),
            class_metrics.support.to_string(),
        ];
        writer.write_record(&record)?;
    }
    writer.flush().context("failed to flush per-class metrics")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::knowledge::HiddenLayerSpec;
    use crate::training::OptimizerKind;
    use crate::TrainingBackend;
    use tempfile::TempDir;

    /// Two linearly separated cell types over three genes.
    fn synthetic_data(n_per_class: usize) -> ExpressionMatrix {
        let mut cells = Vec::new();
        let mut values = Vec::new();
        let mut labels = Vec::new();

        for i in 0..n_per_class {
            let jitter = (i % 7) as f32 * 0.05;
            cells.push(format!("b{}", i));
            values.extend_from_slice(&[2.0 + jitter, 0.1, 0.5 - jitter]);
            labels.push("B".to_string());

            cells.push(format!("t{}", i));
            values.extend_from_slice(&[0.1, 2.0 - jitter, 0.5 + jitter]);
            labels.push("T".to_string());
        }

        ExpressionMatrix {
            cells,
            genes: vec!["g1".into(), "g2".into(), "g3".into()],
            values,
            labels,
        }
    }

    fn quick_run(analysis: Analysis, dir: &TempDir) -> (AnalysisRun, RunLog) {
        let paths = OutputPaths::resolve(
            dir.path(),
            "pbmc",
            SplitStrategy::for_analysis(analysis).name(),
            analysis.as_str(),
        )
        .unwrap();
        let log = RunLog::create(&paths.logs, analysis.as_str(), "bio").unwrap();

        let run = AnalysisRun {
            design: "bio".to_string(),
            analysis,
            dataset: "pbmc".to_string(),
            activation: Activation::Relu,
            second_hidden_layer: false,
            second_hidden_units: 100,
            training: TrainingConfig {
                epochs: 2,
                batch_size: 8,
                optimizer: OptimizerKind::Adam,
                ..TrainingConfig::default()
            },
            paths,
        };
        (run, log)
    }

    #[test]
    fn test_evaluate_skf_produces_rows_and_metrics() {
        let dir = TempDir::new().unwrap();
        let data = synthetic_data(20);
        let mask = HiddenLayerSpec::dense_only(6).build(&data.genes).unwrap();
        let (run, mut log) = quick_run(Analysis::EvaluateSkf, &dir);

        let device = Default::default();
        let summary = super::run::<TrainingBackend>(&run, &data, &mask, &device, &mut log).unwrap();

        assert_eq!(summary.folds, 10);
        // every cell is tested exactly once across the folds
        assert_eq!(summary.rows, 40);
        assert!(summary.model_paths.is_empty());

        let detail = summary.detail_path.unwrap();
        let content = std::fs::read_to_string(&detail).unwrap();
        assert!(content.starts_with("B,T,prediction,ground_truth,index_split,design"));
        assert_eq!(content.lines().count(), 41);

        assert_eq!(summary.metric_paths.len(), 2);
        let overall = std::fs::read_to_string(&summary.metric_paths[0]).unwrap();
        assert!(overall.contains("accuracy"));
        assert!(overall.contains("bio"));
        let detail_metrics = std::fs::read_to_string(&summary.metric_paths[1]).unwrap();
        assert_eq!(detail_metrics.lines().count(), 3);
    }

    #[test]
    fn test_retrieval_saves_model_without_rows() {
        let dir = TempDir::new().unwrap();
        let data = synthetic_data(6);
        let mask = HiddenLayerSpec::dense_only(4).build(&data.genes).unwrap();
        let (run, mut log) = quick_run(Analysis::Retrieval, &dir);

        let device = Default::default();
        let summary = super::run::<TrainingBackend>(&run, &data, &mask, &device, &mut log).unwrap();

        assert_eq!(summary.folds, 1);
        assert_eq!(summary.rows, 0);
        assert!(summary.detail_path.is_none());
        assert_eq!(summary.model_paths.len(), 1);

        let model_path = &summary.model_paths[0];
        assert!(model_path.exists());
        assert!(model_path
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("design_bio_pbmc_adam_relu_"));
        assert!(model_path.with_extension("json").exists());
    }

    #[test]
    fn test_encoding_saves_encoder_checkpoint() {
        let dir = TempDir::new().unwrap();
        let data = synthetic_data(10);
        let mask = HiddenLayerSpec::dense_only(4).build(&data.genes).unwrap();
        let (run, mut log) = quick_run(Analysis::Encoding, &dir);

        let device = Default::default();
        let summary = super::run::<TrainingBackend>(&run, &data, &mask, &device, &mut log).unwrap();

        assert_eq!(summary.folds, 1);
        assert_eq!(summary.model_paths.len(), 1);
        let name = summary.model_paths[0].file_name().unwrap().to_str().unwrap();
        assert_eq!(name, "encoding_bio_pbmc_adam_relu.mpk");

        let metadata: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(summary.model_paths[0].with_extension("json")).unwrap(),
        )
        .unwrap();
        assert_eq!(metadata["kind"], "encoding");
    }

    #[test]
    fn test_clustering_with_small_strategy() {
        let dir = TempDir::new().unwrap();

        // three cell types so two can be held out together
        let mut data = synthetic_data(8);
        for i in 0..8 {
            data.cells.push(format!("n{}", i));
            data.values
                .extend_from_slice(&[1.0, 1.0, 3.0 + (i % 3) as f32 * 0.1]);
            data.labels.push("NK".to_string());
        }

        let mask = HiddenLayerSpec::dense_only(5).build(&data.genes).unwrap();
        let (run, mut log) = quick_run(Analysis::Clustering, &dir);
        let strategy = SplitStrategy::LeavePGroupsOut {
            p_values: vec![2],
            iterations: 2,
        };

        let device = Default::default();
        let summary = super::run_with_strategy::<TrainingBackend>(
            &run, &data, &mask, &strategy, &device, &mut log,
        )
        .unwrap();

        assert_eq!(summary.folds, 2);
        assert!(summary.rows > 0);
        assert_eq!(summary.metric_paths.len(), 1);

        let detail = std::fs::read_to_string(summary.detail_path.unwrap()).unwrap();
        assert!(detail.starts_with("prediction,ground_truth,cell_out,index_split,design"));
        assert!(detail.contains("cell_out_2"));

        let metrics_csv = std::fs::read_to_string(&summary.metric_paths[0]).unwrap();
        assert!(metrics_csv.starts_with("design,cell_out,ari,nmi"));
        assert!(metrics_csv.contains("cell_out_2"));
    }
}
