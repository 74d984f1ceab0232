use anyhow::{Context, Result};
use pbknet::analysis::{self, AnalysisRun};
use pbknet::cli::{parse_args, setup_logging, Cli};
use pbknet::data::knowledge::{HiddenLayerSpec, KnowledgeMatrix};
use pbknet::data::loader::ExpressionLoader;
use pbknet::data::split::SplitStrategy;
use pbknet::training::TrainingConfig;
use pbknet::utils::{self, OutputPaths, RunLog};
use tracing::{error, info};

fn main() {
    let cli = parse_args();

    setup_logging(cli.verbose);

    info!("{}", pbknet::info());

    if let Err(e) = run(cli) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let start = utils::clock_time();

    let experiment = utils::experiment_name(&cli.ds);
    let dataset = utils::dataset_name(&cli.ds);
    let strategy = SplitStrategy::for_analysis(cli.analysis);

    let paths = OutputPaths::resolve(
        &cli.output,
        &experiment,
        strategy.name(),
        cli.analysis.as_str(),
    )?;
    let mut log = RunLog::create(&paths.logs, cli.analysis.as_str(), &cli.design)?;

    log.save(&format!("Script execution start time, {}", start))?;
    log.save("****SCRIPT INFORMATION****")?;
    log.save(&format!(
        "design: {}\n pbk: {:?}\n dense_nodes: {}\n second_hidden_layer: {}\n optimizer: {}\n activation: {}\n dataset: {}\n split: {}\n filter_gene_space: {}",
        cli.design,
        cli.first_hidden_layer_pbk,
        cli.first_hidden_layer_dense,
        cli.second_hidden_layer,
        cli.optimizer.as_str(),
        cli.activation.as_str(),
        dataset,
        strategy.name(),
        cli.filter_gene_space
    ))?;

    let loader = ExpressionLoader::new();
    let data = loader
        .load(&cli.ds)
        .with_context(|| format!("failed to load dataset from {:?}", cli.ds))?;

    log.save("********** DATAFRAME DETAILS **********")?;
    log.save(&format!(
        "Dataset cell types, {:?}\nDataset shape, ({}, {})",
        data.cell_types(),
        data.n_cells(),
        data.n_genes()
    ))?;

    let pbk = cli
        .first_hidden_layer_pbk
        .as_ref()
        .map(KnowledgeMatrix::load)
        .transpose()
        .context("failed to load the prior biological knowledge matrix")?;
    if let Some(pbk) = &pbk {
        log.save(&format!(
            "Prior biological knowledge imported, shape ({}, {})",
            pbk.genes.len(),
            pbk.columns.len()
        ))?;
        if cli.filter_gene_space {
            log.save("***** GENE SPACE FILTERED!!")?;
        }
    }
    if cli.first_hidden_layer_dense > 0 {
        info!("Dense layer added with {} units", cli.first_hidden_layer_dense);
    }

    let spec = HiddenLayerSpec {
        pbk,
        dense_units: cli.first_hidden_layer_dense,
        filter_gene_space: cli.filter_gene_space,
    };
    let mask = spec.build(&data.genes)?;
    let data = data.filter_genes(&mask.genes)?;

    log.save("********** FIRST HIDDEN LAYER DETAILS **********")?;
    log.save(&format!(
        "First hidden layer shape, ({}, {})",
        mask.genes.len(),
        mask.units.len()
    ))?;

    let training = TrainingConfig {
        epochs: cli.epochs,
        batch_size: cli.batch_size,
        learning_rate: cli.learning_rate,
        optimizer: cli.optimizer,
        seed: cli.seed,
        ..TrainingConfig::default()
    };

    let run = AnalysisRun {
        design: cli.design,
        analysis: cli.analysis,
        dataset,
        activation: cli.activation,
        second_hidden_layer: cli.second_hidden_layer,
        second_hidden_units: 100,
        training,
        paths,
    };

    let device = Default::default();
    let summary =
        analysis::run::<pbknet::TrainingBackend>(&run, &data, &mask, &device, &mut log)?;

    info!(
        "Analysis finished: {} folds, {} result rows, {} models, {} metric tables",
        summary.folds,
        summary.rows,
        summary.model_paths.len(),
        summary.metric_paths.len()
    );
    if let Some(detail) = &summary.detail_path {
        info!("Detail table: {:?}", detail);
    }

    log.save(&format!("Script execution finish time, {}", utils::clock_time()))?;
    Ok(())
}
