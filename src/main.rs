//! churnscope: churn analytics CLI
//!
//! This is the main entrypoint that dispatches between single-record
//! prediction, offline evaluation and per-stage dataset summaries.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use churnscope::pipeline::GLOBAL_PREDICTOR;
use churnscope::{
    encode, evaluate, load_labelled_records, render_confusion_matrix, Args, ChurnDataset,
    RawRecord, Stage, FEATURE_NAMES,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();
    init_tracing(args.verbose);

    if args.verbose {
        println!("churnscope - Customer Churn Analytics");
        println!("=====================================\n");
    }

    if let Some(record) = args.parse_record()? {
        run_prediction_mode(&args, &record)?;
    } else if let Some(path) = args.evaluate.as_deref() {
        run_evaluation_mode(&args, path)?;
    } else {
        run_summary_mode(&args)?;
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "churnscope=debug" } else { "churnscope=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Run prediction mode for a single customer
fn run_prediction_mode(args: &Args, record: &RawRecord) -> Result<()> {
    println!("=== Prediction Mode ===");

    let start_time = Instant::now();

    let features = encode(record).context("invalid customer record")?;
    if args.verbose {
        println!("Encoded features:");
        for (name, value) in FEATURE_NAMES.iter().zip(features.as_slice()) {
            println!("  {:<20} {}", name, value);
        }
        println!(
            "\nLoading artifacts: scaler={}, model={}",
            args.scaler.display(),
            args.model.display()
        );
    }

    let predictor = GLOBAL_PREDICTOR
        .get_or_load(&args.artifact_paths())
        .context("failed to load churn model artifacts")?;
    if args.verbose {
        let dims = predictor.model().dims();
        println!(
            "✓ Artifacts loaded: {:?} scaler over {} features, network {}-{}-{}",
            predictor.scaler().kind(),
            predictor.scaler().n_features(),
            dims.input,
            dims.hidden,
            dims.output
        );
    }
    let prediction = predictor.predict_vector(&features)?;

    let elapsed = start_time.elapsed();

    let verdict = if prediction.churn {
        "Customer is likely to churn"
    } else {
        "Customer is likely to stay"
    };
    println!("\n✓ {}", verdict);
    println!("  Churn probability: {:.2}%", prediction.probability * 100.0);
    println!("  Processing time: {:.3}s", elapsed.as_secs_f64());

    Ok(())
}

/// Run offline evaluation over a labelled dataset
fn run_evaluation_mode(args: &Args, path: &str) -> Result<()> {
    println!("=== Evaluation Mode ===\n");

    let start_time = Instant::now();

    let records = load_labelled_records(path)
        .with_context(|| format!("failed to load labelled records from {path}"))?;
    println!("✓ Data loaded: {} customers", records.len());

    let predictor = GLOBAL_PREDICTOR
        .get_or_load(&args.artifact_paths())
        .context("failed to load churn model artifacts")?;
    let report = evaluate(&predictor, &records)?;

    println!("\n=== Evaluation Metrics ===");
    println!("Accuracy:  {:.4}", report.accuracy);
    println!("Precision: {:.4}", report.precision);
    println!("Recall:    {:.4}", report.recall);
    println!("F1 score:  {:.4}", report.f1);
    println!("FPR:       {:.4}", report.fpr);
    println!("\nConfusion matrix (rows actual, columns predicted):");
    println!("              No Churn  Churn");
    println!("  No Churn    {:>8}  {:>5}", report.tn, report.fp);
    println!("  Churn       {:>8}  {:>5}", report.fn_count, report.tp);

    if let Some(parent) = Path::new(&args.confusion_matrix).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    render_confusion_matrix(&report, &args.confusion_matrix)?;
    println!("\nConfusion matrix saved to: {}", args.confusion_matrix);

    if args.verbose {
        println!("Total processing time: {:.2}s", start_time.elapsed().as_secs_f64());
    }

    Ok(())
}

/// Print dataset statistics for the selected stage(s)
fn run_summary_mode(args: &Args) -> Result<()> {
    if args.verbose {
        println!("Loading dataset from: {}", args.input);
    }
    let dataset = ChurnDataset::load(&args.input)
        .with_context(|| format!("failed to load dataset from {}", args.input))?;

    let stages: Vec<Stage> = if args.all_stages {
        Stage::ALL.to_vec()
    } else {
        vec![args.stage]
    };

    for stage in stages {
        println!("=== {} ===", stage);
        print!("{}", dataset.summary(stage)?);
        if stage != stage.next() {
            println!("\nNext: {}\n", stage.next());
        }
    }

    Ok(())
}
