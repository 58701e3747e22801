use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use quickfoil::config::{FoilConfig, TaskConfig};
use quickfoil::ingestion::loader::{load_predicate, load_relation_columns, split_example_table};
use quickfoil::learner::quickfoil::QuickFoil;
use quickfoil::learner::test_runner::QuickFoilTestRunner;
use quickfoil::schema::predicate::FoilPredicateRef;
use quickfoil::storage::columnar::Table;

/// Learn first-order rules for a target relation from examples and
/// background facts.
#[derive(Parser)]
#[command(name = "quickfoil", version)]
struct Args {
    /// Path to the JSON task description (target, background, relations)
    config: PathBuf,

    /// Optional JSON file overriding the default tunables
    #[arg(long)]
    params: Option<PathBuf>,

    /// Override the maximum number of rule search iterations
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Override the stopping coverage threshold
    #[arg(long)]
    positive_threshold: Option<f64>,

    /// Replay the learned rules against the configured test data
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    run_tests: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = match &args.params {
        Some(path) => FoilConfig::from_file(path)?,
        None => FoilConfig::default(),
    };
    if let Some(max_iterations) = args.max_iterations {
        config.max_iterations = max_iterations;
    }
    if let Some(positive_threshold) = args.positive_threshold {
        config.positive_threshold = positive_threshold;
    }
    let config = Arc::new(config);

    let task = TaskConfig::from_file(&args.config)?;

    let mut background_predicates: Vec<FoilPredicateRef> = Vec::new();
    for (id, name) in task.background.iter().enumerate() {
        let relation = task
            .relation(name)
            .with_context(|| format!("background relation {name} not defined"))?;
        background_predicates.push(Arc::new(load_predicate(
            id as i32,
            relation,
            config.initial_block_size,
        )?));
    }
    let target_relation = task.target_relation();
    let target_predicate: FoilPredicateRef = Arc::new(load_predicate(
        background_predicates.len() as i32,
        target_relation,
        config.initial_block_size,
    )?);

    let num_positive = match target_relation.num_positive {
        Some(n) if n > 0 => n as usize,
        _ => bail!("target relation needs a positive num_positive"),
    };
    if num_positive > target_predicate.num_total_facts() {
        bail!(
            "num_positive {} exceeds the {} loaded target tuples",
            num_positive,
            target_predicate.num_total_facts()
        );
    }
    let num_negative = target_predicate.num_total_facts() - num_positive;

    let start = Instant::now();
    let mut learner = QuickFoil::new(
        num_positive,
        num_negative,
        Arc::clone(&target_predicate),
        background_predicates,
        Arc::clone(&config),
    )?;
    learner.learn()?;
    let elapsed = start.elapsed();
    println!("Elapsed time: {:.3}s", elapsed.as_secs_f64());

    println!("#Clauses = {}", learner.learned_clauses().len());
    for clause in learner.learned_clauses() {
        println!("{clause}");
    }

    if let (Some(test), true) = (&task.test, args.run_tests) {
        let columns = load_relation_columns(target_relation, &test.file, config.initial_block_size)?;
        let test_table = Table::new(columns);
        let (positive_table, negative_table) =
            split_example_table(&test_table, test.num_positive as usize)?;

        let runner =
            QuickFoilTestRunner::new(&target_predicate, learner.learned_clauses(), &config);
        println!("Use positive test data ({}) ...", positive_table.num_tuples());
        let uncovered_positive = runner.run_test(&positive_table)?;
        println!("Use negative test data ({}) ...", negative_table.num_tuples());
        let uncovered_negative = runner.run_test(&negative_table)?;

        let covered_positive = positive_table.num_tuples() - uncovered_positive;
        let covered_negative = negative_table.num_tuples() - uncovered_negative;
        let precision = if covered_positive + covered_negative == 0 {
            0.0
        } else {
            covered_positive as f64 / (covered_positive + covered_negative) as f64
        };
        let recall = covered_positive as f64 / test.num_positive as f64;
        println!(
            "#covered_test_positive={covered_positive}, #covered_test_negative={covered_negative}, \
             #total_positive={}, #total_negative={}, precision={precision}, recall={recall}",
            positive_table.num_tuples(),
            negative_table.num_tuples(),
        );
    }

    Ok(())
}
