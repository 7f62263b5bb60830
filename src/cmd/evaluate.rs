use allocforge::checkpoint::{self, BestRecord, FileStore};
use allocforge::config::Config;
use allocforge::error::{AfResult, AllocError};
use allocforge::problem::Problem;
use allocforge::report;
use clap::Args;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    #[command(flatten)]
    pub config: Config,

    /// Score the latest best candidate saved in this directory instead of
    /// the bucket hints from the item table.
    #[arg(long)]
    pub from_checkpoint: Option<PathBuf>,
}

fn latest_best(dir: &Path, problem: &Problem) -> AfResult<Vec<usize>> {
    let store = FileStore::open(dir)?;
    let records: Vec<BestRecord> = checkpoint::load_json(&store, checkpoint::BEST_INDIVIDUALS)?
        .unwrap_or_default();
    let last = records.into_iter().last().ok_or_else(|| {
        AllocError::Checkpoint(format!("No best candidate saved in '{}'", dir.display()))
    })?;
    problem
        .validate_genes(&last.genes)
        .map_err(|e| AllocError::Checkpoint(format!("Saved candidate does not fit: {}", e)))?;
    info!(
        "♻️  Loaded best candidate from generation {}",
        last.generation
    );
    Ok(last.genes)
}

pub fn run(args: &EvaluateArgs, problem: &Problem) -> AfResult<()> {
    let genes = match &args.from_checkpoint {
        Some(dir) => latest_best(dir, problem)?,
        None => {
            info!("🔎 Evaluating the hinted allocation");
            problem.hinted_genes()
        }
    };

    println!("{}", report::render_report(problem, &genes));
    Ok(())
}
