use allocforge::checkpoint::{CheckpointStore, FileStore, MemoryStore};
use allocforge::config::Config;
use allocforge::error::AfResult;
use allocforge::optimizer::stats::GenerationRecord;
use allocforge::optimizer::{Candidate, EvolutionOptions, Optimizer, ProgressCallback};
use allocforge::problem::Problem;
use allocforge::report;
use clap::Args;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: Config,

    #[arg(short = 'S', long)]
    pub seed: Option<u64>,

    /// Directory for checkpoints. Without it nothing outlives the run.
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,

    /// Write the final allocation to this CSV.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

struct StageLogger {
    start: Instant,
}

impl ProgressCallback for StageLogger {
    fn on_generation(&self, record: &GenerationRecord, best: Option<&Candidate>) -> bool {
        debug!(
            "   -> [{:.1}s] gen {} best-ever {:.4} (dups {}, regen {}, nan {})",
            self.start.elapsed().as_secs_f32(),
            record.generation,
            best.and_then(Candidate::objective).unwrap_or(f64::NAN),
            record.counters.duplicates_removed,
            record.counters.regenerated,
            record.counters.nan_dropped
        );
        true
    }
}

pub fn run(args: &RunArgs, config: &Config, problem: &Problem) -> AfResult<()> {
    let mut rng = if let Some(s) = args.seed {
        fastrand::Rng::with_seed(s)
    } else {
        fastrand::Rng::new()
    };

    let mut store: Box<dyn CheckpointStore> = match &args.checkpoint_dir {
        Some(dir) => {
            info!("💾 Checkpoints: {}", dir.display());
            Box::new(FileStore::new(dir)?)
        }
        None => Box::new(MemoryStore::new()),
    };

    let optimizer = Optimizer::new(problem, EvolutionOptions::from(config));
    let result = optimizer.run(
        store.as_mut(),
        &mut rng,
        StageLogger {
            start: Instant::now(),
        },
    )?;

    println!("{}", report::render_report(problem, result.best.genes()));
    println!("Generations: {}", result.generations_run);

    if let Some(path) = &args.output {
        report::write_allocation_csv(path, problem, result.best.genes())?;
        info!("📝 Allocation written to {}", path.display());
    }
    Ok(())
}
