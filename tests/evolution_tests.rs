use allocforge::checkpoint::{self, BestRecord, CheckpointStore, MemoryStore};
use allocforge::config::Config;
use allocforge::error::{AfResult, AllocError};
use allocforge::optimizer::stats::{GenerationRecord, History};
use allocforge::optimizer::{Candidate, Evolution, EvolutionOptions, Optimizer, ProgressCallback, Silent};
use allocforge::problem::{Bucket, Category, Item, Problem};
use fastrand::Rng;
use std::collections::HashSet;

fn problem() -> Problem {
    let cats = [Category::External, Category::Internal, Category::Company];
    Problem::new(
        (0..10)
            .map(|i| Item::new(format!("P{}", i), 10.0 * (i + 1) as f64, cats[i % 3]))
            .collect(),
        vec![
            Bucket::new("X", 150.0, 40.0, 60.0),
            Bucket::new("Y", 120.0, 0.0, 50.0),
        ],
    )
    .unwrap()
}

fn options(population: usize, generations: usize, cadence: usize) -> EvolutionOptions {
    let mut cfg = Config::default();
    cfg.evolution.population_size = population;
    cfg.evolution.generations = generations;
    cfg.checkpoints.best_cadence = cadence;
    cfg.checkpoints.population_cadence = cadence;
    cfg.checkpoints.history_cadence = cadence;
    EvolutionOptions::from(&cfg)
}

fn assert_well_formed(p: &Problem, population: &[Candidate]) {
    for c in population {
        assert_eq!(c.genes().len(), p.item_count());
        assert!(c.genes().iter().all(|&g| g <= p.null_bucket()));
        assert!(c.has_fitness(), "Survivor without fitness");
    }
}

#[test]
fn test_population_size_is_restored_every_generation() {
    let p = problem();
    let opts = options(16, 10, 100);
    let mut store = MemoryStore::new();
    let mut rng = Rng::with_seed(42);

    let mut evo = Evolution::initialize(&p, &opts, &mut store, &mut rng).unwrap();
    assert_eq!(evo.population().len(), 16);
    assert_well_formed(&p, evo.population());

    for g in 1..=10 {
        let record = evo.step(&mut store, &mut rng);
        assert_eq!(record.generation, g);
        assert_eq!(evo.population().len(), 16);
        assert_well_formed(&p, evo.population());
    }
    assert_eq!(evo.history().len(), 10);
}

#[test]
fn test_survivors_are_sorted_and_best_ever_never_worsens() {
    let p = problem();
    let opts = options(20, 15, 100);
    let mut store = MemoryStore::new();
    let mut rng = Rng::with_seed(7);

    let mut evo = Evolution::initialize(&p, &opts, &mut store, &mut rng).unwrap();
    let mut best = evo.best().and_then(Candidate::objective).unwrap();
    for _ in 0..15 {
        let record = evo.step(&mut store, &mut rng);
        let objs: Vec<f64> = evo.population().iter().filter_map(Candidate::objective).collect();
        assert!(objs.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(record.min, objs[0]);

        let now = evo.best().and_then(Candidate::objective).unwrap();
        assert!(now <= best, "Best-ever went from {} to {}", best, now);
        best = now;
    }
}

#[test]
fn test_checkpoints_follow_cadence() {
    let p = problem();
    let opts = options(10, 4, 2);
    let mut store = MemoryStore::new();
    let mut rng = Rng::with_seed(1);

    let result = Optimizer::new(&p, opts).run(&mut store, &mut rng, Silent).unwrap();
    assert_eq!(result.generations_run, 4);

    // gen 2 and gen 4; the final save does not repeat gen 4
    let best: Vec<BestRecord> = checkpoint::load_json(&store, checkpoint::BEST_INDIVIDUALS)
        .unwrap()
        .unwrap();
    let gens: Vec<usize> = best.iter().map(|r| r.generation).collect();
    assert_eq!(gens, vec![2, 4]);
    assert_eq!(best.last().unwrap().genes, result.best.genes());

    let population: Vec<Vec<usize>> = checkpoint::load_json(&store, checkpoint::POPULATION)
        .unwrap()
        .unwrap();
    assert_eq!(population.len(), 10);

    let history: History = checkpoint::load_json(&store, checkpoint::HISTORY)
        .unwrap()
        .unwrap();
    assert_eq!(history.len(), 4);

    let report = checkpoint::load_text(&store, checkpoint::REPORT).unwrap().unwrap();
    assert!(report.contains("TOTAL"));
}

#[test]
fn test_final_save_covers_off_cadence_generation() {
    let p = problem();
    let opts = options(10, 5, 2);
    let mut store = MemoryStore::new();
    let mut rng = Rng::with_seed(1);

    Optimizer::new(&p, opts).run(&mut store, &mut rng, Silent).unwrap();
    let best: Vec<BestRecord> = checkpoint::load_json(&store, checkpoint::BEST_INDIVIDUALS)
        .unwrap()
        .unwrap();
    let gens: Vec<usize> = best.iter().map(|r| r.generation).collect();
    assert_eq!(gens, vec![2, 4, 5]);
}

#[test]
fn test_best_history_is_bounded() {
    let p = problem();
    let mut opts = options(8, 6, 1);
    opts.best_capacity = 3;
    let mut store = MemoryStore::new();
    let mut rng = Rng::with_seed(3);

    Optimizer::new(&p, opts).run(&mut store, &mut rng, Silent).unwrap();
    let best: Vec<BestRecord> = checkpoint::load_json(&store, checkpoint::BEST_INDIVIDUALS)
        .unwrap()
        .unwrap();
    assert_eq!(best.len(), 3);
}

#[test]
fn test_restore_resumes_population_and_generation() {
    let p = problem();
    let opts = options(12, 4, 2);
    let mut store = MemoryStore::new();
    let mut rng = Rng::with_seed(11);
    Optimizer::new(&p, opts.clone()).run(&mut store, &mut rng, Silent).unwrap();

    let saved: Vec<Vec<usize>> = checkpoint::load_json(&store, checkpoint::POPULATION)
        .unwrap()
        .unwrap();

    let evo = Evolution::initialize(&p, &opts, &mut store, &mut rng).unwrap();
    let restored: HashSet<Vec<usize>> = evo
        .population()
        .iter()
        .map(|c| c.genes().to_vec())
        .collect();
    for genes in &saved {
        assert!(restored.contains(genes), "Lost {:?} on restore", genes);
    }
    assert_eq!(evo.generation(), 4);
}

#[test]
fn test_corrupt_population_is_fatal() {
    let p = problem();
    let opts = options(6, 1, 1);
    let mut rng = Rng::with_seed(5);

    let mut store = MemoryStore::new();
    store.save(checkpoint::POPULATION, b"[[0, 1,").unwrap();
    let res = Evolution::initialize(&p, &opts, &mut store, &mut rng);
    assert!(matches!(res, Err(AllocError::Checkpoint(_))));

    let mut store = MemoryStore::new();
    checkpoint::save_json(&mut store, checkpoint::POPULATION, &vec![vec![9usize; 10]]).unwrap();
    let res = Evolution::initialize(&p, &opts, &mut store, &mut rng);
    assert!(matches!(res, Err(AllocError::Checkpoint(_))));
}

#[test]
fn test_fresh_start_ignores_saved_population() {
    let p = problem();
    let mut opts = options(6, 1, 1);
    opts.restore_population = false;
    let mut store = MemoryStore::new();
    store.save(checkpoint::POPULATION, b"garbage").unwrap();
    let mut rng = Rng::with_seed(5);
    assert!(Evolution::initialize(&p, &opts, &mut store, &mut rng).is_ok());
}

#[test]
fn test_excluded_items_stay_unallocated() {
    let mut p = problem();
    p.exclude(0).unwrap();
    p.exclude(5).unwrap();
    let opts = options(12, 8, 100);
    let mut store = MemoryStore::new();
    let mut rng = Rng::with_seed(21);

    let mut evo = Evolution::initialize(&p, &opts, &mut store, &mut rng).unwrap();
    for _ in 0..8 {
        evo.step(&mut store, &mut rng);
        for c in evo.population() {
            assert_eq!(c.genes()[0], p.null_bucket());
            assert_eq!(c.genes()[5], p.null_bucket());
        }
    }
}

#[test]
fn test_feasible_candidates_reach_known_good_store() {
    // No active constraint anywhere: everything is feasible.
    let p = Problem::new(
        (0..5)
            .map(|i| Item::new(format!("P{}", i), 1.0, Category::Company))
            .collect(),
        vec![Bucket::new("Z", 0.0, 0.0, 0.0)],
    )
    .unwrap();
    let opts = options(4, 1, 100);
    let mut store = MemoryStore::new();
    let mut rng = Rng::with_seed(2);

    let evo = Evolution::initialize(&p, &opts, &mut store, &mut rng).unwrap();
    let valid: Vec<Vec<usize>> = checkpoint::load_lines(&store, checkpoint::VALID_INDIVIDUALS)
        .unwrap()
        .unwrap();
    assert_eq!(valid.len(), evo.population().len());
}

#[test]
fn test_hint_seed_joins_initial_population() {
    let mut items: Vec<Item> = (0..6)
        .map(|i| Item::new(format!("P{}", i), 5.0, Category::Company))
        .collect();
    for (i, item) in items.iter_mut().enumerate() {
        item.hint = Some(if i % 2 == 0 { "A" } else { "B" }.to_string());
    }
    let p = Problem::new(
        items,
        vec![Bucket::new("A", 15.0, 0.0, 0.0), Bucket::new("B", 15.0, 0.0, 0.0)],
    )
    .unwrap();
    let opts = options(5, 1, 100);
    let mut store = MemoryStore::new();
    let mut rng = Rng::with_seed(8);

    let evo = Evolution::initialize(&p, &opts, &mut store, &mut rng).unwrap();
    let best = evo.best().unwrap();
    // The hinted allocation hits both targets exactly.
    assert_eq!(best.genes(), &[0, 1, 0, 1, 0, 1]);
    assert_eq!(best.objective(), Some(0.0));
}

struct StopAfter(usize);

impl ProgressCallback for StopAfter {
    fn on_generation(&self, record: &GenerationRecord, _best: Option<&Candidate>) -> bool {
        record.generation < self.0
    }
}

#[test]
fn test_callback_stops_run() {
    let p = problem();
    let opts = options(8, 50, 100);
    let mut store = MemoryStore::new();
    let mut rng = Rng::with_seed(4);

    let result = Optimizer::new(&p, opts).run(&mut store, &mut rng, StopAfter(3)).unwrap();
    assert_eq!(result.generations_run, 3);
    assert_eq!(result.history.len(), 3);
}

fn assert_distinct(population: &[Candidate]) {
    let unique: HashSet<&[usize]> = population.iter().map(Candidate::genes).collect();
    assert_eq!(unique.len(), population.len(), "Population holds duplicate genes");
}

#[test]
fn test_population_stays_distinct_after_repair() {
    // Two of six items excluded: the exclusion hook and the empty-bucket
    // repair collapse many offspring onto the same allocation.
    let cats = [Category::External, Category::Internal, Category::Company];
    let mut p = Problem::new(
        (0..6)
            .map(|i| Item::new(format!("P{}", i), 10.0 * (i + 1) as f64, cats[i % 3]))
            .collect(),
        vec![Bucket::new("X", 60.0, 10.0, 30.0), Bucket::new("Y", 40.0, 0.0, 20.0)],
    )
    .unwrap();
    p.exclude(0).unwrap();
    p.exclude(1).unwrap();

    for seed in 0..20 {
        let opts = options(30, 10, 100);
        let mut store = MemoryStore::new();
        let mut rng = Rng::with_seed(seed);
        let mut evo = Evolution::initialize(&p, &opts, &mut store, &mut rng).unwrap();
        assert_distinct(evo.population());
        for _ in 0..10 {
            evo.step(&mut store, &mut rng);
            assert_distinct(evo.population());
        }
    }
}

#[test]
fn test_population_stays_distinct_without_exclusions() {
    let p = problem();
    for seed in 0..20 {
        let opts = options(30, 10, 100);
        let mut store = MemoryStore::new();
        let mut rng = Rng::with_seed(seed);
        let mut evo = Evolution::initialize(&p, &opts, &mut store, &mut rng).unwrap();
        for _ in 0..10 {
            evo.step(&mut store, &mut rng);
            assert_distinct(evo.population());
        }
    }
}

/// Loads nothing and refuses every write.
struct FailingStore;

impl CheckpointStore for FailingStore {
    fn save(&mut self, key: &str, _blob: &[u8]) -> AfResult<()> {
        Err(AllocError::Checkpoint(format!("disk full writing '{}'", key)))
    }

    fn load(&self, _key: &str) -> AfResult<Option<Vec<u8>>> {
        Ok(None)
    }
}

#[test]
fn test_failed_checkpoint_writes_do_not_stop_the_run() {
    let p = problem();
    let opts = options(10, 5, 1);
    let mut store = FailingStore;
    let mut rng = Rng::with_seed(9);

    let result = Optimizer::new(&p, opts).run(&mut store, &mut rng, Silent).unwrap();
    assert_eq!(result.generations_run, 5);
    assert_eq!(result.history.len(), 5);
    assert!(result.best.objective().is_some());
}
