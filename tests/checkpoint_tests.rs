use allocforge::checkpoint::{self, BestRecord, CheckpointStore, FileStore};
use allocforge::error::AllocError;

#[test]
fn test_file_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = FileStore::new(dir.path().join("nested/ckpt")).unwrap();

    let record = BestRecord {
        generation: 12,
        objective: 42.5,
        feasible: true,
        genes: vec![0, 2, 1, 2],
    };
    checkpoint::append_json(&mut store, checkpoint::BEST_INDIVIDUALS, vec![record.clone()], Some(10))
        .unwrap();
    checkpoint::save_text(&mut store, checkpoint::REPORT, "Objective: 42.5000\n").unwrap();

    assert!(store.dir().join("best_individuals.json").exists());
    assert!(store.dir().join("report.txt").exists());

    let reopened = FileStore::open(store.dir()).unwrap();
    let records: Vec<BestRecord> = checkpoint::load_json(&reopened, checkpoint::BEST_INDIVIDUALS)
        .unwrap()
        .unwrap();
    assert_eq!(records, vec![record]);
    assert_eq!(
        checkpoint::load_text(&reopened, checkpoint::REPORT).unwrap().as_deref(),
        Some("Objective: 42.5000\n")
    );
}

#[test]
fn test_file_store_overwrites_and_leaves_no_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = FileStore::new(dir.path()).unwrap();
    store.save(checkpoint::POPULATION, b"[[0]]").unwrap();
    store.save(checkpoint::POPULATION, b"[[1]]").unwrap();

    assert_eq!(store.load(checkpoint::POPULATION).unwrap().unwrap(), b"[[1]]");
    let leftovers = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|x| x == "tmp"))
        .count();
    assert_eq!(leftovers, 0);
}

#[test]
fn test_open_missing_dir_fails() {
    let dir = tempfile::tempdir().unwrap();
    let res = FileStore::open(dir.path().join("absent"));
    assert!(matches!(res, Err(AllocError::Checkpoint(_))));
}

#[test]
fn test_missing_key_reads_as_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path()).unwrap();
    assert!(store.load(checkpoint::HISTORY).unwrap().is_none());
}

#[test]
fn test_file_store_appends_known_good_lines() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = FileStore::new(dir.path()).unwrap();
    checkpoint::append_lines(&mut store, checkpoint::VALID_INDIVIDUALS, &[vec![0usize, 1]]).unwrap();
    checkpoint::append_lines(&mut store, checkpoint::VALID_INDIVIDUALS, &[vec![1usize, 0], vec![1, 1]])
        .unwrap();

    let raw = std::fs::read_to_string(dir.path().join("valid_individuals.jsonl")).unwrap();
    assert_eq!(raw, "[0,1]\n[1,0]\n[1,1]\n");
    let lines: Vec<Vec<usize>> = checkpoint::load_lines(&store, checkpoint::VALID_INDIVIDUALS)
        .unwrap()
        .unwrap();
    assert_eq!(lines.len(), 3);
}
