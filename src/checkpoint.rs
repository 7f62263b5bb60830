use crate::error::{AfResult, AllocError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const BEST_INDIVIDUALS: &str = "best_individuals";
pub const POPULATION: &str = "population";
pub const HISTORY: &str = "history";
pub const VALID_INDIVIDUALS: &str = "valid_individuals";
pub const REPORT: &str = "report";

/// Key/blob persistence used by the evolution loop.
pub trait CheckpointStore {
    fn save(&mut self, key: &str, blob: &[u8]) -> AfResult<()>;
    fn load(&self, key: &str) -> AfResult<Option<Vec<u8>>>;

    /// Adds `blob` to the end of whatever is stored under `key`.
    fn append(&mut self, key: &str, blob: &[u8]) -> AfResult<()> {
        let mut data = self.load(key)?.unwrap_or_default();
        data.extend_from_slice(blob);
        self.save(key, &data)
    }
}

/// One file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> AfResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Opens an existing checkpoint directory without creating it.
    pub fn open<P: AsRef<Path>>(dir: P) -> AfResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(AllocError::Checkpoint(format!(
                "Checkpoint directory '{}' does not exist",
                dir.display()
            )));
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let ext = match key {
            REPORT => "txt",
            VALID_INDIVIDUALS => "jsonl",
            _ => "json",
        };
        self.dir.join(format!("{}.{}", key, ext))
    }
}

impl CheckpointStore for FileStore {
    fn save(&mut self, key: &str, blob: &[u8]) -> AfResult<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, blob)?;
        fs::rename(&tmp, &path)?;
        debug!("💾 Saved '{}' ({} bytes)", key, blob.len());
        Ok(())
    }

    fn load(&self, key: &str) -> AfResult<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn append(&mut self, key: &str, blob: &[u8]) -> AfResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(key))?;
        file.write_all(blob)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    blobs: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.blobs.keys().map(String::as_str)
    }
}

impl CheckpointStore for MemoryStore {
    fn save(&mut self, key: &str, blob: &[u8]) -> AfResult<()> {
        self.blobs.insert(key.to_string(), blob.to_vec());
        Ok(())
    }

    fn load(&self, key: &str) -> AfResult<Option<Vec<u8>>> {
        Ok(self.blobs.get(key).cloned())
    }

    fn append(&mut self, key: &str, blob: &[u8]) -> AfResult<()> {
        self.blobs.entry(key.to_string()).or_default().extend_from_slice(blob);
        Ok(())
    }
}

/// One entry of the `best_individuals` log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestRecord {
    pub generation: usize,
    pub objective: f64,
    pub feasible: bool,
    pub genes: Vec<usize>,
}

pub fn save_json<T: Serialize + ?Sized>(
    store: &mut dyn CheckpointStore,
    key: &str,
    value: &T,
) -> AfResult<()> {
    let blob = serde_json::to_vec(value)?;
    store.save(key, &blob)
}

/// `Ok(None)` when the key was never written; a blob that does not parse is
/// a `Checkpoint` error.
pub fn load_json<T: DeserializeOwned>(store: &dyn CheckpointStore, key: &str) -> AfResult<Option<T>> {
    match store.load(key)? {
        None => Ok(None),
        Some(blob) => serde_json::from_slice(&blob).map(Some).map_err(|e| {
            AllocError::Checkpoint(format!("Corrupt '{}' blob: {}", key, e))
        }),
    }
}

/// Appends to a JSON list stored under `key`. With a capacity, the oldest
/// entries are dropped first.
pub fn append_json<T: Serialize + DeserializeOwned>(
    store: &mut dyn CheckpointStore,
    key: &str,
    items: Vec<T>,
    capacity: Option<usize>,
) -> AfResult<()> {
    if items.is_empty() {
        return Ok(());
    }
    let mut list: Vec<T> = load_json(store, key)?.unwrap_or_default();
    list.extend(items);
    if let Some(cap) = capacity {
        if list.len() > cap {
            let excess = list.len() - cap;
            list.drain(..excess);
        }
    }
    save_json(store, key, &list)
}

/// Appends one JSON document per line. Nothing already stored is rewritten.
pub fn append_lines<T: Serialize>(
    store: &mut dyn CheckpointStore,
    key: &str,
    items: &[T],
) -> AfResult<()> {
    if items.is_empty() {
        return Ok(());
    }
    let mut blob = Vec::new();
    for item in items {
        serde_json::to_writer(&mut blob, item)?;
        blob.push(b'\n');
    }
    store.append(key, &blob)
}

/// Reads a log written by [`append_lines`]. A line that does not parse is a
/// `Checkpoint` error.
pub fn load_lines<T: DeserializeOwned>(
    store: &dyn CheckpointStore,
    key: &str,
) -> AfResult<Option<Vec<T>>> {
    let Some(blob) = store.load(key)? else {
        return Ok(None);
    };
    blob.split(|&b| b == b'\n')
        .enumerate()
        .filter(|(_, line)| !line.is_empty())
        .map(|(n, line)| {
            serde_json::from_slice(line).map_err(|e| {
                AllocError::Checkpoint(format!("Corrupt '{}' line {}: {}", key, n + 1, e))
            })
        })
        .collect::<AfResult<Vec<T>>>()
        .map(Some)
}

pub fn save_text(store: &mut dyn CheckpointStore, key: &str, text: &str) -> AfResult<()> {
    store.save(key, text.as_bytes())
}

pub fn load_text(store: &dyn CheckpointStore, key: &str) -> AfResult<Option<String>> {
    match store.load(key)? {
        None => Ok(None),
        Some(blob) => String::from_utf8(blob)
            .map(Some)
            .map_err(|e| AllocError::Checkpoint(format!("'{}' is not UTF-8: {}", key, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_respects_capacity() {
        let mut store = MemoryStore::new();
        append_json(&mut store, BEST_INDIVIDUALS, vec![1, 2, 3], Some(4)).unwrap();
        append_json(&mut store, BEST_INDIVIDUALS, vec![4, 5], Some(4)).unwrap();
        let list: Vec<i32> = load_json(&store, BEST_INDIVIDUALS).unwrap().unwrap();
        assert_eq!(list, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_corrupt_blob_is_checkpoint_error() {
        let mut store = MemoryStore::new();
        store.save(POPULATION, b"{not json").unwrap();
        let res: AfResult<Option<Vec<Vec<usize>>>> = load_json(&store, POPULATION);
        assert!(matches!(res, Err(AllocError::Checkpoint(_))));
    }

    #[test]
    fn test_lines_accumulate_across_appends() {
        let mut store = MemoryStore::new();
        append_lines(&mut store, VALID_INDIVIDUALS, &[vec![0usize, 1], vec![1, 1]]).unwrap();
        append_lines::<Vec<usize>>(&mut store, VALID_INDIVIDUALS, &[]).unwrap();
        append_lines(&mut store, VALID_INDIVIDUALS, &[vec![2usize, 0]]).unwrap();

        let raw = store.load(VALID_INDIVIDUALS).unwrap().unwrap();
        assert_eq!(raw, b"[0,1]\n[1,1]\n[2,0]\n");
        let lines: Vec<Vec<usize>> = load_lines(&store, VALID_INDIVIDUALS).unwrap().unwrap();
        assert_eq!(lines, vec![vec![0, 1], vec![1, 1], vec![2, 0]]);
    }

    #[test]
    fn test_corrupt_line_is_checkpoint_error() {
        let mut store = MemoryStore::new();
        store.append(VALID_INDIVIDUALS, b"[0,1]\n[0,").unwrap();
        let res: AfResult<Option<Vec<Vec<usize>>>> = load_lines(&store, VALID_INDIVIDUALS);
        assert!(matches!(res, Err(AllocError::Checkpoint(_))));
    }

    #[test]
    fn test_missing_key_is_none() {
        let store = MemoryStore::new();
        let res: Option<Vec<usize>> = load_json(&store, HISTORY).unwrap();
        assert!(res.is_none());
        assert!(load_text(&store, REPORT).unwrap().is_none());
    }
}
