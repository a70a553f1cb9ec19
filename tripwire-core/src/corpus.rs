//! Seed corpus loading.

use std::path::{Path, PathBuf};

use crate::CoreError;

/// One seed input read from the corpus directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seed {
    /// Where the seed was read from.
    pub path: PathBuf,
    /// Raw file contents.
    pub data: Vec<u8>,
}

/// Read every file under `dir`, recursively, as a seed.
///
/// Directories are descended into and never yield seeds themselves.
/// Seeds are returned sorted by path so replays are reproducible.
///
/// # Errors
/// Returns [`CoreError::Corpus`] for the first directory or file that
/// cannot be read.
pub fn load_corpus(dir: &Path) -> Result<Vec<Seed>, CoreError> {
    let root = std::path::absolute(dir).map_err(|source| CoreError::Corpus {
        path: dir.to_owned(),
        source,
    })?;

    let mut seeds = Vec::new();
    let mut pending = vec![root];
    while let Some(current) = pending.pop() {
        let entries = std::fs::read_dir(&current).map_err(|source| CoreError::Corpus {
            path: current.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| CoreError::Corpus {
                path: current.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            let data = std::fs::read(&path).map_err(|source| CoreError::Corpus {
                path: path.clone(),
                source,
            })?;
            seeds.push(Seed { path, data });
        }
    }

    seeds.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(seeds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_files_recursively_and_skips_directories() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::write(dir.path().join("a"), b"first").expect("write a");
        std::fs::create_dir_all(dir.path().join("nested/deeper")).expect("mkdir");
        std::fs::write(dir.path().join("nested/b"), [0u8, 1, 2]).expect("write b");
        std::fs::write(dir.path().join("nested/deeper/c"), b"").expect("write c");

        let seeds = load_corpus(dir.path()).expect("load");
        let data: Vec<&[u8]> = seeds.iter().map(|s| s.data.as_slice()).collect();
        assert_eq!(data, vec![&b"first"[..], &[0u8, 1, 2][..], &b""[..]]);
        assert!(seeds.iter().all(|s| s.path.is_absolute()));
    }

    #[test]
    fn empty_directory_yields_no_seeds() {
        let dir = tempfile::tempdir().expect("temp dir");
        assert!(load_corpus(dir.path()).expect("load").is_empty());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = load_corpus(&dir.path().join("absent")).expect_err("must fail");
        assert!(matches!(err, CoreError::Corpus { .. }));
    }
}
