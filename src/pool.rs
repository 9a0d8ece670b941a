//! Mix pools: spool directories holding opaque message files (spec §4.4).
//! `Pool` is the shared directory primitive used by both the inbound pool
//! (`select_all`) and the outbound pool (`CottrellPool::release_subset`).

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::RngCore;
use std::cell::Cell;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("io error on pool directory: {0}")]
    Io(#[from] std::io::Error),
}

pub type PoolResult<T> = Result<T, PoolError>;

/// A spool directory with atomic deposit and per-cycle processed counters.
pub struct Pool {
    dir: PathBuf,
    hour_count: Cell<u64>,
    day_count: Cell<u64>,
}

impl Pool {
    pub fn open(dir: impl Into<PathBuf>) -> PoolResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Pool {
            dir,
            hour_count: Cell::new(0),
            day_count: Cell::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `bytes` to a new file with an unpredictable name, via a
    /// temp-name-then-rename so concurrent `select_*` never observes a
    /// partially written file.
    pub fn deposit(&self, bytes: &[u8]) -> PoolResult<String> {
        let name = self.unused_random_name()?;
        let tmp_path = self.dir.join(format!(".{name}.tmp"));
        let final_path = self.dir.join(&name);
        std::fs::write(&tmp_path, bytes)?;
        std::fs::rename(&tmp_path, &final_path)?;
        Ok(name)
    }

    pub fn delete(&self, filename: &str) -> PoolResult<()> {
        std::fs::remove_file(self.dir.join(filename))?;
        self.hour_count.set(self.hour_count.get() + 1);
        self.day_count.set(self.day_count.get() + 1);
        Ok(())
    }

    /// Every file currently in the pool (the inbound pool's `select_all`).
    pub fn select_all(&self) -> PoolResult<Vec<String>> {
        self.list_files()
    }

    pub fn len(&self) -> PoolResult<usize> {
        Ok(self.list_files()?.len())
    }

    /// Returns `(hour, day)` processed counts, zeroing them if `reset`.
    pub fn report_processed(&self, reset: bool) -> (u64, u64) {
        let hour = self.hour_count.get();
        let day = self.day_count.get();
        if reset {
            self.hour_count.set(0);
            self.day_count.set(0);
        }
        (hour, day)
    }

    fn list_files(&self) -> PoolResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                names.push(name);
            }
        }
        Ok(names)
    }

    fn unused_random_name(&self) -> PoolResult<String> {
        loop {
            let mut bytes = [0u8; 16];
            rand::thread_rng().fill_bytes(&mut bytes);
            let name: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
            if !self.dir.join(&name).exists() {
                return Ok(name);
            }
        }
    }
}

/// Outbound release policy: a Cottrell dynamic pool. Wraps a `Pool` with the
/// threshold/interval/rate state needed to decide when and how much to
/// release (spec §4.4).
pub struct CottrellPool {
    pool: Pool,
    size_threshold: u32,
    interval: chrono::Duration,
    last_release: Cell<Option<DateTime<Utc>>>,
}

impl CottrellPool {
    pub fn new(pool: Pool, size_threshold: u32, interval: chrono::Duration) -> Self {
        CottrellPool {
            pool,
            size_threshold,
            interval,
            last_release: Cell::new(None),
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// True iff the pool holds strictly more than the threshold AND the
    /// configured interval has elapsed since the last release.
    pub fn trigger(&self, now: DateTime<Utc>) -> PoolResult<bool> {
        let size = self.pool.len()? as u32;
        if size <= self.size_threshold {
            return Ok(false);
        }
        match self.last_release.get() {
            None => Ok(true),
            Some(last) => Ok(now - last >= self.interval),
        }
    }

    /// Selects a uniformly random subset of size `K = floor(N * rate / 100)`
    /// without replacement. Does not delete anything; the caller deletes
    /// each file via `pool().delete()` after it has been dispatched.
    pub fn release_subset(&self, rate: u8, now: DateTime<Utc>) -> PoolResult<Vec<String>> {
        let mut files = self.pool.select_all()?;
        let n = files.len();
        let k = (n * rate as usize) / 100;
        files.shuffle(&mut rand::thread_rng());
        files.truncate(k);
        self.last_release.set(Some(now));
        Ok(files)
    }
}
