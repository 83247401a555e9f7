// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The local-filesystem [`Store`] backend: one data file per index-key
//! *generation*, opened in append mode and shared by every archiving
//! thread through a small, reentrant-locked handle pool. A generation ends
//! at [`LocalStore::flush`]: the next archive to a previously-flushed
//! index-key opens a new `<index-key>.<generation>.dat` file rather than
//! appending to the one the prior generation wrote, so a superseded
//! generation's bytes stay in their own file and can be deleted on their
//! own once nothing live references them.

use super::Store;
use crate::descriptor_table::DescriptorTable;
use crate::key::Key;
use crate::location::FieldLocation;
use crate::slice::Slice;
use crate::Result;
use parking_lot::{Mutex, ReentrantMutex};
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Reads `buf.len()` bytes starting at `offset` without touching the file's
/// shared cursor, so a `File` handle cached and cloned across concurrent
/// retrievals (via [`DescriptorTable`]) never races another reader's `seek`.
#[cfg(unix)]
fn read_at(file: &File, offset: u64, buf: &mut [u8]) -> Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)?;
    Ok(())
}

#[cfg(windows)]
fn read_at(file: &File, offset: u64, buf: &mut [u8]) -> Result<()> {
    use std::os::windows::fs::FileExt;
    let mut read = 0;
    while read < buf.len() {
        let n = file.seek_read(&mut buf[read..], offset + read as u64)?;
        if n == 0 {
            return Err(crate::Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "short read from local data file",
            )));
        }
        read += n;
    }
    Ok(())
}

const DESCRIPTOR_TABLE_CAPACITY: usize = 128;

/// A `path -> open append-mode file handle` pool. Concurrent archives to
/// the same index-key share one handle (the "shared, buffered handle"
/// contract). Protected by a reentrant mutex: evicting the least-recently
/// used handle when the pool is at capacity re-enters the pool to remove
/// an entry while the inserting call already holds the lock, which a plain
/// `std::sync::Mutex` cannot do without deadlocking.
struct DataHandlePool {
    capacity: usize,
    state: ReentrantMutex<RefCell<PoolState>>,
}

#[derive(Default)]
struct PoolState {
    handles: FxHashMap<PathBuf, Arc<File>>,
    lru: VecDeque<PathBuf>,
}

impl DataHandlePool {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: ReentrantMutex::new(RefCell::new(PoolState::default())),
        }
    }

    fn get_or_open(&self, path: &Path) -> Result<Arc<File>> {
        {
            let guard = self.state.lock();
            let mut state = guard.borrow_mut();
            if let Some(handle) = state.handles.get(path).cloned() {
                state.lru.retain(|p| p != path);
                state.lru.push_back(path.to_path_buf());
                return Ok(handle);
            }
        }

        if self.len() >= self.capacity {
            self.evict_oldest();
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;
        let handle = Arc::new(file);

        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        state.handles.insert(path.to_path_buf(), handle.clone());
        state.lru.push_back(path.to_path_buf());

        Ok(handle)
    }

    fn len(&self) -> usize {
        let guard = self.state.lock();
        guard.borrow().handles.len()
    }

    /// Re-enters the pool's lock to drop the least-recently-used handle.
    fn evict_oldest(&self) {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        if let Some(oldest) = state.lru.pop_front() {
            state.handles.remove(&oldest);
            log::trace!("evicted data handle for {}", oldest.display());
        }
    }
}

/// Per-index-key generation bookkeeping: the generation number new
/// archives currently land in, and which index-keys have been archived
/// into since the last flush (so only those advance when it happens —
/// an index-key never touched this generation has nothing to seal).
#[derive(Default)]
struct GenerationState {
    current: FxHashMap<String, u64>,
    touched_since_flush: FxHashSet<String>,
}

pub struct LocalStore {
    root: PathBuf,
    pool: DataHandlePool,
    /// Read-side fd cache, distinct from `pool`'s write handles: a
    /// retrieval reopens the file read-only rather than sharing the
    /// append-mode handle, so repeated retrievals from the same data file
    /// skip the `open` syscall.
    descriptor_table: DescriptorTable,
    generations: Mutex<GenerationState>,
}

fn sanitize(canonical: &str) -> String {
    canonical
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

impl LocalStore {
    #[must_use]
    pub fn new(root: PathBuf, handle_pool_capacity: usize) -> Self {
        Self {
            root,
            pool: DataHandlePool::new(handle_pool_capacity),
            descriptor_table: DescriptorTable::new(DESCRIPTOR_TABLE_CAPACITY),
            generations: Mutex::new(GenerationState::default()),
        }
    }

    /// The current generation's data file for `index_key`, marking it
    /// touched so the next `flush` advances its generation counter.
    fn data_path(&self, index_key: &Key) -> PathBuf {
        let canonical = index_key.to_string();
        let mut state = self.generations.lock();
        let generation = *state.current.get(&canonical).unwrap_or(&0);
        state.touched_since_flush.insert(canonical.clone());
        self.root
            .join(format!("{}.{generation}.dat", sanitize(&canonical)))
    }
}

impl Store for LocalStore {
    fn archive(&mut self, index_key: &Key, bytes: &[u8]) -> Result<FieldLocation> {
        std::fs::create_dir_all(&self.root)?;
        let path = self.data_path(index_key);
        let handle = self.pool.get_or_open(&path)?;

        let offset = handle.metadata()?.len();
        (&*handle).write_all(bytes)?;

        log::trace!(
            "local store: archived {} bytes for {index_key} at offset {offset}",
            bytes.len()
        );

        Ok(FieldLocation::LocalFile {
            path,
            offset,
            length: bytes.len() as u64,
            remap_key: None,
        })
    }

    fn retrieve(&self, location: &FieldLocation) -> Result<Slice> {
        let FieldLocation::LocalFile { path, offset, length, .. } = location else {
            return Err(crate::Error::Unsupported("local store cannot resolve a non-local-file location"));
        };

        let file = match self.descriptor_table.access(path) {
            Some(file) => file,
            None => {
                let file = Arc::new(File::open(path)?);
                self.descriptor_table.insert(path.clone(), file.clone());
                file
            }
        };

        let mut buf = vec![0u8; *length as usize];
        read_at(&file, *offset, &mut buf)?;

        Ok(Slice::from(buf))
    }

    fn flush(&mut self) -> Result<u64> {
        let total = {
            let guard = self.pool.state.lock();
            let state = guard.borrow();
            let mut total = 0u64;
            for handle in state.handles.values() {
                handle.sync_data()?;
                total += handle.metadata()?.len();
            }
            total
        };

        // Seal this generation: every index-key archived into since the
        // last flush advances to a fresh file next time, and its now-sealed
        // write handle is dropped from the pool so `get_or_open` reopens
        // under the new generation's path rather than reusing this one.
        let mut gen_state = self.generations.lock();
        let touched: Vec<String> = gen_state.touched_since_flush.drain().collect();
        for canonical in touched {
            *gen_state.current.entry(canonical).or_insert(0) += 1;
        }
        drop(gen_state);

        let guard = self.pool.state.lock();
        let mut state = guard.borrow_mut();
        state.handles.clear();
        state.lru.clear();

        Ok(total)
    }

    fn remove(&mut self, uri: &str, doit: bool) -> Result<()> {
        let Some(path) = uri.strip_prefix("file://") else {
            return Ok(());
        };

        if doit {
            std::fs::remove_file(path)?;
            log::debug!("local store: removed {uri}");
        } else {
            log::info!("local store: would remove {uri} (doit=false)");
        }
        Ok(())
    }

    fn uri_belongs(&self, uri: &str) -> bool {
        uri.strip_prefix("file://")
            .map(|path| Path::new(path).starts_with(&self.root))
            .unwrap_or(false)
    }

    fn collocated_data_uris(&self) -> Result<Vec<String>> {
        let mut uris = Vec::new();
        if !self.root.exists() {
            return Ok(uris);
        }

        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.path().extension().and_then(|e| e.to_str()) == Some("dat") {
                uris.push(format!("file://{}", entry.path().display()));
            }
        }
        Ok(uris)
    }
}
