//! Structural diff between two versioned map snapshots.
//!
//! Values are opaque: a change anywhere inside a nested value produces one
//! `replace` of the whole top-level key. The script is always sorted by
//! path, so two servers diffing the same pair of snapshots emit identical
//! bytes whether or not the work ran in parallel.
//!
//! Large diffs fan the per-key comparison and rendering out over a scoped
//! worker pool. Workers claim chunks from an atomic counter and the results
//! are merged and sorted afterwards, so scheduling never shows in the output.

use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::map::VersionedMap;
use crate::patch::{Operation, Patch};

/// Tuning for [`diff_with`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffOptions {
    /// Minimum number of candidate keys before the parallel path is used.
    pub parallel_threshold: usize,
    /// Upper bound on worker threads.
    pub max_workers: usize,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            parallel_threshold: 4096,
            max_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

impl DiffOptions {
    /// Always diff on the calling thread.
    pub fn sequential() -> Self {
        Self {
            parallel_threshold: usize::MAX,
            max_workers: 1,
        }
    }
}

/// A key present in either snapshot, with its value on each side.
struct Candidate<'a> {
    key: &'a str,
    from: Option<&'a Bytes>,
    to: Option<&'a Bytes>,
}

impl Candidate<'_> {
    fn render(&self) -> Result<Option<Operation>> {
        match (self.from, self.to) {
            (Some(_), None) => Ok(Some(Operation::remove(self.key))),
            (None, Some(new)) => Operation::add(self.key, new).map(Some),
            (Some(old), Some(new)) if old != new => Operation::replace(self.key, new).map(Some),
            _ => Ok(None),
        }
    }
}

/// Compute the edit script that turns `from` into `to`.
pub fn diff(from: &VersionedMap, to: &VersionedMap) -> Result<Patch> {
    diff_with(from, to, &DiffOptions::default())
}

/// Compute the edit script that turns `from` into `to`, with explicit tuning.
pub fn diff_with(from: &VersionedMap, to: &VersionedMap, options: &DiffOptions) -> Result<Patch> {
    if from.ptr_eq(to) {
        return Ok(Vec::new());
    }

    let candidates = merge_keys(from, to);
    let workers = options.max_workers.min(candidates.len()).max(1);

    let mut patch = if candidates.len() < options.parallel_threshold || workers == 1 {
        render_all(&candidates)?
    } else {
        render_parallel(&candidates, workers)?
    };

    // Escaping can reorder keys relative to their raw order.
    patch.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(patch)
}

/// The script that rebuilds `to` from any client state: clear, then add
/// every key.
pub fn full_resync(to: &VersionedMap) -> Result<Patch> {
    let mut patch = Vec::with_capacity(to.len() + 1);
    patch.push(Operation::remove_all());
    patch.extend(diff(&VersionedMap::new(), to)?);
    Ok(patch)
}

/// Walk both key sets in order and pair up the values.
fn merge_keys<'a>(from: &'a VersionedMap, to: &'a VersionedMap) -> Vec<Candidate<'a>> {
    let mut out = Vec::with_capacity(from.len().max(to.len()));
    let mut left = from.iter().peekable();
    let mut right = to.iter().peekable();

    loop {
        let candidate = match (left.peek(), right.peek()) {
            (Some(&(lk, lv)), Some(&(rk, rv))) => match lk.cmp(rk) {
                std::cmp::Ordering::Less => {
                    left.next();
                    Candidate { key: lk, from: Some(lv), to: None }
                }
                std::cmp::Ordering::Greater => {
                    right.next();
                    Candidate { key: rk, from: None, to: Some(rv) }
                }
                std::cmp::Ordering::Equal => {
                    left.next();
                    right.next();
                    Candidate { key: lk, from: Some(lv), to: Some(rv) }
                }
            },
            (Some(&(lk, lv)), None) => {
                left.next();
                Candidate { key: lk, from: Some(lv), to: None }
            }
            (None, Some(&(rk, rv))) => {
                right.next();
                Candidate { key: rk, from: None, to: Some(rv) }
            }
            (None, None) => break,
        };
        out.push(candidate);
    }

    out
}

fn render_all(candidates: &[Candidate<'_>]) -> Result<Patch> {
    let mut patch = Vec::new();
    for candidate in candidates {
        if let Some(op) = candidate.render()? {
            patch.push(op);
        }
    }
    Ok(patch)
}

fn render_parallel(candidates: &[Candidate<'_>], workers: usize) -> Result<Patch> {
    let chunk_size = (candidates.len() / (workers * 4)).max(1);
    let chunks: Vec<&[Candidate<'_>]> = candidates.chunks(chunk_size).collect();
    let next_chunk = AtomicUsize::new(0);

    tracing::debug!(
        candidates = candidates.len(),
        workers,
        chunks = chunks.len(),
        "rendering diff in parallel"
    );

    let results: Vec<Result<Patch>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let chunks = &chunks;
                let next_chunk = &next_chunk;

                s.spawn(move || -> Result<Patch> {
                    let mut local = Vec::new();
                    loop {
                        let index = next_chunk.fetch_add(1, Ordering::Relaxed);
                        let Some(chunk) = chunks.get(index) else {
                            break;
                        };
                        local.extend(render_all(chunk)?);
                    }
                    Ok(local)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(result) => result,
                Err(e) => std::panic::resume_unwind(e),
            })
            .collect()
    });

    let mut patch = Vec::new();
    for result in results {
        patch.extend(result?);
    }
    Ok(patch)
}
