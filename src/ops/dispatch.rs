//! Batch-row dispatcher.
//!
//! Splits a unit-of-work count across the [`WorkerPool`] and blocks until
//! every partition has finished. Layers use it to parallelize their per-row
//! computation; a dispatched worker never dispatches again.
//!
//! # Partitioning
//!
//! For `N` units and `W` workers the half-open range `[0, N)` is cut into at
//! most `W` contiguous pieces: each piece gets `N / W` units and the first
//! `N mod W` pieces get one more, so sizes differ by at most one. When
//! `N < W` exactly `N` single-unit pieces are produced.
//!
//! With `W <= 1` or `N <= 1` the worker runs once, inline, over `[0, N)`.
//! Otherwise every piece but the last is spawned onto the pool and the last
//! runs on the calling thread.
//!
//! # Example
//! ```rust
//! use minicnn::backend::WorkerPool;
//! use minicnn::ops::dispatch::dispatch;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let pool = WorkerPool::new(4)?;
//! let covered = AtomicUsize::new(0);
//! dispatch(&pool, 10, |start, end| {
//!     covered.fetch_add(end - start, Ordering::Relaxed);
//! })?;
//! assert_eq!(covered.into_inner(), 10);
//! # Ok::<(), minicnn::error::Error>(())
//! ```

use core::ops::Range;

use log::trace;

use crate::backend::WorkerPool;
use crate::error::Result;

/// Cuts `[0, number)` into at most `workers` contiguous, balanced ranges.
#[must_use]
pub fn partitions(number: usize, workers: usize) -> Vec<Range<usize>> {
    if number == 0 {
        return Vec::new();
    }
    if workers <= 1 || number <= 1 {
        return vec![0..number];
    }

    let payload = number / workers;
    let remainder = number % workers;

    let mut ranges = Vec::with_capacity(workers.min(number));
    let mut start = 0;
    for i in 0..workers {
        let end = start + payload + usize::from(i < remainder);
        ranges.push(start..end);
        start = end;
        if end >= number {
            break;
        }
    }
    ranges
}

/// Invokes `worker(start, end)` once per partition of `[0, number)`.
///
/// Blocks until every invocation returns. Nothing runs when `number == 0`.
///
/// # Errors
/// Returns [`Error::PoolStopped`](crate::error::Error::PoolStopped) if the pool
/// has been shut down.
pub fn dispatch<F>(pool: &WorkerPool, number: usize, worker: F) -> Result<()>
where
    F: Fn(usize, usize) + Sync,
{
    if number == 0 {
        return Ok(());
    }

    pool.run(|threads| match threads {
        Some(threads) if number > 1 && threads.current_num_threads() > 1 => {
            let ranges = partitions(number, threads.current_num_threads());
            trace!("dispatching {number} units over {} partitions", ranges.len());

            let worker = &worker;
            threads.in_place_scope(|scope| {
                if let Some((last, spawned)) = ranges.split_last() {
                    for range in spawned {
                        let range = range.clone();
                        scope.spawn(move |_| worker(range.start, range.end));
                    }
                    worker(last.start, last.end);
                }
            });
        }
        _ => worker(0, number),
    })
}

/// Like [`dispatch`], but hands each partition its own disjoint slice of `out`.
///
/// `out` is viewed as `rows` consecutive rows of `row_len` values; the worker
/// receives the row range and the matching sub-slice, so concurrent
/// partitions never write overlapping memory.
///
/// # Errors
/// Returns [`Error::PoolStopped`](crate::error::Error::PoolStopped) if the pool
/// has been shut down.
///
/// # Panics
/// Panics if `out` holds fewer than `rows * row_len` values.
pub fn dispatch_rows<F>(
    pool: &WorkerPool,
    rows: usize,
    row_len: usize,
    out: &mut [f32],
    worker: F,
) -> Result<()>
where
    F: Fn(Range<usize>, &mut [f32]) + Sync,
{
    if rows == 0 {
        return Ok(());
    }
    let out = &mut out[..rows * row_len];

    pool.run(|threads| match threads {
        Some(threads) if rows > 1 && threads.current_num_threads() > 1 => {
            let ranges = partitions(rows, threads.current_num_threads());
            trace!("dispatching {rows} rows over {} partitions", ranges.len());

            let worker = &worker;
            threads.in_place_scope(|scope| {
                let mut rest = out;
                let last = ranges.len() - 1;
                for (i, range) in ranges.into_iter().enumerate() {
                    let (chunk, tail) = rest.split_at_mut(range.len() * row_len);
                    rest = tail;
                    if i == last {
                        worker(range, chunk);
                    } else {
                        scope.spawn(move |_| worker(range, chunk));
                    }
                }
            });
        }
        _ => worker(0..rows, out),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn partitions_cover_range_exactly_once() {
        for workers in 1..6 {
            for number in 0..23 {
                let ranges = partitions(number, workers);
                let mut next = 0;
                for r in &ranges {
                    assert_eq!(r.start, next);
                    next = r.end;
                }
                assert_eq!(next, number);

                let expected = if number == 0 {
                    0
                } else if workers <= 1 || number <= 1 {
                    1
                } else {
                    workers.min(number)
                };
                assert_eq!(ranges.len(), expected, "n={number} w={workers}");

                let min = ranges.iter().map(Range::len).min().unwrap_or(0);
                let max = ranges.iter().map(Range::len).max().unwrap_or(0);
                assert!(max - min <= 1);
            }
        }
    }

    #[test]
    fn first_partitions_take_the_remainder() {
        assert_eq!(partitions(10, 4), vec![0..3, 3..6, 6..8, 8..10]);
        assert_eq!(partitions(3, 4), vec![0..1, 1..2, 2..3]);
    }

    #[test]
    fn dispatch_visits_every_unit_once() {
        let pool = WorkerPool::new(3).unwrap();
        let seen = Mutex::new(Vec::new());
        dispatch(&pool, 11, |start, end| {
            seen.lock().unwrap().push(start..end);
        })
        .unwrap();

        let mut seen = seen.into_inner().unwrap();
        seen.sort_by_key(|r| r.start);
        assert_eq!(seen, vec![0..4, 4..8, 8..11]);
    }

    #[test]
    fn small_work_runs_once_inline() {
        let pool = WorkerPool::new(4).unwrap();
        let calls = Mutex::new(Vec::new());
        dispatch(&pool, 1, |s, e| calls.lock().unwrap().push((s, e))).unwrap();
        assert_eq!(calls.into_inner().unwrap(), vec![(0, 1)]);

        let single = WorkerPool::single_threaded();
        let calls = Mutex::new(Vec::new());
        dispatch(&single, 9, |s, e| calls.lock().unwrap().push((s, e))).unwrap();
        assert_eq!(calls.into_inner().unwrap(), vec![(0, 9)]);
    }

    #[test]
    fn last_partition_runs_on_calling_thread() {
        let pool = WorkerPool::new(3).unwrap();
        let caller = std::thread::current().id();

        let seen = Mutex::new(Vec::new());
        dispatch(&pool, 9, |s, _| {
            seen.lock().unwrap().push((s, std::thread::current().id()));
        })
        .unwrap();
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 3);
        let &(_, last) = seen.iter().max_by_key(|(s, _)| *s).unwrap();
        assert_eq!(last, caller);

        let seen = Mutex::new(Vec::new());
        let mut out = vec![0.0f32; 9];
        dispatch_rows(&pool, 9, 1, &mut out, |rows, _| {
            seen.lock().unwrap().push((rows.start, std::thread::current().id()));
        })
        .unwrap();
        let seen = seen.into_inner().unwrap();
        let &(_, last) = seen.iter().max_by_key(|(s, _)| *s).unwrap();
        assert_eq!(last, caller);
    }

    #[test]
    fn dispatch_rows_writes_disjoint_chunks() {
        let pool = WorkerPool::new(4).unwrap();
        let mut out = vec![0.0f32; 7 * 3];
        dispatch_rows(&pool, 7, 3, &mut out, |rows, chunk| {
            for (k, row) in rows.zip(chunk.chunks_mut(3)) {
                row.fill(k as f32);
            }
        })
        .unwrap();

        for (k, row) in out.chunks(3).enumerate() {
            assert_eq!(row, &[k as f32; 3]);
        }
    }
}
