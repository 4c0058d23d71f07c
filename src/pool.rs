#![forbid(unsafe_code)]

//! Bounded worker pool that hands results back in input order.

use anyhow::{Result, bail};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Runs `work(index, item)` for every item on at most `jobs` threads.
///
/// Results come back in input order. After the first failure no new items
/// are started, and the failure with the lowest index is returned. With
/// `jobs <= 1` everything runs on the calling thread, one item at a time.
pub fn run_ordered<T, R, F>(items: Vec<T>, jobs: usize, work: F) -> Result<Vec<R>>
where
    T: Send,
    R: Send,
    F: Fn(usize, T) -> Result<R> + Sync,
{
    let total = items.len();
    let workers = jobs.max(1).min(total);
    if workers <= 1 {
        return items
            .into_iter()
            .enumerate()
            .map(|(index, item)| work(index, item))
            .collect();
    }

    let queue = Mutex::new(items.into_iter().enumerate());
    let slots: Mutex<Vec<Option<Result<R>>>> = Mutex::new((0..total).map(|_| None).collect());
    let failed = AtomicBool::new(false);

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                loop {
                    if failed.load(Ordering::Acquire) {
                        break;
                    }
                    let Some((index, item)) = queue.lock().next() else {
                        break;
                    };
                    let result = work(index, item);
                    if result.is_err() {
                        failed.store(true, Ordering::Release);
                    }
                    slots.lock()[index] = Some(result);
                }
            });
        }
    });

    let mut results = Vec::with_capacity(total);
    for slot in slots.into_inner() {
        match slot {
            Some(Ok(value)) => results.push(value),
            Some(Err(err)) => return Err(err),
            None => {}
        }
    }
    if results.len() != total {
        bail!("worker pool finished {} of {} items", results.len(), total);
    }
    Ok(results)
}
