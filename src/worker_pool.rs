//! Opt-in bounded worker pool for parallelizing independent repository
//! scans (e.g. metadata regeneration). Per §5, this is never used inside
//! the resolver itself, which stays single-threaded.
//!
//! Grounded on `util/thread_pool.py`'s `map_async`: a fixed number of
//! worker threads pull work items off a shared queue until a sentinel
//! closes it; a kill flag lets a caller abort early without waiting for
//! the queue to drain; `join` on drop guarantees thread reclamation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

/// Runs `functor` over every item in `iterable` using `threads` worker
/// threads (clamped to the item count so we never spawn idle threads),
/// collecting whatever `functor` returns. Item order in the result is not
/// guaranteed — callers that need ordering should key their own results.
pub fn map_async<I, F, R>(iterable: Vec<I>, threads: usize, functor: F) -> Vec<R>
where
    I: Send + 'static,
    R: Send + 'static,
    F: Fn(I) -> Option<R> + Send + Sync + 'static,
{
    let parallelism = threads.min(iterable.len()).max(if iterable.is_empty() { 0 } else { 1 });
    if parallelism == 0 {
        return Vec::new();
    }

    let (work_tx, work_rx) = mpsc::channel::<I>();
    let work_rx = Arc::new(std::sync::Mutex::new(work_rx));
    let (result_tx, result_rx) = mpsc::channel::<R>();
    let kill = Arc::new(AtomicBool::new(false));
    let functor = Arc::new(functor);

    let mut handles = Vec::with_capacity(parallelism);
    for _ in 0..parallelism {
        let work_rx = Arc::clone(&work_rx);
        let result_tx = result_tx.clone();
        let kill = Arc::clone(&kill);
        let functor = Arc::clone(&functor);
        handles.push(thread::spawn(move || {
            loop {
                if kill.load(Ordering::Relaxed) {
                    break;
                }
                let item = {
                    let rx = work_rx.lock().unwrap();
                    rx.recv()
                };
                let Ok(item) = item else { break };
                if let Some(result) = functor(item) {
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
            }
        }));
    }
    drop(result_tx);

    for item in iterable {
        if work_tx.send(item).is_err() {
            kill.store(true, Ordering::Relaxed);
            break;
        }
    }
    drop(work_tx);

    let results: Vec<R> = result_rx.into_iter().collect();

    for handle in handles {
        let _ = handle.join();
    }

    results
}

/// Handle allowing a caller to request early termination of an in-flight
/// [`map_async`] batch. `map_async` itself is synchronous (it blocks until
/// all items are consumed or killed); this type exists for callers that
/// spawn it on a side thread and want to cancel.
#[derive(Clone, Default)]
pub struct KillSwitch(Arc<AtomicBool>);

impl KillSwitch {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn kill(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_killed(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_async_collects_all_results() {
        let items: Vec<u32> = (0..100).collect();
        let mut results = map_async(items, 8, |x| Some(x * 2));
        results.sort_unstable();
        let expected: Vec<u32> = (0..100).map(|x| x * 2).collect();
        assert_eq!(results, expected);
    }

    #[test]
    fn map_async_filters_none() {
        let items: Vec<u32> = (0..10).collect();
        let mut results = map_async(items, 4, |x| if x % 2 == 0 { Some(x) } else { None });
        results.sort_unstable();
        assert_eq!(results, vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn map_async_empty_input() {
        let results: Vec<u32> = map_async(Vec::new(), 4, |x| Some(x));
        assert!(results.is_empty());
    }

    #[test]
    fn map_async_does_not_overspawn_threads_for_small_input() {
        let items = vec![1u32, 2, 3];
        let results = map_async(items, 64, |x| Some(x));
        assert_eq!(results.len(), 3);
    }
}
