// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker pool (§4.6, component C6): a fixed-but-growable pool of OS
//! threads that the scheduler dispatches jobs onto, built on `rayon`'s
//! thread pool the way `boulder`'s build-job runners size a
//! `rayon::ThreadPoolBuilder` to a job-count argument.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};

use log::{error, warn};

/// A handler panicking becomes a logged job failure, never a process abort;
/// a *callback* panicking is swallowed entirely (it runs after the job's own
/// result has already been recorded, so there is nothing left to fail).
pub struct Pool {
    inner: RwLock<Arc<rayon::ThreadPool>>,
    size: AtomicUsize,
    active: Arc<(Mutex<usize>, Condvar)>,
}

impl Pool {
    /// Build a pool with `size` worker threads (§5: one OS thread per
    /// configured job slot, named for easier diagnosis in `ps`/backtraces).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            inner: RwLock::new(Arc::new(build(size))),
            size: AtomicUsize::new(size),
            active: Arc::new((Mutex::new(0), Condvar::new())),
        }
    }

    pub fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    /// Grow the pool to `new_size` worker threads if it is currently
    /// smaller; a no-op otherwise. Existing in-flight jobs are unaffected —
    /// `rayon` rebalances new work across however many threads the rebuilt
    /// pool reports.
    pub fn grow_to(&self, new_size: usize) {
        let new_size = new_size.max(1);
        if new_size <= self.size.load(Ordering::SeqCst) {
            return;
        }

        let rebuilt = build(new_size);
        *self.inner.write().expect("pool lock") = Arc::new(rebuilt);
        self.size.store(new_size, Ordering::SeqCst);
    }

    /// Enqueue `job` for execution on a worker thread. A panic inside `job`
    /// is caught and logged rather than propagated; the pool itself stays
    /// usable for further work.
    pub fn enqueue(&self, job: impl FnOnce() + Send + 'static) {
        self.enqueue_with_callback(job, || {});
    }

    /// Enqueue `job`, then run `callback` on the same worker thread once
    /// `job` returns (or panics). `callback` panics are swallowed and
    /// logged; they never affect the job's own recorded outcome.
    pub fn enqueue_with_callback(&self, job: impl FnOnce() + Send + 'static, callback: impl FnOnce() + Send + 'static) {
        let pool = self.inner.read().expect("pool lock").clone();
        let active = self.active.clone();

        {
            let (lock, _) = &*active;
            *lock.lock().expect("active counter lock") += 1;
        }

        pool.spawn(move || {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                error!("worker job panicked: {}", panic_message(&payload));
            }

            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
                warn!("worker completion callback panicked: {}", panic_message(&payload));
            }

            let (lock, cvar) = &*active;
            let mut count = lock.lock().expect("active counter lock");
            *count -= 1;
            if *count == 0 {
                cvar.notify_all();
            }
        });
    }

    /// Block the caller until no enqueued job is still running. Used at
    /// shutdown and by tests; the scheduler itself tracks completion via
    /// per-job callbacks rather than polling this.
    pub fn wait_idle(&self) {
        let (lock, cvar) = &*self.active;
        let mut count = lock.lock().expect("active counter lock");
        while *count > 0 {
            count = cvar.wait(count).expect("active counter wait");
        }
    }
}

fn build(size: usize) -> rayon::ThreadPool {
    rayon::ThreadPoolBuilder::new()
        .num_threads(size)
        .thread_name(|i| format!("scint-worker-{i}"))
        .build()
        .expect("building worker thread pool")
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicUsize as AU;

    #[test]
    fn enqueued_jobs_all_run() {
        let pool = Pool::new(4);
        let counter = Arc::new(AU::new(0));

        for _ in 0..50 {
            let counter = counter.clone();
            pool.enqueue(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        pool.wait_idle();
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn panicking_job_does_not_poison_the_pool() {
        let pool = Pool::new(2);
        pool.enqueue(|| panic!("boom"));
        pool.wait_idle();

        let counter = Arc::new(AU::new(0));
        let counter2 = counter.clone();
        pool.enqueue(move || {
            counter2.fetch_add(1, Ordering::SeqCst);
        });
        pool.wait_idle();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn grow_to_increases_reported_size() {
        let pool = Pool::new(2);
        pool.grow_to(8);
        assert_eq!(pool.size(), 8);

        pool.grow_to(4);
        assert_eq!(pool.size(), 8, "grow_to never shrinks");
    }

    #[test]
    fn callback_runs_after_job_and_panics_are_swallowed() {
        let pool = Pool::new(2);
        let callback_ran = Arc::new(AU::new(0));
        let callback_ran2 = callback_ran.clone();

        pool.enqueue_with_callback(|| {}, move || {
            callback_ran2.fetch_add(1, Ordering::SeqCst);
            panic!("callback boom");
        });
        pool.wait_idle();

        assert_eq!(callback_ran.load(Ordering::SeqCst), 1);
    }
}
