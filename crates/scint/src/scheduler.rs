// SPDX-License-Identifier: MIT OR Apache-2.0

//! DAG scheduler (§4.7, component C7): a priority queue of jobs gated
//! by per-type concurrency caps and unmet dependencies, dispatching onto the
//! worker [`Pool`](crate::pool::Pool). A completed job may enqueue follow-up
//! jobs of its own (e.g. a `Resolve` discovering new `Build` work); those
//! are submitted from the completion callback, after the dispatch lock has
//! already been released, so a follow-up's own submission never reenters
//! the scheduler while it is mid-dispatch.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Condvar, Mutex};

use log::{debug, warn};

use crate::pool::Pool;
use crate::types::{JobState, JobType};

pub type JobId = usize;
pub type JobResult = Result<Vec<NewJob>, String>;
type WorkFn = Box<dyn FnOnce() -> JobResult + Send>;

/// A job queued for submission, either at initial plan time or as a
/// follow-up continuation from a completed job.
pub struct NewJob {
    pub job_type: JobType,
    pub depends_on: Vec<JobId>,
    pub work: WorkFn,
}

impl NewJob {
    pub fn new(job_type: JobType, depends_on: Vec<JobId>, work: impl FnOnce() -> JobResult + Send + 'static) -> Self {
        Self { job_type, depends_on, work: Box::new(work) }
    }
}

struct JobRecord {
    job_type: JobType,
    state: JobState,
    work: Option<WorkFn>,
}

struct State {
    jobs: HashMap<JobId, JobRecord>,
    dependents: HashMap<JobId, Vec<JobId>>,
    queue: BinaryHeap<Reverse<(u8, JobId)>>,
    running_by_type: HashMap<JobType, usize>,
    next_id: JobId,
    pending: usize,
    failures: Vec<(JobId, String)>,
    aborted: bool,
}

impl State {
    fn new() -> Self {
        Self {
            jobs: HashMap::new(),
            dependents: HashMap::new(),
            queue: BinaryHeap::new(),
            running_by_type: HashMap::new(),
            next_id: 0,
            pending: 0,
            failures: Vec::new(),
            aborted: false,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
    pub failures: Vec<(JobId, String)>,
}

/// Live snapshot of queue occupancy (§4.7.4's `stats` observer).
#[derive(Debug, Default, Clone)]
pub struct SchedulerStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Priority-queue, dependency-gated, concurrency-capped job scheduler.
pub struct Scheduler {
    pool: Arc<Pool>,
    caps: HashMap<JobType, usize>,
    fail_fast: bool,
    state: Mutex<State>,
    idle: Condvar,
}

impl Scheduler {
    /// `caps` bounds how many jobs of each [`JobType`] may run concurrently
    /// (§4.7.2); a type absent from the map is unbounded (limited only
    /// by the pool's own thread count). When `fail_fast` is set, the first
    /// job failure aborts the scheduler: the pending queue is dropped,
    /// further `submit`/`submit_job` calls return `None`, but jobs already
    /// running are allowed to finish (§4.7.3, §7).
    pub fn new(pool: Arc<Pool>, caps: HashMap<JobType, usize>, fail_fast: bool) -> Arc<Self> {
        Arc::new(Self {
            pool,
            caps,
            fail_fast,
            state: Mutex::new(State::new()),
            idle: Condvar::new(),
        })
    }

    /// Submit a root job with no dependencies of its own. Returns `None`
    /// if the scheduler has already aborted via `fail_fast`.
    pub fn submit(self: &Arc<Self>, job_type: JobType, work: impl FnOnce() -> JobResult + Send + 'static) -> Option<JobId> {
        self.submit_job(NewJob::new(job_type, Vec::new(), work))
    }

    /// Submit a job that may not dispatch until every id in `depends_on` is
    /// `Completed` (§4.7.1's DAG dependency edges). Returns `None` if the
    /// scheduler has already aborted via `fail_fast`.
    pub fn submit_job(self: &Arc<Self>, job: NewJob) -> Option<JobId> {
        let mut state = self.state.lock().expect("scheduler state lock");
        if state.aborted {
            return None;
        }
        let id = self.insert(&mut state, job);
        drop(state);
        self.try_dispatch();
        Some(id)
    }

    fn insert(&self, state: &mut State, job: NewJob) -> JobId {
        let id = state.next_id;
        state.next_id += 1;
        state.pending += 1;

        let mut any_dep_failed = false;
        let mut all_deps_done = true;
        for dep in &job.depends_on {
            match state.jobs.get(dep).map(|r| r.state) {
                Some(JobState::Completed) => {}
                Some(JobState::Failed) => any_dep_failed = true,
                _ => all_deps_done = false,
            }
        }

        state.jobs.insert(
            id,
            JobRecord {
                job_type: job.job_type,
                state: JobState::Pending,
                work: Some(job.work),
            },
        );

        if any_dep_failed {
            self.cancel(state, id, "upstream dependency failed");
            return id;
        }

        for dep in &job.depends_on {
            state.dependents.entry(*dep).or_default().push(id);
        }

        if all_deps_done {
            state.queue.push(Reverse((job.job_type.priority(), id)));
        }

        id
    }

    /// Mark `id` (and transitively, every job depending on it) as failed
    /// without ever dispatching it — the fail-fast cancellation path (§4.7.3).
    fn cancel(&self, state: &mut State, id: JobId, reason: &str) {
        if let Some(record) = state.jobs.get_mut(&id) {
            if record.state.is_terminal() {
                return;
            }
            record.state = JobState::Failed;
            record.work = None;
        }
        state.pending -= 1;
        state.failures.push((id, reason.to_string()));

        let dependents = state.dependents.remove(&id).unwrap_or_default();
        for dependent in dependents {
            self.cancel(state, dependent, "upstream dependency failed");
        }
    }

    /// Drain as much of the ready queue as current concurrency caps permit.
    /// Jobs whose type is at capacity are requeued untouched.
    fn try_dispatch(self: &Arc<Self>) {
        let mut state = self.state.lock().expect("scheduler state lock");
        loop {
            let mut deferred = Vec::new();
            let mut dispatched = false;

            while let Some(Reverse((priority, id))) = state.queue.pop() {
                let job_type = state.jobs[&id].job_type;
                let cap = self.caps.get(&job_type).copied().unwrap_or(usize::MAX);
                let running = state.running_by_type.entry(job_type).or_insert(0);

                if *running < cap {
                    *running += 1;
                    let work = state.jobs.get_mut(&id).expect("job record exists").work.take().expect("job not yet dispatched");
                    state.jobs.get_mut(&id).expect("job record exists").state = JobState::Running;
                    dispatched = true;
                    self.spawn(id, job_type, work);
                } else {
                    deferred.push(Reverse((priority, id)));
                }
            }

            for entry in deferred {
                state.queue.push(entry);
            }

            if !dispatched {
                break;
            }
        }
    }

    fn spawn(self: &Arc<Self>, id: JobId, job_type: JobType, work: WorkFn) {
        let scheduler = Arc::clone(self);
        debug!("dispatching job {id} ({job_type})");
        self.pool.enqueue(move || {
            let result = work();
            scheduler.complete(id, job_type, result);
        });
    }

    fn complete(self: &Arc<Self>, id: JobId, job_type: JobType, result: JobResult) {
        let mut state = self.state.lock().expect("scheduler state lock");
        *state.running_by_type.entry(job_type).or_insert(1) -= 1;

        match result {
            Ok(follow_ups) => {
                state.jobs.get_mut(&id).expect("job record exists").state = JobState::Completed;
                state.pending -= 1;

                let dependents = state.dependents.remove(&id).unwrap_or_default();
                for dependent in dependents {
                    self.promote_if_ready(&mut state, dependent);
                }

                drop(state);

                for follow_up in follow_ups {
                    let mut state = self.state.lock().expect("scheduler state lock");
                    if state.aborted {
                        break;
                    }
                    self.insert(&mut state, follow_up);
                }
            }
            Err(reason) => {
                warn!("job {id} ({job_type}) failed: {reason}");
                // `cancel` is idempotent (it checks `is_terminal` before
                // touching `pending`), so one call both marks this job
                // failed and transitively fails every dependent still
                // waiting on it.
                self.cancel(&mut state, id, &reason);
                if self.fail_fast {
                    self.abort_pending(&mut state);
                }
                drop(state);
            }
        }

        self.try_dispatch();

        let state = self.state.lock().expect("scheduler state lock");
        if state.pending == 0 {
            self.idle.notify_all();
        }
    }

    /// `fail_fast` cancellation (§4.7.3, §7): mark the scheduler aborted,
    /// drop every still-pending job (whether queued and ready, or merely
    /// waiting on dependencies), and refuse further enqueues. Jobs already
    /// dispatched to the pool are left to finish.
    fn abort_pending(&self, state: &mut State) {
        if state.aborted {
            return;
        }
        state.aborted = true;
        state.queue.clear();
        let still_pending: Vec<JobId> = state.jobs.iter().filter(|(_, r)| r.state == JobState::Pending).map(|(id, _)| *id).collect();
        for id in still_pending {
            self.cancel(state, id, "fail_fast: scheduler aborted after an earlier failure");
        }
    }

    /// True once a `fail_fast` failure has aborted the scheduler (§4.7.4).
    pub fn aborted(&self) -> bool {
        self.state.lock().expect("scheduler state lock").aborted
    }

    /// True if any job submitted so far has failed (§4.7.4's `failed?`).
    pub fn failed(&self) -> bool {
        !self.state.lock().expect("scheduler state lock").failures.is_empty()
    }

    /// Snapshot of queue occupancy across all terminal/non-terminal states.
    pub fn stats(&self) -> SchedulerStats {
        let state = self.state.lock().expect("scheduler state lock");
        let running = state.running_by_type.values().sum();
        let completed = state.jobs.values().filter(|r| r.state == JobState::Completed).count();
        SchedulerStats {
            pending: state.pending.saturating_sub(running),
            running,
            completed,
            failed: state.failures.len(),
        }
    }

    fn promote_if_ready(&self, state: &mut State, id: JobId) {
        let Some(record) = state.jobs.get(&id) else { return };
        if record.state != JobState::Pending {
            return;
        }
        // Dependencies are only ever removed from `dependents` once terminal,
        // so a job reached via this path always has its full dependency set
        // resolved to Completed — cancellation short-circuits at `insert`/
        // `cancel` for the Failed case instead of reaching here.
        state.queue.push(Reverse((record.job_type.priority(), id)));
    }

    /// Block until every submitted job (including later follow-ups) has
    /// reached a terminal state.
    pub fn run_to_completion(self: &Arc<Self>) -> RunSummary {
        let mut state = self.state.lock().expect("scheduler state lock");
        while state.pending > 0 {
            state = self.idle.wait(state).expect("scheduler idle wait");
        }

        let failed = state.failures.len();
        let completed = state.jobs.values().filter(|r| r.state == JobState::Completed).count();
        RunSummary {
            completed,
            failed,
            failures: state.failures.clone(),
        }
    }

    pub fn state_of(&self, id: JobId) -> Option<JobState> {
        self.state.lock().expect("scheduler state lock").jobs.get(&id).map(|r| r.state)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pool(size: usize) -> Arc<Pool> {
        Arc::new(Pool::new(size))
    }

    #[test]
    fn independent_jobs_all_complete() {
        let scheduler = Scheduler::new(pool(4), HashMap::new(), false);
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let order = order.clone();
            scheduler.submit(JobType::Download, move || {
                order.lock().unwrap().push(i);
                Ok(Vec::new())
            });
        }

        let summary = scheduler.run_to_completion();
        assert_eq!(summary.completed, 10);
        assert_eq!(summary.failed, 0);
        assert_eq!(order.lock().unwrap().len(), 10);
    }

    #[test]
    fn dependent_job_does_not_run_before_its_dependency() {
        let scheduler = Scheduler::new(pool(4), HashMap::new(), false);
        let order = Arc::new(Mutex::new(Vec::new()));

        let order_a = order.clone();
        let dep = scheduler
            .submit(JobType::Extract, move || {
                order_a.lock().unwrap().push("extract");
                Ok(Vec::new())
            })
            .unwrap();

        let order_b = order.clone();
        scheduler.submit_job(NewJob::new(JobType::Link, vec![dep], move || {
            order_b.lock().unwrap().push("link");
            Ok(Vec::new())
        }));

        scheduler.run_to_completion();
        let recorded = order.lock().unwrap().clone();
        assert_eq!(recorded, vec!["extract", "link"]);
    }

    #[test]
    fn failed_dependency_cancels_dependents() {
        let scheduler = Scheduler::new(pool(4), HashMap::new(), false);
        let ran = Arc::new(AtomicUsize::new(0));

        let dep = scheduler.submit(JobType::Build, || Err("build failed".to_string())).unwrap();

        let ran2 = ran.clone();
        let dependent = scheduler
            .submit_job(NewJob::new(JobType::Link, vec![dep], move || {
                ran2.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            }))
            .unwrap();

        let summary = scheduler.run_to_completion();
        assert_eq!(ran.load(Ordering::SeqCst), 0, "dependent must never run");
        assert_eq!(scheduler.state_of(dependent), Some(JobState::Failed));
        assert!(summary.failed >= 2);
    }

    #[test]
    fn concurrency_cap_limits_simultaneous_jobs_of_one_type() {
        let scheduler = Scheduler::new(pool(8), HashMap::from([(JobType::Download, 1)]), false);
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let concurrent = concurrent.clone();
            let max_seen = max_seen.clone();
            scheduler.submit(JobType::Download, move || {
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(1));
                concurrent.fetch_sub(1, Ordering::SeqCst);
                Ok(Vec::new())
            });
        }

        scheduler.run_to_completion();
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn follow_up_jobs_are_scheduled_and_awaited() {
        let scheduler = Scheduler::new(pool(4), HashMap::new(), false);
        let follow_up_ran = Arc::new(AtomicUsize::new(0));
        let follow_up_ran2 = follow_up_ran.clone();

        scheduler.submit(JobType::Resolve, move || {
            let follow_up_ran = follow_up_ran2.clone();
            Ok(vec![NewJob::new(JobType::Build, Vec::new(), move || {
                follow_up_ran.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            })])
        });

        let summary = scheduler.run_to_completion();
        assert_eq!(follow_up_ran.load(Ordering::SeqCst), 1);
        assert_eq!(summary.completed, 2);
    }

    #[test]
    fn fail_fast_drops_pending_work_and_refuses_new_enqueues() {
        let scheduler = Scheduler::new(pool(1), HashMap::from([(JobType::Download, 1)]), true);
        let ran = Arc::new(AtomicUsize::new(0));

        scheduler.submit(JobType::Download, || Err("boom".to_string()));

        for _ in 0..5 {
            let ran = ran.clone();
            scheduler.submit(JobType::Download, move || {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            });
        }

        let summary = scheduler.run_to_completion();
        assert!(scheduler.aborted());
        assert!(scheduler.failed());
        assert_eq!(ran.load(Ordering::SeqCst), 0, "queued jobs must be dropped once aborted");
        assert!(summary.failed >= 1);

        assert!(
            scheduler.submit(JobType::Download, || Ok(Vec::new())).is_none(),
            "submit after abort must refuse the job"
        );
    }

    #[test]
    fn stats_reports_live_queue_occupancy() {
        let scheduler = Scheduler::new(pool(2), HashMap::new(), false);
        scheduler.submit(JobType::Download, || Ok(Vec::new()));
        scheduler.submit(JobType::Download, || Err("nope".to_string()));

        scheduler.run_to_completion();
        let stats = scheduler.stats();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.running, 0);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
    }
}
