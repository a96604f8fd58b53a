//! Sequential executor for a submitted batch of jobs.

use std::sync::Arc;

use anyhow::Context;

use crate::events::{EventSink, TaskView};
use crate::job::Job;

/// Runs a batch of jobs in submitted order on one dedicated blocking worker.
///
/// Exactly one job is running at any instant; lifecycle, progress and log
/// events are delivered through the channel paired with the sink given to
/// [`JobRunner::submit`]. The channel closes after the final task-list
/// notification, which is the batch-done signal.
pub struct JobRunner {
    jobs: Arc<Vec<Arc<Job>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl JobRunner {
    /// Start the batch and return without blocking. The job list is fixed
    /// from this point on; there is no way to append to an in-flight batch.
    pub fn submit(jobs: Vec<Arc<Job>>, events: EventSink) -> Self {
        let jobs = Arc::new(jobs);
        let handle = tokio::task::spawn_blocking({
            let jobs = Arc::clone(&jobs);
            move || run_batch(&jobs, &events)
        });
        Self { jobs, handle }
    }

    /// Request cancellation of the whole batch. The running job observes the
    /// flag at its next chunk boundary; jobs still waiting are marked
    /// cancelled instead of being started.
    pub fn kill_all(&self) {
        for job in self.jobs.iter() {
            job.cancel();
        }
    }

    pub fn jobs(&self) -> &[Arc<Job>] {
        &self.jobs
    }

    /// Wait for the worker to drain the batch.
    pub async fn wait(self) -> anyhow::Result<()> {
        self.handle.await.context("job runner worker panicked")?;
        Ok(())
    }
}

fn task_views(jobs: &[Arc<Job>]) -> Vec<TaskView> {
    jobs.iter().map(|job| job.view()).collect()
}

#[tracing::instrument(skip_all, fields(jobs = jobs.len()))]
fn run_batch(jobs: &[Arc<Job>], events: &EventSink) {
    for job in jobs {
        if job.cancel_requested() && job.mark_cancelled_if_waiting() {
            tracing::info!("skipping cancelled job {:?}", job.name());
            events.log(format!("========= skipped {} (cancelled) =========", job.name()));
            events.task_list_changed(task_views(jobs));
            continue;
        }
        if !job.begin(events) {
            continue;
        }
        // the snapshot goes out with the job already marked running
        events.task_list_changed(task_views(jobs));
        events.log(format!("========= start run {} =========", job.name()));
        job.complete(events);
        events.log(format!("========= end run {} =========\n", job.name()));
    }
    events.task_list_changed(task_views(jobs));
}
