//! Progress and log notifications flowing from the job runner's worker to
//! whoever is watching the batch.

use crate::job::JobState;

/// Snapshot of one job for task-list rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskView {
    pub name: String,
    pub state: JobState,
}

/// Notifications emitted while a batch runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// Progress ceiling for the job that is about to stream.
    ProgressMax(u64),
    /// Running byte counter of the active job.
    ProgressValue(u64),
    /// A line for the accumulating text log.
    Log(String),
    /// A job changed state (or the batch started/ended).
    TaskListChanged(Vec<TaskView>),
}

/// Sending half of the progress/log channel.
///
/// Sends never block and are safe from the worker thread; events for a
/// receiver that stopped listening are silently dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: tokio::sync::mpsc::UnboundedSender<TaskEvent>,
}

impl EventSink {
    /// Create a sink together with the receiving half the caller drains.
    pub fn channel() -> (Self, tokio::sync::mpsc::UnboundedReceiver<TaskEvent>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn progress_max(&self, value: u64) {
        self.send(TaskEvent::ProgressMax(value));
    }

    pub fn progress_value(&self, value: u64) {
        self.send(TaskEvent::ProgressValue(value));
    }

    pub fn log(&self, line: impl Into<String>) {
        self.send(TaskEvent::Log(line.into()));
    }

    pub fn task_list_changed(&self, views: Vec<TaskView>) {
        self.send(TaskEvent::TaskListChanged(views));
    }

    fn send(&self, event: TaskEvent) {
        let _ = self.tx.send(event);
    }
}
