//! One cancellable unit of work: a streaming copy between an endpoint or the
//! local filesystem and its destination.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Context;

use crate::endpoint::Endpoint;
use crate::events::{EventSink, TaskView};
use crate::image::Image;

/// Bytes moved per copy-loop iteration; also the granularity at which the
/// cancellation flag is observed.
pub const CHUNK_SIZE: usize = 1024;

/// Lifecycle of a job. Terminal states are absorbing and nothing ever
/// re-enters `Waiting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Waiting,
    Running,
    Finished,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Finished | JobState::Failed | JobState::Cancelled
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let label = match self {
            JobState::Waiting => "waiting",
            JobState::Running => "running",
            JobState::Finished => "done",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        write!(f, "{label}")
    }
}

/// How a run that did not error ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Cancelled,
}

/// What a job does when run.
pub enum JobKind {
    /// Export an image from its endpoint into a local archive file.
    Save {
        endpoint: Arc<dyn Endpoint>,
        image: Image,
        output_dir: std::path::PathBuf,
    },
    /// Import a local archive file into the target endpoint.
    Load {
        path: std::path::PathBuf,
        endpoint: Arc<dyn Endpoint>,
    },
    /// Stream an image from one endpoint straight into another.
    Sync {
        source: Arc<dyn Endpoint>,
        image: Image,
        target: Arc<dyn Endpoint>,
    },
}

pub struct Job {
    name: String,
    kind: JobKind,
    state: Mutex<JobState>,
    progress_max: AtomicU64,
    cancel: tokio_util::sync::CancellationToken,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("state", &self.state.lock().unwrap())
            .finish()
    }
}

impl Job {
    pub fn save(endpoint: Arc<dyn Endpoint>, image: Image, output_dir: std::path::PathBuf) -> Self {
        Self::new(
            format!("save {}", image.name()),
            JobKind::Save {
                endpoint,
                image,
                output_dir,
            },
        )
    }

    pub fn load(path: std::path::PathBuf, endpoint: Arc<dyn Endpoint>) -> Self {
        Self::new(format!("load {}", path.display()), JobKind::Load { path, endpoint })
    }

    pub fn sync(
        source: Arc<dyn Endpoint>,
        image: Image,
        target: Arc<dyn Endpoint>,
        target_name: &str,
    ) -> Self {
        Self::new(
            format!("sync {} to {}", image.name(), target_name),
            JobKind::Sync {
                source,
                image,
                target,
            },
        )
    }

    fn new(name: String, kind: JobKind) -> Self {
        Self {
            name,
            kind,
            state: Mutex::new(JobState::Waiting),
            progress_max: AtomicU64::new(0),
            cancel: tokio_util::sync::CancellationToken::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> JobState {
        *self.state.lock().unwrap()
    }

    pub fn view(&self) -> TaskView {
        TaskView {
            name: self.name.clone(),
            state: self.state(),
        }
    }

    pub fn progress_max(&self) -> u64 {
        self.progress_max.load(Ordering::Relaxed)
    }

    /// Request cooperative cancellation; a running copy loop observes the
    /// flag at its next chunk boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    #[cfg(test)]
    pub(crate) fn cancel_token(&self) -> tokio_util::sync::CancellationToken {
        self.cancel.clone()
    }

    /// Mark a job that never started as cancelled. Returns false if the job
    /// already left `Waiting`.
    pub(crate) fn mark_cancelled_if_waiting(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state == JobState::Waiting {
            *state = JobState::Cancelled;
            true
        } else {
            false
        }
    }

    fn set_state(&self, to: JobState) {
        *self.state.lock().unwrap() = to;
    }

    /// Drive the job through its state machine, reporting to `events`.
    ///
    /// Errors are absorbed here: a failure marks the job `Failed` and logs
    /// the message, so one job can never abort the rest of the batch.
    pub fn start(&self, events: &EventSink) {
        if self.begin(events) {
            self.complete(events);
        }
    }

    /// Move the job into `Running`. A job that already left `Waiting` stays
    /// untouched; the attempt is reported and `false` comes back.
    pub(crate) fn begin(&self, events: &EventSink) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state != JobState::Waiting {
            tracing::warn!("job already started, state: {}", *state);
            events.log(format!("{} already started ({})", self.name, *state));
            return false;
        }
        *state = JobState::Running;
        true
    }

    /// Run the copy and move the job to its terminal state. Must follow a
    /// successful [`Job::begin`].
    #[tracing::instrument(skip_all, fields(job = %self.name))]
    pub(crate) fn complete(&self, events: &EventSink) {
        match self.run(events) {
            Ok((Outcome::Completed, copied)) => {
                self.set_state(JobState::Finished);
                let max = self.progress_max();
                if copied < max {
                    // hosts may over-report declared sizes; completion always reads 100%
                    events.progress_value(max);
                }
            }
            Ok((Outcome::Cancelled, _)) => {
                self.set_state(JobState::Cancelled);
                events.log(format!("{} cancelled", self.name));
            }
            Err(error) => {
                self.set_state(JobState::Failed);
                tracing::error!("job failed: {:#}", &error);
                events.log(format!("{error:#}"));
            }
        }
    }

    fn run(&self, events: &EventSink) -> anyhow::Result<(Outcome, u64)> {
        match &self.kind {
            JobKind::Save {
                endpoint,
                image,
                output_dir,
            } => self.run_save(endpoint.as_ref(), image, output_dir, events),
            JobKind::Load { path, endpoint } => self.run_load(path, endpoint.as_ref(), events),
            JobKind::Sync {
                source,
                image,
                target,
            } => self.run_sync(source.as_ref(), image, target.as_ref(), events),
        }
    }

    fn run_save(
        &self,
        endpoint: &dyn Endpoint,
        image: &Image,
        output_dir: &std::path::Path,
        events: &EventSink,
    ) -> anyhow::Result<(Outcome, u64)> {
        let max = self.set_progress_max(image.size_bytes(), events);
        let path = output_dir.join(image.archive_file_name());
        events.log(format!("saving image {}", image.name()));
        events.log(format!("image size: {}", image.size_display()));
        events.log(format!("archive file: {}", path.display()));
        let mut source = endpoint.open_read_stream(image)?;
        let mut file = std::fs::File::create(&path)
            .with_context(|| format!("failed creating {:?}", &path))?;
        match copy_chunks(source.as_mut(), &mut file, max, &self.cancel, events) {
            Ok((Outcome::Completed, copied)) => {
                source.finish()?;
                events.log(format!(
                    "save finished, file size: {}",
                    bytesize::ByteSize(copied)
                ));
                Ok((Outcome::Completed, copied))
            }
            Ok((Outcome::Cancelled, copied)) => {
                // the producer was interrupted mid-stream, release only
                drop(source);
                Ok((Outcome::Cancelled, copied))
            }
            Err(error) => {
                drop(source);
                Err(error)
            }
        }
    }

    fn run_load(
        &self,
        path: &std::path::Path,
        endpoint: &dyn Endpoint,
        events: &EventSink,
    ) -> anyhow::Result<(Outcome, u64)> {
        let len = std::fs::metadata(path)
            .with_context(|| format!("failed reading metadata from {:?}", &path))?
            .len();
        let max = self.set_progress_max(len, events);
        events.log(format!("loading archive {}", path.display()));
        events.log(format!("file size: {}", bytesize::ByteSize(len)));
        let mut file = std::fs::File::open(path)
            .with_context(|| format!("failed opening {:?}", &path))?;
        let mut sink = endpoint.open_write_stream()?;
        match copy_chunks(&mut file, sink.as_mut(), max, &self.cancel, events) {
            Ok((Outcome::Completed, copied)) => {
                sink.finish()?;
                events.log("load finished".to_string());
                Ok((Outcome::Completed, copied))
            }
            Ok((Outcome::Cancelled, copied)) => {
                drop(sink);
                Ok((Outcome::Cancelled, copied))
            }
            Err(error) => {
                drop(sink);
                Err(error)
            }
        }
    }

    fn run_sync(
        &self,
        source_endpoint: &dyn Endpoint,
        image: &Image,
        target_endpoint: &dyn Endpoint,
        events: &EventSink,
    ) -> anyhow::Result<(Outcome, u64)> {
        let max = self.set_progress_max(image.size_bytes(), events);
        events.log(format!("syncing image {}", image.name()));
        events.log(format!("image size: {}", image.size_display()));
        let mut source = source_endpoint.open_read_stream(image)?;
        let mut sink = match target_endpoint.open_write_stream() {
            Ok(sink) => sink,
            Err(error) => {
                drop(source);
                return Err(error.into());
            }
        };
        match copy_chunks(source.as_mut(), sink.as_mut(), max, &self.cancel, events) {
            Ok((Outcome::Completed, copied)) => {
                source.finish()?;
                sink.finish()?;
                events.log(format!(
                    "sync finished, transferred: {}",
                    bytesize::ByteSize(copied)
                ));
                Ok((Outcome::Completed, copied))
            }
            Ok((Outcome::Cancelled, copied)) => {
                drop(source);
                drop(sink);
                Ok((Outcome::Cancelled, copied))
            }
            Err(error) => {
                drop(source);
                drop(sink);
                Err(error)
            }
        }
    }

    fn set_progress_max(&self, value: u64, events: &EventSink) -> u64 {
        self.progress_max.store(value, Ordering::Relaxed);
        events.progress_max(value);
        value
    }
}

/// Stream `src` into `dst` in fixed-size chunks, reporting the running byte
/// count after every chunk. The cancellation token is checked before each
/// read; a blocking read in flight completes before the flag is observed.
fn copy_chunks(
    src: &mut dyn Read,
    dst: &mut dyn Write,
    max: u64,
    cancel: &tokio_util::sync::CancellationToken,
    events: &EventSink,
) -> anyhow::Result<(Outcome, u64)> {
    let mut buffer = [0u8; CHUNK_SIZE];
    let mut copied: u64 = 0;
    loop {
        if cancel.is_cancelled() {
            return Ok((Outcome::Cancelled, copied));
        }
        let read = src
            .read(&mut buffer)
            .context("failed reading from source stream")?;
        if read == 0 {
            break;
        }
        dst.write_all(&buffer[..read])
            .context("failed writing to destination stream")?;
        copied += read as u64;
        events.progress_value(copied.min(max));
    }
    Ok((Outcome::Completed, copied))
}
