use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::endpoint::{Endpoint, EndpointError, ImageSink, ImageSource};
use crate::events::TaskEvent;
use crate::image::Image;

/// In-memory endpoint for exercising jobs and the runner without processes
/// or network. Read streams serve a fixed payload, write streams capture
/// whatever is written, and both track their release.
#[derive(Default)]
pub(crate) struct FakeEndpoint {
    images: Vec<Image>,
    payload: Vec<u8>,
    captured: Arc<Mutex<Vec<u8>>>,
    source_released: Arc<AtomicBool>,
    sink_released: Arc<AtomicBool>,
    sink_finished: Arc<AtomicBool>,
    fail_source_after: Mutex<Option<u64>>,
    fail_sink_writes: AtomicBool,
    cancel_after_first_chunk: Mutex<Option<tokio_util::sync::CancellationToken>>,
    block_until_cancelled: Mutex<Option<tokio_util::sync::CancellationToken>>,
    first_chunk_signal: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
}

impl FakeEndpoint {
    pub(crate) fn with_payload(payload: Vec<u8>) -> Self {
        Self {
            payload,
            ..Default::default()
        }
    }

    pub(crate) fn captured(&self) -> Vec<u8> {
        self.captured.lock().unwrap().clone()
    }

    pub(crate) fn source_released(&self) -> bool {
        self.source_released.load(Ordering::SeqCst)
    }

    pub(crate) fn sink_released(&self) -> bool {
        self.sink_released.load(Ordering::SeqCst)
    }

    pub(crate) fn sink_finished(&self) -> bool {
        self.sink_finished.load(Ordering::SeqCst)
    }

    /// Error the read stream once this many bytes were served.
    pub(crate) fn fail_source_after(&self, bytes: u64) {
        *self.fail_source_after.lock().unwrap() = Some(bytes);
    }

    pub(crate) fn fail_sink_writes(&self) {
        self.fail_sink_writes.store(true, Ordering::SeqCst);
    }

    /// Trip the given token right after the first chunk is served.
    pub(crate) fn cancel_after_first_chunk(&self, token: tokio_util::sync::CancellationToken) {
        *self.cancel_after_first_chunk.lock().unwrap() = Some(token);
    }

    /// After the first chunk, block further reads until the token is
    /// cancelled. Lets tests hold a copy in flight deterministically.
    pub(crate) fn block_until_cancelled(&self, token: tokio_util::sync::CancellationToken) {
        *self.block_until_cancelled.lock().unwrap() = Some(token);
    }

    /// Fire the sender once the first chunk was served.
    pub(crate) fn first_chunk_signal(&self, tx: tokio::sync::oneshot::Sender<()>) {
        *self.first_chunk_signal.lock().unwrap() = Some(tx);
    }
}

impl Endpoint for FakeEndpoint {
    fn list_images(&self) -> Result<Vec<Image>, EndpointError> {
        Ok(self.images.clone())
    }

    fn open_read_stream(&self, _image: &Image) -> Result<Box<dyn ImageSource>, EndpointError> {
        self.source_released.store(false, Ordering::SeqCst);
        Ok(Box::new(FakeSource {
            data: std::io::Cursor::new(self.payload.clone()),
            released: Arc::clone(&self.source_released),
            fail_after: *self.fail_source_after.lock().unwrap(),
            cancel_after_first_chunk: self.cancel_after_first_chunk.lock().unwrap().clone(),
            block_until_cancelled: self.block_until_cancelled.lock().unwrap().clone(),
            first_chunk_signal: self.first_chunk_signal.lock().unwrap().take(),
            chunks_served: 0,
        }))
    }

    fn open_write_stream(&self) -> Result<Box<dyn ImageSink>, EndpointError> {
        self.sink_released.store(false, Ordering::SeqCst);
        Ok(Box::new(FakeSink {
            captured: Arc::clone(&self.captured),
            released: Arc::clone(&self.sink_released),
            finished: Arc::clone(&self.sink_finished),
            fail_writes: self.fail_sink_writes.load(Ordering::SeqCst),
        }))
    }

    fn last_error(&self) -> String {
        String::new()
    }
}

pub(crate) struct FakeSource {
    data: std::io::Cursor<Vec<u8>>,
    released: Arc<AtomicBool>,
    fail_after: Option<u64>,
    cancel_after_first_chunk: Option<tokio_util::sync::CancellationToken>,
    block_until_cancelled: Option<tokio_util::sync::CancellationToken>,
    first_chunk_signal: Option<tokio::sync::oneshot::Sender<()>>,
    chunks_served: usize,
}

impl Read for FakeSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if let Some(fail_at) = self.fail_after {
            if self.data.position() >= fail_at {
                return Err(std::io::Error::other("source stream broke"));
            }
        }
        if self.chunks_served >= 1 {
            if let Some(token) = &self.block_until_cancelled {
                while !token.is_cancelled() {
                    std::thread::sleep(std::time::Duration::from_millis(2));
                }
            }
        }
        let read = self.data.read(buf)?;
        if read > 0 {
            self.chunks_served += 1;
            if self.chunks_served == 1 {
                if let Some(token) = &self.cancel_after_first_chunk {
                    token.cancel();
                }
                if let Some(tx) = self.first_chunk_signal.take() {
                    let _ = tx.send(());
                }
            }
        }
        Ok(read)
    }
}

impl ImageSource for FakeSource {
    fn finish(self: Box<Self>) -> Result<(), EndpointError> {
        Ok(())
    }
}

impl Drop for FakeSource {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

pub(crate) struct FakeSink {
    captured: Arc<Mutex<Vec<u8>>>,
    released: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    fail_writes: bool,
}

impl std::io::Write for FakeSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.fail_writes {
            return Err(std::io::Error::other("sink stream broke"));
        }
        self.captured.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl ImageSink for FakeSink {
    fn finish(self: Box<Self>) -> Result<(), EndpointError> {
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for FakeSink {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Pull every event already sitting in the channel without waiting.
pub(crate) fn drain_ready_events(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<TaskEvent>,
) -> Vec<TaskEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Collect events until the sending side closes.
pub(crate) async fn collect_events(
    mut rx: tokio::sync::mpsc::UnboundedReceiver<TaskEvent>,
) -> Vec<TaskEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}
