//! Endpoint variant that drives a locally spawned image CLI, with the
//! child's stdout/stdin exposed as the image byte streams.

use std::io::{Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Mutex;

use common::endpoint::{Endpoint, EndpointError, ImageSink, ImageSource};
use common::image::{self, Image};

pub struct LocalEndpoint {
    program: String,
    last_error: Mutex<String>,
}

impl LocalEndpoint {
    pub fn new() -> Self {
        Self::with_program("docker")
    }

    /// Use a different image CLI executable, mainly so tests can substitute
    /// a stub for `docker`.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            last_error: Mutex::new(String::new()),
        }
    }

    fn record<T>(&self, result: Result<T, EndpointError>) -> Result<T, EndpointError> {
        if let Err(error) = &result {
            *self.last_error.lock().unwrap() = error.to_string();
        }
        result
    }

    fn spawn(&self, args: &[&str], stdin: Stdio, stdout: Stdio) -> Result<Child, EndpointError> {
        tracing::debug!("spawning {} {:?}", self.program, args);
        Command::new(&self.program)
            .args(args)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                EndpointError::Connection(format!("failed to spawn {:?}: {err}", self.program))
            })
    }

    fn list_images_inner(&self) -> Result<Vec<Image>, EndpointError> {
        let output = Command::new(&self.program)
            .args(["images", "--format", "json"])
            .output()
            .map_err(|err| {
                EndpointError::Connection(format!("failed to run {:?}: {err}", self.program))
            })?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            return Err(EndpointError::Command(stderr.trim().to_string()));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        image::parse_image_listing(&stdout)
            .map_err(|err| EndpointError::Command(format!("{err:#}")))
    }
}

impl Default for LocalEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl Endpoint for LocalEndpoint {
    fn list_images(&self) -> Result<Vec<Image>, EndpointError> {
        let result = self.list_images_inner();
        self.record(result)
    }

    fn open_read_stream(&self, image: &Image) -> Result<Box<dyn ImageSource>, EndpointError> {
        let result = self
            .spawn(&["save", image.name()], Stdio::null(), Stdio::piped())
            .and_then(|child| {
                Ok(Box::new(LocalImageSource::new(child)?) as Box<dyn ImageSource>)
            });
        self.record(result)
    }

    fn open_write_stream(&self) -> Result<Box<dyn ImageSink>, EndpointError> {
        let result = self
            .spawn(&["load"], Stdio::piped(), Stdio::null())
            .and_then(|child| Ok(Box::new(LocalImageSink::new(child)?) as Box<dyn ImageSink>));
        self.record(result)
    }

    fn last_error(&self) -> String {
        self.last_error.lock().unwrap().clone()
    }
}

/// Collect the child's stderr and exit status once its streams are done.
fn reap(child: &mut Child) -> Result<(), EndpointError> {
    let mut stderr_text = String::new();
    if let Some(mut stderr) = child.stderr.take() {
        let _ = stderr.read_to_string(&mut stderr_text);
    }
    let status = child.wait()?;
    let stderr_text = stderr_text.trim();
    if !stderr_text.is_empty() {
        return Err(EndpointError::Command(stderr_text.to_string()));
    }
    if !status.success() {
        return Err(EndpointError::Command(format!(
            "image command exited with {status}"
        )));
    }
    Ok(())
}

struct LocalImageSource {
    child: Child,
    stdout: ChildStdout,
}

impl LocalImageSource {
    fn new(mut child: Child) -> Result<Self, EndpointError> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EndpointError::Connection("child stdout was not captured".to_string()))?;
        Ok(Self { child, stdout })
    }
}

impl Read for LocalImageSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stdout.read(buf)
    }
}

impl ImageSource for LocalImageSource {
    fn finish(mut self: Box<Self>) -> Result<(), EndpointError> {
        reap(&mut self.child)
    }
}

impl Drop for LocalImageSource {
    fn drop(&mut self) {
        // an abandoned stream must not leak the child process
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

struct LocalImageSink {
    child: Child,
    stdin: Option<ChildStdin>,
}

impl LocalImageSink {
    fn new(mut child: Child) -> Result<Self, EndpointError> {
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EndpointError::Connection("child stdin was not captured".to_string()))?;
        Ok(Self {
            child,
            stdin: Some(stdin),
        })
    }
}

impl std::io::Write for LocalImageSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.stdin.as_mut() {
            Some(stdin) => stdin.write(buf),
            None => Err(std::io::Error::other("stream already closed")),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.stdin.as_mut() {
            Some(stdin) => stdin.flush(),
            None => Ok(()),
        }
    }
}

impl ImageSink for LocalImageSink {
    fn finish(mut self: Box<Self>) -> Result<(), EndpointError> {
        // closing stdin tells the importer the archive is complete
        drop(self.stdin.take());
        reap(&mut self.child)
    }
}

impl Drop for LocalImageSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
