//! Endpoint variant that runs the image CLI on a remote host over SSH,
//! exposing the command channel as the image byte stream.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Mutex;

use common::endpoint::{Endpoint, EndpointError, ImageSink, ImageSource};
use common::image::{self, Image};

/// Port used when the address does not carry one.
const DEFAULT_SSH_PORT: u16 = 22;

/// Split `host[:port]` into its parts.
pub fn split_address(address: &str) -> Result<(String, u16), EndpointError> {
    match address.split_once(':') {
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|err| {
                EndpointError::Connection(format!("invalid port in address {address:?}: {err}"))
            })?;
            Ok((host.to_string(), port))
        }
        None => Ok((address.to_string(), DEFAULT_SSH_PORT)),
    }
}

fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "'\\''"))
}

pub struct RemoteShellEndpoint {
    host: String,
    port: u16,
    username: String,
    password: String,
    last_error: Mutex<String>,
}

impl RemoteShellEndpoint {
    pub fn new(address: &str, username: &str, password: &str) -> Result<Self, EndpointError> {
        let (host, port) = split_address(address)?;
        Ok(Self {
            host,
            port,
            username: username.to_string(),
            password: password.to_string(),
            last_error: Mutex::new(String::new()),
        })
    }

    fn record<T>(&self, result: Result<T, EndpointError>) -> Result<T, EndpointError> {
        if let Err(error) = &result {
            *self.last_error.lock().unwrap() = error.to_string();
        }
        result
    }

    /// Each operation gets its own session; there is no connection pooling.
    fn connect(&self) -> Result<ssh2::Session, EndpointError> {
        tracing::debug!("connecting to {}:{}", self.host, self.port);
        let stream = TcpStream::connect((self.host.as_str(), self.port)).map_err(|err| {
            EndpointError::Connection(format!(
                "failed to reach {}:{}: {err}",
                self.host, self.port
            ))
        })?;
        let mut session = ssh2::Session::new()
            .map_err(|err| EndpointError::Connection(err.to_string()))?;
        session.set_tcp_stream(stream);
        session.handshake().map_err(|err| {
            EndpointError::Connection(format!("ssh handshake with {} failed: {err}", self.host))
        })?;
        session
            .userauth_password(&self.username, &self.password)
            .map_err(|err| {
                EndpointError::Connection(format!(
                    "authentication for {}@{} failed: {err}",
                    self.username, self.host
                ))
            })?;
        Ok(session)
    }

    fn exec(&self, command: &str) -> Result<(ssh2::Session, ssh2::Channel), EndpointError> {
        let session = self.connect()?;
        let mut channel = session
            .channel_session()
            .map_err(|err| EndpointError::Connection(err.to_string()))?;
        channel.exec(command).map_err(|err| {
            EndpointError::Command(format!("failed to run {command:?}: {err}"))
        })?;
        Ok((session, channel))
    }

    fn list_images_inner(&self) -> Result<Vec<Image>, EndpointError> {
        let (session, mut channel) = self.exec("docker images --format json")?;
        let mut stdout = String::new();
        channel.read_to_string(&mut stdout)?;
        let mut stderr_text = String::new();
        channel.stderr().read_to_string(&mut stderr_text)?;
        let _ = channel.wait_close();
        drop(session);
        let stderr_text = stderr_text.trim();
        if !stderr_text.is_empty() {
            return Err(EndpointError::Command(stderr_text.to_string()));
        }
        image::parse_image_listing(&stdout)
            .map_err(|err| EndpointError::Command(format!("{err:#}")))
    }
}

impl Endpoint for RemoteShellEndpoint {
    fn list_images(&self) -> Result<Vec<Image>, EndpointError> {
        let result = self.list_images_inner();
        self.record(result)
    }

    fn open_read_stream(&self, image: &Image) -> Result<Box<dyn ImageSource>, EndpointError> {
        let command = format!("docker save {}", shell_quote(image.name()));
        let result = self
            .exec(&command)
            .map(|(session, channel)| {
                Box::new(RemoteImageSource {
                    _session: session,
                    channel,
                }) as Box<dyn ImageSource>
            });
        self.record(result)
    }

    fn open_write_stream(&self) -> Result<Box<dyn ImageSink>, EndpointError> {
        let result = self.exec("docker load").map(|(session, channel)| {
            Box::new(RemoteImageSink {
                _session: session,
                channel,
            }) as Box<dyn ImageSink>
        });
        self.record(result)
    }

    fn last_error(&self) -> String {
        self.last_error.lock().unwrap().clone()
    }
}

/// Read the channel's stderr and close it; non-empty stderr wins over the
/// exit code, which SSH does not always deliver.
fn close_channel(channel: &mut ssh2::Channel) -> Result<(), EndpointError> {
    let mut stderr_text = String::new();
    let _ = channel.stderr().read_to_string(&mut stderr_text);
    let _ = channel.wait_close();
    let stderr_text = stderr_text.trim();
    if !stderr_text.is_empty() {
        return Err(EndpointError::Command(stderr_text.to_string()));
    }
    Ok(())
}

struct RemoteImageSource {
    _session: ssh2::Session,
    channel: ssh2::Channel,
}

impl Read for RemoteImageSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.channel.read(buf)
    }
}

impl ImageSource for RemoteImageSource {
    fn finish(mut self: Box<Self>) -> Result<(), EndpointError> {
        close_channel(&mut self.channel)
    }
}

impl Drop for RemoteImageSource {
    fn drop(&mut self) {
        let _ = self.channel.close();
    }
}

struct RemoteImageSink {
    _session: ssh2::Session,
    channel: ssh2::Channel,
}

impl std::io::Write for RemoteImageSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.channel.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.channel.flush()
    }
}

impl ImageSink for RemoteImageSink {
    fn finish(mut self: Box<Self>) -> Result<(), EndpointError> {
        // EOF starts the import on the remote side
        self.channel.send_eof().map_err(|err| {
            EndpointError::Command(format!("failed to close import stream: {err}"))
        })?;
        // drain whatever the importer printed so the channel can close
        let mut stdout = String::new();
        let _ = self.channel.read_to_string(&mut stdout);
        close_channel(&mut self.channel)
    }
}

impl Drop for RemoteImageSink {
    fn drop(&mut self) {
        let _ = self.channel.close();
    }
}
