//! The capability contract giving list/read/write access to a single host's
//! image store, plus the error taxonomy shared by all endpoint variants.

use crate::image::Image;

/// Errors surfaced by endpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// Host unreachable or authentication failed.
    #[error("connection failed: {0}")]
    Connection(String),
    /// The image command itself reported an error (non-empty error channel).
    #[error("command failed: {0}")]
    Command(String),
    /// No endpoint variant matches the host's declared kind.
    #[error("unsupported host kind {0:?}")]
    UnsupportedHostKind(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Live byte producer for an image export.
///
/// Dropping the source releases the underlying process or channel; `finish`
/// additionally surfaces any error-channel content the producer emitted.
pub trait ImageSource: std::io::Read + Send {
    fn finish(self: Box<Self>) -> Result<(), EndpointError>;
}

/// Live byte consumer for an image import.
///
/// Once fully written, `finish` closes the stream which makes the destination
/// host import the bytes that were sent; dropping without `finish` releases
/// the resources but abandons the import.
pub trait ImageSink: std::io::Write + Send {
    fn finish(self: Box<Self>) -> Result<(), EndpointError>;
}

/// List/read/write access to one host's image store.
///
/// Implementations are stateless apart from connection parameters and must
/// never buffer a whole image in memory; both streams operate in bounded
/// chunks.
pub trait Endpoint: Send + Sync {
    /// Query the host for its current image inventory. Ordering is not
    /// guaranteed; callers sort for display.
    fn list_images(&self) -> Result<Vec<Image>, EndpointError>;

    /// Open a live byte stream exporting the named image.
    fn open_read_stream(&self, image: &Image) -> Result<Box<dyn ImageSource>, EndpointError>;

    /// Open a live byte stream that imports whatever is written to it.
    fn open_write_stream(&self) -> Result<Box<dyn ImageSink>, EndpointError>;

    /// Diagnostic detail from the most recent failed operation (best effort,
    /// may be empty).
    fn last_error(&self) -> String;
}
