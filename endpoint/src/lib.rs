//! Endpoint variants for the imgsync tools: one per way of reaching a host's
//! image store. Hosts declare a kind string; the factory here maps it to the
//! matching variant.

use std::sync::Arc;

use common::endpoint::{Endpoint, EndpointError};

pub mod host;
pub mod local;
pub mod remote;

pub use host::Host;
pub use local::LocalEndpoint;
pub use remote::RemoteShellEndpoint;

/// Address sentinel selecting local process execution over SSH.
pub const LOCALHOST: &str = "localhost";

/// Canonical host kind driving the `docker` CLI.
pub const DOCKER_CLI: &str = "docker-cli";

/// Build the endpoint variant matching the host's declared kind.
///
/// Hosts whose address is the `"localhost"` sentinel run a local process;
/// anything else goes over SSH with the host's credentials.
pub fn build_endpoint(host: &Host) -> Result<Arc<dyn Endpoint>, EndpointError> {
    match host.kind() {
        // "Docker CLI" is the label older host directories used
        DOCKER_CLI | "Docker CLI" => {
            if host.address() == LOCALHOST {
                Ok(Arc::new(LocalEndpoint::new()))
            } else {
                Ok(Arc::new(RemoteShellEndpoint::new(
                    host.address(),
                    host.username(),
                    host.password(),
                )?))
            }
        }
        other => Err(EndpointError::UnsupportedHostKind(other.to_string())),
    }
}
