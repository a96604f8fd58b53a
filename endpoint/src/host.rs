//! Host records: a named machine with credentials, a declared endpoint kind
//! and a lazily built endpoint tied to that kind.

use std::sync::{Arc, Mutex};

use common::endpoint::{Endpoint, EndpointError};

/// A machine images can be listed on and moved to or from.
///
/// Identity is structural and `name` is not required to be unique; callers
/// address hosts by list position when names collide.
pub struct Host {
    name: String,
    address: String,
    username: String,
    password: String,
    kind: String,
    /// Cached endpoint tagged with the kind it was built from.
    cached: Mutex<Option<(String, Arc<dyn Endpoint>)>>,
}

impl Host {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            username: username.into(),
            password: password.into(),
            kind: kind.into(),
            cached: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Change the declared endpoint kind; the cached endpoint is invalidated
    /// on the next [`Host::endpoint`] call.
    pub fn set_kind(&mut self, kind: impl Into<String>) {
        self.kind = kind.into();
    }

    /// The endpoint for this host, rebuilt whenever the declared kind no
    /// longer matches the one the cached endpoint was built from.
    pub fn endpoint(&self) -> Result<Arc<dyn Endpoint>, EndpointError> {
        let mut cached = self.cached.lock().unwrap();
        if let Some((kind, endpoint)) = cached.as_ref() {
            if *kind == self.kind {
                return Ok(Arc::clone(endpoint));
            }
        }
        tracing::debug!("building {} endpoint for host {:?}", self.kind, self.name);
        let endpoint = crate::build_endpoint(self)?;
        *cached = Some((self.kind.clone(), Arc::clone(&endpoint)));
        Ok(endpoint)
    }
}

impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.address == other.address
            && self.username == other.username
            && self.password == other.password
            && self.kind == other.kind
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        // password intentionally left out
        f.debug_struct("Host")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("username", &self.username)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
