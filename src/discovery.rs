// ABOUTME: Server discovery collaborator seam
// ABOUTME: Static-config implementation; mDNS is out of scope and left as a trait seam only

use crate::error::Error;

pub trait Discovery: Send {
    fn resolve_server(&self) -> Result<(String, u16), Error>;
}

/// Resolves to a fixed host/port supplied at startup, per §6's "static configuration" option.
pub struct StaticDiscovery {
    host: String,
    port: u16,
}

impl StaticDiscovery {
    pub fn new(host: String, port: u16) -> Self {
        Self { host, port }
    }
}

impl Discovery for StaticDiscovery {
    fn resolve_server(&self) -> Result<(String, u16), Error> {
        Ok((self.host.clone(), self.port))
    }
}
