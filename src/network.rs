//! Network reachability probe used to choose between online and offline road lookup.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::debug;

use crate::config::NetworkConfig;

pub trait Reachability: Send {
    fn is_online(&self) -> bool;
}

/// TCP connect test against a well-known host, e.g. a public DNS resolver.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            host: config.probe_host.clone(),
            port: config.probe_port,
            timeout: Duration::from_millis(config.probe_timeout_ms),
        }
    }

    fn address(&self) -> Option<SocketAddr> {
        (self.host.as_str(), self.port).to_socket_addrs().ok()?.next()
    }
}

impl Reachability for TcpProbe {
    fn is_online(&self) -> bool {
        let Some(address) = self.address() else {
            debug!("Cannot resolve probe host {}", self.host);
            return false;
        };
        match TcpStream::connect_timeout(&address, self.timeout) {
            Ok(_) => true,
            Err(e) => {
                debug!("Network probe to {} failed: {}", address, e);
                false
            }
        }
    }
}

/// Forces the offline road lookup.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOffline;

impl Reachability for AlwaysOffline {
    fn is_online(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn probe_for(port: u16) -> TcpProbe {
        TcpProbe::new(&NetworkConfig {
            probe_host: "127.0.0.1".into(),
            probe_port: port,
            probe_timeout_ms: 500,
            ..NetworkConfig::default()
        })
    }

    #[test]
    fn test_probe_reaches_listening_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(probe_for(port).is_online());
    }

    #[test]
    fn test_probe_fails_on_closed_port() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        assert!(!probe_for(port).is_online());
        assert!(!AlwaysOffline.is_online());
    }
}
