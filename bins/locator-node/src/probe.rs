//! TCP liveness probe for object lookups.

use std::time::Duration;

use async_trait::async_trait;
use locator_core::Address;
use locator_discovery::ObjectProbe;
use tokio::net::TcpStream;
use tracing::trace;

/// Treats a candidate as reachable if any of its TCP endpoints accepts a
/// connection within the timeout.
///
/// Addresses without TCP endpoints cannot be checked and count as
/// reachable.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ObjectProbe for TcpProbe {
    async fn is_reachable(&self, address: &Address) -> bool {
        let mut checked = false;
        for endpoint in address.endpoints().iter().filter(|e| e.protocol == "tcp") {
            checked = true;
            let target = (endpoint.host.as_str(), endpoint.port);
            match tokio::time::timeout(self.timeout, TcpStream::connect(target)).await {
                Ok(Ok(_)) => return true,
                Ok(Err(e)) => trace!(endpoint = %endpoint, error = %e, "Probe connect failed"),
                Err(_) => trace!(endpoint = %endpoint, "Probe timed out"),
            }
        }
        !checked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locator_core::Endpoint;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn listening_endpoint_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let probe = TcpProbe::new(Duration::from_secs(1));

        assert!(probe.is_reachable(&Address::new([Endpoint::tcp("127.0.0.1", port)])).await);
    }

    #[tokio::test]
    async fn closed_endpoint_is_unreachable() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let probe = TcpProbe::new(Duration::from_secs(1));

        assert!(!probe.is_reachable(&Address::new([Endpoint::tcp("127.0.0.1", port)])).await);
    }

    #[tokio::test]
    async fn non_tcp_address_is_assumed_reachable() {
        let probe = TcpProbe::new(Duration::from_millis(10));
        assert!(probe.is_reachable(&Address::new([Endpoint::new("udp", "10.255.255.1", 9)])).await);
    }
}
