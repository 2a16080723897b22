//! Byte channel factories.
//!
//! A [`Dialer`] opens the raw stream a session runs over. [`TcpDialer`]
//! is the default; TLS and in-memory doubles are plugged in by supplying
//! another implementation.

use std::time::Duration;

use futures::future::BoxFuture;
use tokio::net::TcpStream;
use tracing::debug;

use crate::bolt::Channel;
use crate::driver::address::Address;
use crate::driver::error::{DriverError, DriverResult};

/// An opened stream plus the local port used to tag log lines.
pub struct Dialed {
    pub stream: Box<dyn Channel>,
    pub local_port: u16,
}

/// Opens byte channels to servers.
pub trait Dialer: Send + Sync {
    /// Open a channel to `address`, giving up after `timeout`.
    fn dial<'a>(&'a self, address: &'a Address, timeout: Duration) -> BoxFuture<'a, DriverResult<Dialed>>;

    /// Whether the channels this dialer produces are encrypted.
    fn secure(&self) -> bool {
        false
    }
}

/// Plain TCP dialer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

impl Dialer for TcpDialer {
    fn dial<'a>(&'a self, address: &'a Address, timeout: Duration) -> BoxFuture<'a, DriverResult<Dialed>> {
        Box::pin(async move {
            debug!("[#{:04X}] C: (Dialing <{}>)", 0, address);
            let target = (address.host(), address.port());
            let stream = match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    return Err(DriverError::connection_unavailable(format!(
                        "Failed to connect to {}: {}",
                        address, e
                    )))
                }
                Err(_) => {
                    return Err(DriverError::connection_unavailable(format!(
                        "Timed out connecting to {} after {:?}",
                        address, timeout
                    )))
                }
            };
            stream.set_nodelay(true).ok();
            let local_port = stream.local_addr().map(|a| a.port()).unwrap_or(0);
            debug!("[#{:04X}] S: (Accepted)", local_port);
            Ok(Dialed {
                stream: Box::new(stream),
                local_port,
            })
        })
    }
}
