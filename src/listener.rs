// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::net::SocketAddr;
use std::net::TcpListener as StdTcpListener;
use tokio::net::TcpListener as AsyncTcpListener;

/// A bound and listening TCP socket for the query endpoint.
///
/// Binding with [`Listener::listen_std`] works outside a tokio runtime, so a
/// taken port is reported during startup before any task is spawned. Either
/// form converts into a tokio listener with [`Listener::into_async`].
pub struct Listener {
    inner: ListenerInner,
}

enum ListenerInner {
    Async(AsyncTcpListener),
    Std(StdTcpListener),
}

impl Listener {
    pub fn listen_std(endpoint: SocketAddr) -> Result<Self, Box<dyn Error + Send + Sync>> {
        match StdTcpListener::bind(endpoint) {
            Ok(l) => Ok(Self {
                inner: ListenerInner::Std(l),
            }),
            Err(e) => Err(format!("unable to bind to {}: {}", endpoint, e).into()),
        }
    }

    pub async fn listen_async(endpoint: SocketAddr) -> Result<Self, Box<dyn Error + Send + Sync>> {
        match AsyncTcpListener::bind(endpoint).await {
            Ok(l) => Ok(Self {
                inner: ListenerInner::Async(l),
            }),
            Err(e) => Err(format!("unable to bind to {}: {}", endpoint, e).into()),
        }
    }

    pub fn bound_address(&self) -> Result<SocketAddr, Box<dyn Error + Send + Sync>> {
        Ok(match &self.inner {
            ListenerInner::Async(inner) => inner.local_addr()?,
            ListenerInner::Std(inner) => inner.local_addr()?,
        })
    }

    pub fn into_async(self) -> Result<AsyncTcpListener, Box<dyn Error + Send + Sync>> {
        match self.inner {
            ListenerInner::Async(inner) => Ok(inner),
            ListenerInner::Std(inner) => {
                // tokio requires the std socket to be non-blocking
                inner.set_nonblocking(true)?;
                Ok(AsyncTcpListener::from_std(inner)?)
            }
        }
    }
}
