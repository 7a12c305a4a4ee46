//! Listener sharing across configuration generations.
//!
//! During a reload the new app starts before the old one stops. When both
//! listen on the same address the new app picks up the live socket from this
//! table instead of failing with `AddrInUse`. Entries are weak: the socket
//! closes once the last app holding it stops.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, LazyLock, Weak};

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tracing::debug;

static LISTENERS: LazyLock<Mutex<HashMap<SocketAddr, Weak<TcpListener>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Returns the live listener for `addr`, binding a new one if needed.
///
/// Ephemeral addresses (port 0) are never shared.
pub(crate) async fn bind(addr: SocketAddr) -> io::Result<Arc<TcpListener>> {
    let shared = addr.port() != 0;

    if shared {
        let existing = LISTENERS.lock().get(&addr).and_then(Weak::upgrade);
        if let Some(listener) = existing {
            debug!(%addr, "Reusing listener from the previous configuration");
            return Ok(listener);
        }
    }

    let listener = Arc::new(TcpListener::bind(addr).await?);

    if shared {
        let mut table = LISTENERS.lock();
        table.retain(|_, l| l.strong_count() > 0);
        table.insert(addr, Arc::downgrade(&listener));
    }

    Ok(listener)
}
