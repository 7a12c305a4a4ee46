use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use gantry_core::{BoxError, Context, Module, ModulePath, Provision, Validate};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{self, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{banner, listeners};

/// The `echo` app: a TCP server that writes every byte back to its sender.
///
/// If `banner` is configured, the banner module's text is sent to each
/// client, followed by a newline, before echoing starts.
#[derive(Debug, Deserialize)]
pub struct EchoApp {
    /// Address to listen on, e.g. `127.0.0.1:7000`.
    pub listen: String,

    /// Raw banner payload; loaded as the module at `apps.echo.banner`.
    #[serde(default)]
    banner: Option<Value>,

    #[serde(skip)]
    addr: Option<SocketAddr>,
    #[serde(skip)]
    greeting: Option<Arc<str>>,
    #[serde(skip)]
    server: Mutex<Option<Server>>,
}

#[derive(Debug)]
struct Server {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl EchoApp {
    /// The address actually bound, while the app is running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.lock().as_ref().map(|s| s.local_addr)
    }

    /// The greeting sent to new clients.
    pub fn greeting(&self) -> Option<&str> {
        self.greeting.as_deref()
    }
}

#[async_trait]
impl Module for EchoApp {
    async fn start(&self) -> Result<(), BoxError> {
        let addr = self.addr.ok_or("echo app was not provisioned")?;
        let listener = listeners::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(serve(listener, self.greeting.clone(), cancel.clone()));

        *self.server.lock() = Some(Server {
            local_addr,
            cancel,
            task,
        });
        info!(addr = %local_addr, "Echo server listening");
        Ok(())
    }

    async fn stop(&self) -> Result<(), BoxError> {
        let Some(server) = self.server.lock().take() else {
            return Ok(());
        };

        server.cancel.cancel();
        server.task.await?;
        info!(addr = %server.local_addr, "Echo server stopped");
        Ok(())
    }

    fn as_validator(&self) -> Option<&dyn Validate> {
        Some(self)
    }

    fn as_provisioner(&mut self) -> Option<&mut dyn Provision> {
        Some(self)
    }
}

impl Validate for EchoApp {
    fn validate(&self) -> Result<(), BoxError> {
        self.listen
            .parse::<SocketAddr>()
            .map_err(|e| format!("invalid listen address {:?}: {e}", self.listen))?;
        Ok(())
    }
}

#[async_trait]
impl Provision for EchoApp {
    async fn provision(&mut self, ctx: &mut Context) -> Result<(), BoxError> {
        self.addr = Some(self.listen.parse()?);

        if self.banner.is_some() {
            let handle = ctx.load(ModulePath::app("echo").child("banner")).await?;
            let text = banner::text_of(&handle)
                .ok_or_else(|| format!("{} is not a banner module", handle.path()))?;
            self.greeting = Some(text.into());
        }
        Ok(())
    }
}

// ─── Serving ──────────────────────────────────────────────────────────────────

async fn serve(listener: Arc<TcpListener>, greeting: Option<Arc<str>>, cancel: CancellationToken) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            Some(_) = connections.join_next() => {}
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    connections.spawn(handle_connection(stream, peer, greeting.clone(), cancel.clone()));
                }
                Err(e) => warn!(error = %e, "Failed to accept connection"),
            },
        }
    }

    while connections.join_next().await.is_some() {}
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    greeting: Option<Arc<str>>,
    cancel: CancellationToken,
) {
    debug!(%peer, "Connection accepted");

    let result = tokio::select! {
        () = cancel.cancelled() => Ok(()),
        result = relay(&mut stream, greeting.as_deref()) => result,
    };

    match result {
        Ok(()) => debug!(%peer, "Connection closed"),
        Err(e) => debug!(%peer, error = %e, "Connection failed"),
    }
}

async fn relay(stream: &mut TcpStream, greeting: Option<&str>) -> io::Result<()> {
    if let Some(greeting) = greeting {
        stream.write_all(greeting.as_bytes()).await?;
        stream.write_all(b"\n").await?;
    }

    let (mut reader, mut writer) = stream.split();
    io::copy(&mut reader, &mut writer).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::{ConfigTree, LoadError, ModuleRegistry, ModuleState};
    use gantry_supervisor::{ReconfigureError, Supervisor};
    use serde_json::json;
    use tempfile::NamedTempFile;
    use tokio::io::AsyncReadExt;
    use tokio_test::assert_ok;

    fn supervisor() -> Supervisor {
        Supervisor::new(ModuleRegistry::with_packages(&[crate::register]).unwrap().freeze())
    }

    fn tree(echo: Value) -> ConfigTree {
        ConfigTree::builder().app("echo", echo).build().unwrap()
    }

    async fn round_trip(addr: SocketAddr, greeting: Option<&str>) -> String {
        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut received = Vec::new();

        if let Some(greeting) = greeting {
            let mut line = vec![0; greeting.len() + 1];
            client.read_exact(&mut line).await.unwrap();
            received.extend_from_slice(&line);
        }

        client.write_all(b"ping").await.unwrap();
        let mut echoed = [0; 4];
        client.read_exact(&mut echoed).await.unwrap();
        received.extend_from_slice(&echoed);

        String::from_utf8(received).unwrap()
    }

    #[tokio::test]
    async fn test_echo_with_static_banner() {
        let supervisor = supervisor();
        assert_ok!(
            supervisor
                .reconfigure(tree(json!({
                    "listen": "127.0.0.1:0",
                    "banner": { "module": "static", "text": "hello" },
                })))
                .await
        );

        let echo = supervisor.snapshot().unwrap().app::<EchoApp>("echo").unwrap();
        assert_eq!(echo.greeting(), Some("hello"));
        let addr = echo.local_addr().unwrap();
        assert_eq!(round_trip(addr, Some("hello")).await, "hello\nping");

        assert_ok!(supervisor.reconfigure(ConfigTree::empty()).await);
        assert_eq!(supervisor.app_state("echo"), None);
        assert_eq!(echo.local_addr(), None);
    }

    #[tokio::test]
    async fn test_file_banner_loaded_during_provision() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "from file\n").unwrap();

        let supervisor = supervisor();
        assert_ok!(
            supervisor
                .reconfigure(tree(json!({
                    "listen": "127.0.0.1:0",
                    "banner": { "module": "file", "path": file.path() },
                })))
                .await
        );

        let echo = supervisor.snapshot().unwrap().app::<EchoApp>("echo").unwrap();
        assert_eq!(echo.greeting(), Some("from file"));
        assert_ok!(supervisor.shutdown().await);
    }

    #[tokio::test]
    async fn test_reload_on_same_port_keeps_serving() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let listen = format!("127.0.0.1:{port}");

        let supervisor = supervisor();
        assert_ok!(supervisor.reconfigure(tree(json!({ "listen": listen }))).await);
        let first = supervisor.snapshot().unwrap().app::<EchoApp>("echo").unwrap();

        assert_ok!(
            supervisor
                .reconfigure(tree(json!({
                    "listen": listen,
                    "banner": { "module": "static", "text": "v2" },
                })))
                .await
        );
        assert_eq!(supervisor.generation(), 2);
        assert_eq!(first.local_addr(), None);

        let addr: SocketAddr = listen.parse().unwrap();
        assert_eq!(round_trip(addr, Some("v2")).await, "v2\nping");
        assert_ok!(supervisor.shutdown().await);
    }

    #[tokio::test]
    async fn test_invalid_listen_address_rejected() {
        let supervisor = supervisor();
        let err = supervisor
            .reconfigure(tree(json!({ "listen": "not-an-address" })))
            .await
            .unwrap_err();

        assert!(matches!(err, ReconfigureError::Load(LoadError::Validation { .. })));
        assert!(supervisor.snapshot().is_none());
    }

    #[tokio::test]
    async fn test_unknown_banner_keeps_previous_configuration() {
        let supervisor = supervisor();
        assert_ok!(supervisor.reconfigure(tree(json!({ "listen": "127.0.0.1:0" }))).await);

        let err = supervisor
            .reconfigure(tree(json!({
                "listen": "127.0.0.1:0",
                "banner": { "module": "neon" },
            })))
            .await
            .unwrap_err();

        assert!(matches!(err, ReconfigureError::Load(LoadError::UnknownType { .. })));
        assert_eq!(err.path().unwrap().as_str(), "apps.echo.banner");
        assert_eq!(supervisor.generation(), 1);
        assert_eq!(supervisor.app_state("echo"), Some(ModuleState::Running));
        assert_ok!(supervisor.shutdown().await);
    }
}
