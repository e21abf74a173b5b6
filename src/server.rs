use anyhow::{Context, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};
use tracing::{debug, error, info, info_span, warn};
use tracing_futures::Instrument;

use crate::activity_log::ActivityLog;
use crate::broadcast::Broadcaster;
use crate::command::Router;
use crate::config::Config;
use crate::error::TransportError;
use crate::rates::{HttpRateSource, RateFetcher};
use crate::registry::{ClientRegistry, Registration};
use crate::session::{Outbox, Session, random_display_name};

/// Chat relay accepting WebSocket clients.
///
/// Owns the listener and the shared registry. Each accepted connection gets
/// its own task; all of them are aborted when the server stops, which also
/// releases the last references to the rate fetcher and its HTTP client.
pub struct ChatServer {
    listener: TcpListener,
    registry: Arc<ClientRegistry>,
    router: Router,
}

impl ChatServer {
    /// Binds to `addr` with a fresh registry.
    ///
    /// # Arguments
    /// - `addr`: The address to bind to (e.g., "127.0.0.1:8080").
    /// - `fetcher`: Answers `exchange` commands.
    /// - `log`: Receives every successful rate report.
    /// - `currencies`: The codes an `exchange` command reports on.
    ///
    /// # Returns
    /// A `Result` containing the server or an error if binding fails.
    pub async fn bind(
        addr: &str,
        fetcher: RateFetcher,
        log: ActivityLog,
        currencies: Vec<String>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        info!("Chat server bound to {}", listener.local_addr()?);

        let registry = Arc::new(ClientRegistry::new());
        let router = Router::new(
            Broadcaster::new(registry.clone()),
            fetcher,
            Arc::new(log),
            currencies,
        );
        Ok(ChatServer {
            listener,
            registry,
            router,
        })
    }

    /// Builds the HTTP rate source and activity log described by `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let source = HttpRateSource::new(&config.rates_url, config.fetch_timeout())
            .context("failed to build HTTP client")?;
        Self::bind(
            &config.listen,
            RateFetcher::new(source),
            ActivityLog::new(&config.log_file),
            config.currencies.clone(),
        )
        .await
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<ClientRegistry> {
        self.registry.clone()
    }

    /// Accepts connections, spawning a session task for each, until
    /// `shutdown` resolves. Open sessions are then aborted.
    ///
    /// # Arguments
    /// - `shutdown`: A future that completes when the server should stop.
    ///
    /// # Returns
    /// A `Result` indicating success or failure.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let ChatServer {
            listener,
            registry,
            router,
        } = self;
        let mut sessions = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Chat server shutting down, open sessions: {:?}", registry.names());
                    break;
                }
                accepted = listener.accept() => {
                    let (socket, addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!("accept failed: {:?}", e);
                            continue;
                        }
                    };
                    info!("Accepted connection from {}", addr);
                    let registry = registry.clone();
                    let router = router.clone();
                    sessions.spawn(
                        async move {
                            if let Err(e) = handle_client(socket, addr, registry, router).await {
                                error!("Client {} error: {:?}", addr, e);
                            }
                        }
                        .instrument(info_span!("session", peer = %addr)),
                    );
                }
                Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = finished {
                        if e.is_panic() {
                            error!("session task panicked: {}", e);
                        }
                    }
                }
            }
        }

        sessions.shutdown().await;
        Ok(())
    }

    /// Runs the server until Ctrl-C.
    ///
    /// # Returns
    /// A `Result` indicating success or failure.
    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to install ctrl-c handler: {:?}", e);
            }
        })
        .await
    }
}

async fn handle_client(
    socket: TcpStream,
    addr: SocketAddr,
    registry: Arc<ClientRegistry>,
    router: Router,
) -> Result<()> {
    let ws = accept_async(socket)
        .await
        .with_context(|| format!("websocket handshake with {addr} failed"))?;

    let (session, outbound) = Session::new(random_display_name(), addr);
    let registration = Registration::new(registry, session.clone())?;
    let (sink, stream) = ws.split();
    let mut writer = tokio::spawn(write_outbound(sink, outbound).in_current_span());

    let result = receive_loop(stream, &session, &router, &mut writer).await;

    drop(registration);
    writer.abort();
    result
}

/// Reads frames until the client leaves or the writer gives up on it.
async fn receive_loop(
    mut stream: SplitStream<WebSocketStream<TcpStream>>,
    session: &Session,
    router: &Router,
    writer: &mut JoinHandle<()>,
) -> Result<()> {
    loop {
        // Only the wait for a frame races the writer; a dispatch in flight runs to completion.
        let frame = tokio::select! {
            frame = stream.next() => frame,
            _ = &mut *writer => {
                info!("Client {} dropped after a failed send", session.peer());
                return Ok(());
            }
        };
        match frame {
            Some(Ok(Message::Text(text))) => {
                debug!("Received from {}: {}", session.name(), text.as_str());
                router.dispatch(session, text.as_str()).await;
            }
            Some(Ok(Message::Close(_))) => {
                info!("Client {} closed the connection", session.peer());
                return Ok(());
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                return Err(TransportError::from(e))
                    .with_context(|| format!("read error for {}", session.peer()));
            }
            None => {
                info!("Client {} disconnected", session.peer());
                return Ok(());
            }
        }
    }
}

/// Drains a session's outbound queue into its socket, in queue order.
///
/// Returns when the socket rejects a frame or the queue overflows.
async fn write_outbound(
    mut sink: SplitSink<WebSocketStream<TcpStream>, Message>,
    mut outbound: Outbox,
) {
    while let Some(message) = outbound.recv().await {
        if let Err(e) = sink.send(Message::Text(message.into())).await {
            debug!("send failed, stopping writer: {}", e);
            break;
        }
    }
    // The registry may still hold this session for a moment.
    outbound.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::rates::{Quote, RateSource};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use tokio_tungstenite::connect_async;

    struct NoRates;

    #[async_trait]
    impl RateSource for NoRates {
        async fn fetch_day(&self, _date: NaiveDate) -> Result<Vec<Quote>, FetchError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn session_ends_when_its_writer_stops() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let registry = Arc::new(ClientRegistry::new());
        let router = Router::new(
            Broadcaster::new(registry.clone()),
            RateFetcher::new(NoRates),
            Arc::new(ActivityLog::new(dir.path().join("chat.log"))),
            vec!["USD".into()],
        );

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("ws://{}", listener.local_addr()?);
        let (client, accepted) = tokio::join!(connect_async(url), async {
            let (socket, addr) = listener.accept().await?;
            anyhow::Ok((accept_async(socket).await?, addr))
        });
        let _client = client?;
        let (ws, addr) = accepted?;
        let (_sink, stream) = ws.split();

        let (session, _outbox) = Session::new("Quiet Client", addr);
        let _registration = Registration::new(registry.clone(), session.clone())?;
        let mut writer = tokio::spawn(async {});

        // the client stays connected and silent; only the writer has finished
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            receive_loop(stream, &session, &router, &mut writer),
        )
        .await?;
        assert!(result.is_ok());
        Ok(())
    }
}
