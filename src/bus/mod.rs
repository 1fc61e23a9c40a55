//! NATS subscription and handler fan-out.
//!
//! Every message received on [`TOPIC`] is passed, in registration order, to
//! each registered [`Handler`]. Handlers run on the listener task and must
//! not block.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_nats::{Client, ConnectOptions, Subscriber};
use ffqueue_common::JobRequest;
use futures::StreamExt;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Topic producers publish conversion requests on.
pub const TOPIC: &str = "ffqueue.v1";

/// Client name reported to the NATS server.
const CLIENT_NAME: &str = "ffqueue";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

type HandlerFn = dyn Fn(&[u8]) + Send + Sync;

/// A named callback invoked with the raw payload of every message.
pub struct Handler {
    name: String,
    func: Box<HandlerFn>,
}

impl Handler {
    pub fn new(name: impl Into<String>, func: impl Fn(&[u8]) + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, payload: &[u8]) {
        (self.func)(payload)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").field("name", &self.name).finish()
    }
}

type Handlers = Arc<RwLock<Vec<Handler>>>;

struct Connection {
    client: Client,
    cancel: CancellationToken,
    listener: JoinHandle<Result<()>>,
}

/// Subscriber side of the message bus.
#[derive(Default)]
pub struct MessageBus {
    handlers: Handlers,
    connection: Option<Connection>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Handlers added while listening see the next message.
    pub fn add_handler(&self, handler: Handler) {
        tracing::info!("Registered message handler {}", handler.name());
        self.handlers.write().push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Deliver a payload to every handler, in registration order.
    pub fn dispatch(&self, payload: &[u8]) {
        dispatch_to(&self.handlers, payload);
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Connect to `url` and subscribe to [`TOPIC`].
    ///
    /// Messages are delivered from a background task until
    /// [`shutdown`](Self::shutdown).
    pub async fn start_listening(&mut self, url: &str) -> Result<()> {
        if self.connection.is_some() {
            anyhow::bail!("Already listening on {}", TOPIC);
        }

        let client = connect(url).await?;
        tracing::info!("NATS connection established to {}", url);

        let subscriber = client
            .subscribe(TOPIC)
            .await
            .with_context(|| format!("Failed to subscribe to topic {}", TOPIC))?;
        tracing::info!("Subscribed to topic {}", TOPIC);

        let cancel = CancellationToken::new();
        let listener = tokio::spawn(listen(
            subscriber,
            Arc::clone(&self.handlers),
            cancel.clone(),
        ));

        self.connection = Some(Connection {
            client,
            cancel,
            listener,
        });
        Ok(())
    }

    /// Unsubscribe and close the connection.
    ///
    /// # Errors
    ///
    /// Fails if the bus is not connected, or if unsubscribing or flushing
    /// the connection fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        let Some(connection) = self.connection.take() else {
            anyhow::bail!("Not connected to NATS");
        };

        tracing::info!("Unsubscribing from topic {}", TOPIC);
        connection.cancel.cancel();
        connection
            .listener
            .await
            .context("NATS listener task failed")??;

        tracing::info!("Closing NATS connection");
        connection
            .client
            .flush()
            .await
            .context("Failed to flush NATS connection")?;
        Ok(())
    }
}

/// Publish one conversion request on [`TOPIC`] and wait until the server
/// has received it.
pub async fn publish(url: &str, request: &JobRequest) -> Result<()> {
    let client = connect(url).await?;
    let payload = serde_json::to_vec(request).context("Failed to encode task")?;

    client
        .publish(TOPIC, payload.into())
        .await
        .context("Failed to publish task")?;
    client
        .flush()
        .await
        .context("Failed to flush NATS connection")?;

    tracing::debug!(name = %request.name, "Published task to {}", TOPIC);
    Ok(())
}

async fn connect(url: &str) -> Result<Client> {
    ConnectOptions::new()
        .name(CLIENT_NAME)
        .connection_timeout(CONNECT_TIMEOUT)
        .connect(url)
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", url))
}

async fn listen(
    mut subscriber: Subscriber,
    handlers: Handlers,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            message = subscriber.next() => match message {
                Some(message) => {
                    tracing::debug!(
                        subject = %message.subject,
                        bytes = message.payload.len(),
                        "Received message"
                    );
                    dispatch_to(&handlers, &message.payload);
                }
                None => {
                    tracing::warn!("Subscription to {} closed by the server", TOPIC);
                    return Ok(());
                }
            },
        }
    }

    subscriber
        .unsubscribe()
        .await
        .with_context(|| format!("Failed to unsubscribe from {}", TOPIC))
}

fn dispatch_to(handlers: &RwLock<Vec<Handler>>, payload: &[u8]) {
    for handler in handlers.read().iter() {
        tracing::trace!(handler = %handler.name(), "Dispatching message");
        handler.call(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_dispatch_in_registration_order() {
        let bus = MessageBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second"] {
            let seen = Arc::clone(&seen);
            bus.add_handler(Handler::new(name, move |payload: &[u8]| {
                seen.lock().push(format!("{name}:{}", String::from_utf8_lossy(payload)));
            }));
        }
        assert_eq!(bus.handler_count(), 2);

        bus.dispatch(b"one");
        bus.dispatch(b"two");

        assert_eq!(
            *seen.lock(),
            ["first:one", "second:one", "first:two", "second:two"]
        );
    }

    #[test]
    fn test_dispatch_without_handlers() {
        MessageBus::new().dispatch(b"ignored");
    }

    #[test]
    fn test_handler_debug_shows_name() {
        let handler = Handler::new("converter", |_: &[u8]| {});
        assert_eq!(format!("{:?}", handler), r#"Handler { name: "converter" }"#);
    }

    #[tokio::test]
    async fn test_shutdown_without_connection_fails() {
        let mut bus = MessageBus::new();
        assert!(!bus.is_connected());
        assert!(bus.shutdown().await.is_err());
    }

    #[tokio::test]
    async fn test_start_listening_unreachable_server() {
        let mut bus = MessageBus::new();
        assert!(bus.start_listening("nats://127.0.0.1:1").await.is_err());
        assert!(!bus.is_connected());
    }
}
