//! Controller client.
//!
//! The [`Client`] wires the transport and notification pieces together and
//! is the surface device-mapping layers talk to.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use intellicenter::{Attribute, Client, Request, RequestObject, ResponseObject, SharedListener};
//!
//! # async fn example() -> intellicenter::Result<()> {
//! let client = Client::builder().host("192.168.1.20").connect().await?;
//!
//! let circuits = client.request(Request::get_query("CircuitStatus", "")).await?;
//! println!("{} circuits", circuits.answer.len());
//!
//! let listener: SharedListener = Arc::new(|object: &ResponseObject| {
//!     println!("{} is now {:?}", object.object_name, object.status());
//! });
//! let watch = Request::request_param_list(vec![RequestObject::read("C0001", [Attribute::Status])]);
//! client.subscribe(listener, &watch).await?;
//!
//! client.close().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::notify::{NotificationDispatcher, SharedListener, SubscriptionRegistry};
use crate::protocol::{Request, Response, WireCodec};
use crate::transport::{
    ConnectionManager, ConnectionState, Connector, CorrelationTable, InboundRouter,
    OutboundWriter, ResponseHandle, Submitter, TcpConnector,
};

use super::builder::ClientBuilder;
use super::config::ClientConfig;
use super::system_info::SystemInfo;

// ============================================================================
// Types
// ============================================================================

/// Shared state behind every [`Client`] clone.
pub(crate) struct ClientInner {
    config: ClientConfig,
    connection: Arc<ConnectionManager>,
    submitter: Submitter,
    registry: Arc<SubscriptionRegistry>,
    dispatcher: NotificationDispatcher,
    writer: OutboundWriter,
    system_info: OnceLock<SystemInfo>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        // Tasks hold references into each other; stopping them breaks the
        // cycle when the client is dropped without close().
        self.writer.signal_stop();
        self.dispatcher.signal_stop();
    }
}

// ============================================================================
// Client
// ============================================================================

/// Connection to one pool controller.
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("address", &self.inner.config.address())
            .field("state", &self.state())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Client - Construction
// ============================================================================

impl Client {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Connects to the controller over TCP.
    ///
    /// Validates `config`, opens the socket, starts the reader, writer and
    /// dispatcher tasks, then fetches [`SystemInfo`] unless disabled.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`](crate::Error::Config) if the configuration is
    ///   invalid
    /// - Connection errors from the initial connect
    /// - Any error from the system information fetch
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let connector = TcpConnector::new(
            config.host.clone(),
            config.port,
            config.connect_timeout,
            config.keepalive,
        );
        Self::connect_with(config, Arc::new(connector)).await
    }

    /// Connects through a custom [`Connector`].
    ///
    /// # Errors
    ///
    /// Same as [`Client::connect`].
    pub async fn connect_with(config: ClientConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;

        let codec = WireCodec::new(config.max_line_bytes);
        let correlation = Arc::new(CorrelationTable::new());
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let submitter = Submitter::new(Arc::clone(&correlation), queue_tx);

        let registry = Arc::new(SubscriptionRegistry::new(
            submitter.clone(),
            config.request_timeout,
        ));
        let dispatcher = NotificationDispatcher::spawn(Arc::clone(&registry));

        let router = InboundRouter::new(correlation, dispatcher.sender());
        let connection = ConnectionManager::new(
            connector,
            codec,
            router,
            config.connection_settings(),
        );

        let weak_registry = Arc::downgrade(&registry);
        connection.set_connected_hook(Box::new(move || {
            if let Some(registry) = weak_registry.upgrade() {
                registry.resubscribe_all();
            }
        }));

        if let Err(e) = connection.connect().await {
            dispatcher.shutdown().await;
            return Err(e);
        }

        let writer = OutboundWriter::spawn(queue_rx, Arc::clone(&connection), codec);

        let client = Self {
            inner: Arc::new(ClientInner {
                config,
                connection,
                submitter,
                registry,
                dispatcher,
                writer,
                system_info: OnceLock::new(),
            }),
        };

        if client.inner.config.fetch_system_info {
            match client.fetch_system_info().await {
                Ok(info) => {
                    info!(
                        name = %info.name,
                        version = %info.version,
                        property = %info.property_name,
                        "Controller identified"
                    );
                    let _ = client.inner.system_info.set(info);
                }
                Err(e) => {
                    warn!(error = %e, "System information fetch failed");
                    client.close().await;
                    return Err(e);
                }
            }
        }

        Ok(client)
    }

    async fn fetch_system_info(&self) -> Result<SystemInfo> {
        let response = self.request(SystemInfo::request()).await?;
        SystemInfo::from_response(response)
    }
}

// ============================================================================
// Client - Requests
// ============================================================================

impl Client {
    /// Submits a request without waiting.
    ///
    /// The request gets a fresh message ID; requests reach the wire in
    /// submission order. Await the handle with [`ResponseHandle::wait`].
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`](crate::Error::ConnectionClosed) after
    ///   [`close`](Self::close)
    /// - [`Error::Protocol`](crate::Error::Protocol) if too many calls are
    ///   pending
    pub fn submit(&self, request: Request) -> Result<ResponseHandle> {
        self.inner.submitter.submit(request)
    }

    /// Submits a request and waits for the reply with the configured
    /// request timeout.
    ///
    /// A non-"200" reply is returned as is.
    ///
    /// # Errors
    ///
    /// Submission errors, plus the errors of [`ResponseHandle::wait`].
    pub async fn request(&self, request: Request) -> Result<Response> {
        self.request_with_timeout(request, self.inner.config.request_timeout)
            .await
    }

    /// Submits a request and waits up to `timeout` for the reply.
    ///
    /// # Errors
    ///
    /// Same as [`Client::request`].
    pub async fn request_with_timeout(
        &self,
        request: Request,
        timeout: Duration,
    ) -> Result<Response> {
        self.submit(request)?.wait(timeout).await
    }
}

// ============================================================================
// Client - Subscriptions
// ============================================================================

impl Client {
    /// Registers `listener` for every object in `request` and waits for the
    /// controller to acknowledge newly watched objects.
    ///
    /// A non-"200" acknowledgement is logged, not returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the acknowledgement could not be obtained.
    pub async fn subscribe(&self, listener: SharedListener, request: &Request) -> Result<()> {
        self.inner.registry.subscribe(listener, request).await
    }

    /// Removes `listener` from every object it watches.
    ///
    /// # Errors
    ///
    /// Returns an error if a release acknowledgement could not be obtained.
    pub async fn unsubscribe(&self, listener: &SharedListener) -> Result<()> {
        self.inner.registry.unsubscribe(listener).await
    }

    /// Returns the watched object names, sorted.
    #[must_use]
    pub fn subscribed_objects(&self) -> Vec<String> {
        self.inner.registry.object_names()
    }
}

// ============================================================================
// Client - Lifecycle
// ============================================================================

impl Client {
    /// Closes the connection and stops all tasks.
    ///
    /// Every pending call fails with
    /// [`Error::ConnectionClosed`](crate::Error::ConnectionClosed). Calling
    /// `close` again is a no-op.
    pub async fn close(&self) {
        if self.state() == ConnectionState::Closed {
            debug!("Client already closed");
            return;
        }

        self.inner.connection.close().await;
        self.inner.writer.shutdown().await;
        self.inner.dispatcher.shutdown().await;

        info!(address = %self.inner.config.address(), "Client closed");
    }

    /// Returns the system information fetched at startup.
    #[inline]
    #[must_use]
    pub fn system_info(&self) -> Option<&SystemInfo> {
        self.inner.system_info.get()
    }

    /// Returns the connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    /// Returns the number of calls awaiting a reply.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.submitter.correlation().len()
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::Ordering;

    use serde_json::{Value, json};
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;

    use crate::error::Error;
    use crate::protocol::{Attribute, RequestObject, ResponseObject};
    use crate::transport::mock::{MockConnector, StubPeer, init_tracing, wait_until};

    const WAIT: Duration = Duration::from_secs(2);

    fn test_config() -> ClientConfig {
        ClientConfig::new("mock")
            .with_request_timeout(WAIT)
            .without_system_info()
    }

    async fn connected() -> (Client, Arc<MockConnector>, UnboundedReceiver<StubPeer>, StubPeer) {
        init_tracing();
        let (connector, mut peers) = MockConnector::new();
        let client = Client::connect_with(test_config(), connector.clone())
            .await
            .expect("connect");
        let peer = peers.recv().await.expect("peer");
        (client, connector, peers, peer)
    }

    fn watch(object: &str) -> Request {
        Request::request_param_list(vec![RequestObject::read(object, [Attribute::Status])])
    }

    #[tokio::test]
    async fn test_concurrent_submits_out_of_order_replies() -> anyhow::Result<()> {
        let (client, _connector, _peers, mut peer) = connected().await;

        let handles: Vec<_> = (0..16)
            .map(|i| {
                client.submit(Request::get_param_list(vec![RequestObject::read(
                    format!("C{i:04}"),
                    [Attribute::Status],
                )]))
            })
            .collect::<Result<_>>()?;

        let mut requests = Vec::new();
        for _ in 0..handles.len() {
            requests.push(peer.next_request().await);
        }

        // Answer in reverse, echoing the object name so callers can check.
        for request in requests.iter().rev() {
            let name = request["objectList"][0]["objnam"].clone();
            peer.reply(
                request,
                "200",
                json!({"objectList": [{"objnam": name, "params": {"STATUS": "OFF"}}]}),
            )
            .await;
        }

        for (i, handle) in handles.into_iter().enumerate() {
            let id = handle.message_id().clone();
            let response = handle.wait(WAIT).await?;
            assert_eq!(response.message_id(), Some(&id));
            assert_eq!(response.object_list[0].object_name, format!("C{i:04}"));
        }
        assert_eq!(client.pending_count(), 0);

        client.close().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_get_query_circuit_status() -> anyhow::Result<()> {
        let (client, _connector, _peers, mut peer) = connected().await;

        let pending = tokio::spawn({
            let client = client.clone();
            async move { client.request(Request::get_query("CircuitStatus", "")).await }
        });

        let request = peer.next_request().await;
        assert_eq!(request["command"], "GetQuery");
        assert_eq!(request["queryName"], "CircuitStatus");

        peer.reply(
            &request,
            "200",
            json!({"answer": [
                {"objnam": "C0001", "params": {"STATUS": "ON", "SNAME": "Pool Light"}},
                {"objnam": "C0002", "params": {"STATUS": "OFF", "SNAME": "Spa"}}
            ]}),
        )
        .await;

        let response = pending.await??;
        assert_eq!(response.response_code, "200");
        assert_eq!(response.answer.len(), 2);
        assert_eq!(response.answer[0].text(&Attribute::Sname), Some("Pool Light"));
        assert_eq!(response.answer[1].status(), Some(false));

        client.close().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_notify_list_reaches_listener() -> anyhow::Result<()> {
        let (client, _connector, _peers, mut peer) = connected().await;

        let (tx, mut rx) = mpsc::unbounded_channel::<ResponseObject>();
        let listener: SharedListener = Arc::new(move |object: &ResponseObject| {
            let _ = tx.send(object.clone());
        });

        let subscribe = tokio::spawn({
            let client = client.clone();
            let listener = Arc::clone(&listener);
            async move { client.subscribe(listener, &watch("C0001")).await }
        });
        let request = peer.next_request().await;
        assert_eq!(request["command"], "RequestParamList");
        peer.reply(&request, "200", json!({})).await;
        subscribe.await??;

        peer.send_line(r#"{"command":"NotifyList","objectList":[{"objnam":"C0001","params":{"STATUS":"ON"}}]}"#)
            .await;

        let object = timeout(WAIT, rx.recv()).await?.expect("delivered");
        assert_eq!(object.object_name, "C0001");
        assert_eq!(object.text(&Attribute::Status), Some("ON"));

        client.close().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_notifications_arrive_in_wire_order() -> anyhow::Result<()> {
        let (client, _connector, _peers, mut peer) = connected().await;

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let listener: SharedListener = Arc::new(move |object: &ResponseObject| {
            if let Some(status) = object.text(&Attribute::Status) {
                let _ = tx.send(status.to_string());
            }
        });

        let subscribe = tokio::spawn({
            let client = client.clone();
            async move { client.subscribe(listener, &watch("C0001")).await }
        });
        let request = peer.next_request().await;
        peer.reply(&request, "200", json!({})).await;
        subscribe.await??;

        let sequence = ["ON", "OFF", "ON", "OFF", "ON", "OFF", "ON"];
        for status in sequence {
            peer.send(json!({
                "command": "NotifyList",
                "objectList": [{"objnam": "C0001", "params": {"STATUS": status}}]
            }))
            .await;
        }

        let mut seen = Vec::new();
        while seen.len() < sequence.len() {
            seen.push(timeout(WAIT, rx.recv()).await?.expect("delivered"));
        }
        assert_eq!(seen, sequence);

        client.close().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_subscribe_wire_requests() -> anyhow::Result<()> {
        let (client, _connector, _peers, mut peer) = connected().await;
        let l1: SharedListener = Arc::new(|_: &ResponseObject| {});
        let l2: SharedListener = Arc::new(|_: &ResponseObject| {});

        // Stub controller: acknowledge everything, record the commands.
        let (seen_tx, mut seen) = mpsc::unbounded_channel::<Value>();
        let stub = tokio::spawn(async move {
            while let Some(line) = peer.read_line().await {
                let request: Value = serde_json::from_str(&line).expect("json");
                let _ = seen_tx.send(request.clone());
                peer.reply(&request, "200", json!({})).await;
            }
        });

        client.subscribe(Arc::clone(&l1), &watch("C0001")).await?;
        client.subscribe(Arc::clone(&l2), &watch("C0001")).await?;
        client.unsubscribe(&l1).await?;
        client.unsubscribe(&l2).await?;

        let mut commands = Vec::new();
        while let Ok(request) = seen.try_recv() {
            commands.push(request["command"].as_str().unwrap_or_default().to_string());
        }
        assert_eq!(commands, ["RequestParamList", "ReleaseParamList"]);
        assert!(client.subscribed_objects().is_empty());

        client.close().await;
        stub.abort();
        Ok(())
    }

    #[tokio::test]
    async fn test_close_fails_pending_and_is_idempotent() -> anyhow::Result<()> {
        let (client, connector, _peers, mut peer) = connected().await;

        let handle = client.submit(watch("C0001"))?;
        let _ = peer.next_request().await;

        client.close().await;
        client.close().await;

        let err = handle.wait(WAIT).await.expect_err("closed");
        assert!(matches!(err, Error::ConnectionClosed));
        assert_eq!(client.state(), ConnectionState::Closed);
        assert_eq!(client.pending_count(), 0);

        let stats = connector.stats();
        assert_eq!(stats.output_shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(stats.input_drops.load(Ordering::SeqCst), 1);

        let err = client.submit(watch("C0002")).expect_err("writer stopped");
        assert!(matches!(err, Error::ConnectionClosed));
        Ok(())
    }

    #[tokio::test]
    async fn test_hangup_reconnects_and_resubscribes() -> anyhow::Result<()> {
        let (client, connector, mut peers, mut peer) = connected().await;
        let listener: SharedListener = Arc::new(|_: &ResponseObject| {});

        let subscribe = tokio::spawn({
            let client = client.clone();
            async move { client.subscribe(listener, &watch("C0001")).await }
        });
        let request = peer.next_request().await;
        peer.reply(&request, "200", json!({})).await;
        subscribe.await??;

        drop(peer);

        let mut second = timeout(WAIT, peers.recv()).await?.expect("second peer");
        let restore = second.next_request().await;
        assert_eq!(restore["command"], "RequestParamList");
        assert_eq!(restore["objectList"][0]["objnam"], "C0001");
        assert_eq!(restore["objectList"][0]["keys"], json!(["STATUS"]));
        second.reply(&restore, "200", json!({})).await;

        assert!(wait_until(|| client.state() == ConnectionState::Connected).await);
        assert_eq!(connector.connects(), 2);

        client.close().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_system_info_fetched_on_connect() -> anyhow::Result<()> {
        init_tracing();
        let (connector, mut peers) = MockConnector::new();

        let stub = tokio::spawn(async move {
            let mut peer = peers.recv().await.expect("peer");
            let request = peer.next_request().await;
            assert_eq!(request["objectList"][0]["objnam"], "_5451");
            peer.reply(
                &request,
                "200",
                json!({"objectList": [{"objnam": "_5451", "params": {
                    "PROPNAME": "Home", "VER": "1.064", "SNAME": "IntelliCenter",
                    "MODE": "METRIC", "ZIP": "10115", "TIMZON": "1",
                    "LOCX": "13.4", "LOCY": "52.5"
                }}]}),
            )
            .await;
            peer
        });

        let config = ClientConfig::new("mock").with_request_timeout(WAIT);
        let client = Client::connect_with(config, connector).await?;
        let _peer = stub.await?;

        let info = client.system_info().expect("fetched");
        assert_eq!(info.property_name, "Home");
        assert!(info.is_metric());
        assert_eq!(info.latitude, Some(52.5));

        client.close().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_system_info_rejection_fails_startup() {
        init_tracing();
        let (connector, mut peers) = MockConnector::new();

        tokio::spawn(async move {
            let mut peer = peers.recv().await.expect("peer");
            let request = peer.next_request().await;
            peer.reply(&request, "401", json!({"description": "unauthorized"}))
                .await;
            // Keep the peer open until the client hangs up.
            let _ = peer.read_line().await;
        });

        let config = ClientConfig::new("mock").with_request_timeout(WAIT);
        let err = Client::connect_with(config, connector.clone())
            .await
            .err()
            .expect("startup error");

        assert!(matches!(err, Error::ResponseCode { ref code, .. } if code == "401"));
        assert_eq!(connector.stats().output_shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let (connector, _peers) = MockConnector::new();
        connector.refuse_connections(true);

        let err = Client::connect_with(test_config(), connector)
            .await
            .err()
            .expect("refused");
        assert!(err.is_connection_error());
    }
}
