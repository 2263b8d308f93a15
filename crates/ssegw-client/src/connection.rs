//! Connection lifecycle, push-stream frame routing and configuration flushes.
//!
//! A [`Connection`] is one logical client of the gateway. Its state lives
//! behind a single lock; callbacks always run after the lock is released.
//! Configuration batches leave through one sender task per connection, so
//! POSTs go out in batch-id order and a flush never waits on the network.

use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{Level, debug, error, info, warn};

use ssegw_core::{
    CONFIGURE_FRAME, ChannelEvent, ClientId, ConfigurationRequest, ConfigureAck, OPEN_FRAME,
    RELOAD_FRAME, SessionInfo, TabClientId, mint_tab_client_id, tab_storage_key,
};
use ssegw_settings::ClientSettings;
use ssegw_transport::{
    FrameStream, GatewayTransport, HostEnvironment, SseFrame, TransportError,
};

use crate::batcher::ConfigurationBatcher;
use crate::callbacks::{AckListener, EventCallback, OnConnect, run_isolated};
use crate::endpoints::{configure_url, connect_url, listen_url, normalize_server_url};
use crate::errors::{ClientError, Result};
use crate::manager::ConnectionManager;
use crate::registry::SubscriptionRegistry;
use crate::request::SubscribeRequest;
use crate::scheduler::{DebounceTimer, ScheduledTask};

/// Handle to one logical gateway client. Clones share the connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

pub(crate) struct ConnectionInner {
    client_id: ClientId,
    server_url: Option<String>,
    settings: ClientSettings,
    manager: Arc<ConnectionManager>,
    self_ref: Weak<ConnectionInner>,
    state: Mutex<ConnectionState>,
}

struct ConnectionState {
    tab_client_id: Option<TabClientId>,
    server_url: Option<String>,
    stream: Option<PushStream>,
    connecting: bool,
    /// Bumped by every disconnect; a connect that straddles one is discarded.
    epoch: u64,
    session: Option<SessionInfo>,
    on_connect: Option<OnConnect>,
    registry: SubscriptionRegistry,
    batcher: ConfigurationBatcher,
    flush_timer: DebounceTimer,
    outbox: Option<mpsc::UnboundedSender<OutgoingBatch>>,
}

/// The open push stream and the channels it has listeners for.
struct PushStream {
    attached: HashSet<String>,
    reader: Box<dyn ScheduledTask>,
}

impl PushStream {
    fn new(reader: Box<dyn ScheduledTask>) -> Self {
        Self {
            attached: HashSet::new(),
            reader,
        }
    }

    fn attach(&mut self, channel: String) {
        let _ = self.attached.insert(channel);
    }

    fn is_attached(&self, channel: &str) -> bool {
        self.attached.contains(channel)
    }

    fn close(self) {
        self.reader.cancel();
    }
}

struct OutgoingBatch {
    batch_id: u64,
    url: String,
    request: ConfigurationRequest,
    session: SessionInfo,
}

impl Connection {
    pub(crate) fn new(
        manager: Arc<ConnectionManager>,
        client_id: ClientId,
        server_url: Option<String>,
        on_connect: Option<OnConnect>,
    ) -> Self {
        let settings = manager.settings();
        let flush_timer = DebounceTimer::new(manager.scheduler());
        let inner = Arc::new_cyclic(|self_ref| ConnectionInner {
            client_id,
            server_url,
            settings,
            manager,
            self_ref: self_ref.clone(),
            state: Mutex::new(ConnectionState {
                tab_client_id: None,
                server_url: None,
                stream: None,
                connecting: false,
                epoch: 0,
                session: None,
                on_connect,
                registry: SubscriptionRegistry::new(),
                batcher: ConfigurationBatcher::new(),
                flush_timer,
                outbox: None,
            }),
        });
        Self { inner }
    }

    pub(crate) fn from_inner(inner: Arc<ConnectionInner>) -> Self {
        Self { inner }
    }

    /// Open the push stream.
    ///
    /// A no-op when already connected or connecting. The client id is
    /// claimed process-wide first, so a second live connection with the same
    /// id fails with [`ClientError::AlreadyConnected`]. Without a resolvable
    /// server URL, or on a host without push-stream support, the connection
    /// stays registered but inert and logs a warning: subscriptions are still
    /// recorded but nothing goes over the network.
    pub async fn connect(&self) -> Result<()> {
        let inner = &self.inner;
        let client_id = &inner.client_id;
        let (server_url, tab_client_id, epoch) = {
            let mut state = inner.state.lock();
            if state.stream.is_some() || state.connecting {
                debug!(%client_id, "already connected");
                return Ok(());
            }
            inner.manager.register(client_id, &inner.self_ref)?;

            let tab_client_id = resolve_tab_client_id(inner.manager.host().as_ref(), client_id);
            state.tab_client_id = Some(tab_client_id.clone());

            let Some(server_url) = inner.resolve_server_url() else {
                warn!(%client_id, "no gateway URL configured or discoverable; connection stays inert");
                return Ok(());
            };
            state.server_url = Some(server_url.clone());

            if !inner.manager.transport().supports_push_stream() {
                warn!(%client_id, "host does not support push streams; connection stays inert");
                return Ok(());
            }

            state.connecting = true;
            (server_url, tab_client_id, state.epoch)
        };

        let opened = inner.open_push_stream(&server_url, &tab_client_id).await;

        let mut guard = inner.state.lock();
        let state = &mut *guard;
        if state.epoch != epoch {
            debug!(%client_id, "disconnected while connecting; discarding push stream");
            return Ok(());
        }
        state.connecting = false;
        match opened {
            Ok(frames) => {
                let reader = inner
                    .manager
                    .scheduler()
                    .spawn(Box::pin(pump_frames(inner.self_ref.clone(), frames)));
                let mut stream = PushStream::new(reader);
                for channel in state.registry.take_listener_queue() {
                    stream.attach(channel);
                }
                state.stream = Some(stream);
                info!(%client_id, %tab_client_id, %server_url, "connected to gateway");
                Ok(())
            }
            Err(e) => {
                drop(guard);
                inner.manager.unregister(client_id, &inner.self_ref);
                error!(%client_id, %server_url, error = %e, "failed to connect to gateway");
                Err(e.into())
            }
        }
    }

    /// Close the push stream and release the client id. Idempotent.
    ///
    /// Subscriptions, pending deltas and session info are kept.
    pub fn disconnect(&self) {
        let inner = &self.inner;
        {
            let mut guard = inner.state.lock();
            let state = &mut *guard;
            state.epoch += 1;
            state.connecting = false;
            if let Some(stream) = state.stream.take() {
                let listeners = state.registry.drain_channel_listeners().len();
                stream.close();
                info!(client_id = %inner.client_id, listeners, "disconnected from gateway");
            }
        }
        inner.manager.unregister(&inner.client_id, &inner.self_ref);
    }

    /// Register a subscription and schedule a configuration flush.
    ///
    /// Returns the callback, which is the handle for [`Connection::unsubscribe`].
    pub fn subscribe(&self, request: SubscribeRequest) -> Result<EventCallback> {
        let SubscribeRequest {
            channel,
            filter,
            callback,
            on_subscribed,
        } = request;
        if channel.is_empty() {
            error!(client_id = %self.inner.client_id, "subscribe called without a channel name");
            return Err(ClientError::MissingChannel);
        }

        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        state.flush_timer.cancel();

        let config = state.registry.add(&channel, filter.as_ref(), callback.clone());
        state.batcher.queue_subscribe(config);

        if state.registry.claim_channel_listener(&channel) {
            match state.stream.as_mut() {
                Some(stream) => stream.attach(channel.clone()),
                None => state.registry.queue_listener(&channel),
            }
        }

        self.inner.schedule_flush(state, None);
        if let Some(listener) = on_subscribed {
            self.inner.add_ack_listener(state, listener)?;
        }
        debug!(client_id = %self.inner.client_id, %channel, "subscription queued");
        Ok(callback)
    }

    /// Remove every subscription registered with `callback` and schedule a flush.
    ///
    /// `on_unsubscribed` fires once the server acknowledges the batch. The
    /// channel listener stays attached.
    pub fn unsubscribe(&self, callback: &EventCallback, on_unsubscribed: Option<AckListener>) -> Result<()> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        state.flush_timer.cancel();

        let removed = state.registry.remove(callback);
        debug!(client_id = %self.inner.client_id, removed = removed.len(), "unsubscribe queued");
        for config in removed {
            state.batcher.queue_unsubscribe(config);
        }

        self.inner.schedule_flush(state, None);
        if let Some(listener) = on_unsubscribed {
            self.inner.add_ack_listener(state, listener)?;
        }
        Ok(())
    }

    /// The logical client id.
    pub fn client_id(&self) -> &ClientId {
        &self.inner.client_id
    }

    /// Settings snapshotted when the connection was created.
    pub fn settings(&self) -> &ClientSettings {
        &self.inner.settings
    }

    /// The tab-scoped id, once resolved by [`Connection::connect`].
    pub fn tab_client_id(&self) -> Option<TabClientId> {
        self.inner.state.lock().tab_client_id.clone()
    }

    /// The normalized server URL, once resolved.
    pub fn server_url(&self) -> Option<String> {
        self.inner.state.lock().server_url.clone()
    }

    /// Whether the push stream is open.
    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().stream.is_some()
    }

    /// Session info from the first `open` frame.
    pub fn session_info(&self) -> Option<SessionInfo> {
        self.inner.state.lock().session.clone()
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner.state.lock().registry.len()
    }

    /// Number of live subscriptions on `channel`.
    pub fn channel_subscription_count(&self, channel: &str) -> usize {
        self.inner.state.lock().registry.channel_len(channel)
    }

    /// Whether `channel` has a listener recorded.
    pub fn has_channel_listener(&self, channel: &str) -> bool {
        self.inner.state.lock().registry.has_channel_listener(channel)
    }

    /// Id of the batch currently accumulating.
    pub fn current_batch_id(&self) -> u64 {
        self.inner.state.lock().batcher.current_batch_id()
    }

    /// Whether deltas are waiting for a flush.
    pub fn has_pending_configuration(&self) -> bool {
        self.inner.state.lock().batcher.has_pending()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Connection")
            .field("client_id", &self.inner.client_id)
            .field("connected", &state.stream.is_some())
            .field("subscriptions", &state.registry.len())
            .field("batcher", &state.batcher)
            .finish_non_exhaustive()
    }
}

impl ConnectionInner {
    fn resolve_server_url(&self) -> Option<String> {
        let configured = self
            .server_url
            .clone()
            .or_else(|| self.settings.server_url.clone())
            .or_else(|| self.manager.host().root_url())?;
        normalize_server_url(&configured)
    }

    async fn open_push_stream(
        &self,
        server_url: &str,
        tab_client_id: &TabClientId,
    ) -> std::result::Result<FrameStream, TransportError> {
        let transport = self.manager.transport();
        let response = transport.connect(&connect_url(server_url, tab_client_id)).await?;
        let jsessionid = if self.settings.send_session_id {
            if response.jsessionid.is_none() {
                debug!(client_id = %self.client_id, "gateway returned no session id to propagate");
            }
            response.jsessionid.as_deref()
        } else {
            None
        };
        transport
            .listen(&listen_url(server_url, tab_client_id, jsessionid))
            .await
    }

    fn add_ack_listener(&self, state: &mut ConnectionState, listener: AckListener) -> Result<()> {
        state.batcher.add_ack_listener(listener).inspect_err(|e| {
            error!(client_id = %self.client_id, error = %e, "cannot register ack listener");
        })
    }

    /// (Re)arm the flush timer. `None` uses the configured debounce window.
    fn schedule_flush(&self, state: &mut ConnectionState, delay: Option<Duration>) {
        let delay = delay.unwrap_or_else(|| self.settings.batch_config_delay());
        let connection = self.self_ref.clone();
        state.flush_timer.schedule(delay, move |generation| {
            if let Some(inner) = connection.upgrade() {
                inner.flush(generation);
            }
        });
    }

    /// Send the current batch if the session is known. `generation` is the
    /// flush timer generation this run was armed under.
    fn flush(&self, generation: u64) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if !state.flush_timer.fire(generation) {
            debug!(client_id = %self.client_id, "flush superseded by a newer schedule");
            return;
        }

        let Some(session) = state.session.clone() else {
            if self.manager.transport().supports_push_stream() {
                debug!(client_id = %self.client_id, "session not established yet; retrying configuration flush");
                self.schedule_flush(state, Some(self.settings.session_retry_delay()));
            } else {
                debug!(client_id = %self.client_id, "no push stream; configuration kept locally");
            }
            return;
        };
        let Some(server_url) = state.server_url.clone() else {
            debug!(client_id = %self.client_id, "no server URL; configuration kept locally");
            return;
        };
        let Some((batch_id, request)) = state.batcher.take_batch(session.dispatcher_id.clone()) else {
            debug!(client_id = %self.client_id, "no configuration changes to send");
            return;
        };

        debug!(
            client_id = %self.client_id,
            batch_id,
            subscribe = request.subscribe.len(),
            unsubscribe = request.unsubscribe.len(),
            "sending configuration batch"
        );
        let batch = OutgoingBatch {
            batch_id,
            url: configure_url(&server_url, batch_id),
            request,
            session,
        };
        let outbox = state.outbox.get_or_insert_with(|| self.start_sender());
        if outbox.send(batch).is_err() {
            error!(client_id = %self.client_id, batch_id, "configuration sender stopped; batch dropped");
        }
    }

    fn start_sender(&self) -> mpsc::UnboundedSender<OutgoingBatch> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = self.manager.scheduler().spawn(Box::pin(send_batches(
            self.manager.transport(),
            self.client_id.clone(),
            rx,
        )));
        tx
    }

    fn handle_frame(&self, frame: SseFrame) {
        match frame.event.as_str() {
            OPEN_FRAME => self.on_open(&frame.data),
            CONFIGURE_FRAME => self.on_configure_ack(&frame.data),
            RELOAD_FRAME => {
                info!(client_id = %self.client_id, "gateway requested a page reload");
                self.manager.host().reload();
            }
            channel => self.dispatch(channel, &frame.data),
        }
    }

    fn on_open(&self, data: &str) {
        if data.trim().is_empty() {
            debug!(client_id = %self.client_id, "open frame without session info");
            return;
        }
        let session = match SessionInfo::from_frame(data) {
            Ok(session) => session,
            Err(e) => {
                warn!(client_id = %self.client_id, error = %e, "malformed open frame");
                return;
            }
        };
        debug!(client_id = %self.client_id, dispatcher_id = ?session.dispatcher_id, "gateway session established");

        let on_connect = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            state.session = Some(session.clone());
            if state.batcher.has_pending() {
                self.schedule_flush(state, Some(Duration::ZERO));
            }
            state.on_connect.take()
        };
        if let Some(on_connect) = on_connect {
            let _ = run_isolated("on_connect", move || on_connect(&session));
        }
    }

    fn on_configure_ack(&self, data: &str) {
        let ack = match ConfigureAck::from_frame(data) {
            Ok(ack) => ack,
            Err(e) => {
                warn!(client_id = %self.client_id, error = %e, "malformed configure frame");
                return;
            }
        };
        let listeners = self.state.lock().batcher.acknowledge(ack.batch_id);
        debug!(
            client_id = %self.client_id,
            batch_id = ack.batch_id,
            listeners = listeners.len(),
            "configuration batch acknowledged"
        );
        for listener in listeners {
            let _ = run_isolated("ack listener", listener);
        }
    }

    fn dispatch(&self, channel: &str, data: &str) {
        let deliveries = {
            let state = self.state.lock();
            if !state.stream.as_ref().is_some_and(|s| s.is_attached(channel)) {
                debug!(client_id = %self.client_id, %channel, "frame for channel without listener");
                return;
            }
            if tracing::enabled!(Level::DEBUG) {
                if let Ok(event) = ChannelEvent::parse(data) {
                    debug!(
                        client_id = %self.client_id,
                        channel = ?event.channel(),
                        event = ?event.event_kind(),
                        "received event"
                    );
                }
            }
            match state.registry.deliveries(channel, data) {
                Ok(deliveries) => deliveries,
                Err(e) => {
                    warn!(client_id = %self.client_id, %channel, error = %e, "malformed channel frame");
                    return;
                }
            }
        };

        if deliveries.matched.is_empty() {
            debug!(
                client_id = %self.client_id,
                %channel,
                subscriptions = deliveries.candidates,
                "event not processed by any active subscription; check the event payload against the subscription filters"
            );
            return;
        }
        for (callback, event) in deliveries.matched {
            let _ = run_isolated("subscriber", move || callback.call(event));
        }
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        if let Some(stream) = self.state.get_mut().stream.take() {
            stream.close();
        }
        self.manager.unregister(&self.client_id, &self.self_ref);
    }
}

/// Route push-stream frames to the connection until the stream ends or the
/// connection is dropped.
async fn pump_frames(connection: Weak<ConnectionInner>, mut frames: FrameStream) {
    while let Some(frame) = frames.next().await {
        let Some(inner) = connection.upgrade() else {
            return;
        };
        inner.handle_frame(frame);
    }
    if let Some(inner) = connection.upgrade() {
        warn!(client_id = %inner.client_id, "push stream closed by gateway");
    }
}

/// POST batches in the order they were taken.
async fn send_batches(
    transport: Arc<dyn GatewayTransport>,
    client_id: ClientId,
    mut batches: mpsc::UnboundedReceiver<OutgoingBatch>,
) {
    while let Some(batch) = batches.recv().await {
        let batch_id = batch.batch_id;
        match transport
            .configure(&batch.url, &batch.request, &batch.session)
            .await
        {
            Ok(()) => debug!(%client_id, batch_id, "configuration batch delivered"),
            Err(TransportError::Status { status, body }) => {
                error!(%client_id, batch_id, status, body = %body, "gateway rejected configuration batch");
            }
            Err(e) => error!(%client_id, batch_id, error = %e, "configuration request failed"),
        }
    }
}

/// Reuse the tab id stored for `client_id`, minting and storing one if absent.
/// Hosts without tab storage use the client id itself.
fn resolve_tab_client_id(host: &dyn HostEnvironment, client_id: &ClientId) -> TabClientId {
    let Some(storage) = host.tab_storage() else {
        return TabClientId::from(client_id);
    };
    let key = tab_storage_key(client_id);
    if let Some(existing) = storage.get_item(&key) {
        return TabClientId::new(existing);
    }
    let minted = mint_tab_client_id(client_id);
    storage.set_item(&key, minted.as_str());
    debug!(%client_id, tab_client_id = %minted, "minted tab client id");
    minted
}
