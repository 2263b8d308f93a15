//! In-process gateway for driving connections from tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use ssegw_client::{ConnectionManager, EventCallback, ScheduledTask, TaskScheduler, TokioScheduler};
use ssegw_core::{ChannelEvent, ConfigurationRequest, ConnectResponse, SessionInfo};
use ssegw_settings::ClientSettings;
use ssegw_transport::{FrameStream, GatewayTransport, HostEnvironment, SseFrame, TransportError};

/// A recorded configuration POST.
#[derive(Clone, Debug)]
pub struct Posted {
    pub url: String,
    pub request: ConfigurationRequest,
    pub session: SessionInfo,
}

/// Fake gateway: records control requests, lets the test push frames.
#[derive(Default)]
pub struct FakeGateway {
    unsupported: AtomicBool,
    fail_connect: AtomicBool,
    reject_configure: AtomicBool,
    jsessionid: Mutex<Option<String>>,
    connects: Mutex<Vec<String>>,
    listens: Mutex<Vec<String>>,
    posts: Mutex<Vec<Posted>>,
    stream: Mutex<Option<mpsc::UnboundedSender<SseFrame>>>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn without_push_support() -> Arc<Self> {
        let gateway = Self::default();
        gateway.unsupported.store(true, Ordering::SeqCst);
        Arc::new(gateway)
    }

    pub fn fail_connect(&self) {
        self.fail_connect.store(true, Ordering::SeqCst);
    }

    pub fn reject_configure(&self) {
        self.reject_configure.store(true, Ordering::SeqCst);
    }

    pub fn set_jsessionid(&self, id: &str) {
        *self.jsessionid.lock() = Some(id.to_owned());
    }

    pub fn connects(&self) -> Vec<String> {
        self.connects.lock().clone()
    }

    pub fn listens(&self) -> Vec<String> {
        self.listens.lock().clone()
    }

    pub fn posts(&self) -> Vec<Posted> {
        self.posts.lock().clone()
    }

    /// Push a frame on the most recently opened stream.
    pub fn push(&self, event: &str, data: &str) {
        if let Some(tx) = self.stream.lock().as_ref() {
            let _ = tx.send(SseFrame::new(event, data));
        }
    }

    pub fn open(&self, dispatcher_id: &str) {
        self.push(
            "open",
            &serde_json::json!({
                "dispatcherId": dispatcher_id,
                "sessionId": "s1",
                "cookieName": "JSESSIONID",
                "crumb": {"name": "Jenkins-Crumb", "value": "c0ffee"}
            })
            .to_string(),
        );
    }

    pub fn ack(&self, batch_id: u64) {
        self.push("configure", &format!("{{\"batchId\":{batch_id}}}"));
    }

    pub fn event(&self, channel: &str, fields: Value) {
        let mut payload = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let _ = payload.insert("jenkins_channel".into(), Value::String(channel.into()));
        self.push(channel, &Value::Object(payload).to_string());
    }

    /// Whether the most recent stream was dropped by the client.
    pub fn stream_closed(&self) -> bool {
        self.stream.lock().as_ref().is_none_or(mpsc::UnboundedSender::is_closed)
    }
}

#[async_trait]
impl GatewayTransport for FakeGateway {
    fn supports_push_stream(&self) -> bool {
        !self.unsupported.load(Ordering::SeqCst)
    }

    async fn connect(&self, url: &str) -> Result<ConnectResponse, TransportError> {
        self.connects.lock().push(url.to_owned());
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok(ConnectResponse {
            jsessionid: self.jsessionid.lock().clone(),
        })
    }

    async fn configure(
        &self,
        url: &str,
        request: &ConfigurationRequest,
        session: &SessionInfo,
    ) -> Result<(), TransportError> {
        self.posts.lock().push(Posted {
            url: url.to_owned(),
            request: request.clone(),
            session: session.clone(),
        });
        if self.reject_configure.load(Ordering::SeqCst) {
            return Err(TransportError::Status {
                status: 400,
                body: r#"{"status":"error","message":"'dispatcherId' not specified."}"#.into(),
            });
        }
        Ok(())
    }

    async fn listen(&self, url: &str) -> Result<FrameStream, TransportError> {
        self.listens.lock().push(url.to_owned());
        let (tx, rx) = mpsc::unbounded_channel();
        *self.stream.lock() = Some(tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}

/// Scheduler whose delayed tasks run only when the test says so. Background
/// tasks go to tokio.
#[derive(Default)]
pub struct ManualScheduler {
    queued: Mutex<Vec<(Box<dyn FnOnce() + Send>, Arc<AtomicBool>)>>,
}

struct ManualTask(Arc<AtomicBool>);

impl ScheduledTask for ManualTask {
    fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn is_pending(&self) -> bool {
        !self.0.load(Ordering::SeqCst)
    }
}

impl TaskScheduler for ManualScheduler {
    fn schedule(&self, _delay: Duration, task: Box<dyn FnOnce() + Send>) -> Box<dyn ScheduledTask> {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.queued.lock().push((task, Arc::clone(&cancelled)));
        Box::new(ManualTask(cancelled))
    }

    fn spawn(&self, task: BoxFuture<'static, ()>) -> Box<dyn ScheduledTask> {
        TokioScheduler.spawn(task)
    }
}

impl ManualScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Delayed tasks queued and not cancelled.
    pub fn live(&self) -> usize {
        self.queued
            .lock()
            .iter()
            .filter(|(_, cancelled)| !cancelled.load(Ordering::SeqCst))
            .count()
    }

    /// Remove the oldest delayed task, as if its timer had just expired.
    pub fn take_next(&self) -> Box<dyn FnOnce() + Send> {
        self.queued.lock().remove(0).0
    }

    /// Run every delayed task that was not cancelled.
    pub fn run_live(&self) {
        let queued = std::mem::take(&mut *self.queued.lock());
        for (task, cancelled) in queued {
            if !cancelled.load(Ordering::SeqCst) {
                task();
            }
        }
    }
}

pub fn manager(gateway: &Arc<FakeGateway>, settings: ClientSettings) -> Arc<ConnectionManager> {
    ConnectionManager::builder(gateway.clone())
        .settings(ClientSettings {
            server_url: Some("http://ci.example/jenkins/".into()),
            ..settings
        })
        .build()
}

pub fn manager_with_host(
    gateway: &Arc<FakeGateway>,
    settings: ClientSettings,
    host: Arc<dyn HostEnvironment>,
) -> Arc<ConnectionManager> {
    ConnectionManager::builder(gateway.clone())
        .settings(settings)
        .host(host)
        .build()
}

/// Callback recording every event it receives.
pub fn recorder() -> (EventCallback, Arc<Mutex<Vec<ChannelEvent>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback = EventCallback::new(move |event| sink.lock().push(event));
    (callback, seen)
}

/// Let spawned tasks run and advance paused time by `ms`.
pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Let spawned tasks run without moving time forward meaningfully.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

pub fn filter(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}
