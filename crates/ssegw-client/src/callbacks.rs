//! Caller-supplied callbacks and their isolated invocation.
//!
//! Every callback runs under [`run_isolated`]: a panic is caught and logged
//! so one faulty subscriber or ack listener cannot stop delivery to the rest.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::error;

use ssegw_core::{ChannelEvent, SessionInfo};

/// Callback invoked with each matching channel event.
///
/// Clones share identity: unsubscribing with any clone removes every
/// subscription registered with the original.
#[derive(Clone)]
pub struct EventCallback(Arc<dyn Fn(ChannelEvent) + Send + Sync>);

impl EventCallback {
    /// Wrap a closure.
    pub fn new(f: impl Fn(ChannelEvent) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Whether `other` is the same callback.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn call(&self, event: ChannelEvent) {
        (self.0)(event);
    }
}

impl PartialEq for EventCallback {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for EventCallback {}

impl fmt::Debug for EventCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventCallback({:p})", Arc::as_ptr(&self.0).cast::<()>())
    }
}

/// One-shot listener fired when the server acknowledges a batch.
pub type AckListener = Box<dyn FnOnce() + Send>;

/// One-shot callback fired with the session info of the first `open` frame.
pub type OnConnect = Box<dyn FnOnce(&SessionInfo) + Send>;

/// Run `f`, catching and logging a panic. Returns whether `f` completed.
pub(crate) fn run_isolated(what: &'static str, f: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            error!(callback = what, panic = %panic_message(payload.as_ref()), "callback panicked");
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
