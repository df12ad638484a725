//! Test doubles for the transport traits.

use async_trait::async_trait;
use ferry_transport::{
    Call, Connection, Connector, Identity, Invoker, Reply, TransportError, TransportResult,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Invoker that fails with scripted errors, then succeeds.
pub struct ScriptedInvoker {
    script: Mutex<VecDeque<TransportError>>,
    always: Option<fn() -> TransportError>,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedInvoker {
    /// Fail with each error in order, then reply `PartSaved`.
    pub fn failing(errors: Vec<TransportError>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(errors.into()),
            always: None,
            calls: AtomicUsize::new(0),
        })
    }

    /// Fail every call with the error built by `make`.
    pub fn always(make: fn() -> TransportError) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            always: Some(make),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Invoker for ScriptedInvoker {
    async fn invoke(&self, _call: &Call) -> TransportResult<Reply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(make) = self.always {
            return Err(make());
        }
        match self.script.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(Reply::PartSaved),
        }
    }
}

/// Connector whose connections take `delay` to answer every call.
///
/// Tracks how many connections were dialed and how many are still open.
pub struct SlowConnector {
    delay: Duration,
    pub dialed: Arc<AtomicUsize>,
    pub open: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl SlowConnector {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            dialed: Arc::new(AtomicUsize::new(0)),
            open: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn dialed(&self) -> usize {
        self.dialed.load(Ordering::SeqCst)
    }

    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for SlowConnector {
    async fn connect(&self, _identity: &Identity) -> TransportResult<Arc<dyn Connection>> {
        self.dialed.fetch_add(1, Ordering::SeqCst);
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(SlowConnection {
            delay: self.delay,
            open: self.open.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "slow"
    }
}

struct SlowConnection {
    delay: Duration,
    open: Arc<AtomicUsize>,
    closed: AtomicBool,
}

#[async_trait]
impl Invoker for SlowConnection {
    async fn invoke(&self, _call: &Call) -> TransportResult<Reply> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        tokio::time::sleep(self.delay).await;
        Ok(Reply::PartSaved)
    }
}

impl Connection for SlowConnection {
    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
