//! Scripted transports and render backends for unit tests

use crate::crawler::request::WaitCondition;
use crate::crawler::transport::{RenderBackend, RenderContext, Transport};
use crate::FetchError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

type StaticFn = dyn Fn(&Url) -> Result<String, FetchError> + Send + Sync;
type RenderFn = dyn Fn(&Url, &[String], usize) -> Result<String, FetchError> + Send + Sync;

/// Transport answering from a closure
pub(crate) struct FakeTransport {
    respond: Box<StaticFn>,
}

impl FakeTransport {
    pub fn new(respond: impl Fn(&Url) -> Result<String, FetchError> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
        }
    }

    pub fn unused() -> Self {
        Self::new(|url| {
            Err(FetchError::Transport {
                url: url.to_string(),
                message: "static fetch not expected".to_string(),
                timeout: false,
            })
        })
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn fetch_static(&self, url: &Url) -> Result<String, FetchError> {
        (self.respond)(url)
    }
}

/// Counters shared between a fake renderer and its contexts
#[derive(Default)]
pub(crate) struct RenderCounters {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub snapshots: AtomicUsize,
}

/// Render backend answering from a closure of (url, clicks so far, poll index)
pub(crate) struct FakeRenderer {
    respond: Arc<RenderFn>,
    pub counters: Arc<RenderCounters>,
}

impl FakeRenderer {
    pub fn new(
        respond: impl Fn(&Url, &[String], usize) -> Result<String, FetchError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Arc::new(respond),
            counters: Arc::new(RenderCounters::default()),
        }
    }

    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    pub fn snapshots(&self) -> usize {
        self.counters.snapshots.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenderBackend for FakeRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>, FetchError> {
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeContext {
            respond: Arc::clone(&self.respond),
            counters: Arc::clone(&self.counters),
            url: None,
            clicks: Vec::new(),
            polls: 0,
        }))
    }
}

struct FakeContext {
    respond: Arc<RenderFn>,
    counters: Arc<RenderCounters>,
    url: Option<Url>,
    clicks: Vec<String>,
    polls: usize,
}

#[async_trait]
impl RenderContext for FakeContext {
    async fn navigate(&mut self, url: &Url) -> Result<(), FetchError> {
        self.url = Some(url.clone());
        self.clicks.clear();
        self.polls = 0;
        Ok(())
    }

    async fn snapshot(
        &mut self,
        _wait: &WaitCondition,
        _budget: Duration,
    ) -> Result<String, FetchError> {
        let url = self.url.clone().ok_or_else(|| FetchError::Render {
            url: String::new(),
            message: "not navigated".to_string(),
        })?;
        self.counters.snapshots.fetch_add(1, Ordering::SeqCst);
        let poll = self.polls;
        self.polls += 1;
        (self.respond)(&url, &self.clicks, poll)
    }

    async fn click(&mut self, selector: &str) -> Result<(), FetchError> {
        self.clicks.push(selector.to_string());
        self.polls = 0;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), FetchError> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
