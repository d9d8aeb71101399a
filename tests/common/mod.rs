#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use beacon::error::TransportError;
use beacon::kernel::consent::ConsentGate;
use beacon::kernel::telemetry::buffer::{EventBuffer, FOOTER, HEADER};
use beacon::kernel::time::FixedClock;
use beacon::services::collect::Transport;
use beacon::Event;
use chrono::{DateTime, FixedOffset, TimeZone};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;

pub const COLLECT_URL: &str = "http://collect.test/v1/events";

pub fn fixed_time() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2024, 5, 17, 9, 15, 0)
        .unwrap()
}

pub fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(fixed_time()))
}

pub fn buffer() -> EventBuffer {
    EventBuffer::new(clock())
}

pub fn numbered_event(i: usize) -> Event {
    Event::new(format!("event{}", i)).with_param("index", i as i64)
}

pub fn parse(doc: &[u8]) -> Value {
    serde_json::from_slice(doc).expect("batch document must parse")
}

/// Closes a raw buffer / disk cache image and parses it.
pub fn parse_raw(raw: &[u8]) -> Value {
    assert!(raw.starts_with(HEADER));
    let mut doc = raw.strip_suffix(b",").unwrap_or(raw).to_vec();
    doc.extend_from_slice(FOOTER);
    parse(&doc)
}

pub fn event_list(doc: &Value) -> Vec<Value> {
    doc["eventList"].as_array().expect("eventList array").clone()
}

pub fn field(doc: &Value, name: &str) -> Vec<String> {
    event_list(doc)
        .iter()
        .map(|e| e[name].as_str().unwrap_or_default().to_string())
        .collect()
}

#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16),
    NetworkError,
}

/// Transport that answers from a script (204 once the script runs out) and
/// can hold a request open until the test releases it.
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    posts: Mutex<Vec<(Vec<u8>, Vec<(String, String)>)>>,
    hold: bool,
    pub entered: Notify,
    pub release: Notify,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            posts: Mutex::new(Vec::new()),
            hold: false,
            entered: Notify::new(),
            release: Notify::new(),
        })
    }

    /// Every request waits for `release` before answering.
    pub fn holding(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            posts: Mutex::new(Vec::new()),
            hold: true,
            entered: Notify::new(),
            release: Notify::new(),
        })
    }

    pub fn post_count(&self) -> usize {
        self.posts.lock().len()
    }

    pub fn body(&self, index: usize) -> Vec<u8> {
        self.posts.lock()[index].0.clone()
    }

    pub fn headers(&self, index: usize) -> Vec<(String, String)> {
        self.posts.lock()[index].1.clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post(&self, _url: &str, body: Vec<u8>, headers: &[(String, String)]) -> Result<u16, TransportError> {
        self.posts.lock().push((body, headers.to_vec()));
        if self.hold {
            self.entered.notify_one();
            self.release.notified().await;
        }
        let reply = self.replies.lock().pop_front().unwrap_or(Reply::Status(204));
        match reply {
            Reply::Status(code) => Ok(code),
            Reply::NetworkError => Err(TransportError::Network("connection refused".to_string())),
        }
    }
}

/// Consent gate with fixed answers.
pub struct StaticConsent {
    pub region_checked: bool,
    pub granted: bool,
}

impl StaticConsent {
    pub fn allowed() -> Arc<Self> {
        Arc::new(Self {
            region_checked: true,
            granted: true,
        })
    }
}

impl ConsentGate for StaticConsent {
    fn is_region_checked(&self) -> bool {
        self.region_checked
    }

    fn is_consent_granted(&self) -> bool {
        self.granted
    }

    fn required_headers(&self) -> Vec<(String, String)> {
        vec![("PIPL_CONSENT".to_string(), "true".to_string())]
    }
}
