//! Incremental batch writer.
//!
//! Events are serialized straight into one growing JSON document of the form
//! `{"eventList":[{event},{event},...]}`. The footer is never stored: every
//! completed element is followed by a `,` which is stripped lazily when a
//! container closes or when a batch is finalized.
//!
//! Layout of `bytes`:
//!
//! ```text
//! {"eventList":[ {e1}, {e2}, {e3 being built...
//! ^ header      ^                ^ cursor
//! ```
//!
//! Everything before `cursor` is closed events only. That region is what gets
//! snapshotted, checked out for dispatch and written to the disk cache.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use parking_lot::Mutex;

use super::event::ParamValue;
use crate::error::BufferError;
use crate::kernel::time::Clock;

pub const HEADER: &[u8] = b"{\"eventList\":[";
pub const FOOTER: &[u8] = b"]}";

/// Default cap on the live buffer (5 MiB).
pub const DEFAULT_MAX_BYTES: usize = 5 * 1024 * 1024;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f %:z";

pub type SharedBuffer = Arc<Mutex<EventBuffer>>;

/// Formats a timestamp the way the collect endpoint expects
/// (`yyyy-MM-dd HH:mm:ss.fff zzz`).
pub fn format_timestamp(at: &DateTime<FixedOffset>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Identifiers stamped into every event envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub session_id: String,
    pub install_id: String,
    pub player_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

impl Container {
    fn label(self) -> &'static str {
        match self {
            Container::Object => "object",
            Container::Array => "array",
        }
    }
}

/// Closed events captured at one cursor position. Owned by exactly one
/// flush attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// `{e1},{e2},` including the trailing separator.
    events: Vec<u8>,
    count: usize,
}

impl Token {
    pub fn event_count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Finalized batch document. Empty when the token holds no events.
    pub fn serialize(&self) -> Vec<u8> {
        if self.count == 0 {
            return Vec::new();
        }
        let body = self.events.strip_suffix(b",").unwrap_or(&self.events);
        let mut out = Vec::with_capacity(HEADER.len() + body.len() + FOOTER.len());
        out.extend_from_slice(HEADER);
        out.extend_from_slice(body);
        out.extend_from_slice(FOOTER);
        out
    }
}

pub struct EventBuffer {
    bytes: Vec<u8>,
    cursor: usize,
    events_recorded: usize,
    /// `None` when ready for a new event; otherwise the containers opened
    /// inside the current event's `eventParams`.
    open: Option<Vec<Container>>,
    identity: Identity,
    max_bytes: usize,
    clock: Arc<dyn Clock>,
}

impl EventBuffer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let mut buffer = Self {
            bytes: Vec::new(),
            cursor: 0,
            events_recorded: 0,
            open: None,
            identity: Identity::default(),
            max_bytes: DEFAULT_MAX_BYTES,
            clock,
        };
        buffer.clear();
        buffer
    }

    pub fn shared(self) -> SharedBuffer {
        Arc::new(Mutex::new(self))
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn set_identity(&mut self, identity: Identity) {
        self.identity = identity;
    }

    /// Number of fully closed events.
    pub fn events_recorded(&self) -> usize {
        self.events_recorded
    }

    /// Total bytes held, including an event under construction.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events_recorded == 0
    }

    pub fn is_event_open(&self) -> bool {
        self.open.is_some()
    }

    /// Header plus closed events, trailing separator included. This is the
    /// exact disk cache image.
    pub fn raw_contents(&self) -> Vec<u8> {
        self.bytes[..self.cursor].to_vec()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.bytes.extend_from_slice(HEADER);
        self.cursor = HEADER.len();
        self.events_recorded = 0;
        self.open = None;
    }

    // ---------------------------------------------------------------------
    // Writing
    // ---------------------------------------------------------------------

    pub fn begin_event(
        &mut self,
        name: &str,
        timestamp: &DateTime<FixedOffset>,
        version: Option<i64>,
        include_identifiers: bool,
    ) -> Result<(), BufferError> {
        if self.open.is_some() {
            return Err(BufferError::EventInProgress);
        }
        if self.bytes.len() >= self.max_bytes {
            return Err(BufferError::Full {
                len: self.bytes.len(),
                limit: self.max_bytes,
            });
        }

        let event_id = self.clock.generate_id();
        let identity = self.identity.clone();

        self.write_raw(b"{");
        self.write_str_field("eventName", name);
        self.write_str_field("userID", &identity.user_id);
        self.write_str_field("sessionID", &identity.session_id);
        self.write_str_field("eventUUID", &event_id);
        self.write_str_field("eventTimestamp", &format_timestamp(timestamp));

        if let Some(version) = version {
            self.write_key("eventVersion");
            self.write_raw(version.to_string().as_bytes());
            self.write_raw(b",");
        }

        if include_identifiers {
            self.write_str_field("unityInstallationID", &identity.install_id);
            if let Some(player_id) = identity.player_id.as_deref().filter(|p| !p.is_empty()) {
                self.write_str_field("unityPlayerID", player_id);
            }
        }

        self.write_key("eventParams");
        self.write_raw(b"{");
        self.open = Some(Vec::new());
        Ok(())
    }

    pub fn push_scalar(&mut self, value: &ParamValue, name: Option<&str>) -> Result<(), BufferError> {
        self.check_key(name)?;
        if let Some(name) = name {
            self.write_key(name);
        }
        match value {
            ParamValue::F32(v) => self.write_float(*v, v.is_finite()),
            ParamValue::F64(v) => self.write_float(*v, v.is_finite()),
            ParamValue::I32(v) => self.write_raw(v.to_string().as_bytes()),
            ParamValue::I64(v) => self.write_raw(v.to_string().as_bytes()),
            ParamValue::Str(v) => self.write_str(v),
            ParamValue::Bool(v) => self.write_raw(if *v { b"true" } else { b"false" }),
        }
        self.write_raw(b",");
        Ok(())
    }

    pub fn push_f32(&mut self, value: f32, name: Option<&str>) -> Result<(), BufferError> {
        self.push_scalar(&ParamValue::F32(value), name)
    }

    pub fn push_f64(&mut self, value: f64, name: Option<&str>) -> Result<(), BufferError> {
        self.push_scalar(&ParamValue::F64(value), name)
    }

    pub fn push_i32(&mut self, value: i32, name: Option<&str>) -> Result<(), BufferError> {
        self.push_scalar(&ParamValue::I32(value), name)
    }

    pub fn push_i64(&mut self, value: i64, name: Option<&str>) -> Result<(), BufferError> {
        self.push_scalar(&ParamValue::I64(value), name)
    }

    pub fn push_str(&mut self, value: &str, name: Option<&str>) -> Result<(), BufferError> {
        self.check_key(name)?;
        if let Some(name) = name {
            self.write_key(name);
        }
        self.write_str(value);
        self.write_raw(b",");
        Ok(())
    }

    pub fn push_bool(&mut self, value: bool, name: Option<&str>) -> Result<(), BufferError> {
        self.push_scalar(&ParamValue::Bool(value), name)
    }

    pub fn push_timestamp(&mut self, value: &DateTime<FixedOffset>, name: &str) -> Result<(), BufferError> {
        self.check_key(Some(name))?;
        self.write_str_field(name, &format_timestamp(value));
        Ok(())
    }

    /// `name` must be given inside an object and omitted inside an array.
    pub fn push_object_start(&mut self, name: Option<&str>) -> Result<(), BufferError> {
        self.check_key(name)?;
        if let Some(name) = name {
            self.write_key(name);
        }
        self.write_raw(b"{");
        self.push_container(Container::Object);
        Ok(())
    }

    pub fn push_object_end(&mut self) -> Result<(), BufferError> {
        self.pop_container(Container::Object)?;
        self.strip_trailing_separator();
        self.write_raw(b"},");
        Ok(())
    }

    pub fn push_array_start(&mut self, name: &str) -> Result<(), BufferError> {
        self.check_key(Some(name))?;
        self.write_key(name);
        self.write_raw(b"[");
        self.push_container(Container::Array);
        Ok(())
    }

    pub fn push_array_end(&mut self) -> Result<(), BufferError> {
        self.pop_container(Container::Array)?;
        self.strip_trailing_separator();
        self.write_raw(b"],");
        Ok(())
    }

    pub fn end_event(&mut self) -> Result<(), BufferError> {
        match &self.open {
            None => return Err(BufferError::NoOpenEvent),
            Some(stack) if !stack.is_empty() => {
                return Err(BufferError::UnclosedContainer(stack.len()));
            }
            Some(_) => {}
        }

        self.strip_trailing_separator();
        // Close eventParams, close the event, separator for the next one.
        self.write_raw(b"}},");
        self.cursor = self.bytes.len();
        self.events_recorded += 1;
        self.open = None;
        Ok(())
    }

    /// Drops a partially written event.
    pub fn abandon_event(&mut self) {
        self.bytes.truncate(self.cursor);
        self.open = None;
    }

    // ---------------------------------------------------------------------
    // Snapshot / dispatch
    // ---------------------------------------------------------------------

    /// Captures every closed event without changing the buffer.
    /// `None` means there is nothing to send.
    pub fn snapshot(&self) -> Option<Token> {
        if self.events_recorded == 0 {
            return None;
        }
        Some(Token {
            events: self.bytes[HEADER.len()..self.cursor].to_vec(),
            count: self.events_recorded,
        })
    }

    /// Snapshot and continue: the captured events leave the live buffer,
    /// and later appends land directly after the header. An event being
    /// built at the time of the call is kept.
    pub fn checkout(&mut self) -> Option<Token> {
        let token = self.snapshot()?;
        self.bytes.drain(HEADER.len()..self.cursor);
        self.cursor = HEADER.len();
        self.events_recorded = 0;
        Some(token)
    }

    /// Puts a checked-out token back in front of everything appended since.
    pub fn merge(&mut self, token: Token) {
        if token.is_empty() {
            return;
        }
        let at = HEADER.len();
        let added = token.events.len();
        self.bytes.splice(at..at, token.events);
        self.cursor += added;
        self.events_recorded += token.count;
    }

    /// Loads a disk cache image. Cached events are placed ahead of anything
    /// already in the buffer. Returns the number of restored events.
    pub fn restore(&mut self, raw: &[u8]) -> Result<usize, BufferError> {
        let count = count_cached_events(raw)?;
        if count == 0 {
            return Ok(0);
        }
        self.merge(Token {
            events: raw[HEADER.len()..].to_vec(),
            count,
        });
        Ok(count)
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    /// Objects (`eventParams` included) take named members only, arrays take
    /// bare elements only.
    fn check_key(&self, name: Option<&str>) -> Result<(), BufferError> {
        let stack = self.open.as_ref().ok_or(BufferError::NoOpenEvent)?;
        let in_array = stack.last() == Some(&Container::Array);
        match (in_array, name) {
            (false, None) => Err(BufferError::KeyRequired),
            (true, Some(name)) => Err(BufferError::UnexpectedKey(name.to_string())),
            _ => Ok(()),
        }
    }

    fn push_container(&mut self, container: Container) {
        if let Some(stack) = self.open.as_mut() {
            stack.push(container);
        }
    }

    fn pop_container(&mut self, expected: Container) -> Result<(), BufferError> {
        let stack = self.open.as_mut().ok_or(BufferError::NoOpenEvent)?;
        match stack.last().copied() {
            Some(found) if found == expected => {
                stack.pop();
                Ok(())
            }
            Some(found) => Err(BufferError::MismatchedContainer {
                expected: found.label(),
                found: expected.label(),
            }),
            // Only eventParams is open; that one is closed by end_event.
            None => Err(BufferError::MismatchedContainer {
                expected: "eventParams",
                found: expected.label(),
            }),
        }
    }

    fn strip_trailing_separator(&mut self) {
        // Never reaches into the closed region: an open container always
        // starts with its own opening delimiter after the cursor.
        if self.bytes.len() > self.cursor && self.bytes.last() == Some(&b',') {
            self.bytes.pop();
        }
    }

    fn write_raw(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    fn write_str(&mut self, value: &str) {
        // Writing a str into a Vec cannot fail.
        let _ = serde_json::to_writer(&mut self.bytes, value);
    }

    fn write_key(&mut self, name: &str) {
        self.write_str(name);
        self.write_raw(b":");
    }

    fn write_str_field(&mut self, name: &str, value: &str) {
        self.write_key(name);
        self.write_str(value);
        self.write_raw(b",");
    }

    fn write_float(&mut self, value: impl std::fmt::Display, finite: bool) {
        // NaN and infinities have no JSON spelling.
        if finite {
            self.write_raw(value.to_string().as_bytes());
        } else {
            self.write_raw(b"null");
        }
    }
}

/// Validates a cache image (header, closed events, trailing separator) and
/// counts its events.
fn count_cached_events(raw: &[u8]) -> Result<usize, BufferError> {
    if !raw.starts_with(HEADER) {
        return Err(BufferError::CorruptCache("missing batch header".to_string()));
    }
    if raw.len() == HEADER.len() {
        return Ok(0);
    }
    let body = raw[HEADER.len()..]
        .strip_suffix(b",")
        .ok_or_else(|| BufferError::CorruptCache("missing trailing separator".to_string()))?;

    let mut doc = Vec::with_capacity(raw.len() + FOOTER.len());
    doc.extend_from_slice(HEADER);
    doc.extend_from_slice(body);
    doc.extend_from_slice(FOOTER);

    let parsed: serde_json::Value =
        serde_json::from_slice(&doc).map_err(|e| BufferError::CorruptCache(e.to_string()))?;
    parsed
        .get("eventList")
        .and_then(|list| list.as_array())
        .map(|list| list.len())
        .ok_or_else(|| BufferError::CorruptCache("eventList is not an array".to_string()))
}
