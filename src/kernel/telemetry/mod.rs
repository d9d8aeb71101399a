//! Event buffering and batch serialization.
//!
//! # ORDERING INVARIANT
//! Events leave the buffer in the order they were closed. A batch that fails
//! to upload is merged back ahead of anything recorded while it was in
//! flight, so retries never reorder or duplicate events.
//!
//! # VALIDITY INVARIANT
//! The closed region of the buffer plus its footer is always a well-formed
//! batch document. Partially written events never leave the buffer.

pub mod buffer;
pub mod event;
pub mod metrics;
pub mod recorder;

pub use buffer::{EventBuffer, Identity, SharedBuffer, Token};
pub use event::{Event, ParamValue};
pub use metrics::DispatchStats;
pub use recorder::Recorder;
