pub mod config;
pub mod error;
pub mod kernel;
pub mod services;
pub mod storage;

// Re-export specific items for convenient access
pub use config::BeaconConfig;
pub use kernel::consent::{ConsentGate, ConsentTracker};
pub use kernel::dispatcher::{Dispatcher, FlushOutcome};
pub use kernel::reactor::Reactor;
pub use kernel::telemetry::{Event, ParamValue, Recorder};
