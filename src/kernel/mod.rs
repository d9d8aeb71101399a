pub mod consent;
pub mod dispatcher;
pub mod reactor;
pub mod scheduler;
pub mod telemetry;
pub mod time;
