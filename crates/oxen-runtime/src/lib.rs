//! The processing runtime: Adaptive Poller, Dispatcher, Job Supervisor,
//! Stuck-job Recoverer, and the `Controller` composition root that wires
//! them together per `job_type`.

mod controller;
mod dispatcher;
mod poller;
mod recoverer;
mod supervisor;

pub use controller::{Controller, ProcessorSpec};
pub use dispatcher::DispatcherStatus;
pub use poller::Poller;
