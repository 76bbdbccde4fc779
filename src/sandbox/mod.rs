//! Execution sandbox: worker processes, the channel protocol and the
//! worker-side host emulation.

pub mod invoker;
pub mod message;
pub mod runner;
pub mod worker;

pub use invoker::SandboxInvoker;
pub use message::Message;
pub use runner::{ProcessRunner, WorkerPool, WorkerStatus};
pub use worker::{HostSession, execute_addon, search_paths};
