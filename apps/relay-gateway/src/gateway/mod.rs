pub mod bridge;
pub mod client;
pub mod events;
pub mod handle;
pub mod hooks;
pub mod registry;
pub mod server;
pub mod shell;
pub mod waiting;

pub use handle::{CloseReason, ConnectionHandle, Handle};
pub use hooks::{LifecycleHooks, LoggingHooks};
pub use registry::{ConnectionRegistry, Registration};
pub use shell::Gateway;
