//! The register-based virtual machine.

pub mod dispatch;
pub mod frame;
pub mod verify;
pub mod wait;

pub use dispatch::{Context, RunResult, Status};
pub use frame::Frame;
pub use wait::{PendingWait, Wait};
