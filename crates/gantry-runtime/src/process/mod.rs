//! Backend process lifecycle management.

mod error;
pub mod shutdown;
mod stream;
mod supervisor;
mod types;

pub use error::SpawnError;
pub use supervisor::BackendSupervisor;
pub use types::BackendSpec;
