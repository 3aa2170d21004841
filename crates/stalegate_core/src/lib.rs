//! Request coordination and serving for the stale-while-revalidate proxy.
//!
//! - [`coordinator`]: per-request state machine (serve stale + refresh, or
//!   wait for the origin).
//! - [`master`]: listener, accept loop and graceful shutdown.
//! - [`worker`]: one hyper HTTP/1.1 connection.

pub mod coordinator;
pub mod master;
pub mod worker;

pub use coordinator::Coordinator;
pub use master::Master;
