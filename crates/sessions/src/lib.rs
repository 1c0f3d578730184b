//! Session lifecycle for sessiongate.
//!
//! A session is created when a client completes the `initialize` handshake
//! and lives until the client tears it down, its transport closes, or it sits
//! idle past the configured lifetime.  This crate holds:
//!
//! - [`Session`]: id, bound transport, typed data bag, activity timestamp and
//!   the initialization gate.
//! - [`SessionStore`]: the in-process registry.  Pure data structure; it never
//!   closes transports or runs hooks.
//! - [`SessionLifecycle`]: runs the start/end hooks and owns the single
//!   teardown path shared by DELETE, transport close and expiry.
//! - [`ExpirySweeper`]: reclaims idle sessions through that teardown path.

pub mod gate;
pub mod lifecycle;
pub mod session;
pub mod store;
pub mod sweeper;

#[cfg(test)]
pub(crate) mod test_support;

pub use gate::{InitGate, InitState, InitTicket};
pub use lifecycle::{EndReason, SessionHooks, SessionLifecycle, START_HOOK_TIMED_OUT};
pub use session::{DataKey, Session, SessionData};
pub use store::SessionStore;
pub use sweeper::{ExpirySweeper, SweepReport};
