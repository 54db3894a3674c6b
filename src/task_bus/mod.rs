//! Task Bus (C3): per-user FIFO queues, long-poll dispatch, JWT/api_key
//! lifecycle, heartbeats, cancellation signalling.
//!
//! See spec §4.3. Grounded in `original_source/agent/main.py` (the
//! client-side contract this surface must satisfy) and the teacher's
//! `mcp::registry` for the per-key registry pattern.

mod auth;
mod bus;
mod errors;
mod queue;

pub use auth::{AuthRegistry, JWT_REFRESH_SKEW_SECS, JWT_TTL_SECS};
pub use bus::{RegisterRequest, RegisterResponse, TaskBus};
pub use errors::TaskBusError;
pub use queue::{PollNotifiers, LONG_POLL_TIMEOUT};
