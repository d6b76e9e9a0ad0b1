//!
//! concord-std-channels - Handoff Channels
//!
//! A `Channel` moves items from producers to consumers exactly once:
//! - `put(item)` - hand over, blocking until accepted
//! - `offer(item, timeout)` - timed hand over; the item comes back on failure
//! - `take()` - receive, blocking until an item arrives
//! - `poll(timeout)` - timed receive; `Ok(None)` on timeout
//! - `peek()` - look at the next item without removing it (`Peek` trait)
//!
//! ## Realizations
//!
//! - `SynchronousChannel` - no capacity; every put meets exactly one take
//! - `LinkedQueue` - unbounded; consumers spin-yield while it is empty
//! - `BoundedBuffer` - fixed capacity; both sides park on conditions
//!

pub mod bounded;
pub mod channel;
pub mod linked_queue;
pub mod synchronous;

pub use bounded::*;
pub use channel::*;
pub use linked_queue::*;
pub use synchronous::*;
