//! Application boundary: the event types exchanged with the broker and
//! the **port traits** every platform adapter implements.
//!
//! Nothing in here touches hardware; the supervisor, session loop and
//! relay dispatcher are written against [`ports`] so they run unchanged
//! against the mocks in `tests/`.

pub mod events;
pub mod ports;
