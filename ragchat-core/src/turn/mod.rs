//! Turn and retry reduction
//!
//! Folds [`TurnEvent`](crate::types::TurnEvent)s into the renderable message
//! state of one session:
//!
//! ```text
//!          delta            final
//!   Idle ────────► Streaming ──────► Completed
//!    │  │                │  │
//!    │  └── final ───────┼──┼──────► Completed
//!    ├───── error ───────┴──┼──────► Failed
//!    └───── cancel ─────────┴──────► Canceled
//! ```
//!
//! A new turn reserves one placeholder entry when its first delta arrives and
//! swaps it for the authoritative message on `final`. A retry reuses the
//! existing assistant entry instead of reserving a new one. Terminal states
//! are final for the turn; a second retry is a new [`Turn`].

mod drive;
mod list;
mod state;

pub use drive::{drive_turn, TurnObserver};
pub use list::{ChatEntry, EntryStatus, MessageList};
pub use state::{Turn, TurnFailure, TurnKind, TurnOutcome, TurnState};
