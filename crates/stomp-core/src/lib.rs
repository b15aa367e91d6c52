//! Client-side session engine for a STOMP 1.2 style game-channel protocol:
//! frame codec, subscription and receipt bookkeeping, and the per-channel
//! event store that backs summaries.

pub mod error;
pub mod event;
pub mod frame;
pub mod receipts;
pub mod session;
pub mod subscriptions;
pub mod summary;

pub use error::SessionError;
pub use event::{parse_events_file, Event, GameBatch};
pub use frame::{decode, Command, Frame, FrameError};
pub use session::{Dispatch, Session, SessionState, SharedSession};
