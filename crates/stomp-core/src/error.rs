use crate::frame::FrameError;
use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced to the user. None of them ends the session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("already subscribed to {channel}")]
    AlreadySubscribed { channel: String },
    #[error("not subscribed to {channel}")]
    NotSubscribed { channel: String },
    #[error("not logged in")]
    NotLoggedIn,
    #[error("user is already logged in")]
    AlreadyLoggedIn,
    #[error("logout already in progress")]
    LogoutInProgress,
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] FrameError),
    #[error("could not write {}: {source}", path.display())]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse events file {}: {reason}", path.display())]
    ParseFailure { path: PathBuf, reason: String },
    #[error("no events reported by {user} for {game}")]
    NoEvents { game: String, user: String },
}
