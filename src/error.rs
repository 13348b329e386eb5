// src/error.rs
use std::{io, path::PathBuf};

use thiserror::Error;

use crate::scheduler::TriggerError;

/// Failure taxonomy shared by the fetch, parse and persistence layers.
///
/// `Fetch`/`HttpStatus` are retried on the next cycle, `Parse` skips the
/// affected world for one cycle, `Persistence` aborts the batch (nothing
/// from it becomes visible) and `Config` is only raised at startup.
/// `Trigger` and `Spawn` come from driving the scheduler.
#[derive(Debug, Error)]
pub enum Error {
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("parse failed: {0}")]
    Parse(String),

    #[error("persistence failed at {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Trigger(#[from] TriggerError),

    #[error("cannot start {what} thread: {source}")]
    Spawn {
        what: &'static str,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn fetch(url: &str, reason: impl ToString) -> Self {
        Error::Fetch { url: s!(url), reason: reason.to_string() }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }

    pub fn persistence(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Persistence { path: path.into(), source }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn spawn(what: &'static str, source: io::Error) -> Self {
        Error::Spawn { what, source }
    }

    /// Network-level failures: expected now and then, retried after a backoff.
    pub fn is_fetch(&self) -> bool {
        matches!(self, Error::Fetch { .. } | Error::HttpStatus { .. })
    }
}
