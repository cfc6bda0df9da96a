// src/output/broadcaster.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::stream::{self, Stream};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::engine::{Generation, TaskState};
use crate::output::waiter::{waiter_for, ChangeWaiter};
use crate::types::WatchMode;

/// Sent to a subscriber when no run has produced output yet.
pub const NO_OUTPUT_MESSAGE: &str = "No verification output available. Start a run first.";

/// Fans the output buffer out to any number of independent readers.
///
/// Readers never write and share no cursor; each subscription owns its own
/// file handle and replays from byte 0.
#[derive(Debug, Clone)]
pub struct OutputBroadcaster {
    path: PathBuf,
    state: watch::Receiver<TaskState>,
    mode: WatchMode,
    poll: Duration,
}

impl OutputBroadcaster {
    pub fn new(
        path: impl Into<PathBuf>,
        state: watch::Receiver<TaskState>,
        mode: WatchMode,
        poll: Duration,
    ) -> Self {
        Self {
            path: path.into(),
            state,
            mode,
            poll,
        }
    }

    /// Open a new subscription.
    ///
    /// The subscription follows the run that is live right now (if any) and
    /// ends once that run is over and the buffer is drained. A run started
    /// later is not followed: it truncates the buffer.
    pub async fn subscribe(&self) -> OutputSubscription {
        // Read the state before opening the file, so a run that finishes in
        // between is still replayed to the end.
        let generation = self.state.borrow().generation();

        let file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) => {
                debug!(path = ?self.path, error = %e, "no output buffer to replay");
                return OutputSubscription {
                    phase: Phase::Missing,
                };
            }
        };

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let waiter = match generation {
            Some(_) => Some(waiter_for(self.mode, dir, self.poll)),
            None => None,
        };

        debug!(path = ?self.path, generation, "output subscription opened");
        OutputSubscription {
            phase: Phase::Reading(Tail {
                reader: BufReader::new(file),
                pending: Vec::new(),
                generation,
                state: self.state.clone(),
                waiter,
                finishing: generation.is_none(),
            }),
        }
    }
}

/// One reader of the output buffer.
pub struct OutputSubscription {
    phase: Phase,
}

enum Phase {
    Missing,
    Reading(Tail),
    Done,
}

struct Tail {
    reader: BufReader<File>,
    /// Bytes of a line whose newline has not been written yet.
    pending: Vec<u8>,
    generation: Option<Generation>,
    state: watch::Receiver<TaskState>,
    waiter: Option<Box<dyn ChangeWaiter>>,
    /// Set once the followed run is over: read to EOF once more, then stop.
    finishing: bool,
}

impl Tail {
    fn still_live(&self) -> bool {
        self.generation.is_some() && self.state.borrow().generation() == self.generation
    }

    async fn next_line(&mut self) -> Option<String> {
        loop {
            match self.reader.read_until(b'\n', &mut self.pending).await {
                Ok(_) if self.pending.ends_with(b"\n") => return Some(self.take_line()),
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "error reading output buffer; ending subscription");
                    return None;
                }
            }

            // At EOF, possibly mid-line.
            if self.finishing {
                return (!self.pending.is_empty()).then(|| self.take_line());
            }

            if self.still_live() {
                if let Some(waiter) = &self.waiter {
                    waiter.wait().await;
                }
            } else {
                self.finishing = true;
            }
        }
    }

    fn take_line(&mut self) -> String {
        let mut end = self.pending.len();
        while end > 0 && matches!(self.pending[end - 1], b'\n' | b'\r') {
            end -= 1;
        }
        let line = String::from_utf8_lossy(&self.pending[..end]).into_owned();
        self.pending.clear();
        line
    }
}

impl OutputSubscription {
    /// Next line of output, without its line terminator. `None` once the
    /// subscription is over.
    pub async fn next_line(&mut self) -> Option<String> {
        match &mut self.phase {
            Phase::Missing => {
                self.phase = Phase::Done;
                Some(NO_OUTPUT_MESSAGE.to_string())
            }
            Phase::Reading(tail) => {
                let line = tail.next_line().await;
                if line.is_none() {
                    self.phase = Phase::Done;
                }
                line
            }
            Phase::Done => None,
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = String> + Send {
        stream::unfold(self, |mut sub| async move {
            let line = sub.next_line().await?;
            Some((line, sub))
        })
    }
}
