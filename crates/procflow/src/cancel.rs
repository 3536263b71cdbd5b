//! Graceful and forceful cancellation signals
//!
//! A [`CancellationToken`] is a one-shot, clonable signal. It is backed by an
//! `async_channel` that never carries a message: cancelling closes the channel,
//! which wakes every task parked in [`CancellationToken::cancelled`].
//!
//! A run accepts two independent tokens bundled in [`Cancellation`]:
//!
//! - the **graceful** token asks the process to stop cooperatively (SIGINT or
//!   Ctrl+C). Pumps keep running and the process may ignore the request.
//! - the **forceful** token kills the process tree, abandons all pumps and
//!   fails the run with [`Error::Cancelled`](crate::Error::Cancelled).

use async_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

/// A clonable, one-shot cancellation signal
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

struct Inner {
    sender: Sender<()>,
    receiver: Receiver<()>,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn cancel(&self) {
        if !self.sender.close() {
            return;
        }
        let children = match self.children.lock() {
            Ok(mut children) => std::mem::take(&mut *children),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

impl CancellationToken {
    /// Create a token that has not been cancelled
    pub fn new() -> Self {
        let (sender, receiver) = async_channel::bounded(1);
        Self {
            inner: Arc::new(Inner {
                sender,
                receiver,
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Signal cancellation. Calling this more than once has no further effect.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Returns true once [`cancel`](Self::cancel) has been called
    pub fn is_cancelled(&self) -> bool {
        self.inner.receiver.is_closed()
    }

    /// Wait until the token is cancelled
    pub async fn cancelled(&self) {
        // Nothing is ever sent, so recv only returns once the channel closes.
        let _ = self.inner.receiver.recv().await;
    }

    /// Create a token that is cancelled whenever this one is.
    ///
    /// Cancelling the child does not affect the parent.
    pub fn child_token(&self) -> CancellationToken {
        let child = CancellationToken::new();
        {
            let mut children = match self.inner.children.lock() {
                Ok(children) => children,
                Err(poisoned) => poisoned.into_inner(),
            };
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }
        // Covers a cancel that raced with the registration above.
        if self.is_cancelled() {
            child.cancel();
        }
        child
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Which cancellation signal ended a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancellationKind {
    /// The process was asked to stop and exited on its own
    Graceful,
    /// The process tree was killed
    Forceful,
}

impl fmt::Display for CancellationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancellationKind::Graceful => f.write_str("graceful"),
            CancellationKind::Forceful => f.write_str("forceful"),
        }
    }
}

/// The pair of cancellation inputs accepted by a run
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    /// Fires an interrupt request once; the run continues afterwards
    pub graceful: CancellationToken,
    /// Kills the process tree and fails the run
    pub forceful: CancellationToken,
}

impl Cancellation {
    /// Combine a forceful and a graceful token
    pub fn new(forceful: CancellationToken, graceful: CancellationToken) -> Self {
        Self { graceful, forceful }
    }

    /// Single-token form: the token maps to forceful cancellation only
    pub fn forceful(token: CancellationToken) -> Self {
        Self {
            graceful: CancellationToken::new(),
            forceful: token,
        }
    }

    /// Derive run-local tokens that follow this pair but can be cancelled
    /// without touching the caller's tokens.
    pub(crate) fn child(&self) -> Cancellation {
        Cancellation {
            graceful: self.graceful.child_token(),
            forceful: self.forceful.child_token(),
        }
    }

    /// The kind of cancellation that applies to a finished run, forceful first
    pub(crate) fn requested(&self) -> Option<CancellationKind> {
        if self.forceful.is_cancelled() {
            Some(CancellationKind::Forceful)
        } else if self.graceful.is_cancelled() {
            Some(CancellationKind::Graceful)
        } else {
            None
        }
    }
}
