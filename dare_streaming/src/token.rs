//! Completion watermarks shared between producers and the streaming worker.
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};

use crate::error::{Result, StreamingError};

/// Position in the total order of submitted work. `0` is always complete
pub type SyncToken = u64;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TokenStatus {
    /// The work behind the token may not have retired yet
    Pending,
    /// The work retired on the device
    Completed,
    /// The worker rejected the request. The token still counts as retired
    Invalid,
}

/// Number of most recent invalid tokens remembered. Older ones report [`TokenStatus::Completed`]
pub const INVALID_TOKEN_HISTORY: usize = 4096;

/// Bounded window of rejected tokens, oldest first
#[derive(Debug, Default)]
struct InvalidTokens {
    order: VecDeque<SyncToken>,
    set: HashSet<SyncToken>,
}

impl InvalidTokens {
    fn insert(&mut self, token: SyncToken) {
        if !self.set.insert(token) {
            return;
        }
        self.order.push_back(token);
        while self.order.len() > INVALID_TOKEN_HISTORY {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }
    }

    fn contains(&self, token: SyncToken) -> bool {
        self.set.contains(&token)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Watermark {
    completed: SyncToken,
    failure: Option<String>,
}

/// Tracks the issued and the retired watermark
///
/// Tokens are issued by the request queue and published by the worker once the resource set
/// that executed them retired. The retired watermark never decreases.
#[derive(Debug)]
pub struct TokenTracker {
    counter: AtomicU64,
    completed: AtomicU64,
    watermark: Mutex<Watermark>,
    condvar: Condvar,
    watch: tokio::sync::watch::Sender<Watermark>,
    invalid: Mutex<InvalidTokens>,
}

impl Default for TokenTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenTracker {
    pub fn new() -> Self {
        let (watch, _) = tokio::sync::watch::channel(Watermark::default());
        Self {
            counter: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            watermark: Mutex::new(Watermark::default()),
            condvar: Condvar::new(),
            watch,
            invalid: Mutex::new(InvalidTokens::default()),
        }
    }

    /// Hands out the next token. Callers serialize through the queue lock so issue order matches
    /// enqueue order
    pub(crate) fn issue(&self) -> SyncToken {
        self.counter.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Highest token handed out so far
    pub fn issued(&self) -> SyncToken {
        self.counter.load(Ordering::Acquire)
    }

    /// Highest token known to have retired
    pub fn last_completed(&self) -> SyncToken {
        self.completed.load(Ordering::Acquire)
    }

    /// Advances the retired watermark to `token` and wakes every waiter. Older values are ignored
    pub(crate) fn publish(&self, token: SyncToken) -> Result<()> {
        let mut watermark = self.watermark.lock()?;
        if token > watermark.completed {
            watermark.completed = token;
            self.completed.store(token, Ordering::Release);
            let snapshot = watermark.clone();
            self.watch.send_replace(snapshot);
        }
        self.condvar.notify_all();
        Ok(())
    }

    /// Latches a fatal failure. Every pending and future wait beyond the watermark errors out
    pub(crate) fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut watermark = match self.watermark.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if watermark.failure.is_none() {
            watermark.failure = Some(reason);
        }
        let snapshot = watermark.clone();
        self.watch.send_replace(snapshot);
        self.condvar.notify_all();
    }

    pub fn failure(&self) -> Option<String> {
        self.watermark.lock().ok().and_then(|w| w.failure.clone())
    }

    pub(crate) fn mark_invalid(&self, token: SyncToken) -> Result<()> {
        self.invalid.lock()?.insert(token);
        Ok(())
    }

    pub fn is_completed(&self, token: SyncToken) -> bool {
        self.last_completed() >= token
    }

    pub fn all_completed(&self) -> bool {
        self.is_completed(self.issued())
    }

    pub fn status(&self, token: SyncToken) -> Result<TokenStatus> {
        if !self.is_completed(token) {
            return Ok(TokenStatus::Pending);
        }
        if self.invalid.lock()?.contains(token) {
            Ok(TokenStatus::Invalid)
        } else {
            Ok(TokenStatus::Completed)
        }
    }

    /// Blocks until `token` retired
    pub fn wait(&self, token: SyncToken) -> Result<()> {
        let mut watermark = self.watermark.lock()?;
        loop {
            if watermark.completed >= token {
                return Ok(());
            }
            if let Some(reason) = &watermark.failure {
                return Err(StreamingError::DeviceLost(reason.clone()));
            }
            watermark = self.condvar.wait(watermark)?;
        }
    }

    pub fn wait_all(&self) -> Result<()> {
        self.wait(self.issued())
    }

    /// Resolves once `token` retired, without blocking the executor thread
    pub async fn wait_async(&self, token: SyncToken) -> Result<()> {
        let mut receiver = self.watch.subscribe();
        let watermark = receiver
            .wait_for(|w| w.completed >= token || w.failure.is_some())
            .await
            .map_err(|_| StreamingError::ShutDown)?;
        if watermark.completed >= token {
            return Ok(());
        }
        Err(StreamingError::DeviceLost(
            watermark.failure.clone().unwrap_or_default(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_publish_is_monotonic() {
        let tokens = TokenTracker::new();
        assert_eq!(tokens.issue(), 1);
        assert_eq!(tokens.issue(), 2);
        tokens.publish(2).unwrap();
        tokens.publish(1).unwrap();
        assert_eq!(tokens.last_completed(), 2);
        assert!(tokens.is_completed(1));
        assert!(tokens.all_completed());
    }

    #[test]
    fn test_zero_is_always_complete() {
        let tokens = TokenTracker::new();
        assert!(tokens.is_completed(0));
        tokens.wait(0).unwrap();
        tokens.wait_all().unwrap();
    }

    #[test]
    fn test_wait_wakes_on_publish() {
        let tokens = Arc::new(TokenTracker::new());
        let token = tokens.issue();
        let waiter = {
            let tokens = tokens.clone();
            std::thread::spawn(move || tokens.wait(token))
        };
        std::thread::sleep(Duration::from_millis(10));
        assert!(!waiter.is_finished());
        tokens.publish(token).unwrap();
        waiter.join().unwrap().unwrap();
    }

    #[test]
    fn test_failure_releases_waiters() {
        let tokens = Arc::new(TokenTracker::new());
        let first = tokens.issue();
        let second = tokens.issue();
        tokens.publish(first).unwrap();
        let waiter = {
            let tokens = tokens.clone();
            std::thread::spawn(move || tokens.wait(second))
        };
        tokens.fail("device lost");
        assert_eq!(
            waiter.join().unwrap(),
            Err(StreamingError::DeviceLost("device lost".to_string()))
        );
        // already retired work stays retired
        tokens.wait(first).unwrap();
        assert_eq!(tokens.failure().as_deref(), Some("device lost"));
    }

    #[test]
    fn test_status() {
        let tokens = TokenTracker::new();
        let good = tokens.issue();
        let bad = tokens.issue();
        let pending = tokens.issue();
        tokens.mark_invalid(bad).unwrap();
        tokens.publish(bad).unwrap();
        assert_eq!(tokens.status(good).unwrap(), TokenStatus::Completed);
        assert_eq!(tokens.status(bad).unwrap(), TokenStatus::Invalid);
        assert_eq!(tokens.status(pending).unwrap(), TokenStatus::Pending);
    }

    #[test]
    fn test_invalid_history_is_bounded() {
        let tokens = TokenTracker::new();
        let count = INVALID_TOKEN_HISTORY as u64 + 10;
        for _ in 0..count {
            let token = tokens.issue();
            tokens.mark_invalid(token).unwrap();
        }
        tokens.publish(count).unwrap();
        assert_eq!(tokens.invalid.lock().unwrap().order.len(), INVALID_TOKEN_HISTORY);
        assert_eq!(tokens.invalid.lock().unwrap().set.len(), INVALID_TOKEN_HISTORY);
        // the oldest rejections fell out of the window
        assert_eq!(tokens.status(1).unwrap(), TokenStatus::Completed);
        assert_eq!(tokens.status(10).unwrap(), TokenStatus::Completed);
        assert_eq!(tokens.status(11).unwrap(), TokenStatus::Invalid);
        assert_eq!(tokens.status(count).unwrap(), TokenStatus::Invalid);
    }

    #[tokio::test]
    async fn test_wait_async() {
        let tokens = Arc::new(TokenTracker::new());
        let token = tokens.issue();
        let publisher = {
            let tokens = tokens.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                tokens.publish(token)
            })
        };
        tokens.wait_async(token).await.unwrap();
        publisher.join().unwrap().unwrap();

        let next = tokens.issue();
        tokens.fail("gone");
        assert!(matches!(
            tokens.wait_async(next).await,
            Err(StreamingError::DeviceLost(_))
        ));
    }
}
