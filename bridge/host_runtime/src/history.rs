//! Per-page navigation history.

use parking_lot::Mutex;

use crate::error::{BridgeError, Result};

/// Back/forward stack of locations with a cursor. Every operation is atomic
/// under the internal lock.
pub struct History {
    inner: Mutex<Entries>,
}

struct Entries {
    urls: Vec<String>,
    cursor: usize,
    limit: usize,
}

impl Entries {
    fn current(&self) -> Option<&str> {
        self.urls.get(self.cursor).map(String::as_str)
    }

    fn push(&mut self, url: String) {
        if !self.urls.is_empty() {
            self.urls.truncate(self.cursor + 1);
        }
        self.urls.push(url);

        if self.urls.len() > self.limit {
            let overflow = self.urls.len() - self.limit;
            self.urls.drain(..overflow);
        }
        self.cursor = self.urls.len() - 1;
    }

    fn can_previous(&self) -> bool {
        !self.urls.is_empty() && self.cursor > 0
    }

    fn can_next(&self) -> bool {
        !self.urls.is_empty() && self.cursor + 1 < self.urls.len()
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    /// History that keeps every entry.
    pub fn new() -> Self {
        Self::with_limit(usize::MAX)
    }

    /// History that keeps at most `limit` entries, dropping the oldest.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            inner: Mutex::new(Entries {
                urls: Vec::new(),
                cursor: 0,
                limit: limit.max(1),
            }),
        }
    }

    pub fn current(&self) -> Result<String> {
        self.inner
            .lock()
            .current()
            .map(str::to_string)
            .ok_or_else(|| BridgeError::not_found("current history entry"))
    }

    /// Drops every entry after the cursor, appends `url` and moves the cursor
    /// onto it.
    pub fn new_entry(&self, url: impl Into<String>) {
        self.inner.lock().push(url.into());
    }

    pub fn previous(&self) -> Result<String> {
        let mut entries = self.inner.lock();
        if !entries.can_previous() {
            return Err(BridgeError::not_found("previous history entry"));
        }

        entries.cursor -= 1;
        Ok(entries.urls[entries.cursor].clone())
    }

    pub fn next(&self) -> Result<String> {
        let mut entries = self.inner.lock();
        if !entries.can_next() {
            return Err(BridgeError::not_found("next history entry"));
        }

        entries.cursor += 1;
        Ok(entries.urls[entries.cursor].clone())
    }

    pub fn can_previous(&self) -> bool {
        self.inner.lock().can_previous()
    }

    pub fn can_next(&self) -> bool {
        self.inner.lock().can_next()
    }

    /// Entry before the cursor, without moving it.
    pub fn peek_previous(&self) -> Option<String> {
        let entries = self.inner.lock();
        entries
            .can_previous()
            .then(|| entries.urls[entries.cursor - 1].clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().urls.is_empty()
    }
}
