// SPDX-License-Identifier: GPL-3.0-only

//! Weak token tables for native callbacks
//!
//! The native side only ever sees an integer token as its callback context.
//! Dispatch resolves the token here; a revoked token, or one whose target has
//! been dropped, resolves to `None` instead of touching freed memory.

use crate::sync::lock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Identifier handed to the native side as a callback context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(u64);

impl Token {
    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// Arena of tokens mapped to optional live instances
pub struct TokenTable<T> {
    next: AtomicU64,
    entries: Mutex<HashMap<u64, Weak<T>>>,
}

impl<T> TokenTable<T> {
    pub fn new() -> Self {
        Self {
            // Zero is never issued so a null context can't resolve
            next: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Register a weak reference; tokens are never reused
    pub fn register(&self, target: &Arc<T>) -> Token {
        let raw = self.next.fetch_add(1, Ordering::Relaxed);
        lock(&self.entries).insert(raw, Arc::downgrade(target));
        Token(raw)
    }

    /// Resolve a token to its live target
    pub fn resolve(&self, token: Token) -> Option<Arc<T>> {
        let mut entries = lock(&self.entries);
        let target = entries.get(&token.0)?.upgrade();
        if target.is_none() {
            // Target dropped without revoking; forget it
            entries.remove(&token.0);
        }
        target
    }

    /// Forget a token; later resolves return `None`
    pub fn revoke(&self, token: Token) -> bool {
        lock(&self.entries).remove(&token.0).is_some()
    }

    /// Number of registered tokens
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for TokenTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Strongly held values taken exactly once by a callback
///
/// Used for one-shot native requests (photo capture, permission prompts)
/// where nothing else keeps the pending state alive.
pub struct OneShotTable<T> {
    next: AtomicU64,
    entries: Mutex<HashMap<u64, T>>,
}

impl<T> OneShotTable<T> {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, value: T) -> Token {
        let raw = self.next.fetch_add(1, Ordering::Relaxed);
        lock(&self.entries).insert(raw, value);
        Token(raw)
    }

    /// Remove and return the value; a second take returns `None`
    pub fn take(&self, token: Token) -> Option<T> {
        lock(&self.entries).remove(&token.0)
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for OneShotTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_live_target() {
        let table = TokenTable::new();
        let value = Arc::new(7);
        let token = table.register(&value);
        assert_eq!(table.resolve(token).as_deref(), Some(&7));
    }

    #[test]
    fn test_dropped_target_resolves_to_none() {
        let table = TokenTable::new();
        let value = Arc::new(String::from("device"));
        let token = table.register(&value);
        drop(value);
        assert!(table.resolve(token).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_revoked_and_unknown_tokens() {
        let table = TokenTable::new();
        let value = Arc::new(1u8);
        let token = table.register(&value);
        assert!(table.revoke(token));
        assert!(!table.revoke(token));
        assert!(table.resolve(token).is_none());
        assert!(table.resolve(Token::from_raw(0)).is_none());
    }

    #[test]
    fn test_one_shot_take_once() {
        let table = OneShotTable::new();
        let token = table.insert("photo");
        assert_eq!(table.take(token), Some("photo"));
        assert_eq!(table.take(token), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_tokens_are_never_reused() {
        let table = TokenTable::new();
        let value = Arc::new(());
        let first = table.register(&value);
        table.revoke(first);
        let second = table.register(&value);
        assert_ne!(first, second);
    }
}
