//! Subscription Tracking
//!
//! The set of instruments the application wants to stream. It survives
//! reconnects and is replayed verbatim whenever a new session opens, so it
//! is the single source of truth for what the broker should be sending.

use std::collections::BTreeSet;

use crate::domain::streaming::InstrumentToken;

/// Unique, order-insensitive set of subscribed instruments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet {
    tokens: BTreeSet<InstrumentToken>,
}

impl SubscriptionSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add tokens, returning only the ones that were not already present.
    pub fn add(&mut self, tokens: &[InstrumentToken]) -> Vec<InstrumentToken> {
        tokens
            .iter()
            .copied()
            .filter(|token| self.tokens.insert(*token))
            .collect()
    }

    /// Remove tokens, returning only the ones that were present.
    pub fn remove(&mut self, tokens: &[InstrumentToken]) -> Vec<InstrumentToken> {
        tokens
            .iter()
            .copied()
            .filter(|token| self.tokens.remove(token))
            .collect()
    }

    /// Whether the token is subscribed.
    #[must_use]
    pub fn contains(&self, token: InstrumentToken) -> bool {
        self.tokens.contains(&token)
    }

    /// Number of subscribed instruments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// All subscribed tokens in ascending order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<InstrumentToken> {
        self.tokens.iter().copied().collect()
    }
}

impl FromIterator<InstrumentToken> for SubscriptionSet {
    fn from_iter<I: IntoIterator<Item = InstrumentToken>>(iter: I) -> Self {
        Self {
            tokens: iter.into_iter().collect(),
        }
    }
}
