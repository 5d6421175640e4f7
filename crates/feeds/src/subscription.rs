//! Subscription table: the keyed registry of per-symbol subscriptions.
//!
//! Invariants enforced here:
//! - at most one active subscription per symbol per connection;
//! - no subscription outlives its connection (`clear` on disconnect);
//! - a confirmation arriving after `unsubscribe` never re-adds a handle.

use dashmap::DashMap;
use std::collections::HashSet;
use tickfeed_core::Symbol;
use tracing::{debug, info};

use crate::topic::stock_topic;
use crate::transport::{SubscriptionHandle, Transport};
use crate::FeedError;

/// Status of a single subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubscriptionStatus {
    /// Subscribe frame sent, confirmation not yet received.
    #[default]
    Pending,
    /// Server confirmed the subscription.
    Active,
}

#[derive(Debug, Clone)]
struct SubscriptionEntry {
    handle: SubscriptionHandle,
    status: SubscriptionStatus,
}

/// Counts from a [`SubscriptionTable::reconcile`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Symbols newly subscribed.
    pub subscribed: usize,
    /// Symbols unsubscribed.
    pub unsubscribed: usize,
    /// Symbols already subscribed and left untouched.
    pub unchanged: usize,
}

/// Maps symbols to their active subscription handles.
///
/// All subscribe/unsubscribe frames on the shared connection go through
/// this table; nothing else touches transport subscriptions.
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    entries: DashMap<Symbol, SubscriptionEntry>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Subscribe `symbol` if no handle exists for it yet.
    ///
    /// Returns true if a new subscription was created, false when the
    /// symbol was already present (a structural no-op, never an error).
    pub async fn ensure_subscribed(
        &self,
        transport: &dyn Transport,
        symbol: &Symbol,
    ) -> Result<bool, FeedError> {
        if self.entries.contains_key(symbol) {
            return Ok(false);
        }

        let handle = transport.subscribe(&stock_topic(symbol)).await?;

        // A concurrent caller may have won the race while the subscribe
        // frame was in flight; keep their entry and release ours.
        let duplicate = {
            match self.entries.entry(symbol.clone()) {
                dashmap::mapref::entry::Entry::Occupied(_) => true,
                dashmap::mapref::entry::Entry::Vacant(vacant) => {
                    vacant.insert(SubscriptionEntry {
                        handle,
                        status: SubscriptionStatus::Pending,
                    });
                    false
                }
            }
        };
        if duplicate {
            let _ = transport.unsubscribe(handle).await;
            return Ok(false);
        }

        debug!(%symbol, handle, "subscribed");
        Ok(true)
    }

    /// Remove and release the handle for `symbol` if present.
    ///
    /// Returns true if a subscription was released, false if none existed.
    pub async fn unsubscribe(
        &self,
        transport: &dyn Transport,
        symbol: &Symbol,
    ) -> Result<bool, FeedError> {
        let Some((_, entry)) = self.entries.remove(symbol) else {
            return Ok(false);
        };
        transport.unsubscribe(entry.handle).await?;
        debug!(%symbol, handle = entry.handle, "unsubscribed");
        Ok(true)
    }

    /// Bring the table in line with the full current watchlist: subscribe
    /// what is missing, release what is no longer displayed, leave the
    /// intersection untouched.
    pub async fn reconcile(
        &self,
        transport: &dyn Transport,
        watchlist: &HashSet<Symbol>,
    ) -> Result<ReconcileOutcome, FeedError> {
        let current: Vec<Symbol> = self.symbols();

        let mut outcome = ReconcileOutcome::default();

        for symbol in &current {
            if !watchlist.contains(symbol) && self.unsubscribe(transport, symbol).await? {
                outcome.unsubscribed += 1;
            }
        }
        for symbol in watchlist {
            if self.ensure_subscribed(transport, symbol).await? {
                outcome.subscribed += 1;
            } else {
                outcome.unchanged += 1;
            }
        }

        info!(
            subscribed = outcome.subscribed,
            unsubscribed = outcome.unsubscribed,
            unchanged = outcome.unchanged,
            "watchlist reconciled"
        );
        Ok(outcome)
    }

    /// Apply a server subscribe confirmation.
    ///
    /// Only takes effect if the symbol is still a member; a confirmation
    /// racing an unsubscribe is dropped (returns false).
    pub fn confirm(&self, symbol: &Symbol) -> bool {
        match self.entries.get_mut(symbol) {
            Some(mut entry) => {
                entry.status = SubscriptionStatus::Active;
                true
            }
            None => false,
        }
    }

    /// Re-issue subscribe frames for every current member. Used after the
    /// transport reconnects, when server-side state is gone but the
    /// watchlist is not. Returns the number of symbols resubscribed.
    pub async fn resubscribe_all(&self, transport: &dyn Transport) -> Result<usize, FeedError> {
        let symbols = self.symbols();
        for symbol in &symbols {
            // The old handle is stale once the connection dropped; release
            // it so the transport never tracks two handles for one symbol.
            let stale = self.entries.get(symbol).map(|e| e.handle);
            if let Some(stale) = stale {
                let _ = transport.unsubscribe(stale).await;
            }
            let handle = transport.subscribe(&stock_topic(symbol)).await?;
            self.entries.insert(
                symbol.clone(),
                SubscriptionEntry {
                    handle,
                    status: SubscriptionStatus::Pending,
                },
            );
        }
        if !symbols.is_empty() {
            info!(count = symbols.len(), "resubscribed after reconnect");
        }
        Ok(symbols.len())
    }

    /// Drop every entry. The handles are already invalid once the
    /// connection is gone.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.entries.contains_key(symbol)
    }

    /// Status for a symbol, if subscribed.
    pub fn status(&self, symbol: &Symbol) -> Option<SubscriptionStatus> {
        self.entries.get(symbol).map(|e| e.status)
    }

    /// Snapshot of the current members, in no particular order.
    pub fn symbols(&self) -> Vec<Symbol> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
