//! Subscription registry.

use std::collections::HashMap;

use crate::id::{SubscriptionId, UserToken};

/// One registered subscription.
///
/// `active` is false when the backend refused it; inactive subscriptions are
/// retried by the next explicit subscribe and skipped on terminate.
#[derive(Debug, Clone)]
pub struct Subscription<P> {
    id: SubscriptionId,
    params: P,
    active: bool,
    token: UserToken,
}

impl<P> Subscription<P> {
    pub(crate) fn new(id: SubscriptionId, params: P, token: UserToken) -> Self {
        Self {
            id,
            params,
            active: false,
            token,
        }
    }

    /// Subscription id.
    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    /// Parameters supplied by the application.
    pub fn params(&self) -> &P {
        &self.params
    }

    /// Whether the backend accepted the subscription.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Token passed to the backend on subscribe.
    pub fn token(&self) -> UserToken {
        self.token
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }
}

/// Subscriptions keyed by id, iterated in registration order.
pub(crate) struct Registry<P> {
    by_id: HashMap<SubscriptionId, Subscription<P>>,
    order: Vec<SubscriptionId>,
}

impl<P> Registry<P> {
    pub(crate) fn new() -> Self {
        Self {
            by_id: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub(crate) fn get(&self, id: &SubscriptionId) -> Option<&Subscription<P>> {
        self.by_id.get(id)
    }

    /// Inserts a subscription. An existing entry with the same id is replaced
    /// in place, keeping its position.
    pub(crate) fn insert(&mut self, sub: Subscription<P>) {
        let id = sub.id.clone();
        if self.by_id.insert(id.clone(), sub).is_none() {
            self.order.push(id);
        }
    }

    pub(crate) fn remove(&mut self, id: &SubscriptionId) -> Option<Subscription<P>> {
        let removed = self.by_id.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(removed)
    }

    pub(crate) fn ids(&self) -> Vec<SubscriptionId> {
        self.order.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn clear(&mut self) {
        self.by_id.clear();
        self.order.clear();
    }
}
