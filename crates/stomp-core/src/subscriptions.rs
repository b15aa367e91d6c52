use crate::error::SessionError;
use std::collections::HashMap;

pub type SubscriptionId = u64;

/// Live channel subscriptions. Ids come from a counter that only moves on
/// success and never hands out the same id twice.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    next_id: SubscriptionId,
    channels: HashMap<String, SubscriptionId>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, channel: &str) -> Result<SubscriptionId, SessionError> {
        if self.channels.contains_key(channel) {
            return Err(SessionError::AlreadySubscribed {
                channel: channel.to_string(),
            });
        }
        self.next_id += 1;
        let id = self.next_id;
        self.channels.insert(channel.to_string(), id);
        Ok(id)
    }

    pub fn unsubscribe(&mut self, channel: &str) -> Result<SubscriptionId, SessionError> {
        self.channels
            .remove(channel)
            .ok_or_else(|| SessionError::NotSubscribed {
                channel: channel.to_string(),
            })
    }

    pub fn id_of(&self, channel: &str) -> Option<SubscriptionId> {
        self.channels.get(channel).copied()
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_increase_per_channel() {
        let mut registry = SubscriptionRegistry::new();
        assert_eq!(registry.subscribe("a_b").unwrap(), 1);
        assert_eq!(registry.subscribe("c_d").unwrap(), 2);
        assert_eq!(registry.id_of("a_b"), Some(1));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn duplicate_subscribe_fails_without_consuming_an_id() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe("a_b").unwrap();
        assert!(matches!(
            registry.subscribe("a_b"),
            Err(SessionError::AlreadySubscribed { .. })
        ));
        assert_eq!(registry.subscribe("c_d").unwrap(), 2);
    }

    #[test]
    fn ids_are_not_reused_after_unsubscribe() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe("a_b").unwrap();
        assert_eq!(registry.unsubscribe("a_b").unwrap(), 1);
        assert!(!registry.is_subscribed("a_b"));
        assert_eq!(registry.subscribe("a_b").unwrap(), 2);
    }

    #[test]
    fn unsubscribe_unknown_channel_fails() {
        let mut registry = SubscriptionRegistry::new();
        assert!(matches!(
            registry.unsubscribe("a_b"),
            Err(SessionError::NotSubscribed { .. })
        ));
        assert!(registry.is_empty());
    }
}
