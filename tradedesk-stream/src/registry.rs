//! Subscription registry: the caller's desired channel subscriptions
//!
//! The registry is never told about disconnects. It records intent, sends
//! immediately when the connection happens to be live, and replays every
//! entry in insertion order each time the connection becomes live again.

use indexmap::IndexMap;
use tracing::{debug, info};

use tradedesk_core::{Channel, ClientFrame, Subscription};

/// Where subscription frames are delivered
pub trait FrameSink {
    fn is_live(&self) -> bool;

    /// Best-effort send; returns whether the frame was written
    fn send_frame(&mut self, frame: &ClientFrame) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    /// Channel -> subscription, in first-subscribed order
    entries: IndexMap<Channel, Subscription>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace) a channel subscription, sending it if live
    ///
    /// Re-subscribing replaces the symbol set and keeps the channel's
    /// original position in replay order. Returns whether a frame was sent.
    pub fn subscribe<S>(&mut self, subscription: Subscription, sink: &mut S) -> bool
    where
        S: FrameSink + ?Sized,
    {
        let frame = ClientFrame::subscribe(&subscription);
        if let Some(previous) = self
            .entries
            .insert(subscription.channel.clone(), subscription)
        {
            debug!(
                "[Registry] Replacing subscription for {} (was {:?})",
                previous.channel, previous.symbols
            );
        }

        sink.is_live() && sink.send_frame(&frame)
    }

    /// Drop a channel subscription, sending an unsubscribe if live
    ///
    /// Unknown channels are ignored. Returns whether an entry was removed.
    pub fn unsubscribe<S>(&mut self, channel: &Channel, sink: &mut S) -> bool
    where
        S: FrameSink + ?Sized,
    {
        if self.entries.shift_remove(channel).is_none() {
            debug!("[Registry] No subscription for {}, nothing to remove", channel);
            return false;
        }

        if sink.is_live() {
            sink.send_frame(&ClientFrame::unsubscribe(channel));
        }
        true
    }

    /// Send a subscribe frame for every entry, in insertion order
    pub fn replay_all<S>(&self, sink: &mut S) -> usize
    where
        S: FrameSink + ?Sized,
    {
        let sent = self
            .entries
            .values()
            .filter(|subscription| sink.send_frame(&ClientFrame::subscribe(subscription)))
            .count();

        if !self.entries.is_empty() {
            info!(
                "[Registry] Replayed {}/{} subscriptions",
                sent,
                self.entries.len()
            );
        }
        sent
    }

    pub fn get(&self, channel: &Channel) -> Option<&Subscription> {
        self.entries.get(channel)
    }

    pub fn contains(&self, channel: &Channel) -> bool {
        self.entries.contains_key(channel)
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct VecSink {
        live: bool,
        frames: Vec<ClientFrame>,
    }

    impl FrameSink for VecSink {
        fn is_live(&self) -> bool {
            self.live
        }

        fn send_frame(&mut self, frame: &ClientFrame) -> bool {
            if !self.live {
                return false;
            }
            self.frames.push(frame.clone());
            true
        }
    }

    fn live() -> VecSink {
        VecSink {
            live: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_subscribe_while_offline_records_only() {
        let mut registry = SubscriptionRegistry::new();
        let mut sink = VecSink::default();

        let sent = registry.subscribe(Subscription::new("prices", Some(["EUR_USD"])), &mut sink);
        assert!(!sent);
        assert!(sink.frames.is_empty());
        assert!(registry.contains(&Channel::new("prices")));
    }

    #[test]
    fn test_subscribe_while_live_sends() {
        let mut registry = SubscriptionRegistry::new();
        let mut sink = live();

        registry.subscribe(Subscription::all("positions"), &mut sink);
        assert_eq!(
            sink.frames,
            vec![ClientFrame::Subscribe {
                channel: Channel::new("positions"),
                symbols: None,
            }]
        );
    }

    #[test]
    fn test_resubscribe_replaces_symbols_not_union() {
        let mut registry = SubscriptionRegistry::new();
        let mut sink = VecSink::default();

        registry.subscribe(Subscription::new("prices", Some(["EUR_USD"])), &mut sink);
        registry.subscribe(Subscription::all("positions"), &mut sink);
        registry.subscribe(Subscription::new("prices", Some(["US30"])), &mut sink);

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.get(&Channel::new("prices")).unwrap().symbols,
            Some(vec!["US30".to_string()])
        );
        // Replacement keeps the original slot
        assert_eq!(
            registry.channels(),
            vec![Channel::new("prices"), Channel::new("positions")]
        );
    }

    #[test]
    fn test_identical_subscribe_twice_is_idempotent() {
        let mut registry = SubscriptionRegistry::new();
        let mut sink = live();
        let sub = Subscription::new("prices", Some(["EUR_USD"]));

        registry.subscribe(sub.clone(), &mut sink);
        registry.subscribe(sub.clone(), &mut sink);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&sub.channel), Some(&sub));
        assert_eq!(sink.frames.len(), 2);
    }

    #[test]
    fn test_unsubscribe_unknown_is_noop() {
        let mut registry = SubscriptionRegistry::new();
        let mut sink = live();

        assert!(!registry.unsubscribe(&Channel::new("prices"), &mut sink));
        assert!(sink.frames.is_empty());
    }

    #[test]
    fn test_unsubscribe_sends_when_live() {
        let mut registry = SubscriptionRegistry::new();
        let mut sink = live();
        registry.subscribe(Subscription::all("prices"), &mut sink);

        assert!(registry.unsubscribe(&Channel::new("prices"), &mut sink));
        assert!(registry.is_empty());
        assert_eq!(
            sink.frames.last(),
            Some(&ClientFrame::Unsubscribe {
                channel: Channel::new("prices")
            })
        );
    }

    #[test]
    fn test_replay_all_in_insertion_order() {
        let mut registry = SubscriptionRegistry::new();
        let mut offline = VecSink::default();
        registry.subscribe(Subscription::new("prices", Some(["EUR_USD"])), &mut offline);
        registry.subscribe(Subscription::all("positions"), &mut offline);
        registry.subscribe(Subscription::all("news"), &mut offline);
        registry.unsubscribe(&Channel::new("positions"), &mut offline);

        let mut sink = live();
        let sent = registry.replay_all(&mut sink);

        assert_eq!(sent, 2);
        let channels: Vec<&str> = sink.frames.iter().map(|f| f.channel().as_str()).collect();
        assert_eq!(channels, vec!["prices", "news"]);
    }
}
