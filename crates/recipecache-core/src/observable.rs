//! Replay-latest publish/subscribe.
//!
//! An `Observable` keeps its current value and a list of subscribers. A new
//! subscriber immediately receives the current value, then every later value
//! in the order it was set. Subscribers are independent: dropping one never
//! affects the others, and dropped subscribers are pruned on the next `set`.
//!
//! The owner mutates through `&mut self`, so an observable lives on whichever
//! task owns the state it publishes; only the subscriptions cross tasks.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

#[derive(Debug)]
pub struct Observable<T> {
    current: Option<T>,
    subscribers: Vec<mpsc::UnboundedSender<T>>,
}

impl<T> Default for Observable<T> {
    fn default() -> Self {
        Self {
            current: None,
            subscribers: Vec::new(),
        }
    }
}

impl<T: Clone> Observable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(value: T) -> Self {
        Self {
            current: Some(value),
            subscribers: Vec::new(),
        }
    }

    pub fn get(&self) -> Option<&T> {
        self.current.as_ref()
    }

    /// Publish a value to every live subscriber and retain it for late ones.
    pub fn set(&mut self, value: T) {
        self.subscribers.retain(|tx| tx.send(value.clone()).is_ok());
        self.current = Some(value);
    }

    pub fn subscribe(&mut self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(ref value) = self.current {
            // Receiver is alive, send can't fail
            let _ = tx.send(value.clone());
        }
        self.subscribers.push(tx);
        Subscription { rx }
    }
}

/// Receiving half of an [`Observable`]. Ends once the observable is dropped.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Next value if one is already queued.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Every value queued so far, oldest first.
    pub fn drain(&mut self) -> Vec<T> {
        let mut values = Vec::new();
        while let Ok(value) = self.rx.try_recv() {
            values.push(value);
        }
        values
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_late_subscriber_gets_current_value() {
        let mut obs = Observable::new();
        obs.set(1);
        obs.set(2);
        let mut sub = obs.subscribe();
        assert_eq!(sub.drain(), vec![2]);
    }

    #[test]
    fn test_ordered_delivery_to_independent_subscribers() {
        let mut obs = Observable::with_value("a");
        let mut first = obs.subscribe();
        obs.set("b");
        let mut second = obs.subscribe();
        obs.set("c");

        assert_eq!(first.drain(), vec!["a", "b", "c"]);
        assert_eq!(second.drain(), vec!["b", "c"]);
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let mut obs = Observable::new();
        let sub = obs.subscribe();
        let _kept = obs.subscribe();
        drop(sub);
        obs.set(7);
        assert_eq!(obs.subscribers.len(), 1);
        assert_eq!(obs.get(), Some(&7));
    }

    #[test]
    fn test_empty_observable_replays_nothing() {
        let mut obs: Observable<i32> = Observable::new();
        let mut sub = obs.subscribe();
        assert_eq!(sub.try_recv(), None);
    }
}
