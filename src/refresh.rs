//! Refresh sources and their fan-in.
//!
//! The container redraws whenever any of its sources fires: the periodic
//! ticker (or a caller supplied manual source in its place) and the forced
//! refreshes requested by completing bars. [`fan_in`] merges such sources into
//! one stream that closes once shutdown is signalled.

use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

/// Wait until `shutdown` turns true or its sender goes away.
pub(crate) async fn signalled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Merge `sources` into a single stream.
///
/// One forwarding task per source relays values until shutdown is signalled
/// or its source closes. The merged stream closes when every forwarder has
/// exited. Must be called within a Tokio runtime.
pub fn fan_in<T>(shutdown: watch::Receiver<bool>, sources: Vec<mpsc::Receiver<T>>) -> mpsc::Receiver<T>
where
    T: Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);
    for mut source in sources {
        let tx = tx.clone();
        let mut shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let value = tokio::select! {
                    biased;
                    _ = signalled(&mut shutdown) => return,
                    value = source.recv() => match value {
                        Some(value) => value,
                        None => return,
                    },
                };
                tokio::select! {
                    biased;
                    _ = signalled(&mut shutdown) => return,
                    sent = tx.send(value) => if sent.is_err() {
                        return;
                    },
                }
            }
        });
    }
    rx
}

/// A source firing every `period`, starting immediately.
///
/// Stops when the receiver is dropped. Must be called within a Tokio runtime.
pub fn ticker(period: Duration) -> mpsc::Receiver<Instant> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            let tick = interval.tick().await;
            if tx.send(tick.into_std()).await.is_err() {
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forwards_from_every_source() {
        let (_stop_tx, stop_rx) = watch::channel(false);
        let (a_tx, a_rx) = mpsc::channel(1);
        let (b_tx, b_rx) = mpsc::channel(1);
        let mut merged = fan_in(stop_rx, vec![a_rx, b_rx]);

        a_tx.send(1).await.unwrap();
        assert_eq!(merged.recv().await, Some(1));
        b_tx.send(2).await.unwrap();
        assert_eq!(merged.recv().await, Some(2));
    }

    #[tokio::test]
    async fn closes_on_shutdown() {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (_a_tx, a_rx) = mpsc::channel::<u8>(1);
        let (_b_tx, b_rx) = mpsc::channel::<u8>(1);
        let mut merged = fan_in(stop_rx, vec![a_rx, b_rx]);

        stop_tx.send_replace(true);
        assert_eq!(merged.recv().await, None);
    }

    #[tokio::test]
    async fn closes_when_all_sources_close() {
        let (_stop_tx, stop_rx) = watch::channel(false);
        let (a_tx, a_rx) = mpsc::channel::<u8>(1);
        let mut merged = fan_in(stop_rx, vec![a_rx]);

        drop(a_tx);
        assert_eq!(merged.recv().await, None);
    }

    #[tokio::test]
    async fn dropped_shutdown_sender_counts_as_shutdown() {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (_a_tx, a_rx) = mpsc::channel::<u8>(1);
        let mut merged = fan_in(stop_rx, vec![a_rx]);

        drop(stop_tx);
        assert_eq!(merged.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_fires_on_its_period() {
        let mut ticks = ticker(Duration::from_millis(120));
        let first = ticks.recv().await.unwrap();
        let second = ticks.recv().await.unwrap();
        assert!(second.duration_since(first) >= Duration::from_millis(120));
    }
}
