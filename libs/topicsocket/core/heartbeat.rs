//! Outgoing STOMP heartbeats
//!
//! A dedicated Tokio task runs per connection and pushes the heartbeat
//! frame (a bare EOL) through an unbounded crossbeam channel into the main
//! write loop on every tick. Timing is independent of message processing;
//! missed ticks are skipped rather than bursted. The task exits on the
//! shutdown signal or once the channel closes with its session.

use crate::frame::Frame;
use crossbeam_channel::{Receiver, Sender};
use std::time::Duration;
use tracing::debug;

/// Heartbeat task body
///
/// The first immediate interval tick is skipped; the first heartbeat goes
/// out one full interval after the session is established.
pub async fn heartbeat_task(
    interval: Duration,
    heartbeat_tx: Sender<&'static str>,
    shutdown_rx: Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    debug!("heartbeat task started with interval: {:?}", interval);

    loop {
        match shutdown_rx.try_recv() {
            Ok(_) => {
                debug!("heartbeat task received shutdown signal");
                break;
            }
            Err(crossbeam_channel::TryRecvError::Disconnected) => {
                debug!("heartbeat shutdown channel disconnected");
                break;
            }
            Err(crossbeam_channel::TryRecvError::Empty) => {}
        }

        ticker.tick().await;

        if heartbeat_tx.send(Frame::HEARTBEAT).is_err() {
            debug!("heartbeat channel closed, shutting down heartbeat task");
            break;
        }
    }

    debug!("heartbeat task exiting");
}

/// Spawn a heartbeat task for the current session
///
/// Returns the task handle, the shutdown sender, and the channel the write
/// loop drains heartbeat payloads from.
pub fn spawn_heartbeat(
    interval: Duration,
) -> (
    tokio::task::JoinHandle<()>,
    Sender<()>,
    Receiver<&'static str>,
) {
    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    let (heartbeat_tx, heartbeat_rx) = crossbeam_channel::unbounded();

    let handle = tokio::spawn(async move {
        heartbeat_task(interval, heartbeat_tx, shutdown_rx).await;
    });

    (handle, shutdown_tx, heartbeat_rx)
}
