//! The subscriber loop: intake from the feed, serial hand-off to the pipeline.

use std::time::Duration;

use projection::{Event, EventPipeline, ProjectionStore};
use tokio::sync::{mpsc, watch};

use crate::error::Result;
use crate::feed::EventFeed;

/// How many recent block ids to present when subscribing. Deep enough to
/// cover any fork the feed would resolve against.
pub const KNOWN_BLOCK_COUNT: i64 = 15;

const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Drives an [`EventFeed`] into an [`EventPipeline`].
///
/// Intake and application run as separate tasks joined by a capacity-1
/// channel, so the feed is read at most one batch ahead of the store. A
/// failed batch is logged and dropped; the feed redelivers it on
/// reconnection, and the fork check makes redelivery harmless.
pub struct Subscriber<F> {
    feed: F,
}

impl<F: EventFeed + 'static> Subscriber<F> {
    pub fn new(feed: F) -> Self {
        Self { feed }
    }

    /// Runs until the feed closes or `shutdown` fires. On shutdown, intake
    /// stops first and the in-flight batch is applied before returning.
    pub async fn run<S: ProjectionStore>(
        self,
        pipeline: &EventPipeline<S>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let (tx, mut rx) = mpsc::channel::<Vec<Event>>(1);
        let intake = tokio::spawn(intake_loop(self.feed, tx, shutdown));

        while let Some(batch) = rx.recv().await {
            if let Err(err) = pipeline.handle(&batch).await {
                tracing::error!(%err, "failed to apply batch");
                metrics::counter!("projector_batches_failed").increment(1);
            }
        }

        if let Err(err) = intake.await {
            tracing::error!(%err, "intake task panicked");
        }
        Ok(())
    }
}

/// Runs the subscriber until shutdown, reconnecting when the feed drops.
///
/// Each attempt builds a fresh feed from `connect` and subscribes with the
/// block ids currently known to the store, so the feed replays whatever the
/// previous connection missed. Connection failures back off exponentially up
/// to [`MAX_RECONNECT_DELAY`]; a successful subscription resets the delay.
pub async fn run_with_reconnect<S, F>(
    pipeline: &EventPipeline<S>,
    mut connect: impl FnMut() -> F + Send,
    initial_delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()>
where
    S: ProjectionStore,
    F: EventFeed + 'static,
{
    let mut delay = initial_delay;
    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        match pipeline.store().last_known_blocks(KNOWN_BLOCK_COUNT).await {
            Ok(known) => {
                let ids: Vec<String> = known.into_iter().map(|b| b.block_id).collect();
                let mut feed = connect();
                match feed.connect(&ids).await {
                    Ok(()) => {
                        delay = initial_delay;
                        Subscriber::new(feed)
                            .run(pipeline, shutdown.clone())
                            .await?;
                    }
                    Err(err) => {
                        tracing::warn!(%err, "feed connection failed");
                    }
                }
            }
            Err(err) => {
                tracing::error!(%err, "failed to read known blocks");
            }
        }

        if *shutdown.borrow() {
            return Ok(());
        }
        tracing::info!(delay_ms = delay.as_millis() as u64, "reconnecting to event feed");
        tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            _ = tokio::time::sleep(delay) => {}
        }
        delay = (delay * 2).min(MAX_RECONNECT_DELAY);
    }
}

async fn intake_loop<F: EventFeed>(
    mut feed: F,
    tx: mpsc::Sender<Vec<Event>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("shutdown requested, stopping intake");
                break;
            }
            batch = feed.next_batch() => match batch {
                Ok(Some(events)) => {
                    // send blocks until the pipeline drains the channel
                    if tx.send(events).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    tracing::info!("event feed closed");
                    break;
                }
                Err(err) => {
                    tracing::error!(%err, "event feed read failed");
                    break;
                }
            },
        }
    }
}
