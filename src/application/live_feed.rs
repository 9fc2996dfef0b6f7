// Live event-channel feed into the visualizer controller
use crate::application::visualizer::{LoadOptions, UpdateOutcome, VisualizerController};
use crate::domain::error::ForceResultsError;
use crate::infrastructure::message::{Envelope, MessageType, TestDataPayload};
use futures::stream::Stream;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;

pub type SharedController = Arc<Mutex<VisualizerController>>;

/// Frames that are ready together are applied under one lock.
const MAX_BURST: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum FeedOutcome {
    Loaded,
    Queued,
    Ignored,
    Failed(ForceResultsError),
}

/// Decode raw frames, skipping any that are not valid envelopes.
pub fn envelopes<S>(frames: S) -> impl Stream<Item = Envelope>
where
    S: Stream<Item = String> + Send + 'static,
{
    async_stream::stream! {
        futures::pin_mut!(frames);
        while let Some(frame) = frames.next().await {
            match Envelope::decode(&frame) {
                Ok(envelope) => yield envelope,
                Err(e) => tracing::warn!("Dropping undecodable frame: {}", e),
            }
        }
    }
}

/// Route one envelope. Incremental updates are only queued; call
/// [`VisualizerController::flush_updates`] to apply them.
pub fn dispatch(controller: &mut VisualizerController, envelope: Envelope) -> FeedOutcome {
    if envelope.message_type != MessageType::TestData {
        tracing::debug!("Ignoring {:?} message", envelope.message_type);
        return FeedOutcome::Ignored;
    }

    match TestDataPayload::decode(&envelope.payload) {
        Ok(TestDataPayload::Incremental(update)) => {
            if !controller.options().incremental_updates {
                tracing::warn!("Incremental update received with incremental mode off");
                return FeedOutcome::Ignored;
            }
            controller.enqueue_update(update);
            FeedOutcome::Queued
        }
        Ok(TestDataPayload::Dataset(raw)) => {
            // Queued cells belong to the dataset being replaced.
            controller.flush_updates();
            match controller.load_data(raw, LoadOptions::default()) {
                Ok(()) => FeedOutcome::Loaded,
                Err(e) => FeedOutcome::Failed(e),
            }
        }
        Err(e) => {
            tracing::warn!("Malformed test_data payload: {}", e);
            FeedOutcome::Failed(e.into())
        }
    }
}

/// Consume frames until the sender side closes.
pub async fn run(controller: SharedController, rx: mpsc::Receiver<String>) {
    let mut bursts = Box::pin(envelopes(ReceiverStream::new(rx)).ready_chunks(MAX_BURST));

    while let Some(burst) = bursts.next().await {
        let mut vc = controller.lock().await;
        for envelope in burst {
            if let FeedOutcome::Failed(e) = dispatch(&mut vc, envelope) {
                tracing::debug!("Live feed message failed: {}", e);
            }
        }
        let UpdateOutcome { applied, dropped } = vc.flush_updates();
        if applied + dropped > 0 {
            tracing::debug!("Live feed applied {} cells, dropped {}", applied, dropped);
        }
    }
    tracing::info!("Live feed closed");
}
