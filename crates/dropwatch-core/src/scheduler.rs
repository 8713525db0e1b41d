//! Poll scheduler: run the change detector on a fixed interval and turn each
//! pass into notifications.

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    config::Pacing,
    detector::{ChangeDetector, Detection},
    domain::ChatId,
    formatting::{first_run_summary, CaptionStyle},
    messaging::types::Delivery,
    notifier::Notifier,
    store::SeenSet,
};

/// State the scheduler is in when a pass starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassMode {
    /// Seen-set empty: index silently, send one summary.
    Indexing,
    /// Seen-set populated: one notification per new item.
    Steady,
}

#[derive(Clone, Debug)]
pub struct PassReport {
    pub mode: PassMode,
    pub detection: Detection,
    pub deliveries: Vec<Delivery>,
}

impl PassReport {
    pub fn delivered(&self) -> usize {
        self.deliveries.iter().filter(|d| d.is_delivered()).count()
    }
}

pub struct PollScheduler {
    detector: ChangeDetector,
    notifier: Notifier,
    chat_id: ChatId,
    interval: Duration,
    pacing: Pacing,
}

impl PollScheduler {
    pub fn new(
        detector: ChangeDetector,
        notifier: Notifier,
        chat_id: ChatId,
        interval: Duration,
        pacing: Pacing,
    ) -> Self {
        Self {
            detector,
            notifier,
            chat_id,
            interval,
            pacing,
        }
    }

    /// One detection pass plus its notifications.
    pub async fn run_pass(&self, seen: &mut SeenSet) -> PassReport {
        let detection = self.detector.detect(seen).await;

        if detection.first_run {
            let indexed = detection.new_items.len();
            let collections = self.detector.collections().len();
            info!(indexed, collections, "first pass: indexed existing products silently");
            let summary = first_run_summary(collections, indexed);
            let delivery = self.notifier.send_text(self.chat_id, &summary).await;
            return PassReport {
                mode: PassMode::Indexing,
                detection,
                deliveries: vec![delivery],
            };
        }

        if detection.new_items.is_empty() {
            info!(tracked = seen.len(), "no new products");
        } else {
            info!(new = detection.new_items.len(), "new products found");
        }

        let deliveries = self
            .notifier
            .notify_paced(
                self.chat_id,
                &detection.new_items,
                CaptionStyle::NewDrop,
                self.pacing.notification,
            )
            .await;

        let failed = deliveries.iter().filter(|d| !d.is_delivered()).count();
        if failed > 0 {
            warn!(failed, "some notifications could not be delivered");
        }

        PassReport {
            mode: PassMode::Steady,
            detection,
            deliveries,
        }
    }

    /// Pass immediately, then every `interval` until cancelled. A slow pass
    /// delays the next tick instead of bunching ticks up.
    pub async fn run(self, mut seen: SeenSet, cancel: CancellationToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            every_secs = self.interval.as_secs(),
            tracked = seen.len(),
            "poll scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let report = self.run_pass(&mut seen).await;
            let failed = report.detection.failed_collections();
            if !failed.is_empty() {
                warn!(collections = ?failed, "pass finished with unreadable collections");
            }
            info!(
                mode = ?report.mode,
                new = report.detection.new_items.len(),
                delivered = report.delivered(),
                tracked = seen.len(),
                "pass complete"
            );
        }

        info!("poll scheduler stopped");
    }
}
