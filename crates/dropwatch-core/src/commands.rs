//! Command responder: long-poll the update queue and answer bot commands.

use std::{sync::Arc, time::Duration};

use chrono::Duration as WindowDuration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    catalog::{fetcher::LATEST_COUNT, CatalogFetcher, RecentQuery},
    config::{Config, Pacing},
    domain::ChatId,
    formatting::{status_text, usage_text, CaptionStyle},
    messaging::{port::UpdateSource, types::IncomingUpdate},
    notifier::Notifier,
    store::{Cursor, SeenGauge, StateStore},
    Result,
};

const FETCH_FAILED: &str = "❌ Could not fetch products right now.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Help,
    Status,
    /// `/day` or `/today`: the last 24 hours.
    Today,
    Week,
    Latest,
}

impl BotCommand {
    /// Parse the first token of a message. Anything that is not one of the
    /// known commands (including plain chat) is `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.split_whitespace().next()?;
        let name = first.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or("").to_lowercase();

        match name.as_str() {
            "start" => Some(Self::Start),
            "help" => Some(Self::Help),
            "status" => Some(Self::Status),
            "day" | "today" => Some(Self::Today),
            "week" => Some(Self::Week),
            "latest" => Some(Self::Latest),
            _ => None,
        }
    }
}

/// Static knobs for the responder.
#[derive(Clone, Debug)]
pub struct ResponderSettings {
    pub store_name: String,
    /// Reported by `/status`.
    pub poll_interval: Duration,
    pub long_poll: Duration,
    pub pacing: Pacing,
}

impl ResponderSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            store_name: cfg.store_name.clone(),
            poll_interval: cfg.check_interval,
            long_poll: cfg.updates_long_poll,
            pacing: cfg.pacing,
        }
    }
}

pub struct CommandResponder {
    updates: Arc<dyn UpdateSource>,
    notifier: Notifier,
    fetcher: Arc<CatalogFetcher>,
    store: Arc<dyn StateStore>,
    seen: SeenGauge,
    settings: ResponderSettings,
}

impl CommandResponder {
    pub fn new(
        updates: Arc<dyn UpdateSource>,
        notifier: Notifier,
        fetcher: Arc<CatalogFetcher>,
        store: Arc<dyn StateStore>,
        seen: SeenGauge,
        settings: ResponderSettings,
    ) -> Self {
        Self {
            updates,
            notifier,
            fetcher,
            store,
            seen,
            settings,
        }
    }

    /// Fetch one batch of updates and handle it.
    ///
    /// The cursor moves past each update right after it is handled and is
    /// persisted at that point, so a crash only replays the update in flight.
    /// Returns the commands that were answered.
    pub async fn poll_once(&self, cursor: &mut Cursor) -> Result<Vec<BotCommand>> {
        self.poll_with(cursor, self.settings.long_poll).await
    }

    /// Like [`Self::poll_once`] but without waiting for new updates: only
    /// what is already queued gets answered.
    pub async fn poll_now(&self, cursor: &mut Cursor) -> Result<Vec<BotCommand>> {
        self.poll_with(cursor, Duration::ZERO).await
    }

    async fn poll_with(&self, cursor: &mut Cursor, wait: Duration) -> Result<Vec<BotCommand>> {
        let batch = self.updates.get_updates(cursor.value(), wait).await?;

        let mut handled = Vec::new();
        for update in batch {
            if let Some((chat_id, command)) = command_of(&update) {
                info!(chat_id = chat_id.0, ?command, "command received");
                self.run_command(chat_id, command).await;
                handled.push(command);
            }

            if cursor.advance(update.update_id) {
                if let Err(e) = self.store.save_cursor(cursor.value()) {
                    warn!(error = %e, offset = cursor.value(), "failed to persist update cursor");
                }
            }
        }
        Ok(handled)
    }

    /// Answer one command in `chat_id`. Send failures are logged by the
    /// notifier and otherwise ignored.
    pub async fn run_command(&self, chat_id: ChatId, command: BotCommand) {
        match command {
            BotCommand::Start | BotCommand::Help => {
                self.notifier
                    .send_text(chat_id, &usage_text(&self.settings.store_name))
                    .await;
            }
            BotCommand::Status => {
                let txt = status_text(
                    self.seen.get(),
                    self.fetcher.collections().len(),
                    self.settings.poll_interval,
                );
                self.notifier.send_text(chat_id, &txt).await;
            }
            BotCommand::Today => {
                self.reply_window(chat_id, WindowDuration::days(1), "today", "from today")
                    .await;
            }
            BotCommand::Week => {
                self.reply_window(
                    chat_id,
                    WindowDuration::days(7),
                    "this week",
                    "from the last 7 days",
                )
                .await;
            }
            BotCommand::Latest => self.reply_latest(chat_id).await,
        }
    }

    async fn reply_window(
        &self,
        chat_id: ChatId,
        window: WindowDuration,
        period: &str,
        found_suffix: &str,
    ) {
        self.notifier
            .send_text(chat_id, &format!("🔍 Fetching products added {period}..."))
            .await;

        let query = self.fetcher.recent(window).await;
        if query.is_unavailable() {
            self.notifier.send_text(chat_id, FETCH_FAILED).await;
            return;
        }
        let note = partial_note(&query);
        if query.items.is_empty() {
            self.notifier
                .send_text(chat_id, &format!("No new products {period}.{note}"))
                .await;
            return;
        }

        self.notifier
            .send_text(
                chat_id,
                &format!("Found {} products {found_suffix}:{note}", query.items.len()),
            )
            .await;
        self.send_items(chat_id, &query, CaptionStyle::NewDrop, self.settings.pacing.notification)
            .await;
    }

    async fn reply_latest(&self, chat_id: ChatId) {
        self.notifier
            .send_text(chat_id, "🔍 Fetching latest products...")
            .await;

        let query = self.fetcher.latest(LATEST_COUNT).await;
        if query.items.is_empty() {
            self.notifier.send_text(chat_id, FETCH_FAILED).await;
            return;
        }
        self.send_items(chat_id, &query, CaptionStyle::Listing, self.settings.pacing.query_page)
            .await;
    }

    async fn send_items(
        &self,
        chat_id: ChatId,
        query: &RecentQuery,
        style: CaptionStyle,
        pause: Duration,
    ) {
        let deliveries = self
            .notifier
            .notify_paced(chat_id, &query.items, style, pause)
            .await;
        let failed = deliveries.iter().filter(|d| !d.is_delivered()).count();
        if failed > 0 {
            warn!(chat_id = chat_id.0, failed, "some replies could not be delivered");
        }
    }

    /// Poll until cancelled. A failed poll is logged and retried after the
    /// configured backoff. Cancellation is seen between batches, so a batch
    /// in progress is always answered and its cursor saved.
    pub async fn run(self, mut cursor: Cursor, cancel: CancellationToken) {
        info!(offset = cursor.value(), "command responder started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.poll_once(&mut cursor).await {
                Ok(handled) if !handled.is_empty() => {
                    debug!(count = handled.len(), offset = cursor.value(), "commands handled");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "polling error");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = sleep(self.settings.pacing.poll_error_backoff) => {}
                    }
                }
            }
        }

        info!(offset = cursor.value(), "command responder stopped");
    }
}

/// Appended to window replies when some collections could not be read.
fn partial_note(query: &RecentQuery) -> String {
    if query.failed.is_empty() {
        return String::new();
    }
    format!(
        "\n⚠️ {} of {} collections could not be checked.",
        query.failed.len(),
        query.queried
    )
}

fn command_of(update: &IncomingUpdate) -> Option<(ChatId, BotCommand)> {
    let chat_id = update.chat_id?;
    let command = BotCommand::parse(update.text.as_deref()?)?;
    Some((chat_id, command))
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::{
        catalog::RawProduct,
        detector::testing::MutableCatalog,
        errors::Error,
        notifier::testing::{FakeMessenger, Sent},
        store::{MemoryStateStore, SeenSet},
    };

    const CHAT: ChatId = ChatId(555);

    /// Serves queued batches, filtering by offset like the real queue.
    #[derive(Default)]
    struct QueuedUpdates {
        batches: Mutex<VecDeque<Result<Vec<IncomingUpdate>>>>,
        offsets: Mutex<Vec<i64>>,
        waits: Mutex<Vec<Duration>>,
        /// Cancelled while a fetch is in progress.
        cancel_on_fetch: Mutex<Option<CancellationToken>>,
    }

    impl QueuedUpdates {
        fn push(&self, batch: Result<Vec<IncomingUpdate>>) {
            self.batches.lock().unwrap().push_back(batch);
        }
    }

    #[async_trait]
    impl UpdateSource for QueuedUpdates {
        async fn get_updates(&self, offset: i64, wait: Duration) -> Result<Vec<IncomingUpdate>> {
            self.offsets.lock().unwrap().push(offset);
            self.waits.lock().unwrap().push(wait);
            if let Some(token) = self.cancel_on_fetch.lock().unwrap().as_ref() {
                token.cancel();
            }
            let next = self.batches.lock().unwrap().pop_front();
            match next {
                Some(Ok(batch)) => Ok(batch.into_iter().filter(|u| u.update_id >= offset).collect()),
                Some(Err(e)) => Err(e),
                None => {
                    // Idle queue: stand in for the long-poll wait.
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Ok(Vec::new())
                }
            }
        }
    }

    fn update(id: i64, text: Option<&str>) -> IncomingUpdate {
        IncomingUpdate {
            update_id: id,
            chat_id: Some(CHAT),
            text: text.map(str::to_string),
        }
    }

    fn dated(handle: &str, age: WindowDuration) -> RawProduct {
        RawProduct {
            handle: handle.to_string(),
            title: handle.to_uppercase(),
            created_at: Some((Utc::now() - age).to_rfc3339()),
            ..RawProduct::default()
        }
    }

    struct Harness {
        updates: Arc<QueuedUpdates>,
        catalog: Arc<MutableCatalog>,
        messenger: Arc<FakeMessenger>,
        store: Arc<MemoryStateStore>,
        responder: CommandResponder,
    }

    fn harness(seen: &SeenSet) -> Harness {
        let updates = Arc::new(QueuedUpdates::default());
        let catalog = Arc::new(MutableCatalog::default());
        let messenger = Arc::new(FakeMessenger::default());
        let store = Arc::new(MemoryStateStore::default());
        let fetcher = CatalogFetcher::new(
            catalog.clone(),
            "https://shop.example",
            vec!["a".to_string(), "b".to_string()],
        )
        .with_pacing(Pacing::immediate());
        let responder = CommandResponder::new(
            updates.clone(),
            Notifier::new(messenger.clone(), "¥"),
            Arc::new(fetcher),
            store.clone(),
            seen.gauge(),
            ResponderSettings {
                store_name: "Test Shop".to_string(),
                poll_interval: Duration::from_secs(600),
                long_poll: Duration::from_secs(10),
                pacing: Pacing::immediate(),
            },
        );
        Harness {
            updates,
            catalog,
            messenger,
            store,
            responder,
        }
    }

    #[test]
    fn parses_known_commands_case_insensitively() {
        assert_eq!(BotCommand::parse("/start"), Some(BotCommand::Start));
        assert_eq!(BotCommand::parse("/HELP"), Some(BotCommand::Help));
        assert_eq!(BotCommand::parse("  /Day  please"), Some(BotCommand::Today));
        assert_eq!(BotCommand::parse("/today"), Some(BotCommand::Today));
        assert_eq!(BotCommand::parse("/week@drop_bot"), Some(BotCommand::Week));
        assert_eq!(BotCommand::parse("/latest@Drop_Bot extra"), Some(BotCommand::Latest));
        assert_eq!(BotCommand::parse("/status"), Some(BotCommand::Status));
    }

    #[test]
    fn ignores_unknown_commands_and_chatter() {
        assert_eq!(BotCommand::parse("/weekly"), None);
        assert_eq!(BotCommand::parse("latest"), None);
        assert_eq!(BotCommand::parse("hello /start"), None);
        assert_eq!(BotCommand::parse(""), None);
        assert_eq!(BotCommand::parse("/"), None);
    }

    #[tokio::test]
    async fn cursor_is_persisted_per_update_and_never_decreases() {
        let seen = SeenSet::new();
        let h = harness(&seen);
        h.updates.push(Ok(vec![update(7, Some("hi")), update(8, None)]));
        h.updates.push(Ok(vec![update(5, Some("old")), update(12, Some("/unknown"))]));
        h.updates.push(Ok(vec![]));

        let mut cursor = Cursor::new(0);
        for _ in 0..3 {
            h.responder.poll_once(&mut cursor).await.unwrap();
        }

        assert_eq!(cursor.value(), 13);
        let saved = h.store.cursor_saves.lock().unwrap().clone();
        assert_eq!(saved, vec![8, 9, 13]);
        assert!(saved.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*h.updates.offsets.lock().unwrap(), vec![0, 9, 13]);
        assert!(h.messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn updates_without_chat_still_advance_the_cursor() {
        let seen = SeenSet::new();
        let h = harness(&seen);
        h.updates.push(Ok(vec![IncomingUpdate {
            update_id: 40,
            chat_id: None,
            text: Some("/start".to_string()),
        }]));

        let mut cursor = Cursor::new(0);
        let handled = h.responder.poll_once(&mut cursor).await.unwrap();

        assert!(handled.is_empty());
        assert_eq!(cursor.value(), 41);
    }

    #[tokio::test]
    async fn poll_error_leaves_cursor_untouched() {
        let seen = SeenSet::new();
        let h = harness(&seen);
        h.updates.push(Err(Error::Transport("timeout".to_string())));

        let mut cursor = Cursor::new(3);
        assert!(h.responder.poll_once(&mut cursor).await.is_err());
        assert_eq!(cursor.value(), 3);
        assert!(h.store.cursor_saves.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_and_status_reply_to_the_requesting_chat() {
        let seen = SeenSet::from_handles(["a", "b", "c"]);
        let h = harness(&seen);
        h.updates.push(Ok(vec![update(1, Some("/start")), update(2, Some("/status"))]));

        let mut cursor = Cursor::default();
        let handled = h.responder.poll_once(&mut cursor).await.unwrap();

        assert_eq!(handled, vec![BotCommand::Start, BotCommand::Status]);
        let texts = h.messenger.texts();
        assert!(texts[0].contains("Test Shop"));
        assert!(texts[1].contains("Tracking 3 products across 2 collections"));
        assert!(h
            .messenger
            .sent()
            .iter()
            .all(|s| matches!(s, Sent::Text { chat_id, .. } if *chat_id == CHAT)));
    }

    #[tokio::test]
    async fn week_replies_with_count_then_items_newest_first() {
        let seen = SeenSet::new();
        let h = harness(&seen);
        h.catalog.set_raw(
            "a",
            vec![
                dated("hour-old", WindowDuration::hours(1)),
                dated("three-days", WindowDuration::days(3)),
                dated("ten-days", WindowDuration::days(10)),
            ],
        );
        h.catalog.set_raw("b", vec![]);

        h.responder.run_command(CHAT, BotCommand::Week).await;

        let texts = h.messenger.texts();
        assert_eq!(texts.len(), 4);
        assert!(texts[0].starts_with("🔍"));
        assert_eq!(texts[1], "Found 2 products from the last 7 days:");
        assert!(texts[2].contains("<b>HOUR-OLD</b>"));
        assert!(texts[3].contains("<b>THREE-DAYS</b>"));
    }

    #[tokio::test]
    async fn empty_window_says_so() {
        let seen = SeenSet::new();
        let h = harness(&seen);
        h.catalog.set_raw("a", vec![dated("old", WindowDuration::days(3))]);
        h.catalog.set_raw("b", vec![]);

        h.responder.run_command(CHAT, BotCommand::Today).await;

        assert_eq!(
            h.messenger.texts().last().map(String::as_str),
            Some("No new products today.")
        );
    }

    #[tokio::test]
    async fn unreachable_catalog_gets_explicit_failure_reply() {
        let seen = SeenSet::new();
        let h = harness(&seen);

        h.responder.run_command(CHAT, BotCommand::Week).await;
        h.responder.run_command(CHAT, BotCommand::Latest).await;

        let texts = h.messenger.texts();
        assert_eq!(texts[1], FETCH_FAILED);
        assert_eq!(texts[3], FETCH_FAILED);
    }

    #[tokio::test]
    async fn latest_lists_items_without_new_marker() {
        let seen = SeenSet::new();
        let h = harness(&seen);
        h.catalog.set_raw("a", vec![dated("fresh", WindowDuration::hours(2))]);
        h.catalog.set_raw("b", vec![dated("fresher", WindowDuration::hours(1))]);

        h.responder.run_command(CHAT, BotCommand::Latest).await;

        let texts = h.messenger.texts();
        assert_eq!(texts.len(), 3);
        assert!(texts[1].starts_with("<b>FRESHER</b>"));
        assert!(texts[2].starts_with("<b>FRESH</b>"));
    }

    #[tokio::test]
    async fn window_reply_flags_unreadable_collections() {
        let seen = SeenSet::new();
        let h = harness(&seen);
        h.catalog.set_raw("a", vec![dated("old", WindowDuration::days(10))]);

        h.responder.run_command(CHAT, BotCommand::Week).await;

        assert_eq!(
            h.messenger.texts().last().map(String::as_str),
            Some("No new products this week.\n⚠️ 1 of 2 collections could not be checked.")
        );
    }

    #[tokio::test]
    async fn poll_now_does_not_wait_for_updates() {
        let seen = SeenSet::new();
        let h = harness(&seen);
        h.updates.push(Ok(vec![update(20, Some("/help"))]));

        let mut cursor = Cursor::default();
        let handled = h.responder.poll_now(&mut cursor).await.unwrap();

        assert_eq!(handled, vec![BotCommand::Help]);
        assert_eq!(*h.updates.waits.lock().unwrap(), vec![Duration::ZERO]);
        assert_eq!(*h.store.cursor_saves.lock().unwrap(), vec![21]);
    }

    #[tokio::test]
    async fn run_recovers_from_a_failed_poll() {
        let seen = SeenSet::from_handles(["x"]);
        let Harness {
            updates,
            messenger,
            store,
            responder,
            ..
        } = harness(&seen);
        updates.push(Err(Error::Transport("connection reset".to_string())));
        updates.push(Ok(vec![update(3, Some("/status"))]));

        let cancel = CancellationToken::new();
        let task = tokio::spawn(responder.run(Cursor::default(), cancel.clone()));

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while messenger.texts().is_empty() {
            assert!(std::time::Instant::now() < deadline, "no reply after failed poll");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        task.await.unwrap();

        assert!(messenger.texts()[0].contains("Tracking 1 products"));
        assert_eq!(store.cursor_saves.lock().unwrap().first(), Some(&4));
        assert!(updates.offsets.lock().unwrap().len() >= 2);
    }

    #[tokio::test]
    async fn batch_in_flight_is_answered_before_stopping() {
        let seen = SeenSet::new();
        let Harness {
            updates,
            messenger,
            store,
            responder,
            ..
        } = harness(&seen);
        let cancel = CancellationToken::new();
        *updates.cancel_on_fetch.lock().unwrap() = Some(cancel.clone());
        updates.push(Ok(vec![update(40, Some("/help"))]));

        responder.run(Cursor::default(), cancel).await;

        assert_eq!(messenger.texts().len(), 1);
        assert_eq!(*store.cursor_saves.lock().unwrap(), vec![41]);
        assert_eq!(updates.offsets.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn run_exits_on_cancel() {
        let seen = SeenSet::new();
        let h = harness(&seen);
        let cancel = CancellationToken::new();
        cancel.cancel();
        h.responder.run(Cursor::default(), cancel).await;
    }
}
