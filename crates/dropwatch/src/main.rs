use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use dropwatch_core::{
    catalog::CatalogFetcher,
    commands::{CommandResponder, ResponderSettings},
    config::Config,
    detector::ChangeDetector,
    notifier::Notifier,
    scheduler::PollScheduler,
    store::{Cursor, FileStateStore, SeenSet, StateStore},
};
use dropwatch_shopify::ShopifyCatalog;
use dropwatch_telegram::{build_bot, TelegramMessenger, TelegramUpdates};

mod liveness;

#[derive(Parser)]
#[command(name = "dropwatch")]
#[command(about = "Watch a storefront for new products and announce them on Telegram")]
#[command(version)]
struct Cli {
    /// Run a single job and exit instead of staying up
    #[arg(long, value_enum)]
    once: Option<OneShot>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum OneShot {
    /// One detection pass with its notifications
    Check,
    /// Answer the commands already queued and save the cursor
    Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dropwatch_core::logging::init("dropwatch")?;

    let cfg = Config::load()?;

    let store: Arc<dyn StateStore> = Arc::new(FileStateStore::new(
        cfg.seen_file.clone(),
        cfg.offset_file.clone(),
    ));
    let seen = SeenSet::load(store.as_ref());
    let cursor = Cursor::load(store.as_ref());
    info!(
        tracked = seen.len(),
        offset = cursor.value(),
        collections = cfg.collections.len(),
        store = %cfg.store_name,
        "state loaded"
    );

    let catalog = Arc::new(ShopifyCatalog::from_config(&cfg)?);
    let fetcher = Arc::new(CatalogFetcher::from_config(catalog, &cfg));

    let send_bot = build_bot(&cfg.telegram_bot_token, cfg.telegram_timeout)?;
    // Long polls hold the request open, so that client needs the wait on top.
    let poll_bot = build_bot(
        &cfg.telegram_bot_token,
        cfg.updates_long_poll + cfg.telegram_timeout,
    )?;
    let notifier = Notifier::new(
        Arc::new(TelegramMessenger::new(send_bot)),
        cfg.price_symbol.clone(),
    );

    let scheduler = PollScheduler::new(
        ChangeDetector::new(fetcher.clone(), store.clone()),
        notifier.clone(),
        cfg.telegram_chat_id,
        cfg.check_interval,
        cfg.pacing,
    );
    let responder = CommandResponder::new(
        Arc::new(TelegramUpdates::new(poll_bot)),
        notifier,
        fetcher,
        store,
        seen.gauge(),
        ResponderSettings::from_config(&cfg),
    );

    match cli.once {
        Some(OneShot::Check) => check_once(scheduler, seen).await,
        Some(OneShot::Commands) => answer_queued(responder, cursor).await,
        None => run_daemon(&cfg, scheduler, responder, seen, cursor).await,
    }
}

async fn check_once(scheduler: PollScheduler, mut seen: SeenSet) -> anyhow::Result<()> {
    let report = scheduler.run_pass(&mut seen).await;
    info!(
        mode = ?report.mode,
        new = report.detection.new_items.len(),
        delivered = report.delivered(),
        tracked = seen.len(),
        "single pass complete"
    );
    if let Some(e) = report.detection.persist_error {
        bail!("seen-set could not be saved: {e}");
    }
    Ok(())
}

async fn answer_queued(responder: CommandResponder, mut cursor: Cursor) -> anyhow::Result<()> {
    let handled = responder
        .poll_now(&mut cursor)
        .await
        .context("failed to fetch queued updates")?;
    info!(
        count = handled.len(),
        offset = cursor.value(),
        "queued commands answered"
    );
    Ok(())
}

async fn run_daemon(
    cfg: &Config,
    scheduler: PollScheduler,
    responder: CommandResponder,
    seen: SeenSet,
    cursor: Cursor,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", cfg.port))
        .await
        .with_context(|| format!("failed to bind liveness port {}", cfg.port))?;

    let cancel = CancellationToken::new();

    let mut scheduler_task = tokio::spawn(scheduler.run(seen, cancel.clone()));
    let mut responder_task = tokio::spawn(responder.run(cursor, cancel.clone()));
    let mut liveness_task = tokio::spawn(liveness::serve(listener, cancel.clone()));
    let mut pinger_task: JoinHandle<()> = match &cfg.self_ping_url {
        Some(url) => {
            let pinger = liveness::SelfPinger::new(url.clone(), cfg.self_ping_interval)?;
            tokio::spawn(pinger.run(cancel.clone()))
        }
        None => {
            info!("no self-ping URL configured");
            let idle = cancel.clone();
            tokio::spawn(async move { idle.cancelled().await })
        }
    };

    let stopped = tokio::select! {
        r = &mut scheduler_task => Some(("poll scheduler", r.map_err(anyhow::Error::from))),
        r = &mut responder_task => Some(("command responder", r.map_err(anyhow::Error::from))),
        r = &mut liveness_task => Some(("liveness server", r.map_err(anyhow::Error::from).and_then(|inner| inner))),
        r = &mut pinger_task => Some(("self-ping", r.map_err(anyhow::Error::from))),
        _ = tokio::signal::ctrl_c() => None,
    };

    cancel.cancel();

    match stopped {
        None => {
            info!("shutdown signal received");
            Ok(())
        }
        Some((unit, Ok(()))) => bail!("{unit} exited unexpectedly"),
        Some((unit, Err(e))) => {
            error!(unit, error = %e, "task failed");
            Err(e.context(format!("{unit} failed")))
        }
    }
}
