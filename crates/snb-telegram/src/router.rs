use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*, update_listeners};
use tracing::{info, warn};

use snb_core::{
    config::Config,
    content::Catalog,
    deletion::DeletionQueue,
    domain::{ChatId, MessageRef},
    fault::{BotErrorHandler, ErrorRateTracker, LoggingObserver},
    messaging::{
        gated::{BackoffGate, GatedMessenger},
        port::MessagingPort,
    },
    Error, TransportError,
};

use crate::errors::{ErrorSource, FacadeErrorHandler};
use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub messenger: Arc<dyn MessagingPort>,
    pub deletions: DeletionQueue,
    pub errors: Arc<BotErrorHandler>,
    pub catalog: Arc<Catalog>,
    /// The bot's own user id, to skip welcoming ourselves.
    pub bot_user_id: Option<u64>,
}

impl AppState {
    /// Route a failed request into the error façade. Never fails.
    pub async fn report(&self, err: Error, chat_id: Option<ChatId>) {
        let raw = TransportError::from(err);
        self.errors.handle_bot_error(&raw, chat_id).await;
    }

    /// Send plain text that deletes itself after the configured TTL.
    pub async fn send_disappearing(&self, chat_id: ChatId, text: &str) -> Option<MessageRef> {
        match self
            .deletions
            .send_disappearing(chat_id, text, self.cfg.message_ttl)
            .await
        {
            Ok(sent) => Some(sent),
            Err(e) => {
                self.report(e, Some(chat_id)).await;
                None
            }
        }
    }
}

pub async fn run_polling(cfg: Arc<Config>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    let bot_user_id = match bot.get_me().await {
        Ok(me) => {
            info!(username = %me.username(), "bot started");
            Some(me.id.0)
        }
        Err(e) => {
            warn!(error = %e, "could not fetch bot identity");
            None
        }
    };

    let catalog = Arc::new(Catalog::load(cfg.catalog_path.as_deref())?);
    info!(
        groups = catalog.option_groups.len(),
        objects = catalog.objects.len(),
        "content catalog loaded"
    );

    let tracker = Arc::new(ErrorRateTracker::new(cfg.error_window));
    tracker.start_sweeper(cfg.error_sweep_interval);

    // Every outbound call waits behind the shared rate-limit gate.
    let gate = Arc::new(BackoffGate::new());
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> =
        Arc::new(GatedMessenger::new(raw_messenger, gate.clone()));

    let errors = Arc::new(BotErrorHandler::new(
        tracker.clone(),
        gate,
        cfg.error_policy(),
        Arc::new(LoggingObserver),
    ));
    let deletions =
        DeletionQueue::with_error_handler(messenger.clone(), cfg.deletion_policy(), errors.clone());

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        messenger,
        deletions: deletions.clone(),
        errors: errors.clone(),
        catalog,
        bot_user_id,
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    let listener = update_listeners::polling_default(bot.clone()).await;
    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .error_handler(FacadeErrorHandler::new(errors.clone(), ErrorSource::Handler))
        .enable_ctrlc_handler()
        .build();

    dispatcher
        .dispatch_with_listener(
            listener,
            FacadeErrorHandler::new(errors, ErrorSource::Polling),
        )
        .await;

    info!(
        pending_deletions = deletions.pending_count().await,
        "dispatcher stopped; shutting down"
    );
    deletions.shutdown().await;
    tracker.shutdown();

    Ok(())
}
