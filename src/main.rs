use std::error::Error;
use std::net::SocketAddr;
use std::time::Duration;

use dotenvy::dotenv;
use teloxide::dispatching::UpdateFilterExt;
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;
use teloxide::update_listeners::webhooks;
use teloxide::utils::command::BotCommands;
use tracing::{error, info};

mod config;
mod db;
mod handlers;
mod state;
mod template;
mod tiktok;
mod utils;

use config::CONFIG;
use db::Database;
use handlers::{callbacks, commands, downloads, register_chat, templates};
use state::AppState;
use utils::logging::init_logging;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
enum Command {
    Start,
    Brod,
}

type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> HandlerResult {
    dotenv().ok();
    let _guards = init_logging();

    if CONFIG.bot_token.trim().is_empty() {
        return Err("BOT_TOKEN is required".into());
    }

    let bot = Bot::new(CONFIG.bot_token.clone());
    info!("Starting LK NEWS template bot");

    let db = Database::init(&CONFIG.database_url).await?;
    let state = AppState::new(db);

    if let Some(port) = CONFIG.template_service_port {
        tokio::spawn(async move {
            if let Err(err) = template::service::run(port).await {
                error!("Template API server exited: {err}");
            }
        });
    }

    spawn_cache_purger(state.clone());

    let command_handler = dptree::entry()
        .filter_command::<Command>()
        .endpoint(handle_command);

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(dptree::filter(|msg: Message| msg.photo().is_some()).endpoint(handle_photo))
        .branch(dptree::filter(|msg: Message| msg.text().is_some()).endpoint(handle_text))
        .endpoint(ignore_message);

    let callback_handler = Update::filter_callback_query().endpoint(handle_callback);

    let handler = dptree::entry()
        .branch(message_handler)
        .branch(callback_handler);

    let mut dispatcher = Dispatcher::builder(bot.clone(), handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build();

    match CONFIG.webhook_url.clone() {
        Some(url) => {
            let addr = SocketAddr::from(([0, 0, 0, 0], CONFIG.webhook_port));
            info!("Listening for webhook updates on {addr}");
            let listener = webhooks::axum(bot, webhooks::Options::new(addr, url))
                .await
                .map_err(|err| format!("failed to start webhook listener: {err}"))?;
            dispatcher
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text("Webhook listener error"),
                )
                .await;
        }
        None => {
            info!("No WEBHOOK_URL configured; long polling");
            dispatcher.dispatch().await;
        }
    }

    Ok(())
}

fn spawn_cache_purger(state: AppState) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CACHE_PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(err) = state.db.purge_expired().await {
                error!("Cache purge failed: {err}");
            }
        }
    });
}

async fn handle_command(
    bot: Bot,
    state: AppState,
    message: Message,
    command: Command,
) -> HandlerResult {
    register_chat(&state, message.chat.id);

    match command {
        Command::Start => {
            if let Err(err) = commands::start_handler(bot, message).await {
                error!("start handler failed: {err}");
            }
        }
        Command::Brod => {
            if let Err(err) = commands::brod_handler(bot, state, message).await {
                error!("brod handler failed: {err}");
            }
        }
    }
    Ok(())
}

/// Photo work (download, cache, reply) is detached so dispatch can return
/// immediately; failures are logged and masked from the webhook response.
async fn handle_photo(bot: Bot, state: AppState, message: Message) -> HandlerResult {
    register_chat(&state, message.chat.id);

    tokio::spawn(async move {
        if let Err(err) = templates::photo_handler(bot, state, message).await {
            error!("photo handler failed: {err}");
        }
    });
    Ok(())
}

async fn handle_text(bot: Bot, state: AppState, message: Message) -> HandlerResult {
    register_chat(&state, message.chat.id);

    let Some(text) = message.text().map(|text| text.trim().to_string()) else {
        return Ok(());
    };

    if CONFIG.is_owner(message.chat.id.0) && commands::is_broadcast_prompt_reply(&message) {
        tokio::spawn(async move {
            if let Err(err) = commands::broadcast_reply_handler(bot, state, message).await {
                error!("broadcast reply handler failed: {err}");
            }
        });
        return Ok(());
    }

    if let Some(image_key) = templates::pending_session(&state, message.chat.id).await {
        tokio::spawn(async move {
            if let Err(err) =
                templates::headline_handler(bot, state, message, image_key, text).await
            {
                error!("headline handler failed: {err}");
            }
        });
        return Ok(());
    }

    if let Some(url) = tiktok::extract_tiktok_url(&text) {
        tokio::spawn(async move {
            if let Err(err) = downloads::tiktok_handler(bot, state, message, url).await {
                error!("tiktok handler failed: {err}");
            }
        });
        return Ok(());
    }

    if let Err(err) = commands::instructions_handler(bot, message).await {
        error!("instructions handler failed: {err}");
    }
    Ok(())
}

async fn handle_callback(bot: Bot, state: AppState, query: CallbackQuery) -> HandlerResult {
    if let Err(err) = callbacks::callback_handler(bot, state, query).await {
        error!("callback handler failed: {err}");
    }
    Ok(())
}

async fn ignore_message(_message: Message) -> HandlerResult {
    Ok(())
}
