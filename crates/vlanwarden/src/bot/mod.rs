//! Telegram operator interface.
//!
//! One long-poll loop drives everything: inbound updates (commands,
//! inline-button callbacks, replies) and the login-attempt channel fed by
//! the RADIUS pipeline. Each update is handled in its own task so a
//! misbehaving handler cannot take the poller down, and every update must
//! come from an allowlisted chat or it is dropped without a response.

pub mod edit_device;
pub mod new_device;

pub use edit_device::EditDeviceFlow;
pub use new_device::NewDeviceFlow;

use crate::config::{Config, Verbosity};
use crate::registry::{Registry, RegistryError};
use crate::server::LoginAttempt;
use std::sync::Arc;
use teloxide::payloads::setters::*;
use teloxide::requests::Requester;
use teloxide::types::{
    AllowedUpdate, BotCommand, CallbackQuery, ChatId, InlineKeyboardMarkup, Message, ParseMode,
    ReplyMarkup, Update, UpdateKind,
};
use teloxide::Bot;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Long-poll timeout, in seconds.
const POLL_TIMEOUT_SECS: u32 = 10;

#[derive(Error, Debug)]
pub enum BotError {
    /// The token behind an inline button is no longer in the cache
    /// (evicted or the server restarted).
    #[error("failed to read data from message")]
    FailedToReadData,
    #[error("chat error: {0}")]
    Chat(#[from] teloxide::RequestError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// A rendered chat view: message text plus an optional inline keyboard.
#[derive(Debug, Clone)]
pub struct View {
    pub text: String,
    pub keyboard: Option<InlineKeyboardMarkup>,
}

impl View {
    pub fn text_only(text: impl Into<String>) -> Self {
        View {
            text: text.into(),
            keyboard: None,
        }
    }
}

/// Split inline callback data into its action id and correlation token.
pub(crate) fn split_callback(data: &str) -> Option<(&str, &str)> {
    data.split_once(':')
}

/// Join an action id and token into callback data.
pub(crate) fn callback_data(action: &str, token: &str) -> String {
    format!("{action}:{token}")
}

#[derive(Clone)]
pub struct BotServer {
    bot: Bot,
    chat_ids: Arc<Vec<i64>>,
    registry: Arc<dyn Registry>,
    new_flow: Arc<NewDeviceFlow>,
    edit_flow: Arc<EditDeviceFlow>,
    verbosity: Verbosity,
}

impl BotServer {
    pub fn new(cfg: &Config, registry: Arc<dyn Registry>) -> Self {
        BotServer {
            bot: Bot::new(cfg.telegram_token.clone()),
            chat_ids: Arc::new(cfg.telegram_chat_ids.clone()),
            registry,
            new_flow: Arc::new(NewDeviceFlow::new()),
            edit_flow: Arc::new(EditDeviceFlow::new()),
            verbosity: cfg.verbosity,
        }
    }

    /// Drive the long-poller and the login-attempt channel until `stop`
    /// signals.
    pub async fn run(
        &self,
        mut stop: watch::Receiver<bool>,
        mut attempts: mpsc::Receiver<LoginAttempt>,
    ) -> Result<(), BotError> {
        self.register_commands().await;
        info!("Telegram bot polling for updates");

        let mut offset: i32 = 0;
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                Some(attempt) = attempts.recv() => {
                    self.notify_login_attempt(&attempt).await;
                }
                updates = self
                    .bot
                    .get_updates()
                    .offset(offset)
                    .timeout(POLL_TIMEOUT_SECS)
                    .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery]) =>
                {
                    match updates {
                        Ok(updates) => {
                            for update in updates {
                                offset = offset.max(update.id + 1);
                                self.dispatch(update);
                            }
                        }
                        Err(e) => {
                            // Transient chat errors must not kill the loop.
                            warn!(error = %e, "failed to fetch updates");
                            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }

        debug!("Telegram bot stopped");
        Ok(())
    }

    /// Fan a new-device notification out to every allowlisted chat.
    pub async fn notify_login_attempt(&self, attempt: &LoginAttempt) {
        let view = self.new_flow.notify_view(attempt);
        for &chat_id in self.chat_ids.iter() {
            if let Err(e) = self.send_view(ChatId(chat_id), view.clone()).await {
                warn!(chat_id, error = %e, "failed to send notification");
            }
        }
    }

    async fn register_commands(&self) {
        let commands = vec![
            BotCommand::new("start", "Start interacting with the bot"),
            BotCommand::new("help", "Show the available commands"),
            BotCommand::new("list", "List the registered devices"),
            BotCommand::new("edit", "Edit a device by name or username"),
        ];
        if let Err(e) = self.bot.set_my_commands(commands).await {
            warn!(error = %e, "failed to register bot commands");
        }
    }

    /// Handle one update in its own task so a panicking handler cannot
    /// terminate the poll loop.
    fn dispatch(&self, update: Update) {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.handle_update(update).await {
                warn!(error = %e, "update handler failed");
            }
        });
    }

    fn is_allowed(&self, chat_id: i64) -> bool {
        self.chat_ids.contains(&chat_id)
    }

    async fn handle_update(&self, update: Update) -> Result<(), BotError> {
        match update.kind {
            UpdateKind::Message(message) => self.handle_message(message).await,
            UpdateKind::CallbackQuery(query) => self.handle_callback(query).await,
            _ => Ok(()),
        }
    }

    async fn handle_message(&self, message: Message) -> Result<(), BotError> {
        if !self.is_allowed(message.chat.id.0) {
            debug!(chat_id = message.chat.id.0, "dropping message from unknown chat");
            return Ok(());
        }

        let Some(text) = message.text().map(str::to_owned) else {
            return Ok(());
        };

        if self.verbosity >= Verbosity::AccessLog {
            info!(chat_id = message.chat.id.0, text = %text, "received message");
        }

        if let Some(reply_to) = message.reply_to_message() {
            return self.handle_reply(&message, reply_to, &text).await;
        }

        let (command, payload) = match text.split_once(char::is_whitespace) {
            Some((command, payload)) => (command, payload.trim()),
            None => (text.as_str(), ""),
        };

        match command {
            "/start" => {
                self.send_view(
                    message.chat.id,
                    View::text_only(
                        "Welcome to vlanwarden! Use /help to see the available commands.",
                    ),
                )
                .await
            }
            "/help" => self.send_view(message.chat.id, View::text_only(HELP_MESSAGE)).await,
            "/list" => {
                let view = self.list_view()?;
                self.send_view(message.chat.id, view).await
            }
            "/edit" => {
                let view = if payload.is_empty() {
                    View::text_only(
                        "Please provide a name or username to edit. Usage:\n`/edit <device>`",
                    )
                } else {
                    let username = self.edit_flow.resolve_target(self.registry.as_ref(), payload);
                    self.edit_flow.edit_view(self.registry.as_ref(), &username)?
                };
                self.send_view(message.chat.id, view).await
            }
            _ => Ok(()),
        }
    }

    /// Replies to bot messages carry device display names; both flows get
    /// a chance to claim the reply, everything else is ignored silently.
    async fn handle_reply(
        &self,
        message: &Message,
        reply_to: &Message,
        text: &str,
    ) -> Result<(), BotError> {
        let Some(original) = reply_to.text() else {
            return Ok(());
        };

        let confirmation = self
            .new_flow
            .handle_reply(self.registry.as_ref(), original, text)?
            .or(self
                .edit_flow
                .handle_reply(self.registry.as_ref(), original, text)?);

        if let Some(confirmation) = confirmation {
            self.send_view(message.chat.id, View::text_only(confirmation)).await?;
        }
        Ok(())
    }

    async fn handle_callback(&self, query: CallbackQuery) -> Result<(), BotError> {
        let (chat_id, message_id) = match query.message.as_ref() {
            Some(message) => (message.chat.id, message.id),
            None => {
                // Message too old or gone; just clear the spinner.
                self.bot.answer_callback_query(query.id).await?;
                return Ok(());
            }
        };
        if !self.is_allowed(chat_id.0) {
            debug!(chat_id = chat_id.0, "dropping callback from unknown chat");
            return Ok(());
        }

        if self.verbosity >= Verbosity::AccessLog {
            info!(
                chat_id = chat_id.0,
                data = query.data.as_deref().unwrap_or(""),
                "received callback"
            );
        }

        let outcome = match query.data.as_deref().and_then(split_callback) {
            Some((action, token)) => self
                .new_flow
                .handle_callback(self.registry.as_ref(), action, token)
                .and_then(|view| match view {
                    Some(view) => Ok(Some(view)),
                    None => self
                        .edit_flow
                        .handle_callback(self.registry.as_ref(), action, token),
                }),
            None => Ok(None),
        };

        match outcome {
            Ok(Some(view)) => {
                let mut request = self
                    .bot
                    .edit_message_text(chat_id, message_id, view.text)
                    .parse_mode(ParseMode::Markdown);
                if let Some(keyboard) = view.keyboard {
                    request = request.reply_markup(keyboard);
                }
                if let Err(e) = request.await {
                    // The original message may have been deleted meanwhile.
                    warn!(error = %e, "failed to edit message");
                }
                self.bot.answer_callback_query(query.id).await?;
                Ok(())
            }
            Ok(None) => {
                self.bot.answer_callback_query(query.id).await?;
                Ok(())
            }
            Err(e) => {
                self.bot
                    .answer_callback_query(query.id)
                    .text(e.to_string())
                    .show_alert(true)
                    .await?;
                Err(e)
            }
        }
    }

    fn list_view(&self) -> Result<View, BotError> {
        let devices = self.registry.devices()?;
        if devices.is_empty() {
            return Ok(View::text_only("No devices registered yet."));
        }

        let mut lines = vec!["*Registered devices:*".to_string(), String::new()];
        for device in devices {
            let vlan_name = self
                .registry
                .vlan(&device.vlan_id)
                .map(|v| v.name)
                .unwrap_or_else(|_| device.vlan_id.clone());
            let name = if device.description.is_empty() {
                "(unnamed)".to_string()
            } else {
                device.description.clone()
            };
            let blocked = if self.registry.is_blocked(&device.username)? {
                " 🔒"
            } else {
                ""
            };
            lines.push(format!("• *{}* (`{}`) on {}{}", name, device.username, vlan_name, blocked));
        }
        Ok(View::text_only(lines.join("\n")))
    }

    async fn send_view(&self, chat_id: ChatId, view: View) -> Result<(), BotError> {
        let mut request = self
            .bot
            .send_message(chat_id, view.text)
            .parse_mode(ParseMode::Markdown);
        if let Some(keyboard) = view.keyboard {
            request = request.reply_markup(ReplyMarkup::InlineKeyboard(keyboard));
        }
        request.await?;
        Ok(())
    }
}

const HELP_MESSAGE: &str = "*🤖 vlanwarden Bot Help 🤖*

You will receive an alert whenever a new device connects to your networks. \
Use the inline buttons to add, ignore, or block the device.

*Commands:*
- /start - Start interacting with the bot.
- /help - Show this help message.
- /list - List the registered devices.
- /edit <device> - Edit a device by name or username.

Update the registry file directly to manually add, remove, or modify devices.";
