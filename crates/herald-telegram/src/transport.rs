use std::cell::RefCell;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{Chat, ChatKind, ChatMemberKind, PublicChatKind};
use teloxide::RequestError;
use tracing::warn;

use herald_core::config::TelegramConfig;
use herald_core::types::{Destination, DestinationId, DestinationKind};
use herald_transport::{Transport, TransportError};

/// Telegram transport for bot-token identities.
///
/// The Bot API cannot enumerate a bot's chats, so the destination universe
/// is the configured `chat_ids` list; `list_destinations` validates each id
/// against the live API and reads its restriction and slow-mode metadata.
///
/// Lives on the transport worker thread — interior mutability via `RefCell`
/// is safe there.
pub struct TelegramTransport {
    token: RefCell<Option<String>>,
    chat_ids: Vec<i64>,
    bot: RefCell<Option<Bot>>,
}

impl TelegramTransport {
    pub fn new(config: &TelegramConfig) -> Self {
        let token = if config.bot_token.is_empty() {
            None
        } else {
            Some(config.bot_token.clone())
        };
        Self {
            token: RefCell::new(token),
            chat_ids: config.chat_ids.clone(),
            bot: RefCell::new(None),
        }
    }

    fn connected_bot(&self) -> Result<Bot, TransportError> {
        self.bot
            .borrow()
            .clone()
            .ok_or(TransportError::NotConnected)
    }
}

#[async_trait(?Send)]
impl Transport for TelegramTransport {
    async fn connect(&self, identity: Option<String>) -> Result<(), TransportError> {
        if let Some(token) = identity {
            *self.token.borrow_mut() = Some(token);
        }
        let token = self
            .token
            .borrow()
            .clone()
            .ok_or_else(|| TransportError::Auth("no bot token configured".into()))?;

        let bot = Bot::new(token);
        bot.get_me()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        *self.bot.borrow_mut() = Some(bot);
        Ok(())
    }

    async fn is_authorized(&self) -> Result<bool, TransportError> {
        let bot = { self.bot.borrow().clone() };
        match bot {
            None => Ok(false),
            Some(bot) => Ok(bot.get_me().await.is_ok()),
        }
    }

    async fn request_login_code(&self, _identity: String) -> Result<(), TransportError> {
        Err(TransportError::Auth(
            "bot identities authenticate with a token; no login code is issued".into(),
        ))
    }

    async fn complete_login(
        &self,
        _code: String,
        _second_factor: Option<String>,
    ) -> Result<(), TransportError> {
        Err(TransportError::Auth(
            "bot identities authenticate with a token; there is no code login".into(),
        ))
    }

    async fn list_destinations(&self) -> Result<Vec<Destination>, TransportError> {
        let bot = self.connected_bot()?;
        let me = bot
            .get_me()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        if self.chat_ids.is_empty() {
            warn!("no chat_ids configured; destination list will be empty");
        }

        let mut destinations = Vec::with_capacity(self.chat_ids.len());
        for &id in &self.chat_ids {
            let chat_id = ChatId(id);
            let chat = match bot.get_chat(chat_id).await {
                Ok(chat) => chat,
                Err(e) => {
                    warn!(chat = id, error = %e, "get_chat failed, skipping");
                    continue;
                }
            };
            // Only group-like chats are broadcast destinations.
            if !(chat.is_group() || chat.is_supergroup()) {
                continue;
            }

            let kind = if chat.is_supergroup() {
                DestinationKind::Broadcast
            } else {
                DestinationKind::Group
            };

            let eligible = match bot.get_chat_member(chat_id, me.user.id).await {
                Ok(member) => member_can_post(&member.kind),
                Err(e) => {
                    warn!(chat = id, error = %e, "get_chat_member failed, marking ineligible");
                    false
                }
            };

            destinations.push(Destination {
                id,
                title: chat.title().unwrap_or("(untitled)").to_string(),
                kind,
                declared_cooldown_secs: slow_mode_delay_secs(&chat),
                cooldown_remaining_secs: 0,
                eligible,
                excluded: false,
            });
        }
        Ok(destinations)
    }

    async fn send(&self, destination: DestinationId, text: String) -> Result<(), TransportError> {
        let bot = self.connected_bot()?;
        bot.send_message(ChatId(destination), text)
            .await
            .map(|_| ())
            .map_err(map_send_error)
    }
}

fn map_send_error(err: RequestError) -> TransportError {
    match err {
        RequestError::RetryAfter(secs) => TransportError::RateLimited {
            wait_secs: secs.seconds(),
        },
        other => TransportError::SendFailed(other.to_string()),
    }
}

/// Whether our membership allows posting at all.
fn member_can_post(kind: &ChatMemberKind) -> bool {
    match kind {
        ChatMemberKind::Left | ChatMemberKind::Banned(_) => false,
        ChatMemberKind::Restricted(r) => r.can_send_messages,
        _ => true,
    }
}

/// Declared slow-mode window, if the chat is a supergroup with one.
fn slow_mode_delay_secs(chat: &Chat) -> u32 {
    match &chat.kind {
        ChatKind::Public(public) => match &public.kind {
            PublicChatKind::Supergroup(sg) => {
                sg.slow_mode_delay.map(|s| s.seconds()).unwrap_or(0)
            }
            _ => 0,
        },
        _ => 0,
    }
}
