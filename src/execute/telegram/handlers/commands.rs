use async_trait::async_trait;
use tgbotapi::{Command, Update};

use crate::{execute::telegram::Context, needs_field, Error};

use super::{
    Handler,
    Status::{self, Completed, Ignored},
};

pub struct CommandHandler;

#[async_trait]
impl Handler for CommandHandler {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn handle(
        &self,
        cx: &Context,
        update: &Update,
        _command: Option<&Command>,
    ) -> Result<Status, Error> {
        let message = needs_field!(update, message);

        let command = match message.get_command() {
            Some(command) => command,
            None => return Ok(Ignored),
        };

        if let Some(username) = command.username {
            let bot_username = cx.bot_user.username.as_ref().unwrap();
            if username.to_lowercase() != bot_username.to_lowercase() {
                tracing::debug!(?username, "got command for other bot");
                return Ok(Ignored);
            }
        }

        tracing::debug!(command = ?command.name, "got command");

        match command.name.as_ref() {
            "/help" | "/start" => {
                cx.send_generic_reply(message, "welcome").await?;
            }
            _ => tracing::info!(command = ?command.name, "unknown command"),
        }

        Ok(Completed)
    }
}
