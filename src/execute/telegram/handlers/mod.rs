use async_trait::async_trait;

mod commands;
mod video;

use crate::Error;

use super::Context;

pub use commands::CommandHandler;
pub use video::VideoHandler;

#[derive(Debug, PartialEq)]
pub enum Status {
    Ignored,
    Completed,
}

#[async_trait]
pub(super) trait Handler: Send + Sync {
    /// Name of the handler, for debugging/logging uses.
    fn name(&self) -> &'static str;

    /// Method called for every update received.
    ///
    /// Returns if the update should be absorbed and not passed to the next handler.
    async fn handle(
        &self,
        cx: &Context,
        update: &tgbotapi::Update,
        command: Option<&tgbotapi::Command>,
    ) -> Result<Status, Error>;
}
