use async_trait::async_trait;
use fluent_bundle::FluentArgs;
use tgbotapi::{
    requests::{ChatAction, GetFile, SendMessage, SendVideo},
    FileType, Update,
};

use crate::{
    execute::telegram::Context, needs_field, scratch::ScratchFiles, utils, Error,
    TRIM_START_SECONDS,
};

use super::{
    Handler,
    Status::{self, Completed, Ignored},
};

/// Substring of the error description Telegram returns when a file is over
/// the bot download limit.
const FILE_TOO_LARGE: &str = "File is too large";

/// How the trim workflow ended when no error occurred.
enum TrimOutcome {
    /// The trimmed video was sent back to the user.
    Delivered,
    /// The video does not extend past the trim point, nothing to cut.
    TooShort,
}

pub struct VideoHandler;

#[async_trait]
impl Handler for VideoHandler {
    fn name(&self) -> &'static str {
        "video"
    }

    async fn handle(
        &self,
        cx: &Context,
        update: &Update,
        _command: Option<&tgbotapi::Command>,
    ) -> Result<Status, Error> {
        let message = needs_field!(update, message);
        let video = needs_field!(message, video);

        // Never reprocess our own trimmed replies.
        if matches!(message.via_bot, Some(tgbotapi::User { id, .. }) if id == cx.bot_user.id) {
            return Ok(Ignored);
        }

        match self.trim_video(cx, message, &video.file_id).await {
            Ok(TrimOutcome::Delivered) => (),
            Ok(TrimOutcome::TooShort) => {
                tracing::debug!("video was too short to trim");
            }
            Err(err) => {
                tracing::error!("unable to process video: {:?}", err);
                self.report_failure(cx, message, &err).await?;
            }
        }

        Ok(Completed)
    }
}

impl VideoHandler {
    /// Download the video, cut everything before the trim point, and send
    /// the result back.
    ///
    /// Both working files live until the returned future completes, then
    /// `ScratchFiles` removes whatever still exists on disk.
    #[tracing::instrument(skip(self, cx, message))]
    async fn trim_video(
        &self,
        cx: &Context,
        message: &tgbotapi::Message,
        file_id: &str,
    ) -> Result<TrimOutcome, Error> {
        let get_file = GetFile {
            file_id: file_id.to_owned(),
        };

        // Telegram enforces its download size limit here, before any file
        // has been written locally.
        let file = cx.make_request(&get_file).await?;
        let file_path = file.file_path.ok_or(Error::MissingData)?;

        let scratch = ScratchFiles::new(&cx.config.scratch_dir, &file.file_id);

        cx.send_generic_reply(message, "video-downloading").await?;

        let data = cx.bot.download_file(&file_path).await?;
        tokio::fs::write(scratch.source(), data).await?;

        cx.send_generic_reply(message, "video-downloaded").await?;

        let duration = cx.ffmpeg.duration(scratch.source()).await?;
        tracing::debug!(duration, "probed video duration");

        if !needs_trimming(duration) {
            cx.send_generic_reply(message, "video-too-short").await?;
            return Ok(TrimOutcome::TooShort);
        }

        let action = utils::continuous_action(
            cx.bot.clone(),
            12,
            message.chat_id(),
            ChatAction::UploadVideo,
        );

        cx.ffmpeg
            .trim_start(scratch.source(), scratch.trimmed(), TRIM_START_SECONDS)
            .await?;

        cx.send_generic_reply(message, "video-trimmed").await?;

        let trimmed = tokio::fs::read(scratch.trimmed()).await?;

        let send_video = SendVideo {
            chat_id: message.chat_id(),
            video: FileType::Bytes(format!("trimmed_{}.mp4", file.file_id), trimmed),
            reply_to_message_id: Some(message.message_id),
            supports_streaming: Some(true),
            ..Default::default()
        };

        cx.make_request(&send_video).await?;

        drop(action);

        Ok(TrimOutcome::Delivered)
    }

    /// Send the user exactly one notice describing why their video was not
    /// processed.
    async fn report_failure(
        &self,
        cx: &Context,
        message: &tgbotapi::Message,
        err: &Error,
    ) -> Result<(), Error> {
        let (name, description) = failure_reply(err);

        let bundle = cx.get_fluent_bundle(message).await;

        let args = description.map(|description| {
            let mut args = FluentArgs::new();
            args.set("message", description);
            args
        });

        let text = utils::get_message(&bundle, name, args).unwrap();

        let send_message = SendMessage {
            chat_id: message.chat_id(),
            reply_to_message_id: Some(message.message_id),
            allow_sending_without_reply: Some(true),
            text,
            ..Default::default()
        };

        cx.make_request(&send_message).await?;

        Ok(())
    }
}

/// A video only gets trimmed when it extends past the trim point. A video
/// ending exactly at the trim point has nothing left to send back.
fn needs_trimming(duration: f64) -> bool {
    duration > TRIM_START_SECONDS
}

/// Pick the notice for a failed request: a structured Telegram error gets a
/// platform-specific message, everything else the generic processing one.
fn failure_reply(err: &Error) -> (&'static str, Option<String>) {
    match err {
        Error::Telegram(tgbotapi::Error::Telegram(telegram_err)) => {
            telegram_error_reply(telegram_err.description.as_deref())
        }
        _ => ("video-error", None),
    }
}

fn telegram_error_reply(description: Option<&str>) -> (&'static str, Option<String>) {
    match description {
        Some(desc) if desc.contains(FILE_TOO_LARGE) => ("video-too-large", None),
        Some(desc) => ("video-telegram-error", Some(desc.to_string())),
        None => ("video-error", None),
    }
}

#[cfg(test)]
mod tests {
    use super::{failure_reply, needs_trimming, telegram_error_reply};
    use crate::TRIM_START_SECONDS;

    #[test]
    fn test_needs_trimming_boundary() {
        assert!(!needs_trimming(3.2), "short videos should be skipped");
        assert!(
            !needs_trimming(TRIM_START_SECONDS),
            "a video ending exactly at the trim point should be skipped"
        );
        assert!(
            needs_trimming(TRIM_START_SECONDS + 0.001),
            "any duration past the trim point should be trimmed"
        );
        assert!(needs_trimming(30.034));
    }

    #[test]
    fn test_telegram_error_reply() {
        let (name, description) =
            telegram_error_reply(Some("Bad Request: File is too large"));
        assert_eq!(
            name, "video-too-large",
            "oversized files should get the size limit notice"
        );
        assert_eq!(description, None);

        let (name, description) = telegram_error_reply(Some("Bad Request: wrong file_id"));
        assert_eq!(
            name, "video-telegram-error",
            "other structured errors should get the platform notice"
        );
        assert_eq!(description.as_deref(), Some("Bad Request: wrong file_id"));

        let (name, description) = telegram_error_reply(None);
        assert_eq!(
            name, "video-error",
            "errors with no description should get the generic notice"
        );
        assert_eq!(description, None);
    }

    #[test]
    fn test_failure_reply_processing_errors() {
        let (name, description) = failure_reply(&crate::Error::MissingData);
        assert_eq!(name, "video-error");
        assert_eq!(description, None);

        let err = crate::Error::Other(anyhow::anyhow!("moov atom not found"));
        let (name, description) = failure_reply(&err);
        assert_eq!(
            name, "video-error",
            "transcoder failures should never leak details to the user"
        );
        assert_eq!(description, None);
    }
}
