use std::{collections::HashMap, sync::Arc};

use fluent_bundle::{bundle::FluentBundle, FluentArgs, FluentError, FluentResource};
use intl_memoizer::concurrent::IntlLangMemoizer;
use tracing::Instrument;
use unic_langid::LanguageIdentifier;

pub type LangBundle = FluentBundle<FluentResource, IntlLangMemoizer>;
pub type Langs = HashMap<LanguageIdentifier, Vec<String>>;

/// Get a bundle for a desired language.
pub fn get_lang_bundle(langs: &Langs, requested: &str) -> LangBundle {
    let requested_locale = match requested.parse::<LanguageIdentifier>() {
        Ok(locale) => locale,
        Err(err) => {
            tracing::error!("unknown locale: {:?}", err);
            crate::L10N_LANGS[0].parse().unwrap()
        }
    };

    let requested_locales = vec![requested_locale];
    let default_locale: LanguageIdentifier = crate::L10N_LANGS[0]
        .parse()
        .expect("unable to parse langid");
    let available: Vec<LanguageIdentifier> = langs.keys().cloned().collect();
    let resolved_locales = fluent_langneg::negotiate_languages(
        &requested_locales,
        &available,
        Some(&default_locale),
        fluent_langneg::NegotiationStrategy::Filtering,
    );

    let current_locale = *resolved_locales.first().expect("no locales were available");

    let mut bundle = LangBundle::new_concurrent(resolved_locales.into_iter().cloned().collect());
    let resources = langs.get(current_locale).expect("missing known locale");

    for resource in resources {
        let resource =
            FluentResource::try_new(resource.to_string()).expect("unable to parse FTL string");
        bundle
            .add_resource(resource)
            .expect("unable to add resource");
    }

    bundle.set_use_isolating(false);

    bundle
}

/// Get a message from the bundle, with arguments if provided.
pub fn get_message(
    bundle: &LangBundle,
    name: &str,
    args: Option<FluentArgs>,
) -> Result<String, Vec<FluentError>> {
    let msg = bundle.get_message(name).expect("message doesn't exist");
    let pattern = msg.value().expect("message has no value");
    let mut errors = vec![];
    let value = bundle.format_pattern(pattern, args.as_ref(), &mut errors);
    if errors.is_empty() {
        Ok(value.to_string())
    } else {
        Err(errors)
    }
}

/// An action that is repeatedly sent to Telegram until a maximum number has
/// been reached or it has been dropped.
pub struct ContinuousAction {
    tx: Option<tokio::sync::oneshot::Sender<bool>>,
}

/// Send an action into a chat until the returned value is dropped or the max
/// has been reached.
#[tracing::instrument(skip(bot))]
#[must_use]
pub fn continuous_action(
    bot: Arc<tgbotapi::Telegram>,
    max: usize,
    chat_id: tgbotapi::requests::ChatID,
    action: tgbotapi::requests::ChatAction,
) -> ContinuousAction {
    use futures::StreamExt;
    use std::time::Duration;
    use tokio_stream::wrappers::IntervalStream;

    let (tx, rx) = tokio::sync::oneshot::channel();

    tokio::spawn(
        async move {
            let chat_action = tgbotapi::requests::SendChatAction { chat_id, action };

            let mut count: usize = 0;

            // Take a new value every 5 seconds until the count has exceeded
            // the max.
            let timer = Box::pin(
                IntervalStream::new(tokio::time::interval(Duration::from_secs(5)))
                    .take_while(|_| {
                        tracing::trace!(count, "evaluating chat action");
                        count += 1;
                        futures::future::ready(count < max)
                    })
                    .for_each(|_| async {
                        if let Err(err) = bot.make_request(&chat_action).await {
                            tracing::warn!("unable to send chat action: {:?}", err);
                        }
                    }),
            );

            // Wait until the value has been dropped (got something on rx) or
            // the max count has been reached.
            let was_ended = matches!(
                futures::future::select(timer, rx).await,
                futures::future::Either::Right(_)
            );

            tracing::trace!(count, was_ended, "chat action ended");
        }
        .in_current_span(),
    );

    ContinuousAction { tx: Some(tx) }
}

impl Drop for ContinuousAction {
    fn drop(&mut self) {
        let tx = std::mem::take(&mut self.tx);
        if let Some(tx) = tx {
            let _ = tx.send(true);
        }
    }
}

/// Find the user responsible for an update.
pub fn user_from_update(update: &tgbotapi::Update) -> Option<&tgbotapi::User> {
    use tgbotapi::*;

    match &update {
        Update {
            message: Some(Message { from, .. }),
            ..
        } => from.as_ref(),
        Update {
            edited_message: Some(Message { from, .. }),
            ..
        } => from.as_ref(),
        Update {
            channel_post: Some(Message { from, .. }),
            ..
        } => from.as_ref(),
        _ => None,
    }
}

/// Find the chat responsible for an update.
pub fn chat_from_update(update: &tgbotapi::Update) -> Option<&tgbotapi::Chat> {
    use tgbotapi::*;

    match &update {
        Update {
            message: Some(message),
            ..
        } => Some(&message.chat),
        Update {
            edited_message: Some(message),
            ..
        } => Some(&message.chat),
        Update {
            channel_post: Some(message),
            ..
        } => Some(&message.chat),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{get_lang_bundle, get_message, ContinuousAction, Langs};
    use fluent_bundle::FluentArgs;

    #[test]
    fn test_continuous_action_signals_on_drop() {
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        let action = ContinuousAction { tx: Some(tx) };

        assert!(rx.try_recv().is_err(), "no end signal before drop");

        drop(action);
        assert!(
            rx.try_recv().unwrap(),
            "dropping the action should signal the sender task to stop"
        );
    }

    fn get_langs(resource: &str) -> Langs {
        let mut langs = Langs::new();
        langs.insert("en-US".parse().unwrap(), vec![resource.to_string()]);
        langs
    }

    #[test]
    fn test_get_message() {
        let langs = get_langs("hello = Hello, world!\nwith-arg = Value was { $message }.");
        let bundle = get_lang_bundle(&langs, "en-US");

        let text = get_message(&bundle, "hello", None).unwrap();
        assert_eq!(text, "Hello, world!");

        let mut args = FluentArgs::new();
        args.set("message", "test");
        let text = get_message(&bundle, "with-arg", Some(args)).unwrap();
        assert_eq!(text, "Value was test.");
    }

    #[test]
    fn test_unknown_locale_falls_back() {
        let langs = get_langs("hello = Hello, world!");
        let bundle = get_lang_bundle(&langs, "zz-ZZ");

        let text = get_message(&bundle, "hello", None).unwrap();
        assert_eq!(text, "Hello, world!", "unknown locales should use en-US");
    }

    #[test]
    fn test_shipped_resource_has_all_messages() {
        let langs = get_langs(include_str!("../langs/en-US/trimbot.ftl"));
        let bundle = get_lang_bundle(&langs, "en-US");

        for name in [
            "welcome",
            "video-downloading",
            "video-downloaded",
            "video-trimmed",
            "video-too-short",
            "video-too-large",
            "video-error",
        ] {
            assert!(
                get_message(&bundle, name, None).is_ok(),
                "missing message: {}",
                name
            );
        }

        let mut args = FluentArgs::new();
        args.set("message", "File is temporarily unavailable");
        let text = get_message(&bundle, "video-telegram-error", Some(args)).unwrap();
        assert!(text.contains("File is temporarily unavailable"));
    }
}
