use std::{collections::HashMap, sync::Arc, time::Duration};

use fluent_bundle::{bundle::FluentBundle, FluentResource};
use intl_memoizer::concurrent::IntlLangMemoizer;
use tgbotapi::{
    requests::{DeleteWebhook, GetMe, GetUpdates},
    Telegram, TelegramRequest,
};
use tokio::sync::RwLock;
use tracing::Instrument;
use unic_langid::LanguageIdentifier;

use crate::{
    services::ffmpeg::Ffmpeg, utils, Error, RunConfig, L10N_LANGS, L10N_RESOURCES,
};

mod handlers;

type BoxedHandler = Box<dyn handlers::Handler + Send + Sync>;

pub fn start_telegram(config: RunConfig) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("could not create runtime");

    rt.block_on(run_telegram(config))
}

async fn run_telegram(config: RunConfig) {
    let mut dir = std::env::current_dir().expect("unable to get directory");
    dir.push("langs");

    let mut langs = HashMap::with_capacity(L10N_LANGS.len());

    for lang in L10N_LANGS {
        let path = dir.join(lang);

        let mut lang_resources = Vec::with_capacity(L10N_RESOURCES.len());
        let langid = lang
            .parse::<LanguageIdentifier>()
            .expect("unable to parse language identifier");

        for resource in L10N_RESOURCES {
            let file = path.join(resource);
            let s = std::fs::read_to_string(file).expect("unable to read language file");

            lang_resources.push(s);
        }

        langs.insert(langid, lang_resources);
    }

    tokio::fs::create_dir_all(&config.scratch_dir)
        .await
        .expect("could not create scratch directory");

    let bot = tgbotapi::Telegram::new(config.telegram_bot_token.clone());

    let bot_user = bot
        .make_request(&GetMe)
        .await
        .expect("could not get bot user");

    let ffmpeg = Ffmpeg::new(config.ffmpeg_path.clone(), config.ffprobe_path.clone());

    let handlers: Vec<BoxedHandler> = vec![
        Box::new(handlers::CommandHandler),
        Box::new(handlers::VideoHandler),
    ];

    let cx = Arc::new(Context {
        handlers,

        langs,
        best_lang: Default::default(),

        config,
        ffmpeg,

        bot: Arc::new(bot),
        bot_user,
    });

    poll_updates(cx).await
}

async fn poll_updates(cx: Arc<Context>) {
    if let Err(err) = cx.bot.make_request(&DeleteWebhook).await {
        tracing::warn!("unable to clear webhook: {:?}", err);
    }

    let mut update_req = GetUpdates {
        timeout: Some(30),
        ..Default::default()
    };

    loop {
        let updates = match cx.bot.make_request(&update_req).await {
            Ok(updates) => updates,
            Err(err) => {
                tracing::error!("unable to get updates: {:?}", err);
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };

        for update in updates {
            update_req.offset = Some(update.update_id + 1);

            let cx = cx.clone();

            tokio::spawn(async move {
                if let Err(err) = process_update(&cx, update).await {
                    tracing::error!("unable to process update: {:?}", err);
                }
            });
        }
    }
}

pub struct Context {
    handlers: Vec<BoxedHandler>,

    langs: HashMap<LanguageIdentifier, Vec<String>>,
    best_lang: RwLock<HashMap<String, Arc<FluentBundle<FluentResource, IntlLangMemoizer>>>>,

    pub config: RunConfig,
    pub ffmpeg: Ffmpeg,

    pub bot: Arc<Telegram>,
    pub bot_user: tgbotapi::User,
}

pub trait LocaleSource {
    fn locale(&self) -> Option<&str>;
}

impl LocaleSource for Option<&str> {
    fn locale(&self) -> Option<&str> {
        self.to_owned()
    }
}

impl LocaleSource for &tgbotapi::Message {
    fn locale(&self) -> Option<&str> {
        self.from
            .as_ref()
            .and_then(|user| user.language_code.as_deref())
    }
}

impl Context {
    #[tracing::instrument(skip(self, requested), fields(requested))]
    async fn get_fluent_bundle<R: LocaleSource>(
        &self,
        requested: R,
    ) -> Arc<FluentBundle<FluentResource, IntlLangMemoizer>> {
        let locale = requested.locale().unwrap_or(crate::L10N_LANGS[0]);
        tracing::Span::current().record("requested", locale);

        tracing::trace!("looking up language bundle");

        {
            let lock = self.best_lang.read().await;

            if let Some(bundle) = lock.get(locale) {
                tracing::trace!("already computed best language");
                return bundle.clone();
            }
        }

        tracing::info!("got new language, building bundle");

        let bundle = Arc::new(utils::get_lang_bundle(&self.langs, locale));

        {
            let mut lock = self.best_lang.write().await;
            lock.insert(locale.to_string(), bundle.clone());
        }

        bundle
    }

    async fn make_request<T>(&self, request: &T) -> Result<T::Response, tgbotapi::Error>
    where
        T: TelegramRequest,
    {
        let mut attempts = 0;

        loop {
            let err = match self.bot.make_request(request).await {
                Ok(resp) => return Ok(resp),
                Err(err) => err,
            };

            if attempts > 2 {
                return Err(err);
            }

            let retry_after = match err {
                tgbotapi::Error::Telegram(tgbotapi::TelegramError {
                    parameters:
                        Some(tgbotapi::ResponseParameters {
                            retry_after: Some(retry_after),
                            ..
                        }),
                    ..
                }) => {
                    tracing::warn!(retry_after, "request was rate limited, retrying");
                    retry_after
                }
                tgbotapi::Error::Request(err) => {
                    tracing::warn!("telegram network request error: {}", err);
                    2
                }
                err => {
                    tracing::warn!("got other telegram error: {}", err);
                    return Err(err);
                }
            };

            tokio::time::sleep(Duration::from_secs(retry_after as u64)).await;
            attempts += 1;
        }
    }

    async fn send_generic_reply(
        &self,
        message: &tgbotapi::Message,
        name: &str,
    ) -> Result<tgbotapi::Message, Error> {
        let bundle = self.get_fluent_bundle(message).await;

        let text = utils::get_message(&bundle, name, None).unwrap();

        let send_message = tgbotapi::requests::SendMessage {
            chat_id: message.chat_id(),
            reply_to_message_id: Some(message.message_id),
            allow_sending_without_reply: Some(true),
            text,
            ..Default::default()
        };

        let message = self.make_request(&send_message).await?;

        Ok(message)
    }
}

#[tracing::instrument(skip(cx, update), fields(user_id, chat_id))]
async fn process_update(cx: &Context, update: tgbotapi::Update) -> Result<(), Error> {
    tracing::trace!("starting to process update");

    let user = utils::user_from_update(&update);
    let chat = utils::chat_from_update(&update);

    if let Some(user) = user {
        tracing::Span::current().record("user_id", user.id);
    }

    if let Some(chat) = chat {
        tracing::Span::current().record("chat_id", chat.id);
    }

    let command = update
        .message
        .as_ref()
        .and_then(|message| message.get_command());

    for handler in &cx.handlers {
        match handler
            .handle(cx, &update, command.as_ref())
            .instrument(tracing::info_span!(
                "handler",
                handler_name = handler.name()
            ))
            .await
        {
            Ok(status) if status == handlers::Status::Completed => {
                tracing::debug!(handled_by = handler.name(), "completed update");
                break;
            }
            Err(err) => {
                tracing::error!(handled_by = handler.name(), "handler error: {:?}", err);
                break;
            }
            _ => (),
        }
    }

    Ok(())
}

/// A convenience macro for handlers to ignore updates that don't contain a
/// required field.
#[macro_export]
macro_rules! needs_field {
    ($message:expr, $field:tt) => {
        match $message.$field {
            Some(ref field) => field,
            _ => return Ok($crate::execute::telegram::handlers::Status::Ignored),
        }
    };
}
