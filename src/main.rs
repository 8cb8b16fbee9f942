use clap::Parser;

mod execute;
mod scratch;
mod services;
mod utils;

static L10N_RESOURCES: &[&str] = &["trimbot.ftl"];
static L10N_LANGS: &[&str] = &["en-US"];

/// Number of seconds removed from the start of every accepted video.
pub const TRIM_START_SECONDS: f64 = 15.0;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("telegram error: {0}")]
    Telegram(#[from] tgbotapi::Error),
    #[error("missing data")]
    MissingData,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("other error: {0}")]
    Other(#[from] anyhow::Error),
}

#[derive(Clone, Debug, Parser)]
#[clap(about = "Telegram bot that trims the first 15 seconds off videos")]
pub struct RunConfig {
    /// API token for the Telegram bot.
    #[clap(long, env = "TELEGRAM_BOT_TOKEN")]
    pub telegram_bot_token: String,

    /// Directory holding in-progress video files.
    #[clap(long, env, default_value = ".")]
    pub scratch_dir: std::path::PathBuf,

    /// Path to the ffmpeg binary.
    #[clap(long, env, default_value = "ffmpeg")]
    pub ffmpeg_path: String,

    /// Path to the ffprobe binary.
    #[clap(long, env, default_value = "ffprobe")]
    pub ffprobe_path: String,
}

fn configure_tracing() {
    use tracing_subscriber::layer::SubscriberExt;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env();

    if matches!(std::env::var("LOG_FMT").as_deref(), Ok("json")) {
        let subscriber = tracing_subscriber::fmt::layer().json().with_target(true);
        let subscriber = tracing_subscriber::Registry::default()
            .with(env_filter)
            .with(subscriber);
        tracing::subscriber::set_global_default(subscriber).unwrap();
    } else {
        let subscriber = tracing_subscriber::fmt::layer();
        let subscriber = tracing_subscriber::Registry::default()
            .with(env_filter)
            .with(subscriber);
        tracing::subscriber::set_global_default(subscriber).unwrap();
    }
}

#[cfg(feature = "env")]
fn load_env() {
    dotenv::dotenv().unwrap();
}

#[cfg(not(feature = "env"))]
fn load_env() {}

fn main() {
    load_env();
    configure_tracing();

    let config = RunConfig::parse();

    execute::telegram::start_telegram(config);
}
