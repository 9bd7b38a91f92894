// This is the entry point of the anti-spam service.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (databases, files)
// - `host/` = Adapters for the out-of-scope chat platform and external collaborators
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Run the dispatcher loop

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;
#[path = "host/host_layer.rs"]
mod host;

use crate::core::admin::AdminHandler;
use crate::core::chat_api::{ChatApi, Update};
use crate::core::config::{BanMode, DispatcherConfig};
use crate::core::dictionary::{DictionaryStore, DictionaryType};
use crate::core::dispatcher::Dispatcher;
use crate::core::locator::Locator;
use crate::core::pipeline::{KeywordWeightDetector, Pipeline, StopPhraseDetector, Trainable};
use crate::core::duplicate::DuplicateDetector;
use crate::infra::dictionary_sqlite::SqliteDictionaryStore;
use crate::infra::samples_store::{Label, SamplesStore};
use crate::host::logging_client::LoggingChatApi;
use crate::host::tracing_spam_logger::TracingSpamLogger;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

const DEFAULT_GID: &str = "default";

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

fn env_duration_secs(name: &str, default_secs: u64) -> Duration {
    Duration::from_secs(
        std::env::var(name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default_secs),
    )
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    dotenv::dotenv().ok();

    let data_dir = std::env::var("SPAMWARDEN_DATA_DIR").unwrap_or_else(|_| "data".to_string());
    std::fs::create_dir_all(&data_dir).expect("failed to create data directory");

    let dict_db_path = format!("{data_dir}/dictionary.db");
    let dict_conn_str = format!("sqlite://{dict_db_path}");
    let dict_options = sqlx::sqlite::SqliteConnectOptions::from_str(&dict_conn_str)
        .expect("invalid dictionary db connection string")
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5));

    let dict_pool = sqlx::sqlite::SqlitePoolOptions::new()
        .connect_with(dict_options)
        .await
        .expect("failed to connect to dictionary db");
    let dictionary_store = Arc::new(SqliteDictionaryStore::new(dict_pool));
    dictionary_store.migrate().await.expect("failed to migrate dictionary db");

    let samples_store = Arc::new(
        SamplesStore::new(format!("{data_dir}/samples.json")).expect("failed to open samples store"),
    );

    // -------------------------------------------------------------------
    // Classifier pipeline
    // -------------------------------------------------------------------
    let stop_phrases = dictionary_store
        .read(DEFAULT_GID, DictionaryType::StopPhrase)
        .await
        .unwrap_or_default();

    let keyword_detector = Arc::new(KeywordWeightDetector::new(
        std::env::var("SPAMWARDEN_KEYWORD_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5),
    ));
    for sample in samples_store.all().await {
        match sample.label {
            Label::Spam => keyword_detector.update_spam(&sample.text),
            Label::Ham => keyword_detector.update_ham(&sample.text),
        }
    }

    let duplicate_threshold: u32 = std::env::var("SPAMWARDEN_DUPLICATE_THRESHOLD")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3);
    let duplicate_window = env_duration_secs("SPAMWARDEN_DUPLICATE_WINDOW_SECS", 3600);

    let pipeline = Pipeline::new(vec![
        Box::new(StopPhraseDetector::new(stop_phrases)),
        Box::new(DuplicateDetector::new(duplicate_threshold, duplicate_window)),
        Box::new(keyword_detector.clone()),
    ])
    .with_ban_interval(env_duration_secs("SPAMWARDEN_BAN_DURATION_SECS", 86400));

    // -------------------------------------------------------------------
    // Dispatcher configuration
    // -------------------------------------------------------------------
    let mut config = DispatcherConfig::default();
    config.training_mode = env_flag("SPAMWARDEN_TRAINING_MODE");
    config.no_spam_reply = env_flag("SPAMWARDEN_NO_SPAM_REPLY");
    config.suppress_join_message = env_flag("SPAMWARDEN_SUPPRESS_JOIN_MESSAGE");
    config.disable_admin_spam_forward = env_flag("SPAMWARDEN_DISABLE_ADMIN_SPAM_FORWARD");
    config.idle_duration = env_duration_secs("SPAMWARDEN_IDLE_SECS", 30);
    config.ban_mode = match std::env::var("SPAMWARDEN_BAN_MODE").unwrap_or_default().as_str() {
        "dry" => BanMode::Dry,
        "soft" => BanMode::SoftBan,
        _ => BanMode::Ban,
    };
    if let Ok(supers) = std::env::var("SPAMWARDEN_SUPER_USERS") {
        config.super_users.extend(supers.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()));
    }
    config.main_chat_id = std::env::var("SPAMWARDEN_MAIN_CHAT_ID").ok().filter(|s| !s.is_empty());
    if let Ok(testing) = std::env::var("SPAMWARDEN_TESTING_CHAT_IDS") {
        config.testing_ids.extend(testing.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()));
    }
    config.warn_msg = std::env::var("SPAMWARDEN_WARN_MSG").ok();
    config.startup_msg = std::env::var("SPAMWARDEN_STARTUP_MSG").ok();

    let admin_chat_id = std::env::var("SPAMWARDEN_ADMIN_CHAT_ID").ok();

    let chat_api = Arc::new(LoggingChatApi::default());
    let spam_logger = Arc::new(TracingSpamLogger);
    let locator = Arc::new(Locator::new(env_duration_secs("SPAMWARDEN_LOCATOR_TTL_SECS", 86400)));

    // Resolve group administrators into the supers set (matched by numeric
    // id; `@handle` resolution is left to a real platform adapter) before
    // the dispatcher starts serving the chat.
    if let Some(main_chat) = &config.main_chat_id {
        match chat_api.get_chat_administrators(main_chat).await {
            Ok(admins) => {
                config.super_users.extend(admins.into_iter().map(|a| a.user_id));
            }
            Err(err) => {
                tracing::warn!(%err, "failed to fetch chat administrators at startup");
            }
        }

        if let Some(startup_msg) = &config.startup_msg {
            if let Err(err) = chat_api.send_markdown(main_chat, startup_msg).await {
                tracing::warn!(%err, "failed to post startup message");
            }
        }
    }

    let train_spam_detector = keyword_detector.clone();
    let train_spam_samples = samples_store.clone();
    let train_spam = Arc::new(move |sample: &str| {
        train_spam_detector.update_spam(sample);
        let store = train_spam_samples.clone();
        let text = sample.to_string();
        tokio::spawn(async move {
            if let Err(err) = store.record(text, Label::Spam).await {
                tracing::warn!(%err, "failed to persist spam training sample");
            }
        });
    });
    let train_ham_detector = keyword_detector.clone();
    let train_ham_samples = samples_store.clone();
    let train_ham = Arc::new(move |sample: &str| {
        train_ham_detector.update_ham(sample);
        let store = train_ham_samples.clone();
        let text = sample.to_string();
        tokio::spawn(async move {
            if let Err(err) = store.record(text, Label::Ham).await {
                tracing::warn!(%err, "failed to persist ham training sample");
            }
        });
    });
    let admin = Arc::new(AdminHandler::new(locator.clone(), train_spam, train_ham));

    let dispatcher = Dispatcher::new(config, chat_api, pipeline, locator, spam_logger, admin_chat_id, admin);

    // In production the update channel is fed by the real bot client's
    // update stream; here it simply never receives anything, giving a
    // complete, runnable binary with no platform credentials required.
    let (_tx, rx) = mpsc::channel::<Update>(128);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    tracing::info!("spamwarden dispatcher starting");
    dispatcher.run(rx, shutdown_rx).await;
}
