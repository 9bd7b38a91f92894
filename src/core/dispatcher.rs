// Event dispatcher (C7). Turns a stream of `Update`s into
// calls against `ChatApi`. Owns no background thread of its own: `run` is a
// single `tokio::select!` loop the caller spawns, generalized from the
// bot's `tokio::spawn` + periodic `sleep` poller idiom into an event-driven
// loop with a periodic idle tick instead of a fixed poll interval.

use super::admin::{parse_callback, AdminHandler, CallbackAction, ReplyCommand};
use super::chat_api::{CallbackQuery, ChatApi, ChatApiError, Update};
use super::config::{BanMode, DispatcherConfig};
use super::locator::{join_key, Locator};
use super::pipeline::Pipeline;
use super::spam_logger::{SpamLogger, SpamRecord};
use super::types::{ChatId, MessageId, Request, RequestMeta, UserId, Verdict};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

pub struct Dispatcher {
    config: DispatcherConfig,
    chat_api: Arc<dyn ChatApi>,
    pipeline: Pipeline,
    locator: Arc<Locator>,
    spam_logger: Arc<dyn SpamLogger>,
    admin_chat_id: Option<ChatId>,
    admin: Arc<AdminHandler>,
}

impl Dispatcher {
    pub fn new(
        config: DispatcherConfig,
        chat_api: Arc<dyn ChatApi>,
        pipeline: Pipeline,
        locator: Arc<Locator>,
        spam_logger: Arc<dyn SpamLogger>,
        admin_chat_id: Option<ChatId>,
        admin: Arc<AdminHandler>,
    ) -> Self {
        Self {
            config,
            chat_api,
            pipeline,
            locator,
            spam_logger,
            admin_chat_id,
            admin,
        }
    }

    /// Drive the dispatcher until `shutdown` is set to `true`. Idle periods
    /// longer than `config.idle_duration` trigger a no-op maintenance tick
    /// (a hook for callers that want periodic housekeeping without a second
    /// spawned task).
    pub async fn run(&self, mut updates: mpsc::Receiver<Update>, mut shutdown: watch::Receiver<bool>) {
        let mut idle = tokio::time::interval(self.config.idle_duration);
        idle.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe_update = updates.recv() => {
                    match maybe_update {
                        Some(update) => self.handle_update(update).await,
                        None => break,
                    }
                }
                _ = idle.tick() => {
                    tracing::debug!("dispatcher idle tick");
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn handle_update(&self, update: Update) {
        match update {
            Update::Message {
                chat_id,
                msg_id,
                user_id,
                user_name,
                text,
                has_image,
                forward_origin,
                reply_to_msg_id,
            } => {
                if self.is_admin_message(&chat_id, &user_id) {
                    self.handle_admin_message(&text, reply_to_msg_id.as_deref()).await;
                    return;
                }
                if let Some(reply_to) = reply_to_msg_id.as_deref() {
                    if self.config.is_super_user(&user_id) {
                        if let Some(command) = ReplyCommand::parse(&text) {
                            self.handle_reply_command(reply_to, command).await;
                            return;
                        }
                    }
                }
                let meta = RequestMeta {
                    has_image,
                    forward_origin,
                    member_age: None,
                };
                self.classify_and_enact(chat_id, Some(msg_id), user_id, user_name, text, meta)
                    .await;
            }
            Update::EditedMessage {
                chat_id,
                msg_id,
                user_id,
                user_name,
                text,
            } => {
                self.classify_and_enact(chat_id, Some(msg_id), user_id, user_name, text, RequestMeta::default())
                    .await;
            }
            Update::ChannelPost { chat_id, msg_id, text } => {
                let sender = chat_id.clone();
                self.classify_and_enact(chat_id, Some(msg_id), sender, "channel".to_string(), text, RequestMeta::default())
                    .await;
            }
            Update::CallbackQuery(cb) => {
                self.handle_callback_query(cb).await;
            }
            Update::ServiceNewMembers { chat_id, members } => {
                for member in members {
                    self.locator.add_message(
                        "",
                        chat_id.clone(),
                        member.user_id.clone(),
                        member.user_name.clone(),
                        "",
                        Some(join_key(&chat_id, &member.user_id)),
                    );
                    if !self.config.suppress_join_message {
                        let greeting = format!("welcome, {}", member.user_name);
                        let _ = self.send_hardened(&chat_id, &greeting).await;
                    }
                }
            }
            Update::ServiceLeftMember { chat_id, user_id } => {
                let key = join_key(&chat_id, &user_id);
                if let Some(located) = self.locator.remove_message(&key) {
                    let _ = self.chat_api.delete_message(&chat_id, &located.msg_id).await;
                }
            }
        }
    }

    async fn classify_and_enact(
        &self,
        chat_id: ChatId,
        msg_id: Option<MessageId>,
        user_id: UserId,
        user_name: String,
        text: String,
        meta: RequestMeta,
    ) {
        if !self.config.is_scoped_chat(&chat_id) {
            return;
        }
        if text.trim().is_empty() {
            return;
        }

        // Keyed both by content hash and by `msg_id`, so a later admin-chat
        // `/spam` reply or in-chat `spam`/`ban`/`warn` reply can resolve the
        // offending message back to its author.
        self.locator.add_message(
            &text,
            chat_id.clone(),
            user_id.clone(),
            user_name.clone(),
            msg_id.clone().unwrap_or_default(),
            msg_id.clone(),
        );

        let req = Request::new(text, user_id.clone())
            .with_user_name(user_name.clone())
            .with_meta(meta);
        let result = self.pipeline.check(&req);

        if !result.spam {
            return;
        }

        let is_super = self.config.is_super_user(&user_id);

        let verdict = Verdict {
            checks: result.checks.clone(),
            spam: true,
            send: !self.config.no_spam_reply && !self.config.training_mode,
            ban_interval: self.pipeline.ban_interval,
            delete_reply_to: !is_super,
            reply_to: msg_id.clone(),
            user: user_id.clone(),
            channel_id: chat_id.clone(),
        };

        if verdict.send {
            if let Some(warn_msg) = &self.config.warn_msg {
                let _ = self.send_hardened(&chat_id, warn_msg).await;
            }
        }

        if is_super {
            // Super-users are never acted upon; under TrainingMode the
            // would-be ban is still reported so an admin can review it.
            if self.config.training_mode && !self.config.disable_admin_spam_forward {
                if let Some(admin_chat) = &self.admin_chat_id {
                    let summary = format!(
                        "possible spam from super-user {user_name} ({user_id}) in {chat_id}: {}",
                        req.msg
                    );
                    let _ = self.send_hardened(admin_chat, &summary).await;
                }
            }
            return;
        }

        self.locator.add_spam(user_id.clone(), result.checks.clone());

        self.spam_logger
            .log(SpamRecord {
                timestamp: Utc::now(),
                chat_id: chat_id.clone(),
                user_id: user_id.clone(),
                user_name: user_name.clone(),
                msg_id: msg_id.clone(),
                verdict: verdict.clone(),
            })
            .await;

        let origin = msg_id.clone().unwrap_or_default();

        if self.config.training_mode {
            if !self.config.disable_admin_spam_forward {
                if let Some(admin_chat) = &self.admin_chat_id {
                    let summary = format!(
                        "possible spam from {user_name} ({user_id}) in {chat_id}: {}\nconfirm:{user_id}:{chat_id}:{origin} reject:{user_id}:{chat_id}:{origin}",
                        req.msg
                    );
                    self.report_to_admin_chat(admin_chat, &summary, &user_id, &user_name).await;
                }
            }
            return;
        }

        self.enact_ban(&chat_id, &user_id, verdict.ban_interval).await;

        if verdict.delete_reply_to {
            if let Some(msg_id) = &verdict.reply_to {
                let _ = self.chat_api.delete_message(&chat_id, msg_id).await;
            }
        }

        if !self.config.disable_admin_spam_forward {
            if let Some(admin_chat) = &self.admin_chat_id {
                let summary = format!("banned {user_name} ({user_id}) in {chat_id} unban:{user_id}:{chat_id}:{origin}");
                self.report_to_admin_chat(admin_chat, &summary, &user_id, &user_name).await;
            }
        }
    }

    async fn enact_ban(&self, chat_id: &ChatId, user_id: &UserId, ban_interval: Duration) {
        match self.config.ban_mode {
            BanMode::Dry => {
                tracing::info!(%chat_id, %user_id, "dry run: would ban");
            }
            BanMode::SoftBan => {
                if let Err(err) = self.chat_api.restrict_chat_member(chat_id, user_id, ban_interval).await {
                    tracing::warn!(%chat_id, %user_id, %err, "soft ban failed");
                }
            }
            BanMode::Ban => {
                if let Err(err) = self.chat_api.ban_chat_member(chat_id, user_id, ban_interval).await {
                    tracing::warn!(%chat_id, %user_id, %err, "ban failed");
                }
            }
        }
    }

    /// Send a report to the admin chat and record its message id in the
    /// locator against the reported user, so a reply to the report (a
    /// `/spam` text command) can be resolved back to them.
    async fn report_to_admin_chat(&self, admin_chat: &ChatId, summary: &str, user_id: &UserId, user_name: &str) {
        if let Ok(report_id) = self.send_hardened(admin_chat, summary).await {
            self.locator.add_message("", admin_chat.clone(), user_id.clone(), user_name.to_string(), report_id.clone(), Some(report_id));
        }
    }

    fn is_admin_message(&self, chat_id: &ChatId, user_id: &UserId) -> bool {
        self.admin_chat_id.as_deref() == Some(chat_id.as_str()) && self.config.is_super_user(user_id)
    }

    /// `/spam` (or bare `spam`) sent in the admin chat as a reply to a prior
    /// report: train the spam detector(s) on the original sample.
    async fn handle_admin_message(&self, text: &str, reply_to_msg_id: Option<&str>) {
        if !text.trim().trim_start_matches('/').eq_ignore_ascii_case("spam") {
            return;
        }
        let Some(reply_to) = reply_to_msg_id else {
            self.report_admin_error("error: /spam must reply to a reported message").await;
            return;
        };
        let Some(located) = self.locator.message(reply_to) else {
            self.report_admin_error("error: no located message for that report").await;
            return;
        };
        if let Err(err) = self.admin.handle_reply_command(&located.user_id, ReplyCommand::Spam) {
            self.report_admin_error(&format!("error: {err}")).await;
        }
    }

    /// A super-user's bare `spam`/`ban`/`warn` reply to a message in a
    /// monitored chat, resolved via the locator back to the original
    /// author.
    async fn handle_reply_command(&self, reply_to_msg_id: &str, command: ReplyCommand) {
        let Some(located) = self.locator.message(reply_to_msg_id) else {
            self.report_admin_error("error: no located message for that reply").await;
            return;
        };
        if let Err(err) = self.admin.handle_reply_command(&located.user_id, command) {
            self.report_admin_error(&format!("error: {err}")).await;
            return;
        }
        match command {
            ReplyCommand::Spam => {}
            ReplyCommand::Ban => {
                self.enact_ban(&located.chat_id, &located.user_id, self.pipeline.ban_interval).await;
            }
            ReplyCommand::Warn => {
                if let Some(warn_msg) = &self.config.warn_msg {
                    let _ = self.send_hardened(&located.chat_id, warn_msg).await;
                }
            }
        }
    }

    /// Inline keyboard callback from an admin report: unban is carried out
    /// against the host directly, confirm/reject go through `AdminHandler`.
    async fn handle_callback_query(&self, cb: CallbackQuery) {
        let payload = match parse_callback(&cb.data) {
            Ok(payload) => payload,
            Err(err) => {
                let _ = self.chat_api.answer_callback_query(&cb.id, &format!("error: {err}")).await;
                return;
            }
        };

        if payload.action == CallbackAction::UnbanUser {
            match self.chat_api.unban_chat_member(&payload.channel_id, &payload.user_id).await {
                Ok(()) => {
                    let _ = self.chat_api.answer_callback_query(&cb.id, "unbanned").await;
                }
                Err(err) => {
                    tracing::warn!(%err, user_id = %payload.user_id, "unban failed");
                    let _ = self.chat_api.answer_callback_query(&cb.id, &format!("error: {err}")).await;
                }
            }
            return;
        }

        match self.admin.handle_callback(&cb.data) {
            Ok(()) => {
                let _ = self.chat_api.answer_callback_query(&cb.id, "ok").await;
            }
            Err(err) => {
                let _ = self.chat_api.answer_callback_query(&cb.id, &format!("error: {err}")).await;
            }
        }
    }

    async fn report_admin_error(&self, msg: &str) {
        if let Some(admin_chat) = &self.admin_chat_id {
            let _ = self.send_hardened(admin_chat, msg).await;
        }
    }

    /// Try a Markdown-formatted send; fall back to a plain-text send if the
    /// platform rejects the formatted payload (Design Note "Send
    /// hardening"). Exactly one or two `ChatApi` calls per invocation.
    async fn send_hardened(&self, chat_id: &ChatId, text: &str) -> Result<MessageId, ChatApiError> {
        let escaped = escape_markdown(text);
        match self.chat_api.send_markdown(chat_id, &escaped).await {
            Ok(id) => Ok(id),
            Err(_) => self.chat_api.send(chat_id, text).await,
        }
    }
}

/// Escape the handful of Markdown metacharacters that would otherwise break
/// platform-side Markdown parsing when a message contains user-controlled
/// text.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chat_api::{ChatInfo, ChatMember};
    use crate::core::pipeline::Detector;
    use crate::core::types::Response;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct AlwaysSpam;
    impl Detector for AlwaysSpam {
        fn name(&self) -> &str {
            "always_spam"
        }
        fn check(&self, _req: &Request) -> Response {
            Response::spam("always_spam", "test detector")
        }
    }

    struct RecordingChatApi {
        calls: StdMutex<Vec<String>>,
        fail_markdown: bool,
    }

    impl RecordingChatApi {
        fn new(fail_markdown: bool) -> Self {
            Self {
                calls: StdMutex::new(Vec::new()),
                fail_markdown,
            }
        }
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatApi for RecordingChatApi {
        async fn send(&self, chat_id: &ChatId, _text: &str) -> Result<super::super::types::MessageId, ChatApiError> {
            self.calls.lock().unwrap().push(format!("send:{chat_id}"));
            Ok("1".to_string())
        }
        async fn send_markdown(&self, chat_id: &ChatId, _text: &str) -> Result<super::super::types::MessageId, ChatApiError> {
            self.calls.lock().unwrap().push(format!("send_markdown:{chat_id}"));
            if self.fail_markdown {
                Err(ChatApiError::Transport("rejected".into()))
            } else {
                Ok("1".to_string())
            }
        }
        async fn delete_message(&self, chat_id: &ChatId, _msg_id: &super::super::types::MessageId) -> Result<(), ChatApiError> {
            self.calls.lock().unwrap().push(format!("delete:{chat_id}"));
            Ok(())
        }
        async fn get_chat(&self, chat_id: &ChatId) -> Result<ChatInfo, ChatApiError> {
            Ok(ChatInfo { id: chat_id.clone(), title: "t".into() })
        }
        async fn get_chat_administrators(&self, _chat_id: &ChatId) -> Result<Vec<ChatMember>, ChatApiError> {
            Ok(vec![])
        }
        async fn restrict_chat_member(&self, chat_id: &ChatId, user_id: &UserId, _d: Duration) -> Result<(), ChatApiError> {
            self.calls.lock().unwrap().push(format!("restrict:{chat_id}:{user_id}"));
            Ok(())
        }
        async fn ban_chat_member(&self, chat_id: &ChatId, user_id: &UserId, _d: Duration) -> Result<(), ChatApiError> {
            self.calls.lock().unwrap().push(format!("ban:{chat_id}:{user_id}"));
            Ok(())
        }
        async fn unban_chat_member(&self, chat_id: &ChatId, user_id: &UserId) -> Result<(), ChatApiError> {
            self.calls.lock().unwrap().push(format!("unban:{chat_id}:{user_id}"));
            Ok(())
        }
        async fn ban_chat_sender_chat(&self, _chat_id: &ChatId, _sender_chat_id: &ChatId) -> Result<(), ChatApiError> {
            Ok(())
        }
        async fn answer_callback_query(&self, _callback_id: &str, _text: &str) -> Result<(), ChatApiError> {
            Ok(())
        }
    }

    struct NullLogger;
    #[async_trait]
    impl SpamLogger for NullLogger {
        async fn log(&self, _record: SpamRecord) {}
    }

    fn scoped_config() -> DispatcherConfig {
        let mut config = DispatcherConfig::default();
        config.main_chat_id = Some("c1".to_string());
        config
    }

    fn dispatcher(api: Arc<RecordingChatApi>, config: DispatcherConfig) -> Dispatcher {
        let pipeline = Pipeline::new(vec![Box::new(AlwaysSpam)]);
        let locator = Arc::new(Locator::new(Duration::from_secs(60)));
        let admin = Arc::new(AdminHandler::new(
            locator.clone(),
            Arc::new(|_s: &str| {}),
            Arc::new(|_s: &str| {}),
        ));
        Dispatcher::new(config, api, pipeline, locator, Arc::new(NullLogger), None, admin)
    }

    #[tokio::test]
    async fn s9_super_user_is_exempt_from_every_detector() {
        let api = Arc::new(RecordingChatApi::new(false));
        let mut config = scoped_config();
        config.super_users.insert("1".to_string());
        let d = dispatcher(api.clone(), config);
        d.classify_and_enact("c1".into(), Some("m1".into()), "1".into(), "admin".into(), "spam spam".into(), RequestMeta::default())
            .await;
        assert!(api.calls().iter().all(|c| !c.starts_with("ban")));
    }

    #[tokio::test]
    async fn s10_chat_scoping_ignores_unlisted_chats() {
        let api = Arc::new(RecordingChatApi::new(false));
        let config = scoped_config();
        let d = dispatcher(api.clone(), config);
        d.classify_and_enact("other".into(), Some("m1".into()), "1".into(), "u".into(), "spam".into(), RequestMeta::default())
            .await;
        assert!(api.calls().is_empty());
    }

    #[test]
    fn s11_markdown_escape_covers_metacharacters() {
        let escaped = escape_markdown("a_b*c`d[e");
        assert_eq!(escaped, "a\\_b\\*c\\`d\\[e");
    }

    #[tokio::test]
    async fn s12_send_falls_back_to_plain_text_on_markdown_rejection() {
        let api = Arc::new(RecordingChatApi::new(true));
        let d = dispatcher(api.clone(), scoped_config());
        let _ = d.send_hardened(&"c1".to_string(), "hello").await;
        let calls = api.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("send_markdown"));
        assert!(calls[1].starts_with("send:"));
    }

    #[tokio::test]
    async fn banned_user_triggers_ban_call() {
        let api = Arc::new(RecordingChatApi::new(false));
        let d = dispatcher(api.clone(), scoped_config());
        d.classify_and_enact("c1".into(), Some("m1".into()), "2".into(), "u".into(), "spam".into(), RequestMeta::default())
            .await;
        assert!(api.calls().iter().any(|c| c.starts_with("ban:c1:2")));
    }

    #[tokio::test]
    async fn unban_callback_calls_host_directly() {
        let api = Arc::new(RecordingChatApi::new(false));
        let d = dispatcher(api.clone(), scoped_config());
        d.handle_callback_query(CallbackQuery {
            id: "cb1".to_string(),
            from_user: "1".to_string(),
            data: "unban:2:c1:m1".to_string(),
        })
        .await;
        assert!(api.calls().iter().any(|c| c.starts_with("unban:c1:2")));
    }

    #[tokio::test]
    async fn admin_spam_reply_trains_without_touching_host() {
        let api = Arc::new(RecordingChatApi::new(false));
        let d = dispatcher(api.clone(), scoped_config());
        d.locator.add_spam("2", vec![Response::spam("always_spam", "test detector")]);
        d.locator.add_message("", "admin", "2", "u", "report1", Some("report1".to_string()));
        d.handle_admin_message("/spam", Some("report1")).await;
        assert!(api.calls().is_empty());
    }
}
