// Dispatcher configuration. Built once at startup from environment
// variables (see `main.rs`) and then treated as immutable for the life of
// the process (Design Note "Shared state"): every field here is read-only
// from the dispatcher's perspective, so it's handed around as a plain value
// rather than behind a lock.

use super::types::{ChatId, UserId};
use std::collections::HashSet;
use std::time::Duration;

/// How a positive spam verdict is enacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanMode {
    /// Actually restrict/ban the member.
    Ban,
    /// Restrict posting rights but do not remove the member from the chat.
    SoftBan,
    /// Run detectors and log, but take no platform action at all.
    Dry,
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// When true, every verdict is treated as training data instead of
    /// grounds for action: spam gets forwarded to admins for confirmation
    /// rather than acted on immediately.
    pub training_mode: bool,
    pub ban_mode: BanMode,
    /// Suppress the dispatcher's own "you've been banned" reply to the
    /// offending chat.
    pub no_spam_reply: bool,
    /// Delete/skip the welcome notice this crate would otherwise post for a
    /// new member.
    pub suppress_join_message: bool,
    /// Do not forward a spam verdict to the admin chat.
    pub disable_admin_spam_forward: bool,
    /// How long the dispatcher waits on an idle update channel before
    /// running its periodic maintenance pass.
    pub idle_duration: Duration,
    pub startup_msg: Option<String>,
    pub warn_msg: Option<String>,
    /// User ids exempt from every detector (admins, bot operators).
    pub super_users: HashSet<UserId>,
    /// The target group. `None` until resolved at startup from the
    /// configured group identifier (numeric id or `@handle`).
    pub main_chat_id: Option<ChatId>,
    /// Extra chat ids the dispatcher is allowed to act in, on top of
    /// `main_chat_id` (Design Note "Chat scoping").
    pub testing_ids: HashSet<ChatId>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            training_mode: false,
            ban_mode: BanMode::Ban,
            no_spam_reply: false,
            suppress_join_message: false,
            disable_admin_spam_forward: false,
            idle_duration: Duration::from_secs(30),
            startup_msg: None,
            warn_msg: None,
            super_users: HashSet::new(),
            main_chat_id: None,
            testing_ids: HashSet::new(),
        }
    }
}

impl DispatcherConfig {
    pub fn is_super_user(&self, user_id: &str) -> bool {
        self.super_users.iter().any(|u| u == user_id)
    }

    /// The dispatcher acts only in `{main_chat_id} ∪ testing_ids`; an update
    /// from any other chat is dropped without classification.
    pub fn is_scoped_chat(&self, chat_id: &str) -> bool {
        self.main_chat_id.as_deref() == Some(chat_id) || self.testing_ids.iter().any(|c| c == chat_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_no_chats_configured_nothing_is_in_scope() {
        let cfg = DispatcherConfig::default();
        assert!(!cfg.is_scoped_chat("any-chat"));
    }

    #[test]
    fn main_chat_id_is_in_scope_on_its_own() {
        let mut cfg = DispatcherConfig::default();
        cfg.main_chat_id = Some("1".to_string());
        assert!(cfg.is_scoped_chat("1"));
        assert!(!cfg.is_scoped_chat("2"));
    }

    #[test]
    fn testing_ids_extend_scope_beyond_main_chat() {
        let mut cfg = DispatcherConfig::default();
        cfg.main_chat_id = Some("1".to_string());
        cfg.testing_ids.insert("2".to_string());
        assert!(cfg.is_scoped_chat("1"));
        assert!(cfg.is_scoped_chat("2"));
        assert!(!cfg.is_scoped_chat("3"));
    }

    #[test]
    fn super_user_membership() {
        let mut cfg = DispatcherConfig::default();
        cfg.super_users.insert("42".to_string());
        assert!(cfg.is_super_user("42"));
        assert!(!cfg.is_super_user("7"));
    }
}
