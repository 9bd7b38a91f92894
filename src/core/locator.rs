// Locator (C5). Lets the admin control plane act on a message after the
// original event has scrolled past. Two `DashMap`-backed tables with
// time-based, lazily-purged eviction; no swappable backend is specified so,
// unlike the dictionary store, this lives entirely in `core`.

use super::types::{CheckResult, ChatId, MessageId, UserId};
use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct LocatedMessage {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub user_name: String,
    pub msg_id: MessageId,
    inserted_at: Instant,
}

#[derive(Debug, Clone)]
pub struct LocatedSpam {
    pub user_id: UserId,
    pub check_results: Vec<CheckResult>,
    inserted_at: Instant,
}

/// Synthetic key used for join-event notices, so the dispatcher can delete
/// them later if the joiner leaves before `SuppressJoinMessage` expires.
pub fn join_key(chat_id: &str, user_id: &str) -> String {
    format!("new_{chat_id}_{user_id}")
}

pub struct Locator {
    ttl: Duration,
    messages: DashMap<String, LocatedMessage>,
    spam: DashMap<UserId, LocatedSpam>,
}

impl Locator {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            messages: DashMap::new(),
            spam: DashMap::new(),
        }
    }

    fn content_key(text: &str) -> String {
        use sha2::{Digest, Sha256};
        format!("{:x}", Sha256::digest(text.as_bytes()))
    }

    /// Store `text` both under its content hash and, if a synthetic key is
    /// supplied by the caller (e.g. a join-event key), under that key too.
    pub fn add_message(
        &self,
        text: &str,
        chat_id: impl Into<ChatId>,
        user_id: impl Into<UserId>,
        user_name: impl Into<String>,
        msg_id: impl Into<MessageId>,
        synthetic_key: Option<String>,
    ) {
        let chat_id = chat_id.into();
        let user_id = user_id.into();
        let user_name = user_name.into();
        let msg_id = msg_id.into();

        let entry = LocatedMessage {
            chat_id,
            user_id,
            user_name,
            msg_id,
            inserted_at: Instant::now(),
        };

        self.messages.insert(Self::content_key(text), entry.clone());
        if let Some(key) = synthetic_key {
            self.messages.insert(key, entry);
        }
    }

    pub fn message(&self, hash_or_key: &str) -> Option<LocatedMessage> {
        let entry = self.messages.get(hash_or_key)?;
        if entry.inserted_at.elapsed() > self.ttl {
            drop(entry);
            self.messages.remove(hash_or_key);
            return None;
        }
        Some(entry.clone())
    }

    pub fn remove_message(&self, hash_or_key: &str) -> Option<LocatedMessage> {
        self.messages.remove(hash_or_key).map(|(_, v)| v)
    }

    pub fn add_spam(&self, user_id: impl Into<UserId>, check_results: Vec<CheckResult>) {
        let user_id = user_id.into();
        self.spam.insert(
            user_id.clone(),
            LocatedSpam {
                user_id,
                check_results,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn spam(&self, user_id: &str) -> Option<LocatedSpam> {
        let entry = self.spam.get(user_id)?;
        if entry.inserted_at.elapsed() > self.ttl {
            drop(entry);
            self.spam.remove(user_id);
            return None;
        }
        Some(entry.clone())
    }

    pub fn remove_spam(&self, user_id: &str) -> Option<LocatedSpam> {
        self.spam.remove(user_id).map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_notice_is_retrievable_by_synthetic_key() {
        let locator = Locator::new(Duration::from_secs(60));
        let key = join_key("c1", "u1");
        locator.add_message("", "c1", "u1", "joiner", "msg1", Some(key.clone()));
        assert!(locator.message(&key).is_some());
    }

    #[test]
    fn entries_expire_after_ttl() {
        let locator = Locator::new(Duration::from_millis(20));
        locator.add_message("hello", "c1", "u1", "name", "msg1", None);
        let key = Locator::content_key("hello");
        assert!(locator.message(&key).is_some());
        std::thread::sleep(Duration::from_millis(40));
        assert!(locator.message(&key).is_none());
    }

    #[test]
    fn spam_record_is_one_shot_lookup() {
        let locator = Locator::new(Duration::from_secs(60));
        locator.add_spam("1", vec![CheckResult::spam("duplicate", "repeated")]);
        let found = locator.spam("1").unwrap();
        assert_eq!(found.check_results.len(), 1);
    }
}
