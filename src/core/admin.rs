// Admin control surface (C8): training forwards, inline callback buttons,
// and direct super-user reply commands. Classifier training is injected as
// two closures rather than a reference to the pipeline/detector types
// directly, so this module never has to know which detectors are
// `Trainable` and the pipeline never has to know admin exists (Design Note
// "Avoiding the admin/classifier cycle").

use super::locator::Locator;
use super::types::{ChatId, MessageId, UserId};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CallbackParseError {
    #[error("expected 4 colon-separated fields, got {0}")]
    WrongFieldCount(usize),
    #[error("unknown action {0:?}")]
    UnknownAction(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    ConfirmSpam,
    RejectSpam,
    /// Reverse a prior ban/restrict. Carried out against the host directly
    /// by the dispatcher; never reaches `AdminHandler::handle_callback`.
    UnbanUser,
}

impl CallbackAction {
    fn parse(raw: &str) -> Result<Self, CallbackParseError> {
        match raw {
            "confirm" => Ok(CallbackAction::ConfirmSpam),
            "reject" => Ok(CallbackAction::RejectSpam),
            "unban" => Ok(CallbackAction::UnbanUser),
            other => Err(CallbackParseError::UnknownAction(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackPayload {
    pub action: CallbackAction,
    pub user_id: UserId,
    pub channel_id: ChatId,
    pub msg_id: MessageId,
}

/// Parse the `<action>:<userID>:<channelID>:<msgID>` payload an inline
/// keyboard button carries.
pub fn parse_callback(data: &str) -> Result<CallbackPayload, CallbackParseError> {
    let fields: Vec<&str> = data.split(':').collect();
    if fields.len() != 4 {
        return Err(CallbackParseError::WrongFieldCount(fields.len()));
    }
    Ok(CallbackPayload {
        action: CallbackAction::parse(fields[0])?,
        user_id: fields[1].to_string(),
        channel_id: fields[2].to_string(),
        msg_id: fields[3].to_string(),
    })
}

/// A super-user's bare-word reply command (sent as a reply to the message
/// under review, not a slash command).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCommand {
    Spam,
    Ban,
    Warn,
}

impl ReplyCommand {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "spam" => Some(ReplyCommand::Spam),
            "ban" => Some(ReplyCommand::Ban),
            "warn" => Some(ReplyCommand::Warn),
            _ => None,
        }
    }
}

pub type TrainFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Wires a confirmed/rejected verdict back into the classifier without
/// admin ever touching a `Pipeline` or `Box<dyn Trainable>` directly.
pub struct AdminHandler {
    locator: Arc<Locator>,
    train_spam: TrainFn,
    train_ham: TrainFn,
}

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("error: no located message for user {0}")]
    NoLocatedMessage(UserId),
    #[error("error: {0}")]
    BadCallback(#[from] CallbackParseError),
}

impl AdminHandler {
    pub fn new(locator: Arc<Locator>, train_spam: TrainFn, train_ham: TrainFn) -> Self {
        Self { locator, train_spam, train_ham }
    }

    /// Handle an inline keyboard callback: confirm trains the spam
    /// detector(s) on the original sample, reject trains ham.
    pub fn handle_callback(&self, data: &str) -> Result<(), AdminError> {
        let payload = parse_callback(data)?;
        let located = self
            .locator
            .spam(&payload.user_id)
            .ok_or_else(|| AdminError::NoLocatedMessage(payload.user_id.clone()))?;

        let sample = located
            .check_results
            .iter()
            .map(|c| c.details.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        match payload.action {
            CallbackAction::ConfirmSpam => (self.train_spam)(&sample),
            CallbackAction::RejectSpam => {
                (self.train_ham)(&sample);
                self.locator.remove_spam(&payload.user_id);
            }
            // The dispatcher intercepts `UnbanUser` before it reaches here:
            // reversing a ban is a host call, not a training update.
            CallbackAction::UnbanUser => {}
        }
        Ok(())
    }

    /// Handle a super-user's in-chat reply command against a located
    /// message for `user_id`.
    pub fn handle_reply_command(&self, user_id: &str, command: ReplyCommand) -> Result<(), AdminError> {
        match command {
            ReplyCommand::Spam => {
                let located = self
                    .locator
                    .spam(user_id)
                    .ok_or_else(|| AdminError::NoLocatedMessage(user_id.to_string()))?;
                let sample = located
                    .check_results
                    .iter()
                    .map(|c| c.details.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                (self.train_spam)(&sample);
                Ok(())
            }
            ReplyCommand::Ban | ReplyCommand::Warn => {
                // Enforcement itself is a dispatcher/ChatApi concern; admin
                // only needs to confirm a located record exists.
                self.locator
                    .spam(user_id)
                    .map(|_| ())
                    .ok_or_else(|| AdminError::NoLocatedMessage(user_id.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Response;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn parses_well_formed_callback() {
        let payload = parse_callback("confirm:42:100:7").unwrap();
        assert_eq!(payload.action, CallbackAction::ConfirmSpam);
        assert_eq!(payload.user_id, "42");
        assert_eq!(payload.channel_id, "100");
        assert_eq!(payload.msg_id, "7");
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert_eq!(parse_callback("confirm:42"), Err(CallbackParseError::WrongFieldCount(2)));
    }

    #[test]
    fn rejects_unknown_action() {
        assert!(matches!(parse_callback("nuke:1:2:3"), Err(CallbackParseError::UnknownAction(_))));
    }

    #[test]
    fn reply_command_parsing_is_case_insensitive() {
        assert_eq!(ReplyCommand::parse("SPAM"), Some(ReplyCommand::Spam));
        assert_eq!(ReplyCommand::parse(" ban "), Some(ReplyCommand::Ban));
        assert_eq!(ReplyCommand::parse("unknown"), None);
    }

    #[test]
    fn confirm_callback_trains_spam_detector() {
        let locator = Arc::new(Locator::new(Duration::from_secs(60)));
        locator.add_spam("42", vec![Response::spam("stop_phrase", "buy now")]);

        let spam_calls = Arc::new(AtomicUsize::new(0));
        let ham_calls = Arc::new(AtomicUsize::new(0));
        let spam_calls_c = spam_calls.clone();
        let ham_calls_c = ham_calls.clone();

        let handler = AdminHandler::new(
            locator,
            Arc::new(move |_s| { spam_calls_c.fetch_add(1, Ordering::SeqCst); }),
            Arc::new(move |_s| { ham_calls_c.fetch_add(1, Ordering::SeqCst); }),
        );

        handler.handle_callback("confirm:42:1:1").unwrap();
        assert_eq!(spam_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ham_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn callback_without_located_record_errors() {
        let locator = Arc::new(Locator::new(Duration::from_secs(60)));
        let handler = AdminHandler::new(locator, Arc::new(|_| {}), Arc::new(|_| {}));
        assert!(matches!(handler.handle_callback("confirm:1:1:1"), Err(AdminError::NoLocatedMessage(_))));
    }

    #[test]
    fn parses_unban_action() {
        let payload = parse_callback("unban:42:100:7").unwrap();
        assert_eq!(payload.action, CallbackAction::UnbanUser);
    }

    #[test]
    fn reject_callback_trains_ham_and_clears_locator_record() {
        let locator = Arc::new(Locator::new(Duration::from_secs(60)));
        locator.add_spam("42", vec![Response::spam("stop_phrase", "buy now")]);

        let ham_calls = Arc::new(AtomicUsize::new(0));
        let ham_calls_c = ham_calls.clone();
        let handler = AdminHandler::new(
            locator.clone(),
            Arc::new(|_s| {}),
            Arc::new(move |_s| { ham_calls_c.fetch_add(1, Ordering::SeqCst); }),
        );

        handler.handle_callback("reject:42:1:1").unwrap();
        assert_eq!(ham_calls.load(Ordering::SeqCst), 1);
        assert!(locator.spam("42").is_none());
    }
}
