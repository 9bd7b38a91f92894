// Core domain types shared by every detector and the dispatcher.
//
// These are pure data types with no host-platform dependency. The host
// adapter layer is responsible for turning platform-native updates into a
// `Request` and turning a `Verdict` back into platform calls.

use std::time::Duration;

/// Decimal-string user id, exactly as the host platform hands it to us.
/// Kept as a string rather than a numeric type because the duplicate
/// detector (and the rest of the pipeline) must tolerate ids that fail to
/// parse as an integer without panicking; see `duplicate::DuplicateDetector`.
pub type UserId = String;
pub type ChatId = String;
pub type MessageId = String;

/// Auxiliary signals about a message that a detector may care about beyond
/// the raw text. Kept as named fields rather than an open map: there are
/// exactly three signals in play, and an open map without known keys just
/// pushes the "what does this string mean" question downstream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestMeta {
    pub has_image: bool,
    pub forward_origin: Option<String>,
    pub member_age: Option<Duration>,
}

/// The input to any detector. Immutable once handed to the pipeline;
/// lives for the duration of one classification call.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub msg: String,
    pub user_id: UserId,
    pub user_name: String,
    pub meta: RequestMeta,
}

impl Request {
    pub fn new(msg: impl Into<String>, user_id: impl Into<UserId>) -> Self {
        Self {
            msg: msg.into(),
            user_id: user_id.into(),
            user_name: String::new(),
            meta: RequestMeta::default(),
        }
    }

    pub fn with_user_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = user_name.into();
        self
    }

    pub fn with_meta(mut self, meta: RequestMeta) -> Self {
        self.meta = meta;
        self
    }
}

/// A single detector's verdict on one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub name: String,
    pub spam: bool,
    pub details: String,
    pub error: Option<String>,
}

impl Response {
    pub fn ok(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spam: false,
            details: String::new(),
            error: None,
        }
    }

    pub fn not_spam(name: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spam: false,
            details: details.into(),
            error: None,
        }
    }

    pub fn spam(name: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spam: true,
            details: details.into(),
            error: None,
        }
    }

    pub fn err(name: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            name: name.into(),
            spam: false,
            details: String::new(),
            error: Some(error.to_string()),
        }
    }
}

/// Alias kept for readability at call sites that aggregate detector output;
/// a `CheckResult` is exactly the `Response` a detector produced.
pub type CheckResult = Response;

/// Aggregate of all detector responses, produced by the classifier pipeline
/// and consumed by the dispatcher to decide what to do about one event.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub checks: Vec<CheckResult>,
    pub spam: bool,
    pub send: bool,
    pub ban_interval: Duration,
    pub delete_reply_to: bool,
    pub reply_to: Option<MessageId>,
    pub user: UserId,
    pub channel_id: ChatId,
}

impl Verdict {
    pub fn not_spam(checks: Vec<CheckResult>, user: UserId, channel_id: ChatId) -> Self {
        Self {
            checks,
            spam: false,
            send: false,
            ban_interval: Duration::ZERO,
            delete_reply_to: false,
            reply_to: None,
            user,
            channel_id,
        }
    }
}
