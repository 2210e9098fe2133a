//! Push wire messages and the per-chat delivery decision.
//!
//! Inbound pushes look like `{ notification: {title, body, icon}, data:
//! {chatId, content, ...} }`. Pages receive `{ type: "FCM_MESSAGE", payload }`
//! and report what they show with `{ type: "CHAT_STATE_CHANGE", chatId }`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::return_url::APP_ROOT;

/// Chat thread identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChatId(pub String);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushNotification {
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushData {
    #[serde(rename = "chatId", default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<ChatId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Remaining data fields, passed through to pages untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub notification: PushNotification,
    #[serde(default)]
    pub data: PushData,
}

/// Messages from the background context to open pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageMessage {
    FcmMessage { payload: PushMessage },
}

/// Messages from pages to the background context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    ChatStateChange {
        #[serde(rename = "chatId", default)]
        chat_id: Option<ChatId>,
    },
}

/// A system notification to raise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemNotification {
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    /// Notifications sharing a tag replace each other.
    pub tag: Option<String>,
    pub data: PushData,
}

/// Coalescing tag for a chat thread.
pub fn notification_tag(chat_id: &ChatId) -> String {
    format!("chat-{chat_id}")
}

/// Where a click on a notification should take the user.
pub fn click_target(data: &PushData) -> String {
    match &data.chat_id {
        Some(chat_id) => format!("/chat/{chat_id}"),
        None => APP_ROOT.to_string(),
    }
}

/// Outcome of evaluating one push against the active-chat marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// `None` when the chat is already on screen.
    pub notification: Option<SystemNotification>,
    /// Always forwarded to every open page.
    pub forward: PageMessage,
}

/// Decide how to deliver `message` given the chat currently on screen.
pub fn decide(active_chat: Option<&ChatId>, message: PushMessage) -> Delivery {
    let chat_id = message.data.chat_id.as_ref();
    let on_screen = matches!((active_chat, chat_id), (Some(a), Some(c)) if a == c);
    let notification = (!on_screen).then(|| SystemNotification {
        title: message.notification.title.clone(),
        body: message.notification.body.clone(),
        icon: message.notification.icon.clone(),
        tag: chat_id.map(notification_tag),
        data: message.data.clone(),
    });
    Delivery {
        notification,
        forward: PageMessage::FcmMessage { payload: message },
    }
}
