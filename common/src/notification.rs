use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::push::ChatId;

/// Unique notification identifier (backend-issued).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub chat_id: Option<ChatId>,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// The user's notifications, newest first.
///
/// Read state only moves from unread to read; merging a stale backend page
/// never marks a notification unread again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inbox {
    items: Vec<Notification>,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| !n.read).count()
    }

    /// Merge notifications fetched from the backend (or pushed live).
    pub fn merge(&mut self, incoming: impl IntoIterator<Item = Notification>) {
        for n in incoming {
            match self.items.iter_mut().find(|existing| existing.id == n.id) {
                Some(existing) => {
                    let read = existing.read || n.read;
                    *existing = n;
                    existing.read = read;
                }
                None => self.items.push(n),
            }
        }
        self.items
            .sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    }

    /// Returns `true` if the notification existed and was unread.
    pub fn mark_read(&mut self, id: &NotificationId) -> bool {
        match self.items.iter_mut().find(|n| &n.id == id) {
            Some(n) if !n.read => {
                n.read = true;
                true
            }
            _ => false,
        }
    }

    /// Mark every notification read. Returns how many changed.
    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = 0;
        for n in self.items.iter_mut().filter(|n| !n.read) {
            n.read = true;
            changed += 1;
        }
        changed
    }

    /// Mark everything belonging to `chat_id` read, e.g. when the chat opens.
    pub fn mark_chat_read(&mut self, chat_id: &ChatId) -> Vec<NotificationId> {
        self.items
            .iter_mut()
            .filter(|n| !n.read && n.chat_id.as_ref() == Some(chat_id))
            .map(|n| {
                n.read = true;
                n.id.clone()
            })
            .collect()
    }
}
