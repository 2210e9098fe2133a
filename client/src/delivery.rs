//! Background notification delivery loop.
//!
//! One tokio task owns the active-chat marker and the set of open pages.
//! Pages, the push transport and the notification surface only talk to it
//! through channels, so events are handled strictly in arrival order.

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use reclaim_common::push::{
    click_target, decide, ChatId, PageMessage, PushData, PushMessage, SystemNotification,
    WorkerMessage,
};

use crate::config::ClientConfig;

/// Everything the delivery loop reacts to.
#[derive(Debug)]
pub enum DeliveryEvent {
    /// A message posted by a page.
    Worker(WorkerMessage),
    /// A push from the messaging transport.
    Push(PushMessage),
    /// The user clicked a notification we raised.
    Click { data: PushData, tag: Option<String> },
    /// A page came up and wants forwarded pushes.
    PageOpened(UnboundedSender<PageMessage>),
}

/// Instructions for the platform notification surface.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCommand {
    Show(SystemNotification),
    Close { tag: Option<String> },
    /// Focus or open a window at `url`.
    Navigate { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("delivery loop has stopped")]
pub struct DeliveryClosed;

pub struct DeliveryGate {
    active_chat: Option<ChatId>,
    pages: Vec<UnboundedSender<PageMessage>>,
    surface: UnboundedSender<SurfaceCommand>,
    default_icon: Option<String>,
}

impl DeliveryGate {
    pub fn new(surface: UnboundedSender<SurfaceCommand>) -> Self {
        Self {
            active_chat: None,
            pages: Vec::new(),
            surface,
            default_icon: None,
        }
    }

    /// A gate using the configured notification icon.
    pub fn from_config(surface: UnboundedSender<SurfaceCommand>, config: &ClientConfig) -> Self {
        Self::new(surface).with_default_icon(&config.notification_icon)
    }

    /// Icon used when a push carries none.
    pub fn with_default_icon(mut self, icon: impl Into<String>) -> Self {
        self.default_icon = Some(icon.into());
        self
    }

    pub fn active_chat(&self) -> Option<&ChatId> {
        self.active_chat.as_ref()
    }

    pub fn open_pages(&self) -> usize {
        self.pages.len()
    }

    pub fn handle(&mut self, event: DeliveryEvent) {
        match event {
            DeliveryEvent::Worker(WorkerMessage::ChatStateChange { chat_id }) => {
                debug!(chat = ?chat_id, "active chat changed");
                self.active_chat = chat_id;
            }
            DeliveryEvent::Push(message) => self.deliver(message),
            DeliveryEvent::Click { data, tag } => {
                self.show(SurfaceCommand::Close { tag });
                self.show(SurfaceCommand::Navigate {
                    url: click_target(&data),
                });
            }
            DeliveryEvent::PageOpened(page) => {
                self.pages.retain(|open| !open.is_closed());
                self.pages.push(page);
            }
        }
    }

    fn deliver(&mut self, message: PushMessage) {
        let delivery = decide(self.active_chat.as_ref(), message);
        match delivery.notification {
            Some(mut notification) => {
                if notification.icon.is_none() {
                    notification.icon = self.default_icon.clone();
                }
                self.show(SurfaceCommand::Show(notification));
            }
            None => debug!(chat = ?self.active_chat, "chat on screen, notification suppressed"),
        }

        let before = self.pages.len();
        self.pages
            .retain(|page| page.unbounded_send(delivery.forward.clone()).is_ok());
        let dropped = before - self.pages.len();
        if dropped > 0 {
            warn!(dropped, "pruned closed pages while forwarding push");
        }
    }

    fn show(&self, command: SurfaceCommand) {
        if self.surface.unbounded_send(command).is_err() {
            warn!("notification surface is gone");
        }
    }
}

/// Sending side of a running delivery loop. Cheap to clone.
#[derive(Clone, Debug)]
pub struct DeliveryHandle {
    tx: UnboundedSender<DeliveryEvent>,
}

impl DeliveryHandle {
    pub fn send(&self, event: DeliveryEvent) -> Result<(), DeliveryClosed> {
        self.tx.unbounded_send(event).map_err(|_| DeliveryClosed)
    }

    pub fn chat_opened(&self, chat_id: ChatId) -> Result<(), DeliveryClosed> {
        self.send(DeliveryEvent::Worker(WorkerMessage::ChatStateChange {
            chat_id: Some(chat_id),
        }))
    }

    pub fn chat_closed(&self) -> Result<(), DeliveryClosed> {
        self.send(DeliveryEvent::Worker(WorkerMessage::ChatStateChange {
            chat_id: None,
        }))
    }

    pub fn push(&self, message: PushMessage) -> Result<(), DeliveryClosed> {
        self.send(DeliveryEvent::Push(message))
    }

    pub fn click(&self, data: PushData, tag: Option<String>) -> Result<(), DeliveryClosed> {
        self.send(DeliveryEvent::Click { data, tag })
    }

    /// Register a new page; forwarded pushes arrive on the returned receiver.
    pub fn open_page(&self) -> Result<UnboundedReceiver<PageMessage>, DeliveryClosed> {
        let (tx, rx) = mpsc::unbounded();
        self.send(DeliveryEvent::PageOpened(tx))?;
        Ok(rx)
    }
}

/// Start the delivery loop. It runs until every [`DeliveryHandle`] is dropped.
pub fn spawn(mut gate: DeliveryGate) -> (DeliveryHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded::<DeliveryEvent>();
    let task = tokio::spawn(async move {
        info!("delivery loop started");
        while let Some(event) = rx.next().await {
            gate.handle(event);
        }
        info!("delivery loop stopped");
    });
    (DeliveryHandle { tx }, task)
}
