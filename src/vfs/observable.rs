/*!
 * Observable VFS - Change Events
 * Events applied to the virtual file tree and their broadcast channel
 */

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::types::FileAttributes;
use super::url;
use crate::core::limits::DEFAULT_EVENT_BUFFER;
use crate::core::types::{FileId, Millis};

/// Property tracked by `VfsEvent::PropertyChange`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileProperty {
    Name,
    Writable,
    Hidden,
    SymlinkTarget,
}

impl fmt::Display for FileProperty {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FileProperty::Name => write!(f, "name"),
            FileProperty::Writable => write!(f, "writable"),
            FileProperty::Hidden => write!(f, "hidden"),
            FileProperty::SymlinkTarget => write!(f, "symlink_target"),
        }
    }
}

/// Old/new value of a changed property
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", untagged)]
pub enum PropertyValue {
    Name(String),
    Flag(bool),
    Target(Option<String>),
}

/// Change to the virtual file tree
///
/// `url` is always the URL of the affected file before the change is applied
/// (for `Create`, the URL the new file will have).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum VfsEvent {
    Create {
        parent: FileId,
        name: String,
        url: String,
        attributes: FileAttributes,
        #[serde(skip_serializing_if = "Option::is_none")]
        symlink_target: Option<String>,
    },
    Delete {
        file: FileId,
        url: String,
    },
    ContentChange {
        file: FileId,
        url: String,
        old_timestamp: Millis,
        new_timestamp: Millis,
        old_length: u64,
        new_length: u64,
    },
    PropertyChange {
        file: FileId,
        url: String,
        property: FileProperty,
        old: PropertyValue,
        new: PropertyValue,
    },
    Move {
        file: FileId,
        url: String,
        old_parent: FileId,
        new_parent: FileId,
        new_url: String,
    },
}

impl VfsEvent {
    /// URL of the affected file before the change
    pub fn url(&self) -> &str {
        match self {
            VfsEvent::Create { url, .. }
            | VfsEvent::Delete { url, .. }
            | VfsEvent::ContentChange { url, .. }
            | VfsEvent::PropertyChange { url, .. }
            | VfsEvent::Move { url, .. } => url,
        }
    }

    /// The affected file (`None` for a create, whose file does not exist yet)
    pub fn file(&self) -> Option<FileId> {
        match self {
            VfsEvent::Create { .. } => None,
            VfsEvent::Delete { file, .. }
            | VfsEvent::ContentChange { file, .. }
            | VfsEvent::PropertyChange { file, .. }
            | VfsEvent::Move { file, .. } => Some(*file),
        }
    }

    /// URL of the affected file after the change, if it moves
    pub fn new_url(&self) -> Option<String> {
        match self {
            VfsEvent::Move { new_url, .. } => Some(new_url.clone()),
            VfsEvent::PropertyChange {
                url,
                property: FileProperty::Name,
                new: PropertyValue::Name(name),
                ..
            } => url::parent(url).map(|parent| url::join(&parent, name)),
            _ => None,
        }
    }

    /// Whether the event can change which file a URL resolves to
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            VfsEvent::Create { .. }
                | VfsEvent::Delete { .. }
                | VfsEvent::Move { .. }
                | VfsEvent::PropertyChange {
                    property: FileProperty::Name,
                    ..
                }
        )
    }

    /// Short event kind, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            VfsEvent::Create { .. } => "create",
            VfsEvent::Delete { .. } => "delete",
            VfsEvent::ContentChange { .. } => "content",
            VfsEvent::PropertyChange { .. } => "property",
            VfsEvent::Move { .. } => "move",
        }
    }
}

impl fmt::Display for VfsEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VfsEvent::PropertyChange { url, property, .. } => {
                write!(f, "property({}) {}", property, url)
            }
            VfsEvent::Move { url, new_url, .. } => write!(f, "move {} -> {}", url, new_url),
            other => write!(f, "{} {}", other.kind(), other.url()),
        }
    }
}

/// Observable trait - implemented by anything that publishes applied events
pub trait Observable: Send + Sync {
    /// Subscribe to events
    /// Returns a receiver that will get all future events
    fn subscribe(&self) -> broadcast::Receiver<VfsEvent>;
}

/// Event broadcaster implementation
/// Uses tokio broadcast channel for lock-free MPMC
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: Arc<broadcast::Sender<VfsEvent>>,
}

impl EventBroadcaster {
    /// Create new broadcaster with specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<VfsEvent> {
        self.sender.subscribe()
    }

    /// Emit event to all subscribers
    pub fn emit(&self, event: VfsEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

impl fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
