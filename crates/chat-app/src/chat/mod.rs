/// Context assembly for gateway requests.
pub mod context;
/// Typed identifiers and the id generator.
pub mod ids;
/// Domain entities and title derivation.
pub mod message;
pub mod sidebar;

pub use context::build_history;
pub use ids::{ChatId, IdError, IdGenerator, MessageId, current_unix_millis};
pub use message::{Chat, DEFAULT_CHAT_TITLE, Message, Role, TITLE_MAX_CHARS, derive_title};
pub use sidebar::{SidebarEntry, SidebarItem, build_sidebar};
