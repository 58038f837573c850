/// Two-phase submission flow between the store and the model gateway.
pub mod orchestrator;
/// Versioned snapshot codec and persistence glue.
pub mod snapshot;
pub mod store;

pub use orchestrator::{
    FALLBACK_REPLY, OrchestratorConfig, PendingTurn, RequestOrchestrator, ResolvedTurn,
    TurnOutcome, TurnReport,
};
pub use snapshot::{
    CHATS_KEY, DecodedSnapshot, LoadedChats, SNAPSHOT_VERSION, SnapshotError, SnapshotPersistence,
    SnapshotResult, UNREADABLE_CHATS_KEY,
};
pub use store::SessionStore;
