use std::collections::HashSet;
use std::sync::Arc;

use mentii_storage::{KeyValueStore, MemoryStore};

use super::snapshot::{LoadedChats, SnapshotPersistence, SnapshotResult};
use crate::chat::{Chat, ChatId, IdGenerator, Message, current_unix_millis};

/// Owner of every chat and the active selection.
///
/// All mutations go through the methods below and each one rewrites the persisted
/// snapshot before returning, so the backend never lags behind memory.
pub struct SessionStore {
    /// Newest first.
    chats: Vec<Chat>,
    active_chat_id: Option<ChatId>,
    ids: IdGenerator,
    persistence: SnapshotPersistence,
}

impl SessionStore {
    /// Loads persisted chats from `backend` and activates the most recent one.
    pub fn open(backend: Arc<dyn KeyValueStore>) -> SnapshotResult<Self> {
        let persistence = SnapshotPersistence::new(backend);
        let mut chats = persistence.load()?.into_chats();

        let ids = IdGenerator::seeded_above(largest_raw_id(&chats));
        repair_duplicate_ids(&mut chats, &ids);

        let active_chat_id = chats.first().map(|chat| chat.id);
        tracing::info!(
            chat_count = chats.len(),
            active_chat_id = ?active_chat_id,
            "opened session store"
        );

        Ok(Self {
            chats,
            active_chat_id,
            ids,
            persistence,
        })
    }

    /// Empty store backed by process memory only.
    pub fn in_memory() -> Self {
        Self {
            chats: Vec::new(),
            active_chat_id: None,
            ids: IdGenerator::default(),
            persistence: SnapshotPersistence::new(Arc::new(MemoryStore::new())),
        }
    }

    pub fn ids(&self) -> &IdGenerator {
        &self.ids
    }

    pub fn list(&self) -> &[Chat] {
        &self.chats
    }

    pub fn get_chat(&self, chat_id: ChatId) -> Option<&Chat> {
        self.chats.iter().find(|chat| chat.id == chat_id)
    }

    pub fn contains(&self, chat_id: ChatId) -> bool {
        self.get_chat(chat_id).is_some()
    }

    pub fn active_chat_id(&self) -> Option<ChatId> {
        self.active_chat_id
    }

    pub fn active_chat(&self) -> Option<&Chat> {
        self.active_chat_id
            .and_then(|chat_id| self.get_chat(chat_id))
    }

    /// Inserts an empty chat at the front and makes it active.
    pub fn create_chat(&mut self) -> ChatId {
        let chat = Chat::new(self.ids.chat_id(), current_unix_millis());
        let chat_id = chat.id;

        self.chats.insert(0, chat);
        self.active_chat_id = Some(chat_id);
        self.persist("create-chat");

        tracing::debug!(chat_id = %chat_id, "created chat");
        chat_id
    }

    /// Removes a chat. Deleting the active chat activates the new first chat.
    pub fn delete_chat(&mut self, chat_id: ChatId) -> bool {
        let Some(index) = self.chats.iter().position(|chat| chat.id == chat_id) else {
            tracing::debug!(chat_id = %chat_id, "ignoring delete of unknown chat");
            return false;
        };

        self.chats.remove(index);
        if self.active_chat_id == Some(chat_id) {
            self.active_chat_id = self.chats.first().map(|chat| chat.id);
        }
        self.persist("delete-chat");

        tracing::debug!(
            chat_id = %chat_id,
            active_chat_id = ?self.active_chat_id,
            "deleted chat"
        );
        true
    }

    /// Activates an existing chat; unknown ids leave the selection untouched.
    pub fn set_active(&mut self, chat_id: ChatId) -> bool {
        if !self.contains(chat_id) {
            tracing::debug!(chat_id = %chat_id, "ignoring selection of unknown chat");
            return false;
        }

        self.active_chat_id = Some(chat_id);
        self.persist("set-active");
        true
    }

    /// Appends to an existing chat; a missing chat makes this a no-op.
    pub fn append_message(&mut self, chat_id: ChatId, message: Message) -> bool {
        let Some(chat) = self.chats.iter_mut().find(|chat| chat.id == chat_id) else {
            tracing::debug!(
                chat_id = %chat_id,
                message_id = %message.id,
                "ignoring append to unknown chat"
            );
            return false;
        };

        chat.push_message(message);
        self.persist("append-message");
        true
    }

    /// Backend failures never roll back memory; they are reported in the log.
    fn persist(&self, stage: &'static str) {
        if let Err(error) = self.persistence.save(&self.chats) {
            tracing::error!(
                stage,
                chat_count = self.chats.len(),
                error = %error,
                "failed to persist chat snapshot"
            );
        }
    }
}

fn largest_raw_id(chats: &[Chat]) -> Option<u64> {
    chats
        .iter()
        .flat_map(|chat| {
            std::iter::once(chat.id.as_u64())
                .chain(chat.messages.iter().map(|message| message.id.as_u64()))
        })
        .max()
}

/// Older snapshots used millisecond timestamps as ids and could repeat them.
fn repair_duplicate_ids(chats: &mut [Chat], ids: &IdGenerator) {
    let mut seen_chats = HashSet::new();
    let mut reassigned = 0_usize;

    for chat in chats.iter_mut() {
        if !seen_chats.insert(chat.id) {
            chat.id = ids.chat_id();
            reassigned += 1;
        }

        let mut seen_messages = HashSet::new();
        for message in chat.messages.iter_mut() {
            if !seen_messages.insert(message.id) {
                message.id = ids.message_id();
                reassigned += 1;
            }
        }
    }

    if reassigned > 0 {
        tracing::warn!(reassigned, "reassigned duplicate ids found in chat snapshot");
    }
}

#[cfg(test)]
mod tests {
    use mentii_storage::{FileStore, StorageError, StorageResult};

    use super::*;
    use crate::chat::{DEFAULT_CHAT_TITLE, MessageId, Role};
    use crate::session::snapshot::{CHATS_KEY, UNREADABLE_CHATS_KEY};

    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get(&self, _key: &str) -> StorageResult<Option<String>> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
            Err(StorageError::LockPoisoned { stage: "test-set" })
        }
    }

    fn assert_active_is_valid(store: &SessionStore) {
        if let Some(active) = store.active_chat_id() {
            assert!(store.contains(active), "active chat {active} is dangling");
        }
    }

    #[test]
    fn create_inserts_newest_first_and_activates() {
        let mut store = SessionStore::in_memory();
        let first = store.create_chat();
        let second = store.create_chat();

        let order = store.list().iter().map(|chat| chat.id).collect::<Vec<_>>();
        assert_eq!(order, vec![second, first]);
        assert_eq!(store.active_chat_id(), Some(second));
        assert_eq!(store.list()[0].title, DEFAULT_CHAT_TITLE);
    }

    #[test]
    fn deleting_active_chat_falls_to_next_most_recent() {
        let mut store = SessionStore::in_memory();
        let oldest = store.create_chat();
        let middle = store.create_chat();
        let newest = store.create_chat();

        assert!(store.set_active(middle));
        assert!(store.delete_chat(middle));
        assert_eq!(store.active_chat_id(), Some(newest));

        assert!(store.delete_chat(newest));
        assert_eq!(store.active_chat_id(), Some(oldest));
    }

    #[test]
    fn deleting_inactive_chat_keeps_selection() {
        let mut store = SessionStore::in_memory();
        let older = store.create_chat();
        let newer = store.create_chat();

        assert!(store.delete_chat(older));
        assert_eq!(store.active_chat_id(), Some(newer));
    }

    #[test]
    fn deleting_only_chat_clears_selection() {
        let mut store = SessionStore::in_memory();
        let only = store.create_chat();
        assert!(store.delete_chat(only));
        assert_eq!(store.active_chat_id(), None);
        assert!(store.list().is_empty());
    }

    #[test]
    fn active_chat_never_dangles_across_mixed_operations() {
        let mut store = SessionStore::in_memory();
        let mut created = Vec::new();

        for step in 0..24_u64 {
            if step % 3 == 2 {
                let victim = created.remove((step as usize) % created.len());
                store.delete_chat(victim);
            } else {
                created.push(store.create_chat());
            }
            assert_active_is_valid(&store);
        }

        while let Some(chat_id) = created.pop() {
            store.delete_chat(chat_id);
            assert_active_is_valid(&store);
        }
        assert_eq!(store.active_chat_id(), None);
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let mut store = SessionStore::in_memory();
        let chat_id = store.create_chat();
        let unknown = ChatId::new(1);

        assert!(!store.set_active(unknown));
        assert!(!store.delete_chat(unknown));
        assert!(!store.append_message(unknown, Message::user(MessageId::new(2), "lost")));
        assert_eq!(store.active_chat_id(), Some(chat_id));
        assert!(store.get_chat(chat_id).unwrap().messages.is_empty());
    }

    #[test]
    fn every_mutation_is_persisted() {
        let backend = Arc::new(MemoryStore::new());
        let mut store = SessionStore::open(backend.clone()).unwrap();

        let chat_id = store.create_chat();
        let message_id = store.ids().message_id();
        store.append_message(chat_id, Message::user(message_id, "Hello"));

        let reopened = SessionStore::open(backend.clone()).unwrap();
        assert_eq!(reopened.list(), store.list());
        assert_eq!(reopened.active_chat_id(), Some(chat_id));

        store.delete_chat(chat_id);
        let reopened = SessionStore::open(backend).unwrap();
        assert!(reopened.list().is_empty());
        assert_eq!(reopened.active_chat_id(), None);
    }

    #[test]
    fn reopening_reproduces_chats_and_never_reissues_ids() {
        let backend = Arc::new(MemoryStore::new());
        let mut store = SessionStore::open(backend.clone()).unwrap();
        let older = store.create_chat();
        let newer = store.create_chat();
        let message_id = store.ids().message_id();
        store.append_message(older, Message::user(message_id, "First question"));

        let reopened = SessionStore::open(backend).unwrap();
        assert_eq!(reopened.list(), store.list());
        assert_eq!(reopened.active_chat_id(), Some(newer));

        let next = reopened.ids().next_raw();
        assert!(next > message_id.as_u64());
        assert!(next > newer.as_u64());
    }

    #[test]
    fn legacy_duplicate_ids_are_repaired_on_open() {
        let legacy = r#"[
            {"id":"500","title":"Hi","createdAt":500,"messages":[
                {"role":"user","content":"Hi","id":"501"},
                {"role":"assistant","content":"Hello","id":"501"}
            ]},
            {"id":"500","title":"Dup","createdAt":400,"messages":[]}
        ]"#;
        let backend = Arc::new(MemoryStore::with_value(CHATS_KEY, legacy));
        let store = SessionStore::open(backend).unwrap();

        let chats = store.list();
        assert_eq!(chats.len(), 2);
        assert_ne!(chats[0].id, chats[1].id);
        assert_ne!(chats[0].messages[0].id, chats[0].messages[1].id);
        assert_eq!(chats[0].messages[1].role, Role::Assistant);
        assert_eq!(chats[1].title, "Dup");
    }

    #[test]
    fn legacy_snapshot_is_rewritten_as_current_envelope() {
        let legacy = r#"[
            {"id":"700","title":"Old chat","createdAt":700,"messages":[
                {"id":"701","role":"user","content":"Old chat"}
            ]}
        ]"#;
        let backend = Arc::new(MemoryStore::with_value(CHATS_KEY, legacy));
        let mut store = SessionStore::open(backend.clone()).unwrap();

        assert!(store.set_active(ChatId::new(700)));

        let raw = backend.get(CHATS_KEY).unwrap().unwrap();
        let saved: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(saved["version"], 1);
        assert_eq!(saved["chats"][0]["id"], "700");
        assert_eq!(saved["chats"][0]["title"], "Old chat");
        assert_eq!(saved["chats"][0]["messages"][0]["id"], "701");
    }

    #[test]
    fn maximal_legacy_id_is_never_reissued() {
        let legacy = r#"[{"id":"18446744073709551615","title":"Edge","createdAt":1,"messages":[]}]"#;
        let backend = Arc::new(MemoryStore::with_value(CHATS_KEY, legacy));
        let mut store = SessionStore::open(backend).unwrap();

        let created = store.create_chat();
        let message_id = store.ids().message_id();

        assert_ne!(created, ChatId::new(u64::MAX));
        assert!(message_id.as_u64() > created.as_u64());
        assert_eq!(store.list().len(), 2);
    }

    #[test]
    fn non_utf8_snapshot_file_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FileStore::new(dir.path()));
        std::fs::write(backend.value_path(CHATS_KEY), [0xff, 0xfe]).unwrap();

        let mut store = SessionStore::open(backend.clone()).unwrap();
        assert!(store.list().is_empty());
        assert_eq!(store.active_chat_id(), None);
        assert_eq!(
            backend.get(UNREADABLE_CHATS_KEY).unwrap().as_deref(),
            Some("\u{fffd}\u{fffd}")
        );

        store.create_chat();
        let reopened = SessionStore::open(backend).unwrap();
        assert_eq!(reopened.list().len(), 1);
    }

    #[test]
    fn unreadable_snapshot_opens_empty_and_keeps_a_copy() {
        let backend = Arc::new(MemoryStore::with_value(CHATS_KEY, "{\"version\":99}"));
        let mut store = SessionStore::open(backend.clone()).unwrap();
        assert!(store.list().is_empty());
        assert_eq!(store.active_chat_id(), None);

        store.create_chat();
        assert_eq!(
            backend.get(UNREADABLE_CHATS_KEY).unwrap().as_deref(),
            Some("{\"version\":99}")
        );
    }

    #[test]
    fn backend_write_failures_keep_memory_authoritative() {
        let mut store = SessionStore::open(Arc::new(FailingStore)).unwrap();
        let chat_id = store.create_chat();
        let message_id = store.ids().message_id();

        assert!(store.append_message(chat_id, Message::user(message_id, "still here")));
        assert_eq!(store.active_chat().unwrap().messages.len(), 1);
    }
}
