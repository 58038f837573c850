use super::ids::ChatId;
use super::message::Chat;

const DAY_MILLIS: u64 = 24 * 60 * 60 * 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChatAgeGroup {
    Today,
    Yesterday,
    Older,
}

/// One chat row; `position` is the 1-based index into the full chat list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidebarEntry {
    pub position: usize,
    pub chat_id: ChatId,
    pub title: String,
    pub message_count: usize,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SidebarItem {
    GroupHeader(&'static str),
    Chat(SidebarEntry),
}

/// Groups chats by age and filters them by a case-insensitive title query.
pub fn build_sidebar(
    chats: &[Chat],
    active_chat_id: Option<ChatId>,
    query: &str,
    now_unix_millis: u64,
) -> Vec<SidebarItem> {
    let normalized_query = query.trim().to_lowercase();

    let mut today_items = Vec::new();
    let mut yesterday_items = Vec::new();
    let mut older_items = Vec::new();

    // Store order (newest first) is preserved inside each group.
    for (index, chat) in chats.iter().enumerate() {
        if !matches_query(chat, &normalized_query) {
            continue;
        }

        let entry = SidebarEntry {
            position: index + 1,
            chat_id: chat.id,
            title: chat.title.clone(),
            message_count: chat.messages.len(),
            active: active_chat_id == Some(chat.id),
        };

        match classify_group(chat.created_at, now_unix_millis) {
            ChatAgeGroup::Today => today_items.push(entry),
            ChatAgeGroup::Yesterday => yesterday_items.push(entry),
            ChatAgeGroup::Older => older_items.push(entry),
        }
    }

    let mut items = Vec::new();
    append_group(&mut items, "Today", today_items);
    append_group(&mut items, "Yesterday", yesterday_items);
    append_group(&mut items, "Older", older_items);
    items
}

fn append_group(items: &mut Vec<SidebarItem>, title: &'static str, entries: Vec<SidebarEntry>) {
    if entries.is_empty() {
        return;
    }

    items.push(SidebarItem::GroupHeader(title));
    items.extend(entries.into_iter().map(SidebarItem::Chat));
}

fn matches_query(chat: &Chat, normalized_query: &str) -> bool {
    if normalized_query.is_empty() {
        return true;
    }

    chat.title.to_lowercase().contains(normalized_query)
}

fn classify_group(created_at_unix_millis: u64, now_unix_millis: u64) -> ChatAgeGroup {
    let age = now_unix_millis.saturating_sub(created_at_unix_millis);

    // Elapsed-time buckets; no timezone is involved.
    if age < DAY_MILLIS {
        ChatAgeGroup::Today
    } else if age < DAY_MILLIS * 2 {
        ChatAgeGroup::Yesterday
    } else {
        ChatAgeGroup::Older
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 10 * DAY_MILLIS;

    fn chat(id: u64, title: &str, created_at: u64) -> Chat {
        let mut chat = Chat::new(ChatId::new(id), created_at);
        chat.title = title.to_string();
        chat
    }

    fn chat_rows(items: &[SidebarItem]) -> Vec<(usize, &str)> {
        items
            .iter()
            .filter_map(|item| match item {
                SidebarItem::Chat(entry) => Some((entry.position, entry.title.as_str())),
                SidebarItem::GroupHeader(_) => None,
            })
            .collect()
    }

    #[test]
    fn chats_are_grouped_by_age_in_store_order() {
        let chats = vec![
            chat(3, "Fresh", NOW - 1_000),
            chat(2, "From yesterday", NOW - DAY_MILLIS - 1_000),
            chat(1, "Ancient", NOW - 5 * DAY_MILLIS),
        ];

        let items = build_sidebar(&chats, Some(ChatId::new(2)), "", NOW);

        assert_eq!(items[0], SidebarItem::GroupHeader("Today"));
        assert_eq!(items[2], SidebarItem::GroupHeader("Yesterday"));
        assert_eq!(items[4], SidebarItem::GroupHeader("Older"));
        assert_eq!(
            chat_rows(&items),
            vec![(1, "Fresh"), (2, "From yesterday"), (3, "Ancient")]
        );
        assert!(matches!(&items[3], SidebarItem::Chat(entry) if entry.active));
    }

    #[test]
    fn query_filters_titles_case_insensitively_and_keeps_positions() {
        let chats = vec![
            chat(3, "Rust lifetimes", NOW),
            chat(2, "Dinner ideas", NOW),
            chat(1, "rusty bike chain", NOW),
        ];

        let items = build_sidebar(&chats, None, "  RUST ", NOW);
        assert_eq!(
            chat_rows(&items),
            vec![(1, "Rust lifetimes"), (3, "rusty bike chain")]
        );
    }

    #[test]
    fn empty_groups_have_no_header() {
        let chats = vec![chat(1, "Only", NOW)];
        let items = build_sidebar(&chats, None, "", NOW);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], SidebarItem::GroupHeader("Today"));
    }
}
