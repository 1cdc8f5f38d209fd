// Grouping and filtering of the chat-history archive

use chrono::{DateTime, Duration, Local, NaiveDate};

use crate::models::ArchivedConversation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RecencyGroup {
    Pinned,
    Today,
    Yesterday,
    PreviousWeek,
    PreviousMonth,
    Older,
}

impl RecencyGroup {
    pub fn label(self) -> &'static str {
        match self {
            RecencyGroup::Pinned => "Pinned",
            RecencyGroup::Today => "Today",
            RecencyGroup::Yesterday => "Yesterday",
            RecencyGroup::PreviousWeek => "Previous 7 days",
            RecencyGroup::PreviousMonth => "Previous 30 days",
            RecencyGroup::Older => "Older",
        }
    }

    fn for_date(date: NaiveDate, today: NaiveDate) -> Self {
        let age = today.signed_duration_since(date);
        if age < Duration::days(1) {
            RecencyGroup::Today
        } else if age < Duration::days(2) {
            RecencyGroup::Yesterday
        } else if age < Duration::days(7) {
            RecencyGroup::PreviousWeek
        } else if age < Duration::days(30) {
            RecencyGroup::PreviousMonth
        } else {
            RecencyGroup::Older
        }
    }
}

/// Case-insensitive match over title and message content. A blank query matches all.
pub fn matches_query(conversation: &ArchivedConversation, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return true;
    }
    conversation.title.to_lowercase().contains(&query)
        || conversation
            .messages
            .iter()
            .any(|m| m.content.to_lowercase().contains(&query))
}

pub fn filter<'a>(archive: &'a [ArchivedConversation], query: &str) -> Vec<&'a ArchivedConversation> {
    archive.iter().filter(|c| matches_query(c, query)).collect()
}

/// Groups conversations, newest first within each group; pinned ones lead.
pub fn group_by_recency<'a>(
    archive: &[&'a ArchivedConversation],
    now: DateTime<Local>,
) -> Vec<(RecencyGroup, Vec<&'a ArchivedConversation>)> {
    let today = now.date_naive();
    let mut groups: Vec<(RecencyGroup, Vec<&'a ArchivedConversation>)> = Vec::new();

    let mut sorted = archive.to_vec();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    for conversation in sorted {
        let group = if conversation.pinned {
            RecencyGroup::Pinned
        } else {
            RecencyGroup::for_date(conversation.created_at.with_timezone(&Local).date_naive(), today)
        };
        match groups.iter_mut().find(|(g, _)| *g == group) {
            Some((_, members)) => members.push(conversation),
            None => groups.push((group, vec![conversation])),
        }
    }
    groups.sort_by_key(|(group, _)| *group);
    groups
}
