// Command handlers for the terminal front end

use chrono::Local;
use uuid::Uuid;

use crate::history;
use crate::models::{Author, Message, MessageStatus};
use crate::state::AppState;

pub const HELP_TEXT: &str = "\
Type a message to chat. Commands:
  /new                 archive this chat and start a new one
  /regen               regenerate the last reply
  /edit <n> <text>     edit message n and regenerate its reply
  /show                print the current chat
  /history [query]     list archived chats, optionally filtered
  /restore <n>         reopen archived chat n
  /rename <n> <title>  rename archived chat n
  /pin <n>             pin or unpin archived chat n
  /delete <n>          delete archived chat n
  /name [name]         set or clear your display name
  /quit                exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Chat(String),
    New,
    Regenerate,
    Edit { index: usize, text: String },
    Show,
    History(Option<String>),
    Restore(usize),
    Rename { index: usize, title: String },
    Pin(usize),
    Delete(usize),
    Name(Option<String>),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Quit,
}

fn parse_index(raw: Option<&str>) -> Result<usize, String> {
    raw.and_then(|s| s.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .ok_or_else(|| "Expected a positive number".to_string())
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Command::Chat(line.to_string()));
        };
        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };
        let optional = |s: &str| Some(s.to_string()).filter(|s| !s.is_empty());
        let mut words = args.splitn(2, char::is_whitespace);

        match name {
            "new" => Ok(Command::New),
            "regen" => Ok(Command::Regenerate),
            "edit" => {
                let index = parse_index(words.next())?;
                let text = words.next().unwrap_or("").to_string();
                Ok(Command::Edit { index, text })
            }
            "show" => Ok(Command::Show),
            "history" => Ok(Command::History(optional(args))),
            "restore" => Ok(Command::Restore(parse_index(words.next())?)),
            "rename" => {
                let index = parse_index(words.next())?;
                let title = words.next().unwrap_or("").to_string();
                Ok(Command::Rename { index, title })
            }
            "pin" => Ok(Command::Pin(parse_index(words.next())?)),
            "delete" => Ok(Command::Delete(parse_index(words.next())?)),
            "name" => Ok(Command::Name(optional(args))),
            "help" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(format!("Unknown command '/{}'. Type /help for a list.", other)),
        }
    }
}

fn render_message(index: usize, message: &Message) -> String {
    let who = match message.author {
        Author::User => "you",
        Author::Assistant => "SafariMind",
    };
    let marker = match message.status {
        MessageStatus::Final => "",
        MessageStatus::Pending => " (typing...)",
        MessageStatus::Errored => " (!)",
    };
    format!("[{}] {} {}{}: {}", index + 1, message.created_at, who, marker, message.content)
}

fn reply_text(state: &AppState, id: Uuid) -> String {
    match state.session.conversation().get(id) {
        Some(message) if message.status == MessageStatus::Errored => format!("(!) {}", message.content),
        Some(message) => message.content.clone(),
        None => String::new(),
    }
}

async fn archived_id(state: &AppState, index: usize) -> anyhow::Result<Option<Uuid>> {
    state.flush().await;
    let archive = state.storage.list_archived().await?;
    Ok(index.checked_sub(1).and_then(|i| archive.get(i)).map(|c| c.id))
}

pub async fn execute(state: &mut AppState, command: Command) -> anyhow::Result<Reply> {
    let text = match command {
        Command::Chat(text) => match state.session.submit(&text).await {
            Ok(id) => reply_text(state, id),
            Err(e) => format!("Cannot send: {}", e),
        },
        Command::New => match state.session.start_new_conversation()? {
            Some(archived) => format!("Archived \"{}\". Started a new chat.", archived.title),
            None => "Started a new chat.".to_string(),
        },
        Command::Regenerate => {
            let last = state
                .session
                .messages()
                .iter()
                .rev()
                .find(|m| m.is_assistant())
                .map(|m| m.id);
            match last {
                Some(id) => match state.session.regenerate(id).await? {
                    Some(new_id) => reply_text(state, new_id),
                    None => "Nothing to regenerate.".to_string(),
                },
                None => "Nothing to regenerate.".to_string(),
            }
        }
        Command::Edit { index, text } => {
            let Some(id) = index.checked_sub(1).and_then(|i| state.session.messages().get(i)).map(|m| m.id) else {
                return Ok(Reply::Text(format!("No message number {}.", index)));
            };
            match state.session.edit_user_message(id, &text).await {
                Ok(Some(new_id)) => reply_text(state, new_id),
                Ok(None) => "Message updated.".to_string(),
                Err(e) => format!("Cannot edit: {}", e),
            }
        }
        Command::Show => {
            let messages = state.session.messages();
            if messages.is_empty() {
                "This chat is empty.".to_string()
            } else {
                messages
                    .iter()
                    .enumerate()
                    .map(|(i, m)| render_message(i, m))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        Command::History(query) => {
            state.flush().await;
            let archive = state.storage.list_archived().await?;
            let matching = history::filter(&archive, query.as_deref().unwrap_or(""));
            if matching.is_empty() {
                "No archived chats.".to_string()
            } else {
                let mut lines = Vec::new();
                for (group, conversations) in history::group_by_recency(&matching, Local::now()) {
                    lines.push(format!("{}:", group.label()));
                    for conversation in conversations {
                        let number = archive.iter().position(|c| c.id == conversation.id).unwrap_or(0) + 1;
                        lines.push(format!("  {}. {}", number, conversation.title));
                    }
                }
                lines.join("\n")
            }
        }
        Command::Restore(index) => match archived_id(state, index).await? {
            Some(id) if state.restore_archived(id).await? => {
                format!("Restored chat with {} messages.", state.session.messages().len())
            }
            _ => format!("No archived chat number {}.", index),
        },
        Command::Rename { index, title } => match archived_id(state, index).await? {
            Some(id) => match state.storage.rename_archived(id, title).await {
                Ok(()) => "Renamed.".to_string(),
                Err(e) => format!("Cannot rename: {}", e),
            },
            None => format!("No archived chat number {}.", index),
        },
        Command::Pin(index) => match archived_id(state, index).await? {
            Some(id) => {
                let pinned = state.storage.get_archived(id).await?.is_some_and(|c| c.pinned);
                state.storage.set_archived_pinned(id, !pinned).await?;
                if pinned { "Unpinned." } else { "Pinned." }.to_string()
            }
            None => format!("No archived chat number {}.", index),
        },
        Command::Delete(index) => match archived_id(state, index).await? {
            Some(id) => {
                state.storage.delete_archived(id).await?;
                "Deleted.".to_string()
            }
            None => format!("No archived chat number {}.", index),
        },
        Command::Name(name) => {
            state.set_display_name(name).await?;
            match state.session.display_name() {
                Some(name) => format!("I'll call you {}.", name),
                None => "Display name cleared.".to_string(),
            }
        }
        Command::Help => HELP_TEXT.to_string(),
        Command::Quit => return Ok(Reply::Quit),
    };
    Ok(Reply::Text(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::prompts;
    use crate::rotation::testing::ScriptedProvider;
    use std::sync::Arc;

    async fn open_state(dir: &tempfile::TempDir, provider: Arc<ScriptedProvider>) -> AppState {
        let config = AppConfig {
            api_keys: vec!["test-key".to_string()],
            db_path: dir.path().join("chat.sqlite"),
            typing_delay_ms: 0,
            ..AppConfig::default()
        };
        AppState::with_provider(config, provider).await.unwrap()
    }

    fn text(reply: Reply) -> String {
        match reply {
            Reply::Text(text) => text,
            Reply::Quit => panic!("unexpected quit"),
        }
    }

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("  tell me a story "), Ok(Command::Chat("tell me a story".to_string())));
        assert_eq!(
            Command::parse("/edit 3 new words here"),
            Ok(Command::Edit { index: 3, text: "new words here".to_string() })
        );
        assert_eq!(Command::parse("/history"), Ok(Command::History(None)));
        assert_eq!(Command::parse("/history lions"), Ok(Command::History(Some("lions".to_string()))));
        assert_eq!(Command::parse("/name"), Ok(Command::Name(None)));
        assert_eq!(Command::parse("/exit"), Ok(Command::Quit));
        assert!(Command::parse("/restore 0").is_err());
        assert!(Command::parse("/restore x").is_err());
        assert!(Command::parse("/dance").is_err());
    }

    #[tokio::test]
    async fn chat_archive_and_restore_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::replying("Zebras live in Africa."));
        let mut state = open_state(&dir, provider).await;

        let reply = text(execute(&mut state, Command::Chat("where do zebras live".to_string())).await.unwrap());
        assert_eq!(reply, "Zebras live in Africa.");

        let reply = text(execute(&mut state, Command::New).await.unwrap());
        assert!(reply.contains("where do zebras live"));
        assert!(state.session.messages().is_empty());

        let listing = text(execute(&mut state, Command::History(Some("zebra".to_string()))).await.unwrap());
        assert!(listing.contains("Today:"));
        assert!(listing.contains("1. where do zebras live"));

        let reply = text(execute(&mut state, Command::Restore(1)).await.unwrap());
        assert_eq!(reply, "Restored chat with 2 messages.");
        assert!(state.storage.list_archived().await.unwrap().is_empty());

        state.shutdown().await;
    }

    #[tokio::test]
    async fn renamed_and_pinned_chat_keeps_metadata_through_restore() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = open_state(&dir, Arc::new(ScriptedProvider::replying("Savannas."))).await;

        execute(&mut state, Command::Chat("where do zebras live".to_string())).await.unwrap();
        execute(&mut state, Command::New).await.unwrap();
        let reply = text(
            execute(&mut state, Command::Rename { index: 1, title: "My zebra notes".to_string() })
                .await
                .unwrap(),
        );
        assert_eq!(reply, "Renamed.");
        assert_eq!(text(execute(&mut state, Command::Pin(1)).await.unwrap()), "Pinned.");

        execute(&mut state, Command::Restore(1)).await.unwrap();
        state.shutdown().await;

        let mut state = open_state(&dir, Arc::new(ScriptedProvider::replying("Grasslands."))).await;
        assert_eq!(state.session.conversation().title.as_deref(), Some("My zebra notes"));
        execute(&mut state, Command::Chat("and giraffes".to_string())).await.unwrap();
        let reply = text(execute(&mut state, Command::New).await.unwrap());
        assert!(reply.contains("My zebra notes"));

        state.flush().await;
        let archive = state.storage.list_archived().await.unwrap();
        assert_eq!(archive.len(), 1);
        assert_eq!(archive[0].title, "My zebra notes");
        assert!(archive[0].pinned);
        assert!(archive[0].renamed);
        assert_eq!(archive[0].messages.len(), 4);
        state.shutdown().await;
    }

    #[tokio::test]
    async fn session_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut state = open_state(&dir, Arc::new(ScriptedProvider::replying("ok"))).await;
            execute(&mut state, Command::Chat("remember the baobab".to_string())).await.unwrap();
            execute(&mut state, Command::Name(Some("Amani".to_string()))).await.unwrap();
            state.shutdown().await;
        }
        let state = open_state(&dir, Arc::new(ScriptedProvider::failing())).await;
        assert_eq!(state.session.messages().len(), 2);
        assert_eq!(state.session.messages()[0].content, "remember the baobab");
        assert_eq!(state.session.display_name(), Some("Amani"));
        state.shutdown().await;
    }

    #[tokio::test]
    async fn validation_and_failure_are_reported_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = open_state(&dir, Arc::new(ScriptedProvider::failing())).await;

        let reply = text(execute(&mut state, Command::Chat("   ".to_string())).await.unwrap());
        assert!(reply.starts_with("Cannot send"));

        let reply = text(execute(&mut state, Command::Chat("plan a trip".to_string())).await.unwrap());
        assert_eq!(reply, format!("(!) {}", prompts::CONNECTION_ISSUE_REPLY));

        let reply = text(execute(&mut state, Command::Edit { index: 9, text: "x".to_string() }).await.unwrap());
        assert_eq!(reply, "No message number 9.");
        assert_eq!(execute(&mut state, Command::Quit).await.unwrap(), Reply::Quit);
        state.shutdown().await;
    }

    #[tokio::test]
    async fn regenerate_and_edit_via_commands() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(
            ScriptedProvider::replying("third")
                .then(Ok("first".to_string()))
                .then(Ok("second".to_string())),
        );
        let mut state = open_state(&dir, provider).await;

        execute(&mut state, Command::Chat("tell me about rivers".to_string())).await.unwrap();
        let reply = text(execute(&mut state, Command::Regenerate).await.unwrap());
        assert_eq!(reply, "second");
        let reply = text(
            execute(&mut state, Command::Edit { index: 1, text: "tell me about lakes".to_string() })
                .await
                .unwrap(),
        );
        assert_eq!(reply, "third");

        let shown = text(execute(&mut state, Command::Show).await.unwrap());
        assert!(shown.contains("[1]"));
        assert!(shown.contains("tell me about lakes"));
        state.shutdown().await;
    }
}
