// Instruction templates and canned replies

use crate::classifier::{FallbackBucket, IdentityTopic};

pub const ASSISTANT_NAME: &str = "SafariMind";

/// Openers the greeting prompt forbids; replies starting with one are rejected.
pub const BANNED_OPENERS: &[&str] = &[
    "Hello there",
    "Hi there",
    "Hey there",
    "Greetings",
    "Hello!",
    "Hi!",
    "How can I assist you today",
    "How may I help you",
];

pub const SYSTEM_INSTRUCTION: &str = "You are SafariMind, a warm and knowledgeable AI assistant. \
Answer clearly and accurately, use markdown where it helps readability, and keep a friendly, \
curious tone.";

pub const CONNECTION_ISSUE_REPLY: &str = "I'm having trouble connecting right now. \
Please check your connection and try again in a moment.";

pub const IDENTITY_WHO_REPLY: &str = "I'm SafariMind, an AI assistant built by an independent \
team of developers who wanted a companion that explores ideas the way a guide explores the \
savanna: with curiosity and care. I run on a large language model and I'm here to help you \
find your way through questions big and small.";

pub const IDENTITY_WHAT_REPLY: &str = "I'm SafariMind, and I can help with a wide range of \
things: answering questions, explaining tricky concepts, brainstorming ideas, drafting and \
editing text, summarising information, and working through problems step by step. Just tell \
me what you're curious about and we'll explore it together.";

pub const IDENTITY_GENERAL_REPLY: &str = "I'm SafariMind, an AI assistant created by a small \
team of developers. I'm built on a large language model, which lets me answer questions, \
explain ideas, help with writing and think through problems with you. I don't have feelings \
or personal experiences, but I'm always happy to help.";

/// Every canned identity paragraph, in who/what/general order.
pub const IDENTITY_REPLIES: [&str; 3] = [IDENTITY_WHO_REPLY, IDENTITY_WHAT_REPLY, IDENTITY_GENERAL_REPLY];

pub fn identity_reply(topic: IdentityTopic) -> &'static str {
    match topic {
        IdentityTopic::Who => IDENTITY_WHO_REPLY,
        IdentityTopic::What => IDENTITY_WHAT_REPLY,
        IdentityTopic::General => IDENTITY_GENERAL_REPLY,
    }
}

pub fn static_greeting(display_name: Option<&str>) -> String {
    match display_name.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => format!("Jambo, {name}! Good to see you. What would you like to explore today?"),
        None => "Jambo! Good to see you. What would you like to explore today?".to_string(),
    }
}

pub fn starts_with_banned_opener(text: &str) -> bool {
    let trimmed = text.trim_start().to_lowercase();
    BANNED_OPENERS
        .iter()
        .any(|opener| trimmed.starts_with(&opener.to_lowercase()))
}

pub fn greeting_prompt(user_text: &str, display_name: Option<&str>) -> String {
    let banned = BANNED_OPENERS
        .iter()
        .map(|opener| format!("\"{opener}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let name_line = match display_name {
        Some(name) => format!("The user's name is {name}; greet them by name.\n"),
        None => String::new(),
    };
    format!(
        "You are {ASSISTANT_NAME}, a friendly AI assistant. The user just greeted you with: \
\"{user_text}\".\n\
Reply with a short, warm greeting of one or two sentences and invite them to share what \
they'd like to talk about.\n\
{name_line}\
Do NOT start your reply with any of these: {banned}.\n\
Vary your wording every time; be natural and a little playful, never robotic."
    )
}

pub fn simplified_greeting_prompt(user_text: &str, display_name: Option<&str>) -> String {
    let who = display_name.map(|name| format!(" to {name}")).unwrap_or_default();
    format!(
        "Write a brief, friendly greeting{who} in reply to \"{user_text}\". \
One sentence. Do not begin with \"Hello there\" or \"Hi there\"."
    )
}

pub fn identity_prompt(topic: IdentityTopic, user_text: &str) -> String {
    let focus = match topic {
        IdentityTopic::Who => {
            "Focus on your origin story: you are SafariMind, built by an independent team of \
developers on top of a large language model. Do not claim to be made by any other company."
        }
        IdentityTopic::What => {
            "Focus on your capabilities: answering questions, explaining concepts, writing help, \
brainstorming and step-by-step problem solving. Give a few concrete examples."
        }
        IdentityTopic::General => {
            "Give a balanced introduction: who you are, who built you, and what you can help \
with, in equal measure."
        }
    };
    format!(
        "You are {ASSISTANT_NAME}, an AI assistant. The user asked: \"{user_text}\".\n\
{focus}\n\
Answer in a short, friendly paragraph written in the first person."
    )
}

pub fn simplified_identity_prompt(topic: IdentityTopic, user_text: &str) -> String {
    let focus = match topic {
        IdentityTopic::Who => "who created you",
        IdentityTopic::What => "what you can do",
        IdentityTopic::General => "who you are and what you can do",
    };
    format!(
        "You are {ASSISTANT_NAME}, an AI assistant. In two or three sentences, tell the user \
{focus}. Their question was: \"{user_text}\""
    )
}

pub fn bucket_prompt(bucket: FallbackBucket, user_text: &str) -> String {
    let instruction = match bucket {
        FallbackBucket::GreetingLike => "Respond with a short, friendly greeting.",
        FallbackBucket::HelpLike => {
            "The user is asking for help. Give a clear, helpful, concise answer."
        }
        FallbackBucket::ThanksLike => {
            "The user is thanking you. Reply graciously in one or two sentences."
        }
        FallbackBucket::Other => "Give a helpful, concise answer.",
    };
    format!("You are {ASSISTANT_NAME}, a helpful AI assistant. {instruction}\n\nUser: {user_text}")
}

pub fn minimal_prompt(user_text: &str) -> String {
    format!("Answer briefly and helpfully.\n\n{user_text}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_greeting_interpolates_name() {
        assert!(static_greeting(Some("Amani")).contains("Amani"));
        assert!(!static_greeting(Some("  ")).contains(','));
        assert!(!static_greeting(None).is_empty());
    }

    #[test]
    fn canned_texts_avoid_banned_openers() {
        assert!(!starts_with_banned_opener(&static_greeting(None)));
        assert!(!starts_with_banned_opener(&static_greeting(Some("Amani"))));
        for reply in IDENTITY_REPLIES {
            assert!(!starts_with_banned_opener(reply));
        }
    }

    #[test]
    fn banned_opener_check_is_case_insensitive() {
        assert!(starts_with_banned_opener("  hello there, friend"));
        assert!(starts_with_banned_opener("GREETINGS, traveller"));
        assert!(!starts_with_banned_opener("Well hello there"));
    }

    #[test]
    fn greeting_prompt_lists_banned_openers_and_name() {
        let prompt = greeting_prompt("hey", Some("Amani"));
        assert!(prompt.contains("\"Hi there\""));
        assert!(prompt.contains("Amani"));
        assert!(!greeting_prompt("hey", None).contains("user's name"));
    }

    #[test]
    fn identity_prompts_differ_by_topic() {
        let who = identity_prompt(IdentityTopic::Who, "who made you");
        let what = identity_prompt(IdentityTopic::What, "who made you");
        assert!(who.contains("origin story"));
        assert!(what.contains("capabilities"));
        assert_eq!(identity_reply(IdentityTopic::What), IDENTITY_WHAT_REPLY);
    }
}
