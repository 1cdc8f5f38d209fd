// Keyword classification of user utterances

/// What kind of utterance the user sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Greeting,
    IdentityWho,
    IdentityWhat,
    IdentityGeneral,
    Generic,
}

/// Which facet of the assistant's identity a question is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityTopic {
    /// Origin story: who built it and where it comes from.
    Who,
    /// Capabilities.
    What,
    /// Ambiguous identity questions; answered with a balanced mix.
    General,
}

impl Classification {
    pub fn identity_topic(self) -> Option<IdentityTopic> {
        match self {
            Classification::IdentityWho => Some(IdentityTopic::Who),
            Classification::IdentityWhat => Some(IdentityTopic::What),
            Classification::IdentityGeneral => Some(IdentityTopic::General),
            Classification::Greeting | Classification::Generic => None,
        }
    }
}

/// Coarse bucket used to pick a simplified retry prompt for generic messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackBucket {
    GreetingLike,
    HelpLike,
    ThanksLike,
    Other,
}

pub const GREETING_KEYWORDS: &[&str] = &["hi", "hello", "hey"];

pub const IDENTITY_WHO_KEYWORDS: &[&str] = &[
    "who made you",
    "who created you",
    "who built you",
    "who developed you",
    "who designed you",
    "who trained you",
    "who are you",
    "who owns you",
    "your creator",
    "your developer",
    "where do you come from",
    "where are you from",
];

pub const IDENTITY_WHAT_KEYWORDS: &[&str] = &[
    "what can you do",
    "what are you capable of",
    "what are your capabilities",
    "your capabilities",
    "what do you do",
    "how can you help",
    "what are your features",
    "what are you good at",
];

pub const IDENTITY_GENERAL_KEYWORDS: &[&str] = &[
    "what are you",
    "tell me about yourself",
    "about yourself",
    "introduce yourself",
    "your name",
    "are you an ai",
    "are you a bot",
    "are you human",
    "are you real",
];

const BUCKET_GREETING_KEYWORDS: &[&str] = &[
    "hi",
    "hello",
    "hey",
    "good morning",
    "good afternoon",
    "good evening",
    "howdy",
    "jambo",
];
const BUCKET_HELP_KEYWORDS: &[&str] = &["help", "how do i", "how to", "explain", "can you", "assist"];
const BUCKET_THANKS_KEYWORDS: &[&str] = &["thank", "thanks", "appreciate", "grateful"];

/// Decides whether lower-cased text matches any of a keyword list.
pub trait KeywordMatcher: Send + Sync {
    fn matches(&self, text: &str, keywords: &[&str]) -> bool;
}

/// Plain substring containment. "this" matches "hi"; that is accepted.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubstringMatcher;

impl KeywordMatcher for SubstringMatcher {
    fn matches(&self, text: &str, keywords: &[&str]) -> bool {
        keywords.iter().any(|keyword| text.contains(keyword))
    }
}

/// Classifies utterances using a pluggable [`KeywordMatcher`].
pub struct PromptClassifier<M: KeywordMatcher = SubstringMatcher> {
    matcher: M,
}

impl Default for PromptClassifier<SubstringMatcher> {
    fn default() -> Self {
        Self::new(SubstringMatcher)
    }
}

impl<M: KeywordMatcher> PromptClassifier<M> {
    pub fn new(matcher: M) -> Self {
        Self { matcher }
    }

    /// Greeting wins outright, then identity groups in who -> what -> general order.
    pub fn classify(&self, text: &str) -> Classification {
        let lowered = text.to_lowercase();
        if self.matcher.matches(&lowered, GREETING_KEYWORDS) {
            Classification::Greeting
        } else if self.matcher.matches(&lowered, IDENTITY_WHO_KEYWORDS) {
            Classification::IdentityWho
        } else if self.matcher.matches(&lowered, IDENTITY_WHAT_KEYWORDS) {
            Classification::IdentityWhat
        } else if self.matcher.matches(&lowered, IDENTITY_GENERAL_KEYWORDS) {
            Classification::IdentityGeneral
        } else {
            Classification::Generic
        }
    }

    pub fn bucket(&self, text: &str) -> FallbackBucket {
        let lowered = text.to_lowercase();
        if self.matcher.matches(&lowered, BUCKET_GREETING_KEYWORDS) {
            FallbackBucket::GreetingLike
        } else if self.matcher.matches(&lowered, BUCKET_THANKS_KEYWORDS) {
            FallbackBucket::ThanksLike
        } else if self.matcher.matches(&lowered, BUCKET_HELP_KEYWORDS) {
            FallbackBucket::HelpLike
        } else {
            FallbackBucket::Other
        }
    }
}

/// Classifies with the default substring strategy.
pub fn classify(text: &str) -> Classification {
    PromptClassifier::default().classify(text)
}

/// Second, narrower pass used when a generic request failed once.
pub fn fallback_bucket(text: &str) -> FallbackBucket {
    PromptClassifier::default().bucket(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greetings_are_detected_case_insensitively() {
        assert_eq!(classify("hello"), Classification::Greeting);
        assert_eq!(classify("HEY you"), Classification::Greeting);
        assert_eq!(classify("Hi"), Classification::Greeting);
    }

    #[test]
    fn greeting_beats_identity_keywords() {
        assert_eq!(classify("hello, who made you?"), Classification::Greeting);
        assert_eq!(classify("hey what can you do"), Classification::Greeting);
    }

    #[test]
    fn substring_matches_are_kept() {
        // "this" contains "hi"
        assert_eq!(classify("is this working"), Classification::Greeting);
    }

    #[test]
    fn identity_groups_in_precedence_order() {
        assert_eq!(classify("who made you"), Classification::IdentityWho);
        assert_eq!(classify("Who are you and what can you do"), Classification::IdentityWho);
        assert_eq!(classify("what can you do for me"), Classification::IdentityWhat);
        assert_eq!(classify("what are you"), Classification::IdentityGeneral);
        assert_eq!(classify("tell me about yourself"), Classification::IdentityGeneral);
    }

    #[test]
    fn everything_else_is_generic() {
        assert_eq!(classify("plan a route across the Serengeti"), Classification::Generic);
        assert_eq!(classify(""), Classification::Generic);
    }

    #[test]
    fn identity_topic_mapping() {
        assert_eq!(Classification::IdentityWho.identity_topic(), Some(IdentityTopic::Who));
        assert_eq!(Classification::IdentityGeneral.identity_topic(), Some(IdentityTopic::General));
        assert_eq!(Classification::Greeting.identity_topic(), None);
        assert_eq!(Classification::Generic.identity_topic(), None);
    }

    #[test]
    fn fallback_buckets() {
        assert_eq!(fallback_bucket("Good morning!"), FallbackBucket::GreetingLike);
        assert_eq!(fallback_bucket("thanks a lot"), FallbackBucket::ThanksLike);
        assert_eq!(fallback_bucket("can you explain black holes"), FallbackBucket::HelpLike);
        assert_eq!(fallback_bucket("weather in Nairobi"), FallbackBucket::Other);
    }

    struct WholeWordMatcher;

    impl KeywordMatcher for WholeWordMatcher {
        fn matches(&self, text: &str, keywords: &[&str]) -> bool {
            let words: Vec<&str> = text
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| !w.is_empty())
                .collect();
            keywords.iter().any(|keyword| {
                let parts: Vec<&str> = keyword.split(' ').collect();
                words.windows(parts.len()).any(|window| window == parts.as_slice())
            })
        }
    }

    #[test]
    fn matcher_strategy_is_swappable() {
        let classifier = PromptClassifier::new(WholeWordMatcher);
        assert_eq!(classifier.classify("is this working"), Classification::Generic);
        assert_eq!(classifier.classify("hi there"), Classification::Greeting);
        assert_eq!(classifier.classify("so, who made you?"), Classification::IdentityWho);
    }
}
