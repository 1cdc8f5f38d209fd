// Staged reply resolution with a canned fallback at the end

use crate::api::{GenerationError, GenerationParams, GenerationRequest, Turn, TurnRole};
use crate::classifier::{fallback_bucket, Classification, IdentityTopic};
use crate::models::{Message, MessageStatus};
use crate::prompts;
use crate::rotation::RotatingGenerator;

/// How a stage phrases its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Greeting,
    SimplifiedGreeting,
    Identity(IdentityTopic),
    SimplifiedIdentity(IdentityTopic),
    /// Full conversation history plus the system instruction.
    Conversation,
    /// Simplified prompt chosen by the coarse bucket pass.
    Bucket,
    /// Bare instruction and the raw user text.
    Minimal,
}

/// What to show once every stage has failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    StaticGreeting,
    CannedIdentity(IdentityTopic),
    ConnectionIssue,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stage {
    pub prompt: PromptKind,
    pub params: GenerationParams,
}

impl Stage {
    const fn new(prompt: PromptKind, params: GenerationParams) -> Self {
        Self { prompt, params }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionPlan {
    pub stages: Vec<Stage>,
    pub fallback: Fallback,
}

impl ResolutionPlan {
    pub fn for_classification(classification: Classification) -> Self {
        match classification {
            Classification::Greeting => Self {
                stages: vec![
                    Stage::new(PromptKind::Greeting, GenerationParams::GREETING),
                    Stage::new(PromptKind::SimplifiedGreeting, GenerationParams::GREETING),
                ],
                fallback: Fallback::StaticGreeting,
            },
            Classification::IdentityWho | Classification::IdentityWhat | Classification::IdentityGeneral => {
                let topic = classification.identity_topic().unwrap_or(IdentityTopic::General);
                Self {
                    stages: vec![
                        Stage::new(PromptKind::Identity(topic), GenerationParams::IDENTITY),
                        Stage::new(PromptKind::SimplifiedIdentity(topic), GenerationParams::IDENTITY),
                    ],
                    fallback: Fallback::CannedIdentity(topic),
                }
            }
            Classification::Generic => Self {
                stages: vec![
                    Stage::new(PromptKind::Conversation, GenerationParams::GENERIC),
                    Stage::new(PromptKind::Bucket, GenerationParams::GENERIC),
                    Stage::new(PromptKind::Minimal, GenerationParams::GENERIC),
                ],
                fallback: Fallback::ConnectionIssue,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// The endpoint produced the text.
    Generated,
    /// Every attempt failed but canned text is an acceptable answer.
    Canned,
    /// Every attempt failed; the text is the connection-issue notice.
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub text: String,
    pub outcome: ResolutionOutcome,
}

impl Resolution {
    pub fn status(&self) -> MessageStatus {
        match self.outcome {
            ResolutionOutcome::Generated | ResolutionOutcome::Canned => MessageStatus::Final,
            ResolutionOutcome::Failed => MessageStatus::Errored,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.outcome != ResolutionOutcome::Generated
    }

    /// Shown when the resolution task itself blew up.
    pub fn connection_issue() -> Self {
        Self {
            text: prompts::CONNECTION_ISSUE_REPLY.to_string(),
            outcome: ResolutionOutcome::Failed,
        }
    }
}

/// Everything one resolution needs; owned so it can move into a task.
#[derive(Debug, Clone)]
pub struct ResolveInput {
    pub user_text: String,
    pub classification: Classification,
    /// Prior turns, ending with the user message being answered.
    pub context: Vec<Message>,
    pub display_name: Option<String>,
}

pub struct ResponseResolver {
    generator: RotatingGenerator,
}

impl ResponseResolver {
    pub fn new(generator: RotatingGenerator) -> Self {
        Self { generator }
    }

    pub async fn resolve(&self, input: &ResolveInput) -> Resolution {
        let plan = ResolutionPlan::for_classification(input.classification);
        log::debug!(
            "Resolving {:?} prompt through {} stages",
            input.classification,
            plan.stages.len()
        );

        for (index, stage) in plan.stages.iter().enumerate() {
            let request = build_request(stage, input);
            let result = match stage.prompt {
                PromptKind::Greeting | PromptKind::SimplifiedGreeting => {
                    self.generator.generate_with(&request, reject_banned_opener).await
                }
                _ => self.generator.generate(&request).await,
            };
            match result {
                Ok(text) => {
                    return Resolution { text, outcome: ResolutionOutcome::Generated };
                }
                Err(e) => {
                    log::warn!("Stage {} ({:?}) failed: {}", index + 1, stage.prompt, e);
                }
            }
        }

        log::error!(
            "All stages failed for {:?} prompt, using {:?} fallback",
            input.classification,
            plan.fallback
        );
        match plan.fallback {
            Fallback::StaticGreeting => Resolution {
                text: prompts::static_greeting(input.display_name.as_deref()),
                outcome: ResolutionOutcome::Canned,
            },
            Fallback::CannedIdentity(topic) => Resolution {
                text: prompts::identity_reply(topic).to_string(),
                outcome: ResolutionOutcome::Canned,
            },
            Fallback::ConnectionIssue => Resolution::connection_issue(),
        }
    }
}

fn reject_banned_opener(text: &str) -> Result<(), GenerationError> {
    if prompts::starts_with_banned_opener(text) {
        return Err(GenerationError::Rejected("greeting used a banned opener".to_string()));
    }
    Ok(())
}

fn build_request(stage: &Stage, input: &ResolveInput) -> GenerationRequest {
    let text = input.user_text.as_str();
    let name = input.display_name.as_deref();
    let prompt = match stage.prompt {
        PromptKind::Conversation => return conversation_request(input, stage.params),
        PromptKind::Greeting => prompts::greeting_prompt(text, name),
        PromptKind::SimplifiedGreeting => prompts::simplified_greeting_prompt(text, name),
        PromptKind::Identity(topic) => prompts::identity_prompt(topic, text),
        PromptKind::SimplifiedIdentity(topic) => prompts::simplified_identity_prompt(topic, text),
        PromptKind::Bucket => prompts::bucket_prompt(fallback_bucket(text), text),
        PromptKind::Minimal => prompts::minimal_prompt(text),
    };
    GenerationRequest::single_shot(prompt, stage.params)
}

fn conversation_request(input: &ResolveInput, params: GenerationParams) -> GenerationRequest {
    let mut turns: Vec<Turn> = input
        .context
        .iter()
        .filter(|m| !m.is_pending())
        .map(Turn::from)
        .collect();
    let ends_with_prompt = turns
        .last()
        .is_some_and(|t| t.role == TurnRole::User && t.text == input.user_text);
    if !ends_with_prompt {
        turns.push(Turn::user(input.user_text.clone()));
    }
    GenerationRequest {
        system_instruction: Some(prompts::SYSTEM_INSTRUCTION.to_string()),
        turns,
        params,
    }
}
