// Model x credential rotation. Starts from the last pair that worked;
// models cycle before credentials.

use std::fmt;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::api::{GenerationError, GenerationProvider, GenerationRequest};

const KEY_PREFIX_CHARS: usize = 6;

/// An API key. `Debug` and `Display` only ever show a short prefix.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }

    /// At most half of the key is shown, so short keys never print in full.
    pub fn redacted(&self) -> String {
        let shown = KEY_PREFIX_CHARS.min(self.0.chars().count() / 2);
        if shown == 0 {
            return "***".to_string();
        }
        let prefix: String = self.0.chars().take(shown).collect();
        format!("{prefix}...")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.redacted()).finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// Indices into the model and credential lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttemptDescriptor {
    pub model: usize,
    pub credential: usize,
}

/// Last (model, credential) pair that produced a reply. Shared by every
/// request of a process; reset it between tests with [`RotationMemory::reset`].
#[derive(Debug, Default)]
pub struct RotationMemory {
    last_success: Mutex<AttemptDescriptor>,
}

impl RotationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_success(&self) -> AttemptDescriptor {
        *self.last_success.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record_success(&self, descriptor: AttemptDescriptor) {
        *self.last_success.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = descriptor;
    }

    pub fn reset(&self) {
        self.record_success(AttemptDescriptor::default());
    }
}

/// Every pair exactly once: models cycle fastest, starting at `start`.
pub fn attempt_order(start: AttemptDescriptor, models: usize, credentials: usize) -> Vec<AttemptDescriptor> {
    if models == 0 || credentials == 0 {
        return Vec::new();
    }
    let start_model = start.model % models;
    let start_credential = start.credential % credentials;
    (0..credentials)
        .flat_map(|c| {
            (0..models).map(move |m| AttemptDescriptor {
                model: (start_model + m) % models,
                credential: (start_credential + c) % credentials,
            })
        })
        .collect()
}

/// Outcome of one attempt, kept for diagnostics.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub model: String,
    pub credential: String,
    pub error: GenerationError,
}

#[derive(Debug, Error)]
pub enum CascadeError {
    #[error("no API credentials configured")]
    NoCredentials,

    #[error("no models configured")]
    NoModels,

    #[error("all {} attempts failed", .attempts.len())]
    Exhausted { attempts: Vec<AttemptRecord> },
}

/// Runs one request across the configured model/credential matrix.
pub struct RotatingGenerator {
    provider: Arc<dyn GenerationProvider>,
    models: Vec<String>,
    credentials: Vec<Credential>,
    memory: Arc<RotationMemory>,
}

impl RotatingGenerator {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        models: Vec<String>,
        credentials: Vec<Credential>,
        memory: Arc<RotationMemory>,
    ) -> Self {
        Self { provider, models, credentials, memory }
    }

    /// Tries pairs sequentially until one yields text.
    /// `accept` can reject a technically successful reply.
    pub async fn generate_with<F>(&self, request: &GenerationRequest, accept: F) -> Result<String, CascadeError>
    where
        F: Fn(&str) -> Result<(), GenerationError>,
    {
        if self.credentials.is_empty() {
            return Err(CascadeError::NoCredentials);
        }
        if self.models.is_empty() {
            return Err(CascadeError::NoModels);
        }

        let order = attempt_order(self.memory.last_success(), self.models.len(), self.credentials.len());
        let mut attempts = Vec::with_capacity(order.len());

        for descriptor in order {
            let model = &self.models[descriptor.model];
            let credential = &self.credentials[descriptor.credential];
            log::info!("Trying model {} with key {}", model, credential);

            let outcome = match self.provider.generate(model, credential.secret(), request).await {
                Ok(text) => accept(&text).map(|()| text),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(text) => {
                    log::info!("Model {} with key {} succeeded", model, credential);
                    self.memory.record_success(descriptor);
                    return Ok(text);
                }
                Err(error) => {
                    log::warn!("Model {} with key {} failed: {}", model, credential, error);
                    attempts.push(AttemptRecord {
                        model: model.clone(),
                        credential: credential.redacted(),
                        error,
                    });
                }
            }
        }

        Err(CascadeError::Exhausted { attempts })
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<String, CascadeError> {
        self.generate_with(request, |_| Ok(())).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    /// Provider stub: replays scripted outcomes, then repeats `default`.
    pub struct ScriptedProvider {
        script: Mutex<VecDeque<Result<String, GenerationError>>>,
        default: Result<String, GenerationError>,
        pub calls: Mutex<Vec<(String, String, GenerationRequest)>>,
    }

    impl ScriptedProvider {
        pub fn failing() -> Self {
            Self::with_default(Err(GenerationError::Transport("connection refused".to_string())))
        }

        pub fn replying(text: &str) -> Self {
            Self::with_default(Ok(text.to_string()))
        }

        pub fn with_default(default: Result<String, GenerationError>) -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                default,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn then(self, outcome: Result<String, GenerationError>) -> Self {
            self.script.lock().unwrap().push_back(outcome);
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn requests(&self) -> Vec<GenerationRequest> {
            self.calls.lock().unwrap().iter().map(|(_, _, r)| r.clone()).collect()
        }
    }

    #[async_trait]
    impl GenerationProvider for ScriptedProvider {
        async fn generate(
            &self,
            model: &str,
            api_key: &str,
            request: &GenerationRequest,
        ) -> Result<String, GenerationError> {
            self.calls
                .lock()
                .unwrap()
                .push((model.to_string(), api_key.to_string(), request.clone()));
            let scripted = self.script.lock().unwrap().pop_front();
            scripted.unwrap_or_else(|| self.default.clone())
        }
    }

    /// Succeeds only for one (model, key) pair.
    pub struct PairProvider {
        pub model: String,
        pub key: String,
        pub calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl GenerationProvider for PairProvider {
        async fn generate(
            &self,
            model: &str,
            api_key: &str,
            _request: &GenerationRequest,
        ) -> Result<String, GenerationError> {
            self.calls.lock().unwrap().push((model.to_string(), api_key.to_string()));
            if model == self.model && api_key == self.key {
                Ok(format!("reply from {model}"))
            } else {
                Err(GenerationError::Http { status: 403, body: "forbidden".to_string() })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::api::GenerationParams;

    fn request() -> GenerationRequest {
        GenerationRequest::single_shot("ping", GenerationParams::GENERIC)
    }

    fn models() -> Vec<String> {
        vec!["m0".to_string(), "m1".to_string(), "m2".to_string()]
    }

    fn keys() -> Vec<Credential> {
        vec![Credential::new("key-alpha-123456"), Credential::new("key-bravo-654321")]
    }

    #[test]
    fn order_cycles_models_then_credentials() {
        let order = attempt_order(AttemptDescriptor { model: 1, credential: 1 }, 3, 2);
        let pairs: Vec<(usize, usize)> = order.iter().map(|d| (d.model, d.credential)).collect();
        assert_eq!(pairs, vec![(1, 1), (2, 1), (0, 1), (1, 0), (2, 0), (0, 0)]);
    }

    #[test]
    fn order_is_empty_without_models_or_credentials() {
        assert!(attempt_order(AttemptDescriptor::default(), 0, 2).is_empty());
        assert!(attempt_order(AttemptDescriptor::default(), 2, 0).is_empty());
    }

    #[test]
    fn credential_never_prints_full_secret() {
        let credential = Credential::new("AIzaSyVerySecretValue");
        assert_eq!(credential.redacted(), "AIzaSy...");
        assert!(!format!("{credential:?}").contains("Secret"));
        assert_eq!(Credential::new("abcdef").redacted(), "abc...");
        assert_eq!(Credential::new("abc").redacted(), "a...");
        assert_eq!(Credential::new("k").redacted(), "***");
        assert_eq!(Credential::new("").redacted(), "***");
    }

    #[tokio::test]
    async fn remembers_working_pair_across_requests() {
        let provider = Arc::new(PairProvider {
            model: "m2".to_string(),
            key: "key-bravo-654321".to_string(),
            calls: Mutex::new(Vec::new()),
        });
        let memory = Arc::new(RotationMemory::new());
        let generator = RotatingGenerator::new(provider.clone(), models(), keys(), memory.clone());

        let text = generator.generate(&request()).await.unwrap();
        assert_eq!(text, "reply from m2");
        // m0..m2 with key 0, then m0..m2 with key 1
        assert_eq!(provider.calls.lock().unwrap().len(), 6);
        assert_eq!(memory.last_success(), AttemptDescriptor { model: 2, credential: 1 });

        provider.calls.lock().unwrap().clear();
        generator.generate(&request()).await.unwrap();
        assert_eq!(provider.calls.lock().unwrap().len(), 1);

        memory.reset();
        assert_eq!(memory.last_success(), AttemptDescriptor::default());
    }

    #[tokio::test]
    async fn remembered_pair_that_stops_working_moves_on() {
        let provider = Arc::new(PairProvider {
            model: "m0".to_string(),
            key: "key-bravo-654321".to_string(),
            calls: Mutex::new(Vec::new()),
        });
        let memory = Arc::new(RotationMemory::new());
        memory.record_success(AttemptDescriptor { model: 1, credential: 1 });
        let generator = RotatingGenerator::new(provider.clone(), models(), keys(), memory.clone());

        let text = generator.generate(&request()).await.unwrap();
        assert_eq!(text, "reply from m0");
        let calls: Vec<(String, String)> = provider.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                ("m1".to_string(), "key-bravo-654321".to_string()),
                ("m2".to_string(), "key-bravo-654321".to_string()),
                ("m0".to_string(), "key-bravo-654321".to_string()),
            ]
        );
        assert_eq!(memory.last_success(), AttemptDescriptor { model: 0, credential: 1 });
    }

    #[tokio::test]
    async fn exhausts_every_pair_exactly_once() {
        let provider = Arc::new(ScriptedProvider::failing());
        let generator =
            RotatingGenerator::new(provider.clone(), models(), keys(), Arc::new(RotationMemory::new()));

        match generator.generate(&request()).await {
            Err(CascadeError::Exhausted { attempts }) => {
                assert_eq!(attempts.len(), 6);
                assert!(attempts.iter().all(|a| a.credential.ends_with("...")));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(provider.call_count(), 6);
    }

    #[tokio::test]
    async fn missing_configuration_fails_fast() {
        let provider = Arc::new(ScriptedProvider::replying("ok"));
        let memory = Arc::new(RotationMemory::new());

        let no_keys = RotatingGenerator::new(provider.clone(), models(), Vec::new(), memory.clone());
        assert!(matches!(no_keys.generate(&request()).await, Err(CascadeError::NoCredentials)));

        let no_models = RotatingGenerator::new(provider.clone(), Vec::new(), keys(), memory);
        assert!(matches!(no_models.generate(&request()).await, Err(CascadeError::NoModels)));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn rejected_replies_move_to_next_pair() {
        let provider = Arc::new(ScriptedProvider::replying("good").then(Ok("bad".to_string())));
        let memory = Arc::new(RotationMemory::new());
        let generator = RotatingGenerator::new(provider.clone(), models(), keys(), memory.clone());

        let text = generator
            .generate_with(&request(), |text| {
                if text == "bad" {
                    Err(GenerationError::Rejected("rejected".to_string()))
                } else {
                    Ok(())
                }
            })
            .await
            .unwrap();
        assert_eq!(text, "good");
        assert_eq!(provider.call_count(), 2);
        assert_eq!(memory.last_success(), AttemptDescriptor { model: 1, credential: 0 });
    }
}
