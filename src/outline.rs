use crate::cache::Cache;
use crate::completion::{strip_code_blocks, CompletionClient, CompletionRequest, Message};
use crate::sanitize::sanitize_text_field;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

pub const SUGGESTION_TTL: Duration = Duration::from_secs(12 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineSection {
    pub heading: String,
    pub subheadings: Vec<String>,
}

/// H2 headings with their H3 subheadings, in the order the model wrote them.
/// Serialized as a JSON object keyed by heading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Outline {
    sections: Vec<OutlineSection>,
}

impl Outline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn sections(&self) -> &[OutlineSection] {
        &self.sections
    }

    pub fn headings(&self) -> Vec<&str> {
        self.sections.iter().map(|section| section.heading.as_str()).collect()
    }

    pub fn get(&self, heading: &str) -> Option<&[String]> {
        self.sections
            .iter()
            .find(|section| section.heading == heading)
            .map(|section| section.subheadings.as_slice())
    }
}

impl TryFrom<Map<String, Value>> for Outline {
    type Error = String;

    fn try_from(object: Map<String, Value>) -> Result<Self, Self::Error> {
        let sections = object
            .into_iter()
            .map(|(heading, value)| {
                let subheadings = serde_json::from_value::<Vec<String>>(value)
                    .map_err(|error| format!("subheadings of {:?}: {}", heading, error))?;
                Ok(OutlineSection { heading, subheadings })
            })
            .collect::<Result<Vec<_>, String>>()?;
        Ok(Self { sections })
    }
}

impl From<Outline> for Map<String, Value> {
    fn from(outline: Outline) -> Self {
        outline
            .sections
            .into_iter()
            .map(|section| {
                let subheadings = section.subheadings.into_iter().map(Value::String).collect();
                (section.heading, Value::Array(subheadings))
            })
            .collect()
    }
}

/// Keyword suggestions and article outlines from a completion API, cached
/// per input.
pub struct KeywordOutlineGenerator {
    client: Arc<dyn CompletionClient>,
    cache: Cache,
    model: String,
}

impl KeywordOutlineGenerator {
    pub fn new(client: Arc<dyn CompletionClient>, cache: Cache, model: impl Into<String>) -> Self {
        Self {
            client,
            cache,
            model: model.into(),
        }
    }

    pub async fn suggest_keywords(&self, seed: &str) -> Vec<String> {
        let seed = sanitize_text_field(seed);
        if seed.is_empty() {
            return Vec::new();
        }

        let cache_key = format!("suggest_keywords_{}", digest(&seed));
        if let Some(cached) = self.cache.get_as::<Vec<String>>(&cache_key) {
            return cached;
        }

        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system("You are an expert SEO assistant."),
                Message::user(format!(
                    "Generate a list of 10 relevant long-tail keywords based on the seed keyword: \"{}\". Return the result as a JSON array of strings.",
                    seed
                )),
            ],
            max_tokens: 150,
            temperature: 0.7,
        };

        let content = match self.client.complete(&request).await {
            Ok(content) => content,
            Err(error) => {
                tracing::error!(error = %error, "keyword suggestion request failed");
                return Vec::new();
            }
        };

        let keywords = match serde_json::from_str::<Vec<String>>(strip_code_blocks(&content)) {
            Ok(keywords) => keywords
                .iter()
                .map(|keyword| sanitize_text_field(keyword))
                .collect(),
            Err(error) => {
                tracing::warn!(error = %error, response = %content, "keyword suggestions were not a JSON array");
                Vec::new()
            }
        };

        if let Err(error) = self.cache.set_as(&cache_key, &keywords, SUGGESTION_TTL) {
            tracing::warn!(error = %error, "failed to cache keyword suggestions");
        }
        keywords
    }

    pub async fn generate_outline(&self, keywords: &[String]) -> Outline {
        let keywords: Vec<String> = keywords
            .iter()
            .map(|keyword| sanitize_text_field(keyword))
            .filter(|keyword| !keyword.is_empty())
            .collect();
        if keywords.is_empty() {
            return Outline::new();
        }

        let serialized = match serde_json::to_string(&keywords) {
            Ok(serialized) => serialized,
            Err(error) => {
                tracing::error!(error = %error, "failed to serialize outline keywords");
                return Outline::new();
            }
        };
        let cache_key = format!("generate_outline_{}", digest(&serialized));
        if let Some(cached) = self.cache.get_as::<Outline>(&cache_key) {
            return cached;
        }

        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system("You are an expert content strategist."),
                Message::user(format!(
                    "Create a detailed article outline for the following keywords: {}. Structure the outline with H2 headings as keys and an array of H3 subheadings as values. Return as a JSON object.",
                    serialized
                )),
            ],
            max_tokens: 500,
            temperature: 0.7,
        };

        let content = match self.client.complete(&request).await {
            Ok(content) => content,
            Err(error) => {
                tracing::error!(error = %error, "outline request failed");
                return Outline::new();
            }
        };

        let outline = match serde_json::from_str::<Outline>(strip_code_blocks(&content)) {
            Ok(outline) => outline,
            Err(error) => {
                tracing::warn!(error = %error, response = %content, "outline was not a JSON object of heading lists");
                Outline::new()
            }
        };

        if let Err(error) = self.cache.set_as(&cache_key, &outline, SUGGESTION_TTL) {
            tracing::warn!(error = %error, "failed to cache outline");
        }
        outline
    }
}

fn digest(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::KeywordOutlineGenerator;
    use crate::cache::Cache;
    use crate::completion::{CompletionClient, CompletionRequest};
    use crate::errors::{AppError, AppResult};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct ScriptedClient {
        reply: Result<String, String>,
        calls: AtomicUsize,
        last_prompt: Mutex<String>,
    }

    impl ScriptedClient {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(String::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err("upstream 500".to_string()),
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(String::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, request: &CompletionRequest) -> AppResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().expect("prompt") = request.messages[1].content.clone();
            self.reply.clone().map_err(AppError::Http)
        }
    }

    fn generator(client: Arc<ScriptedClient>) -> KeywordOutlineGenerator {
        KeywordOutlineGenerator::new(client, Cache::new(Arc::new(MemoryStore::new())), "gpt-3.5-turbo")
    }

    #[tokio::test]
    async fn suggestions_are_parsed_sanitized_and_cached() {
        let client = ScriptedClient::replying("```json\n[\"best <b>seo</b> tools\", \"seo  audit\"]\n```");
        let service = generator(client.clone());

        let first = service.suggest_keywords("  seo ").await;
        assert_eq!(first, vec!["best seo tools", "seo audit"]);
        assert!(client.last_prompt.lock().expect("prompt").contains("\"seo\""));

        let second = service.suggest_keywords("seo").await;
        assert_eq!(second, first);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn blank_seed_skips_the_api() {
        let client = ScriptedClient::replying("[]");
        let service = generator(client.clone());
        assert!(service.suggest_keywords("  <i></i> ").await.is_empty());
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unparseable_reply_is_cached_as_empty() {
        let client = ScriptedClient::replying("Sure! Here are some keywords: seo, ppc");
        let service = generator(client.clone());
        assert!(service.suggest_keywords("seo").await.is_empty());
        assert!(service.suggest_keywords("seo").await.is_empty());
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn client_failure_is_not_cached() {
        let client = ScriptedClient::failing();
        let service = generator(client.clone());
        assert!(service.suggest_keywords("seo").await.is_empty());
        assert!(service.generate_outline(&["seo".to_string()]).await.is_empty());
        assert!(service.suggest_keywords("seo").await.is_empty());
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn outline_maps_headings_to_subheadings() {
        let client = ScriptedClient::replying(r#"{"What is SEO": ["Definition", "History"], "Tools": []}"#);
        let service = generator(client.clone());

        let outline = service
            .generate_outline(&["seo".to_string(), " ".to_string(), "ppc".to_string()])
            .await;
        assert_eq!(outline.len(), 2);
        assert_eq!(
            outline.get("What is SEO").expect("heading"),
            ["Definition".to_string(), "History".to_string()]
        );
        assert!(client.last_prompt.lock().expect("prompt").contains(r#"["seo","ppc"]"#));

        service.generate_outline(&["seo".to_string(), "ppc".to_string()]).await;
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert!(service.generate_outline(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn outline_keeps_heading_order_through_the_cache() {
        let client = ScriptedClient::replying(
            r#"{"Introduction": ["Why it matters"], "Benefits": ["Speed", "Cost"], "Conclusion": []}"#,
        );
        let service = generator(client.clone());
        let keywords = vec!["seo".to_string()];

        let fresh = service.generate_outline(&keywords).await;
        assert_eq!(fresh.headings(), vec!["Introduction", "Benefits", "Conclusion"]);

        let cached = service.generate_outline(&keywords).await;
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cached, fresh);
    }

    #[tokio::test]
    async fn outline_with_non_list_subheadings_is_empty() {
        let client = ScriptedClient::replying(r#"{"Intro": "just text"}"#);
        let service = generator(client);
        assert!(service.generate_outline(&["seo".to_string()]).await.is_empty());
    }
}
