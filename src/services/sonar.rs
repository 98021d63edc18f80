//! Search-grounded language model lookups: trade names from legal names, and
//! owners from trade names.

use async_openai::config::OpenAIConfig;
use async_openai::error::{ApiError, OpenAIError};
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client as OpenAIClient;
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::gateway::ServiceGateway;
use super::http::classify_transport;
use super::OwnerDiscovery;
use crate::retry::{Outcome, ServiceFault};
use crate::TARGET_LLM_REQUEST;

pub const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_SONAR_MODEL: &str = "perplexity/sonar-pro";

const TRADE_NAME_OPERATION: &str = "sonar_trade_name";
const OWNER_OPERATION: &str = "sonar_owner";
const TRADE_NAME_MAX_TOKENS: u32 = 100;
const OWNER_MAX_TOKENS: u32 = 200;
const UNKNOWN_ANSWER: &str = "UNKNOWN";

lazy_static! {
    static ref EMPHASIS: Regex = Regex::new(r"\*+").unwrap();
    static ref CITATION: Regex = Regex::new(r"\[\d+\]").unwrap();
    static ref CITATION_LIST: Regex = Regex::new(r"\s*\[[\d,\s]+\]\s*").unwrap();
    static ref LEADING_BULLET: Regex = Regex::new(r"^[\d\.\-\*•]+\s*").unwrap();
    static ref PARENTHETICAL: Regex = Regex::new(r"\s*[\(\[].*?[\)\]]").unwrap();
}

/// Strip markdown emphasis and citation markers, then collapse whitespace.
pub fn clean_answer(text: &str) -> String {
    let text = EMPHASIS.replace_all(text, "");
    let text = CITATION.replace_all(&text, "");
    let text = CITATION_LIST.replace_all(&text, " ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_unknown(answer: &str) -> bool {
    answer.is_empty() || answer.eq_ignore_ascii_case(UNKNOWN_ANSWER)
}

pub fn parse_trade_name_answer(raw: &str) -> Option<String> {
    let answer = clean_answer(raw);
    (!is_unknown(&answer)).then_some(answer)
}

/// First non-empty line, without bullets or parentheticals, between 3 and 49
/// characters long.
pub fn parse_owner_answer(raw: &str) -> Option<String> {
    if is_unknown(raw.trim()) {
        return None;
    }

    let first_line = raw.lines().map(str::trim).find(|line| !line.is_empty())?;
    let cleaned = clean_answer(first_line);
    let cleaned = LEADING_BULLET.replace(&cleaned, "");
    let cleaned = PARENTHETICAL.replace_all(&cleaned, "");
    let name = cleaned.trim();

    let length = name.chars().count();
    if length <= 2 || length >= 50 || is_unknown(name) {
        return None;
    }
    Some(name.to_string())
}

fn trade_name_prompt(legal_name: &str, city: &str, state: &str) -> String {
    format!(
        "What is the actual restaurant name (DBA) for this business?\n\n\
         LLC: {}\n\
         Location: {}, {}\n\n\
         Reply with ONLY the restaurant name (1-5 words max). No explanations, no punctuation, \
         no quotes. Example: \"FIG\" or \"The Belmont\". If unknown, reply \"UNKNOWN\".",
        legal_name, city, state
    )
}

fn owner_prompt(trade_name: &str, city: &str, state: &str) -> String {
    format!(
        "Who is the primary owner of this restaurant?\n\n\
         Restaurant: {}\n\
         Location: {}, {}\n\n\
         Reply with ONLY the owner's full name (first and last). One name only - the main \
         owner/founder. No titles, no explanations. If unknown, reply \"UNKNOWN\".",
        trade_name, city, state
    )
}

fn classify_api_error(error: &ApiError) -> ServiceFault {
    let text = format!(
        "{} {}",
        error.r#type.as_deref().unwrap_or_default(),
        error.message
    )
    .to_lowercase();

    if text.contains("rate limit") || text.contains("rate_limit") {
        ServiceFault::RateLimited
    } else if text.contains("api key")
        || text.contains("api_key")
        || text.contains("auth")
        || text.contains("credential")
    {
        ServiceFault::Unauthorized
    } else if text.contains("overloaded") || text.contains("unavailable") || text.contains("server_error") {
        ServiceFault::Unavailable(error.message.clone())
    } else if error.r#type.is_none() && error.param.is_none() && error.code.is_none() {
        // Server errors arrive as a bare message holding the raw response body.
        ServiceFault::Unavailable(error.message.clone())
    } else {
        ServiceFault::Rejected {
            status: 400,
            message: error.message.clone(),
        }
    }
}

fn classify_openai(error: OpenAIError, limit: Duration) -> ServiceFault {
    match error {
        OpenAIError::Reqwest(e) => classify_transport(e, limit),
        OpenAIError::ApiError(api) => classify_api_error(&api),
        OpenAIError::JSONDeserialize(e) => ServiceFault::Malformed(e.to_string()),
        OpenAIError::InvalidArgument(message) => ServiceFault::Rejected {
            status: 400,
            message,
        },
        other => ServiceFault::Malformed(other.to_string()),
    }
}

/// Perplexity `sonar` models reached through an OpenAI-compatible gateway.
pub struct SonarClient {
    client: Option<OpenAIClient<OpenAIConfig>>,
    gateway: ServiceGateway,
    model: String,
}

impl SonarClient {
    pub fn new(gateway: ServiceGateway, api_key: Option<String>, model: &str) -> Self {
        Self::with_base_url(gateway, api_key, model, DEFAULT_OPENROUTER_BASE_URL)
    }

    pub fn with_base_url(
        gateway: ServiceGateway,
        api_key: Option<String>,
        model: &str,
        base_url: &str,
    ) -> Self {
        let client = api_key
            .filter(|key| !key.trim().is_empty())
            .map(|key| {
                let config = OpenAIConfig::new()
                    .with_api_key(key)
                    .with_api_base(base_url.trim_end_matches('/'));
                // A zero elapsed-time budget turns off the client's own retries.
                let no_retries = ExponentialBackoffBuilder::new()
                    .with_max_elapsed_time(Some(Duration::ZERO))
                    .build();
                OpenAIClient::with_config(config).with_backoff(no_retries)
            });

        SonarClient {
            client,
            gateway,
            model: model.to_string(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Trade name for a legal entity, from a web-grounded answer.
    pub async fn resolve_trade_name(&self, legal_name: &str, city: &str, state: &str) -> Outcome<String> {
        let prompt = trade_name_prompt(legal_name, city, state);
        let outcome = self
            .ask(
                TRADE_NAME_OPERATION,
                &[legal_name, city, state],
                prompt,
                TRADE_NAME_MAX_TOKENS,
                parse_trade_name_answer,
            )
            .await;

        if let Outcome::Found(name) = &outcome {
            info!(target: TARGET_LLM_REQUEST, "Resolved '{}' to trade name '{}'", legal_name, name);
        }
        outcome
    }

    pub async fn find_owner(&self, trade_name: &str, city: &str, state: &str) -> Outcome<String> {
        let prompt = owner_prompt(trade_name, city, state);
        let outcome = self
            .ask(
                OWNER_OPERATION,
                &[trade_name, city, state],
                prompt,
                OWNER_MAX_TOKENS,
                parse_owner_answer,
            )
            .await;

        if let Outcome::Found(owner) = &outcome {
            info!(target: TARGET_LLM_REQUEST, "Owner of '{}' is '{}'", trade_name, owner);
        }
        outcome
    }

    async fn ask(
        &self,
        operation: &str,
        args: &[&str],
        prompt: String,
        max_tokens: u32,
        parse: fn(&str) -> Option<String>,
    ) -> Outcome<String> {
        let Some(client) = self.client.as_ref() else {
            debug!(target: TARGET_LLM_REQUEST, "No OpenRouter API key, skipping {}", operation);
            return Outcome::Absent;
        };

        let request = match self.build_request(prompt, max_tokens) {
            Ok(request) => request,
            Err(err) => {
                warn!(target: TARGET_LLM_REQUEST, "Could not build {} request: {}", operation, err);
                return Outcome::Failed(classify_openai(err, Duration::ZERO));
            }
        };
        let limit = self.gateway.policy().call_timeout;

        self.gateway
            .call(operation, args, || {
                let client = client.clone();
                let request = request.clone();
                async move {
                    let response = client
                        .chat()
                        .create(request)
                        .await
                        .map_err(|e| classify_openai(e, limit))?;

                    let content = response
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|choice| choice.message.content)
                        .unwrap_or_default();
                    debug!(target: TARGET_LLM_REQUEST, "Raw answer: {:?}", content);
                    Ok::<_, ServiceFault>(parse(&content))
                }
            })
            .await
    }

    #[allow(deprecated)]
    fn build_request(&self, prompt: String, max_tokens: u32) -> Result<CreateChatCompletionRequest, OpenAIError> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()?
            .into()];

        CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .messages(messages)
            .max_tokens(max_tokens)
            .build()
    }
}

#[async_trait]
impl OwnerDiscovery for SonarClient {
    async fn find_owner(&self, trade_name: &str, city: &str, state: &str) -> Outcome<String> {
        SonarClient::find_owner(self, trade_name, city, state).await
    }
}
