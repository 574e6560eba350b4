use crate::error::SearchError;
use crate::models::{
    CheckType, ClassifierScheme, ComplianceStanding, ComplianceVerdict, RegulationObject,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

const SEGMENT_SEPARATOR: &str = "\n===============Segment===============\n";

/// Collaborator that turns a use case plus retrieved regulation segments
/// into a structured verdict. The retrieval core only guarantees the content
/// and ordering of the segments it hands over.
#[async_trait]
pub trait ComplianceChecker {
    async fn check_use_case(
        &self,
        use_case: &str,
        segments: &[String],
    ) -> Result<ComplianceVerdict, SearchError>;
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub scheme: ClassifierScheme,
}

impl ClassifierConfig {
    /// Reads endpoint, key, and model from `COMPLIANCE_LLM_*` environment
    /// variables. Returns `None` when no endpoint is configured; callers
    /// decide what to do about a missing classifier.
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("COMPLIANCE_LLM_ENDPOINT").ok()?;
        let endpoint = endpoint.trim().to_string();
        if endpoint.is_empty() {
            return None;
        }

        let api_key = std::env::var("COMPLIANCE_LLM_API_KEY").ok().and_then(|value| {
            let key = value.trim().to_string();
            if key.is_empty() {
                None
            } else {
                Some(key)
            }
        });

        let model = std::env::var("COMPLIANCE_LLM_MODEL")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "gpt-4o-mini".to_string());

        Some(Self {
            endpoint,
            api_key,
            model,
            temperature: 0.05,
            scheme: ClassifierScheme::TypedCheck,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    response_format: serde_json::Value,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct TypedPayload {
    object: Option<RegulationObject>,
    #[serde(rename = "type")]
    check_type: CheckType,
    comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct VerdictPayload {
    object: Option<RegulationObject>,
    verdict: ComplianceStanding,
    comment: Option<String>,
}

/// Parses the model's JSON reply against the configured scheme. Each scheme
/// has a fixed field set; anything extra or missing is a backend error, not
/// a silently reshaped verdict.
fn parse_verdict(scheme: ClassifierScheme, content: &str) -> Result<ComplianceVerdict, SearchError> {
    let invalid = |error: serde_json::Error| SearchError::BackendResponse {
        backend: "classifier".to_string(),
        details: format!("verdict does not match the {scheme:?} scheme: {error}"),
    };

    match scheme {
        ClassifierScheme::TypedCheck => {
            let payload: TypedPayload = serde_json::from_str(content).map_err(invalid)?;
            Ok(ComplianceVerdict::TypedCheck {
                object: payload.object,
                check_type: payload.check_type,
                comment: payload.comment,
            })
        }
        ClassifierScheme::VerdictCheck => {
            let payload: VerdictPayload = serde_json::from_str(content).map_err(invalid)?;
            Ok(ComplianceVerdict::VerdictCheck {
                object: payload.object,
                verdict: payload.verdict,
                comment: payload.comment,
            })
        }
    }
}

fn typed_check_instructions() -> &'static str {
    "Types of compliance check:\n\
     Type 0 -- The developed system does not belong to the certified objects. \
     No check is required.\n\
     Type 1 -- The use case mentions certified objects and the regulations are met.\n\
     Type 2 -- The use case mentions certified objects, but omits CRITICAL \
     restrictions the regulations impose. The case must be supplemented with \
     those restrictions. Only choose this when the missing restrictions are \
     critical and relevant to the specific use case.\n\
     Type 3 -- The use case mentions certified objects and its requirements \
     CONTRADICT the regulations. Corrections are needed.\n\
     Reply with a JSON object: {\"object\": one of \"Braking\", \"AVAS\", \
     \"Wipe and wash\", \"HVAC\", \"Brake assist\" or null, \
     \"type\": \"0\"|\"1\"|\"2\"|\"3\", \
     \"comment\": a short justification when type is \"2\" or \"3\", else null}."
}

fn verdict_check_instructions() -> &'static str {
    "Decide whether the use case complies with the retrieved regulation \
     segments.\n\
     Reply with a JSON object: {\"object\": one of \"Braking\", \"AVAS\", \
     \"Wipe and wash\", \"HVAC\", \"Brake assist\" or null, \
     \"verdict\": \"compliant\"|\"non_compliant\", \
     \"comment\": a short justification for a non-compliant verdict, else null}."
}

fn build_prompt(scheme: ClassifierScheme, use_case: &str, segments: &[String]) -> String {
    let instructions = match scheme {
        ClassifierScheme::TypedCheck => typed_check_instructions(),
        ClassifierScheme::VerdictCheck => verdict_check_instructions(),
    };

    format!(
        "You are a certification systems expert. Analyze the following use case \
         against the retrieved regulation segments and determine whether it \
         complies with the certification requirements. Base your answer only on \
         the provided segments.\n\n\
         ## {instructions}\n\n\
         ## Use case: {use_case}\n\n\
         ## Regulation segments: {segments}\n",
        instructions = instructions,
        use_case = use_case,
        segments = segments.join(SEGMENT_SEPARATOR),
    )
}

/// Classifier backed by an OpenAI-compatible chat-completions endpoint.
pub struct ChatCompletionClassifier {
    config: ClassifierConfig,
    client: Client,
}

impl ChatCompletionClassifier {
    pub fn new(config: ClassifierConfig) -> Result<Self, SearchError> {
        Url::parse(&config.endpoint)?;
        Ok(Self {
            config,
            client: Client::new(),
        })
    }

    pub fn scheme(&self) -> ClassifierScheme {
        self.config.scheme
    }
}

#[async_trait]
impl ComplianceChecker for ChatCompletionClassifier {
    async fn check_use_case(
        &self,
        use_case: &str,
        segments: &[String],
    ) -> Result<ComplianceVerdict, SearchError> {
        let prompt = build_prompt(self.config.scheme, use_case, segments);
        let payload = ChatRequest {
            model: &self.config.model,
            temperature: self.config.temperature,
            response_format: serde_json::json!({ "type": "json_object" }),
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
        };

        let mut request = self.client.post(&self.config.endpoint).json(&payload);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "classifier".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| SearchError::BackendResponse {
                backend: "classifier".to_string(),
                details: "response carried no choices".to_string(),
            })?;

        parse_verdict(self.config.scheme, content)
    }
}
