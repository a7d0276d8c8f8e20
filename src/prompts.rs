//! Versioned prompt templates and response-format declarations
//!
//! Each provider gets its own [`TemplatePromptManager`]. All of them share the
//! default summary/keyword instructions unless a provider needs stronger
//! wording to produce JSON.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SummaryError};

/// Prompt template version tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PromptVersion {
    #[serde(rename = "v1")]
    V1,
    #[default]
    #[serde(rename = "latest")]
    Latest,
}

impl PromptVersion {
    /// Version that `Latest` points at
    pub const CURRENT: PromptVersion = PromptVersion::V1;

    /// Resolve `Latest` to a concrete version
    pub fn resolve(self) -> PromptVersion {
        match self {
            PromptVersion::Latest => Self::CURRENT,
            concrete => concrete,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptVersion::V1 => "v1",
            PromptVersion::Latest => "latest",
        }
    }
}

impl fmt::Display for PromptVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptVersion {
    type Err = SummaryError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "v1" | "1" | "1.0" => Ok(PromptVersion::V1),
            "latest" => Ok(PromptVersion::Latest),
            other => Err(SummaryError::ConfigError(format!(
                "Unsupported prompt version '{}'",
                other
            ))),
        }
    }
}

/// Structured output mode requested from the provider
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    /// Plain JSON-object mode
    JsonObject,
    /// Full JSON schema with strict adherence where supported
    JsonSchema {
        name: String,
        schema: Value,
        strict: bool,
    },
}

impl ResponseFormat {
    /// `response_format` payload for chat-completion style APIs
    pub fn to_chat_completion_value(&self) -> Value {
        match self {
            ResponseFormat::JsonObject => json!({ "type": "json_object" }),
            ResponseFormat::JsonSchema {
                name,
                schema,
                strict,
            } => json!({
                "type": "json_schema",
                "json_schema": {
                    "name": name,
                    "schema": schema,
                    "strict": strict,
                }
            }),
        }
    }

    pub fn schema(&self) -> Option<&Value> {
        match self {
            ResponseFormat::JsonObject => None,
            ResponseFormat::JsonSchema { schema, .. } => Some(schema),
        }
    }
}

/// Supplies provider-ready prompt text and the expected response format
pub trait PromptManager: Send + Sync {
    fn system_prompt(&self, version: Option<PromptVersion>) -> Result<String>;

    fn user_prompt(&self, content: &str, version: Option<PromptVersion>) -> Result<String>;

    fn response_format(&self, version: Option<PromptVersion>) -> Result<ResponseFormat>;
}

/// Schema of the `{summary, keywords}` object every backend expects back
pub static SUMMARY_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "summary": {
                "type": "string",
                "description": "One concise sentence summarizing the email"
            },
            "keywords": {
                "type": "array",
                "items": { "type": "string" },
                "description": "3 to 5 keywords describing the email"
            }
        },
        "required": ["summary", "keywords"],
        "additionalProperties": false
    })
});

const DEFAULT_SYSTEM_PROMPT: &str = "You are an assistant that summarizes emails. \
For each email, write one concise sentence capturing its main point and extract \
3-5 keywords that describe its topic. Respond with a JSON object with the fields \
\"summary\" (string) and \"keywords\" (array of strings).";

const DEFAULT_USER_PROMPT: &str = "Summarize the following email:\n\n{content}";

const STRICT_JSON_SYSTEM_PROMPT: &str = "You are an assistant that summarizes emails. \
For each email, write one concise sentence capturing its main point and extract \
3-5 keywords that describe its topic.\n\n\
Respond ONLY with a valid JSON object and nothing else: no markdown, no code \
fences, no commentary. Use exactly this shape:\n\
{\"summary\": \"<one sentence>\", \"keywords\": [\"<keyword>\", \"<keyword>\", \"<keyword>\"]}";

const STRICT_JSON_USER_PROMPT: &str = "Summarize the following email. \
Return only the JSON object.\n\n{content}";

/// One versioned template set
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub version: PromptVersion,
    pub system: String,
    /// User prompt with a `{content}` placeholder
    pub user: String,
    pub response_format: ResponseFormat,
}

impl PromptTemplate {
    fn render_user(&self, content: &str) -> String {
        self.user.replace("{content}", content)
    }
}

/// Prompt manager backed by a fixed list of versioned templates
#[derive(Debug, Clone)]
pub struct TemplatePromptManager {
    provider: &'static str,
    templates: Vec<PromptTemplate>,
}

impl TemplatePromptManager {
    pub fn new(provider: &'static str, templates: Vec<PromptTemplate>) -> Self {
        Self {
            provider,
            templates,
        }
    }

    /// OpenAI supports strict JSON schemas
    pub fn openai() -> Self {
        Self::new(
            "openai",
            vec![PromptTemplate {
                version: PromptVersion::V1,
                system: DEFAULT_SYSTEM_PROMPT.to_string(),
                user: DEFAULT_USER_PROMPT.to_string(),
                response_format: ResponseFormat::JsonSchema {
                    name: "email_summary".to_string(),
                    schema: SUMMARY_SCHEMA.clone(),
                    strict: true,
                },
            }],
        )
    }

    /// OpenRouter routes across models, so only JSON-object mode is portable
    pub fn openrouter() -> Self {
        Self::new(
            "openrouter",
            vec![PromptTemplate {
                version: PromptVersion::V1,
                system: DEFAULT_SYSTEM_PROMPT.to_string(),
                user: DEFAULT_USER_PROMPT.to_string(),
                response_format: ResponseFormat::JsonObject,
            }],
        )
    }

    /// Gemini needs the explicit JSON-only instruction
    pub fn gemini() -> Self {
        Self::new(
            "gemini",
            vec![PromptTemplate {
                version: PromptVersion::V1,
                system: STRICT_JSON_SYSTEM_PROMPT.to_string(),
                user: STRICT_JSON_USER_PROMPT.to_string(),
                response_format: ResponseFormat::JsonSchema {
                    name: "email_summary".to_string(),
                    schema: SUMMARY_SCHEMA.clone(),
                    strict: false,
                },
            }],
        )
    }

    pub fn provider(&self) -> &str {
        self.provider
    }

    fn template(&self, version: Option<PromptVersion>) -> Result<&PromptTemplate> {
        let resolved = version.unwrap_or_default().resolve();
        self.templates
            .iter()
            .find(|t| t.version == resolved)
            .ok_or_else(|| {
                SummaryError::ConfigError(format!(
                    "No {} prompt template for version '{}'",
                    self.provider, resolved
                ))
            })
    }
}

impl PromptManager for TemplatePromptManager {
    fn system_prompt(&self, version: Option<PromptVersion>) -> Result<String> {
        Ok(self.template(version)?.system.clone())
    }

    fn user_prompt(&self, content: &str, version: Option<PromptVersion>) -> Result<String> {
        Ok(self.template(version)?.render_user(content))
    }

    fn response_format(&self, version: Option<PromptVersion>) -> Result<ResponseFormat> {
        Ok(self.template(version)?.response_format.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_resolves_to_v1() {
        assert_eq!(PromptVersion::Latest.resolve(), PromptVersion::V1);
        assert_eq!(PromptVersion::V1.resolve(), PromptVersion::V1);
    }

    #[test]
    fn test_unknown_version_string_is_config_error() {
        let err = "v7".parse::<PromptVersion>().unwrap_err();
        assert!(matches!(err, SummaryError::ConfigError(_)));
        assert_eq!("LATEST".parse::<PromptVersion>().unwrap(), PromptVersion::Latest);
    }

    #[test]
    fn test_missing_template_fails_instead_of_falling_back() {
        let manager = TemplatePromptManager::new("empty", vec![]);
        let err = manager.system_prompt(None).unwrap_err();
        assert!(err.to_string().contains("No empty prompt template"));
    }

    #[test]
    fn test_user_prompt_embeds_content() {
        let manager = TemplatePromptManager::openai();
        let prompt = manager
            .user_prompt("From: a@example.com", Some(PromptVersion::V1))
            .unwrap();
        assert!(prompt.ends_with("From: a@example.com"));
        assert!(!prompt.contains("{content}"));
    }

    #[test]
    fn test_gemini_prompt_demands_json_only() {
        let gemini = TemplatePromptManager::gemini();
        let openai = TemplatePromptManager::openai();
        let gemini_system = gemini.system_prompt(None).unwrap();
        assert!(gemini_system.contains("ONLY with a valid JSON object"));
        assert_ne!(gemini_system, openai.system_prompt(None).unwrap());
    }

    #[test]
    fn test_response_formats_per_provider() {
        let openai = TemplatePromptManager::openai().response_format(None).unwrap();
        let value = openai.to_chat_completion_value();
        assert_eq!(value["type"], "json_schema");
        assert_eq!(value["json_schema"]["strict"], true);
        assert_eq!(
            value["json_schema"]["schema"]["required"],
            json!(["summary", "keywords"])
        );

        let openrouter = TemplatePromptManager::openrouter()
            .response_format(None)
            .unwrap();
        assert_eq!(openrouter, ResponseFormat::JsonObject);
        assert!(openrouter.schema().is_none());
        assert_eq!(openrouter.to_chat_completion_value(), json!({"type": "json_object"}));
    }
}
