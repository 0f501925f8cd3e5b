//! Environment configuration, read once at startup

use crate::tools::{ToolConcurrency, ToolPolicy};
use thiserror::Error;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_DENIAL: &str = "Sorry, I can't help with that request.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("{var} must be set: {reason}")]
    Missing {
        var: &'static str,
        reason: &'static str,
    },
}

/// Which classifier guards generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationMode {
    OpenAi,
    /// Operator opt-out; every input clears
    Disabled,
}

/// Tool backends; a tool is offered only when its endpoint is set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolEndpoints {
    pub web_search: Option<String>,
    pub vector_search: Option<String>,
    pub image: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub port: u16,
    /// `:memory:` keeps the session in memory only
    pub db_path: String,
    pub system_prompt: Option<String>,
    pub denial_message: String,
    pub moderation: ModerationMode,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub model: String,
    pub policy: ToolPolicy,
    pub tools: ToolEndpoints,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let port = match get("PARLEY_PORT") {
            Some(value) => value.trim().parse().map_err(|e| ConfigError::Invalid {
                var: "PARLEY_PORT",
                reason: format!("{e}"),
                value,
            })?,
            None => DEFAULT_PORT,
        };

        let max_steps = match get("PARLEY_MAX_STEPS") {
            Some(value) => match value.trim().parse::<u32>() {
                Ok(n) if n >= 1 => n,
                Ok(_) => {
                    return Err(ConfigError::Invalid {
                        var: "PARLEY_MAX_STEPS",
                        value,
                        reason: "must be at least 1".to_string(),
                    })
                }
                Err(e) => {
                    return Err(ConfigError::Invalid {
                        var: "PARLEY_MAX_STEPS",
                        reason: e.to_string(),
                        value,
                    })
                }
            },
            None => ToolPolicy::default().max_steps,
        };

        let concurrency = match get("PARLEY_TOOL_CONCURRENCY") {
            Some(value) => {
                value
                    .parse::<ToolConcurrency>()
                    .map_err(|reason| ConfigError::Invalid {
                        var: "PARLEY_TOOL_CONCURRENCY",
                        value,
                        reason,
                    })?
            }
            None => ToolConcurrency::default(),
        };

        let moderation = match get("PARLEY_MODERATION").as_deref().map(str::trim) {
            None | Some("openai" | "on") => ModerationMode::OpenAi,
            Some("off" | "disabled") => ModerationMode::Disabled,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "PARLEY_MODERATION",
                    value: other.to_string(),
                    reason: "expected openai or off".to_string(),
                })
            }
        };

        let openai_api_key = get("OPENAI_API_KEY");
        if moderation == ModerationMode::OpenAi && openai_api_key.is_none() {
            return Err(ConfigError::Missing {
                var: "OPENAI_API_KEY",
                reason: "moderation is enabled (set PARLEY_MODERATION=off to opt out)",
            });
        }

        let db_path = get("PARLEY_DB_PATH").unwrap_or_else(|| {
            let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
            format!("{home}/.parley/parley.db")
        });

        Ok(Self {
            port,
            db_path,
            system_prompt: get("PARLEY_SYSTEM_PROMPT"),
            denial_message: get("PARLEY_DENIAL_MESSAGE")
                .unwrap_or_else(|| DEFAULT_DENIAL.to_string()),
            moderation,
            openai_api_key,
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: get("PARLEY_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            policy: ToolPolicy {
                max_steps,
                concurrency,
            },
            tools: ToolEndpoints {
                web_search: get("PARLEY_WEB_SEARCH_URL"),
                vector_search: get("PARLEY_VECTOR_SEARCH_URL"),
                image: get("PARLEY_IMAGE_URL"),
                api_key: get("PARLEY_TOOL_API_KEY"),
            },
        })
    }
}
