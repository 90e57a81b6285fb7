//! Agent Configuration
//!
//! Plain structs with defaults. Hosts can deserialize them (every field is
//! optional) or read them from `REASONING_*` environment variables.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::prompt::{Examples, PromptTemplate};
use crate::provider::GenerationOptions;

/// Deadlines for blocking calls. `None` waits forever.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Each LLM call
    #[serde(with = "opt_secs")]
    pub llm_call: Option<Duration>,

    /// Each tool call
    #[serde(with = "opt_secs")]
    pub tool_call: Option<Duration>,

    /// The whole run
    #[serde(with = "opt_secs")]
    pub run: Option<Duration>,
}

impl Timeouts {
    pub fn from_env() -> Self {
        let secs = |key: &str| env_parse::<u64>(key).map(Duration::from_secs);
        Self {
            llm_call: secs("REASONING_LLM_TIMEOUT_SECS"),
            tool_call: secs("REASONING_TOOL_TIMEOUT_SECS"),
            run: secs("REASONING_RUN_TIMEOUT_SECS"),
        }
    }
}

/// ReAct agent configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactConfig {
    /// Prompt template; needs `{instruction}` and `{agent_scratchpad}`
    pub prompt_template: PromptTemplate,

    /// Maximum think/act iterations per run
    pub max_iterations: usize,

    /// Fail on output that is neither an action nor a final answer
    pub strict_decode: bool,

    /// Language the final answer should be written in
    pub output_lang: String,

    /// Token budget for each tool observation
    pub max_context_length: usize,

    /// Generation options; `"Observation:"` is always added as a stop sequence
    pub generation: GenerationOptions,

    pub timeouts: Timeouts,
}

impl Default for ReactConfig {
    fn default() -> Self {
        Self {
            prompt_template: PromptTemplate::new(crate::prompt::REACT_PROMPT),
            max_iterations: 10,
            strict_decode: false,
            output_lang: "English".into(),
            max_context_length: 3000,
            generation: GenerationOptions::default(),
            timeouts: Timeouts::default(),
        }
    }
}

impl ReactConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_iterations: env_parse("REASONING_MAX_ITERATIONS").unwrap_or(defaults.max_iterations),
            strict_decode: env_parse("REASONING_STRICT_DECODE").unwrap_or(defaults.strict_decode),
            output_lang: std::env::var("REASONING_OUTPUT_LANG").unwrap_or(defaults.output_lang),
            max_context_length: env_parse("REASONING_MAX_CONTEXT_LENGTH")
                .unwrap_or(defaults.max_context_length),
            timeouts: Timeouts::from_env(),
            ..defaults
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(AgentError::Config("max_iterations must be greater than 0".into()));
        }
        if self.max_context_length == 0 {
            return Err(AgentError::Config("max_context_length must be greater than 0".into()));
        }
        for required in ["instruction", "agent_scratchpad"] {
            if !self.prompt_template.has_placeholder(required) {
                return Err(AgentError::Config(format!(
                    "ReAct prompt template lacks `{{{required}}}`"
                )));
            }
        }
        Ok(())
    }
}

/// ReWOO agent configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RewooConfig {
    /// Custom planner prompt; defaults to the zero- or few-shot template
    pub planner_template: Option<PromptTemplate>,

    /// Custom solver prompt; defaults to the zero- or few-shot template
    pub solver_template: Option<PromptTemplate>,

    pub planner_examples: Option<Examples>,
    pub solver_examples: Option<Examples>,

    /// Language the final answer should be written in
    pub output_lang: String,

    /// Token budget for each resolved evidence
    pub max_context_length: usize,

    /// Evidences of one level run at most this many at a time
    pub max_concurrency: usize,

    pub planner_generation: GenerationOptions,
    pub solver_generation: GenerationOptions,

    pub timeouts: Timeouts,
}

impl Default for RewooConfig {
    fn default() -> Self {
        Self {
            planner_template: None,
            solver_template: None,
            planner_examples: None,
            solver_examples: None,
            output_lang: "English".into(),
            max_context_length: 3000,
            max_concurrency: default_concurrency(),
            planner_generation: GenerationOptions::default(),
            solver_generation: GenerationOptions::default(),
            timeouts: Timeouts::default(),
        }
    }
}

impl RewooConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            output_lang: std::env::var("REASONING_OUTPUT_LANG").unwrap_or(defaults.output_lang),
            max_context_length: env_parse("REASONING_MAX_CONTEXT_LENGTH")
                .unwrap_or(defaults.max_context_length),
            max_concurrency: env_parse("REASONING_MAX_CONCURRENCY").unwrap_or(defaults.max_concurrency),
            timeouts: Timeouts::from_env(),
            ..defaults
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(AgentError::Config("max_concurrency must be greater than 0".into()));
        }
        if self.max_context_length == 0 {
            return Err(AgentError::Config("max_context_length must be greater than 0".into()));
        }
        if let Some(template) = &self.planner_template {
            if !template.has_placeholder("task") {
                return Err(AgentError::Config("planner template lacks `{task}`".into()));
            }
        }
        if let Some(template) = &self.solver_template {
            if !template.has_placeholder("plan_evidence") {
                return Err(AgentError::Config("solver template lacks `{plan_evidence}`".into()));
            }
        }
        Ok(())
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get)
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

mod opt_secs {
    use std::time::Duration;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(Duration::try_from_secs_f64)
            .transpose()
            .map_err(D::Error::custom)
    }
}
