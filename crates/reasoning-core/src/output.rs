//! Reasoning Trace and Result Types
//!
//! Records produced while a controller runs: the parsed step (action or
//! finish), the scratchpad entry pairing it with its observation, and the
//! [`AgentOutput`] both controllers return.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::provider::Usage;
use crate::tool::ToolInput;

/// Key under which the final answer is stored in [`AgentFinish::return_values`]
pub const OUTPUT_KEY: &str = "output";

/// A tool invocation requested by the model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    /// Tool to invoke
    pub tool: String,

    /// Input to pass to the tool
    pub tool_input: ToolInput,

    /// Raw model text the action was parsed from
    pub log: String,
}

impl AgentAction {
    pub fn new(tool: impl Into<String>, tool_input: impl Into<ToolInput>, log: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            tool_input: tool_input.into(),
            log: log.into(),
        }
    }
}

/// Terminal step: the model produced its answer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentFinish {
    /// Return values, the answer lives under `"output"`
    pub return_values: Map<String, Value>,

    /// Raw model text the finish was parsed from
    pub log: String,
}

impl AgentFinish {
    /// Finish whose `output` return value is `output`
    pub fn with_output(output: impl Into<String>, log: impl Into<String>) -> Self {
        let mut return_values = Map::new();
        return_values.insert(OUTPUT_KEY.into(), Value::String(output.into()));
        Self {
            return_values,
            log: log.into(),
        }
    }

    /// The final answer text, if present
    pub fn output(&self) -> Option<&str> {
        self.return_values.get(OUTPUT_KEY).and_then(Value::as_str)
    }
}

/// One parsed step of the reasoning loop
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStep {
    Action(AgentAction),
    Finish(AgentFinish),
}

impl AgentStep {
    /// Raw model text behind this step
    pub fn log(&self) -> &str {
        match self {
            AgentStep::Action(action) => &action.log,
            AgentStep::Finish(finish) => &finish.log,
        }
    }

    pub fn is_finish(&self) -> bool {
        matches!(self, AgentStep::Finish(_))
    }
}

/// A step paired with what the engine observed after taking it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScratchpadEntry {
    pub step: AgentStep,
    pub observation: String,
}

impl ScratchpadEntry {
    pub fn new(step: AgentStep, observation: impl Into<String>) -> Self {
        Self {
            step,
            observation: observation.into(),
        }
    }
}

/// Status of an agent after (or during) a run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Intermediate progress, only seen on streams
    Thinking,
    Finished,
    /// Iteration bound reached without a final answer
    Stopped,
    Failed,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Thinking => write!(f, "thinking"),
            AgentStatus::Finished => write!(f, "finished"),
            AgentStatus::Stopped => write!(f, "stopped"),
            AgentStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Reasoning paradigm that produced an output
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    React,
    Rewoo,
}

/// Uniform result of a controller run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub text: String,
    pub agent_type: AgentType,
    pub status: AgentStatus,
    pub cost: f64,
    pub token_usage: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intermediate_steps: Option<Vec<ScratchpadEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<usize>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl AgentOutput {
    pub fn new(agent_type: AgentType, status: AgentStatus, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            agent_type,
            status,
            cost: 0.0,
            token_usage: 0,
            error: None,
            intermediate_steps: None,
            max_iterations: None,
            metadata: HashMap::new(),
        }
    }

    /// Failed run: empty text, error populated, nothing else
    pub fn failed(agent_type: AgentType, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(agent_type, AgentStatus::Failed, "")
        }
    }

    /// Progress snapshot emitted on streams
    pub fn thinking(agent_type: AgentType) -> Self {
        Self::new(agent_type, AgentStatus::Thinking, "")
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.cost = usage.cost;
        self.token_usage = usage.tokens;
        self
    }

    pub fn with_steps(mut self, steps: Vec<ScratchpadEntry>) -> Self {
        self.intermediate_steps = Some(steps);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Cost and tokens carried by this output
    pub fn usage(&self) -> Usage {
        Usage::new(self.cost, self.token_usage)
    }

    pub fn is_failed(&self) -> bool {
        self.status == AgentStatus::Failed
    }
}
