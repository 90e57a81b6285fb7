//! ReAct Controller
//!
//! Implements the ReAct (Reason + Act) pattern: the model thinks, picks a
//! tool, observes its result, and repeats until it writes a final answer or
//! the iteration bound is hit.
//!
//! ```text
//!   prompt(scratchpad) ──► LLM ──► parse ──┬── Action ──► dispatch ──► scratchpad
//!        ▲                                 │                              │
//!        └─────────────────────────────────┼──────────────────────────────┘
//!                                          └── Finish ──► AgentOutput
//! ```
//!
//! Every generation stops at `"Observation:"`; observations always come from
//! the tool registry, never from the model.

use std::sync::Arc;

use async_trait::async_trait;

use crate::agent::{Agent, RunOptions, call_llm, run_guarded};
use crate::config::ReactConfig;
use crate::error::{AgentError, Result};
use crate::output::{AgentOutput, AgentStatus, AgentStep, AgentType, ScratchpadEntry};
use crate::parser::{OBSERVATION, OutputParser, ParseMode};
use crate::provider::{LlmProvider, Usage};
use crate::tool::{Tool, ToolRegistry};
use crate::trim::trim_to_tokens;

/// Sequential think/act/observe agent
pub struct ReactAgent {
    name: String,
    description: String,
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    config: ReactConfig,
}

impl ReactAgent {
    pub fn builder() -> ReactAgentBuilder {
        ReactAgentBuilder::new()
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn config(&self) -> &ReactConfig {
        &self.config
    }

    async fn execute(&self, instruction: &str, options: &RunOptions) -> Result<AgentOutput> {
        let max_iterations = options
            .max_iterations
            .filter(|max| *max > 0)
            .unwrap_or(self.config.max_iterations);
        let parser = OutputParser::new(ParseMode::React, self.config.strict_decode);
        let generation = self.config.generation.with_stop(&[OBSERVATION]);
        let tool_description = self.tools.describe();
        let tool_names = self.tools.names().join(", ");

        let mut steps: Vec<ScratchpadEntry> = Vec::new();
        let mut usage = Usage::default();
        let mut last_response = String::new();

        for iteration in 1..=max_iterations {
            let scratchpad = scratchpad(&steps);
            let prompt = self.config.prompt_template.populate(&[
                ("lang", self.config.output_lang.as_str()),
                ("tool_description", tool_description.as_str()),
                ("tool_names", tool_names.as_str()),
                ("instruction", instruction),
                ("agent_scratchpad", scratchpad.as_str()),
            ])?;

            let completion = call_llm(
                self.provider.as_ref(),
                &prompt,
                &generation,
                self.config.timeouts.llm_call,
            )
            .await?;
            usage.add(Usage::from(&completion));

            let step = parser.parse(&completion.content)?;
            last_response = completion.content;

            match step {
                AgentStep::Finish(finish) => {
                    let text = finish.output().unwrap_or_default().to_string();
                    tracing::debug!(iteration, "Final answer reached");
                    steps.push(ScratchpadEntry::new(AgentStep::Finish(finish), ""));
                    return Ok(Self::output(AgentStatus::Finished, text, usage, steps, max_iterations));
                }
                AgentStep::Action(action) => {
                    tracing::info!(iteration, tool = %action.tool, "Taking action");
                    let observation = self
                        .tools
                        .dispatch(&action.tool, &action.tool_input, self.config.timeouts.tool_call)
                        .await?;
                    usage.add(observation.usage);

                    let observed = trim_to_tokens(&observation.text, self.config.max_context_length, |text| {
                        self.provider.estimate_tokens(text)
                    });
                    let entry = ScratchpadEntry::new(AgentStep::Action(action), observed);
                    options.emit(
                        AgentOutput::thinking(AgentType::React)
                            .with_usage(usage)
                            .with_steps(vec![entry.clone()]),
                    );
                    steps.push(entry);
                }
            }
        }

        tracing::warn!(max_iterations, "Iteration bound reached without a final answer");
        Ok(Self::output(AgentStatus::Stopped, last_response, usage, steps, max_iterations))
    }

    fn output(
        status: AgentStatus,
        text: String,
        usage: Usage,
        steps: Vec<ScratchpadEntry>,
        max_iterations: usize,
    ) -> AgentOutput {
        AgentOutput {
            max_iterations: Some(max_iterations),
            ..AgentOutput::new(AgentType::React, status, text)
                .with_usage(usage)
                .with_steps(steps)
        }
    }
}

/// Transcript of the steps so far, in the shape the prompt expects
fn scratchpad(steps: &[ScratchpadEntry]) -> String {
    steps
        .iter()
        .map(|entry| format!("{}\n{OBSERVATION} {}\nThought:", entry.step.log(), entry.observation))
        .collect()
}

#[async_trait]
impl Agent for ReactAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn agent_type(&self) -> AgentType {
        AgentType::React
    }

    async fn run_with(&self, instruction: &str, options: RunOptions) -> AgentOutput {
        run_guarded(
            &self.name,
            AgentType::React,
            self.config.timeouts.run,
            options.cancel.as_ref(),
            self.execute(instruction, &options),
        )
        .await
    }
}

/// Builder for [`ReactAgent`]
pub struct ReactAgentBuilder {
    name: String,
    description: String,
    provider: Option<Arc<dyn LlmProvider>>,
    tools: ToolRegistry,
    config: ReactConfig,
}

impl Default for ReactAgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReactAgentBuilder {
    pub fn new() -> Self {
        Self {
            name: "react".into(),
            description: "Answers questions by reasoning step by step and calling tools.".into(),
            provider: None,
            tools: ToolRegistry::new(),
            config: ReactConfig::default(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn tool_arc(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.register_arc(tool);
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn config(mut self, config: ReactConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    pub fn strict_decode(mut self, strict: bool) -> Self {
        self.config.strict_decode = strict;
        self
    }

    pub fn build(self) -> Result<ReactAgent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;
        self.config.validate()?;

        Ok(ReactAgent {
            name: self.name,
            description: self.description,
            provider,
            tools: Arc::new(self.tools),
            config: self.config,
        })
    }
}
