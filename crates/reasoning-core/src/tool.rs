//! Tool System
//!
//! Tools are black-box capabilities resolved by name and invoked with a single
//! input. The registry keeps registration order (it drives the tool
//! description block in every prompt) and turns tool failures into
//! observations according to each tool's [`ToolErrorPolicy`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::agent::Agent;
use crate::error::{AgentError, Result, ToolException};
use crate::message::Message;
use crate::output::AgentOutput;
use crate::provider::{Completion, GenerationOptions, LlmProvider, Usage};

/// Observation recorded when a plan names a tool that is not registered
pub const NO_EVIDENCE: &str = "No evidence found.";

/// Input handed to a tool
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolInput {
    Text(String),
    Structured(Map<String, Value>),
}

impl ToolInput {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ToolInput::Text(text) => Some(text),
            ToolInput::Structured(_) => None,
        }
    }
}

impl fmt::Display for ToolInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolInput::Text(text) => f.write_str(text),
            ToolInput::Structured(map) => write!(f, "{}", Value::Object(map.clone())),
        }
    }
}

impl From<String> for ToolInput {
    fn from(text: String) -> Self {
        ToolInput::Text(text)
    }
}

impl From<&str> for ToolInput {
    fn from(text: &str) -> Self {
        ToolInput::Text(text.to_string())
    }
}

impl From<Map<String, Value>> for ToolInput {
    fn from(map: Map<String, Value>) -> Self {
        ToolInput::Structured(map)
    }
}

/// Value returned by a tool
#[derive(Clone, Debug)]
pub enum ToolOutput {
    Text(String),
    Structured(Value),
    /// Raw completion from an LLM-backed tool; its usage is folded into the caller
    Completion(Completion),
    /// Output of an agent used as a tool; its usage is folded into the caller
    Agent(AgentOutput),
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        ToolOutput::Text(text)
    }
}

impl From<&str> for ToolOutput {
    fn from(text: &str) -> Self {
        ToolOutput::Text(text.to_string())
    }
}

/// What the dispatcher hands back to a controller after a tool call
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Observation {
    pub text: String,
    /// Cost/tokens spent inside the tool (nested LLM calls or agents)
    pub usage: Usage,
}

impl Observation {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: Usage::default(),
        }
    }
}

impl From<ToolOutput> for Observation {
    fn from(output: ToolOutput) -> Self {
        match output {
            ToolOutput::Text(text) => Observation::text(text),
            ToolOutput::Structured(Value::String(text)) => Observation::text(text),
            ToolOutput::Structured(value) => Observation::text(value.to_string()),
            ToolOutput::Completion(completion) => Observation {
                usage: Usage::from(&completion),
                text: completion.content,
            },
            ToolOutput::Agent(output) => Observation {
                usage: output.usage(),
                text: output.text,
            },
        }
    }
}

/// How a tool failure becomes an observation
#[derive(Clone, Default)]
pub enum ToolErrorPolicy {
    /// Re-raise: the run fails
    #[default]
    Raise,
    /// Use the exception message, or a generic one when it has none
    Message,
    /// Always observe this literal string
    Literal(String),
    /// Observe whatever the handler returns
    Custom(Arc<dyn Fn(&ToolException) -> String + Send + Sync>),
}

impl ToolErrorPolicy {
    pub fn custom(handler: impl Fn(&ToolException) -> String + Send + Sync + 'static) -> Self {
        ToolErrorPolicy::Custom(Arc::new(handler))
    }

    /// Apply the policy to an exception raised by `tool`
    pub fn handle(&self, tool: &str, err: ToolException) -> Result<String> {
        match self {
            ToolErrorPolicy::Raise => Err(AgentError::ToolExecution(format!("{tool}: {err}"))),
            ToolErrorPolicy::Message => Ok(err.to_string()),
            ToolErrorPolicy::Literal(text) => Ok(text.clone()),
            ToolErrorPolicy::Custom(handler) => Ok(handler(&err)),
        }
    }
}

impl fmt::Debug for ToolErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolErrorPolicy::Raise => write!(f, "Raise"),
            ToolErrorPolicy::Message => write!(f, "Message"),
            ToolErrorPolicy::Literal(text) => f.debug_tuple("Literal").field(text).finish(),
            ToolErrorPolicy::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Name and description shown to the model
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier, matched case-sensitively
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name and description for prompts
    fn schema(&self) -> ToolSchema;

    /// Run the tool
    async fn run(&self, input: &ToolInput) -> std::result::Result<ToolOutput, ToolException>;

    /// Policy applied when `run` fails. Registries may override it per tool.
    fn error_policy(&self) -> ToolErrorPolicy {
        ToolErrorPolicy::Raise
    }
}

/// A tool as stored in the registry
#[derive(Clone)]
pub struct RegisteredTool {
    schema: ToolSchema,
    tool: Arc<dyn Tool>,
    policy: ToolErrorPolicy,
}

impl RegisteredTool {
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn description(&self) -> &str {
        &self.schema.description
    }

    pub fn policy(&self) -> &ToolErrorPolicy {
        &self.policy
    }

    /// Run the tool and convert its result into an observation.
    ///
    /// A timeout counts as a tool exception and goes through the policy.
    pub async fn invoke(&self, input: &ToolInput, timeout: Option<Duration>) -> Result<Observation> {
        let name = self.name();
        tracing::debug!(tool = %name, input = %input, "Invoking tool");

        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.tool.run(input)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ToolException::new(format!(
                    "Tool `{name}` timed out after {}s",
                    limit.as_secs_f64()
                ))),
            },
            None => self.tool.run(input).await,
        };

        let outcome = outcome.and_then(|output| match output {
            ToolOutput::Agent(nested) if nested.is_failed() => Err(ToolException {
                message: nested.error,
            }),
            other => Ok(other),
        });

        match outcome {
            Ok(output) => Ok(Observation::from(output)),
            Err(err) => {
                tracing::warn!(tool = %name, error = %err, policy = ?self.policy, "Tool raised");
                self.policy.handle(name, err).map(Observation::text)
            }
        }
    }
}

impl fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("schema", &self.schema)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Registry for available tools, in registration order
#[derive(Clone, Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tool with its own error policy
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Register a shared tool with its own error policy
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let policy = tool.error_policy();
        self.register_with_policy(tool, policy);
    }

    /// Register a tool, overriding its error policy.
    ///
    /// Re-registering a name replaces the earlier tool in place.
    pub fn register_with_policy(&mut self, tool: Arc<dyn Tool>, policy: ToolErrorPolicy) {
        let schema = tool.schema();
        let entry = RegisteredTool {
            schema,
            tool,
            policy,
        };
        match self.index.get(entry.name()) {
            Some(&slot) => self.tools[slot] = entry,
            None => {
                self.index.insert(entry.name().to_string(), self.tools.len());
                self.tools.push(entry);
            }
        }
    }

    /// Exact, case-sensitive lookup
    pub fn resolve(&self, name: &str) -> Option<&RegisteredTool> {
        self.index.get(name).map(|&slot| &self.tools[slot])
    }

    /// Resolve `name` and invoke it.
    ///
    /// Unknown names observe [`NO_EVIDENCE`] instead of failing.
    pub async fn dispatch(
        &self,
        name: &str,
        input: &ToolInput,
        timeout: Option<Duration>,
    ) -> Result<Observation> {
        match self.resolve(name) {
            Some(tool) => tool.invoke(input, timeout).await,
            None => {
                tracing::warn!(tool = %name, "Unknown tool requested");
                Ok(Observation::text(NO_EVIDENCE))
            }
        }
    }

    /// Registered tools in order
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredTool> {
        self.tools.iter()
    }

    /// Tool names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(RegisteredTool::name).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// One `name[input]: description` line per tool
    pub fn describe(&self) -> String {
        self.tools
            .iter()
            .map(|t| format!("{}[input]: {}\n", t.name(), t.description()))
            .collect()
    }
}

// ============================================================================
// Built-in Tools
// ============================================================================

/// Forwards its input as a prompt to a language model
pub struct LlmTool {
    schema: ToolSchema,
    provider: Arc<dyn LlmProvider>,
    options: GenerationOptions,
}

impl LlmTool {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            schema: ToolSchema::new(
                "llm",
                "Useful for reasoning, summarizing or answering general knowledge \
                 questions. Input should be a complete question or instruction.",
            ),
            provider,
            options: GenerationOptions::default(),
        }
    }

    pub fn with_schema(mut self, schema: ToolSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait]
impl Tool for LlmTool {
    fn schema(&self) -> ToolSchema {
        self.schema.clone()
    }

    async fn run(&self, input: &ToolInput) -> std::result::Result<ToolOutput, ToolException> {
        let messages = [Message::user(input.to_string())];
        self.provider
            .complete(&messages, &self.options)
            .await
            .map(ToolOutput::Completion)
            .map_err(|e| ToolException::new(e.to_string()))
    }

    fn error_policy(&self) -> ToolErrorPolicy {
        ToolErrorPolicy::Message
    }
}

/// Exposes an agent as a tool so agents can be composed
pub struct AgentTool {
    schema: ToolSchema,
    agent: Arc<dyn Agent>,
}

impl AgentTool {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        let schema = ToolSchema::new(agent.name(), agent.description());
        Self { schema, agent }
    }

    pub fn with_schema(mut self, schema: ToolSchema) -> Self {
        self.schema = schema;
        self
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn schema(&self) -> ToolSchema {
        self.schema.clone()
    }

    async fn run(&self, input: &ToolInput) -> std::result::Result<ToolOutput, ToolException> {
        Ok(ToolOutput::Agent(self.agent.run(&input.to_string()).await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FnTool, ScriptedProvider};
    use crate::output::{AgentStatus, AgentType};
    use crate::provider::TokenUsage;

    fn failing(policy: ToolErrorPolicy) -> Arc<dyn Tool> {
        Arc::new(
            FnTool::new("flaky", "always fails", |_| Err(ToolException::new("503 upstream")))
                .with_policy(policy),
        )
    }

    #[test]
    fn test_tool_registry() {
        let mut registry = ToolRegistry::new();
        registry.register(FnTool::echo("wikipedia", "Search Wikipedia"));
        registry.register(FnTool::echo("google", "Search Google"));

        assert_eq!(registry.len(), 2);
        assert!(registry.resolve("wikipedia").is_some());
        assert!(registry.resolve("Wikipedia").is_none());
        assert_eq!(registry.names(), vec!["wikipedia", "google"]);
        assert_eq!(
            registry.describe(),
            "wikipedia[input]: Search Wikipedia\ngoogle[input]: Search Google\n"
        );
    }

    #[test]
    fn test_reregister_keeps_position() {
        let mut registry = ToolRegistry::new();
        registry.register(FnTool::echo("a", "first"));
        registry.register(FnTool::echo("b", "second"));
        registry.register(FnTool::echo("a", "replaced"));

        assert_eq!(registry.names(), vec!["a", "b"]);
        assert_eq!(registry.resolve("a").unwrap().description(), "replaced");
    }

    #[tokio::test]
    async fn test_unknown_tool_observes_no_evidence() {
        let registry = ToolRegistry::new();
        let obs = registry.dispatch("nope", &"x".into(), None).await.unwrap();
        assert_eq!(obs.text, NO_EVIDENCE);
    }

    #[tokio::test]
    async fn test_error_policies() {
        let input = ToolInput::from("q");

        let mut registry = ToolRegistry::new();
        registry.register_arc(failing(ToolErrorPolicy::Raise));
        let err = registry.dispatch("flaky", &input, None).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolExecution(ref m) if m.contains("503 upstream")));

        registry.register_arc(failing(ToolErrorPolicy::Message));
        let obs = registry.dispatch("flaky", &input, None).await.unwrap();
        assert_eq!(obs.text, "503 upstream");

        registry.register_arc(failing(ToolErrorPolicy::Literal("try later".into())));
        let obs = registry.dispatch("flaky", &input, None).await.unwrap();
        assert_eq!(obs.text, "try later");

        registry.register_arc(failing(ToolErrorPolicy::custom(|e| format!("handled: {e}"))));
        let obs = registry.dispatch("flaky", &input, None).await.unwrap();
        assert_eq!(obs.text, "handled: 503 upstream");
    }

    #[tokio::test]
    async fn test_message_policy_without_argument() {
        let mut registry = ToolRegistry::new();
        registry.register_with_policy(
            Arc::new(FnTool::new("bare", "", |_| Err(ToolException::bare()))),
            ToolErrorPolicy::Message,
        );
        let obs = registry.dispatch("bare", &"x".into(), None).await.unwrap();
        assert_eq!(obs.text, "Tool execution error");
    }

    #[tokio::test]
    async fn test_timeout_goes_through_policy() {
        let mut registry = ToolRegistry::new();
        registry.register(
            FnTool::echo("slow", "sleeps")
                .with_delay(Duration::from_millis(200))
                .with_policy(ToolErrorPolicy::Message),
        );
        let obs = registry
            .dispatch("slow", &"x".into(), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        assert!(obs.text.contains("timed out"));
    }

    #[tokio::test]
    async fn test_nested_agent_output_folds_usage() {
        let nested = AgentOutput::new(AgentType::React, AgentStatus::Finished, "inner answer")
            .with_usage(Usage::new(0.25, 30));
        let obs = Observation::from(ToolOutput::Agent(nested));
        assert_eq!(obs.text, "inner answer");
        assert_eq!(obs.usage, Usage::new(0.25, 30));
    }

    #[tokio::test]
    async fn test_llm_tool_reports_usage() {
        let provider = Arc::new(ScriptedProvider::new(["Paris"]).with_usage(TokenUsage::new(7, 3), 0.01));
        let mut registry = ToolRegistry::new();
        registry.register(LlmTool::new(provider.clone()));

        let obs = registry.dispatch("llm", &"Capital of France?".into(), None).await.unwrap();
        assert_eq!(obs.text, "Paris");
        assert_eq!(obs.usage.tokens, 10);
        assert_eq!(provider.prompts(), vec!["Capital of France?".to_string()]);
    }

    #[test]
    fn test_structured_input_display() {
        let mut map = Map::new();
        map.insert("query".into(), Value::String("rust".into()));
        assert_eq!(ToolInput::from(map).to_string(), r#"{"query":"rust"}"#);
        assert_eq!(ToolInput::from("plain").as_text(), Some("plain"));
    }
}
