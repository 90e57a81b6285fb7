//! Deterministic doubles for tests and demos.
//!
//! [`ScriptedProvider`] replays canned completions and records every prompt it
//! was sent. [`FnTool`] wraps a closure as a tool and tracks how many calls
//! were in flight at once.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AgentError, Result, ToolException};
use crate::message::{Message, render_prompt};
use crate::provider::{Completion, GenerationOptions, LlmProvider, TokenUsage};
use crate::tool::{Tool, ToolErrorPolicy, ToolInput, ToolOutput, ToolSchema};

/// One scripted provider reply
#[derive(Clone, Debug)]
pub enum MockStep {
    Text(String),
    Error(String),
}

impl MockStep {
    pub fn text(content: impl Into<String>) -> Self {
        MockStep::Text(content.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        MockStep::Error(message.into())
    }
}

/// A provider that answers from a script, in order
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<MockStep>>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
    usage: Option<TokenUsage>,
    cost: f64,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new<I>(responses: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self::from_steps(responses.into_iter().map(|r| MockStep::Text(r.into())))
    }

    pub fn from_steps(steps: impl IntoIterator<Item = MockStep>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Attach this usage and cost to every reply
    pub fn with_usage(mut self, usage: TokenUsage, cost: f64) -> Self {
        self.usage = Some(usage);
        self.cost = cost;
        self
    }

    /// Sleep before every reply
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Prompt text of every call so far
    pub fn prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(prompt, _)| prompt.clone())
            .collect()
    }

    /// Stop sequences of every call so far
    pub fn stops(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, stop)| stop.clone())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(&self, messages: &[Message], options: &GenerationOptions) -> Result<Completion> {
        let prompt = render_prompt(messages);
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((prompt, options.stop_sequences.clone()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let step = self.script.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        match step {
            Some(MockStep::Text(content)) => Ok(Completion {
                content,
                model: options.model.clone(),
                usage: self.usage.clone(),
                cost: self.cost,
            }),
            Some(MockStep::Error(message)) => Err(AgentError::Provider(message)),
            None => Err(AgentError::Provider("script exhausted".into())),
        }
    }
}

type Handler = dyn Fn(&ToolInput) -> std::result::Result<String, ToolException> + Send + Sync;

/// A tool backed by a closure
pub struct FnTool {
    schema: ToolSchema,
    handler: Box<Handler>,
    policy: ToolErrorPolicy,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FnTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: impl Fn(&ToolInput) -> std::result::Result<String, ToolException> + Send + Sync + 'static,
    ) -> Self {
        Self {
            schema: ToolSchema::new(name, description),
            handler: Box::new(handler),
            policy: ToolErrorPolicy::Raise,
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Tool that returns its input unchanged
    pub fn echo(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, |input| Ok(input.to_string()))
    }

    pub fn with_policy(mut self, policy: ToolErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sleep inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most calls ever running at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for FnTool {
    fn schema(&self) -> ToolSchema {
        self.schema.clone()
    }

    async fn run(&self, input: &ToolInput) -> std::result::Result<ToolOutput, ToolException> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let result = (self.handler)(input).map(ToolOutput::Text);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn error_policy(&self) -> ToolErrorPolicy {
        self.policy.clone()
    }
}
