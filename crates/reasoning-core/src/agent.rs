//! Agent Facade
//!
//! Both controllers implement [`Agent`]. Every run goes through
//! [`run_guarded`], the one place where errors turn into a failed
//! [`AgentOutput`]; callers branch on `status`, never on error types.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{FutureExt, Stream};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::output::{AgentOutput, AgentType};
use crate::provider::{Completion, GenerationOptions, LlmProvider};

/// Channel receiving intermediate `thinking` outputs
pub type ProgressSender = mpsc::UnboundedSender<AgentOutput>;

/// Stream of progress outputs ending with the final output
pub type AgentStream = Pin<Box<dyn Stream<Item = AgentOutput> + Send>>;

/// Per-run options
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    /// Overrides the configured iteration bound (ReAct only)
    pub max_iterations: Option<usize>,

    /// Cancels the run when triggered
    pub cancel: Option<CancellationToken>,

    /// Receives progress outputs while the run is in flight
    pub progress: Option<ProgressSender>,
}

impl RunOptions {
    pub fn max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = Some(max);
        self
    }

    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Forward a progress output; a dropped receiver is not an error
    pub(crate) fn emit(&self, output: AgentOutput) {
        if let Some(sender) = &self.progress {
            let _ = sender.send(output);
        }
    }
}

/// A reasoning agent
#[async_trait]
pub trait Agent: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Description shown when the agent is used as a tool
    fn description(&self) -> &str;

    fn agent_type(&self) -> AgentType;

    /// Run with explicit options. Never fails: errors come back as a
    /// `failed` output.
    async fn run_with(&self, instruction: &str, options: RunOptions) -> AgentOutput;

    /// Run to completion
    async fn run(&self, instruction: &str) -> AgentOutput {
        self.run_with(instruction, RunOptions::default()).await
    }

    /// Run until done or until `token` is cancelled
    async fn run_with_cancel(&self, instruction: &str, token: CancellationToken) -> AgentOutput {
        self.run_with(instruction, RunOptions::default().cancel(token)).await
    }

    /// Run in the background, yielding progress and then the final output
    fn stream(self: Arc<Self>, instruction: String) -> AgentStream {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let output = self
                .run_with(&instruction, RunOptions::default().progress(tx.clone()))
                .await;
            let _ = tx.send(output);
        });
        Box::pin(UnboundedReceiverStream::new(rx))
    }
}

/// Drive `body` under the run deadline and cancellation token, converting any
/// error or panic into a failed output.
pub async fn run_guarded<F>(
    agent: &str,
    agent_type: AgentType,
    deadline: Option<Duration>,
    cancel: Option<&CancellationToken>,
    body: F,
) -> AgentOutput
where
    F: Future<Output = Result<AgentOutput>> + Send,
{
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("agent_run", agent = %agent, run_id = %run_id);

    let guarded = async {
        let body = AssertUnwindSafe(body).catch_unwind().map(|caught| {
            caught.unwrap_or_else(|payload| Err(AgentError::Panicked(panic_message(&*payload))))
        });
        let bounded = async {
            match deadline {
                Some(limit) => tokio::time::timeout(limit, body).await.unwrap_or_else(|_| {
                    Err(AgentError::Timeout(format!("run exceeded {}s", limit.as_secs_f64())))
                }),
                None => body.await,
            }
        };

        let result = match cancel {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => Err(AgentError::Cancelled),
                result = bounded => result,
            },
            None => bounded.await,
        };

        match result {
            Ok(output) => {
                tracing::info!(status = %output.status, cost = output.cost, tokens = output.token_usage, "Run complete");
                output
            }
            Err(err) => {
                if err.is_parse_error() {
                    tracing::warn!(error = %err, "Run failed on model output");
                } else {
                    tracing::error!(error = %err, "Run failed");
                }
                AgentOutput::failed(agent_type, err.to_string())
            }
        }
    };

    guarded.instrument(span).await
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|msg| (*msg).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}

/// Send `prompt` as a single user message, bounded by `timeout`
pub async fn call_llm(
    provider: &dyn LlmProvider,
    prompt: &str,
    options: &GenerationOptions,
    timeout: Option<Duration>,
) -> Result<Completion> {
    let messages = [Message::user(prompt)];
    let call = provider.complete(&messages, options);
    let completion = match timeout {
        Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
            AgentError::Timeout(format!("LLM call exceeded {}s", limit.as_secs_f64()))
        })??,
        None => call.await?,
    };
    tracing::debug!(
        tokens = completion.total_tokens(),
        response = %completion.content,
        "LLM responded"
    );
    Ok(completion)
}
