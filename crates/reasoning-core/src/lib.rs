//! # reasoning-core
//!
//! Agent reasoning engine with two paradigms over a provider-agnostic LLM
//! abstraction and an extensible tool system.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                       Agent (trait)                        │
//! │  ┌──────────────┐  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  ReactAgent  │  │  RewooAgent  │  │  LlmProvider    │  │
//! │  │  think/act   │  │  plan/work/  │──│  (Strategy)     │  │
//! │  │  loop        │  │  solve, DAG  │  └─────────────────┘  │
//! │  └──────┬───────┘  └──────┬───────┘  ┌─────────────────┐  │
//! │         └───── parser ────┴──────────│  ToolRegistry   │  │
//! │                                      └─────────────────┘  │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ReAct runs one tool call per LLM turn. ReWOO asks the planner for every
//! tool call up front, runs independent calls of each dependency level in
//! parallel, then hands the collected evidence to the solver.
//!
//! Runs never return `Err`: failures come back as an [`AgentOutput`] with
//! `status == failed` and the message in `error`.

pub mod agent;
pub mod config;
pub mod error;
pub mod graph;
pub mod message;
pub mod mock;
pub mod output;
pub mod parser;
pub mod prompt;
pub mod provider;
pub mod react;
pub mod rewoo;
pub mod tool;
pub mod trim;

pub use agent::{Agent, AgentStream, RunOptions};
pub use config::{ReactConfig, RewooConfig, Timeouts};
pub use error::{AgentError, Result, ToolException};
pub use message::{Message, Role};
pub use output::{AgentAction, AgentFinish, AgentOutput, AgentStatus, AgentStep, AgentType};
pub use provider::{Completion, GenerationOptions, LlmProvider, TokenUsage};
pub use react::ReactAgent;
pub use rewoo::RewooAgent;
pub use tool::{AgentTool, LlmTool, Tool, ToolErrorPolicy, ToolInput, ToolOutput, ToolRegistry, ToolSchema};
