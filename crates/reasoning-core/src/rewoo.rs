//! ReWOO Controller
//!
//! Reasoning WithOut Observation: the planner writes the whole plan up front,
//! workers resolve every evidence, and the solver answers from the collected
//! evidence. The phases never overlap:
//!
//! ```text
//! ┌─────────┐   #Plan/#E text   ┌──────────────────────────┐  worker log  ┌────────┐
//! │ Planner │ ────────────────► │ Workers, level by level  │ ───────────► │ Solver │
//! └─────────┘                   │  level 0: #E1 #E2  (||)  │              └────────┘
//!                               │  level 1: #E3      (||)  │
//!                               └──────────────────────────┘
//! ```
//!
//! Evidences of one level run concurrently, bounded by `max_concurrency`.
//! Each level reads an immutable snapshot of the results of earlier levels;
//! its own results are merged only after the whole level has finished.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};

use crate::agent::{Agent, RunOptions, call_llm, run_guarded};
use crate::config::RewooConfig;
use crate::error::{AgentError, Result};
use crate::graph::DependencyGraph;
use crate::output::{AgentOutput, AgentStatus, AgentType};
use crate::parser::{
    EVIDENCE_REF_RE, EvidenceSpec, Evidences, MALFORMED_EVIDENCE, Plan, parse_evidences, parse_plans,
    split_tool_call,
};
use crate::prompt::{
    Examples, FEW_SHOT_PLANNER_PROMPT, FEW_SHOT_SOLVER_PROMPT, PLANNER_PROMPT, PromptTemplate, SOLVER_PROMPT,
};
use crate::provider::{LlmProvider, Usage};
use crate::tool::{Observation, Tool, ToolInput, ToolRegistry};
use crate::trim::trim_to_tokens;

/// Resolved evidence values keyed by `#E<N>`
type EvidenceMap = HashMap<String, String>;

/// Plan-then-execute agent
pub struct RewooAgent {
    name: String,
    description: String,
    planner: Arc<dyn LlmProvider>,
    solver: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    planner_template: PromptTemplate,
    solver_template: PromptTemplate,
    config: RewooConfig,
}

impl RewooAgent {
    pub fn builder() -> RewooAgentBuilder {
        RewooAgentBuilder::new()
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn config(&self) -> &RewooConfig {
        &self.config
    }

    async fn execute(&self, instruction: &str, options: &RunOptions) -> Result<AgentOutput> {
        let timeouts = self.config.timeouts;

        // Plan
        let fewshot = self.config.planner_examples.as_ref().map(Examples::compose).unwrap_or_default();
        let tool_description = self.tools.describe();
        let prompt = self.planner_template.populate(&[
            ("tool_description", tool_description.as_str()),
            ("fewshot", fewshot.as_str()),
            ("task", instruction),
        ])?;
        let planned = call_llm(
            self.planner.as_ref(),
            &prompt,
            &self.config.planner_generation,
            timeouts.llm_call,
        )
        .await?;
        let mut usage = Usage::from(&planned);
        let planner_log = planned.content;

        let plans = parse_plans(&planner_log)?;
        let evidences = parse_evidences(&planner_log)?;
        let graph = DependencyGraph::build(evidences.calls())?;
        tracing::info!(
            plans = plans.len(),
            evidences = evidences.len(),
            levels = graph.levels().len(),
            "Plan ready"
        );
        options.emit(
            AgentOutput::thinking(AgentType::Rewoo)
                .with_usage(usage)
                .with_metadata("planner_log", planner_log.as_str()),
        );

        // Work
        let (resolved, work_usage) = self.work(&evidences, &graph).await?;
        usage.add(work_usage);

        let mut worker_log = String::new();
        for plan in &plans {
            let section = plan_section(plan, &resolved);
            options.emit(
                AgentOutput::thinking(AgentType::Rewoo)
                    .with_usage(usage)
                    .with_metadata("worker_log", section.as_str()),
            );
            worker_log.push_str(&section);
        }

        // Solve
        let fewshot = self.config.solver_examples.as_ref().map(Examples::compose).unwrap_or_default();
        let prompt = self.solver_template.populate(&[
            ("plan_evidence", worker_log.as_str()),
            ("fewshot", fewshot.as_str()),
            ("task", instruction),
            ("lang", self.config.output_lang.as_str()),
        ])?;
        let solved = call_llm(
            self.solver.as_ref(),
            &prompt,
            &self.config.solver_generation,
            timeouts.llm_call,
        )
        .await?;
        usage.add(Usage::from(&solved));

        Ok(AgentOutput::new(AgentType::Rewoo, AgentStatus::Finished, solved.content)
            .with_usage(usage)
            .with_metadata("planner_log", planner_log)
            .with_metadata("worker_log", worker_log))
    }

    /// Resolve every evidence, one dependency level at a time
    async fn work(&self, evidences: &Evidences, graph: &DependencyGraph) -> Result<(EvidenceMap, Usage)> {
        let mut resolved: EvidenceMap = evidences
            .malformed()
            .map(|id| (id.to_string(), MALFORMED_EVIDENCE.to_string()))
            .collect();
        let mut usage = Usage::default();

        for (depth, level) in graph.levels().iter().enumerate() {
            tracing::debug!(level = depth, evidences = ?level, "Running evidence level");
            let snapshot = &resolved;

            let calls: Vec<BoxFuture<'_, Result<(String, Observation)>>> = level
                .iter()
                .map(|id| {
                    let id = id.clone();
                    let spec = match evidences.get(&id) {
                        Some(EvidenceSpec::Call(spec)) => spec.clone(),
                        _ => MALFORMED_EVIDENCE.to_string(),
                    };
                    async move {
                        let observation = self.resolve(&spec, snapshot).await?;
                        Ok((id, observation))
                    }
                    .boxed()
                })
                .collect();

            let results: Vec<Result<(String, Observation)>> = stream::iter(calls)
                .buffer_unordered(self.config.max_concurrency)
                .collect()
                .await;

            for result in results {
                let (id, observation) = result?;
                usage.add(observation.usage);
                if resolved.insert(id.clone(), observation.text).is_some() {
                    return Err(AgentError::Other(format!("evidence {id} resolved twice")));
                }
            }
        }

        Ok((resolved, usage))
    }

    /// Run one evidence spec against the results of earlier levels
    async fn resolve(&self, spec: &str, resolved: &EvidenceMap) -> Result<Observation> {
        let Some((tool, input)) = split_tool_call(spec) else {
            return Ok(Observation::text(spec));
        };
        let input = substitute(input, resolved);

        let observation = self
            .tools
            .dispatch(tool, &ToolInput::from(input), self.config.timeouts.tool_call)
            .await?;
        Ok(Observation {
            text: trim_to_tokens(&observation.text, self.config.max_context_length, |text| {
                self.solver.estimate_tokens(text)
            }),
            usage: observation.usage,
        })
    }
}

/// Replace each resolved `#E<N>` token in `input` with its value.
///
/// Tokens are matched whole, so `#E1` never rewrites part of `#E10`.
fn substitute(input: &str, resolved: &EvidenceMap) -> String {
    EVIDENCE_REF_RE
        .replace_all(input, |caps: &regex::Captures<'_>| {
            resolved
                .get(&caps[0])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// `#Plan<N>: description` followed by each of its evidences and their values
fn plan_section(plan: &Plan, resolved: &EvidenceMap) -> String {
    let mut section = format!("{}: {}\n", plan.id, plan.description);
    for id in &plan.evidences {
        let value = resolved.get(id).map_or(MALFORMED_EVIDENCE, String::as_str);
        section.push_str(&format!("{id}: {value}\n"));
    }
    section
}

#[async_trait]
impl Agent for RewooAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn agent_type(&self) -> AgentType {
        AgentType::Rewoo
    }

    async fn run_with(&self, instruction: &str, options: RunOptions) -> AgentOutput {
        run_guarded(
            &self.name,
            AgentType::Rewoo,
            self.config.timeouts.run,
            options.cancel.as_ref(),
            self.execute(instruction, &options),
        )
        .await
    }
}

/// Builder for [`RewooAgent`]
pub struct RewooAgentBuilder {
    name: String,
    description: String,
    planner: Option<Arc<dyn LlmProvider>>,
    solver: Option<Arc<dyn LlmProvider>>,
    tools: ToolRegistry,
    config: RewooConfig,
}

impl Default for RewooAgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RewooAgentBuilder {
    pub fn new() -> Self {
        Self {
            name: "rewoo".into(),
            description: "Answers multi-step questions by planning all tool calls up front.".into(),
            planner: None,
            solver: None,
            tools: ToolRegistry::new(),
            config: RewooConfig::default(),
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

    /// Use one provider for both planning and solving
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.planner = Some(provider.clone());
        self.solver = Some(provider);
        self
    }

    pub fn planner(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.planner = Some(provider);
        self
    }

    pub fn solver(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.solver = Some(provider);
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

    pub fn config(mut self, config: RewooConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_concurrency(mut self, max: usize) -> Self {
        self.config.max_concurrency = max;
        self
    }

    pub fn build(self) -> Result<RewooAgent> {
        let planner = self
            .planner
            .ok_or_else(|| AgentError::Config("Planner provider is required".into()))?;
        let solver = self
            .solver
            .ok_or_else(|| AgentError::Config("Solver provider is required".into()))?;
        self.config.validate()?;

        let planner_template = select_template(
            self.config.planner_template.as_ref(),
            self.config.planner_examples.is_some(),
            PLANNER_PROMPT,
            FEW_SHOT_PLANNER_PROMPT,
        );
        let solver_template = select_template(
            self.config.solver_template.as_ref(),
            self.config.solver_examples.is_some(),
            SOLVER_PROMPT,
            FEW_SHOT_SOLVER_PROMPT,
        );

        Ok(RewooAgent {
            name: self.name,
            description: self.description,
            planner,
            solver,
            tools: Arc::new(self.tools),
            planner_template,
            solver_template,
            config: self.config,
        })
    }
}

/// Custom template if given, else the few-shot default when examples exist
fn select_template(
    custom: Option<&PromptTemplate>,
    has_examples: bool,
    zero_shot: &str,
    few_shot: &str,
) -> PromptTemplate {
    match custom {
        Some(template) => template.clone(),
        None if has_examples => PromptTemplate::new(few_shot),
        None => PromptTemplate::new(zero_shot),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::error::ToolException;
    use crate::mock::{FnTool, ScriptedProvider};
    use crate::provider::TokenUsage;
    use crate::react::ReactAgent;
    use crate::tool::{AgentTool, LlmTool, ToolErrorPolicy, ToolOutput, ToolSchema};

    /// Logs when each call starts and ends; input `slow` takes longest
    #[derive(Default)]
    struct EventLog {
        events: Mutex<Vec<String>>,
    }

    impl EventLog {
        fn position(&self, event: &str) -> usize {
            let events = self.events.lock().unwrap();
            events.iter().position(|e| e == event).unwrap()
        }
    }

    #[async_trait]
    impl Tool for EventLog {
        fn schema(&self) -> ToolSchema {
            ToolSchema::new("lookup", "Looks things up")
        }

        async fn run(&self, input: &ToolInput) -> std::result::Result<ToolOutput, ToolException> {
            let input = input.to_string();
            self.events.lock().unwrap().push(format!("start {input}"));
            let millis = if input == "slow" { 80 } else { 5 };
            tokio::time::sleep(Duration::from_millis(millis)).await;
            self.events.lock().unwrap().push(format!("end {input}"));
            Ok(ToolOutput::Text(input))
        }
    }

    const PLAN: &str = "#Plan1: search\n#E1: google[Cinnamon AI]\n#Plan2: wiki\n#E2: wikipedia[Cinnamon]\n";

    fn search_tools() -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        tools.register(FnTool::new("google", "Search Google", |input| Ok(format!("google: {input}"))));
        tools.register(FnTool::new("wikipedia", "Search Wikipedia", |input| {
            Ok(format!("wiki: {input}"))
        }));
        tools
    }

    fn agent(planner: &Arc<ScriptedProvider>, solver: &Arc<ScriptedProvider>, tools: ToolRegistry) -> RewooAgent {
        RewooAgent::builder()
            .planner(planner.clone())
            .solver(solver.clone())
            .tools(tools)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_plan_work_solve() {
        let planner = Arc::new(ScriptedProvider::new([PLAN]));
        let solver = Arc::new(ScriptedProvider::new(["Cinnamon AI builds document AI."]));
        let out = agent(&planner, &solver, search_tools()).run("Tell me about Cinnamon AI").await;

        assert_eq!(out.status, AgentStatus::Finished);
        assert_eq!(out.agent_type, AgentType::Rewoo);
        assert_eq!(out.text, "Cinnamon AI builds document AI.");

        let worker_log = "#Plan1: search\n#E1: google: Cinnamon AI\n#Plan2: wiki\n#E2: wiki: Cinnamon\n";
        assert_eq!(out.metadata["worker_log"], worker_log);
        assert_eq!(out.metadata["planner_log"], PLAN);

        let solver_prompts = solver.prompts();
        assert_eq!(solver_prompts.len(), 1);
        assert!(solver_prompts[0].contains(worker_log));
        assert!(solver_prompts[0].contains("Tell me about Cinnamon AI"));
        assert!(solver_prompts[0].contains("Give answer in English"));

        let planner_prompts = planner.prompts();
        assert!(planner_prompts[0].contains("google[input]: Search Google\nwikipedia[input]: Search Wikipedia\n"));
    }

    #[tokio::test]
    async fn test_level_runs_concurrently() {
        let search = Arc::new(FnTool::echo("search", "Search").with_delay(Duration::from_millis(50)));
        let planner = Arc::new(ScriptedProvider::new([
            "#Plan1: a\n#E1: search[a]\n#Plan2: b\n#E2: search[b]\n#Plan3: c\n#E3: search[c]",
        ]));
        let solver = Arc::new(ScriptedProvider::new(["done"]));
        let agent = RewooAgent::builder()
            .planner(planner)
            .solver(solver)
            .tool_arc(search.clone())
            .max_concurrency(4)
            .build()
            .unwrap();

        let out = agent.run("q").await;
        assert_eq!(out.status, AgentStatus::Finished);
        assert_eq!(search.calls(), 3);
        assert_eq!(search.peak_concurrency(), 3);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let search = Arc::new(FnTool::echo("search", "Search").with_delay(Duration::from_millis(20)));
        let planner = Arc::new(ScriptedProvider::new([
            "#Plan1: a\n#E1: search[a]\n#E2: search[b]\n#E3: search[c]",
        ]));
        let agent = RewooAgent::builder()
            .planner(planner)
            .solver(Arc::new(ScriptedProvider::new(["done"])))
            .tool_arc(search.clone())
            .max_concurrency(1)
            .build()
            .unwrap();

        agent.run("q").await;
        assert_eq!(search.calls(), 3);
        assert_eq!(search.peak_concurrency(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_level_waits_for_whole_level() {
        let log = Arc::new(EventLog::default());
        let planner = Arc::new(ScriptedProvider::new([
            "#Plan1: a\n#E1: lookup[slow]\n#E2: lookup[fast]\n#Plan2: b\n#E3: lookup[after #E2]",
        ]));
        let agent = RewooAgent::builder()
            .planner(planner)
            .solver(Arc::new(ScriptedProvider::new(["done"])))
            .tool_arc(log.clone())
            .build()
            .unwrap();

        let out = agent.run("q").await;
        assert_eq!(out.status, AgentStatus::Finished);
        assert!(log.position("end fast") < log.position("end slow"));
        assert!(log.position("end slow") < log.position("start after fast"));
        assert!(log.position("end fast") < log.position("start after fast"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_work() {
        let slow = Arc::new(FnTool::echo("slow", "Sleeps").with_delay(Duration::from_secs(60)));
        let solver = Arc::new(ScriptedProvider::new(["never"]));
        let agent = RewooAgent::builder()
            .planner(Arc::new(ScriptedProvider::new(["#Plan1: x\n#E1: slow[x]"])))
            .solver(solver.clone())
            .tool_arc(slow.clone())
            .build()
            .unwrap();

        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let out = agent.run_with_cancel("q", token).await;
        assert_eq!(out.status, AgentStatus::Failed);
        assert_eq!(out.error.as_deref(), Some("Run cancelled"));
        assert_eq!(slow.calls(), 1);
        assert_eq!(solver.call_count(), 0);
    }

    #[tokio::test]
    async fn test_dependent_evidence_is_substituted() {
        let planner = Arc::new(ScriptedProvider::new([
            "#Plan1: find\n#E1: google[Cinnamon AI]\n#Plan2: digest\n#E2: wikipedia[about #E1]",
        ]));
        let solver = Arc::new(ScriptedProvider::new(["ok"]));
        let out = agent(&planner, &solver, search_tools()).run("q").await;

        let worker_log = out.metadata["worker_log"].as_str().unwrap().to_string();
        assert!(worker_log.contains("#E2: wiki: about google: Cinnamon AI\n"));
    }

    #[tokio::test]
    async fn test_substitution_matches_whole_ids() {
        let planner = Arc::new(ScriptedProvider::new([
            "#Plan1: x\n#E1: echo[one]\n#E12: echo[twelve]\n#Plan2: y\n#E2: echo[#E12 #E1]",
        ]));
        let solver = Arc::new(ScriptedProvider::new(["ok"]));
        let mut tools = ToolRegistry::new();
        tools.register(FnTool::echo("echo", "Echo"));
        let out = agent(&planner, &solver, tools).run("q").await;

        assert!(out.metadata["worker_log"].as_str().unwrap().contains("#E2: twelve one\n"));
    }

    #[tokio::test]
    async fn test_cycle_fails_before_any_tool_runs() {
        let search = Arc::new(FnTool::echo("search", "Search"));
        let planner = Arc::new(ScriptedProvider::new([
            "#Plan1: x\n#E1: search[#E2]\n#Plan2: y\n#E2: search[#E1]",
        ]));
        let solver = Arc::new(ScriptedProvider::new(["never"]));
        let agent = RewooAgent::builder()
            .planner(planner)
            .solver(solver.clone())
            .tool_arc(search.clone())
            .build()
            .unwrap();

        let out = agent.run("q").await;
        assert!(out.is_failed());
        assert!(out.error.unwrap().contains("Circular dependency"));
        assert_eq!(search.calls(), 0);
        assert_eq!(solver.call_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_plan_fails() {
        let planner = Arc::new(ScriptedProvider::new(["#E1: google[x]\n#Plan1: late"]));
        let solver = Arc::new(ScriptedProvider::new(["never"]));
        let out = agent(&planner, &solver, search_tools()).run("q").await;
        assert!(out.is_failed());
        assert_eq!(out.text, "");
        assert!(out.error.unwrap().contains("Malformed plan"));
    }

    #[tokio::test]
    async fn test_degraded_evidence_keeps_running() {
        let planner = Arc::new(ScriptedProvider::new([
            "#Plan1: x\n#E1: bing[rust]\n#E2a: google[rust]\n#E3: a plain note\n",
        ]));
        let solver = Arc::new(ScriptedProvider::new(["ok"]));
        let out = agent(&planner, &solver, search_tools()).run("q").await;

        assert_eq!(out.status, AgentStatus::Finished);
        assert_eq!(
            out.metadata["worker_log"],
            "#Plan1: x\n#E1: No evidence found.\n#E2a: No evidence found\n#E3: a plain note\n"
        );
    }

    #[tokio::test]
    async fn test_raising_tool_fails_run() {
        let planner = Arc::new(ScriptedProvider::new(["#Plan1: x\n#E1: flaky[x]"]));
        let solver = Arc::new(ScriptedProvider::new(["never"]));
        let mut tools = ToolRegistry::new();
        tools.register(FnTool::new("flaky", "fails", |_| Err(ToolException::new("503"))));
        let out = agent(&planner, &solver, tools).run("q").await;
        assert!(out.is_failed());

        let planner = Arc::new(ScriptedProvider::new(["#Plan1: x\n#E1: flaky[x]"]));
        let solver = Arc::new(ScriptedProvider::new(["ok"]));
        let mut tools = ToolRegistry::new();
        tools.register(
            FnTool::new("flaky", "fails", |_| Err(ToolException::new("503"))).with_policy(ToolErrorPolicy::Message),
        );
        let out = agent(&planner, &solver, tools).run("q").await;
        assert_eq!(out.metadata["worker_log"], "#Plan1: x\n#E1: 503\n");
    }

    #[tokio::test]
    async fn test_costs_are_summed() {
        let planner = Arc::new(ScriptedProvider::new([PLAN]).with_usage(TokenUsage::new(10, 0), 0.1));
        let solver = Arc::new(ScriptedProvider::new(["ok"]).with_usage(TokenUsage::new(5, 5), 0.2));
        let worker = Arc::new(ScriptedProvider::new(["g", "w"]).with_usage(TokenUsage::new(3, 0), 0.05));

        let mut tools = ToolRegistry::new();
        tools.register(LlmTool::new(worker.clone()).with_schema(ToolSchema::new("google", "LLM")));
        tools.register(LlmTool::new(worker).with_schema(ToolSchema::new("wikipedia", "LLM")));

        let out = agent(&planner, &solver, tools).run("q").await;
        assert_eq!(out.token_usage, 26);
        assert!((out.cost - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_nested_agent_usage_is_folded() {
        let inner_llm = Arc::new(ScriptedProvider::new(["Final Answer: inner"]).with_usage(TokenUsage::new(8, 2), 0.3));
        let inner = ReactAgent::builder()
            .name("researcher")
            .description("Researches a topic")
            .provider(inner_llm)
            .build()
            .unwrap();

        let planner = Arc::new(ScriptedProvider::new(["#Plan1: ask\n#E1: researcher[topic]"]));
        let solver = Arc::new(ScriptedProvider::new(["outer"]));
        let mut tools = ToolRegistry::new();
        tools.register(AgentTool::new(Arc::new(inner)));

        let out = agent(&planner, &solver, tools).run("q").await;
        assert_eq!(out.metadata["worker_log"], "#Plan1: ask\n#E1: inner\n");
        assert_eq!(out.token_usage, 10);
        assert!((out.cost - 0.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_few_shot_templates_selected() {
        let planner = Arc::new(ScriptedProvider::new([PLAN]));
        let solver = Arc::new(ScriptedProvider::new(["ok"]));
        let config = RewooConfig {
            planner_examples: Some(Examples::Many(vec!["\nExample one\n".into(), "Example two".into()])),
            ..Default::default()
        };
        let agent = RewooAgent::builder()
            .planner(planner.clone())
            .solver(solver.clone())
            .tools(search_tools())
            .config(config)
            .build()
            .unwrap();

        agent.run("q").await;
        assert!(planner.prompts()[0].contains("##Examples##\nExample one\n\nExample two\n"));
        assert!(!solver.prompts()[0].contains("##Example##"));
    }

    #[tokio::test]
    async fn test_custom_template_without_fewshot() {
        let planner = Arc::new(ScriptedProvider::new([PLAN]));
        let solver = Arc::new(ScriptedProvider::new(["ok"]));
        let config = RewooConfig {
            planner_template: Some(PromptTemplate::new("Tools:\n{tool_description}Task: {task}")),
            planner_examples: Some(Examples::One("ignored".into())),
            ..Default::default()
        };
        let agent = RewooAgent::builder()
            .planner(planner.clone())
            .solver(solver)
            .tools(search_tools())
            .config(config)
            .build()
            .unwrap();

        agent.run("q").await;
        assert_eq!(
            planner.prompts()[0],
            "Tools:\ngoogle[input]: Search Google\nwikipedia[input]: Search Wikipedia\nTask: q"
        );
    }

    #[tokio::test]
    async fn test_stream_reports_plan_and_each_step() {
        let planner = Arc::new(ScriptedProvider::new([PLAN]));
        let solver = Arc::new(ScriptedProvider::new(["final"]));
        let agent = Arc::new(agent(&planner, &solver, search_tools()));

        let outputs: Vec<AgentOutput> = agent.stream("q".into()).collect().await;
        assert_eq!(outputs.len(), 4);
        assert_eq!(outputs[0].metadata["planner_log"], PLAN);
        assert_eq!(outputs[1].metadata["worker_log"], "#Plan1: search\n#E1: google: Cinnamon AI\n");
        assert_eq!(outputs[2].metadata["worker_log"], "#Plan2: wiki\n#E2: wiki: Cinnamon\n");
        assert!(outputs[..3].iter().all(|o| o.status == AgentStatus::Thinking));
        assert_eq!(outputs[3].status, AgentStatus::Finished);
        assert_eq!(outputs[3].text, "final");
    }

    #[tokio::test]
    async fn test_tool_timeout_uses_policy() {
        let planner = Arc::new(ScriptedProvider::new(["#Plan1: x\n#E1: slow[x]"]));
        let solver = Arc::new(ScriptedProvider::new(["ok"]));
        let mut config = RewooConfig::default();
        config.timeouts.tool_call = Some(Duration::from_millis(10));
        let agent = RewooAgent::builder()
            .planner(planner)
            .solver(solver)
            .tool(
                FnTool::echo("slow", "Sleeps")
                    .with_delay(Duration::from_millis(200))
                    .with_policy(ToolErrorPolicy::Literal("timed out".into())),
            )
            .config(config)
            .build()
            .unwrap();

        let out = agent.run("q").await;
        assert_eq!(out.metadata["worker_log"], "#Plan1: x\n#E1: timed out\n");
    }

    #[test]
    fn test_substitute_leaves_unknown_refs() {
        let resolved: EvidenceMap = [("#E1".to_string(), "one".to_string())].into_iter().collect();
        assert_eq!(substitute("#E1 and #E2", &resolved), "one and #E2");
    }

    #[test]
    fn test_builder_requires_providers() {
        assert!(matches!(RewooAgent::builder().build(), Err(AgentError::Config(_))));
    }
}
