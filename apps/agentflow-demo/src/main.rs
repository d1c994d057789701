mod model;

use std::io::Write as _;
use std::sync::Arc;

use agentflow_kernel::{Agent, Env, Environment, RetryPolicy, StepResult, Trace, retry};
use agentflow_memory::{InMemoryStore, WorkingContext, keep_last};
use agentflow_multi::{
    AgentRegistry, MultiAgent, MultiEnv, MultiState, concurrent, emit, merge_states, repeat, route,
};
use agentflow_protocol::{MemoryPort, MemoryQuery, ModelPort, ToolPort};
use agentflow_tools::{ToolDefinition, ToolOutput, ToolParameter, ToolRegistry, ToolUse, tool_step};
use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{Value, json};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::model::ScriptedModel;

#[derive(Debug, Parser)]
#[command(name = "agentflow-demo")]
#[command(about = "Run scripted agentflow pipelines and print their evidence trace")]
struct Cli {
    #[arg(long, default_value = "How do agents compose?")]
    question: String,
    /// Record evidence (default).
    #[arg(long, overrides_with = "no_trace")]
    trace: bool,
    /// Skip evidence recording.
    #[arg(long, overrides_with = "trace")]
    no_trace: bool,
    /// Upper bound on writer/reviewer exchanges.
    #[arg(long, default_value_t = 3)]
    rounds: usize,
    /// Log filter directive; falls back to RUST_LOG, then `info`.
    #[arg(long)]
    log_filter: Option<String>,
    /// Print the trace as JSON instead of an indented tree.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Default)]
struct Session {
    notes: WorkingContext<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log_filter {
        Some(directive) => EnvFilter::try_new(directive).context("invalid --log-filter")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).compact().init();

    let model: Arc<dyn ModelPort> = Arc::new(
        ScriptedModel::new()
            .on("Pick a search query", vec!["agent composition"])
            .on("Summarize", vec!["Agents chain steps and stop at the first non-continue control."])
            .on("Draft", vec!["Draft one.", "Draft two, tighter."])
            .on("Review", vec!["REVISE: tighten the intro", "APPROVED"]),
    );
    let memory = Arc::new(InMemoryStore::new());
    let tools = Arc::new(demo_tools());

    let env = Env::builder()
        .model(model)
        .tools(tools.clone())
        .memory(memory.clone())
        .trace(cli.trace || !cli.no_trace)
        .build();

    info!(question = %cli.question, "running research pipeline");
    let research = research_pipeline(cli.question.clone(), tools)?;
    let result = research
        .run_streaming(Session::default(), env.clone(), |chunk| {
            print!("{chunk}");
            if let Err(error) = std::io::stdout().flush() {
                warn!(%error, "failed to flush streamed chunk");
            }
        })
        .await?;
    println!();
    info!(
        control = %result.kind(),
        notes = result.state().notes.len(),
        "research pipeline finished"
    );

    let remembered = memory.query(MemoryQuery::matching("summary")).await?;
    info!(records = remembered.len(), "memory holds summaries");

    info!(rounds = cli.rounds, "running writer/reviewer loop");
    let multi_env = MultiEnv::new(env.clone(), team());
    let review = review_flow(cli.rounds)?;
    let outcome = review
        .run(MultiState::new("planner").with_message(cli.question.clone()), multi_env)
        .await?;
    info!(
        control = %outcome.kind(),
        messages = outcome.state().shared.len(),
        "review loop finished"
    );
    println!("{}", serde_json::to_string_pretty(&outcome.state().shared)?);

    if let Some(trace) = env.trace().filter(|trace| trace.is_enabled()) {
        print_trace(trace, cli.json)?;
    }
    Ok(())
}

fn demo_tools() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry
        .register_fn(
            "search",
            |call: ToolUse| async move {
                let query = call.argument_str("query").unwrap_or_default().to_owned();
                anyhow::Ok(format!("3 notes found for '{query}'"))
            },
            Some(
                ToolDefinition::new("search", "Search local notes")
                    .parameter(ToolParameter::required("query", "string", "text to look for")),
            ),
        )
        .register_fn(
            "word_count",
            |call: ToolUse| async move {
                let text = call.argument_str("text").unwrap_or_default();
                anyhow::Ok(text.split_whitespace().count().to_string())
            },
            Some(
                ToolDefinition::new("word_count", "Count words in a text")
                    .parameter(ToolParameter::required("text", "string", "text to count")),
            ),
        );
    registry
}

/// Plan a query, run it through the tool registry, then summarize and halt.
fn research_pipeline(question: String, tools: Arc<ToolRegistry>) -> Result<Agent<Session, String>> {
    let search = retry(tool_step::<Session, Env>(tools), RetryPolicy::default())?;
    Ok(Agent::<Session, String>::start(question)
        .then(plan)
        .then(search)
        .then(summarize))
}

async fn plan(state: Session, question: String, env: Env) -> Result<StepResult<Session, ToolUse>> {
    let model = env.require_model()?;
    let query = model
        .complete(&format!("Pick a search query for: {question}"))
        .await?;
    let notes = state.notes.append(format!("plan: {query}"));
    Ok(StepResult::proceed(
        Session { notes },
        ToolUse::new("search", json!({ "query": query.trim() })),
    ))
}

async fn summarize(state: Session, found: ToolOutput, env: Env) -> Result<StepResult<Session, String>> {
    let model = env.require_model()?;
    let prompt = format!("Summarize: {}", found.content);
    let summary = match env.sink() {
        Some(sink) => model.stream_complete(&prompt, sink.as_ref()).await?,
        None => model.complete(&prompt).await?,
    };
    if let Some(memory) = env.memory() {
        memory.append(vec![json!({ "summary": summary })]).await?;
    }
    let notes = state
        .notes
        .append(format!("summary: {summary}"))
        .trim(keep_last(8));
    Ok(StepResult::halt(Session { notes }, summary))
}

fn team() -> AgentRegistry {
    AgentRegistry::new()
        .with("writer", writer())
        .with("reviewer", reviewer())
}

fn fetcher(source: &'static str) -> MultiAgent {
    Agent::start(Value::Null).then(move |state: MultiState, _value, env: MultiEnv| async move {
        let tools = env.env().require_tools()?;
        let found = tools.call("search", json!({ "query": source })).await?;
        anyhow::Ok(StepResult::proceed(
            state.with_message(json!({ "source": source, "found": found })),
            found,
        ))
    })
}

fn writer() -> MultiAgent {
    Agent::start(Value::Null).then(|state: MultiState, _value, env: MultiEnv| async move {
        let model = env.env().require_model()?;
        let draft = model
            .complete(&format!("Draft from {} messages", state.shared.len()))
            .await?;
        let drafts = state
            .local("writer")
            .and_then(|local| local.get("drafts"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let next = state
            .with_current("writer")
            .with_message(json!({ "writer": draft }))
            .with_local("writer", json!({ "drafts": drafts + 1 }));
        anyhow::Ok(StepResult::proceed(next, json!(draft)))
    })
}

fn reviewer() -> MultiAgent {
    Agent::start(Value::Null).then(|state: MultiState, _value, env: MultiEnv| async move {
        let model = env.env().require_model()?;
        let draft = state.last_message().cloned().unwrap_or(Value::Null);
        let verdict = model.complete(&format!("Review: {draft}")).await?;
        let next = state
            .with_current("reviewer")
            .with_message(json!({ "reviewer": verdict }));
        if verdict.starts_with("APPROVED") {
            return anyhow::Ok(StepResult::halt(next, json!(verdict)));
        }
        anyhow::Ok(StepResult::proceed(next, json!(verdict)))
    })
}

/// Gather sources concurrently, announce, then alternate writer and reviewer
/// until the reviewer approves or the exchange budget runs out.
fn review_flow(rounds: usize) -> Result<MultiAgent> {
    let gather = concurrent(vec![fetcher("docs"), fetcher("issues")], merge_states);
    let alternate = route(|state: &MultiState| {
        let next = if state.current == "writer" { "reviewer" } else { "writer" };
        next.to_owned()
    });
    let exchanges = repeat(alternate, rounds.saturating_mul(2))
        .context("--rounds must be at least 1")?;

    Ok(Agent::new(move |state: MultiState, env: MultiEnv| {
        let gather = gather.clone();
        let exchanges = exchanges.clone();
        async move {
            let gathered = gather.run(state, env.clone()).await?;
            let announced = emit("sources gathered")
                .run(gathered.into_state(), env.clone())
                .await?;
            exchanges.run(announced.into_state(), env).await
        }
    }))
}

fn print_trace(trace: &Trace, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(&trace.events())?);
    } else {
        print!("{}", trace.render());
    }
    info!(events = trace.len(), "trace printed");
    Ok(())
}
