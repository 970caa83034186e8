//! Command-line surface (§6 "CLI surface").
//!
//! A chat REPL with an implicit `/quit`, plus administrative subcommands
//! parallel to the stores the core persists: task listing, notification
//! listing, insight review, and fact recall. Built with `clap` for the
//! subcommand/flag surface and a plain `std::io::stdin` line loop for the
//! REPL body, the way the teacher's own `src/cli.rs` combines both.

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::{self, Write};
use uuid::Uuid;

use crate::learning::InsightStatus;
use crate::notifications::NotificationStatus;
use crate::tasks::TaskStatus;
use crate::AgentCore;

#[derive(Parser)]
#[command(name = "agentcore")]
#[command(about = "A self-evolving agent core: plan, execute, and critic-gated self-modification")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file path
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<String>,

    /// Run a single prompt non-interactively and exit
    #[arg(short = 'p', long, value_name = "PROMPT")]
    pub prompt: Option<String>,

    /// Quiet mode (suppress the startup banner)
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open an interactive chat session
    #[command(alias = "c")]
    Chat,

    /// Submit a single goal and exit
    #[command(alias = "r")]
    Run {
        /// The goal to pursue
        goal: String,
    },

    /// List active and archived tasks
    Tasks {
        /// Include archived tasks in the listing
        #[arg(long)]
        archived: bool,
    },

    /// List notifications
    #[command(alias = "n")]
    Notifications {
        /// Only show unread notifications
        #[arg(long)]
        unread: bool,

        /// Maximum number to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// List learned facts
    #[command(alias = "f")]
    Facts,

    /// Review the next pending actionable insight and act on it
    Review,

    /// List actionable insights awaiting manual review
    Insights,

    /// Approve an insight pending manual review, dispatching it anyway
    Approve {
        /// The insight id to approve
        insight_id: Uuid,
    },

    /// Deny an insight pending manual review
    Deny {
        /// The insight id to deny
        insight_id: Uuid,
    },
}

pub async fn run() -> Result<()> {
    crate::telemetry::init_tracing();

    let cli = Cli::parse();
    let config = crate::config::Config::load(cli.config.as_deref())?;
    let core = AgentCore::new(&config)?;

    if let Some(prompt) = cli.prompt {
        return run_goal(&core, &prompt, &config).await;
    }

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => interactive(&core, &config, cli.quiet).await,
        Commands::Run { goal } => run_goal(&core, &goal, &config).await,
        Commands::Tasks { archived } => {
            print_tasks(&core, archived);
            Ok(())
        }
        Commands::Notifications { unread, limit } => {
            print_notifications(&core, unread, limit);
            Ok(())
        }
        Commands::Facts => {
            print_facts(&core);
            Ok(())
        }
        Commands::Review => review_next(&core).await,
        Commands::Insights => {
            print_insights(&core);
            Ok(())
        }
        Commands::Approve { insight_id } => set_insight_status(&core, insight_id, InsightStatus::New),
        Commands::Deny { insight_id } => set_insight_status(&core, insight_id, InsightStatus::ActionFailed),
    }
}

async fn interactive(core: &AgentCore, config: &crate::config::Config, quiet: bool) -> Result<()> {
    if !quiet {
        println!("{}", "agent core — type a goal, or /quit to exit".bold());
    }

    let stdin = io::stdin();
    loop {
        print!("{} ", ">".cyan());
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break; // EOF
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" || line == "/exit" {
            break;
        }

        if let Err(e) = run_goal(core, line, config).await {
            eprintln!("{} {}", "error:".red().bold(), e);
        }
    }

    Ok(())
}

async fn run_goal(core: &AgentCore, goal: &str, config: &crate::config::Config) -> Result<()> {
    let (success, summary) = core.orchestrator.handle_prompt(goal, &config.project_root).await?;
    println!("{}", summary);
    if !success {
        std::process::exit(1);
    }
    Ok(())
}

fn print_tasks(core: &AgentCore, archived: bool) {
    let active = core.task_manager.list_active_tasks(None, None);
    if active.is_empty() {
        println!("no active tasks");
    } else {
        println!("{}", "active tasks:".bold());
        for task in &active {
            println!("  {} [{:?}] {}", task.task_id.to_string().dimmed(), task.status, task.description);
        }
    }

    if archived {
        let archived = core.task_manager.list_archived_tasks(50);
        println!("\n{}", "archived tasks:".bold());
        for task in &archived {
            let glyph = if task.status == TaskStatus::CompletedSuccessfully { "\u{2713}".green() } else { "\u{2717}".red() };
            println!("  {} {} [{:?}] {}", glyph, task.task_id.to_string().dimmed(), task.status, task.description);
        }
    }
}

fn print_notifications(core: &AgentCore, unread: bool, limit: usize) {
    let status_filter = if unread { Some(NotificationStatus::Unread) } else { None };
    let notifications = core.notifications.get_notifications(status_filter, None, limit);
    if notifications.is_empty() {
        println!("no notifications");
        return;
    }
    for n in &notifications {
        println!("  [{:?}] {} — {}", n.event_type, n.timestamp.format("%H:%M:%S"), n.summary_message);
    }
}

fn print_facts(core: &AgentCore) {
    let facts = core.facts.all();
    if facts.is_empty() {
        println!("no learned facts");
        return;
    }
    for fact in &facts {
        println!("  ({}) {}", fact.category, fact.text);
    }
}

fn print_insights(core: &AgentCore) {
    let insights = core.learning_agent.insights().all();
    let pending: Vec<_> = insights.iter().filter(|i| i.status == InsightStatus::PendingManualReview).collect();
    if pending.is_empty() {
        println!("no insights pending manual review");
        return;
    }
    for insight in pending {
        println!("  {} [{:?}] {}", insight.insight_id, insight.insight_type, insight.description);
    }
}

async fn review_next(core: &AgentCore) -> Result<()> {
    match core.learning_agent.review_and_propose_next_action().await? {
        None => println!("no pending insights"),
        Some(true) => println!("{} insight action succeeded", "\u{2713}".green()),
        Some(false) => println!("{} insight action failed or needs manual review", "\u{2717}".red()),
    }
    Ok(())
}

fn set_insight_status(core: &AgentCore, insight_id: Uuid, status: InsightStatus) -> Result<()> {
    core.learning_agent.insights().set_status(insight_id, status)?;
    println!("insight {} updated", insight_id);
    Ok(())
}
