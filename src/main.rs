use std::error::Error;
use std::io::{self, IsTerminal};
use std::time::Duration;

use agentboard::export::{graph_to_dot, graph_to_outline, DotConfig};
use agentboard::gateway::server::StdioServer;
use agentboard::{
    ChangeFeed, Config, Database, DependencyGraph, DialogueDraft, EntryType, Milestone,
    MilestoneDraft, MilestoneFilter, MilestonePatch, MilestoneStatus, Task, TaskDraft, TaskFilter,
    TaskPatch, TaskStatus, ToolGateway, WatchBackend,
};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

/// Env var holding the log filter (`tracing_subscriber::EnvFilter` syntax)
const LOG_ENV: &str = "AGENTBOARD_LOG";

#[derive(Parser, Debug)]
#[command(name = "agentboard")]
#[command(author, version, about = "Shared project board for humans and AI agents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or migrate the board and print where it lives
    Init,

    /// Manage projects
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Manage milestones
    #[command(subcommand)]
    Milestone(MilestoneCommand),

    /// Manage tasks
    #[command(subcommand)]
    Task(TaskCommand),

    /// Manage milestone dependencies
    #[command(subcommand)]
    Dep(DepCommand),

    /// Log a dialogue entry on a milestone
    Log {
        /// Milestone ID
        milestone: i32,
        /// Entry text
        content: String,
        /// Entry type: decision, progress, blocker, note
        #[arg(short = 't', long = "type", default_value = "note")]
        entry_type: EntryType,
        /// Author (defaults to $AGENTBOARD_AUTHOR, then $USER)
        #[arg(short, long)]
        author: Option<String>,
    },

    /// Show dialogue for a milestone or a whole project
    Dialogue {
        /// Only this milestone
        #[arg(short, long)]
        milestone: Option<i32>,
        /// Project ID (when no milestone is given)
        #[arg(short, long, default_value = "1")]
        project: i32,
        /// Most recent entries to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Log the same entry on every milestone of a project
    Broadcast {
        /// Entry text
        content: String,
        #[arg(short, long, default_value = "1")]
        project: i32,
        #[arg(short = 't', long = "type", default_value = "note")]
        entry_type: EntryType,
        #[arg(short, long)]
        author: Option<String>,
    },

    /// Project summary: milestone and task counts, recent activity
    Status {
        #[arg(short, long, default_value = "1")]
        project: i32,
        /// Recent dialogue entries to include
        #[arg(short, long, default_value = "10")]
        recent: i64,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the dependency graph
    Graph {
        #[arg(short, long, default_value = "1")]
        project: i32,
        #[arg(short, long, value_enum, default_value = "outline")]
        format: GraphFormat,
        /// Title for DOT output
        #[arg(long)]
        title: Option<String>,
    },

    /// Print a line each time the board changes
    Watch {
        /// Override the configured backend
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,
        /// Exit after this many changes
        #[arg(long)]
        count: Option<u64>,
    },

    /// Serve the agent tool catalog as JSON-RPC on stdio
    Mcp,

    /// Start the read-only HTTP query API
    Serve {
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },

    /// Open the terminal dashboard
    Tui,

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
enum ProjectCommand {
    /// List projects
    List,
    /// Create a project
    Create {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Show one project
    Show { id: i32 },
    /// Delete a project with its milestones, tasks and dialogue
    Delete { id: i32 },
}

#[derive(Subcommand, Debug)]
enum MilestoneCommand {
    /// Create a milestone
    Add {
        name: String,
        #[arg(short, long, default_value = "1")]
        project: i32,
        #[arg(short, long, default_value = "not_started")]
        status: MilestoneStatus,
        #[arg(long, default_value = "0")]
        priority: i32,
        #[arg(short, long)]
        owner: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        /// Start date (free-form, e.g. 2026-03-01)
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    /// List milestones in priority order
    List {
        #[arg(short, long, default_value = "1")]
        project: i32,
        #[arg(short, long)]
        status: Option<MilestoneStatus>,
    },
    /// Show one milestone with its tasks
    Show { id: i32 },
    /// Update milestone fields
    Update {
        id: i32,
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long)]
        status: Option<MilestoneStatus>,
        #[arg(long)]
        priority: Option<i32>,
        #[arg(short, long)]
        owner: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    /// Delete a milestone with its tasks and dialogue
    Delete { id: i32 },
}

#[derive(Subcommand, Debug)]
enum TaskCommand {
    /// Create a task under a milestone
    Add {
        milestone: i32,
        title: String,
        #[arg(short, long)]
        assignee: Option<String>,
        #[arg(short, long, default_value = "pending")]
        status: TaskStatus,
    },
    /// List tasks
    List {
        #[arg(short, long)]
        milestone: Option<i32>,
        /// All tasks of a project (ignored with --milestone)
        #[arg(short, long)]
        project: Option<i32>,
        #[arg(short, long)]
        status: Option<TaskStatus>,
        #[arg(short, long)]
        assignee: Option<String>,
    },
    /// Update task fields
    Update {
        id: i32,
        #[arg(long)]
        title: Option<String>,
        #[arg(short, long)]
        status: Option<TaskStatus>,
        #[arg(short, long)]
        assignee: Option<String>,
    },
    /// Assign a task
    Assign { id: i32, assignee: String },
    /// Mark a task done
    Done { id: i32 },
    /// Delete a task
    Delete { id: i32 },
}

#[derive(Subcommand, Debug)]
enum DepCommand {
    /// Record that MILESTONE depends on DEPENDS_ON
    Add { milestone: i32, depends_on: i32 },
    /// List dependency edges of a project
    List {
        #[arg(short, long, default_value = "1")]
        project: i32,
    },
    /// Remove a dependency edge
    Remove { milestone: i32, depends_on: i32 },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum GraphFormat {
    Outline,
    Dot,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Auto,
    Native,
    Poll,
}

impl From<BackendArg> for WatchBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Auto => WatchBackend::Auto,
            BackendArg::Native => WatchBackend::Native,
            BackendArg::Poll => WatchBackend::Poll,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let config = Config::load();

    if let Err(e) = init_logging(&cli.command, &config) {
        eprintln!("{} failed to set up logging: {}", "Warning:".yellow(), e);
    }

    if let Err(e) = run(cli.command, &config) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Logs go to stderr, except under the TUI where they go to `board.log`
/// beside the state file
fn init_logging(command: &Command, config: &Config) -> Result<(), Box<dyn Error + Send + Sync>> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if matches!(command, Command::Tui) {
        let log_path = config.db_path().with_file_name("board.log");
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;
        builder
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .try_init()?;
    } else {
        builder
            .with_ansi(io::stderr().is_terminal())
            .with_writer(io::stderr)
            .try_init()?;
    }
    Ok(())
}

fn default_author(author: Option<String>) -> String {
    author
        .or_else(|| std::env::var("AGENTBOARD_AUTHOR").ok())
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "Human".to_string())
}

fn run(command: Command, config: &Config) -> Result<(), Box<dyn Error>> {
    if let Command::Completion { shell } = command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "agentboard", &mut io::stdout());
        return Ok(());
    }

    let db = Database::open_with(config)?;

    match command {
        Command::Completion { .. } => {}

        Command::Init => {
            println!("{} {}", "Board ready at".green(), db.path().display());
            for migration in db.applied_migrations()? {
                println!("  {} {} ({})", "✓".green(), migration.name, migration.applied_at.dimmed());
            }
        }

        Command::Project(cmd) => run_project(&db, cmd)?,
        Command::Milestone(cmd) => run_milestone(&db, cmd)?,
        Command::Task(cmd) => run_task(&db, cmd)?,
        Command::Dep(cmd) => run_dep(&db, cmd)?,

        Command::Log {
            milestone,
            content,
            entry_type,
            author,
        } => {
            let content = content.trim();
            if content.is_empty() {
                return Err("entry text must not be empty".into());
            }
            let entry = db.log_dialogue(&DialogueDraft::new(
                milestone,
                default_author(author),
                entry_type,
                content,
            ))?;
            println!(
                "{} {} entry {} on milestone {}",
                "Logged".green(),
                entry.entry_type,
                entry.id,
                milestone
            );
        }

        Command::Dialogue {
            milestone,
            project,
            limit,
        } => match milestone {
            Some(id) => {
                for entry in db.milestone_dialogue(id)?.iter().take(limit.max(0) as usize) {
                    print_entry(&entry.author, entry.entry_type, &entry.content, &entry.created_at, None);
                }
            }
            None => {
                for d in db.project_dialogue(project, limit)? {
                    let e = &d.entry;
                    print_entry(&e.author, e.entry_type, &e.content, &e.created_at, Some(&d.milestone_name));
                }
            }
        },

        Command::Broadcast {
            content,
            project,
            entry_type,
            author,
        } => {
            let content = content.trim();
            if content.is_empty() {
                return Err("entry text must not be empty".into());
            }
            let entries = db.broadcast_dialogue(project, &default_author(author), entry_type, content)?;
            println!(
                "{} to {} milestone(s)",
                "Broadcast".green(),
                entries.len()
            );
        }

        Command::Status {
            project,
            recent,
            json,
        } => {
            let status = db.project_status(project, recent)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
                return Ok(());
            }
            let name = db
                .get_project(project)?
                .map(|p| p.name)
                .unwrap_or_else(|| format!("project {}", project));
            println!("{}", name.bold());
            let counts = &status.milestones_by_status;
            println!(
                "  Milestones: {} total │ {} not started │ {} in progress │ {} done",
                status.total_milestones,
                counts.not_started,
                counts.in_progress.to_string().yellow(),
                counts.done.to_string().green()
            );
            let tasks: Vec<String> = status
                .task_counts
                .iter()
                .map(|(s, n)| format!("{} {}", n, s))
                .collect();
            if tasks.is_empty() {
                println!("  Tasks: none");
            } else {
                println!("  Tasks: {}", tasks.join(" │ "));
            }
            if !status.recent_activity.is_empty() {
                println!("\n{}", "Recent activity".bold());
                for d in &status.recent_activity {
                    let e = &d.entry;
                    print_entry(&e.author, e.entry_type, &e.content, &e.created_at, Some(&d.milestone_name));
                }
            }
        }

        Command::Graph {
            project,
            format,
            title,
        } => {
            let milestones = db.list_milestones(&MilestoneFilter {
                project_id: Some(project),
                status: None,
            })?;
            let deps = db.list_dependencies(project)?;
            let tasks = db.list_project_tasks(project)?;
            let graph = DependencyGraph::build(&milestones, &deps, &tasks);
            let layout = graph.layout(&config.graph);
            match format {
                GraphFormat::Outline => print!("{}", graph_to_outline(&graph, &layout)),
                GraphFormat::Dot => {
                    let dot_config = DotConfig {
                        title,
                        ..DotConfig::default()
                    };
                    print!("{}", graph_to_dot(&graph, &layout, &dot_config));
                }
                GraphFormat::Json => {
                    let payload = serde_json::json!({"graph": graph, "layout": layout});
                    println!("{}", serde_json::to_string_pretty(&payload)?);
                }
            }
        }

        Command::Watch { backend, count } => {
            let mut options = config.watch;
            if let Some(backend) = backend {
                options = options.with_backend(backend.into());
            }
            // A running watcher has no refetch of its own, so poll rather than go quiet
            let feed = ChangeFeed::start(db.path(), options)?.or_poll(db.path(), options)?;
            eprintln!(
                "Watching {} ({} backend). Ctrl+C to stop.",
                db.path().display(),
                feed.backend()
            );
            let mut seen = 0u64;
            loop {
                if count.is_some_and(|c| seen >= c) {
                    break;
                }
                if let Some(signal) = feed.recv_timeout(Duration::from_secs(1)) {
                    seen += 1;
                    println!(
                        "change {} at {}",
                        signal.seq,
                        chrono::Local::now().format("%H:%M:%S%.3f")
                    );
                }
            }
        }

        Command::Mcp => {
            let gateway = ToolGateway::with_config(db, config.gateway.clone());
            let mut server = StdioServer::new(gateway);
            server.run(io::stdin().lock(), io::stdout().lock())?;
        }

        Command::Serve { port } => agentboard::serve::start_server(db, config, port)?,

        Command::Tui => agentboard::tui::run(db, config)?,
    }

    Ok(())
}

fn run_project(db: &Database, cmd: ProjectCommand) -> Result<(), Box<dyn Error>> {
    match cmd {
        ProjectCommand::List => {
            for p in db.list_projects()? {
                println!("[{}] {}", p.id.to_string().cyan(), p.name);
            }
        }
        ProjectCommand::Create { name, description } => {
            let p = db.create_project(&name, description.as_deref())?;
            println!("{} project {}: {}", "Created".green(), p.id, p.name);
        }
        ProjectCommand::Show { id } => {
            let p = db.get_project(id)?.ok_or_else(|| format!("project {} not found", id))?;
            println!("[{}] {}", p.id.to_string().cyan(), p.name.bold());
            if let Some(description) = &p.description {
                println!("  {}", description);
            }
            println!("  created {}", p.created_at.dimmed());
        }
        ProjectCommand::Delete { id } => {
            if !db.delete_project(id)? {
                return Err(format!("project {} not found", id).into());
            }
            println!("{} project {}", "Deleted".green(), id);
        }
    }
    Ok(())
}

fn run_milestone(db: &Database, cmd: MilestoneCommand) -> Result<(), Box<dyn Error>> {
    match cmd {
        MilestoneCommand::Add {
            name,
            project,
            status,
            priority,
            owner,
            description,
            start,
            end,
        } => {
            let mut draft = MilestoneDraft::new(project, name)
                .with_status(status)
                .with_priority(priority);
            draft.owner = owner;
            draft.description = description;
            draft.start_date = start;
            draft.end_date = end;
            let m = db.create_milestone(&draft)?;
            println!("{} milestone {}: {}", "Created".green(), m.id, m.name);
        }
        MilestoneCommand::List { project, status } => {
            let milestones = db.list_milestones(&MilestoneFilter {
                project_id: Some(project),
                status,
            })?;
            let tasks = db.list_project_tasks(project)?;
            if milestones.is_empty() {
                println!("No milestones.");
            }
            for m in &milestones {
                print_milestone(m, &tasks);
            }
        }
        MilestoneCommand::Show { id } => {
            let m = db.get_milestone(id)?.ok_or_else(|| format!("milestone {} not found", id))?;
            let tasks = db.list_tasks(&TaskFilter {
                milestone_id: Some(id),
                ..TaskFilter::default()
            })?;
            print_milestone(&m, &tasks);
            if let Some(description) = &m.description {
                println!("  {}", description);
            }
            for t in &tasks {
                print_task(t);
            }
        }
        MilestoneCommand::Update {
            id,
            name,
            status,
            priority,
            owner,
            description,
            start,
            end,
        } => {
            let patch = MilestonePatch {
                name,
                status,
                priority,
                owner,
                description,
                start_date: start,
                end_date: end,
            };
            if patch.is_empty() {
                return Err("nothing to update".into());
            }
            let m = db
                .update_milestone(id, &patch)?
                .ok_or_else(|| format!("milestone {} not found", id))?;
            println!("{} milestone {} ({})", "Updated".green(), m.id, m.status);
        }
        MilestoneCommand::Delete { id } => {
            if !db.delete_milestone(id)? {
                return Err(format!("milestone {} not found", id).into());
            }
            println!("{} milestone {}", "Deleted".green(), id);
        }
    }
    Ok(())
}

fn run_task(db: &Database, cmd: TaskCommand) -> Result<(), Box<dyn Error>> {
    let update = |id: i32, patch: TaskPatch| -> Result<(), Box<dyn Error>> {
        let t = db
            .update_task(id, &patch)?
            .ok_or_else(|| format!("task {} not found", id))?;
        println!("{} task {} ({})", "Updated".green(), t.id, t.status);
        Ok(())
    };

    match cmd {
        TaskCommand::Add {
            milestone,
            title,
            assignee,
            status,
        } => {
            let mut draft = TaskDraft::new(milestone, title);
            draft.assignee = assignee;
            draft.status = status;
            let t = db.create_task(&draft)?;
            println!("{} task {}: {}", "Created".green(), t.id, t.title);
        }
        TaskCommand::List {
            milestone,
            project,
            status,
            assignee,
        } => {
            let tasks: Vec<Task> = match (milestone, project) {
                (None, Some(project)) => db
                    .list_project_tasks(project)?
                    .into_iter()
                    .filter(|t| status.map_or(true, |s| t.status == s))
                    .filter(|t| assignee.is_none() || t.assignee == assignee)
                    .collect(),
                _ => db.list_tasks(&TaskFilter {
                    milestone_id: milestone,
                    status,
                    assignee,
                })?,
            };
            if tasks.is_empty() {
                println!("No tasks.");
            }
            for t in &tasks {
                print_task(t);
            }
        }
        TaskCommand::Update {
            id,
            title,
            status,
            assignee,
        } => {
            let patch = TaskPatch {
                title,
                status,
                assignee,
                completed_at: None,
            };
            if patch.is_empty() {
                return Err("nothing to update".into());
            }
            update(id, patch)?;
        }
        TaskCommand::Assign { id, assignee } => update(
            id,
            TaskPatch {
                assignee: Some(assignee),
                ..TaskPatch::default()
            },
        )?,
        TaskCommand::Done { id } => update(id, TaskPatch::status(TaskStatus::Done))?,
        TaskCommand::Delete { id } => {
            if !db.delete_task(id)? {
                return Err(format!("task {} not found", id).into());
            }
            println!("{} task {}", "Deleted".green(), id);
        }
    }
    Ok(())
}

fn run_dep(db: &Database, cmd: DepCommand) -> Result<(), Box<dyn Error>> {
    match cmd {
        DepCommand::Add {
            milestone,
            depends_on,
        } => {
            db.add_dependency(milestone, depends_on)?;
            println!("{} {} depends on {}", "Linked".green(), milestone, depends_on);
        }
        DepCommand::List { project } => {
            let deps = db.list_dependencies(project)?;
            if deps.is_empty() {
                println!("No dependencies.");
            }
            for d in deps {
                println!("{} → {}", d.depends_on_milestone_id, d.milestone_id);
            }
        }
        DepCommand::Remove {
            milestone,
            depends_on,
        } => {
            if !db.remove_dependency(milestone, depends_on)? {
                return Err(format!("{} does not depend on {}", milestone, depends_on).into());
            }
            println!("{} {} → {}", "Removed".green(), depends_on, milestone);
        }
    }
    Ok(())
}

fn colored_status(status: MilestoneStatus) -> colored::ColoredString {
    match status {
        MilestoneStatus::NotStarted => status.as_str().normal(),
        MilestoneStatus::InProgress => status.as_str().yellow(),
        MilestoneStatus::Done => status.as_str().green(),
    }
}

fn print_milestone(m: &Milestone, tasks: &[Task]) {
    let mine: Vec<&Task> = tasks.iter().filter(|t| t.milestone_id == m.id).collect();
    let done = mine.iter().filter(|t| t.status == TaskStatus::Done).count();
    let owner = m.owner.as_deref().map(|o| format!(" @{}", o)).unwrap_or_default();
    println!(
        "[{}] {} {} p{}{} {}/{} tasks",
        m.id.to_string().cyan(),
        m.name.bold(),
        colored_status(m.status),
        m.priority,
        owner,
        done,
        mine.len()
    );
}

fn print_task(t: &Task) {
    let mark = match t.status {
        TaskStatus::Done => "[x]".green(),
        TaskStatus::InProgress => "[~]".yellow(),
        TaskStatus::Pending => "[ ]".normal(),
    };
    let assignee = t.assignee.as_deref().map(|a| format!(" @{}", a)).unwrap_or_default();
    println!("  {} {} {}{} (milestone {})", mark, t.id.to_string().cyan(), t.title, assignee, t.milestone_id);
}

fn print_entry(author: &str, entry_type: EntryType, content: &str, created_at: &str, milestone: Option<&str>) {
    let badge = match entry_type {
        EntryType::Decision => entry_type.as_str().magenta(),
        EntryType::Progress => entry_type.as_str().green(),
        EntryType::Blocker => entry_type.as_str().red(),
        EntryType::Note => entry_type.as_str().blue(),
    };
    let on = milestone.map(|m| format!(" on {}", m)).unwrap_or_default();
    println!("{} {}{} {}", badge.bold(), author.cyan(), on, created_at.dimmed());
    println!("    {}", content);
}
