use clap::{Parser, Subcommand, ValueEnum};
use mr_insights::config::AppConfig;
use mr_insights::db::{self, pool::DbPool};
use mr_insights::error::AppError;
use mr_insights::models::{project, sync_log};
use mr_insights::services::analytics::{self, StatsFilter};
use mr_insights::services::gitlab_client::{GitLabClient, GitLabClientConfig};
use mr_insights::services::squads;
use mr_insights::services::sync_engine::{SyncConfig, SyncEngine, SyncReport, DEFAULT_PER_PAGE};
use mr_insights::services::MergeRequestSource;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "mr-insights")]
#[command(about = "Mirror GitLab merge requests and report review latency", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "pretty")]
    output: OutputFormat,

    /// GitLab instance URL
    #[arg(long, global = true, env = "GITLAB_URL", default_value = "https://gitlab.com")]
    gitlab_url: String,

    /// Personal access token with read_api scope
    #[arg(long, global = true, env = "GITLAB_TOKEN", hide_env_values = true, default_value = "")]
    token: String,

    /// Group whose projects `sync` mirrors
    #[arg(long, global = true, env = "GITLAB_GROUP")]
    group: Option<String>,

    /// SQLite database file
    #[arg(long, global = true, env = "MR_INSIGHTS_DB", default_value = db::DEFAULT_DB_FILE)]
    db: PathBuf,

    /// Items per page for GitLab requests (1-100)
    #[arg(long, global = true, default_value_t = DEFAULT_PER_PAGE)]
    per_page: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync the configured group, or a single project
    Sync {
        /// Project ID or `namespace/path`
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Search groups
    Groups {
        /// Name or path fragment
        search: String,
    },

    /// List the projects of a GitLab group, or the mirrored ones
    Projects {
        /// Group ID; omit to list projects already in the database
        group_id: Option<i64>,
    },

    /// Review latency per squad
    Stats {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Merge requests per squad whose first comment came after a threshold
    LateComments {
        #[command(flatten)]
        filter: FilterArgs,

        /// Threshold in minutes
        #[arg(short, long)]
        threshold: f64,
    },

    /// Assign squads to merge requests by author
    AssignSquad {
        /// Project ID
        #[arg(short, long)]
        project: i64,

        /// Author username
        #[arg(long, requires = "squad", conflicts_with = "file")]
        author: Option<String>,

        /// Squad name
        #[arg(long, requires = "author")]
        squad: Option<String>,

        /// File with one `username,squad` per line
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Show recent sync log entries
    Log {
        /// Maximum number of entries
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
}

#[derive(clap::Args)]
struct FilterArgs {
    /// Project ID
    #[arg(short, long)]
    project: i64,

    /// First day included (YYYY-MM-DD)
    #[arg(long)]
    start: Option<String>,

    /// Last day included (YYYY-MM-DD)
    #[arg(long)]
    end: Option<String>,

    /// Only this squad
    #[arg(long)]
    squad: Option<String>,
}

impl From<FilterArgs> for StatsFilter {
    fn from(args: FilterArgs) -> Self {
        StatsFilter {
            project_id: args.project,
            start_date: args.start,
            end_date: args.end,
            squad: args.squad,
        }
    }
}

impl Cli {
    fn app_config(&self) -> AppConfig {
        AppConfig {
            gitlab: GitLabClientConfig {
                base_url: self.gitlab_url.clone(),
                token: self.token.clone(),
                ..Default::default()
            },
            sync: SyncConfig {
                per_page: self.per_page,
            },
            db_path: self.db.clone(),
            group: self.group.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = cli.app_config();
    let output = cli.output;

    match cli.command {
        Commands::Sync { project } => {
            config.validate()?;
            let pool = db::initialize(&config.db_path).await?;
            let client = GitLabClient::new(config.gitlab.clone())?;
            let engine = SyncEngine::new(pool, client, config.sync.clone());

            let report = match project {
                Some(project) => engine.sync_project_by_ref(&project).await?,
                None => engine.sync_group(config.require_group()?).await?,
            };
            print_report(output, &report)?;
        }
        Commands::Groups { search } => {
            config.validate()?;
            let client = GitLabClient::new(config.gitlab.clone())?;
            let groups = client.list_groups(&search).await?;
            match output {
                OutputFormat::Json => print_json(&groups)?,
                OutputFormat::Pretty => {
                    for g in &groups {
                        println!(
                            "{:>8}  {:<30}  {}",
                            g.id,
                            g.name,
                            g.full_path.as_deref().unwrap_or(&g.path)
                        );
                    }
                }
            }
        }
        Commands::Projects { group_id: None } => {
            let pool = open_store(&config).await?;
            let projects = project::list_projects(&pool).await?;
            match output {
                OutputFormat::Json => print_json(&projects)?,
                OutputFormat::Pretty => {
                    for p in &projects {
                        println!("{:>8}  {}", p.id, p.path_with_namespace);
                    }
                }
            }
        }
        Commands::Projects {
            group_id: Some(group_id),
        } => {
            config.validate()?;
            let client = GitLabClient::new(config.gitlab.clone())?;
            let projects = client.list_group_projects(group_id).await?;
            match output {
                OutputFormat::Json => print_json(&projects)?,
                OutputFormat::Pretty => {
                    for p in &projects {
                        println!("{:>8}  {}", p.id, p.path_with_namespace);
                    }
                }
            }
        }
        Commands::Stats { filter } => {
            let pool = open_store(&config).await?;
            let mut stats = analytics::query_stats(&pool, &filter.into()).await?;
            for s in &mut stats {
                s.avg_time_to_first_comment = s.avg_time_to_first_comment.map(round2);
                s.avg_time_to_approval = s.avg_time_to_approval.map(round2);
                s.avg_time_to_merge = s.avg_time_to_merge.map(round2);
            }
            match output {
                OutputFormat::Json => print_json(&stats)?,
                OutputFormat::Pretty => {
                    println!(
                        "{:<20} {:>6} {:>7} {:>14} {:>14} {:>14}",
                        "squad", "mrs", "merged", "1st comment", "approval", "merge"
                    );
                    for s in &stats {
                        println!(
                            "{:<20} {:>6} {:>7} {:>14} {:>14} {:>14}",
                            s.squad,
                            s.total_mrs,
                            s.merged_mrs,
                            minutes(s.avg_time_to_first_comment),
                            minutes(s.avg_time_to_approval),
                            minutes(s.avg_time_to_merge)
                        );
                    }
                }
            }
        }
        Commands::LateComments { filter, threshold } => {
            let pool = open_store(&config).await?;
            let counts = analytics::query_late_comments(&pool, &filter.into(), threshold).await?;
            match output {
                OutputFormat::Json => print_json(&counts)?,
                OutputFormat::Pretty => {
                    for c in &counts {
                        println!("{:<20} {:>6}", c.squad, c.late_comments);
                    }
                }
            }
        }
        Commands::AssignSquad {
            project,
            author,
            squad,
            file,
        } => {
            let pool = open_store(&config).await?;
            let changed = match (author, squad, file) {
                (Some(author), Some(squad), None) => {
                    squads::assign_squad_by_author(&pool, project, &author, &squad).await?
                }
                (None, None, Some(file)) => {
                    squads::assign_squads_from_file(&pool, project, &file).await?
                }
                _ => {
                    return Err(AppError::invalid_input(
                        "Pass either --author with --squad, or --file",
                    ))
                }
            };
            match output {
                OutputFormat::Json => print_json(&serde_json::json!({ "updated": changed }))?,
                OutputFormat::Pretty => println!("{} merge request(s) updated", changed),
            }
        }
        Commands::Log { limit } => {
            let pool = open_store(&config).await?;
            let entries = sync_log::get_sync_log(&pool, limit).await?;
            match output {
                OutputFormat::Json => print_json(&entries)?,
                OutputFormat::Pretty => {
                    for e in &entries {
                        println!(
                            "{}  {:<14} {:<8} {}",
                            format_timestamp(e.timestamp),
                            e.operation,
                            e.status,
                            e.message.as_deref().unwrap_or("")
                        );
                    }
                }
            }
        }
    }

    Ok(())
}

async fn open_store(config: &AppConfig) -> Result<DbPool, AppError> {
    Ok(db::initialize(&config.db_path).await?)
}

fn print_report(output: OutputFormat, report: &SyncReport) -> Result<(), AppError> {
    match output {
        OutputFormat::Json => print_json(report),
        OutputFormat::Pretty => {
            println!(
                "{} project(s), {} merge request(s) fetched in {} ms",
                report.projects, report.fetched, report.duration_ms
            );
            println!(
                "  inserted {}, updated {}, unchanged {}, merged skipped {}",
                report.inserted, report.updated, report.skipped_unchanged, report.skipped_terminal
            );
            for error in &report.errors {
                println!("  error: {}", error);
            }
            Ok(())
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn minutes(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".to_string())
}

fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}
