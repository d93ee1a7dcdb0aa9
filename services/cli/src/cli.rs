use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use decree_engine::config::AppConfig;
use decree_engine::error::AppError;
use decree_engine::rules::ScoreStatus;
use decree_engine::telemetry;

use crate::commands;
use crate::infra::Workspace;

#[derive(Parser, Debug)]
#[command(
    name = "decree-engine",
    about = "Manage payroll decree rules and simulate decree line items",
    version
)]
struct Cli {
    /// Catalog snapshot to operate on (defaults to DECREE_CATALOG_PATH)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute decree line items for an effective date
    Simulate(SimulateArgs),
    /// Manage scores in the catalog
    Score {
        #[command(subcommand)]
        command: ScoreCommand,
    },
    /// Report conditions and formulas that fail to parse or read names no linked variable binds
    Lint,
}

#[derive(Subcommand, Debug)]
enum ScoreCommand {
    /// Create a draft score from a JSON file
    Add(AddScoreArgs),
    /// List scores, optionally filtered
    List(ListScoresArgs),
    /// Activate a draft score, superseding its active siblings
    Publish(ScoreArgs),
    /// Copy a score into a new draft
    Duplicate(ScoreArgs),
}

#[derive(Args, Debug)]
pub(crate) struct SimulateArgs {
    /// Effective date of the decree (YYYY-MM-DD)
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) date: Option<chrono::NaiveDate>,
    /// Restrict candidate scores to one category
    #[arg(long)]
    pub(crate) category: Option<String>,
    /// Variable input as NAME=VALUE; repeat for several variables
    #[arg(long = "value", value_parser = crate::infra::parse_assignment)]
    pub(crate) values: Vec<(String, f64)>,
    /// Full simulation request as JSON; flags override its fields
    #[arg(long)]
    pub(crate) request: Option<PathBuf>,
    /// Resolve variable inputs from this person's recorded attributes
    #[arg(long)]
    pub(crate) person: Option<String>,
    /// Store the resulting values as a decree for `--person`
    #[arg(long, requires = "person")]
    pub(crate) archive: bool,
    /// Decree type recorded with archived values
    #[arg(long, requires = "archive")]
    pub(crate) hokm_type: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct AddScoreArgs {
    /// JSON file holding the score draft
    #[arg(long)]
    pub(crate) file: PathBuf,
    /// Variable ids the score's formula reads
    #[arg(long = "variable")]
    pub(crate) variables: Vec<String>,
}

#[derive(Args, Debug)]
pub(crate) struct ListScoresArgs {
    #[arg(long)]
    pub(crate) category: Option<String>,
    #[arg(long, value_enum)]
    pub(crate) status: Option<StatusArg>,
}

#[derive(Args, Debug)]
pub(crate) struct ScoreArgs {
    /// Identifier of the score
    pub(crate) id: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub(crate) enum StatusArg {
    Draft,
    Active,
    Superseded,
}

impl From<StatusArg> for ScoreStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Draft => ScoreStatus::Draft,
            StatusArg::Active => ScoreStatus::Active,
            StatusArg::Superseded => ScoreStatus::Superseded,
        }
    }
}

pub(crate) fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let workspace = Workspace::open(&config, cli.catalog.as_deref())?;
    match cli.command {
        Command::Simulate(args) => commands::simulate(&workspace, args),
        Command::Score { command } => match command {
            ScoreCommand::Add(args) => commands::add_score(&workspace, args),
            ScoreCommand::List(args) => commands::list_scores(&workspace, args),
            ScoreCommand::Publish(args) => commands::publish(&workspace, args),
            ScoreCommand::Duplicate(args) => commands::duplicate(&workspace, args),
        },
        Command::Lint => commands::lint(&workspace),
    }
}
