use std::io::{self, BufRead, IsTerminal, Write};
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

use github_viewer::app::{
    App, DownloadOptions, DownloadResult, DownloadsResult, LocationResult, SearchResult,
};
use github_viewer::archive::FsArchiveWriter;
use github_viewer::config::{ConfigLoader, ResolvedConfig};
use github_viewer::domain::{OwnerLogin, RepositoryRecord};
use github_viewer::error::ViewerError;
use github_viewer::github::GithubHttpClient;
use github_viewer::output::{JsonOutput, OutputMode};
use github_viewer::store::Store;
use github_viewer::tui::Tui;

#[derive(Parser)]
#[command(name = "ghv")]
#[command(about = "Browse GitHub users' repositories and download their source archives")]
#[command(version, author)]
struct Cli {
    /// Path to a github-viewer.json config file
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    non_interactive: bool,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List a user's repositories (cache first, then GitHub)")]
    Search(SearchArgs),
    #[command(about = "Download a repository's zip archive")]
    Download(DownloadArgs),
    #[command(about = "List downloaded repositories whose archives still exist")]
    Downloads,
    #[command(about = "Show or change the storage location for archives")]
    Location(LocationArgs),
}

#[derive(Args)]
struct SearchArgs {
    login: String,
}

#[derive(Args)]
struct DownloadArgs {
    login: String,
    project: String,

    /// Directory to store the archive in; also saved as the new location
    #[arg(long)]
    dest: Option<Utf8PathBuf>,

    /// Unpack the archive next to the zip file
    #[arg(long)]
    extract: bool,
}

#[derive(Args)]
struct LocationArgs {
    #[command(subcommand)]
    command: LocationCommand,
}

#[derive(Subcommand)]
enum LocationCommand {
    #[command(about = "Save a directory as the storage location")]
    Set { dir: Utf8PathBuf },
    #[command(about = "Print the saved storage location")]
    Show,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<ViewerError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ViewerError) -> u8 {
    match error {
        ViewerError::RecordNotFound(_)
        | ViewerError::InvalidLogin(_)
        | ViewerError::MissingStorageLocation
        | ViewerError::ConfigRead(_)
        | ViewerError::ConfigParse(_) => 2,
        ViewerError::GithubHttp(_) | ViewerError::Unreachable(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive || !io::stdin().is_terminal() {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let store = open_store(&config)?;
    let runtime = Runtime::new().into_diagnostic()?;
    let app = App::build(config, store)?;

    let result = match cli.command {
        Some(command) => runtime.block_on(run_command(&app, command, cli.json, output_mode)),
        None => {
            if matches!(output_mode, OutputMode::Interactive) {
                let mut tui = Tui::new(&app);
                let outcome = tui.run(runtime.handle());
                drop(tui);
                outcome
            } else {
                Err(miette::Report::msg("command required (try `ghv --help`)"))
            }
        }
    };

    runtime.block_on(app.shutdown());
    result
}

fn open_store(config: &ResolvedConfig) -> Result<Store, ViewerError> {
    match &config.data_dir {
        Some(dir) => Ok(Store::new_with_root(dir.clone())),
        None => Store::new(),
    }
}

async fn run_command(
    app: &App<GithubHttpClient, FsArchiveWriter>,
    command: Commands,
    json: bool,
    output_mode: OutputMode,
) -> miette::Result<()> {
    match command {
        Commands::Search(args) => {
            let login: OwnerLogin = args.login.parse()?;
            let result = app.search(login).await;
            if json {
                JsonOutput::print_search(&result).into_diagnostic()?;
            } else {
                print_search(&result);
            }
            Ok(())
        }
        Commands::Download(args) => {
            let login: OwnerLogin = args.login.parse()?;
            let options = DownloadOptions {
                dest: args.dest,
                extract: args.extract,
            };
            let result = app
                .download(login, &args.project, options, || match output_mode {
                    OutputMode::Interactive => prompt_for_dir(),
                    OutputMode::NonInteractive => None,
                })
                .await?;
            if json {
                JsonOutput::print_download(&result).into_diagnostic()?;
            } else {
                print_download(&result);
            }
            Ok(())
        }
        Commands::Downloads => {
            let result = app.downloads().await?;
            if json {
                JsonOutput::print_downloads(&result).into_diagnostic()?;
            } else {
                print_downloads(&result);
            }
            Ok(())
        }
        Commands::Location(args) => {
            let result = match args.command {
                LocationCommand::Set { dir } => app.set_location(&dir)?,
                LocationCommand::Show => app.location()?,
            };
            if json {
                JsonOutput::print_location(&result).into_diagnostic()?;
            } else {
                print_location(&result);
            }
            Ok(())
        }
    }
}

fn prompt_for_dir() -> Option<Utf8PathBuf> {
    let mut stderr = io::stderr();
    write!(stderr, "No storage location saved. Directory for archives: ").ok()?;
    stderr.flush().ok()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).ok()?;
    let trimmed = line.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(Utf8PathBuf::from(trimmed))
    }
}

fn print_search(result: &SearchResult) {
    let cyan = "\x1b[36m";
    let yellow = "\x1b[33m";
    let reset = "\x1b[0m";

    println!(
        "{cyan}{} repositories for {}{reset}",
        result.repositories.len(),
        result.login
    );
    if result.unreachable && result.repositories.is_empty() {
        println!("{yellow}GitHub is unreachable{reset}");
    } else if result.unreachable {
        println!("{yellow}GitHub is unreachable, showing cached results{reset}");
    }
    for record in &result.repositories {
        print_record(record);
    }
}

fn print_downloads(result: &DownloadsResult) {
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!(
        "{cyan}{} downloaded repositories{reset}",
        result.repositories.len()
    );
    for record in &result.repositories {
        print_record(record);
    }
}

fn print_record(record: &RepositoryRecord) {
    let green = "\x1b[32m";
    let reset = "\x1b[0m";

    let marker = if record.is_downloaded() { "●" } else { "•" };
    println!(
        "{marker} {}/{} ★{}",
        record.owner_login, record.project_name, record.project_stars_count
    );
    if !record.project_description.is_empty() {
        println!("   {}", record.project_description);
    }
    if let Some(path) = &record.local_path {
        println!("{green}   {path}{reset}");
    }
}

fn print_download(result: &DownloadResult) {
    let green = "\x1b[32m";
    let reset = "\x1b[0m";

    for notification in &result.notifications {
        println!("{notification}");
    }
    if let Some(path) = &result.local_path {
        println!("{green}archive: {path}{reset}");
    }
    if let Some(dir) = &result.extracted_to {
        println!("{green}extracted: {dir}{reset}");
    }
}

fn print_location(result: &LocationResult) {
    match &result.directory {
        Some(dir) => println!("{dir}"),
        None => println!("no storage location saved"),
    }
}
