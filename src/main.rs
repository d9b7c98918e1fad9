use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate, Timelike};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use timeblock_core::application::schedule_state::EntryList;
use timeblock_core::domain::models::TitleSegment;
use timeblock_core::domain::time::{format_date_title, format_time_range, parse_clock_text};
use timeblock_core::infrastructure::config::{
    save_api_url, save_time_window, update_settings, Settings, ThemePreference,
};
use timeblock_core::{
    bootstrap_workspace, init_logging, spawn_periodic_sync_with, EntryKey, InfraError,
    MutationOutcome, ParserOptions, RefreshOutcome, ReqwestNotesApiClient, ScheduleParser,
    ScheduledBlock, SyncEngine, UnmarkedHourPolicy,
};

type Engine = SyncEngine<ReqwestNotesApiClient>;

const UNSCHEDULED_SECTION: &str = "unscheduled";

#[derive(Parser)]
#[command(name = "timeblock", version, about = "Time-block day planner backed by a notes API")]
struct Cli {
    /// Workspace directory holding config/ and logs/ (defaults to the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Day to work on, as YYYY-MM-DD (defaults to today)
    #[arg(long, global = true)]
    date: Option<NaiveDate>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the timeline and the unscheduled list
    Show {
        /// Include remote block ids
        #[arg(long)]
        ids: bool,
    },
    /// Add a time block, e.g. `add 9:30 10:15 Deep work`
    Add {
        start: String,
        end: String,
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
    },
    /// Add an unscheduled checkbox item
    Todo {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Move a block to a new time range
    Move { id: String, start: String, end: String },
    /// Tick a task or item (untick with --undo)
    Check {
        id: String,
        #[arg(long)]
        undo: bool,
    },
    /// Put an unscheduled item on the timeline
    Schedule { id: String, start: String, end: String },
    /// Take a block off the timeline
    Unschedule { id: String },
    /// Delete a block or item
    Delete { id: String },
    /// Print the day, then refresh it periodically until Ctrl-C
    Watch,
    /// Update persisted settings and print them
    Config(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long)]
    api_url: Option<String>,
    /// Visible window, e.g. `--hours 7 20`
    #[arg(long, num_args = 2, value_names = ["START", "END"])]
    hours: Option<Vec<u32>>,
    /// Hours that fit on screen at once (1-24)
    #[arg(long)]
    hours_visible: Option<u32>,
    #[arg(long)]
    sync_interval: Option<u64>,
    #[arg(long, value_enum)]
    unmarked_hours: Option<UnmarkedHoursArg>,
    #[arg(long)]
    sidebar_collapsed: Option<bool>,
    /// Collapse or expand a sidebar section such as `unscheduled`
    #[arg(long, value_name = "SECTION")]
    toggle_section: Option<String>,
    #[arg(long, value_enum)]
    theme: Option<ThemeArg>,
}

#[derive(Clone, Copy, ValueEnum)]
enum UnmarkedHoursArg {
    /// `2-3` means 2 AM, `14-15` means 2 PM
    #[value(name = "24h")]
    TwentyFourHour,
    /// Bare hours are AM; bare 12 is midnight
    Morning,
}

impl From<UnmarkedHoursArg> for UnmarkedHourPolicy {
    fn from(value: UnmarkedHoursArg) -> Self {
        match value {
            UnmarkedHoursArg::TwentyFourHour => Self::TwentyFourHour,
            UnmarkedHoursArg::Morning => Self::AssumeMorning,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ThemeArg {
    System,
    Light,
    Dark,
}

impl From<ThemeArg> for ThemePreference {
    fn from(value: ThemeArg) -> Self {
        match value {
            ThemeArg::System => Self::System,
            ThemeArg::Light => Self::Light,
            ThemeArg::Dark => Self::Dark,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = match cli.root {
        Some(path) => path,
        None => std::env::current_dir().context("Failed to determine current directory")?,
    };
    let workspace = bootstrap_workspace(&root)
        .with_context(|| format!("Failed to prepare workspace at {}", root.display()))?;
    if let Err(error) = init_logging(&workspace.logs_dir) {
        eprintln!("warning: {error}");
    }

    let settings = workspace.settings;
    let command = match cli.command {
        Command::Config(args) => return cmd_config(&workspace.config_dir, args),
        command => command,
    };

    let engine = connect(&settings)?;
    let loaded = match cli.date {
        Some(date) => engine.go_to_date(date).await,
        None => engine.load_schedule().await,
    };
    loaded.context("Failed to load schedule")?;

    let policy = settings.unmarked_hours;
    match command {
        Command::Show { ids } => print_day(&engine, &settings, ids),
        Command::Add { start, end, title } => {
            let (start, end) = (clock(&start, policy)?, clock(&end, policy)?);
            report(&engine, engine.create_block(start, end, &title.join(" ")).await?)
        }
        Command::Todo { text } => {
            report(&engine, engine.create_unscheduled(&text.join(" ")).await?)
        }
        Command::Move { id, start, end } => {
            let (key, _) = find_entry(&engine, &id)?;
            let (start, end) = (clock(&start, policy)?, clock(&end, policy)?);
            report(&engine, engine.move_block(key, start, end).await?)
        }
        Command::Check { id, undo } => {
            let outcome = match find_entry(&engine, &id)? {
                (key, EntryList::Scheduled) => engine.toggle_task(key, !undo).await?,
                (key, EntryList::Unscheduled) => engine.toggle_unscheduled(key, !undo).await?,
            };
            report(&engine, outcome)
        }
        Command::Schedule { id, start, end } => {
            let (key, list) = find_entry(&engine, &id)?;
            if list != EntryList::Unscheduled {
                bail!("{id} is already on the timeline");
            }
            let (start, end) = (clock(&start, policy)?, clock(&end, policy)?);
            report(&engine, engine.schedule_item(key, start, end).await?)
        }
        Command::Unschedule { id } => {
            let (key, list) = find_entry(&engine, &id)?;
            if list != EntryList::Scheduled {
                bail!("{id} is not on the timeline");
            }
            report(&engine, engine.unschedule_block(key).await?)
        }
        Command::Delete { id } => {
            let (key, _) = find_entry(&engine, &id)?;
            report(&engine, engine.delete_entry(key).await?)
        }
        Command::Watch => watch(engine, &settings).await,
        Command::Config(_) => Ok(()),
    }
}

fn connect(settings: &Settings) -> Result<Arc<Engine>> {
    let api_url = settings
        .effective_api_url(|key| std::env::var(key).ok())
        .context("No API URL configured; run `timeblock config --api-url <URL>`")?;
    let client = ReqwestNotesApiClient::new(&api_url)?;
    let parser = ScheduleParser::new(ParserOptions {
        unmarked_hours: settings.unmarked_hours,
    });
    Ok(Arc::new(SyncEngine::new(Arc::new(client)).with_parser(parser)))
}

fn clock(text: &str, policy: UnmarkedHourPolicy) -> Result<f64> {
    match parse_clock_text(text, policy) {
        Some(value) => Ok(value),
        None => bail!("`{text}` is not a time of day (try 9, 9:30 or 2pm)"),
    }
}

fn find_entry(engine: &Engine, id: &str) -> Result<(EntryKey, EntryList)> {
    let snapshot = engine.snapshot()?;
    let scheduled = snapshot
        .scheduled
        .iter()
        .find(|entry| entry.item.id.as_deref() == Some(id))
        .map(|entry| (entry.key, EntryList::Scheduled));
    let unscheduled = || {
        snapshot
            .unscheduled_items
            .iter()
            .find(|entry| entry.item.id.as_deref() == Some(id))
            .map(|entry| (entry.key, EntryList::Unscheduled))
    };
    scheduled
        .or_else(unscheduled)
        .with_context(|| format!("No block with id {id} on this day (see `timeblock show --ids`)"))
}

fn report(engine: &Engine, outcome: MutationOutcome) -> Result<()> {
    let message = engine.status().current().map(|status| status.message);
    match outcome {
        MutationOutcome::Applied => {
            println!("{}", message.unwrap_or_else(|| "Done".to_string()));
            Ok(())
        }
        MutationOutcome::Skipped(reason) => bail!("Nothing to do: {reason}"),
        MutationOutcome::RolledBack { error } => {
            Err(error).context(message.unwrap_or_else(|| "Sync failed".to_string()))
        }
    }
}

fn render_title(block: &ScheduledBlock) -> String {
    block
        .title_segments()
        .into_iter()
        .map(|segment| match segment {
            TitleSegment::Text { text } => text,
            TitleSegment::Link { text, url } => format!("{text} <{url}>"),
        })
        .collect()
}

fn print_day(engine: &Engine, settings: &Settings, show_ids: bool) -> Result<()> {
    let snapshot = engine.snapshot()?;
    let date = engine.current_date()?;
    let window = settings.time_window();
    let now = Local::now();
    let now_decimal = f64::from(now.hour()) + f64::from(now.minute()) / 60.0;
    let is_today = date == engine.today();
    let id_suffix = |id: Option<&str>| {
        if show_ids {
            format!("  ({})", id.unwrap_or("pending"))
        } else {
            String::new()
        }
    };

    println!("{}", format_date_title(date));
    if snapshot.scheduled.is_empty() {
        println!("  no time blocks");
    }
    for entry in &snapshot.scheduled {
        let block = &entry.item;
        let marker = if is_today && block.is_current(now_decimal) { '>' } else { ' ' };
        let checkbox = match (block.is_task, block.checked) {
            (false, _) => "",
            (true, true) => "[x] ",
            (true, false) => "[ ] ",
        };
        let outside = if window.contains(block.start) && window.contains(block.end) {
            ""
        } else {
            "  (outside view)"
        };
        println!(
            "{marker} {:<21} {checkbox}{}  [{}]{outside}{}",
            format_time_range(block.start, block.end),
            render_title(block),
            block.category.as_str(),
            id_suffix(block.id.as_deref()),
        );
    }

    println!();
    if settings.is_section_collapsed(UNSCHEDULED_SECTION) {
        println!("Unscheduled ({} hidden)", snapshot.unscheduled_items.len());
        return Ok(());
    }
    println!("Unscheduled");
    if snapshot.unscheduled_items.is_empty() {
        println!("  nothing here");
    }
    for entry in &snapshot.unscheduled_items {
        let item = &entry.item;
        let checkbox = if item.checked { "[x]" } else { "[ ]" };
        println!("  {checkbox} {}{}", item.text, id_suffix(item.id.as_deref()));
    }
    Ok(())
}

async fn watch(engine: Arc<Engine>, settings: &Settings) -> Result<()> {
    print_day(&engine, settings, false)?;
    let period = Duration::from_secs(settings.sync_interval_seconds.max(1));
    let periodic = spawn_periodic_sync_with(Arc::clone(&engine), period, {
        let engine = Arc::clone(&engine);
        let settings = settings.clone();
        move |result| match result {
            Ok(RefreshOutcome::Loaded(_)) => {
                println!();
                if let Err(error) = print_day(&engine, &settings, false) {
                    eprintln!("error: {error}");
                }
            }
            Ok(RefreshOutcome::Skipped(reason)) => println!("refresh skipped: {reason:?}"),
            Err(error) => eprintln!("refresh failed: {error}"),
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    periodic.stop().await;
    Ok(())
}

fn cmd_config(config_dir: &Path, args: ConfigArgs) -> Result<()> {
    if let Some(url) = args.api_url {
        save_api_url(config_dir, &url)?;
    }
    if let Some(hours) = args.hours {
        let [start, end] = <[u32; 2]>::try_from(hours.as_slice())
            .context("--hours takes exactly two values")?;
        save_time_window(config_dir, start, end)?;
    }
    let settings = update_settings(config_dir, |settings| {
        if let Some(hours) = args.hours_visible {
            settings.set_hours_visible(hours)?;
        }
        if let Some(seconds) = args.sync_interval {
            if seconds == 0 {
                return Err(InfraError::InvalidConfig(
                    "syncIntervalSeconds must be positive".to_string(),
                ));
            }
            settings.sync_interval_seconds = seconds;
        }
        if let Some(policy) = args.unmarked_hours {
            settings.unmarked_hours = policy.into();
        }
        if let Some(collapsed) = args.sidebar_collapsed {
            settings.sidebar_collapsed = collapsed;
        }
        if let Some(section) = &args.toggle_section {
            settings.toggle_section(section);
        }
        if let Some(theme) = args.theme {
            settings.theme = theme.into();
        }
        Ok(())
    })?;
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}
