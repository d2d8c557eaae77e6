use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use log::{debug, error, info, warn};
use sysd_monitor::{
    config::{Config, ConfigOverrides},
    monitor::{MonitorRow, MonitoredKind, UnitMonitor},
    settings::MemoryPreferences,
    systemd::{
        SystemdErrors,
        actions::PrivilegedActionExecutor,
        enums::{DbusLevel, UnitFileAction},
        sysdbus::{BusConnection, SystemdBus, watcher::SignalCoordinator},
    },
};
use tracing_subscriber::EnvFilter;

const WATCH_POLL: Duration = Duration::from_millis(250);

fn main() -> ExitCode {
    dotenv().ok();

    let timer = tracing_subscriber::fmt::time::ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_owned());
    tracing_subscriber::fmt()
        .with_timer(timer)
        .with_line_number(true)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = Config::from_env().with_overrides(ConfigOverrides {
        level: args.bus,
        helper: args.helper,
    });
    debug!("Config {config:?}");

    let command = args.command.unwrap_or(Command::List {
        kind: MonitoredKind::default(),
        all: false,
        search: None,
    });

    match run(command, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{error:?}");
            eprintln!("{}", describe_failure(&error));
            ExitCode::FAILURE
        }
    }
}

fn describe_failure(error: &SystemdErrors) -> String {
    if error.is_authorization_failure() {
        format!("Not authorized: {error}")
    } else {
        error.to_string()
    }
}

/// Lists and controls systemd services, timers and sockets
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Bus to talk to: system or session
    #[arg(short, long)]
    bus: Option<DbusLevel>,

    /// Path of the unit file helper
    #[arg(long)]
    helper: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum Command {
    /// List the units of a kind (the default)
    List {
        #[arg(default_value_t = MonitoredKind::Service)]
        kind: MonitoredKind,

        /// Include inactive units
        #[arg(short, long)]
        all: bool,

        /// Only rows containing this text
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Every property of a unit
    Info { unit: String },

    Start { unit: String },
    Stop { unit: String },
    Restart { unit: String },

    /// Enable the unit file through the elevated helper
    Enable { unit: String },

    /// Disable the unit file through the elevated helper
    Disable { unit: String },

    /// List then follow the manager signals until interrupted
    Watch {
        #[arg(default_value_t = MonitoredKind::Service)]
        kind: MonitoredKind,

        /// Include inactive units
        #[arg(short, long)]
        all: bool,
    },
}

fn run(command: Command, config: Config) -> Result<(), SystemdErrors> {
    let bus = Arc::new(BusConnection::new(config.level));
    bus.connect()?;

    let preferences = Arc::new(MemoryPreferences::new());

    let res = match command {
        Command::List { kind, all, search } => {
            let mut monitor =
                UnitMonitor::new(bus.clone(), config.helper, preferences).with_kind(kind);
            show_inactive(&monitor, all);
            if let Some(search) = search {
                monitor.set_search_term(search);
            }

            print_rows(&monitor, &monitor.visible_rows());
            println!("{}", monitor.status());
            Ok(())
        }
        Command::Info { unit } => {
            let monitor = UnitMonitor::new(bus.clone(), config.helper, preferences);
            let details = monitor
                .details(&unit)
                .ok_or_else(|| SystemdErrors::NotFound(unit.clone()))?;

            for (key, value) in details {
                println!("{key}: {value}");
            }
            Ok(())
        }
        Command::Start { unit } => unit_method(&bus, config, &unit, "Start"),
        Command::Stop { unit } => unit_method(&bus, config, &unit, "Stop"),
        Command::Restart { unit } => unit_method(&bus, config, &unit, "Restart"),
        Command::Enable { unit } => unit_file(&bus, config, &unit, UnitFileAction::Enable),
        Command::Disable { unit } => unit_file(&bus, config, &unit, UnitFileAction::Disable),
        Command::Watch { kind, all } => watch(&bus, config, preferences, kind, all),
    };

    bus.close();
    res
}

fn show_inactive<B: SystemdBus + 'static>(monitor: &UnitMonitor<B, MemoryPreferences>, all: bool) {
    if let Err(error) = monitor.set_show_inactive(all) {
        warn!("{error}");
    }
}

fn unit_method(
    bus: &Arc<BusConnection>,
    config: Config,
    unit: &str,
    method: &str,
) -> Result<(), SystemdErrors> {
    let executor = PrivilegedActionExecutor::new(bus.clone(), config.helper);
    let job = executor.unit_method(unit, method)?;
    println!("{method} {unit}: job {job}");
    Ok(())
}

fn unit_file(
    bus: &Arc<BusConnection>,
    config: Config,
    unit: &str,
    action: UnitFileAction,
) -> Result<(), SystemdErrors> {
    let executor = PrivilegedActionExecutor::new(bus.clone(), config.helper);
    let output = executor.change_unit_file_state(unit, action)?;
    print!("{output}");
    Ok(())
}

fn watch(
    bus: &Arc<BusConnection>,
    config: Config,
    preferences: Arc<MemoryPreferences>,
    kind: MonitoredKind,
    all: bool,
) -> Result<(), SystemdErrors> {
    let runtime = tokio::runtime::Runtime::new()?;

    let monitor = UnitMonitor::new(bus.clone(), config.helper, preferences)
        .with_kind(kind)
        .with_debounce(runtime.handle().clone(), config.debounce);
    show_inactive(&monitor, all);

    let coordinator = SignalCoordinator::new(bus.clone(), runtime.handle().clone());
    let subscribed = match monitor.refresh_trigger() {
        Some(trigger) => coordinator.subscribe(trigger),
        None => false,
    };

    if !subscribed {
        warn!("Not following the manager signals");
    }

    let mut last_rows = monitor.rows();
    print_rows(&monitor, &last_rows);
    println!("{}", monitor.status());

    runtime.block_on(async {
        let mut interval = tokio::time::interval(WATCH_POLL);
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Interrupted");
                    break;
                }
                _ = interval.tick() => {
                    let rows = monitor.rows();
                    if rows != last_rows {
                        print_rows(&monitor, &rows);
                        println!("{}", monitor.status());
                        last_rows = rows;
                    }
                }
            }
        }
    });

    coordinator.unsubscribe();
    Ok(())
}

fn print_rows<B: SystemdBus + 'static>(
    monitor: &UnitMonitor<B, MemoryPreferences>,
    rows: &[MonitorRow],
) {
    let columns = monitor.kind().columns();
    let visible = monitor.visible_columns();
    let indexes: Vec<usize> = columns
        .iter()
        .enumerate()
        .filter(|(_, column)| visible.contains(*column))
        .map(|(index, _)| index)
        .collect();

    println!("{}", visible.join("\t"));
    for row in rows {
        let cells: Vec<&str> = indexes
            .iter()
            .filter_map(|index| row.cells().get(*index))
            .map(String::as_str)
            .collect();
        println!("{}", cells.join("\t"));
    }
}
