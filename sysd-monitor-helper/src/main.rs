use std::{
    fmt::{self, Display, Formatter},
    io::Write,
    process::{Command, ExitCode},
};

use clap::Parser;
use log::{debug, info, warn};

const SYSTEMCTL: &str = "systemctl";
const ACTIONS: [&str; 2] = ["enable", "disable"];
const SUFFIXES: [&str; 3] = [".service", ".timer", ".socket"];

/// Enables or disables one unit file with systemctl, must run as root
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Unit name, a service, timer or socket
    unit: String,

    /// enable or disable
    action: String,
}

#[derive(Debug, PartialEq, Eq)]
enum HelperError {
    NotPrivileged,
    Arguments(String),
    NoSystemctl,
    Action(String),
    UnitType(String),
}

impl Display for HelperError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            HelperError::NotPrivileged => write!(f, "Error, not running as privileged user"),
            HelperError::Arguments(message) => {
                write!(f, "Error, invalid input arguments, expecting 2\n{message}")
            }
            HelperError::NoSystemctl => write!(f, "Error, could not locate {SYSTEMCTL} binary"),
            HelperError::Action(action) => write!(f, "Error, invalid state argument '{action}'"),
            HelperError::UnitType(unit) => {
                write!(f, "Error, invalid unit type in argument '{unit}'")
            }
        }
    }
}

fn main() -> ExitCode {
    env_logger::builder()
        .format(|buf, record| {
            let style = buf
                .default_level_style(record.level())
                .effects(anstyle::Effects::BOLD);
            writeln!(buf, "{style}{}{style:#} {}", record.level(), record.args())
        })
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    println!("sysd-monitor unit file helper");

    match run() {
        Ok(code) => ExitCode::from(code),
        Err(error) => {
            println!("{error}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<u8, HelperError> {
    if !is_root() {
        return Err(HelperError::NotPrivileged);
    }

    let args = Args::try_parse().map_err(|e| HelperError::Arguments(e.to_string()))?;

    if !systemctl_available() {
        return Err(HelperError::NoSystemctl);
    }

    validate(&args.unit, &args.action)?;

    println!("Request to change {} to {}", args.unit, args.action);
    let (code, output) = run_systemctl(&[&args.action, &args.unit]);

    if code == 0 {
        println!("   Success");
    } else {
        println!("   Failed");
    }
    println!("{output}");

    Ok(exit_code(code))
}

fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

fn validate(unit: &str, action: &str) -> Result<(), HelperError> {
    if !ACTIONS.contains(&action) {
        return Err(HelperError::Action(action.to_owned()));
    }

    if !SUFFIXES.iter().any(|suffix| unit.ends_with(suffix)) {
        return Err(HelperError::UnitType(unit.to_owned()));
    }

    Ok(())
}

fn systemctl_available() -> bool {
    let (code, output) = run_systemctl(&["--version"]);
    debug!("{SYSTEMCTL} --version: {output}");
    code == 0
}

/// Exit code and combined stdout then stderr. Code 1 if the program could not start.
fn run_systemctl(args: &[&str]) -> (i32, String) {
    info!("Run {SYSTEMCTL} {}", args.join(" "));

    match Command::new(SYSTEMCTL).args(args).output() {
        Ok(output) => {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            (output.status.code().unwrap_or(1), text)
        }
        Err(error) => {
            warn!("Could not run {SYSTEMCTL}: {error}");
            (1, String::new())
        }
    }
}

/// Codes outside a byte (or a signal death, already mapped to 1) end up as failure.
fn exit_code(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}
