//! servoctl - interactive multi-servo controller
//!
//! Drives a local servo registry from a terminal prompt. Every servo is
//! detached on `quit`, end of input or Ctrl-C.

use std::future::Future;
use std::io::Write;

use anyhow::Context;
use clap::Parser;
use colored::*;
use servoctl_actuator::{
    default_factory, BulkReport, ConfigUpdate, HoldMode, MoveOutcome, ServoAngle, ServoConfig,
    ServoId, ServoRegistry,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "servoctl")]
#[command(author = "Silvano Neto <dev@silvanoneto.com>")]
#[command(version = "2026.1.16")]
#[command(about = "Interactive multi-servo controller", long_about = None)]
struct Cli {
    /// BCM GPIO pins, one per servo (ids are assigned from 1 in this order)
    #[arg(long, value_delimiter = ',', default_value = "13,6,19,26", env = "SERVOCTL_PINS")]
    pins: Vec<u8>,

    /// Post-move policy: auto, hold or release
    #[arg(long, default_value = "auto")]
    hold_mode: HoldMode,

    /// Step through intermediate angles
    #[arg(long, default_value_t = false)]
    smooth: bool,

    /// Use simulated servos instead of GPIO
    #[arg(long, default_value_t = false)]
    simulate: bool,
}

/// Which servos a command applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    One(ServoId),
    All,
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Move { target: Target, angle: i64 },
    Center(Target),
    Hold(Target),
    Release(Target),
    Set(ConfigUpdate),
    List,
    Status,
    Config,
    Help,
    Quit,
}

const USAGE: &str = "\
Commands:
  <servo_id> <angle>      Move one servo (e.g. '1 90')
  all <angle>             Move every servo to the same angle
  center [id|all]         Move to 90°
  hold [id|all]           Keep driving the current angle
  release [id|all]        Stop driving the servo
  set <field> <value>     Change configuration (e.g. 'set hold_mode hold')
  list                    Show servos and their GPIO pins
  status                  Show angle and output state
  config                  Show configuration
  help                    Show this message
  quit                    Detach every servo and exit";

const INVALID: &str = "Invalid command. Use: <servo_id> <angle>, 'all <angle>', 'list', 'help', or 'quit'";

/// Parses one input line; blank lines yield `None`
fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim().to_lowercase();
    let parts: Vec<&str> = line.split_whitespace().collect();

    let command = match parts.as_slice() {
        [] => return Ok(None),
        ["quit" | "exit"] => Command::Quit,
        ["list"] => Command::List,
        ["status"] => Command::Status,
        ["config"] => Command::Config,
        ["help" | "?"] => Command::Help,
        ["all", angle] => Command::Move {
            target: Target::All,
            angle: parse_angle(angle)?,
        },
        ["center", rest @ ..] => Command::Center(parse_target(rest)?),
        ["hold", rest @ ..] => Command::Hold(parse_target(rest)?),
        ["release", rest @ ..] => Command::Release(parse_target(rest)?),
        ["set", field, value] => Command::Set(parse_setting(field, value)?),
        ["set", ..] => return Err("Invalid command. Use: set <field> <value>".to_string()),
        [id, angle] => {
            let id = id.parse::<ServoId>().map_err(|_| INVALID.to_string())?;
            Command::Move {
                target: Target::One(id),
                angle: parse_angle(angle)?,
            }
        }
        _ => return Err(INVALID.to_string()),
    };
    Ok(Some(command))
}

fn parse_angle(token: &str) -> Result<i64, String> {
    token
        .parse()
        .map_err(|_| format!("Invalid angle '{token}'. Use an integer between 0 and 180"))
}

fn parse_target(rest: &[&str]) -> Result<Target, String> {
    match rest {
        [] | ["all"] => Ok(Target::All),
        [id] => id
            .parse()
            .map(Target::One)
            .map_err(|_| format!("Invalid servo id '{id}'")),
        _ => Err(INVALID.to_string()),
    }
}

fn parse_setting(field: &str, value: &str) -> Result<ConfigUpdate, String> {
    fn num<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, String> {
        value
            .parse()
            .map_err(|_| format!("Invalid value '{value}' for {field}"))
    }

    let mut update = ConfigUpdate::default();
    match field {
        "min_pulse_width" => update.min_pulse_width = Some(num(field, value)?),
        "max_pulse_width" => update.max_pulse_width = Some(num(field, value)?),
        "hold_mode" => update.hold_mode = Some(value.to_string()),
        "detach_enabled" => update.detach_enabled = Some(num(field, value)?),
        "hold_time" => update.hold_time = Some(num(field, value)?),
        "smooth_enabled" => update.smooth_enabled = Some(num(field, value)?),
        "smooth_steps" => update.smooth_steps = Some(num(field, value)?),
        "smooth_delay" => update.smooth_delay = Some(num(field, value)?),
        other => return Err(format!("Unknown setting '{other}'")),
    }
    Ok(update)
}

/// Runs one command and returns the lines to print
async fn execute(registry: &ServoRegistry, command: Command) -> Result<Vec<String>, String> {
    match command {
        Command::Move { target, angle } => {
            let angle = ServoAngle::new(angle).map_err(|e| e.to_string())?;
            let degrees = i32::from(angle.degrees());
            match target {
                Target::One(id) => {
                    let outcome = registry.move_one(id, degrees).await.map_err(|e| e.to_string())?;
                    Ok(vec![describe(id, outcome, "moved to")])
                }
                Target::All => {
                    let report = registry.move_all(degrees).await;
                    Ok(summarize(report, &format!("moved to {angle}")))
                }
            }
        }
        Command::Center(Target::One(id)) => {
            let outcome = registry.center_one(id).await.map_err(|e| e.to_string())?;
            Ok(vec![describe(id, outcome, "centered at")])
        }
        Command::Center(Target::All) => Ok(summarize(registry.center_all().await, "centered at 90°")),
        Command::Hold(Target::One(id)) => {
            registry.hold_one(id).await.map_err(|e| e.to_string())?;
            Ok(vec![format!("Servo {id} holding position")])
        }
        Command::Hold(Target::All) => Ok(summarize(registry.hold_all().await, "holding position")),
        Command::Release(Target::One(id)) => {
            registry.release_one(id).await.map_err(|e| e.to_string())?;
            Ok(vec![format!("Servo {id} detached")])
        }
        Command::Release(Target::All) => Ok(summarize(registry.release_all().await, "detached")),
        Command::Set(update) => {
            let config = registry.update_config(update).await.map_err(|e| e.to_string())?;
            let mut lines = vec!["Configuration updated, servos re-initialized".to_string()];
            lines.extend(config_lines(&config));
            Ok(lines)
        }
        Command::List => {
            let mut lines = vec!["Available servos:".to_string()];
            for (id, state) in registry.status().await {
                let note = if state.is_active { "" } else { " (inactive)" };
                lines.push(format!("  Servo {id}: GPIO pin {}{note}", state.gpio_pin));
            }
            Ok(lines)
        }
        Command::Status => Ok(registry
            .status()
            .await
            .values()
            .map(|state| {
                let angle = state
                    .current_angle
                    .map_or_else(|| "unknown".to_string(), |a| format!("{a}°"));
                format!(
                    "  Servo {}: {angle}, {}, {}, last moved {}",
                    state.servo_id,
                    if state.is_active { "active" } else { "inactive" },
                    if state.attached { "attached" } else { "detached" },
                    state.last_updated_display().as_deref().unwrap_or("never"),
                )
            })
            .collect()),
        Command::Config => Ok(config_lines(&registry.config().await)),
        Command::Help => Ok(USAGE.lines().map(str::to_string).collect()),
        Command::Quit => Ok(Vec::new()),
    }
}

fn describe(id: ServoId, outcome: MoveOutcome, verb: &str) -> String {
    match outcome {
        MoveOutcome::Moved { angle } => format!("Servo {id} {verb} {angle}°"),
        MoveOutcome::Released => format!("Servo {id} released (hold mode is release, move skipped)"),
    }
}

fn summarize(report: BulkReport, done: &str) -> Vec<String> {
    let mut lines = vec![format!("Servos {done}: {:?}", report.succeeded)];
    for (id, err) in &report.failed {
        lines.push(format!("  Servo {id} failed: {err}"));
    }
    lines
}

fn config_lines(config: &ServoConfig) -> Vec<String> {
    vec![
        format!("  min_pulse_width: {}s", config.min_pulse_width),
        format!("  max_pulse_width: {}s", config.max_pulse_width),
        format!("  hold_mode: {}", config.hold_mode),
        format!("  detach_enabled: {}", config.detach_enabled),
        format!("  hold_time: {}s", config.hold_time),
        format!("  smooth_enabled: {}", config.smooth_enabled),
        format!("  smooth_steps: {}", config.smooth_steps),
        format!("  smooth_delay: {}s", config.smooth_delay),
    ]
}

/// Waits for `work` unless `interrupt` resolves first
async fn until_interrupted<T>(
    work: impl Future<Output = T>,
    interrupt: impl Future<Output = ()>,
) -> Option<T> {
    tokio::select! {
        value = work => Some(value),
        _ = interrupt => None,
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Error waiting for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn repl(registry: &ServoRegistry) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("{} ", "servo>".cyan().bold());
        std::io::stdout().flush()?;

        let Some(line) = until_interrupted(lines.next_line(), ctrl_c()).await else {
            println!("\nExiting...");
            return Ok(());
        };
        let Some(line) = line.context("failed to read input")? else {
            println!();
            return Ok(());
        };

        let command = match parse_command(&line) {
            Ok(None) => continue,
            Ok(Some(Command::Quit)) => return Ok(()),
            Ok(Some(command)) => command,
            Err(e) => {
                eprintln!("{} {}", "error:".red().bold(), e);
                continue;
            }
        };

        // an interrupted move still finishes before the servos are detached
        match until_interrupted(execute(registry, command), ctrl_c()).await {
            Some(Ok(output)) => output.iter().for_each(|line| println!("{line}")),
            Some(Err(e)) => eprintln!("{} {}", "error:".red().bold(), e),
            None => {
                println!("\nInterrupted, exiting...");
                return Ok(());
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "servoctl_actuator=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = ServoConfig {
        hold_mode: cli.hold_mode,
        smooth_enabled: cli.smooth,
        ..ServoConfig::default()
    };

    let factory = default_factory(cli.simulate).context("failed to open GPIO backend")?;
    let (registry, report) = ServoRegistry::start(cli.pins, config, factory)
        .await
        .context("invalid servo configuration")?;

    println!("{}", "Multi-Servo Controller".green().bold());
    println!("{USAGE}");
    println!();
    for (id, err) in &report.failed {
        eprintln!("{} servo {} unavailable: {}", "warning:".yellow().bold(), id, err);
    }
    if let Ok(lines) = execute(&registry, Command::List).await {
        lines.iter().for_each(|line| println!("{line}"));
    }
    println!();

    let result = repl(&registry).await;

    println!("{}", "Detaching all servos...".bold());
    registry.shutdown().await;
    println!("{}", "All servos detached. Goodbye!".green());

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use servoctl_actuator::SimulatedFactory;

    fn parse(line: &str) -> Command {
        parse_command(line).unwrap().unwrap()
    }

    #[test]
    fn test_parse_moves() {
        assert_eq!(
            parse("1 90"),
            Command::Move { target: Target::One(1), angle: 90 }
        );
        assert_eq!(
            parse("  ALL 45 "),
            Command::Move { target: Target::All, angle: 45 }
        );
        // range is checked when the command runs
        assert_eq!(
            parse("2 200"),
            Command::Move { target: Target::One(2), angle: 200 }
        );
    }

    #[test]
    fn test_parse_targets() {
        assert_eq!(parse("center"), Command::Center(Target::All));
        assert_eq!(parse("center 3"), Command::Center(Target::One(3)));
        assert_eq!(parse("hold all"), Command::Hold(Target::All));
        assert_eq!(parse("release 2"), Command::Release(Target::One(2)));
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!(parse_command("   ").unwrap(), None);
        assert_eq!(parse("quit"), Command::Quit);
        assert_eq!(parse("exit"), Command::Quit);
        assert_eq!(parse("list"), Command::List);
        assert_eq!(parse("status"), Command::Status);
        assert_eq!(parse("config"), Command::Config);
    }

    #[test]
    fn test_parse_settings() {
        let Command::Set(update) = parse("set hold_mode hold") else {
            panic!("expected set");
        };
        assert_eq!(update.hold_mode.as_deref(), Some("hold"));

        let Command::Set(update) = parse("set smooth_steps 20") else {
            panic!("expected set");
        };
        assert_eq!(update.smooth_steps, Some(20));

        assert!(parse_command("set smooth_steps many").is_err());
        assert!(parse_command("set colour red").is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_command("dance").is_err());
        assert!(parse_command("x 90").is_err());
        assert!(parse_command("1 ninety").is_err());
        assert!(parse_command("center 1 2").is_err());
    }

    async fn registry(factory: SimulatedFactory) -> ServoRegistry {
        let (registry, _) =
            ServoRegistry::start(vec![13, 6], ServoConfig::default(), Arc::new(factory))
                .await
                .unwrap();
        registry
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_move_and_status() {
        let registry = registry(SimulatedFactory::new()).await;

        let output = execute(&registry, parse("2 45")).await.unwrap();
        assert_eq!(output, vec!["Servo 2 moved to 45°"]);

        let output = execute(&registry, parse("status")).await.unwrap();
        assert_eq!(output.len(), 2);
        assert!(output[1].starts_with("  Servo 2: 45°, active"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_rejects_out_of_range() {
        let registry = registry(SimulatedFactory::new()).await;

        let err = execute(&registry, parse("1 181")).await.unwrap_err();
        assert!(err.contains("between 0 and 180"));
        assert_eq!(registry.status_of(1).await.unwrap().current_angle, Some(90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_bulk_reports_failures() {
        let registry = registry(SimulatedFactory::new().fail_open(6)).await;

        let output = execute(&registry, parse("all 30")).await.unwrap();
        assert_eq!(output[0], "Servos moved to 30°: [1]");
        assert_eq!(output[1], "  Servo 2 failed: Servo 2 is not active");
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupted_command_returns_early() {
        let factory = SimulatedFactory::new();
        let registry = registry(factory.clone()).await;

        let interrupt = tokio::time::sleep(std::time::Duration::from_millis(100));
        let outcome = until_interrupted(execute(&registry, parse("1 30")), interrupt).await;
        assert!(outcome.is_none());

        // the move itself is not abandoned
        registry.shutdown().await;
        assert_eq!(registry.status_of(1).await.unwrap().current_angle, Some(30));
        assert!(factory.disable_count(13) >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uninterrupted_command_completes() {
        let registry = registry(SimulatedFactory::new()).await;

        let outcome = until_interrupted(execute(&registry, parse("2 45")), std::future::pending()).await;
        assert_eq!(outcome, Some(Ok(vec!["Servo 2 moved to 45°".to_string()])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_set_rejects_invalid() {
        let registry = registry(SimulatedFactory::new()).await;

        assert!(execute(&registry, parse("set hold_mode bogus")).await.is_err());
        assert_eq!(registry.config().await, ServoConfig::default());

        execute(&registry, parse("set hold_mode hold")).await.unwrap();
        assert_eq!(registry.config().await.hold_mode, HoldMode::Hold);
    }
}
