// avctl test application -- CLI tool for exercising the Kramer matrix
// switcher, AFM-20, VP-558 and VIA backends against real hardware.
//
// Usage:
//   avctl-test-app list
//   avctl-test-app --family matrix --address 10.5.34.12 input set --output 0 --input 2
//   avctl-test-app --family afm20 --address 10.5.34.20 volume get --block 1
//   avctl-test-app --family vp558 --address 10.5.34.30 mute on --block 2
//   avctl-test-app --family vp558 --address 10.5.34.30 volume all 1,2,3
//   avctl-test-app --family matrix --address 10.5.34.12 info
//   avctl-test-app --family via --address 10.5.34.40 users
//   VIA_USERNAME=su VIA_PASSWORD=... avctl-test-app --family via \
//       --address 10.5.34.40 monitor --duration 600

use std::io::{self, Write};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use avctl::kramer::{Afm20, Afm20Builder, MatrixSwitcher, SwitcherBuilder, Vp558, Vp558Builder};
use avctl::via::{ViaBuilder, ViaClient};
use avctl::{ActiveSignal, Credentials, Device, Family, MonitorEvent, Port};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// avctl test application -- exercises device backends from the command line.
#[derive(Parser)]
#[command(name = "avctl-test-app", version, about)]
struct Cli {
    /// Device family. Required for all commands except `list`.
    #[arg(long, value_enum)]
    family: Option<FamilyArg>,

    /// Device IP address or hostname. Required for all commands except `list`.
    #[arg(long)]
    address: Option<String>,

    /// Override the family's default TCP port (5000 Kramer, 9982 VIA).
    #[arg(long)]
    port: Option<u16>,

    /// VIA username.
    #[arg(long, env = "VIA_USERNAME")]
    username: Option<String>,

    /// VIA password.
    #[arg(long, env = "VIA_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Reply deadline in milliseconds (default: family default).
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FamilyArg {
    Matrix,
    Afm20,
    Vp558,
    Via,
}

impl From<FamilyArg> for Family {
    fn from(arg: FamilyArg) -> Self {
        match arg {
            FamilyArg::Matrix => Family::MatrixSwitcher,
            FamilyArg::Afm20 => Family::Afm20,
            FamilyArg::Vp558 => Family::Vp558,
            FamilyArg::Via => Family::Via,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// List the supported device families and their default ports.
    List,

    /// Print the device's hardware inventory as JSON.
    Info,

    /// Input routing (matrix switcher, VP-558).
    Input {
        #[command(subcommand)]
        action: InputAction,
    },

    /// Volume operations (AFM-20, VP-558, VIA).
    Volume {
        #[command(subcommand)]
        action: VolumeAction,
    },

    /// Mute operations (AFM-20, VP-558).
    Mute {
        #[command(subcommand)]
        action: MuteAction,
    },

    /// Report whether the device sees an active source.
    Signal {
        /// Input port to check instead of the configured signal port
        /// (matrix switcher only).
        #[arg(long)]
        port: Option<Port>,
    },

    /// Lock or unlock the matrix switcher's front panel.
    Lock { state: OnOff },

    /// Print the VIA room code.
    RoomCode,

    /// Print the VIA user roster as JSON.
    Users,

    /// Print the number of users presenting on the VIA.
    Presenters,

    /// Pop up a message on the VIA display.
    Alert { message: String },

    /// Reboot the VIA.
    Reboot {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },

    /// Restart the VIA's admin session.
    Reset,

    /// Check whether the VIA answers an authenticated query.
    Ping,

    /// Attach to the VIA event stream and print events as they arrive.
    Monitor {
        /// Duration in seconds (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,

        /// Keep-alive period in seconds.
        #[arg(long, default_value_t = 60)]
        ping_interval: u64,

        /// Delay between reconnect attempts in seconds.
        #[arg(long, default_value_t = 10)]
        reconnect_interval: u64,

        /// Reconnect after this many seconds without a line from the VIA.
        #[arg(long, default_value_t = 300)]
        idle_timeout: u64,
    },

    /// Stress test: set/read-back volume cycles on one block.
    Stress {
        /// Number of set/read cycles.
        #[arg(long, default_value_t = 50)]
        count: u32,

        /// Audio block to exercise.
        #[arg(long, default_value = "1")]
        block: String,
    },
}

#[derive(Subcommand)]
enum InputAction {
    /// Show the input routed to an output.
    Get {
        #[arg(long, default_value = "0")]
        output: Port,
    },
    /// Route an input to an output.
    Set {
        #[arg(long)]
        output: Port,
        #[arg(long)]
        input: Port,
    },
}

#[derive(Subcommand)]
enum VolumeAction {
    /// Read one block's volume (0-100).
    Get {
        #[arg(long, default_value = "1")]
        block: String,
    },
    /// Set one block's volume (0-100).
    Set {
        #[arg(long, default_value = "1")]
        block: String,
        level: i32,
    },
    /// Read several blocks at once (DSPs only).
    All {
        #[arg(value_delimiter = ',', required = true)]
        blocks: Vec<String>,
    },
}

#[derive(Subcommand)]
enum MuteAction {
    /// Read one block's mute state.
    Get {
        #[arg(long, default_value = "1")]
        block: String,
    },
    /// Mute a block.
    On {
        #[arg(long, default_value = "1")]
        block: String,
    },
    /// Unmute a block.
    Off {
        #[arg(long, default_value = "1")]
        block: String,
    },
    /// Read several blocks at once.
    All {
        #[arg(value_delimiter = ',', required = true)]
        blocks: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OnOff {
    On,
    Off,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Prompt the user for y/N confirmation. Returns true only if "y" or "Y" entered.
fn confirm(prompt: &str) -> bool {
    print!("{prompt}");
    io::stdout().flush().ok();
    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }
    matches!(input.trim(), "y" | "Y")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn block_refs(blocks: &[String]) -> Vec<&str> {
    blocks.iter().map(String::as_str).collect()
}

/// Install the tracing subscriber, honouring `RUST_LOG` (default `info`).
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

// ---------------------------------------------------------------------------
// Device construction
// ---------------------------------------------------------------------------

/// The concrete adapter for the selected family, so family-only extras
/// stay reachable alongside the shared `Device` surface.
enum Target {
    Switcher(MatrixSwitcher),
    Afm20(Afm20),
    Vp558(Vp558),
    Via(ViaClient),
}

impl Target {
    fn device(&self) -> &dyn Device {
        match self {
            Target::Switcher(d) => d,
            Target::Afm20(d) => d,
            Target::Vp558(d) => d,
            Target::Via(d) => d,
        }
    }

    async fn close(&self) {
        match self {
            Target::Switcher(d) => d.close().await,
            Target::Afm20(d) => d.close().await,
            Target::Vp558(d) => d.close().await,
            Target::Via(_) => {}
        }
    }
}

fn family(cli: &Cli) -> Result<FamilyArg> {
    cli.family.context("--family is required for this command")
}

fn address(cli: &Cli) -> Result<&str> {
    cli.address
        .as_deref()
        .context("--address is required for this command")
}

fn via_builder(cli: &Cli) -> Result<ViaBuilder> {
    let username = cli
        .username
        .clone()
        .context("VIA commands need --username or VIA_USERNAME")?;
    let password = cli
        .password
        .clone()
        .context("VIA commands need --password or VIA_PASSWORD")?;

    let mut builder = ViaBuilder::new(address(cli)?, Credentials::new(username, password));
    if let Some(port) = cli.port {
        builder = builder.port(port);
    }
    if let Some(ms) = cli.timeout_ms {
        builder = builder.read_timeout(Duration::from_millis(ms));
    }
    Ok(builder)
}

/// Apply the shared Kramer overrides to any builder.
macro_rules! kramer_overrides {
    ($builder:expr, $cli:expr) => {{
        let mut builder = $builder;
        if let Some(port) = $cli.port {
            builder = builder.port(port);
        }
        if let Some(ms) = $cli.timeout_ms {
            builder = builder.read_timeout(Duration::from_millis(ms));
        }
        builder
    }};
}

fn create_target(cli: &Cli) -> Result<Target> {
    let target = match family(cli)? {
        FamilyArg::Matrix => {
            Target::Switcher(kramer_overrides!(SwitcherBuilder::new(address(cli)?), cli).build())
        }
        FamilyArg::Afm20 => {
            Target::Afm20(kramer_overrides!(Afm20Builder::new(address(cli)?), cli).build())
        }
        FamilyArg::Vp558 => {
            Target::Vp558(kramer_overrides!(Vp558Builder::new(address(cli)?), cli).build())
        }
        FamilyArg::Via => Target::Via(via_builder(cli)?.build()),
    };
    Ok(target)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_list() -> Result<()> {
    println!("{:<18} {:>5}", "Family", "Port");
    println!("{}", "-".repeat(24));
    for family in avctl::supported_families() {
        println!("{:<18} {:>5}", family.to_string(), family.default_port());
    }
    Ok(())
}

async fn cmd_info(device: &dyn Device) -> Result<()> {
    let info = device.get_hardware_info().await?;
    print_json(&info)
}

async fn cmd_input(device: &dyn Device, action: &InputAction) -> Result<()> {
    match action {
        InputAction::Get { output } => {
            let input = device.get_input(*output).await?;
            println!("output {output} <- input {input}");
        }
        InputAction::Set { output, input } => {
            device.set_input(*output, *input).await?;
            println!("Routed input {input} to output {output}");
        }
    }
    Ok(())
}

async fn cmd_volume(target: &Target, action: &VolumeAction) -> Result<()> {
    let device = target.device();
    match action {
        VolumeAction::Get { block } => {
            println!("{}", device.get_volume(block).await?);
        }
        VolumeAction::Set { block, level } => {
            device.set_volume(block, *level).await?;
            println!("Volume of block {block} set to {level}");
        }
        VolumeAction::All { blocks } => {
            let blocks = block_refs(blocks);
            let levels = match target {
                Target::Afm20(d) => d.volumes(&blocks).await?,
                Target::Vp558(d) => d.volumes(&blocks).await?,
                _ => bail!("multi-block volume is only available on the AFM-20 and VP-558"),
            };
            print_json(&levels)?;
        }
    }
    Ok(())
}

async fn cmd_mute(target: &Target, action: &MuteAction) -> Result<()> {
    let device = target.device();
    match action {
        MuteAction::Get { block } => {
            let muted = device.get_mute(block).await?;
            println!("{}", if muted { "muted" } else { "unmuted" });
        }
        MuteAction::On { block } => {
            device.set_mute(block, true).await?;
            println!("Block {block} muted");
        }
        MuteAction::Off { block } => {
            device.set_mute(block, false).await?;
            println!("Block {block} unmuted");
        }
        MuteAction::All { blocks } => {
            let blocks = block_refs(blocks);
            let mutes = match target {
                Target::Afm20(d) => d.mutes(&blocks).await?,
                Target::Vp558(d) => d.mutes(&blocks).await?,
                _ => bail!("multi-block mute is only available on the AFM-20 and VP-558"),
            };
            print_json(&mutes)?;
        }
    }
    Ok(())
}

async fn cmd_signal(target: &Target, port: Option<Port>) -> Result<()> {
    let active = match (target, port) {
        (Target::Switcher(s), Some(port)) => s.active_signal_on(port).await?,
        (_, Some(_)) => bail!("--port is only valid for the matrix switcher"),
        (t, None) => t.device().get_active_signal().await?,
    };
    print_json(&ActiveSignal { active })
}

async fn cmd_lock(target: &Target, state: OnOff) -> Result<()> {
    let Target::Switcher(switcher) = target else {
        bail!("front-panel lock is only available on the matrix switcher");
    };
    let locked = state == OnOff::On;
    switcher.set_front_lock(locked).await?;
    println!("Front panel {}", if locked { "locked" } else { "unlocked" });
    Ok(())
}

async fn cmd_via(via: &ViaClient, command: &Command) -> Result<()> {
    match command {
        Command::RoomCode => println!("{}", via.room_code().await?),
        Command::Users => print_json(&via.users().await?)?,
        Command::Presenters => println!("{}", via.presenter_count().await?),
        Command::Alert { message } => {
            via.alert(message).await?;
            println!("Alert sent");
        }
        Command::Reboot { yes } => {
            if !*yes && !confirm("Reboot the VIA? [y/N] ") {
                println!("Aborted.");
                return Ok(());
            }
            via.reboot().await?;
            println!("Reboot requested");
        }
        Command::Reset => {
            via.reset().await?;
            println!("Session reset");
        }
        Command::Ping => {
            if via.is_connected().await {
                println!("reachable");
            } else {
                bail!("VIA did not answer");
            }
        }
        _ => unreachable!("non-VIA command routed to cmd_via"),
    }
    Ok(())
}

async fn cmd_monitor(
    builder: ViaBuilder,
    duration_secs: u64,
    ping_secs: u64,
    reconnect_secs: u64,
    idle_secs: u64,
) -> Result<()> {
    let monitor = builder
        .ping_interval(Duration::from_secs(ping_secs))
        .reconnect_interval(Duration::from_secs(reconnect_secs))
        .idle_timeout(Duration::from_secs(idle_secs))
        .monitor();
    let mut events = monitor.subscribe();

    println!("Monitoring VIA events (Ctrl-C to stop)...");

    let deadline = (duration_secs > 0).then(|| Instant::now() + Duration::from_secs(duration_secs));

    loop {
        let remaining = match deadline {
            Some(dl) => {
                let remaining = dl.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    println!("Monitor duration elapsed.");
                    break;
                }
                remaining
            }
            None => Duration::from_secs(3600),
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Interrupted.");
                break;
            }
            received = tokio::time::timeout(remaining, events.recv()) => match received {
                Ok(Ok(MonitorEvent::Via(event))) => println!("{}", serde_json::to_string(&event)?),
                Ok(Ok(MonitorEvent::StateChanged(state))) => println!("[state] {state}"),
                Ok(Ok(MonitorEvent::Reconnecting { attempt })) => {
                    println!("[reconnect] attempt {attempt}");
                }
                Ok(Err(RecvError::Lagged(n))) => {
                    println!("[warning] missed {n} events (consumer too slow)");
                }
                Ok(Err(RecvError::Closed)) => {
                    println!("Event channel closed.");
                    break;
                }
                Err(_) => {
                    if deadline.is_some() {
                        println!("Monitor duration elapsed.");
                        break;
                    }
                }
            },
        }
    }

    monitor.stop().await;
    Ok(())
}

async fn cmd_stress(device: &dyn Device, count: u32, block: &str) -> Result<()> {
    let base = device.get_volume(block).await?;
    println!("Stress test: {count} cycles on block {block}");
    println!("Base volume: {base}");

    let mut success = 0u32;
    let mut failures = 0u32;
    let start = Instant::now();

    for i in 1..=count {
        // Walk the whole 0..=100 range in coarse steps.
        let target = ((i * 37) % 101) as i32;

        if let Err(e) = device.set_volume(block, target).await {
            eprintln!("[{i}/{count}] set_volume failed: {e}");
            failures += 1;
            continue;
        }

        match device.get_volume(block).await {
            // Decibel families may lose one unit to rounding.
            Ok(readback) if (readback - target).abs() <= 1 => success += 1,
            Ok(readback) => {
                eprintln!("[{i}/{count}] mismatch: set {target} but read back {readback}");
                failures += 1;
            }
            Err(e) => {
                eprintln!("[{i}/{count}] get_volume failed: {e}");
                failures += 1;
            }
        }
    }

    let elapsed = start.elapsed();
    let rate = if elapsed.as_secs_f64() > 0.0 {
        count as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };

    println!();
    println!("Results:");
    println!("  Total cycles:   {count}");
    println!("  Successes:      {success}");
    println!("  Failures:       {failures}");
    println!("  Elapsed:        {:.3} s", elapsed.as_secs_f64());
    println!("  Rate:           {rate:.1} cycles/sec");

    if let Err(e) = device.set_volume(block, base).await {
        eprintln!("Warning: failed to restore base volume: {e}");
    } else {
        println!("  Restored:       {base}");
    }

    if failures > 0 {
        bail!("{failures} out of {count} stress test cycles failed");
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn is_via_only(command: &Command) -> bool {
    matches!(
        command,
        Command::RoomCode
            | Command::Users
            | Command::Presenters
            | Command::Alert { .. }
            | Command::Reboot { .. }
            | Command::Reset
            | Command::Ping
            | Command::Monitor { .. }
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    if matches!(cli.command, Command::List) {
        return cmd_list();
    }

    if is_via_only(&cli.command) && family(&cli)? != FamilyArg::Via {
        bail!("this command is only available with --family via");
    }

    if let Command::Monitor {
        duration,
        ping_interval,
        reconnect_interval,
        idle_timeout,
    } = &cli.command
    {
        return cmd_monitor(
            via_builder(&cli)?,
            *duration,
            *ping_interval,
            *reconnect_interval,
            *idle_timeout,
        )
        .await;
    }

    let target = create_target(&cli)?;
    tracing::debug!(family = ?cli.family, address = ?cli.address, "device created");
    let device = target.device();

    let result = match &cli.command {
        Command::Info => cmd_info(device).await,
        Command::Input { action } => cmd_input(device, action).await,
        Command::Volume { action } => cmd_volume(&target, action).await,
        Command::Mute { action } => cmd_mute(&target, action).await,
        Command::Signal { port } => cmd_signal(&target, *port).await,
        Command::Lock { state } => cmd_lock(&target, *state).await,
        Command::Stress { count, block } => cmd_stress(device, *count, block).await,
        command => match &target {
            Target::Via(via) => cmd_via(via, command).await,
            _ => unreachable!("VIA-only commands rejected above"),
        },
    };

    target.close().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_routing_command() {
        let cli = Cli::try_parse_from([
            "avctl-test-app",
            "--family",
            "matrix",
            "--address",
            "10.0.0.5",
            "input",
            "set",
            "--output",
            "0",
            "--input",
            "2",
        ])
        .unwrap();
        assert_eq!(cli.family, Some(FamilyArg::Matrix));
        let Command::Input {
            action: InputAction::Set { output, input },
        } = cli.command
        else {
            panic!("expected input set");
        };
        assert_eq!(output, Port::new(0));
        assert_eq!(input, Port::new(2));
    }

    #[test]
    fn rejects_negative_port() {
        let result = Cli::try_parse_from([
            "avctl-test-app",
            "--family",
            "matrix",
            "input",
            "get",
            "--output",
            "-1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn multi_block_list_splits_on_commas() {
        let cli = Cli::try_parse_from(["avctl-test-app", "volume", "all", "1,2,OUT3"]).unwrap();
        let Command::Volume {
            action: VolumeAction::All { blocks },
        } = cli.command
        else {
            panic!("expected volume all");
        };
        assert_eq!(blocks, vec!["1", "2", "OUT3"]);
    }

    #[test]
    fn monitor_is_via_only() {
        assert!(is_via_only(&Command::Monitor {
            duration: 0,
            ping_interval: 60,
            reconnect_interval: 10,
            idle_timeout: 300,
        }));
        assert!(!is_via_only(&Command::Info));
    }

    #[test]
    fn family_maps_to_core() {
        assert_eq!(Family::from(FamilyArg::Vp558), Family::Vp558);
        assert_eq!(Family::from(FamilyArg::Matrix), Family::MatrixSwitcher);
    }
}
