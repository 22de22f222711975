//! Interactive session console.
//!
//! Each line typed on stdin is one UI event (button press or checkbox
//! toggle). Lifecycle commands run on their own task so a `stop` typed
//! while a camera is still opening takes effect immediately.

use anyhow::Result;
use glance_core::{
    ChannelSink, DetectionPoller, Facing, Frame, PermissionMonitor, SessionManager, StatusEvent,
};
use glance_hw::V4lBackend;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::snapshot;

/// One console input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start(Option<Facing>),
    Stop,
    Switch(Option<Facing>),
    Toggle,
    Flip,
    Status,
    Permission,
    Snapshot(PathBuf),
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or_else(|| "empty command".to_string())?;
        let arg = words.next();
        if words.next().is_some() {
            return Err(format!("too many arguments for '{verb}'"));
        }

        let facing = |arg: Option<&str>| -> Result<Option<Facing>, String> {
            arg.map(|a| a.parse::<Facing>().map_err(|e| e.to_string()))
                .transpose()
        };

        let cmd = match verb.to_ascii_lowercase().as_str() {
            "start" | "on" => Command::Start(facing(arg)?),
            "stop" | "off" => Command::Stop,
            "switch" => Command::Switch(facing(arg)?),
            "toggle" => Command::Toggle,
            "flip" => Command::Flip,
            "status" => Command::Status,
            "permission" => Command::Permission,
            "snapshot" => Command::Snapshot(PathBuf::from(arg.unwrap_or("snapshot.png"))),
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(format!("unknown command '{other}' (try 'help')")),
        };

        let takes_arg = matches!(
            cmd,
            Command::Start(_) | Command::Switch(_) | Command::Snapshot(_)
        );
        if arg.is_some() && !takes_arg {
            return Err(format!("'{verb}' takes no arguments"));
        }
        Ok(cmd)
    }
}

const HELP: &str = "\
commands:
  start [user|environment]   open the camera
  stop                       release the camera
  switch [user|environment]  switch cameras (default: the other one)
  toggle                     video on/off
  flip                       toggle the facing-mode checkbox
  status                     show session state
  permission                 probe camera permission
  snapshot [path.png]        save the current frame
  quit";

pub struct RunOptions {
    pub facing: Facing,
    pub json: bool,
    pub autostart: bool,
}

pub async fn run(config: Config, opts: RunOptions) -> Result<()> {
    let (sink, events) = ChannelSink::new();
    let (width, height) = config.frame_size;
    let backend = V4lBackend::new(config.overrides.clone());
    let manager = Arc::new(SessionManager::new(backend, sink).with_frame_size(width, height));

    let printer = tokio::spawn(print_events(events, opts.json));
    let poller = DetectionPoller::new(config.poll_interval).spawn(manager.clone(), log_frame);
    let monitor = PermissionMonitor::spawn(manager.clone(), config.permission_poll);

    if opts.autostart {
        spawn_lifecycle(&manager, Command::Start(Some(opts.facing)), opts.facing);
    }

    println!("glance: type 'help' for commands");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(msg) => {
                eprintln!("{msg}");
                continue;
            }
        };

        match command {
            Command::Quit => break,
            Command::Help => println!("{HELP}"),
            Command::Status => {
                let status = manager.status();
                if opts.json {
                    println!("{}", serde_json::to_string(&status)?);
                } else {
                    println!(
                        "state={} facing={} device={}",
                        status.state,
                        status.facing,
                        status.device.as_deref().unwrap_or("-")
                    );
                }
            }
            Command::Permission => {
                let state = manager.query_permission_state().await;
                println!("permission: {state}");
            }
            Command::Snapshot(path) => match manager.next_frame().await {
                None => eprintln!("camera is not active"),
                Some(Err(e)) => eprintln!("{e}"),
                Some(Ok(frame)) => match snapshot::save_frame(&frame, &path) {
                    Ok(()) => println!("saved {}", path.display()),
                    Err(e) => eprintln!("{e:#}"),
                },
            },
            lifecycle => spawn_lifecycle(&manager, lifecycle, opts.facing),
        }
    }

    // Poller first so no frame read is in flight when the camera stops.
    poller.shutdown().await;
    monitor.shutdown().await;
    manager.stop();
    drop(manager);
    // A start still waiting on the device keeps the sink alive; don't hang on it.
    let _ = tokio::time::timeout(Duration::from_secs(1), printer).await;
    Ok(())
}

/// Run a lifecycle command in the background. Failures are already
/// reported through the status sink.
fn spawn_lifecycle(manager: &Arc<SessionManager<V4lBackend>>, command: Command, default: Facing) {
    let manager = manager.clone();
    tokio::spawn(async move {
        let _ = match command {
            Command::Start(facing) => manager.start(facing.unwrap_or(default)).await,
            Command::Switch(facing) => {
                let next = facing.unwrap_or_else(|| manager.facing().opposite());
                manager.switch_facing(next).await
            }
            Command::Toggle => manager.toggle().await,
            Command::Flip => manager.toggle_facing().await,
            Command::Stop => {
                // Waits for any frame read in flight, so keep it off the executor.
                let _ = tokio::task::spawn_blocking(move || manager.stop()).await;
                Ok(())
            }
            _ => Ok(()),
        };
    });
}

async fn print_events(mut events: mpsc::UnboundedReceiver<StatusEvent>, json: bool) {
    while let Some(event) = events.recv().await {
        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "failed to encode status event"),
            }
        } else if event.is_error() {
            eprintln!("{event}");
        } else {
            println!("{event}");
        }
    }
}

/// Stand-in detection consumer: logs frame statistics.
fn log_frame(frame: &Frame) {
    tracing::debug!(
        seq = frame.sequence,
        width = frame.width,
        height = frame.height,
        brightness = frame.avg_brightness(),
        "frame"
    );
}
