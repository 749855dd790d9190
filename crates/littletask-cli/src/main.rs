//! lt - LittleTask CLI
//!
//! Record mouse and keyboard input, then replay it at any speed.
//!
//! Supported: macOS

mod settings;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use littletask_core::prelude::*;
use littletask_core::ErrorCode;

use settings::Settings;

#[derive(Parser)]
#[command(name = "lt")]
#[command(about = "LittleTask - record and replay mouse and keyboard input")]
#[command(version)]
struct Cli {
    /// Structured JSON output
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record input until Ctrl+C
    Record {
        #[arg(short, long, default_value = "recording")]
        name: String,
        /// Minimum pointer travel (pixels) between recorded moves
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Replay a saved recording
    Play {
        file: String,
        #[arg(short, long)]
        speed: Option<f64>,
        /// Seconds to wait before the first action
        #[arg(long)]
        countdown: Option<u64>,
    },
    /// List saved recordings
    List,
    /// Show recording info
    Show {
        file: String,
        #[arg(long)]
        all: bool,
    },
    /// Delete a recording
    Delete {
        file: String,
    },
    /// Check/request permissions
    Permissions {
        #[arg(long)]
        request: bool,
    },
}

#[derive(Serialize)]
struct Output<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorOutput>,
}

#[derive(Serialize)]
struct ErrorOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<ErrorCode>,
    message: String,
}

impl<T: Serialize> Output<T> {
    fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }
}

impl Output<()> {
    fn err(e: &anyhow::Error) -> Self {
        let code = e.downcast_ref::<Error>().map(Error::code);
        Output {
            success: false,
            data: None,
            error: Some(ErrorOutput { code, message: format!("{:#}", e) }),
        }
    }
}

fn print_json<T: Serialize>(output: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(output)?);
    Ok(())
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    let result = Settings::load_or_default().and_then(|settings| {
        let json = cli.json;
        match cli.command {
            Commands::Record { name, threshold } => record(&settings, &name, threshold),
            Commands::Play { file, speed, countdown } => play(&settings, &file, speed, countdown),
            Commands::List => list(&settings, json),
            Commands::Show { file, all } => show(&settings, &file, all, json),
            Commands::Delete { file } => delete(&settings, &file),
            Commands::Permissions { request } => permissions(&settings, request, json),
        }
    });

    if let Err(e) = result {
        if cli.json {
            let _ = print_json(&Output::err(&e));
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

fn open_storage(settings: &Settings) -> Result<RecordingStorage> {
    let storage = match &settings.storage_dir {
        Some(dir) => RecordingStorage::with_dir(dir)?,
        None => RecordingStorage::new()?,
    };
    Ok(storage)
}

/// Prompt for missing access and fail with `PermissionDenied`
fn require_permissions(session: &Session) -> Result<()> {
    if session.check_permissions() {
        return Ok(());
    }
    session.request_permissions();
    Err(Error::permission_denied(session.status()).into())
}

fn record(settings: &Settings, name: &str, threshold: Option<f64>) -> Result<()> {
    let mut config = settings.recorder_config();
    if let Some(t) = threshold {
        if !t.is_finite() || t < 0.0 {
            bail!("--threshold must be zero or more, got {}", t);
        }
        config.mouse_move_threshold = t;
    }
    let storage = open_storage(settings)?;

    let session = Session::native(config);
    require_permissions(&session)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    session.start_recording()?;
    println!("Recording: {} (Ctrl+C to stop)", name);

    let mut count = 0;
    while running.load(Ordering::SeqCst) {
        session.pump();
        let n = session.action_count();
        if n != count {
            count = n;
            print!("\r{} actions", count);
            io::stdout().flush()?;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    session.stop_recording();
    println!("\n{}", session.status());
    let dropped = session.dropped();
    if dropped > 0 {
        tracing::warn!(dropped, "capture queue overflowed; some actions were lost");
    }

    let actions = session.actions();
    if actions.is_empty() {
        println!("Nothing recorded.");
        return Ok(());
    }
    let path = storage.save(name, &actions)?;
    println!("Saved: {}", path.display());
    Ok(())
}

fn play(settings: &Settings, file: &str, speed: Option<f64>, countdown: Option<u64>) -> Result<()> {
    let storage = open_storage(settings)?;
    let bytes = storage.read(file)?;
    let speed = speed.unwrap_or(settings.default_speed);
    let countdown = countdown.unwrap_or(settings.countdown_secs);

    let session = Arc::new(Session::native(settings.recorder_config()));
    session.load_recording(&bytes)?;
    let actions = session.action_count();
    if actions == 0 {
        println!("Nothing to replay.");
        return Ok(());
    }

    println!("Replaying {} ({} actions) at {}x speed...", file, actions, speed);
    if countdown > 0 {
        println!("Starting in {} seconds...", countdown);
        std::thread::sleep(Duration::from_secs(countdown));
    }

    let updates = session.subscribe();
    let s = session.clone();
    ctrlc::set_handler(move || {
        s.stop_playback();
    })?;

    if !session.start_playback(speed)? {
        bail!("playback did not start ({})", session.status());
    }

    for update in updates.iter() {
        if update.state == SessionState::Idle {
            println!("{}", update.status);
            break;
        }
    }
    Ok(())
}

fn list(settings: &Settings, json: bool) -> Result<()> {
    let storage = open_storage(settings)?;
    let files = storage.list()?;
    if json {
        return print_json(&Output::ok(files));
    }
    if files.is_empty() {
        println!("No recordings saved.");
    } else {
        for f in files {
            println!("{}", f);
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct Summary<'a> {
    file: &'a str,
    actions: usize,
    duration: f64,
    clicks: usize,
    moves: usize,
    keys: usize,
    scrolls: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    entries: Option<&'a ActionSequence>,
}

fn show(settings: &Settings, file: &str, all: bool, json: bool) -> Result<()> {
    let storage = open_storage(settings)?;
    let sequence = storage.load(file)?;
    let summary = Summary {
        file,
        actions: sequence.len(),
        duration: sequence.duration(),
        clicks: sequence.count(ActionKind::MouseClick),
        moves: sequence.count(ActionKind::MouseMove),
        keys: sequence.count(ActionKind::KeyPress),
        scrolls: sequence.count(ActionKind::Scroll),
        entries: all.then_some(&sequence),
    };
    if json {
        return print_json(&Output::ok(summary));
    }

    println!("File: {}", summary.file);
    println!("Actions: {}", summary.actions);
    println!("Duration: {:.2}s", summary.duration);
    println!(
        "\nSummary: {} clicks, {} moves, {} keys, {} scrolls",
        summary.clicks, summary.moves, summary.keys, summary.scrolls
    );
    if all {
        for (i, a) in sequence.iter().enumerate() {
            println!("{}: {:>8.3}s {:?}", i, a.timestamp, a.input);
        }
    }
    Ok(())
}

fn delete(settings: &Settings, file: &str) -> Result<()> {
    let storage = open_storage(settings)?;
    storage.delete(file)?;
    println!("Deleted: {}", file);
    Ok(())
}

fn permissions(settings: &Settings, request: bool, json: bool) -> Result<()> {
    let session = Session::native(settings.recorder_config());
    let perms = if request { session.request_permissions() } else { session.permissions() };
    if json {
        return print_json(&Output::ok(perms));
    }
    println!("Accessibility: {}", if perms.accessibility { "OK" } else { "DENIED" });
    println!("Input Monitoring: {}", if perms.input_monitoring { "OK" } else { "DENIED" });
    if !perms.all_granted() && !request {
        println!("\nRun with --request to request permissions");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use littletask_core::{ActionSink, CaptureBackend, Synthesizer};
    use std::sync::atomic::AtomicBool;
    use std::thread;

    struct FixedPermissions {
        granted: bool,
    }

    impl CaptureBackend for FixedPermissions {
        fn permissions(&self) -> PermissionStatus {
            PermissionStatus {
                accessibility: self.granted,
                input_monitoring: self.granted,
            }
        }

        fn spawn_hook(
            &self,
            _sink: ActionSink,
            _stop: Arc<AtomicBool>,
            _config: &RecorderConfig,
        ) -> littletask_core::Result<thread::JoinHandle<()>> {
            Ok(thread::spawn(|| {}))
        }
    }

    struct NoSynth;

    impl Synthesizer for NoSynth {
        fn post(&self, _input: &Input) -> littletask_core::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_missing_permission_is_an_error_with_code() {
        let session = Session::new(FixedPermissions { granted: false }, NoSynth);
        let err = require_permissions(&session).unwrap_err();

        let output = Output::err(&err);
        assert!(!output.success);
        let error = output.error.unwrap();
        assert_eq!(error.code, Some(ErrorCode::PermissionDenied));
        assert!(error.message.contains("permission required"));
    }

    #[test]
    fn test_granted_permission_passes() {
        let session = Session::new(FixedPermissions { granted: true }, NoSynth);
        assert!(require_permissions(&session).is_ok());
    }
}
