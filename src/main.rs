//! dterm - a raw-mode terminal session
//!
//! dterm puts the controlling terminal into raw mode, works out the screen
//! size, and redraws a blank editor-style screen (one filler glyph per row)
//! until Ctrl+Q is pressed. The terminal is always restored on the way out:
//! on quit, on errors, on termination signals and on panics.
//!
//! # Quick Start
//!
//! ```text
//! dterm                       # Run a session
//! dterm -g fallback           # Ask the terminal for its size, skip the ioctl
//! dterm --dump-frame 5x10     # Print one frame's bytes and exit
//! ```

mod config;
mod core;
mod error;
mod logging;
mod ui;

use std::env;
use std::path::PathBuf;
use std::process;

use tracing::{info, warn};

use crate::config::{Config, Settings};
use crate::core::geometry::ScreenGeometry;
use crate::core::session::Outcome;
use crate::error::Error;
use crate::ui::{DebugRenderer, FrameRenderer};

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Command-line options
#[derive(Debug, Default, PartialEq)]
struct Options {
    config_path: Option<PathBuf>,
    geometry: Option<String>,
    dump_frame: Option<ScreenGeometry>,
}

#[derive(Debug, PartialEq)]
enum Command {
    Run(Options),
    Help,
    Version,
}

fn print_version() {
    println!("dterm {}", VERSION);
}

fn print_help() {
    println!("dterm {} - a raw-mode terminal session", VERSION);
    println!();
    println!("Usage: dterm [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -g, --geometry <MODE>   Screen size source: auto, direct, fallback");
    println!("  -c, --config <PATH>     Config file (default: ~/.dterm/config.toml)");
    println!("  --dump-frame <ROWSxCOLS>");
    println!("                          Print the escaped bytes of one frame and exit");
    println!("  -v, --version           Show version");
    println!("  -h, --help              Show this help");
    println!();
    println!("Keys:");
    println!("  Ctrl+Q                  Quit (see quit_key in the config file)");
    println!();
    println!("Logs go to ~/.dterm/dterm.log; set {} to change the filter.", logging::LOG_ENV);
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Command, Error> {
    let mut options = Options::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-v" | "--version" => return Ok(Command::Version),
            "-g" | "--geometry" => {
                options.geometry = Some(value(&arg, args.next())?);
            }
            "-c" | "--config" => {
                options.config_path = Some(PathBuf::from(value(&arg, args.next())?));
            }
            "--dump-frame" => {
                options.dump_frame = Some(parse_size(&value(&arg, args.next())?)?);
            }
            other => {
                return Err(Error::Config(format!("unknown argument: {}", other)));
            }
        }
    }

    Ok(Command::Run(options))
}

fn value(flag: &str, next: Option<String>) -> Result<String, Error> {
    next.ok_or_else(|| Error::Config(format!("missing value for {}", flag)))
}

/// `ROWSxCOLS`, e.g. `24x80`.
fn parse_size(text: &str) -> Result<ScreenGeometry, Error> {
    let bad = || Error::Config(format!("invalid size {:?} (expected ROWSxCOLS)", text));
    let (rows, columns) = text.split_once(['x', 'X']).ok_or_else(bad)?;
    let rows = rows.trim().parse().map_err(|_| bad())?;
    let columns = columns.trim().parse().map_err(|_| bad())?;
    ScreenGeometry::new(rows, columns).map_err(|_| bad())
}

/// Load the config file and apply command-line overrides. A file that
/// cannot be parsed is replaced by defaults; the error is handed back so it
/// can be logged once logging is up.
fn load_settings(options: &Options) -> Result<(Settings, Option<Error>), Error> {
    let path = options.config_path.clone().or_else(config::default_path);

    let (mut config, load_error) = match &path {
        Some(path) => match Config::read(path) {
            Ok(Some(config)) => (config, None),
            Ok(None) if options.config_path.is_some() => {
                return Err(Error::Config(format!("{}: file not found", path.display())));
            }
            Ok(None) => (Config::default(), None),
            Err(e) => (Config::default(), Some(e)),
        },
        None => (Config::default(), None),
    };

    if let Some(geometry) = &options.geometry {
        config.geometry = geometry.clone();
    }

    Ok((config.settings()?, load_error))
}

fn fail(err: &Error) -> ! {
    eprintln!("dterm: {}", err);
    process::exit(1);
}

fn main() -> anyhow::Result<()> {
    let options = match parse_args(env::args().skip(1)) {
        Ok(Command::Run(options)) => options,
        Ok(Command::Help) => {
            print_help();
            return Ok(());
        }
        Ok(Command::Version) => {
            print_version();
            return Ok(());
        }
        Err(e) => {
            eprintln!("Use --help for usage information");
            fail(&e);
        }
    };

    let (settings, load_error) = match load_settings(&options) {
        Ok(loaded) => loaded,
        Err(e) => fail(&e),
    };

    if let Some(geometry) = options.dump_frame {
        let frame = FrameRenderer::new(settings.filler).compose(geometry);
        println!("{}", DebugRenderer::render(&frame));
        return Ok(());
    }

    let log_path = logging::init(settings.log_level);
    info!("dterm {} starting (log: {:?})", VERSION, log_path);
    if let Some(e) = load_error {
        warn!("{}; using defaults", e);
    }

    let outcome = app::run(&settings)?;
    info!("session ended: {:?}", outcome);

    if let Outcome::Failed(e) = &outcome {
        eprintln!("dterm: {}", e);
    }
    process::exit(outcome.exit_code());
}

#[cfg(unix)]
mod app {
    use std::fs::File;
    use std::io;
    use std::os::fd::AsFd;
    use std::panic;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use anyhow::Context;
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
    use signal_hook::{flag, low_level, SigId};
    use tracing::{debug, info, warn};

    use crate::config::Settings;
    use crate::core::geometry::{GeometryProbe, WinsizeQuery};
    use crate::core::mode::{ArmedRestore, RawModeConfig, TerminalMode};
    use crate::core::session::{Outcome, Session};
    use crate::ui::{FrameRenderer, KeyMapper};

    pub(crate) const SHUTDOWN_SIGNALS: [i32; 4] = [SIGINT, SIGTERM, SIGHUP, SIGQUIT];

    /// Run one session on the process's stdin/stdout. The returned outcome
    /// is produced after the terminal has been restored.
    pub fn run(settings: &Settings) -> anyhow::Result<Outcome> {
        let stdin = io::stdin()
            .as_fd()
            .try_clone_to_owned()
            .context("failed to duplicate stdin")?;
        let stdout = io::stdout()
            .as_fd()
            .try_clone_to_owned()
            .context("failed to duplicate stdout")?;

        let shutdown = Arc::new(AtomicBool::new(false));
        for signal in SHUTDOWN_SIGNALS {
            flag::register(signal, Arc::clone(&shutdown))
                .with_context(|| format!("failed to register handler for signal {}", signal))?;
        }
        debug!("shutdown signals registered: {:?}", SHUTDOWN_SIGNALS);

        let mode = TerminalMode::new(
            stdin.try_clone().context("failed to duplicate stdin")?,
            RawModeConfig::new(settings.read_timeout),
        );
        let probe = GeometryProbe::new(
            settings.strategy,
            WinsizeQuery::new(stdout.try_clone().context("failed to duplicate stdout")?),
        );
        info!("geometry strategy: {}", probe.strategy().name());

        let mut session = Session::new(mode, probe, File::from(stdin), File::from(stdout))
            .with_renderer(FrameRenderer::new(settings.filler))
            .with_keymap(KeyMapper::new(settings.quit_key))
            .with_shutdown_flag(shutdown);

        let mut guard = None;
        match session.start() {
            Ok(()) => {
                if let Some(handle) = session.mode().restore_handle() {
                    guard = Some(RestoreGuard::install(ArmedRestore::new(handle))?);
                }
            }
            Err(e) => session.abort(e),
        }

        let outcome = session.run();
        // Disarm before the session closes the descriptor.
        drop(guard);
        drop(session);
        Ok(outcome)
    }

    /// Restores the terminal from outside normal control flow while a
    /// session is live: in the panic hook, and on a second termination
    /// signal before the default action kills the process.
    pub(crate) struct RestoreGuard {
        restore: ArmedRestore,
        actions: Vec<SigId>,
    }

    impl RestoreGuard {
        pub(crate) fn install(restore: ArmedRestore) -> anyhow::Result<Self> {
            install_panic_hook(restore.clone());

            let mut guard = Self {
                restore,
                actions: Vec::with_capacity(SHUTDOWN_SIGNALS.len()),
            };
            let received = Arc::new(AtomicBool::new(false));
            for signal in SHUTDOWN_SIGNALS {
                let restore = guard.restore.clone();
                let received = Arc::clone(&received);
                // SAFETY: the action loads atomics, calls tcsetattr and
                // re-raises the signal; all of these are async-signal-safe.
                let id = unsafe {
                    low_level::register(signal, move || {
                        if received.swap(true, Ordering::SeqCst) {
                            let _ = restore.restore();
                            let _ = low_level::emulate_default_handler(signal);
                        }
                    })
                }
                .with_context(|| format!("failed to register handler for signal {}", signal))?;
                guard.actions.push(id);
            }
            Ok(guard)
        }
    }

    impl Drop for RestoreGuard {
        fn drop(&mut self) {
            self.restore.disarm();
            for id in self.actions.drain(..) {
                if !low_level::unregister(id) {
                    warn!("signal action already unregistered");
                }
            }
        }
    }

    /// Restore the terminal before the previous hook prints the panic. The
    /// hook stays installed but does nothing once `restore` is disarmed.
    fn install_panic_hook(restore: ArmedRestore) {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let _ = restore.restore();
            previous(info);
        }));
    }

}

#[cfg(not(unix))]
mod app {
    use crate::config::Settings;
    use crate::core::session::Outcome;

    pub fn run(_settings: &Settings) -> anyhow::Result<Outcome> {
        anyhow::bail!("dterm needs a Unix terminal (termios)")
    }
}
