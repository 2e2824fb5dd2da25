//! Session management
//!
//! Drives one interactive session over a terminal: raw mode in, geometry
//! probe, then render / read key / dispatch until the user quits, a
//! termination signal arrives, or something fails. Every path ends in the
//! same shutdown step, which runs exactly once.
//!
//! ```text
//! Starting ──ok──> Running ──quit/signal/error──> ShuttingDown ──> Terminated
//!     └──────────────error──────────────────────────┘
//! ```

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::geometry::{GeometryProbe, ScreenGeometry, SizeQuery};
use super::input::{InputReader, KeyEvent};
use crate::error::{Error, Result};
use crate::ui::{Action, FrameRenderer, KeyMapper};

/// Switches the terminal in and out of raw mode.
pub trait ModeControl {
    fn enter(&mut self) -> Result<()>;
    /// Must be safe to call more than once.
    fn exit(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Running,
    ShuttingDown,
    Terminated,
}

/// How a session ended.
#[derive(Debug)]
pub enum Outcome {
    /// The quit key was pressed.
    UserQuit,
    Failed(Error),
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::UserQuit => 0,
            Outcome::Failed(_) => 1,
        }
    }
}

/// A terminal session
pub struct Session<M: ModeControl, Q: SizeQuery, R: Read, W: Write> {
    mode: M,
    probe: GeometryProbe<Q>,
    input: InputReader<R>,
    output: W,
    renderer: FrameRenderer,
    keymap: KeyMapper,
    geometry: Option<ScreenGeometry>,
    state: SessionState,
    /// First fatal error; decides the outcome.
    error: Option<Error>,
    shutdown_done: bool,
    /// Set asynchronously by signal handlers.
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl<M: ModeControl, Q: SizeQuery, R: Read, W: Write> Session<M, Q, R, W> {
    pub fn new(mode: M, probe: GeometryProbe<Q>, input: R, output: W) -> Self {
        Self {
            mode,
            probe,
            input: InputReader::new(input),
            output,
            renderer: FrameRenderer::default(),
            keymap: KeyMapper::default(),
            geometry: None,
            state: SessionState::Starting,
            error: None,
            shutdown_done: false,
            shutdown_flag: None,
        }
    }

    pub fn with_renderer(mut self, renderer: FrameRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_keymap(mut self, keymap: KeyMapper) -> Self {
        self.keymap = keymap;
        self
    }

    /// When `flag` becomes true the session shuts down at the next loop
    /// iteration, as if a fatal error had occurred.
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    #[allow(dead_code)]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[allow(dead_code)]
    pub fn geometry(&self) -> Option<ScreenGeometry> {
        self.geometry
    }

    #[allow(dead_code)]
    pub fn mode(&self) -> &M {
        &self.mode
    }

    /// Run the whole lifecycle and report how it ended.
    pub fn run(&mut self) -> Outcome {
        if let Err(e) = self.start() {
            self.abort(e);
        }

        while self.state == SessionState::Running {
            if let Err(e) = self.step() {
                self.abort(e);
            }
        }

        self.shutdown();

        match self.error.take() {
            Some(e) => Outcome::Failed(e),
            None => Outcome::UserQuit,
        }
    }

    /// Enter raw mode and determine the screen size.
    pub fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Starting {
            return Ok(());
        }

        self.mode.enter()?;
        let geometry = self.probe.probe(self.input.get_mut(), &mut self.output)?;
        self.geometry = Some(geometry);

        info!("quit with {:?}", self.keymap.quit_key());
        self.transition(SessionState::Running);
        Ok(())
    }

    /// One iteration of the main loop.
    pub fn step(&mut self) -> Result<()> {
        if self.shutdown_requested() {
            return Err(Error::Signal);
        }

        self.render()?;
        let key = self.input.read_key()?;
        self.dispatch(key);
        Ok(())
    }

    /// Redraw the screen.
    pub fn render(&mut self) -> Result<()> {
        let Some(geometry) = self.geometry else {
            return Ok(());
        };
        self.renderer
            .draw(&mut self.output, geometry)
            .map_err(|e| Error::io("write", e))
    }

    /// Act on one key. Only a running session reacts to quit, so repeated
    /// quits change state once.
    pub fn dispatch(&mut self, key: KeyEvent) {
        let KeyEvent::Byte(byte) = key else {
            return;
        };

        match self.keymap.map(byte) {
            Action::Quit if self.state == SessionState::Running => {
                info!("quit key pressed");
                self.transition(SessionState::ShuttingDown);
            }
            Action::Quit => debug!("quit key ignored in state {:?}", self.state),
            Action::None => debug!("unbound key {:?}", KeyMapper::decode(byte)),
        }
    }

    /// Clear the screen and restore the terminal. Runs once; later calls
    /// do nothing.
    pub fn shutdown(&mut self) {
        if self.shutdown_done {
            return;
        }
        self.shutdown_done = true;
        self.transition(SessionState::ShuttingDown);

        if let Err(e) = FrameRenderer::clear(&mut self.output) {
            warn!("failed to clear screen on shutdown: {}", e);
            self.record(Error::io("write", e));
        }
        if let Err(e) = self.mode.exit() {
            warn!("failed to restore terminal mode: {}", e);
            self.record(e);
        }

        self.transition(SessionState::Terminated);
    }

    /// Record a fatal error and move to `ShuttingDown`. The next [`run`]
    /// (or [`shutdown`]) restores the terminal and reports it.
    ///
    /// [`run`]: Self::run
    /// [`shutdown`]: Self::shutdown
    pub fn abort(&mut self, e: Error) {
        error!("session error: {}", e);
        self.record(e);
        self.transition(SessionState::ShuttingDown);
    }

    /// Keep the first error only.
    fn record(&mut self, e: Error) {
        if self.error.is_none() {
            self.error = Some(e);
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }
        info!("session state: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }
}

impl<M: ModeControl, Q: SizeQuery, R: Read, W: Write> Drop for Session<M, Q, R, W> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
