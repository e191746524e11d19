use crate::command::{Command, CommandInner};
use crate::input::{new_input_reader, InputError, InputReader, InputSource};
use crate::message::Msg;
use crate::model::Model;
use crate::renderer::Renderer;
use crossterm::{
    cursor, execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use std::collections::VecDeque;
use std::io::{self, stderr, stdout, Stderr, Stdout, Write};
use std::sync::Arc;
use std::thread;
use tokio::sync::{mpsc, watch};

/// Output target for the terminal UI.
///
/// By default the UI renders to **stdout**.  When your program's stdout is
/// piped (e.g. to capture structured output), switch to [`Stderr`](OutputTarget::Stderr)
/// so the UI goes to the terminal while data flows through the pipe.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum OutputTarget {
    /// Write to stdout (default).
    #[default]
    Stdout,
    /// Write to stderr (useful when stdout is piped).
    Stderr,
}

/// Writer that wraps stdout, stderr, or a caller-supplied stream.
enum Output {
    Stdout(Stdout),
    Stderr(Stderr),
    Custom(Box<dyn Write + Send>),
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Stdout(w) => w.write(buf),
            Output::Stderr(w) => w.write(buf),
            Output::Custom(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Stdout(w) => w.flush(),
            Output::Stderr(w) => w.flush(),
            Output::Custom(w) => w.flush(),
        }
    }
}

impl Output {
    fn new(target: OutputTarget) -> Self {
        match target {
            OutputTarget::Stdout => Output::Stdout(stdout()),
            OutputTarget::Stderr => Output::Stderr(stderr()),
        }
    }
}

/// Errors that can occur while initializing or running a [`Program`].
#[derive(Debug, thiserror::Error)]
pub enum ProgramError {
    /// An I/O error from terminal setup, rendering, or teardown.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Setting up or reading the input stream failed.
    #[error("input error: {0}")]
    Input(#[from] InputError),
}

/// Configuration options for a [`Program`].
///
/// All fields have sensible defaults (see [`Default`] impl).  Use struct
/// update syntax to override only the options you need:
///
/// # Example
///
/// ```rust,ignore
/// use boba_core::{ProgramOptions, OutputTarget};
///
/// let opts = ProgramOptions {
///     alt_screen: true,
///     output: OutputTarget::Stderr,
///     ..ProgramOptions::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ProgramOptions {
    /// Put the terminal in raw mode while running (default: true).
    pub raw_mode: bool,
    /// Hide the cursor while running (default: true).
    pub hide_cursor: bool,
    /// Start in alternate screen (default: false).
    pub alt_screen: bool,
    /// Whether to catch panics and restore terminal (default: true).
    pub catch_panics: bool,
    /// Treat SIGINT delivered to the process as a quit (default: true).
    ///
    /// In raw mode Ctrl+C arrives as a key press instead.
    pub handle_signals: bool,
    /// Output target: stdout (default) or stderr.
    pub output: OutputTarget,
}

impl Default for ProgramOptions {
    fn default() -> Self {
        Self {
            raw_mode: true,
            hide_cursor: true,
            alt_screen: false,
            catch_panics: true,
            handle_signals: true,
            output: OutputTarget::default(),
        }
    }
}

/// Scoped terminal session: acquired at start, restored on drop.
///
/// Owns the output stream; repaints are written through the guard.
struct TerminalGuard {
    out: Output,
    raw_mode: bool,
    hide_cursor: bool,
    alt_screen: bool,
}

impl TerminalGuard {
    fn acquire(out: Output, options: &ProgramOptions) -> Result<Self, ProgramError> {
        if options.catch_panics {
            install_panic_hook(options);
        }
        if options.raw_mode {
            enable_raw_mode()?;
        }
        // From here on, dropping `terminal` undoes whatever was set up.
        let mut terminal = TerminalGuard {
            out,
            raw_mode: options.raw_mode,
            hide_cursor: false,
            alt_screen: false,
        };
        if options.alt_screen {
            execute!(terminal.out, EnterAlternateScreen)?;
            terminal.alt_screen = true;
        }
        if options.hide_cursor {
            execute!(terminal.out, cursor::Hide)?;
            terminal.hide_cursor = true;
        }
        Ok(terminal)
    }
}

impl Write for TerminalGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.out.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        // Best-effort: keep restoring even if one step fails.
        if self.hide_cursor {
            execute!(self.out, cursor::Show).ok();
        }
        if self.alt_screen {
            execute!(self.out, LeaveAlternateScreen).ok();
        }
        if self.raw_mode {
            if let Err(e) = disable_raw_mode() {
                tracing::warn!(error = %e, "restoring terminal mode");
            }
        }
    }
}

/// Restore the terminal before the default panic message is printed.
fn install_panic_hook(options: &ProgramOptions) {
    use std::sync::Once;
    static HOOK_INSTALLED: Once = Once::new();
    let raw_mode = options.raw_mode;
    let alt_screen = options.alt_screen;
    let output_target = options.output;
    HOOK_INSTALLED.call_once(|| {
        let original_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let mut writer = Output::new(output_target);
            execute!(writer, cursor::Show).ok();
            if alt_screen {
                execute!(writer, LeaveAlternateScreen).ok();
            }
            if raw_mode {
                disable_raw_mode().ok();
            }
            original_hook(info);
        }));
    });
}

/// The program runtime.  Manages terminal setup, the event loop, and the
/// full [`Model`] lifecycle.
///
/// [`run`](Program::run) moves through four phases:
///
/// 1. **initializing** -- acquire the terminal, build the input reader, call
///    [`Model::init`], schedule its command, paint the first view.
/// 2. **running** -- an input pump thread forwards key presses and a command
///    dispatcher task runs commands; the loop feeds every message through
///    [`Model::update`] and repaints.  Messages that need no work
///    ([`Command::message`], [`Command::quit`], batches) are handled before
///    the next queued event.
/// 3. **terminating** -- on a quit message, a signal, or an input failure the
///    background work is told to stop and the input reader is cancelled.
/// 4. **terminated** -- the terminal is restored and the final model (or the
///    input error) is returned.
///
/// # Example
///
/// ```rust,ignore
/// use boba_core::{Program, ProgramError};
///
/// #[tokio::main]
/// async fn main() -> Result<(), ProgramError> {
///     let model = Program::<MyApp>::new(()).run().await?;
///     // `model` is the final state after quit
///     Ok(())
/// }
/// ```
pub struct Program<M: Model> {
    flags: M::Flags,
    options: ProgramOptions,
    input: Option<InputSource>,
    output: Option<Output>,
}

impl<M: Model> Program<M> {
    /// Create a new program with default options.
    pub fn new(flags: M::Flags) -> Self {
        Self::with_options(flags, ProgramOptions::default())
    }

    /// Create a new program with custom options.
    pub fn with_options(flags: M::Flags, options: ProgramOptions) -> Self {
        Self {
            flags,
            options,
            input: None,
            output: None,
        }
    }

    /// Read input from `source` instead of stdin.
    pub fn with_input(mut self, source: InputSource) -> Self {
        self.input = Some(source);
        self
    }

    /// Paint to `writer` instead of [`ProgramOptions::output`].
    pub fn with_output(mut self, writer: impl Write + Send + 'static) -> Self {
        self.output = Some(Output::Custom(Box::new(writer)));
        self
    }

    /// Run the program until it quits. Returns the final model.
    ///
    /// An input failure ends the program and is returned as
    /// [`ProgramError::Input`]. The terminal is restored on every path.
    pub async fn run(self) -> Result<M, ProgramError> {
        let Program {
            flags,
            options,
            input,
            output,
        } = self;

        let output = output.unwrap_or_else(|| Output::new(options.output));
        let mut terminal = TerminalGuard::acquire(output, &options)?;
        let source = match input {
            Some(source) => source,
            None => InputSource::stdin()?,
        };
        let reader: Arc<dyn InputReader> = Arc::from(new_input_reader(source)?);

        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event<M::Message>>();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command<M::Message>>();
        let (done_tx, done_rx) = watch::channel(false);
        let mut ready = VecDeque::new();

        let (mut model, init_cmd) = M::init(flags);
        tracing::debug!("program initialized");

        tokio::spawn(dispatch_commands(cmd_rx, event_tx.clone(), done_rx));
        schedule(&mut ready, &cmd_tx, init_cmd);

        let mut renderer = Renderer::new();
        renderer.render(&mut terminal, &model.view())?;

        if let Err(e) = spawn_input_pump(reader.clone(), event_tx) {
            reader.close().ok();
            return Err(e.into());
        }

        let outcome = loop {
            let msg = match ready.pop_front() {
                Some(msg) => msg,
                None => tokio::select! {
                    biased;

                    Ok(()) = tokio::signal::ctrl_c(), if options.handle_signals => {
                        tracing::debug!("received ctrl+c signal");
                        break Ok(());
                    }

                    event = event_rx.recv() => match event {
                        Some(Event::Msg(msg)) => msg,
                        Some(Event::InputFailed(err)) => {
                            tracing::error!(error = %err, "input failed");
                            break Err(ProgramError::Input(err));
                        }
                        None => break Ok(()),
                    },
                },
            };

            match msg {
                Msg::Quit => {
                    tracing::debug!("quit requested");
                    break Ok(());
                }
                Msg::Batch(cmds) => {
                    for cmd in cmds {
                        schedule(&mut ready, &cmd_tx, cmd);
                    }
                }
                msg => {
                    let cmd = model.update(msg);
                    schedule(&mut ready, &cmd_tx, cmd);
                    if let Err(e) = renderer.render(&mut terminal, &model.view()) {
                        break Err(ProgramError::Io(e));
                    }
                }
            }
        };

        tracing::debug!("shutting down");
        let _ = done_tx.send(true);
        if !reader.cancel() {
            tracing::debug!("input reader cannot be cancelled; pump exits on its next read");
        }
        drop(terminal);

        outcome.map(|()| model)
    }
}

/// What the main loop receives, in the order it was produced.
///
/// Keys and an input failure share one queue, so keys read before a failure
/// always reach `update` first.
enum Event<T: Send + 'static> {
    Msg(Msg<T>),
    InputFailed(InputError),
}

/// Route a command. Ready messages go straight to `ready`, `none` is
/// dropped, and anything that has to run goes to the dispatcher.
fn schedule<T: Send + 'static>(
    ready: &mut VecDeque<Msg<T>>,
    cmds: &mpsc::UnboundedSender<Command<T>>,
    cmd: Command<T>,
) {
    match cmd.inner {
        CommandInner::None => {}
        CommandInner::Message(msg) => ready.push_back(msg),
        inner => {
            let _ = cmds.send(Command { inner });
        }
    }
}

/// Start every queued command on its own task until `done` fires.
async fn dispatch_commands<T: Send + 'static>(
    mut cmds: mpsc::UnboundedReceiver<Command<T>>,
    events: mpsc::UnboundedSender<Event<T>>,
    mut done: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = done.changed() => return,
            Some(cmd) = cmds.recv() => execute_command(cmd, &events),
            else => return,
        }
    }
}

fn execute_command<T: Send + 'static>(cmd: Command<T>, events: &mpsc::UnboundedSender<Event<T>>) {
    match cmd.inner {
        CommandInner::None => {}
        CommandInner::Message(msg) => {
            let _ = events.send(Event::Msg(msg));
        }
        CommandInner::Blocking(run) => {
            let tx = events.clone();
            tokio::task::spawn_blocking(move || {
                let _ = tx.send(Event::Msg(run()));
            });
        }
        CommandInner::Future(fut) => {
            let tx = events.clone();
            tokio::spawn(async move {
                let _ = tx.send(Event::Msg(fut.await));
            });
        }
    }
}

/// Read input on a dedicated thread until cancelled or failed, then release
/// the reader.
fn spawn_input_pump<T: Send + 'static>(
    reader: Arc<dyn InputReader>,
    events: mpsc::UnboundedSender<Event<T>>,
) -> io::Result<()> {
    thread::Builder::new()
        .name("boba-input".into())
        .spawn(move || {
            'pump: loop {
                match reader.read_input() {
                    Ok(keys) => {
                        for key in keys {
                            if events.send(Event::Msg(Msg::Key(key))).is_err() {
                                break 'pump;
                            }
                        }
                    }
                    Err(e) if e.is_canceled() => break,
                    Err(e) => {
                        let _ = events.send(Event::InputFailed(e));
                        break;
                    }
                }
            }
            if let Err(e) = reader.close() {
                tracing::warn!(error = %e, "closing input reader");
            }
        })?;
    Ok(())
}

/// Switch to the alternate screen buffer.
pub fn alt_screen() -> io::Result<()> {
    execute!(stdout(), EnterAlternateScreen)
}

/// Return from the alternate screen buffer.
pub fn exit_alt_screen() -> io::Result<()> {
    execute!(stdout(), LeaveAlternateScreen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::DecodeError;
    use crossterm::event::KeyCode;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Clonable in-memory writer so tests can inspect what was painted.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn headless() -> ProgramOptions {
        ProgramOptions {
            raw_mode: false,
            hide_cursor: false,
            catch_panics: false,
            handle_signals: false,
            ..ProgramOptions::default()
        }
    }

    #[cfg(unix)]
    fn idle_input() -> (InputSource, std::os::unix::net::UnixStream) {
        let (file, writer) = crate::input::test_util::stream_pair();
        (InputSource::File(file), writer)
    }

    struct QuitAtStart {
        updates: usize,
    }

    impl Model for QuitAtStart {
        type Message = ();
        type Flags = ();

        fn init(_: ()) -> (Self, Command<()>) {
            (QuitAtStart { updates: 0 }, Command::quit())
        }

        fn update(&mut self, _msg: Msg<()>) -> Command<()> {
            self.updates += 1;
            Command::none()
        }

        fn view(&self) -> String {
            "ready\n".into()
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn quit_from_init_paints_once() {
        let (input, _writer) = idle_input();
        let out = SharedBuf::default();
        let model = Program::<QuitAtStart>::with_options((), headless())
            .with_input(input)
            .with_output(out.clone())
            .run()
            .await
            .unwrap();
        assert_eq!(model.updates, 0);
        assert_eq!(out.contents(), "ready\r\n");
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    enum Done {
        Blocking,
        Async,
    }

    struct BatchModel {
        seen: Vec<Done>,
    }

    impl Model for BatchModel {
        type Message = Done;
        type Flags = ();

        fn init(_: ()) -> (Self, Command<Done>) {
            let cmd = Command::batch([
                Command::new(|| Msg::Custom(Done::Blocking)),
                Command::perform(async {}, |()| Done::Async),
            ]);
            (BatchModel { seen: vec![] }, cmd)
        }

        fn update(&mut self, msg: Msg<Done>) -> Command<Done> {
            if let Msg::Custom(done) = msg {
                self.seen.push(done);
            }
            if self.seen.len() == 2 {
                Command::quit()
            } else {
                Command::none()
            }
        }

        fn view(&self) -> String {
            format!("{}\n", self.seen.len())
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn batched_commands_each_deliver_once() {
        let (input, _writer) = idle_input();
        let model = Program::<BatchModel>::with_options((), headless())
            .with_input(input)
            .with_output(SharedBuf::default())
            .run()
            .await
            .unwrap();
        let mut seen = model.seen;
        seen.sort();
        assert_eq!(seen, vec![Done::Blocking, Done::Async]);
    }

    struct CountingModel {
        updates: Arc<AtomicUsize>,
    }

    impl Model for CountingModel {
        type Message = ();
        type Flags = Arc<AtomicUsize>;

        fn init(updates: Arc<AtomicUsize>) -> (Self, Command<()>) {
            (CountingModel { updates }, Command::none())
        }

        fn update(&mut self, _msg: Msg<()>) -> Command<()> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            Command::none()
        }

        fn view(&self) -> String {
            String::new()
        }
    }

    #[tokio::test]
    async fn input_failure_ends_the_program() {
        let updates = Arc::new(AtomicUsize::new(0));
        let result = Program::<CountingModel>::with_options(updates.clone(), headless())
            .with_input(InputSource::Reader(Box::new(Cursor::new(Vec::new()))))
            .with_output(SharedBuf::default())
            .run()
            .await;
        assert!(matches!(
            result,
            Err(ProgramError::Input(InputError::Decode(DecodeError::Eof)))
        ));
        assert_eq!(updates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn keys_read_before_a_failure_are_delivered() {
        let updates = Arc::new(AtomicUsize::new(0));
        let result = Program::<CountingModel>::with_options(updates.clone(), headless())
            .with_input(InputSource::Reader(Box::new(Cursor::new(b"xy".to_vec()))))
            .with_output(SharedBuf::default())
            .run()
            .await;
        assert!(matches!(
            result,
            Err(ProgramError::Input(InputError::Decode(DecodeError::Eof)))
        ));
        assert_eq!(updates.load(Ordering::SeqCst), 2);
    }

    struct QuitOnKey;

    impl Model for QuitOnKey {
        type Message = ();
        type Flags = ();

        fn init(_: ()) -> (Self, Command<()>) {
            (QuitOnKey, Command::none())
        }

        fn update(&mut self, msg: Msg<()>) -> Command<()> {
            match msg {
                Msg::Key(_) => Command::quit(),
                _ => Command::none(),
            }
        }

        fn view(&self) -> String {
            String::new()
        }
    }

    #[tokio::test]
    async fn quit_on_last_key_wins_over_end_of_input() {
        for _ in 0..20 {
            let result = Program::<QuitOnKey>::with_options((), headless())
                .with_input(InputSource::Reader(Box::new(Cursor::new(b"q".to_vec()))))
                .with_output(SharedBuf::default())
                .run()
                .await;
            assert!(result.is_ok(), "got {:?}", result.err());
        }
    }

    struct Typist {
        typed: String,
    }

    impl Model for Typist {
        type Message = ();
        type Flags = ();

        fn init(_: ()) -> (Self, Command<()>) {
            (Typist { typed: String::new() }, Command::none())
        }

        fn update(&mut self, msg: Msg<()>) -> Command<()> {
            match msg {
                Msg::Key(key) if key.code == KeyCode::Enter => Command::quit(),
                Msg::Key(key) => {
                    if let KeyCode::Char(c) = key.code {
                        self.typed.push(c);
                    }
                    Command::none()
                }
                _ => Command::none(),
            }
        }

        fn view(&self) -> String {
            format!("> {}\n", self.typed)
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn key_presses_reach_update_and_repaint() {
        let (input, mut writer) = idle_input();
        writer.write_all(b"hi\r").unwrap();
        let out = SharedBuf::default();
        let model = Program::<Typist>::with_options((), headless())
            .with_input(input)
            .with_output(out.clone())
            .run()
            .await
            .unwrap();
        assert_eq!(model.typed, "hi");

        // Initial paint plus one repaint per key, each clearing one line.
        let painted = out.contents();
        assert!(painted.starts_with("> \r\n"));
        assert!(painted.ends_with("> hi\r\n"));
        assert_eq!(painted.matches("\x1b[1A").count(), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn input_reader_is_released_after_quit() {
        use std::io::Read;
        use std::time::Duration;

        let (input, mut writer) = idle_input();
        Program::<QuitAtStart>::with_options((), headless())
            .with_input(input)
            .with_output(SharedBuf::default())
            .run()
            .await
            .unwrap();

        // The pump thread observes the cancel, closes the reader, and drops
        // the input stream, so the peer sees end of file.
        writer
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(writer.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn default_options() {
        let opts = ProgramOptions::default();
        assert!(opts.raw_mode);
        assert!(opts.hide_cursor);
        assert!(!opts.alt_screen);
        assert!(opts.catch_panics);
        assert!(opts.handle_signals);
        assert_eq!(opts.output, OutputTarget::Stdout);
    }

    #[test]
    fn error_display() {
        let err = ProgramError::from(InputError::Canceled);
        assert_eq!(err.to_string(), "input error: read canceled");
    }
}
