use crate::command::Command;
use crate::message::Msg;

/// The top-level application trait, following the [Elm Architecture].
///
/// Every boba application implements `Model`. The runtime drives a continuous
/// **init -> update -> view** cycle:
///
/// 1. [`init`](Model::init) creates the initial state and may return a
///    [`Command`] for early side effects (e.g. starting a timer).
/// 2. [`view`](Model::view) renders the current state to a string.
/// 3. Key presses and command results arrive as [`Msg`] values.
/// 4. [`update`](Model::update) processes each message, mutates state, and
///    optionally returns a [`Command`] for further work.
/// 5. Steps 2--4 repeat until a quit message arrives.
///
/// The runtime owns the only live model and lends it exclusively to
/// `update`, so state is never mutated from two places at once.
///
/// # Example
///
/// ```rust
/// use boba_core::{Command, Model, Msg};
/// use crossterm::event::KeyCode;
///
/// struct Counter {
///     count: i32,
/// }
///
/// impl Model for Counter {
///     type Message = ();
///     type Flags = ();
///
///     fn init(_flags: ()) -> (Self, Command<()>) {
///         (Counter { count: 0 }, Command::none())
///     }
///
///     fn update(&mut self, msg: Msg<()>) -> Command<()> {
///         if let Msg::Key(key) = msg {
///             match key.code {
///                 KeyCode::Char('+') => self.count += 1,
///                 KeyCode::Char('-') => self.count -= 1,
///                 KeyCode::Char('q') => return Command::quit(),
///                 _ => {}
///             }
///         }
///         Command::none()
///     }
///
///     fn view(&self) -> String {
///         format!("Count: {}\n", self.count)
///     }
/// }
/// ```
///
/// [Elm Architecture]: https://guide.elm-lang.org/architecture/
pub trait Model: Sized + Send + 'static {
    /// The application's own message type, carried by [`Msg::Custom`].
    type Message: Send + 'static;

    /// Initialization data passed to [`Model::init`].
    ///
    /// Use `()` when no startup data is needed.
    type Flags: Send + 'static;

    /// Create the initial model state and an optional startup command.
    ///
    /// Called once, after the terminal has been set up. The command runs in
    /// the background; the first paint does not wait for it.
    fn init(flags: Self::Flags) -> (Self, Command<Self::Message>);

    /// Process a message, mutate state, and return a command for side effects.
    ///
    /// Receives key presses and application messages. [`Msg::Quit`] and
    /// [`Msg::Batch`] are handled by the runtime and never arrive here.
    /// After `update` returns, the runtime repaints.
    fn update(&mut self, msg: Msg<Self::Message>) -> Command<Self::Message>;

    /// Render the current state as text.
    ///
    /// Should be a pure function of `&self`. Lines are separated by `\n`.
    fn view(&self) -> String;
}
