use crate::command::Command;
use crossterm::event::KeyEvent;
use std::fmt;
use std::sync::Arc;

/// Something that happened: the unit of work flowing through the runtime's
/// dispatch queue.
///
/// `Key`, `Quit`, and `Batch` are the built-in variants. Everything an
/// application defines for itself (timer ticks, finished downloads, ...)
/// travels as [`Msg::Custom`] carrying the model's own message type.
///
/// The runtime intercepts `Quit` and `Batch`; they never reach
/// [`Model::update`](crate::Model::update).
///
/// A `Msg` is moved across threads, so it owns everything it carries.
pub enum Msg<M: Send + 'static> {
    /// One decoded key press from the terminal.
    Key(KeyEvent),
    /// Stop the program.
    Quit,
    /// Commands to schedule individually, in order. Not rendered.
    Batch(Vec<Command<M>>),
    /// An application-defined message.
    Custom(M),
}

impl<M: Send + 'static> Msg<M> {
    /// Returns `true` for the quit variant.
    pub fn is_quit(&self) -> bool {
        matches!(self, Msg::Quit)
    }

    /// Returns the application payload, if this is a custom message.
    pub fn into_custom(self) -> Option<M> {
        match self {
            Msg::Custom(msg) => Some(msg),
            _ => None,
        }
    }

    /// Transform the application payload (for component composition).
    ///
    /// Batched commands are mapped as well, so their results arrive already
    /// converted.
    pub fn map<N: Send + 'static>(self, f: impl Fn(M) -> N + Send + Sync + 'static) -> Msg<N> {
        self.map_with(Arc::new(f))
    }

    pub(crate) fn map_with<N: Send + 'static>(
        self,
        f: Arc<dyn Fn(M) -> N + Send + Sync>,
    ) -> Msg<N> {
        match self {
            Msg::Key(key) => Msg::Key(key),
            Msg::Quit => Msg::Quit,
            Msg::Batch(cmds) => Msg::Batch(
                cmds.into_iter()
                    .map(|cmd| cmd.map_with(f.clone()))
                    .collect(),
            ),
            Msg::Custom(msg) => Msg::Custom(f(msg)),
        }
    }
}

impl<M: Send + 'static> From<KeyEvent> for Msg<M> {
    fn from(key: KeyEvent) -> Self {
        Msg::Key(key)
    }
}

impl<M: fmt::Debug + Send + 'static> fmt::Debug for Msg<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Msg::Key(key) => f.debug_tuple("Key").field(key).finish(),
            Msg::Quit => f.write_str("Quit"),
            Msg::Batch(cmds) => write!(f, "Batch({} commands)", cmds.len()),
            Msg::Custom(msg) => f.debug_tuple("Custom").field(msg).finish(),
        }
    }
}
