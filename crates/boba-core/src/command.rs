use crate::message::Msg;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A side effect returned from [`Model::update`](crate::Model::update) or
/// [`Model::init`](crate::Model::init).
///
/// A command runs at most once, on its own unit of execution, and produces
/// exactly one [`Msg`] which the runtime feeds back into the dispatch queue.
/// [`Command::none`] is the "no command" value; the runtime drops it instead
/// of scheduling it.
///
/// Commands have no error channel. An effect that can fail should encode the
/// failure in the message it returns.
///
/// # Examples
///
/// ```rust,ignore
/// // Do nothing:
/// let cmd = Command::none();
///
/// // Run a blocking closure on the blocking pool:
/// let cmd = Command::new(|| Msg::Custom(AppMsg::Loaded(std::fs::read_to_string("data.txt"))));
///
/// // Run an async task and map the result to a message:
/// let cmd = Command::perform(async { fetch_data().await }, AppMsg::Fetched);
///
/// // Quit the program:
/// let cmd = Command::quit();
/// ```
pub struct Command<M: Send + 'static> {
    pub(crate) inner: CommandInner<M>,
}

pub(crate) enum CommandInner<M: Send + 'static> {
    None,
    /// Already resolved; delivered without spawning anything.
    Message(Msg<M>),
    /// Runs on the blocking thread pool.
    Blocking(Box<dyn FnOnce() -> Msg<M> + Send>),
    /// Runs as an async task.
    Future(BoxFuture<'static, Msg<M>>),
}

impl<M: Send + 'static> Command<M> {
    /// No-op command.
    pub fn none() -> Self {
        Command {
            inner: CommandInner::None,
        }
    }

    /// Run a (possibly blocking) closure on its own thread and deliver the
    /// message it returns.
    pub fn new(f: impl FnOnce() -> Msg<M> + Send + 'static) -> Self {
        Command {
            inner: CommandInner::Blocking(Box::new(f)),
        }
    }

    /// Run an async future, map the result to a message.
    pub fn perform<F, T>(future: F, map: impl FnOnce(T) -> M + Send + 'static) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Command {
            inner: CommandInner::Future(Box::pin(async move { Msg::Custom(map(future.await)) })),
        }
    }

    /// Send an application message immediately.
    pub fn message(msg: M) -> Self {
        Command {
            inner: CommandInner::Message(Msg::Custom(msg)),
        }
    }

    /// Quit the program.
    pub fn quit() -> Self {
        Command {
            inner: CommandInner::Message(Msg::Quit),
        }
    }

    /// Run multiple commands concurrently, with no ordering guarantee on
    /// their results.
    ///
    /// The commands are submitted in iteration order. `none` commands are
    /// dropped; an empty batch is itself `none`.
    pub fn batch(cmds: impl IntoIterator<Item = Command<M>>) -> Self {
        let mut cmds: Vec<_> = cmds.into_iter().filter(|cmd| !cmd.is_none()).collect();
        match cmds.len() {
            0 => Command::none(),
            1 => cmds.pop().unwrap_or_else(Command::none),
            _ => Command {
                inner: CommandInner::Message(Msg::Batch(cmds)),
            },
        }
    }

    /// One-shot timer: fires once after `duration`, mapping the wall-clock
    /// time it fired at to a message.
    ///
    /// The timer starts when the command starts executing and runs for the
    /// whole duration.
    pub fn tick(duration: Duration, map: impl FnOnce(SystemTime) -> M + Send + 'static) -> Self {
        Command::perform(
            async move {
                tokio::time::sleep(duration).await;
                SystemTime::now()
            },
            map,
        )
    }

    /// Timer aligned to the system clock: fires at the next multiple of
    /// `interval` since the Unix epoch.
    ///
    /// Ticking every minute while the clock reads 12:34:20 fires at 12:35:00,
    /// forty seconds later. The first tick is therefore usually shorter than
    /// `interval`, and an application re-arming it from `update` under load
    /// may skip a boundary entirely. Several `every` timers with the same
    /// interval fire in lockstep.
    pub fn every(interval: Duration, map: impl FnOnce(SystemTime) -> M + Send + 'static) -> Self {
        Command::perform(
            async move {
                let wait = until_next_boundary(SystemTime::now(), interval);
                tokio::time::sleep(wait).await;
                SystemTime::now()
            },
            map,
        )
    }

    /// Transform the message type (for component composition).
    pub fn map<N: Send + 'static>(self, f: impl Fn(M) -> N + Send + Sync + 'static) -> Command<N> {
        self.map_with(Arc::new(f))
    }

    pub(crate) fn map_with<N: Send + 'static>(
        self,
        f: Arc<dyn Fn(M) -> N + Send + Sync>,
    ) -> Command<N> {
        let inner = match self.inner {
            CommandInner::None => CommandInner::None,
            CommandInner::Message(msg) => CommandInner::Message(msg.map_with(f)),
            CommandInner::Blocking(run) => {
                CommandInner::Blocking(Box::new(move || run().map_with(f)))
            }
            CommandInner::Future(fut) => {
                CommandInner::Future(Box::pin(async move { fut.await.map_with(f) }))
            }
        };
        Command { inner }
    }

    // --- Inspection methods (useful for testing) ---

    /// Returns `true` if this is a no-op command.
    pub fn is_none(&self) -> bool {
        matches!(self.inner, CommandInner::None)
    }

    /// Returns `true` if this command quits the program.
    pub fn is_quit(&self) -> bool {
        matches!(self.inner, CommandInner::Message(Msg::Quit))
    }

    /// If this command resolves immediately, return its message.
    pub fn into_message(self) -> Option<Msg<M>> {
        match self.inner {
            CommandInner::Message(msg) => Some(msg),
            _ => None,
        }
    }

    /// If this command is a batch, return the inner commands.
    pub fn into_batch(self) -> Option<Vec<Command<M>>> {
        match self.inner {
            CommandInner::Message(Msg::Batch(cmds)) => Some(cmds),
            _ => None,
        }
    }
}

impl<M: Send + 'static> Default for Command<M> {
    fn default() -> Self {
        Command::none()
    }
}

impl<M: Send + 'static> fmt::Debug for Command<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.inner {
            CommandInner::None => "None",
            CommandInner::Message(Msg::Quit) => "Quit",
            CommandInner::Message(Msg::Batch(_)) => "Batch",
            CommandInner::Message(_) => "Message",
            CommandInner::Blocking(_) => "Blocking",
            CommandInner::Future(_) => "Future",
        };
        write!(f, "Command::{kind}")
    }
}

/// Time left until the next multiple of `interval` since the Unix epoch.
///
/// Exactly on a boundary, the next boundary is a whole `interval` away.
pub(crate) fn until_next_boundary(now: SystemTime, interval: Duration) -> Duration {
    let interval_ns = interval.as_nanos();
    if interval_ns == 0 {
        return Duration::ZERO;
    }
    let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
    let remaining = interval_ns - since_epoch % interval_ns;
    Duration::from_nanos(u64::try_from(remaining).unwrap_or(u64::MAX))
}
