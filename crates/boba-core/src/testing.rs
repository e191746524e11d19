use crate::command::{Command, CommandInner};
use crate::message::Msg;
use crate::model::Model;
use crossterm::event::KeyEvent;
use std::collections::VecDeque;

/// A headless test harness that drives a [`Model`] without a real terminal.
///
/// `TestProgram` lets you exercise every part of the init/update/view cycle in
/// a plain `#[test]` function -- no tokio runtime or TTY required.  Commands
/// that carry a ready message (e.g. [`Command::message`]) are collected and
/// can be flushed with [`drain_messages`](TestProgram::drain_messages);
/// blocking and async commands are silently ignored.
///
/// Quit and batch messages are handled the way the real loop handles them:
/// a quit is recorded (see [`has_quit`](TestProgram::has_quit)) and a batch
/// is expanded into its commands.  Neither reaches [`Model::update`].
///
/// # Example
///
/// ```rust,ignore
/// use boba_core::testing::TestProgram;
///
/// let mut prog = TestProgram::<Counter>::new(0);  // calls Counter::init(0)
/// prog.send_message(CounterMsg::Increment);       // triggers update
/// prog.send_message(CounterMsg::Increment);
/// assert_eq!(prog.model().count, 2);              // inspect state
/// assert!(prog.view().contains("Count: 2"));
/// ```
pub struct TestProgram<M: Model> {
    model: M,
    pending_messages: VecDeque<Msg<M::Message>>,
    quit: bool,
}

impl<M: Model> TestProgram<M> {
    /// Create a test program by calling [`Model::init`] with the given flags.
    ///
    /// Any ready messages produced by `init` are collected into the
    /// pending-message queue.  Call
    /// [`drain_messages`](TestProgram::drain_messages) to process them.
    pub fn new(flags: M::Flags) -> Self {
        let (model, init_cmd) = M::init(flags);
        let mut program = Self {
            model,
            pending_messages: VecDeque::new(),
            quit: false,
        };
        program.collect_sync_messages(init_cmd);
        program
    }

    /// Send a message, triggering at most a single update cycle.
    pub fn send(&mut self, msg: Msg<M::Message>) {
        match msg {
            Msg::Quit => self.quit = true,
            Msg::Batch(cmds) => {
                for cmd in cmds {
                    self.collect_sync_messages(cmd);
                }
            }
            msg => {
                let cmd = self.model.update(msg);
                self.collect_sync_messages(cmd);
            }
        }
    }

    /// Send a key press.
    pub fn send_key(&mut self, key: impl Into<KeyEvent>) {
        self.send(Msg::Key(key.into()));
    }

    /// Send an application message.
    pub fn send_message(&mut self, msg: M::Message) {
        self.send(Msg::Custom(msg));
    }

    /// Process all pending messages, in order, until no new ones are produced.
    ///
    /// Useful for testing command-chaining scenarios where one update
    /// produces a message that triggers another update.  Stops early once a
    /// quit has been seen, since the real loop would stop there too.
    pub fn drain_messages(&mut self) {
        while !self.quit {
            let Some(msg) = self.pending_messages.pop_front() else {
                break;
            };
            self.send(msg);
        }
    }

    /// Messages waiting to be processed.
    pub fn pending(&self) -> usize {
        self.pending_messages.len()
    }

    /// Whether a quit message has been processed.
    pub fn has_quit(&self) -> bool {
        self.quit
    }

    /// Get a shared reference to the model for assertions.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Get a mutable reference to the model for direct test setup.
    ///
    /// This bypasses the normal message-driven update cycle, which can be
    /// useful for arranging test state before sending messages.
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    /// The model's current view text.
    pub fn view(&self) -> String {
        self.model.view()
    }

    fn collect_sync_messages(&mut self, cmd: Command<M::Message>) {
        match cmd.inner {
            CommandInner::Message(msg) => self.pending_messages.push_back(msg),
            // Work that needs a thread or a runtime can't run here
            CommandInner::None | CommandInner::Blocking(_) | CommandInner::Future(_) => {}
        }
    }
}
