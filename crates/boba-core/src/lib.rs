//! Core runtime for the **boba** terminal application framework.
//!
//! `boba-core` provides the traits, types, and runtime that power every boba
//! application.  The design follows the [Elm Architecture]: your program is
//! expressed as an **init -> update -> view** cycle, with side effects pushed
//! to the edges through [`Command`]s.
//!
//! # Key types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Model`] | Top-level application trait (init / update / view) |
//! | [`Msg`] | A key press, a quit, a batch of commands, or an application message |
//! | [`Command`] | Describes a side effect to be executed by the runtime |
//! | [`Program`] | Wires a [`Model`] to a real terminal and drives the event loop |
//! | [`InputReader`] | Blocking key reader that another thread can cancel |
//! | [`TestProgram`](testing::TestProgram) | Headless harness for unit-testing a [`Model`] without a terminal |
//!
//! # Architecture
//!
//! 1. **init** -- [`Model::init`] creates the initial state and may return a
//!    [`Command`] to kick off early work.
//! 2. **view** -- The runtime calls [`Model::view`] and repaints the terminal
//!    with the returned text, erasing the previous paint.
//! 3. **event** -- Key presses are read on a dedicated thread; command results
//!    come back from their own tasks.  Both land in one message queue.
//! 4. **update** -- [`Model::update`] receives a message, mutates state, and
//!    optionally returns a [`Command`] for further side effects.
//! 5. **repeat** -- Steps 2-4 repeat until a quit message arrives, after which
//!    the input reader is cancelled and the terminal is restored.
//!
//! # Input
//!
//! Reading keys blocks, and a blocked read must be interruptible at shutdown.
//! [`new_input_reader`] picks the best strategy for the stream it is given:
//! `epoll` on Linux, `select` on other Unix systems, and a plain blocking
//! read (that cannot be cancelled) for everything else.
//!
//! # Quick example
//!
//! ```ignore
//! use boba_core::{Command, Model, Msg};
//! use crossterm::event::KeyCode;
//!
//! struct Counter { count: i32 }
//!
//! enum CounterMsg { Reset }
//!
//! impl Model for Counter {
//!     type Message = CounterMsg;
//!     type Flags = ();
//!
//!     fn init(_flags: ()) -> (Self, Command<CounterMsg>) {
//!         (Counter { count: 0 }, Command::none())
//!     }
//!
//!     fn update(&mut self, msg: Msg<CounterMsg>) -> Command<CounterMsg> {
//!         match msg {
//!             Msg::Key(key) if key.code == KeyCode::Char('q') => return Command::quit(),
//!             Msg::Key(_) => self.count += 1,
//!             Msg::Custom(CounterMsg::Reset) => self.count = 0,
//!             _ => {}
//!         }
//!         Command::none()
//!     }
//!
//!     fn view(&self) -> String {
//!         format!("Count: {}\n", self.count)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), boba_core::ProgramError> {
//!     boba_core::run::<Counter>(()).await?;
//!     Ok(())
//! }
//! ```
//!
//! [Elm Architecture]: https://guide.elm-lang.org/architecture/

pub mod cancel;
pub mod command;
pub mod decode;
pub mod input;
pub mod message;
pub mod model;
pub mod renderer;
pub mod runtime;
pub mod testing;

pub use cancel::CancelFlag;
pub use command::Command;
pub use decode::{DecodeError, Decoder};
pub use input::{new_input_reader, InputError, InputReader, InputSource};
pub use message::Msg;
pub use model::Model;
pub use renderer::Renderer;
pub use runtime::{alt_screen, exit_alt_screen, OutputTarget, Program, ProgramError, ProgramOptions};

/// Run a boba application with default options.
pub async fn run<M: Model>(flags: M::Flags) -> Result<M, ProgramError> {
    Program::<M>::new(flags).run().await
}

/// Run with custom options.
pub async fn run_with<M: Model>(
    flags: M::Flags,
    options: ProgramOptions,
) -> Result<M, ProgramError> {
    Program::<M>::with_options(flags, options).run().await
}
