//! **boba** -- A Bubble Tea-inspired runtime for line-oriented terminal apps.
//!
//! This is the umbrella crate that re-exports everything you need to build a
//! boba application from a single dependency:
//!
//! ```toml
//! [dependencies]
//! boba = "0.1"
//! ```
//!
//! # Re-exports
//!
//! * All public items from [`boba_core`] are available at the crate root
//!   ([`Model`], [`Msg`], [`Command`], [`Program`], [`run`], [`run_with`],
//!   etc.).
//! * [`crossterm`] and [`tokio`] are re-exported so downstream crates do not
//!   need to depend on them directly.
//!
//! # Quick start
//!
//! ```ignore
//! use boba::{Command, Model, Msg};
//!
//! struct Hello;
//!
//! impl Model for Hello {
//!     type Message = ();
//!     type Flags = ();
//!
//!     fn init(_: ()) -> (Self, Command<()>) {
//!         (Hello, Command::none())
//!     }
//!     fn update(&mut self, msg: Msg<()>) -> Command<()> {
//!         match msg {
//!             Msg::Key(_) => Command::quit(),
//!             _ => Command::none(),
//!         }
//!     }
//!     fn view(&self) -> String {
//!         "Hello, boba! Press any key.\n".into()
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     boba::run::<Hello>(()).await.unwrap();
//! }
//! ```

pub use boba_core::*;

// Re-export dependencies for use in demos and downstream crates
pub use crossterm;
pub use tokio;
