//! # Counter Example
//!
//! A minimal counter app demonstrating the core boba architecture:
//! - Implementing the [`Model`] trait with `init`, `update`, and `view`
//! - Matching key presses in `update`
//! - A clock-aligned timer with `Command::every` that re-arms itself
//! - Using `Command::none()` and `Command::quit()`
//!
//! Run with: `cargo run --example counter`

use boba::crossterm::event::{KeyCode, KeyModifiers};
use boba::{Command, Model, Msg};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A minimal counter app that validates the core loop.
struct Counter {
    count: i64,
    clock: Option<SystemTime>,
}

#[derive(Debug)]
enum CounterMsg {
    Tick(SystemTime),
}

fn tick() -> Command<CounterMsg> {
    Command::every(Duration::from_secs(1), CounterMsg::Tick)
}

impl Model for Counter {
    type Message = CounterMsg;
    type Flags = ();

    fn init(_: ()) -> (Self, Command<CounterMsg>) {
        (
            Counter {
                count: 0,
                clock: None,
            },
            tick(),
        )
    }

    // Key arms mutate state and fall through to Command::none(). The tick
    // arm re-arms the timer, since `every` fires only once.
    fn update(&mut self, msg: Msg<CounterMsg>) -> Command<CounterMsg> {
        match msg {
            Msg::Key(key) => match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Command::quit(),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Command::quit()
                }
                KeyCode::Up | KeyCode::Char('k') => self.count += 1,
                KeyCode::Down | KeyCode::Char('j') => self.count -= 1,
                KeyCode::Char('r') => self.count = 0,
                _ => {}
            },
            Msg::Custom(CounterMsg::Tick(at)) => {
                self.clock = Some(at);
                return tick();
            }
            _ => {}
        }
        Command::none()
    }

    fn view(&self) -> String {
        let seconds = self
            .clock
            .and_then(|at| at.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() % 60);
        let clock = match seconds {
            Some(s) => format!(":{s:02}"),
            None => "--".into(),
        };
        format!(
            "Count: {}   clock {}\n\n↑/k inc  ↓/j dec  r reset  q quit\n",
            self.count, clock
        )
    }
}

#[boba::tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let model = boba::run::<Counter>(()).await?;
    println!("Final count: {}", model.count);
    Ok(())
}
