//! Console rendering of messages and live turns.

use std::io::{self, Write};

use ragchat_core::format::format_relative_time_opt;
use ragchat_core::turn::TurnObserver;
use ragchat_core::{Message, Role, TurnFailure};

/// Role prefix for message rows.
pub fn role_prefix(role: Role) -> &'static str {
    match role {
        Role::User => "[user]",
        Role::Assistant => "[assistant]",
        Role::System => "[system]",
    }
}

/// One history row: header line followed by the content.
pub fn format_message(message: &Message) -> String {
    let mut header = format!(
        "{} {}  {}",
        role_prefix(message.role),
        message.id,
        format_relative_time_opt(message.created_at)
    );
    if let Some(tokens) = message.token_count() {
        header.push_str(&format!("  {} tokens", tokens));
    }
    if message.variant_count() > 0 {
        header.push_str(&format!("  {} earlier variant(s)", message.variant_count()));
    }
    format!("{}\n{}", header, message.content)
}

/// Prints a turn to stdout as it streams.
#[derive(Default)]
pub struct ConsoleObserver {
    deltas: usize,
}

impl ConsoleObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn start_line(&mut self) {
        if self.deltas == 0 {
            print!("{} ", role_prefix(Role::Assistant));
        }
    }

    fn end_line(&self) {
        if self.deltas > 0 {
            println!();
        }
    }
}

impl TurnObserver for ConsoleObserver {
    fn on_delta(&mut self, delta: &str) {
        self.start_line();
        self.deltas += 1;
        print!("{}", delta);
        let _ = io::stdout().flush();
    }

    fn on_complete(&mut self, message: &Message) {
        if self.deltas == 0 {
            // Blocking transport: the whole answer arrives at once.
            println!("{} {}", role_prefix(Role::Assistant), message.content);
        } else {
            println!();
        }
    }

    fn on_failure(&mut self, failure: &TurnFailure) {
        self.end_line();
        eprintln!("[failed] {}", failure);
    }

    fn on_cancel(&mut self) {
        self.end_line();
        eprintln!("[canceled]");
    }
}
