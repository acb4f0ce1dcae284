//! Interactive confirmation.

use dialoguer::Confirm;

/// Asks the operator yes/no questions.
pub trait Prompter: Send {
    /// Show `message`, ask `question`, and return the answer.
    fn confirm(&mut self, message: &str, question: &str) -> bool;
}

/// Prompts on the terminal.
#[derive(Debug, Default)]
pub struct Console;

impl Prompter for Console {
    fn confirm(&mut self, message: &str, question: &str) -> bool {
        println!("{message}");
        match Confirm::new().with_prompt(question).default(false).interact() {
            Ok(answer) => answer,
            // No terminal to ask on counts as "no".
            Err(e) => {
                tracing::warn!("cannot prompt: {e}");
                false
            }
        }
    }
}

/// Answers every question with the same fixed answer. Forced runs use
/// `Fixed(true)`.
#[derive(Debug, Clone, Copy)]
pub struct Fixed(pub bool);

impl Prompter for Fixed {
    fn confirm(&mut self, message: &str, question: &str) -> bool {
        tracing::debug!(message, question, answer = self.0, "auto-answered prompt");
        self.0
    }
}
