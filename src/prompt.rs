//! Yes/no questions put to the operator.

use std::future::Future;
use std::io::{self, BufRead, Write};
use std::pin::Pin;

use tracing::debug;

/// Future returned by [`Prompt::confirm`].
pub type PromptFuture<'a> = Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

/// Asks the operator to confirm something.
pub trait Prompt: Send + Sync {
    /// Resolves to the operator's answer to `question`.
    fn confirm<'a>(&'a self, question: &'a str) -> PromptFuture<'a>;
}

/// Answers every question the same way. Used for `--yes` and in tests.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AutoAnswer(pub bool);

impl Prompt for AutoAnswer {
    fn confirm<'a>(&'a self, question: &'a str) -> PromptFuture<'a> {
        let answer = self.0;
        debug!(%question, answer, "answering prompt automatically");
        Box::pin(async move { answer })
    }
}

/// Reads answers from standard input, writing questions to standard error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StdinPrompt {
    default: bool,
}

impl StdinPrompt {
    /// Creates a prompt that falls back to `default` on an empty answer,
    /// end of input, or a read failure.
    #[must_use]
    pub const fn new(default: bool) -> Self {
        Self { default }
    }
}

impl Prompt for StdinPrompt {
    fn confirm<'a>(&'a self, question: &'a str) -> PromptFuture<'a> {
        let default = self.default;
        let question = question.to_owned();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || ask(&question, default))
                .await
                .unwrap_or(default)
        })
    }
}

fn ask(question: &str, default: bool) -> bool {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    let mut stderr = io::stderr();
    if write!(stderr, "{question} {hint} ").and_then(|()| stderr.flush()).is_err() {
        return default;
    }
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => default,
        Ok(_) => parse_answer(&line).unwrap_or(default),
    }
}

/// Interprets a typed answer; `None` for blank or unrecognised input.
fn parse_answer(line: &str) -> Option<bool> {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("y\n", Some(true))]
    #[case(" YES ", Some(true))]
    #[case("n", Some(false))]
    #[case("No\r\n", Some(false))]
    #[case("\n", None)]
    #[case("maybe", None)]
    fn parses_answers(#[case] line: &str, #[case] expected: Option<bool>) {
        assert_eq!(parse_answer(line), expected);
    }

    #[tokio::test]
    async fn auto_answer_is_constant() {
        assert!(AutoAnswer(true).confirm("continue?").await);
        assert!(!AutoAnswer(false).confirm("continue?").await);
    }
}
