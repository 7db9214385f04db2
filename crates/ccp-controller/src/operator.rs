//! Operator input: the human (or scripted stand-in) behind a controller.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::io::Write;
use std::pin::Pin;

use ccp_protocol::{ApplicationRecord, FormRequest};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use crate::session::SessionState;

pub type OperatorFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Top-level commands an operator can give between prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Task(String),
    /// Show the application directory without starting a task.
    List,
    Abort,
    Replan,
    RequestCapabilities,
    Quit,
}

impl OperatorCommand {
    /// Anything that is not a keyword is a new task description.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let cmd = match line.to_ascii_lowercase().as_str() {
            "list" | "ls" => Self::List,
            "abort" => Self::Abort,
            "replan" => Self::Replan,
            "caps" | "capabilities" => Self::RequestCapabilities,
            "quit" | "exit" => Self::Quit,
            _ => Self::Task(line.to_string()),
        };
        Some(cmd)
    }
}

pub trait OperatorInput: Send + Sync {
    /// `None` means the operator is gone (end of input).
    fn next_command<'a>(&'a self, state: SessionState) -> OperatorFuture<'a, Option<OperatorCommand>>;

    /// `None` gives up on the task.
    fn choose_application<'a>(
        &'a self,
        task: &'a str,
        applications: &'a [ApplicationRecord],
    ) -> OperatorFuture<'a, Option<String>>;

    /// An empty answer leaves the session parked; `None` aborts the task.
    fn clarify<'a>(&'a self, question: &'a str) -> OperatorFuture<'a, Option<String>>;

    /// Answers keyed by field id. Missing entries take the field default.
    /// `None` aborts the task.
    fn fill_form<'a>(&'a self, form: &'a FormRequest) -> OperatorFuture<'a, Option<HashMap<String, String>>>;

    /// Result of a `list` command.
    fn show_applications(&self, applications: &[ApplicationRecord]) {
        tracing::info!(count = applications.len(), "Applications on the relay");
    }
}

fn is_abort(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("abort")
}

/// Line-based console operator.
pub struct StdinOperator {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl Default for StdinOperator {
    fn default() -> Self {
        Self::new()
    }
}

impl StdinOperator {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }

    async fn ask(&self, prompt: &str) -> Option<String> {
        print!("{prompt}");
        let _ = std::io::stdout().flush();
        match self.lines.lock().await.next_line().await {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read operator input");
                None
            }
        }
    }
}

impl OperatorInput for StdinOperator {
    fn next_command<'a>(&'a self, state: SessionState) -> OperatorFuture<'a, Option<OperatorCommand>> {
        Box::pin(async move {
            let prompt = match state {
                SessionState::Stalled => {
                    println!("Session is stalled. Commands: replan, caps, list, abort, quit.");
                    "> "
                }
                s if s.accepts_new_task() => "> ",
                // a request is in flight; input is still read so `abort` works
                _ => "",
            };
            loop {
                let line = self.ask(prompt).await?;
                if let Some(cmd) = OperatorCommand::parse(&line) {
                    return Some(cmd);
                }
            }
        })
    }

    fn choose_application<'a>(
        &'a self,
        task: &'a str,
        applications: &'a [ApplicationRecord],
    ) -> OperatorFuture<'a, Option<String>> {
        Box::pin(async move {
            println!("Applications available for \"{task}\":");
            for (i, app) in applications.iter().enumerate() {
                println!("  {}. {} ({}) - {}", i + 1, app.name, app.software_id, app.description);
            }
            loop {
                let line = self.ask("Choose by number or id (blank to abort): ").await?;
                let line = line.trim();
                if line.is_empty() {
                    return None;
                }
                if let Ok(n) = line.parse::<usize>() {
                    if let Some(app) = n.checked_sub(1).and_then(|i| applications.get(i)) {
                        return Some(app.software_id.clone());
                    }
                }
                if applications.iter().any(|a| a.software_id == line) {
                    return Some(line.to_string());
                }
                println!("No application matches {line:?}.");
            }
        })
    }

    fn clarify<'a>(&'a self, question: &'a str) -> OperatorFuture<'a, Option<String>> {
        Box::pin(async move {
            println!("The agent needs more information: {question}");
            let answer = self.ask("Your answer (blank to skip, abort to give up): ").await?;
            (!is_abort(&answer)).then_some(answer)
        })
    }

    fn fill_form<'a>(&'a self, form: &'a FormRequest) -> OperatorFuture<'a, Option<HashMap<String, String>>> {
        Box::pin(async move {
            println!("Form: {}", form.form_description);
            if let Some(item) = form.item_name() {
                println!("  for: {item}");
            }
            let mut answers = HashMap::new();
            for field in &form.fields {
                let mut prompt = format!("  {}", field.label);
                if let Some(options) = &field.options {
                    prompt.push_str(&format!(" [{}]", options.join("/")));
                }
                let default = field.default_text();
                if !default.is_empty() {
                    prompt.push_str(&format!(" (default {default})"));
                }
                prompt.push_str(": ");
                let answer = self.ask(&prompt).await?;
                if is_abort(&answer) {
                    return None;
                }
                answers.insert(field.id.clone(), answer);
            }
            Some(answers)
        })
    }

    fn show_applications(&self, applications: &[ApplicationRecord]) {
        if applications.is_empty() {
            println!("No applications are connected.");
        }
        for app in applications {
            println!("  {} ({}) - {}", app.name, app.software_id, app.description);
        }
    }
}

/// Unattended operator: runs a fixed task list, picks applications by
/// keyword, accepts form defaults and never answers clarifications.
/// It aborts stalled tasks and otherwise waits out in-flight requests.
pub struct AutoOperator {
    tasks: Mutex<VecDeque<String>>,
}

impl AutoOperator {
    pub fn new(tasks: Vec<String>) -> Self {
        Self {
            tasks: Mutex::new(tasks.into()),
        }
    }

    /// Highest keyword score wins; ties keep listing order.
    pub fn pick<'r>(task: &str, applications: &'r [ApplicationRecord]) -> Option<&'r ApplicationRecord> {
        let mut best: Option<(&ApplicationRecord, usize)> = None;
        for app in applications {
            let score = app.matches(task);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((app, score));
            }
        }
        best.map(|(app, _)| app)
    }
}

impl OperatorInput for AutoOperator {
    fn next_command<'a>(&'a self, state: SessionState) -> OperatorFuture<'a, Option<OperatorCommand>> {
        Box::pin(async move {
            if state == SessionState::Stalled {
                return Some(OperatorCommand::Abort);
            }
            if !state.accepts_new_task() {
                // the event loop drops this ask once the state moves on
                return std::future::pending().await;
            }
            let next = self.tasks.lock().await.pop_front();
            Some(next.map(OperatorCommand::Task).unwrap_or(OperatorCommand::Quit))
        })
    }

    fn choose_application<'a>(
        &'a self,
        task: &'a str,
        applications: &'a [ApplicationRecord],
    ) -> OperatorFuture<'a, Option<String>> {
        Box::pin(async move { Self::pick(task, applications).map(|a| a.software_id.clone()) })
    }

    fn clarify<'a>(&'a self, _question: &'a str) -> OperatorFuture<'a, Option<String>> {
        Box::pin(async { Some(String::new()) })
    }

    fn fill_form<'a>(&'a self, _form: &'a FormRequest) -> OperatorFuture<'a, Option<HashMap<String, String>>> {
        Box::pin(async { Some(HashMap::new()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parsing() {
        assert_eq!(OperatorCommand::parse("  "), None);
        assert_eq!(OperatorCommand::parse("ABORT"), Some(OperatorCommand::Abort));
        assert_eq!(OperatorCommand::parse("caps"), Some(OperatorCommand::RequestCapabilities));
        assert_eq!(OperatorCommand::parse("list"), Some(OperatorCommand::List));
        assert_eq!(
            OperatorCommand::parse("order beef noodles"),
            Some(OperatorCommand::Task("order beef noodles".into()))
        );
    }

    #[test]
    fn test_auto_pick_prefers_keywords() {
        let apps = vec![
            ApplicationRecord::new("hotel-1", "Hotels", "Rooms", vec!["hotel".into()]),
            ApplicationRecord::new("shop-1", "Shop", "Food", vec!["noodles".into(), "food".into()]),
        ];
        let picked = AutoOperator::pick("order noodles for lunch", &apps).unwrap();
        assert_eq!(picked.software_id, "shop-1");

        let fallback = AutoOperator::pick("something unrelated", &apps).unwrap();
        assert_eq!(fallback.software_id, "hotel-1");
        assert!(AutoOperator::pick("x", &[]).is_none());
    }

    #[tokio::test]
    async fn test_auto_operator_runs_tasks_then_quits() {
        let op = AutoOperator::new(vec!["first".into()]);
        assert_eq!(
            op.next_command(SessionState::Idle).await,
            Some(OperatorCommand::Task("first".into()))
        );
        assert_eq!(op.next_command(SessionState::Stalled).await, Some(OperatorCommand::Abort));
        assert_eq!(op.next_command(SessionState::Complete).await, Some(OperatorCommand::Quit));
        assert_eq!(op.clarify("which?").await, Some(String::new()));
    }

    #[tokio::test]
    async fn test_auto_operator_waits_while_request_in_flight() {
        let op = AutoOperator::new(vec!["first".into()]);
        let waited = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            op.next_command(SessionState::AwaitingCapabilities),
        )
        .await;
        assert!(waited.is_err());
        assert_eq!(
            op.next_command(SessionState::Idle).await,
            Some(OperatorCommand::Task("first".into()))
        );
    }

    #[test]
    fn test_abort_keyword() {
        assert!(is_abort(" Abort "));
        assert!(!is_abort("abort the duck"));
    }
}
