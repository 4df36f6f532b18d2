//! Interactive menu shell.
//!
//! The conversation is a finite-state machine. [`transition`] is a pure
//! function from the current [`State`] and one [`Input`] to the next state
//! and a [`Command`] for the driver to execute; [`after_answer`] does the
//! same for the outcome of an answered question.
//!
//! ```text
//!   Menu ──1──▶ ingest ──────────────────────────────────────▶ Menu
//!    │──2──▶ AwaitingQuestion ──q──▶ AwaitingUserId ──▶ answer
//!    │            ▲   ▲                                   │
//!    │            │   └──── unknown answer ───────────────┤
//!    │            │                                       ▼
//!    │       AwaitingContinue ◀── y/n ── AwaitingFeedback ◀┤ answered
//!    │                                                    │ failed
//!    │                               AwaitingErrorChoice ◀┘
//!    │──3──▶ AwaitingStartDate ──▶ AwaitingEndDate ──▶ report ──▶ Menu
//!    │──4──▶ AwaitingClearConfirm ──y──▶ clear ──▶ Menu
//!    └──5──▶ Exit
//! ```
//!
//! [`Shell`] drives the machine against an [`InputSource`] and an output
//! writer, executing commands against the [`App`] components. It never
//! terminates on an error; failures are reported and the machine moves to a
//! defined state. Every remote operation is raced against
//! [`InputSource::interrupted`], so Ctrl-C abandons it and returns to the menu.

use std::collections::VecDeque;
use std::future::Future;
use std::io::Write;

use anyhow::Result;
use async_trait::async_trait;
use carebot_core::engine::RagEngine;
use uuid::Uuid;

use crate::app::App;
use crate::loader::load_documents;

// ============ State machine ============

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Menu,
    AwaitingQuestion,
    AwaitingUserId { question: String },
    AwaitingFeedback { run_id: Uuid },
    AwaitingContinue,
    AwaitingErrorChoice,
    AwaitingStartDate,
    AwaitingEndDate { start: String },
    AwaitingClearConfirm,
    Exit,
}

/// One unit of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Line(String),
    /// Ctrl-C.
    Interrupt,
    /// End of input.
    Eof,
}

/// Work the driver performs after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Nothing,
    Notice(String),
    Ingest,
    StartSession,
    Answer {
        question: String,
        user_id: Option<String>,
    },
    Feedback {
        run_id: Uuid,
        helpful: bool,
    },
    Report {
        start: String,
        end: String,
    },
    Clear,
    Goodbye,
}

/// How an in-flight question ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    Answered { run_id: Uuid, unknown: bool },
    Failed,
    Interrupted,
}

const MENU: &str = "\nMain Menu:\n\
1. Ingest documents\n\
2. Run interactive session\n\
3. Run monitoring\n\
4. Clear data\n\
5. Exit\n";

const CANCELLED: &str = "Operation cancelled.";

fn notice(message: &str) -> Command {
    Command::Notice(message.to_string())
}

/// Text shown when waiting for input in `state`.
pub fn prompt(state: &State) -> Option<&'static str> {
    Some(match state {
        State::Menu => "\nChoose an option (1-5): ",
        State::AwaitingQuestion => "\nUser: ",
        State::AwaitingUserId { .. } => "Enter your user ID (or press enter to skip): ",
        State::AwaitingFeedback { .. } => "\nWas this answer helpful? (y/n): ",
        State::AwaitingContinue => "\nWould you like to ask another question? (y/n): ",
        State::AwaitingErrorChoice => "\nContinue? (y/n/menu): ",
        State::AwaitingStartDate => "Start date: ",
        State::AwaitingEndDate { .. } => "End date: ",
        State::AwaitingClearConfirm => {
            "Are you sure you want to clear all data? This cannot be undone. (y/n): "
        }
        State::Exit => return None,
    })
}

pub fn transition(state: State, input: Input) -> (State, Command) {
    let line = match input {
        Input::Eof => return (State::Exit, Command::Goodbye),
        Input::Interrupt => {
            return match state {
                State::Menu | State::Exit => (State::Exit, Command::Goodbye),
                _ => (State::Menu, notice(CANCELLED)),
            }
        }
        Input::Line(line) => line,
    };
    let answer = line.trim().to_lowercase();

    match state {
        State::Menu => match answer.as_str() {
            "1" => (State::Menu, Command::Ingest),
            "2" => (State::AwaitingQuestion, Command::StartSession),
            "3" => (
                State::AwaitingStartDate,
                notice("Enter date range for monitoring (YYYY-MM-DD format):"),
            ),
            "4" => (State::AwaitingClearConfirm, Command::Nothing),
            "5" => (State::Exit, Command::Goodbye),
            _ => (
                State::Menu,
                notice("Invalid choice. Please enter a number between 1-5."),
            ),
        },

        State::AwaitingQuestion => {
            let question = line.trim();
            if question.is_empty() {
                (State::AwaitingQuestion, Command::Nothing)
            } else if answer == "menu" {
                (State::Menu, Command::Nothing)
            } else {
                (
                    State::AwaitingUserId {
                        question: question.to_string(),
                    },
                    Command::Nothing,
                )
            }
        }

        State::AwaitingUserId { question } => {
            let user_id = Some(line.trim().to_string()).filter(|u| !u.is_empty());
            (
                State::AwaitingQuestion,
                Command::Answer { question, user_id },
            )
        }

        State::AwaitingFeedback { run_id } => match answer.as_str() {
            "y" | "n" => (
                State::AwaitingContinue,
                Command::Feedback {
                    run_id,
                    helpful: answer == "y",
                },
            ),
            _ => (
                State::AwaitingFeedback { run_id },
                notice("Please enter 'y' for yes or 'n' for no."),
            ),
        },

        State::AwaitingContinue => match answer.as_str() {
            "y" => (State::AwaitingQuestion, Command::Nothing),
            "n" => (State::Menu, Command::Nothing),
            _ => (
                State::AwaitingContinue,
                notice("Please enter 'y' to continue or 'n' to return to main menu."),
            ),
        },

        State::AwaitingErrorChoice => match answer.as_str() {
            "y" => (State::AwaitingQuestion, Command::Nothing),
            "n" => (State::Exit, Command::Goodbye),
            "menu" => (State::Menu, Command::Nothing),
            _ => (
                State::AwaitingErrorChoice,
                notice("Please enter 'y' to continue, 'n' to exit, or 'menu' to return to main menu."),
            ),
        },

        State::AwaitingStartDate => (
            State::AwaitingEndDate {
                start: line.trim().to_string(),
            },
            Command::Nothing,
        ),

        State::AwaitingEndDate { start } => (
            State::Menu,
            Command::Report {
                start,
                end: line.trim().to_string(),
            },
        ),

        State::AwaitingClearConfirm => {
            if answer == "y" {
                (State::Menu, Command::Clear)
            } else {
                (State::Menu, notice(CANCELLED))
            }
        }

        State::Exit => (State::Exit, Command::Nothing),
    }
}

/// Next state once a question has been answered, has failed, or was
/// interrupted.
pub fn after_answer(outcome: AnswerOutcome) -> (State, Command) {
    match outcome {
        AnswerOutcome::Answered { unknown: true, .. } => (State::AwaitingQuestion, Command::Nothing),
        AnswerOutcome::Answered { run_id, .. } => {
            (State::AwaitingFeedback { run_id }, Command::Nothing)
        }
        AnswerOutcome::Failed => (State::AwaitingErrorChoice, Command::Nothing),
        AnswerOutcome::Interrupted => (State::Menu, notice(CANCELLED)),
    }
}

// ============ Input ============

/// Source of user input for the shell.
#[async_trait]
pub trait InputSource: Send {
    /// Next line, interrupt or end of input.
    async fn next(&mut self) -> Input;

    /// Resolves when the user interrupts an operation in flight. Sources
    /// that cannot be interrupted never resolve.
    async fn interrupted(&mut self);
}

/// Pre-recorded input, used by tests and piped sessions.
///
/// An [`Input::Interrupt`] at the front of the script interrupts the next
/// remote operation (ingestion, a question, a report or a clear) instead of
/// being read as input.
pub struct ScriptedInput {
    inputs: VecDeque<Input>,
}

impl ScriptedInput {
    pub fn new(inputs: Vec<Input>) -> Self {
        Self {
            inputs: inputs.into(),
        }
    }

    /// Script made of plain lines.
    pub fn lines(lines: &[&str]) -> Self {
        Self::new(lines.iter().map(|l| Input::Line(l.to_string())).collect())
    }
}

#[async_trait]
impl InputSource for ScriptedInput {
    async fn next(&mut self) -> Input {
        self.inputs.pop_front().unwrap_or(Input::Eof)
    }

    async fn interrupted(&mut self) {
        if self.inputs.front() == Some(&Input::Interrupt) {
            self.inputs.pop_front();
            return;
        }
        std::future::pending::<()>().await
    }
}

// ============ Driver ============

pub struct Shell<I, W> {
    app: App,
    input: I,
    out: W,
    state: State,
}

impl<I: InputSource, W: Write> Shell<I, W> {
    pub fn new(app: App, input: I, out: W) -> Self {
        Self {
            app,
            input,
            out,
            state: State::Menu,
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Run until the machine reaches [`State::Exit`].
    pub async fn run(&mut self) -> Result<()> {
        writeln!(self.out, "Starting Health Care Bot...")?;
        while self.state != State::Exit {
            if self.state == State::Menu {
                write!(self.out, "{}", MENU)?;
            }
            if let Some(text) = prompt(&self.state) {
                write!(self.out, "{}", text)?;
                self.out.flush()?;
            }

            let input = self.input.next().await;
            let current = std::mem::replace(&mut self.state, State::Exit);
            let (next, command) = transition(current, input);
            self.state = next;
            self.execute(command).await?;
        }
        Ok(())
    }

    async fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Nothing => {}
            Command::Notice(message) => writeln!(self.out, "{}", message)?,
            Command::Goodbye => writeln!(self.out, "Goodbye!")?,
            Command::Ingest => self.ingest().await?,
            Command::StartSession => match self.app.engine.get() {
                Ok(_) => writeln!(
                    self.out,
                    "Start talking with the bot (type 'menu' to return to main menu)"
                )?,
                Err(reason) => {
                    writeln!(self.out, "Error: the engine is not available: {}", reason)?;
                    self.state = State::Menu;
                }
            },
            Command::Answer { question, user_id } => {
                let outcome = self.answer(&question, user_id.as_deref()).await?;
                let (next, command) = after_answer(outcome);
                self.state = next;
                if let Command::Notice(message) = command {
                    writeln!(self.out, "\n{}", message)?;
                }
            }
            Command::Feedback { run_id, helpful } => {
                if let Ok(engine) = self.app.engine.get() {
                    engine.log_feedback(run_id, helpful).await;
                }
            }
            Command::Report { start, end } => self.report(&start, &end).await?,
            Command::Clear => self.clear().await?,
        }
        Ok(())
    }

    async fn clear(&mut self) -> Result<()> {
        let Shell {
            app, input, out, ..
        } = self;
        let engine = match app.engine.get() {
            Ok(engine) => engine,
            Err(reason) => {
                writeln!(out, "Error: the engine is not available: {}", reason)?;
                return Ok(());
            }
        };
        match unless_interrupted(input, engine.clear()).await {
            None => writeln!(out, "\n{}", CANCELLED)?,
            Some(Ok(())) => writeln!(out, "All data has been cleared.")?,
            Some(Err(e)) => writeln!(out, "Error clearing data: {}", e)?,
        }
        Ok(())
    }

    async fn ingest(&mut self) -> Result<()> {
        let Shell {
            app, input, out, ..
        } = self;
        let engine = match app.engine.get() {
            Ok(engine) => engine,
            Err(reason) => {
                writeln!(
                    out,
                    "Error: Engine is not properly initialized. Cannot ingest documents.\n{}",
                    reason
                )?;
                return Ok(());
            }
        };

        writeln!(out, "Loading documents...")?;
        let documents = match load_documents(&app.data_dir) {
            Ok(documents) => documents,
            Err(e) => {
                writeln!(out, "Error: {}", e)?;
                writeln!(
                    out,
                    "Please place your PDF files in '{}' and try again.",
                    app.data_dir.display()
                )?;
                return Ok(());
            }
        };

        writeln!(out, "Processing {} document chunks...", documents.len())?;
        match unless_interrupted(input, engine.ingest(&documents)).await {
            None => writeln!(out, "\n{}", CANCELLED)?,
            Some(Ok(count)) => writeln!(out, "Successfully ingested {} document chunks.", count)?,
            Some(Err(e)) => writeln!(out, "Error adding documents to vector store: {}", e)?,
        }
        Ok(())
    }

    async fn answer(&mut self, question: &str, user_id: Option<&str>) -> Result<AnswerOutcome> {
        let Shell {
            app, input, out, ..
        } = self;
        let engine: &RagEngine = match app.engine.get() {
            Ok(engine) => engine,
            Err(reason) => {
                writeln!(out, "\nError processing your query: {}", reason)?;
                return Ok(AnswerOutcome::Failed);
            }
        };

        match unless_interrupted(input, engine.is_empty()).await {
            None => return Ok(AnswerOutcome::Interrupted),
            Some(Ok(true)) => writeln!(
                out,
                "\nNote: The vector store appears to be empty. You can still ask questions, \
                 but results may be limited. Use the main menu to ingest documents."
            )?,
            Some(Ok(false)) => {}
            Some(Err(e)) => writeln!(out, "\nWarning: Could not access vector store: {}", e)?,
        }

        let result = match unless_interrupted(input, engine.answer(question, user_id)).await {
            Some(result) => result,
            None => return Ok(AnswerOutcome::Interrupted),
        };

        match result {
            Ok(answer) => {
                writeln!(out, "\nAnswer: {}", answer.text)?;
                if !answer.sources.is_empty() {
                    writeln!(out, "\nSources found: {}", answer.sources.len())?;
                }
                writeln!(out, "Run ID: {}", answer.run_id)?;
                Ok(AnswerOutcome::Answered {
                    run_id: answer.run_id,
                    unknown: answer.is_unknown(),
                })
            }
            Err(e) => {
                writeln!(out, "\nError processing your query: {}", e)?;
                Ok(AnswerOutcome::Failed)
            }
        }
    }

    async fn report(&mut self, start: &str, end: &str) -> Result<()> {
        let Shell {
            app, input, out, ..
        } = self;
        let monitor = match app.monitor.get() {
            Ok(monitor) => monitor,
            Err(reason) => {
                writeln!(out, "Error: monitoring is not available: {}", reason)?;
                return Ok(());
            }
        };

        writeln!(out, "Running monitoring for period: {} - {}", start, end)?;
        let report = match unless_interrupted(input, monitor.report(start, end)).await {
            Some(report) => report,
            None => {
                writeln!(out, "\n{}", CANCELLED)?;
                return Ok(());
            }
        };
        if let Some(listed) = unless_interrupted(input, monitor.list_projects()).await {
            match listed {
                Ok(projects) => writeln!(out, "Available projects: {}", projects.join(", "))?,
                Err(e) => tracing::warn!(error = %e, "failed to list projects"),
            }
        }
        match report {
            Ok(report) => writeln!(out, "{}", report)?,
            Err(e) => writeln!(out, "An error occurred while generating the report: {}", e)?,
        }
        Ok(())
    }
}

/// Await `operation` unless the user interrupts first; `None` when interrupted.
async fn unless_interrupted<I, F>(input: &mut I, operation: F) -> Option<F::Output>
where
    I: InputSource,
    F: Future,
{
    tokio::select! {
        biased;
        _ = input.interrupted() => None,
        output = operation => Some(output),
    }
}
