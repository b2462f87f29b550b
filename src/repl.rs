//! Line-oriented shell over a session.
//!
//! Lines starting with `/` are commands; anything else is a question for
//! the model. Output is plain text, or JSON for assistant turns when
//! requested.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::connection::ConnectionProfile;
use crate::db::QueryResult;
use crate::error::ChatError;
use crate::schema::{SchemaSummary, TableSchema};
use crate::session::{ChatTurn, SessionHandle, SessionPhase, SessionSnapshot, TurnRole};

const HELP_TEXT: &str = r#"Available commands:
  /use <database>  - Switch to another database
  /databases       - List available databases
  /tables          - List tables of the current database
  /schema [table]  - Show the schema used to ground queries
  /history         - Show the chat transcript
  /clear           - Clear chat history and the query counter
  /refresh         - Reload database and table lists and the schema
  /status          - Show connection and session status
  /disconnect      - Close the connection
  /connect [db]    - Reconnect with the startup credentials
  /help            - Show this help message
  /quit, /exit     - Exit the application

Anything else is sent to the model as a question."#;

/// Widest a table cell is rendered before it is cut.
const MAX_CELL_WIDTH: usize = 40;

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Use(String),
    Databases,
    Tables,
    Schema(Option<String>),
    History,
    Clear,
    Refresh,
    Status,
    Disconnect,
    Connect(Option<String>),
    Help,
    Quit,
    Question(String),
    /// A command that needs an argument it was not given.
    Usage(&'static str),
    Unknown(String),
}

impl Command {
    /// Parses a line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if !line.starts_with('/') {
            return Some(Self::Question(line.to_string()));
        }

        let (name, args) = match line.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (line, ""),
        };
        let arg = (!args.is_empty()).then(|| args.to_string());

        let command = match name.to_lowercase().as_str() {
            "/use" => match arg {
                Some(db) => Self::Use(db),
                None => Self::Usage("Usage: /use <database>"),
            },
            "/databases" | "/dbs" => Self::Databases,
            "/tables" => Self::Tables,
            "/schema" => Self::Schema(arg),
            "/history" => Self::History,
            "/clear" => Self::Clear,
            "/refresh" => Self::Refresh,
            "/status" => Self::Status,
            "/disconnect" => Self::Disconnect,
            "/connect" => Self::Connect(arg),
            "/help" => Self::Help,
            "/quit" | "/exit" => Self::Quit,
            other => Self::Unknown(other.to_string()),
        };
        Some(command)
    }
}

/// What the shell should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Print(String),
    Exit,
}

/// Receives the working phases of a long-running command.
pub type ProgressSink = Arc<dyn Fn(SessionPhase) + Send + Sync>;

/// Runs commands against a session handle.
pub struct Repl {
    handle: SessionHandle,
    profile: ConnectionProfile,
    json: bool,
    progress: ProgressSink,
}

impl fmt::Debug for Repl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repl")
            .field("handle", &self.handle)
            .field("profile", &self.profile)
            .field("json", &self.json)
            .finish_non_exhaustive()
    }
}

impl Repl {
    /// `profile` is the startup profile, reused by `/connect`.
    ///
    /// Working phases are printed to stderr until replaced with
    /// [`Repl::with_progress`].
    pub fn new(handle: SessionHandle, profile: ConnectionProfile, json: bool) -> Self {
        Self {
            handle,
            profile,
            json,
            progress: Arc::new(|phase| eprintln!("{}", progress_line(phase))),
        }
    }

    /// Sends working phases to `sink` instead of stderr.
    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = sink;
        self
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Awaits `operation`, reporting every working phase the session enters
    /// meanwhile.
    ///
    /// Phases that change faster than they are observed are coalesced.
    pub async fn track<T>(&self, operation: impl Future<Output = T>) -> T {
        let mut phases = self.handle.phase_receiver();
        let _ = phases.borrow_and_update();
        tokio::pin!(operation);

        loop {
            tokio::select! {
                output = &mut operation => return output,
                changed = phases.changed() => {
                    if changed.is_err() {
                        return operation.await;
                    }
                    let phase = *phases.borrow_and_update();
                    if phase.is_working() {
                        (self.progress)(phase);
                    }
                }
            }
        }
    }

    /// Executes one command. Failures are rendered, never returned.
    pub async fn run(&self, command: Command) -> Outcome {
        match self.dispatch(command).await {
            Ok(outcome) => outcome,
            Err(e) => Outcome::Print(e.to_string()),
        }
    }

    async fn dispatch(&self, command: Command) -> crate::error::Result<Outcome> {
        let text = match command {
            Command::Question(text) => match self.track(self.handle.submit(text)).await? {
                Some(turn) => render_turn(&turn, self.json),
                None => String::new(),
            },
            Command::Use(database) => {
                self.track(self.handle.switch_database(database.as_str()))
                    .await?;
                format!("Switched to database '{database}'.")
            }
            Command::Databases => {
                let snapshot = self.connected_snapshot().await?;
                render_databases(&snapshot)
            }
            Command::Tables => {
                let snapshot = self.connected_snapshot().await?;
                render_list("Tables", &snapshot.available_tables)
            }
            Command::Schema(None) => render_schema(&*self.handle.schema().await?),
            Command::Schema(Some(table)) => {
                let schema = self.handle.schema().await?;
                match schema.table(&table) {
                    Some(found) => render_table_schema(found),
                    None if schema.omitted.contains(&table) => {
                        format!("Table '{table}' could not be described.")
                    }
                    None => format!(
                        "Table '{table}' not found in '{}'.",
                        schema.database
                    ),
                }
            }
            Command::History => render_history(&self.handle.history().await?),
            Command::Clear => {
                self.handle.clear_history().await?;
                "Chat history cleared.".to_string()
            }
            Command::Refresh => {
                self.handle.refresh().await?;
                let snapshot = self.handle.snapshot().await?;
                format!(
                    "Refreshed. Found {} database(s) and {} table(s).",
                    snapshot.available_databases.len(),
                    snapshot.available_tables.len()
                )
            }
            Command::Status => render_status(&self.handle.snapshot().await?, self.handle.phase()),
            Command::Disconnect => {
                self.handle.disconnect().await?;
                "Disconnected.".to_string()
            }
            Command::Connect(database) => {
                let profile = match database {
                    Some(db) => self.profile.with_database(db),
                    None => self.profile.clone(),
                };
                let shown = profile.display_string();
                self.track(self.handle.connect(profile)).await?;
                format!("Connected to {shown}.")
            }
            Command::Help => HELP_TEXT.to_string(),
            Command::Quit => return Ok(Outcome::Exit),
            Command::Usage(usage) => usage.to_string(),
            Command::Unknown(name) => {
                format!("Unknown command: {name}. Type /help for available commands.")
            }
        };
        Ok(Outcome::Print(text))
    }

    async fn connected_snapshot(&self) -> crate::error::Result<SessionSnapshot> {
        let snapshot = self.handle.snapshot().await?;
        if snapshot.connected {
            Ok(snapshot)
        } else {
            Err(ChatError::connection("Not connected"))
        }
    }
}

/// Renders a working phase, e.g. `Generating query...`.
pub fn progress_line(phase: SessionPhase) -> String {
    let label = phase.label();
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => format!("{}{}...", first.to_uppercase(), chars.as_str()),
        None => String::new(),
    }
}

/// Renders an assistant turn for the terminal.
pub fn render_turn(turn: &ChatTurn, json: bool) -> String {
    if json {
        return serde_json::to_string_pretty(turn)
            .unwrap_or_else(|e| format!("{{\"error\": \"Failed to serialize: {}\"}}", e));
    }

    let mut output = turn.text.clone();
    if let Some(sql) = &turn.generated_sql {
        output.push_str("\n\nSQL: ");
        output.push_str(sql);
    }
    if let Some(result) = turn.result.as_ref().filter(|r| !r.columns.is_empty()) {
        output.push_str("\n\n");
        output.push_str(&render_result(result));
        output.push_str(&format!(
            "\n({} row(s) in {} ms)",
            result.row_count,
            result.execution_time.as_millis()
        ));
    }
    if let Some(error) = &turn.error_message {
        output.push_str("\n\n");
        output.push_str(error);
    }
    output
}

/// Renders a result set as an aligned text table.
pub fn render_result(result: &QueryResult) -> String {
    let headers: Vec<String> = result.columns.iter().map(|c| c.name.clone()).collect();
    let rows: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(|v| truncate(&v.to_display_string())).collect())
        .collect();
    format_table(&headers, &rows)
}

fn truncate(cell: &str) -> String {
    let cell = cell.replace(['\n', '\r'], " ");
    if cell.chars().count() <= MAX_CELL_WIDTH {
        return cell;
    }
    let cut: String = cell.chars().take(MAX_CELL_WIDTH - 3).collect();
    format!("{cut}...")
}

fn format_table(headers: &[String], rows: &[Vec<String>]) -> String {
    if headers.is_empty() {
        return String::new();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let mut output = String::new();

    let header_line: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    output.push_str(header_line.join(" | ").trim_end());
    output.push('\n');

    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    output.push_str(&separator.join("-+-"));
    output.push('\n');

    for row in rows {
        let row_line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let width = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = width)
            })
            .collect();
        output.push_str(row_line.join(" | ").trim_end());
        output.push('\n');
    }

    output.trim_end().to_string()
}

/// Renders the full schema summary.
pub fn render_schema(schema: &SchemaSummary) -> String {
    let mut output = schema.format_for_llm().trim_end().to_string();
    if !schema.omitted.is_empty() {
        output.push_str(&format!(
            "\n\nCould not describe: {}",
            schema.omitted.join(", ")
        ));
    }
    output
}

/// Renders one table as a `DESCRIBE`-style grid.
pub fn render_table_schema(table: &TableSchema) -> String {
    let headers: Vec<String> = ["Field", "Type", "Null", "Key", "Default", "Extra"]
        .iter()
        .map(|h| h.to_string())
        .collect();
    let rows: Vec<Vec<String>> = table
        .columns
        .iter()
        .map(|c| {
            vec![
                c.name.clone(),
                c.data_type.clone(),
                if c.is_nullable { "YES" } else { "NO" }.to_string(),
                c.key.clone(),
                c.default.clone().unwrap_or_else(|| "NULL".to_string()),
                c.extra.clone(),
            ]
        })
        .collect();
    format!("Table: {}\n{}", table.name, format_table(&headers, &rows))
}

fn render_list(title: &str, items: &[String]) -> String {
    if items.is_empty() {
        return format!("{title}: (none)");
    }
    let lines: Vec<String> = items.iter().map(|item| format!("  {item}")).collect();
    format!("{title}:\n{}", lines.join("\n"))
}

fn render_databases(snapshot: &SessionSnapshot) -> String {
    let current = snapshot.current_database.as_deref();
    let lines: Vec<String> = snapshot
        .available_databases
        .iter()
        .map(|db| {
            let marker = if Some(db.as_str()) == current { "*" } else { " " };
            format!("{marker} {db}")
        })
        .collect();
    format!("Databases:\n{}", lines.join("\n"))
}

/// Renders the transcript, one line per turn.
pub fn render_history(turns: &[ChatTurn]) -> String {
    if turns.is_empty() {
        return "No chat history.".to_string();
    }
    turns
        .iter()
        .map(|turn| {
            let who = match turn.role {
                TurnRole::User => "you",
                TurnRole::Assistant => "assistant",
            };
            let mut line = format!("[{}] {who}: {}", turn.database, turn.text);
            if let Some(sql) = &turn.generated_sql {
                line.push_str(&format!("\n    SQL: {sql}"));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders the session status block.
pub fn render_status(snapshot: &SessionSnapshot, phase: crate::session::SessionPhase) -> String {
    if !snapshot.connected {
        return "Not connected. Use /connect to reconnect.".to_string();
    }
    format!(
        "Connected: {}\nDatabase: {}\nQueries this session: {}\nTurns in history: {}\nStatus: {}",
        snapshot.connection.as_deref().unwrap_or("-"),
        snapshot.current_database.as_deref().unwrap_or("-"),
        snapshot.query_count,
        snapshot.history_len,
        phase
    )
}
