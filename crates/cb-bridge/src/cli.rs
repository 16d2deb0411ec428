//! Interactive prompt
//!
//! Mutates the in-memory store and manages listener subscriptions. Every
//! stream payload is printed to stdout as one JSON line:
//! `{"stream": "detailed", "payload": [...]}`.

use std::borrow::Cow;
use std::io::IsTerminal;
use std::sync::Arc;

use cb_core::{Contact, MemoryContactStore};
use cb_listener::{ContactEventStream, ContactsListener, StreamKind};
use nu_ansi_term::{Color, Style};
use reedline::{
    Completer, DefaultHinter, Emacs, Prompt, PromptEditMode, PromptHistorySearch, Reedline,
    Signal, Span, Suggestion, default_emacs_keybindings,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{debug, info};

/// Available commands for completion and help
const COMMANDS: &[(&str, &str)] = &[
    ("add", "add <name>: create a contact"),
    ("update", "update <id> <name>: rename a contact"),
    ("remove", "remove <id>: delete a contact"),
    ("touch", "touch: signal a change without editing anything"),
    ("deny", "deny: withdraw read access silently"),
    ("revoke", "revoke: withdraw read access and tell observers"),
    ("grant", "grant: restore read access"),
    ("subscribe", "subscribe simple|detailed: open a stream"),
    ("unsubscribe", "unsubscribe simple|detailed: close a stream"),
    ("list", "list: show contacts and subscriptions"),
    ("help", "help: show this list"),
    ("quit", "quit: exit"),
];

/// One parsed prompt line
#[derive(Debug, PartialEq)]
enum Command {
    Add(String),
    Update { id: String, name: String },
    Remove(String),
    Touch,
    Deny,
    Revoke,
    Grant,
    Subscribe(StreamKind),
    Unsubscribe(StreamKind),
    List,
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let stream_kind = |rest: &str| rest.parse::<StreamKind>();

    match word {
        "add" if !rest.is_empty() => Ok(Command::Add(rest.to_string())),
        "update" => match rest.split_once(char::is_whitespace) {
            Some((id, name)) if !name.trim().is_empty() => Ok(Command::Update {
                id: id.to_string(),
                name: name.trim().to_string(),
            }),
            _ => Err("usage: update <id> <name>".to_string()),
        },
        "remove" if !rest.is_empty() => Ok(Command::Remove(rest.to_string())),
        "touch" => Ok(Command::Touch),
        "deny" => Ok(Command::Deny),
        "revoke" => Ok(Command::Revoke),
        "grant" => Ok(Command::Grant),
        "subscribe" => stream_kind(rest).map(Command::Subscribe),
        "unsubscribe" => stream_kind(rest).map(Command::Unsubscribe),
        "list" | "ls" => Ok(Command::List),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        "add" | "remove" => Err(format!("usage: {} <argument>", word)),
        other => Err(format!("unknown command: {} (try `help`)", other)),
    }
}

/// Command completer for reedline
#[derive(Clone, Default)]
struct CommandCompleter;

impl Completer for CommandCompleter {
    fn complete(&mut self, line: &str, pos: usize) -> Vec<Suggestion> {
        if line.contains(char::is_whitespace) {
            return Vec::new();
        }

        COMMANDS
            .iter()
            .filter(|(cmd, _)| cmd.starts_with(line))
            .map(|(cmd, desc)| Suggestion {
                value: cmd.to_string(),
                description: Some(desc.to_string()),
                extra: None,
                span: Span::new(0, pos),
                append_whitespace: true,
                style: None,
            })
            .collect()
    }
}

struct BridgePrompt {
    style: Style,
}

impl Prompt for BridgePrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        Cow::Owned(self.style.paint("contacts> ").to_string())
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _prompt_mode: PromptEditMode) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_history_search_indicator(
        &self,
        _history_search: PromptHistorySearch,
    ) -> Cow<'_, str> {
        Cow::Borrowed("")
    }
}

/// Where prompt lines come from
enum LineSource {
    /// Terminal: line editor with completion
    Editor(Box<Reedline>, BridgePrompt),
    /// Pipe or file: plain lines
    Piped(Lines<BufReader<Stdin>>),
}

impl LineSource {
    fn detect() -> Self {
        if !std::io::stdin().is_terminal() {
            return LineSource::Piped(BufReader::new(tokio::io::stdin()).lines());
        }

        let editor = Reedline::create()
            .with_completer(Box::new(CommandCompleter))
            .with_hinter(Box::new(
                DefaultHinter::default().with_style(Style::new().dimmed()),
            ))
            .with_edit_mode(Box::new(Emacs::new(default_emacs_keybindings())));
        let prompt = BridgePrompt {
            style: Color::Cyan.bold(),
        };
        LineSource::Editor(Box::new(editor), prompt)
    }

    /// Next input line; `None` at end of input
    async fn next_line(&mut self) -> anyhow::Result<Option<String>> {
        match self {
            LineSource::Editor(editor, prompt) => loop {
                // The editor blocks on the terminal
                let signal = tokio::task::block_in_place(|| editor.read_line(&*prompt))?;
                match signal {
                    Signal::Success(line) => return Ok(Some(line)),
                    Signal::CtrlC => continue,
                    Signal::CtrlD => return Ok(None),
                }
            },
            LineSource::Piped(lines) => Ok(lines.next_line().await?),
        }
    }
}

/// Print a stream's payloads until it ends
fn spawn_printer(mut stream: ContactEventStream) {
    let kind = stream.kind();
    tokio::spawn(async move {
        while let Some(event) = stream.recv().await {
            let line = serde_json::json!({
                "stream": kind.as_str(),
                "payload": event.to_json(),
            });
            println!("{}", line);
        }
        debug!(stream = %kind, "Stream ended");
    });
}

fn print_help() {
    eprintln!("Commands:");
    for (_, desc) in COMMANDS {
        eprintln!("  {}", desc);
    }
}

fn print_list(store: &MemoryContactStore, listener: &ContactsListener) {
    let contacts = store.contacts();
    eprintln!("{} contacts:", contacts.len());
    for contact in contacts {
        eprintln!("  {}  {}", contact.id, contact.display_name);
    }
    eprintln!(
        "read access: {}",
        if listener.has_read_permission() {
            "granted"
        } else {
            "denied"
        }
    );
    for kind in StreamKind::ALL {
        eprintln!("  {:<9} {}", kind.as_str(), listener.state(kind));
    }
}

/// Apply one command. Returns false when the prompt should exit.
async fn execute(command: Command, store: &MemoryContactStore, listener: &ContactsListener) -> bool {
    match command {
        Command::Add(name) => {
            let id = store.insert(Contact::new("", name));
            eprintln!("added {}", id);
        }
        Command::Update { id, name } => {
            let contact = match store.get(&id) {
                Some(mut contact) => {
                    contact.display_name = name;
                    contact
                }
                None => {
                    eprintln!("no contact {}", id);
                    return true;
                }
            };
            store.update(contact);
            eprintln!("updated {}", id);
        }
        Command::Remove(id) => {
            if store.remove(&id) {
                eprintln!("removed {}", id);
            } else {
                eprintln!("no contact {}", id);
            }
        }
        Command::Touch => store.touch(),
        Command::Deny => store.set_permission(false),
        Command::Revoke => store.revoke_permission(),
        Command::Grant => store.set_permission(true),
        Command::Subscribe(kind) => {
            let stream = listener.subscribe(kind).await;
            spawn_printer(stream);
        }
        Command::Unsubscribe(kind) => {
            if !listener.unsubscribe(kind) {
                eprintln!("{} stream was not subscribed", kind);
            }
        }
        Command::List => print_list(store, listener),
        Command::Help => print_help(),
        Command::Quit => return false,
    }
    true
}

/// Run the interactive prompt until `quit` or end of input
pub async fn run_cli(store: MemoryContactStore, listener: Arc<ContactsListener>) -> anyhow::Result<()> {
    info!("Starting interactive prompt");
    eprintln!("cb-bridge {}: type `help` for commands", env!("CARGO_PKG_VERSION"));

    let mut input = LineSource::detect();

    while let Some(line) = input.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        match parse_command(&line) {
            Ok(command) => {
                if !execute(command, &store, &listener).await {
                    break;
                }
            }
            Err(e) => eprintln!("{}", e),
        }
    }

    info!("Prompt closed");
    Ok(())
}
