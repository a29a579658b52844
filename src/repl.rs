//! Interactive chat loop (`docchat chat`).
//!
//! Plain lines are questions about the loaded documents; lines starting with
//! `/` are commands. Ctrl-C stops a running analysis.

use std::path::PathBuf;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::app::ApplicationSession;
use crate::commands::{format_listing, format_summary, read_documents};
use crate::gateway::AnalysisMode;
use crate::models::Role;
use crate::progress::ProgressMode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Ask(String),
    New,
    Clear,
    Sessions,
    Load(String),
    /// `/mode` with no argument shows the current mode.
    Mode(Option<String>),
    Docs,
    Add(Vec<PathBuf>),
    ClearDocs,
    History,
    Help,
    Quit,
    Invalid(String),
}

pub fn parse_command(line: &str) -> Option<ReplCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(ReplCommand::Ask(line.to_string()));
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let command = match name {
        "new" => ReplCommand::New,
        "clear" => ReplCommand::Clear,
        "sessions" => ReplCommand::Sessions,
        "load" if arg.is_empty() => ReplCommand::Invalid("usage: /load <session id>".into()),
        "load" => ReplCommand::Load(arg.to_string()),
        "mode" if arg.is_empty() => ReplCommand::Mode(None),
        "mode" => ReplCommand::Mode(Some(arg.to_string())),
        "docs" => ReplCommand::Docs,
        "add" if arg.is_empty() => ReplCommand::Invalid("usage: /add <file>...".into()),
        "add" => ReplCommand::Add(arg.split_whitespace().map(PathBuf::from).collect()),
        "cleardocs" => ReplCommand::ClearDocs,
        "history" => ReplCommand::History,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" | "q" => ReplCommand::Quit,
        other => ReplCommand::Invalid(format!(
            "unknown command /{}; type /help for the list",
            other
        )),
    };
    Some(command)
}

const HELP: &str = "\
Type a question to ask about the loaded documents.

  /new              archive this chat and start a new one
  /clear            clear the messages of this chat
  /sessions         list saved chats
  /load <id>        switch to a saved chat
  /history          show this chat's messages
  /mode [<mode>]    show or set the analysis mode
  /docs             list processed documents
  /add <file>...    process more documents
  /cleardocs        remove all documents
  /help             show this help
  /quit             leave

Press Ctrl-C while an analysis runs to stop it.";

pub async fn run_chat(mut app: ApplicationSession) -> Result<()> {
    let stop = app.stop_handle();
    let signals = tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if stop.stop() {
                eprintln!("\nstopping analysis...");
            } else {
                eprintln!("\n(use /quit to leave)");
            }
        }
    });

    println!(
        "docchat: {} document(s) loaded, mode: {}. Type /help for commands.",
        app.corpus().len(),
        app.mode()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let Some(command) = parse_command(&line) else {
            continue;
        };
        if command == ReplCommand::Quit {
            break;
        }
        execute(&mut app, command).await;
    }

    signals.abort();
    Ok(())
}

async fn execute(app: &mut ApplicationSession, command: ReplCommand) {
    match command {
        ReplCommand::Ask(query) => match app.ask(&query).await {
            Ok(outcome) => println!("\n{}\n", outcome.reply),
            Err(e) => eprintln!("{}", e),
        },
        ReplCommand::New => {
            let id = app.start_new_session();
            println!("started new chat {}", id);
        }
        ReplCommand::Clear => {
            app.clear_chat();
            println!("chat cleared");
        }
        ReplCommand::Sessions => {
            let sessions = app.sessions().sessions();
            if sessions.is_empty() {
                println!("no saved chats");
            }
            let active = app.sessions().active_id().to_string();
            for s in sessions {
                let marker = if s.id == active { "*" } else { " " };
                println!("{} {}  {}  ({} messages)", marker, s.id, s.label(), s.message_count);
            }
        }
        ReplCommand::Load(id) => match app.load_session(&id) {
            Ok(()) => println!(
                "loaded {} ({} messages)",
                id,
                app.sessions().messages().len()
            ),
            Err(e) => eprintln!("{}", e),
        },
        ReplCommand::History => {
            for message in app.sessions().messages() {
                let who = match message.role {
                    Role::User => "you",
                    Role::Assistant => "assistant",
                };
                println!("[{}] {}\n", who, message.content);
            }
        }
        ReplCommand::Mode(None) => {
            println!("mode: {}", app.mode());
            let labels: Vec<&str> = AnalysisMode::ALL.iter().map(|m| m.label()).collect();
            println!("available: {}", labels.join(", "));
        }
        ReplCommand::Mode(Some(label)) => {
            app.set_mode(AnalysisMode::from_label(&label));
            println!("mode: {}", app.mode());
        }
        ReplCommand::Docs => print!("{}", format_listing(app.corpus())),
        ReplCommand::Add(paths) => match read_documents(&paths) {
            Ok(documents) => {
                let summary = app.ingest(documents, ProgressMode::default_for_tty().reporter().as_ref());
                println!("{}", format_summary(&summary));
            }
            Err(e) => eprintln!("{:#}", e),
        },
        ReplCommand::ClearDocs => {
            app.clear_documents();
            println!("all documents removed");
        }
        ReplCommand::Help => println!("{}", HELP),
        ReplCommand::Invalid(message) => eprintln!("{}", message),
        ReplCommand::Quit => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_questions() {
        assert_eq!(
            parse_command("  what is the total?  "),
            Some(ReplCommand::Ask("what is the total?".into()))
        );
        assert_eq!(parse_command("   "), None);
    }

    #[test]
    fn slash_commands_parse_with_arguments() {
        assert_eq!(parse_command("/new"), Some(ReplCommand::New));
        assert_eq!(
            parse_command("/load chat_20240101_120000"),
            Some(ReplCommand::Load("chat_20240101_120000".into()))
        );
        assert_eq!(
            parse_command("/mode Bullet Points"),
            Some(ReplCommand::Mode(Some("Bullet Points".into())))
        );
        assert_eq!(parse_command("/mode"), Some(ReplCommand::Mode(None)));
        assert_eq!(
            parse_command("/add a.txt  b.pdf"),
            Some(ReplCommand::Add(vec!["a.txt".into(), "b.pdf".into()]))
        );
        assert_eq!(parse_command("/exit"), Some(ReplCommand::Quit));
    }

    #[test]
    fn bad_commands_explain_themselves() {
        assert!(matches!(parse_command("/load"), Some(ReplCommand::Invalid(_))));
        assert!(matches!(parse_command("/frobnicate"), Some(ReplCommand::Invalid(m)) if m.contains("/frobnicate")));
    }
}
