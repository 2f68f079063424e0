// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `mishkat shell` command implementation.
//!
//! An interactive REPL acting as one signed-in user on their support
//! conversation. Plain lines go through the full classify, reply, and route
//! pipeline; slash commands inspect history and file tickets. Ctrl+C while a
//! reply is pending cancels generation for the conversation.

use std::sync::Arc;

use colored::Colorize;
use mishkat_chat::{ChatService, Exchange};
use mishkat_config::MishkatConfig;
use mishkat_core::{
    ConversationId, EscalationReason, Identity, IdentityProvider, Message, MishkatError, Sender,
    UserId,
};
use mishkat_storage::Stores;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::debug;

/// Identity supplied on the command line.
struct CliIdentity {
    identity: Identity,
}

impl IdentityProvider for CliIdentity {
    fn current_user(&self) -> Option<Identity> {
        Some(self.identity.clone())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ShellCommand<'a> {
    Quit,
    Help,
    History,
    ClearHistory,
    Ticket(&'a str),
    Unread,
    Retry,
    Say(&'a str),
    Unknown(&'a str),
}

fn parse_command(line: &str) -> ShellCommand<'_> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return ShellCommand::Say(line);
    };
    let (name, arg) = rest
        .split_once(char::is_whitespace)
        .map(|(n, a)| (n, a.trim()))
        .unwrap_or((rest, ""));
    match name {
        "quit" | "exit" => ShellCommand::Quit,
        "help" => ShellCommand::Help,
        "history" => ShellCommand::History,
        "clear-history" => ShellCommand::ClearHistory,
        "ticket" if !arg.is_empty() => ShellCommand::Ticket(arg),
        "unread" => ShellCommand::Unread,
        "retry" => ShellCommand::Retry,
        _ => ShellCommand::Unknown(line),
    }
}

/// Runs the `mishkat shell` interactive REPL.
pub async fn run_shell(
    config: MishkatConfig,
    user: String,
    name: Option<String>,
) -> Result<(), MishkatError> {
    let stores = Stores::open(&config).await?;
    let identity = CliIdentity {
        identity: Identity {
            display_name: name.unwrap_or_else(|| user.clone()),
            user_id: UserId::new(user),
        },
    };
    let service = ChatService::new(&config, stores.chat, stores.history, stores.cache)
        .with_identity(Arc::new(identity));
    let me = service
        .current_user()
        .ok_or_else(|| MishkatError::Internal("no signed-in user".to_string()))?;

    let conversation = service.open_support_conversation(&me.user_id).await?;
    debug!(conversation_id = %conversation.id, "support conversation opened");

    let mut rl = DefaultEditor::new()
        .map_err(|e| MishkatError::Internal(format!("failed to initialize readline: {e}")))?;

    println!("{}", format!("{} support", config.service.name).bold().green());
    println!(
        "Signed in as {}. Type {} for commands, {} to exit.\n",
        me.display_name.bold(),
        "/help".yellow(),
        "/quit".yellow()
    );
    for message in service.conversations().list_messages(&conversation.id).await? {
        print_message(&message);
    }
    service
        .conversations()
        .mark_read(&conversation.id, &me.user_id)
        .await?;

    let prompt = format!("{}> ", me.user_id.as_str().green());
    loop {
        match rl.readline(&prompt) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(&line);

                let command = parse_command(&line);
                if command == ShellCommand::Quit {
                    break;
                }
                if let Err(e) = run_command(&service, &conversation.id, &me, command).await {
                    eprintln!("{}: {e}", "error".red());
                    if e.is_retryable() {
                        eprintln!("{}", "message kept locally, use /retry to resend".dimmed());
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {e}", "error".red());
                break;
            }
        }
    }

    service
        .conversations()
        .mark_read(&conversation.id, &me.user_id)
        .await?;
    service.shutdown().await
}

async fn run_command(
    service: &ChatService,
    conversation_id: &ConversationId,
    me: &Identity,
    command: ShellCommand<'_>,
) -> Result<(), MishkatError> {
    match command {
        ShellCommand::Quit => Ok(()),
        ShellCommand::Help => {
            println!("  /history         escalation reasons recorded for you");
            println!("  /clear-history   forget recorded escalations");
            println!("  /ticket SUBJECT  file a support ticket");
            println!("  /unread          unread messages in this conversation");
            println!("  /retry           resend messages that failed to send");
            println!("  /quit            leave the shell");
            Ok(())
        }
        ShellCommand::History => {
            let history = service.get_history(&me.user_id).await?;
            if history.is_empty() {
                println!("{}", "no escalations recorded".dimmed());
            }
            for (i, reason) in history.iter().enumerate() {
                println!("  {}. {reason}", i + 1);
            }
            Ok(())
        }
        ShellCommand::ClearHistory => {
            service.clear_history(&me.user_id).await?;
            println!("{}", "escalation history cleared".dimmed());
            Ok(())
        }
        ShellCommand::Ticket(subject) => {
            let session = service
                .open_ticket(&me.user_id, subject, EscalationReason::AdminRequest, None)
                .await?;
            println!(
                "{} {} ({} priority)",
                "ticket filed:".yellow(),
                session.id,
                session.priority
            );
            Ok(())
        }
        ShellCommand::Unread => {
            let unread = service
                .conversations()
                .unread_count(conversation_id, &me.user_id)
                .await?;
            println!("{unread} unread");
            Ok(())
        }
        ShellCommand::Retry => {
            let failed = service.conversations().failed_messages(conversation_id).await?;
            if failed.is_empty() {
                println!("{}", "nothing to resend".dimmed());
            }
            for message in failed {
                let exchange = service
                    .retry_user_message(conversation_id, &message.id)
                    .await?;
                println!("{} {}", "sent:".dimmed(), message.text);
                print_exchange(&exchange);
            }
            Ok(())
        }
        ShellCommand::Say(text) => {
            let send = service.handle_user_message(conversation_id, &me.user_id, text);
            tokio::pin!(send);
            let exchange = tokio::select! {
                result = &mut send => result,
                _ = tokio::signal::ctrl_c() => {
                    service.cancel_conversation(conversation_id);
                    send.await
                }
            };
            match exchange {
                Ok(exchange) => {
                    print_exchange(&exchange);
                    Ok(())
                }
                Err(MishkatError::Cancelled) => {
                    println!("{}", "reply cancelled".dimmed());
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
        ShellCommand::Unknown(line) => {
            println!("unknown command {}, try {}", line.yellow(), "/help".yellow());
            Ok(())
        }
    }
}

fn print_message(message: &Message) {
    let who = match message.sender {
        Sender::User => message
            .author
            .as_ref()
            .map(|a| a.to_string())
            .unwrap_or_default()
            .normal(),
        Sender::Assistant => "assistant".cyan(),
        Sender::Operator => message
            .author
            .as_ref()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "operator".to_string())
            .magenta(),
    };
    println!("{who}: {}", message.text);
}

fn print_exchange(exchange: &Exchange) {
    for reply in &exchange.replies {
        print_message(reply);
    }
    match (&exchange.reason, &exchange.session) {
        (Some(reason), Some(session)) => println!(
            "{}",
            format!(
                "escalated ({reason}), session {} is {} with {} priority",
                session.id, session.status, session.priority
            )
            .yellow()
        ),
        (None, Some(session)) => println!(
            "{}",
            format!("forwarded to operator session {} ({})", session.id, session.status).dimmed()
        ),
        _ => {}
    }
}
