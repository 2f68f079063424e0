// SPDX-FileCopyrightText: 2026 Mishkat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `mishkat queue` command implementation.
//!
//! Operator view of the support queue: list WAITING sessions most urgent
//! first, accept, reply, resolve, and close.

use clap::Subcommand;
use colored::{ColoredString, Colorize};
use mishkat_chat::ChatService;
use mishkat_config::MishkatConfig;
use mishkat_core::{HealthStatus, MishkatError, Priority, Session, SessionId, UserId};
use mishkat_storage::Stores;

#[derive(Subcommand, Debug, Clone)]
pub enum QueueAction {
    /// List waiting sessions, most urgent first.
    List {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Store health and queue depth.
    Status,
    /// Show a session and its conversation log.
    Show { session: String },
    /// Accept a waiting session.
    Accept {
        session: String,
        #[arg(long)]
        operator: String,
    },
    /// Reply on an accepted session.
    Reply {
        session: String,
        #[arg(long)]
        operator: String,
        text: String,
    },
    /// Mark a session resolved.
    Resolve { session: String },
    /// Close a ticket.
    Close { session: String },
}

/// Run the `mishkat queue` command.
pub async fn run_queue(config: MishkatConfig, action: QueueAction) -> Result<(), MishkatError> {
    let stores = Stores::open(&config).await?;
    let service = ChatService::new(&config, stores.chat, stores.history, stores.cache);
    let result = dispatch(&service, action).await;
    service.shutdown().await?;
    result
}

async fn dispatch(service: &ChatService, action: QueueAction) -> Result<(), MishkatError> {
    match action {
        QueueAction::List { json } => {
            let queue = service.waiting_queue().await?;
            if json {
                let rendered = serde_json::to_string_pretty(&queue)
                    .map_err(|e| MishkatError::Internal(e.to_string()))?;
                println!("{rendered}");
            } else if queue.is_empty() {
                println!("{}", "queue is empty".dimmed());
            } else {
                let now = chrono::Utc::now();
                for session in &queue {
                    println!("{}", format_session(session, now));
                }
            }
        }
        QueueAction::Status => {
            let status = service.store_status().await;
            let waiting = service.waiting_queue().await?.len();
            println!(
                "{} {} v{} ({})",
                "store".bold(),
                status.name,
                status.version,
                status.adapter_type
            );
            println!("{} {}", "health".bold(), format_health(&status.health));
            println!("{} {waiting}", "waiting".bold());
        }
        QueueAction::Show { session } => {
            let session = service.sessions().get(&SessionId::new(session)).await?;
            println!("{}", format_session(&session, chrono::Utc::now()));
            for message in service
                .conversations()
                .list_messages(&session.conversation_id)
                .await?
            {
                let who = message
                    .author
                    .as_ref()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| message.sender.to_string());
                println!("  {}: {}", who.bold(), message.text);
            }
        }
        QueueAction::Accept { session, operator } => {
            let session = service
                .accept(&SessionId::new(session), &UserId::new(operator))
                .await?;
            println!("{} {}", "accepted".green(), session.id);
        }
        QueueAction::Reply {
            session,
            operator,
            text,
        } => {
            service
                .operator_reply(&SessionId::new(session), &UserId::new(operator), &text)
                .await?;
            println!("{}", "sent".green());
        }
        QueueAction::Resolve { session } => {
            let session = service.resolve(&SessionId::new(session)).await?;
            println!("{} {}", "resolved".green(), session.id);
        }
        QueueAction::Close { session } => {
            let session = service.close(&SessionId::new(session)).await?;
            println!("{} {}", "closed".green(), session.id);
        }
    }
    Ok(())
}

fn format_session(session: &Session, now: chrono::DateTime<chrono::Utc>) -> String {
    let priority = match session.priority {
        Priority::Urgent => session.priority.to_string().red().bold(),
        Priority::High => session.priority.to_string().yellow(),
        _ => session.priority.to_string().normal(),
    };
    let subject = session
        .subject
        .as_deref()
        .map(|s| format!(" \"{s}\""))
        .unwrap_or_default();
    format!(
        "{}  {:<7} {:<21} {} {}{} ({} ago)",
        session.id,
        priority,
        session.escalation_reason,
        session.kind,
        session.user_id,
        subject,
        format_age(now - session.created_at)
    )
}

fn format_health(health: &HealthStatus) -> ColoredString {
    match health {
        HealthStatus::Healthy => "healthy".green(),
        HealthStatus::Degraded(why) => format!("degraded: {why}").yellow(),
        HealthStatus::Unhealthy(why) => format!("unhealthy: {why}").red(),
    }
}

/// Format an age into a short human-readable string.
fn format_age(age: chrono::Duration) -> String {
    let secs = age.num_seconds().max(0);
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;

    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}
