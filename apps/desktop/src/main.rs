use std::io::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use backend::{Backend, BackendConfig};
use clap::Parser;
use client_core::{AttachmentDraft, ChatClient, ChatClientError, ClientEvent, SendOutcome};
use shared::domain::Message;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

mod config;

#[derive(Parser, Debug)]
struct Args {
    /// Hosted backend base URL; overrides parlor.toml and APP__SERVER_URL.
    #[arg(long)]
    server_url: Option<String>,
    /// Sign-in email; prompted when absent.
    #[arg(long)]
    email: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();
    let settings = config::load_settings();
    let server_url = args.server_url.unwrap_or(settings.server_url);

    let backend = Backend::new(BackendConfig::new(&server_url)?);
    let client = ChatClient::new(
        backend.identity.clone(),
        backend.messages.clone(),
        backend.blobs.clone(),
    );
    client.watch_identity().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let email = match args.email.or(settings.email) {
        Some(email) => email,
        None => prompt(&mut lines, "email: ").await?,
    };
    let password = prompt(&mut lines, "password: ").await?;

    if let Err(err) = client.sign_in(&email, &password).await {
        println!("{}", login_failure_message(&err));
        return Ok(());
    }

    client
        .start_sync()
        .await
        .context("failed to open the live message subscription")?;
    spawn_event_printer(&client);
    println!("Connected to {server_url}. Type a message, or /help for commands.");

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !line.starts_with('/') {
            client.set_draft_text(line).await;
            send_draft(&client).await;
            continue;
        }

        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        match command {
            "/help" => print_help(),
            "/send" => send_draft(&client).await,
            "/attach" => attach_file(&client, rest.trim()).await,
            "/select" => select_by_index(&client, rest.trim()).await,
            "/delete" => match client.delete_selected().await {
                Ok(outcome) => {
                    println!(
                        "deleted {} message(s), skipped {}",
                        outcome.deleted, outcome.skipped
                    );
                    if !outcome.failed.is_empty() {
                        println!(
                            "{} message(s) could not be deleted and stay selected; retry /delete",
                            outcome.failed.len()
                        );
                    }
                }
                Err(err) => println!("delete failed: {err}"),
            },
            "/dark" => {
                let dark_mode = client.toggle_dark_mode().await;
                println!("dark mode {}", if dark_mode { "on" } else { "off" });
            }
            "/quit" => {
                client.sign_out().await;
                break;
            }
            other => println!("unknown command {other}; /help lists commands"),
        }
    }

    Ok(())
}

async fn prompt(lines: &mut Lines<BufReader<Stdin>>, label: &str) -> Result<String> {
    print!("{label}");
    std::io::stdout().flush()?;
    Ok(lines
        .next_line()
        .await?
        .unwrap_or_default()
        .trim()
        .to_string())
}

async fn send_draft(client: &Arc<ChatClient>) {
    match client.send_draft().await {
        Ok(SendOutcome::Sent(_)) => {}
        Ok(SendOutcome::NothingToSend) => println!("nothing to send"),
        // The draft is kept verbatim; the user retries by sending again.
        Err(err) => println!("send failed: {err}; draft kept"),
    }
}

async fn attach_file(client: &Arc<ChatClient>, path: &str) {
    if path.is_empty() {
        println!("usage: /attach <file>");
        return;
    }
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let file_name = std::path::Path::new(path)
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("attachment")
                .to_string();
            let mime_type = mime_guess::from_path(path)
                .first()
                .map(|m| m.essence_str().to_string());
            client
                .set_draft_attachment(Some(AttachmentDraft {
                    file_name,
                    mime_type,
                    bytes,
                }))
                .await;
            println!("attached {path}; it goes out with the next send");
        }
        Err(err) => println!("cannot read {path}: {err}"),
    }
}

async fn select_by_index(client: &Arc<ChatClient>, raw: &str) {
    let Ok(index) = raw.parse::<usize>() else {
        println!("usage: /select <message number>");
        return;
    };
    let messages = client.messages().await;
    match messages.get(index) {
        Some(message) => client.toggle_selection(message.id.clone()).await,
        None => println!("no message {index}; the list shows current numbers"),
    }
}

fn spawn_event_printer(client: &Arc<ChatClient>) {
    let mut events = client.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ClientEvent::MessagesUpdated { messages } => render_snapshot(&messages),
                ClientEvent::SelectionChanged { selected } => {
                    if !selected.is_empty() {
                        println!("selected {} message(s); /delete removes yours", selected.len());
                    }
                }
                ClientEvent::ThemeChanged { dark_mode } => {
                    println!("theme: {}", if dark_mode { "dark" } else { "light" });
                }
                ClientEvent::IdentityChanged(Some(principal)) => {
                    println!("signed in as {}", principal.email);
                }
                ClientEvent::IdentityChanged(None) => println!("signed out"),
                ClientEvent::Error(message) => println!("error: {message}"),
            }
        }
    });
}

fn render_snapshot(messages: &[Message]) {
    println!("--- room ({} messages) ---", messages.len());
    for (index, message) in messages.iter().enumerate() {
        let attachment = if message.has_attachment() {
            " [image]"
        } else {
            ""
        };
        println!(
            "{index:>3}  {}: {}{attachment}",
            message.author_email, message.text
        );
    }
}

fn print_help() {
    println!("<text>          send a message");
    println!("/send           send the current draft (e.g. an attachment without text)");
    println!("/attach <file>  stage an image for the next send");
    println!("/select <n>     toggle a message for deletion");
    println!("/delete         delete the selected messages you own");
    println!("/dark           toggle dark mode");
    println!("/quit           sign out and exit");
}

/// Sign-in failures always render a generic line; the backend's own error
/// text is never echoed to the user.
fn login_failure_message(err: &ChatClientError) -> String {
    let detail = format!("{err:?}").to_ascii_lowercase();
    if detail.contains("connect") || detail.contains("dns") || detail.contains("timed out") {
        "Server unreachable; check the URL and network, then retry.".to_string()
    } else {
        "Invalid email or password.".to_string()
    }
}
