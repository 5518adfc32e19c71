//! # vigil-console
//!
//! Minimal terminal front-end for the synchronization core: signs in,
//! connects, prints what the stores publish, and forwards typed lines as
//! chat turns.
//!
//! Line commands:
//! - `/approve` / `/reject` — decide the pending plan
//! - `/answer <action>` — answer the live question
//! - `/quit` — disconnect and exit
//! - anything else is sent as a chat turn

#![deny(unsafe_code)]

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use vigil_auth::AuthClient;
use vigil_client::{ConnectionState, VigilClient};
use vigil_core::{InteractionResponse, Role};
use vigil_settings::{load_settings_from_path, settings_path};

/// Vigil operator console.
#[derive(Parser, Debug)]
#[command(name = "vigil-console", about = "Terminal console for a Vigil assistant")]
struct Cli {
    /// Username to sign in with.
    #[arg(long)]
    username: Option<String>,

    /// Password (falls back to the VIGIL_PASSWORD environment variable).
    #[arg(long)]
    password: Option<String>,

    /// Pre-issued bearer token; skips the login call.
    #[arg(long)]
    token: Option<String>,

    /// WebSocket URL (overrides settings).
    #[arg(long)]
    url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Cli::parse();
    let mut settings =
        load_settings_from_path(&settings_path()).context("failed to load settings")?;
    if let Some(url) = args.url {
        settings.server.url = url;
    }

    let token = match args.token {
        Some(token) => token,
        None => {
            let Some(username) = args.username else {
                bail!("either --token or --username is required");
            };
            let password = match args.password {
                Some(password) => password,
                None => std::env::var("VIGIL_PASSWORD")
                    .context("--password or VIGIL_PASSWORD is required with --username")?,
            };
            let auth = AuthClient::new(&settings.server.auth_base_url);
            let session = auth
                .login(&username, &password)
                .await
                .context("login failed")?;
            tracing::info!(username = %session.user.username, "signed in");
            session.access_token
        }
    };

    let client = VigilClient::new(&settings);
    client.connect(token);

    // Wait for the handshake before accepting input; a terminal failure
    // here means the credential or the server is wrong, not transient.
    let mut connection = client.connection();
    let established = connection
        .wait_for(|info| {
            info.state == ConnectionState::Connected
                || (info.state == ConnectionState::Disconnected && info.last_error.is_some())
        })
        .await
        .context("connection watch closed")?
        .clone();
    if established.state != ConnectionState::Connected {
        match established.last_error {
            Some(error) => bail!("connection failed: {error}"),
            None => bail!("connection closed before the handshake finished"),
        }
    }
    println!("connected to {}", settings.server.url);

    let printer = tokio::spawn(print_updates(
        client.conversation(),
        client.interactions(),
        client.plans(),
    ));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if let Err(e) = handle_line(&client, line) {
            eprintln!("! {e}");
        }
    }

    client.disconnect();
    printer.abort();
    Ok(())
}

fn handle_line(client: &VigilClient, line: &str) -> Result<()> {
    match line.split_once(' ').map_or((line, ""), |(a, b)| (a, b)) {
        ("/approve", _) | ("/reject", _) => {
            let approved = line.starts_with("/approve");
            let Some(plan_id) = client.plans().borrow().pending.as_ref().map(|p| p.id.clone())
            else {
                bail!("no plan is awaiting approval");
            };
            client.decide_plan(&plan_id, approved)?;
        }
        ("/answer", action) => {
            if action.is_empty() {
                bail!("usage: /answer <action>");
            }
            let Some(id) = client
                .interactions()
                .borrow()
                .live
                .as_ref()
                .map(|live| live.interaction.id.clone())
            else {
                bail!("no question is awaiting an answer");
            };
            client.answer_question(
                &id,
                InteractionResponse {
                    action: action.to_owned(),
                    value: None,
                },
            )?;
        }
        _ => client.send_message(line)?,
    }
    Ok(())
}

/// Print transcript turns, questions, and plan proposals as they arrive.
async fn print_updates(
    mut conversation: tokio::sync::watch::Receiver<vigil_client::conversation::ConversationSnapshot>,
    mut interactions: tokio::sync::watch::Receiver<vigil_client::interaction::InteractionSnapshot>,
    mut plans: tokio::sync::watch::Receiver<vigil_client::plan::PlanSnapshot>,
) {
    let mut printed_turns = 0usize;
    loop {
        tokio::select! {
            changed = conversation.changed() => {
                if changed.is_err() {
                    return;
                }
                let snapshot = conversation.borrow_and_update().clone();
                for turn in snapshot.turns.iter().skip(printed_turns) {
                    let tag = match turn.role {
                        Role::User => "you",
                        Role::Assistant => "assistant",
                        Role::System => "system",
                    };
                    println!("[{tag}] {}", turn.content);
                }
                printed_turns = snapshot.turns.len();
            }
            changed = interactions.changed() => {
                if changed.is_err() {
                    return;
                }
                let snapshot = interactions.borrow_and_update().clone();
                if let Some(live) = snapshot.live {
                    println!("[question] {}", live.interaction.question);
                    if !live.interaction.suggested_actions.is_empty() {
                        println!(
                            "  answer with /answer {{{}}}",
                            live.interaction.suggested_actions.join(" | ")
                        );
                    }
                }
            }
            changed = plans.changed() => {
                if changed.is_err() {
                    return;
                }
                let snapshot = plans.borrow_and_update().clone();
                if let Some(pending) = snapshot.pending {
                    println!(
                        "[plan] {} ({} steps) — /approve or /reject",
                        pending.description,
                        pending.steps.len()
                    );
                }
            }
        }
    }
}
