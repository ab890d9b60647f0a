mod config;
mod models;
mod providers;
mod services;

use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use models::{FileInput, ProviderId};
use providers::openrouter::OpenRouterProvider;
use providers::{ExportFormat, ProviderRouter};
use services::attachments::{format_file_size, AttachmentManager};
use services::chat::ChatSession;
use services::export;
use services::keys::ApiKeyStore;
use services::storage::{SqliteStorage, Storage};
use services::store::{ConversationStore, SettingsUpdate};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::new()?);
    if let Err(e) = storage.set(config::KEY_PROVIDER, ProviderId::OpenRouter.as_str()) {
        tracing::error!("Failed to persist provider tag: {}", e);
    }

    let keys = ApiKeyStore::new(storage.clone());
    let provider = match std::env::var("MURMUR_BASE_URL") {
        Ok(base) => {
            let base = url::Url::parse(&base)
                .with_context(|| format!("Invalid MURMUR_BASE_URL: {}", base))?;
            OpenRouterProvider::with_base_url(keys.clone(), base)
        }
        Err(_) => OpenRouterProvider::new(keys.clone()),
    };
    let mut router = ProviderRouter::new();
    router.register(Arc::new(provider));
    let router = Arc::new(router);

    let store = ConversationStore::load(storage, router.clone());
    let mut session = ChatSession::new(store, router);
    let mut attachments = AttachmentManager::new();

    println!("{}: chat with OpenRouter models. /help for commands.", config::APP_NAME);
    if !keys.has_key() {
        println!(
            "No API key set. Get one from {} and run: /key <key>",
            config::OPENROUTER_KEYS_URL
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt(&session);
        let Some(line) = lines.next_line().await? else { break };
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if let Some(command) = line.strip_prefix('/') {
            if !run_command(command, &mut session, &mut attachments, &keys).await {
                break;
            }
        } else {
            send(&mut session, &mut attachments, &line).await;
        }
    }

    Ok(())
}

fn prompt(session: &ChatSession) {
    let title = session
        .store()
        .current()
        .map(|c| c.title.as_str())
        .unwrap_or("no conversation");
    print!("[{}] > ", title);
    let _ = std::io::stdout().flush();
}

async fn send(session: &mut ChatSession, attachments: &mut AttachmentManager, content: &str) {
    if session.store().current().is_none() {
        session.store_mut().create(None);
    }
    let batch = attachments.take_pending();

    session
        .send(content, batch, |token| {
            print!("{}", token);
            let _ = std::io::stdout().flush();
        })
        .await;
    println!();

    if let Some(error) = session.last_error() {
        eprintln!("! {}", error);
        session.dismiss_error();
    }
}

async fn run_command(
    command: &str,
    session: &mut ChatSession,
    attachments: &mut AttachmentManager,
    keys: &ApiKeyStore,
) -> bool {
    let (name, rest) = match command.split_once(' ') {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };

    match name {
        "quit" | "exit" => return false,
        "help" => print_help(),
        "new" => {
            let title = if rest.is_empty() { None } else { Some(rest) };
            session.store_mut().create(title);
        }
        "list" => {
            for (i, conv) in session.store().conversations().iter().enumerate() {
                let marker = if session.store().current_id() == Some(conv.id.as_str()) {
                    "*"
                } else if conv.pinned {
                    "^"
                } else {
                    " "
                };
                println!(
                    "{} {:>2}. {} ({} messages)",
                    marker,
                    i + 1,
                    conv.title,
                    conv.messages.len()
                );
            }
        }
        "open" => {
            if let Some(id) = conversation_id_at(session, rest) {
                session.store_mut().select(&id);
            } else {
                eprintln!("! No such conversation: {}", rest);
            }
        }
        "delete" => {
            let target = if rest.is_empty() {
                session.store().current_id().map(str::to_string)
            } else {
                conversation_id_at(session, rest)
            };
            match target {
                Some(id) => session.store_mut().delete(&id),
                None => eprintln!("! Nothing to delete"),
            }
        }
        "rename" => {
            if rest.is_empty() {
                eprintln!("! Usage: /rename <title>");
            } else if let Some(id) = session.store().current_id().map(str::to_string) {
                session.store_mut().rename(&id, rest);
            }
        }
        "pin" => {
            if let Some(id) = session.store().current_id().map(str::to_string) {
                session.store_mut().toggle_pin(&id);
            }
        }
        "dup" => {
            if let Some(id) = session.store().current_id().map(str::to_string) {
                session.store_mut().duplicate(&id);
            }
        }
        "folder" => {
            if let Some(id) = session.store().current_id().map(str::to_string) {
                let folder = if rest.is_empty() {
                    None
                } else {
                    Some(rest.to_string())
                };
                session.store_mut().set_folder(&id, folder);
            }
        }
        "clear" => {
            session.store_mut().clear_all();
            println!("All conversations deleted.");
        }
        "export" => {
            let Some(format) = ExportFormat::from_str(rest) else {
                eprintln!("! Usage: /export <json|md|txt>");
                return true;
            };
            let Some(conv) = session.store().current() else {
                eprintln!("! No conversation selected");
                return true;
            };
            let title = conv.title.clone();
            let id = conv.id.clone();
            match session.store().export_as_text(&id, format) {
                Some(text) => match export::write_export(Path::new("."), &title, format, &text) {
                    Ok(path) => println!("Exported to {}", path.display()),
                    Err(e) => eprintln!("! {}", e),
                },
                None => eprintln!("! Export failed"),
            }
        }
        "import" => {
            if rest.is_empty() {
                eprintln!("! Usage: /import <file>");
                return true;
            }
            match std::fs::read_to_string(rest) {
                Ok(data) => match session.store_mut().import_from_text(&data) {
                    Ok(_) => println!("Imported."),
                    Err(e) => eprintln!("! {}", e),
                },
                Err(e) => eprintln!("! Failed to read {}: {}", rest, e),
            }
        }
        "search" => {
            for msg in session.search(rest) {
                println!("[{}] {}", msg.role.as_str(), msg.content);
            }
        }
        "models" => {
            println!("Models via {}:", session.provider().display_name());
            match session.router().list_models(&session.provider()).await {
                Ok(models) => {
                    for model in models {
                        match model.description {
                            Some(description) => {
                                println!("{} - {} ({})", model.id, model.name, description)
                            }
                            None => println!("{} - {}", model.id, model.name),
                        }
                    }
                }
                Err(e) => eprintln!("! {}", e),
            }
        }
        "key" => {
            if rest.is_empty() {
                println!(
                    "API key: {}",
                    if keys.has_key() { "set" } else { "not set" }
                );
            } else if rest == "clear" {
                if let Err(e) = keys.clear() {
                    eprintln!("! Failed to clear key: {}", e);
                }
            } else if let Err(e) = keys.set(rest) {
                eprintln!("! Failed to store key: {}", e);
            }
        }
        "attach" => {
            if rest.is_empty() {
                eprintln!("! Usage: /attach <file>");
                return true;
            }
            match FileInput::from_path(Path::new(rest)) {
                Ok(input) => match attachments.add_files(vec![input]) {
                    Ok(()) => println!(
                        "{} pending ({})",
                        attachments.pending().len(),
                        format_file_size(attachments.total_size())
                    ),
                    Err(e) => eprintln!("! {}", e),
                },
                Err(e) => eprintln!("! {}", e),
            }
        }
        "attachments" => {
            for att in attachments.pending() {
                println!("{} ({}, {})", att.name, att.mime_type, format_file_size(att.size));
            }
        }
        "clear-attachments" => attachments.clear(),
        "regen" => {
            session
                .regenerate(|token| {
                    print!("{}", token);
                    let _ = std::io::stdout().flush();
                })
                .await;
            println!();
            if let Some(error) = session.last_error() {
                eprintln!("! {}", error);
                session.dismiss_error();
            }
        }
        "edit" => {
            let (index, text) = match rest.split_once(' ') {
                Some((index, text)) => (index, text.trim()),
                None => {
                    eprintln!("! Usage: /edit <message#> <new content>");
                    return true;
                }
            };
            match message_id_at(session, index) {
                Some(id) => session.edit_message(&id, text),
                None => eprintln!("! No such message: {}", index),
            }
        }
        "del" => match message_id_at(session, rest) {
            Some(id) => session.delete_message(&id),
            None => eprintln!("! No such message: {}", rest),
        },
        "messages" => {
            if let Some(conv) = session.store().current() {
                for (i, msg) in conv.messages.iter().enumerate() {
                    println!("{:>2}. [{}] {}", i + 1, msg.role.as_str(), msg.content);
                }
            }
        }
        "summarize" => {
            session.summarize().await;
            if let Some(error) = session.last_error() {
                eprintln!("! {}", error);
                session.dismiss_error();
            } else if let Some(conv) = session.store().current() {
                if let Some(last) = conv.messages.last() {
                    println!("{}", last.content);
                }
            }
        }
        "translate" => {
            let (index, language) = match rest.split_once(' ') {
                Some((index, language)) => (index, language.trim()),
                None => {
                    eprintln!("! Usage: /translate <message#> <language>");
                    return true;
                }
            };
            match message_id_at(session, index) {
                Some(id) => {
                    session.translate_message(&id, language).await;
                    if let Some(error) = session.last_error() {
                        eprintln!("! {}", error);
                        session.dismiss_error();
                    } else if let Some(conv) = session.store().current() {
                        if let Some(last) = conv.messages.last() {
                            println!("{}", last.content);
                        }
                    }
                }
                None => eprintln!("! No such message: {}", index),
            }
        }
        "temp" => match rest.parse::<f32>() {
            Ok(temperature) => session.update_settings(SettingsUpdate {
                temperature: Some(temperature),
                ..Default::default()
            }),
            Err(_) => eprintln!("! Usage: /temp <float>"),
        },
        "prompt" => session.update_settings(SettingsUpdate {
            system_prompt: Some(rest.to_string()),
            ..Default::default()
        }),
        other => eprintln!("! Unknown command: /{} (try /help)", other),
    }

    true
}

fn conversation_id_at(session: &ChatSession, arg: &str) -> Option<String> {
    let index: usize = arg.parse().ok()?;
    session
        .store()
        .conversations()
        .get(index.checked_sub(1)?)
        .map(|c| c.id.clone())
}

fn message_id_at(session: &ChatSession, arg: &str) -> Option<String> {
    let index: usize = arg.parse().ok()?;
    session
        .store()
        .current()?
        .messages
        .get(index.checked_sub(1)?)
        .map(|m| m.id.clone())
}

fn print_help() {
    println!(
        "\
Conversations:
  /new [title]      start a conversation        /list             list conversations
  /open <n>         switch by number            /delete [n]       delete current (or n)
  /rename <title>   retitle current             /pin              toggle pin
  /dup              duplicate current           /folder [name]    tag (or untag) current
  /clear            delete everything
  /export <fmt>     write <title>.<json|md|txt> /import <file>    import an export
Messages:
  <text>            send a message              /regen            regenerate last reply
  /messages         list messages               /edit <n> <text>  edit and drop later turns
  /del <n>          delete one message          /search <query>   find in conversation
  /summarize        append a summary            /translate <n> <lang>
Attachments:
  /attach <file>    queue a file                /attachments      list pending
  /clear-attachments
Settings:
  /key [key|clear]  show, set, or clear API key /models           list available models
  /temp <t>         set temperature             /prompt <text>    set system prompt
  /quit             leave"
    );
}
