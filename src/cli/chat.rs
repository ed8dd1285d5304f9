//! Chat command handlers (interactive + single-message mode).

use std::io::{self, Write};

use anyhow::{Context, Result};

use colloquy::agent::Orchestrator;
use colloquy::config::Config;
use colloquy::session::{Message, Role, ToolCall};

use super::common::{create_orchestrator, read_line};

/// Interactive or single-message chat.
pub(crate) async fn cmd_chat(
    config: &Config,
    session: Option<String>,
    stream: bool,
    message: Option<String>,
) -> Result<()> {
    let orchestrator = create_orchestrator(config, false)?;
    let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    if let Some(msg) = message {
        // Single message mode
        return send(&orchestrator, &session_id, &msg, stream).await;
    }

    // Interactive mode
    println!("Colloquy interactive chat (session {})", session_id);
    println!("Type your message and press Enter. Type 'quit' or 'exit' to stop.");
    println!();

    let mut stdout = io::stdout();
    loop {
        print!("> ");
        stdout.flush()?;

        let Some(input) = read_line()? else {
            println!();
            break;
        };
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            println!("Goodbye!");
            break;
        }

        if let Err(e) = send(&orchestrator, &session_id, &input, stream).await {
            eprintln!("Error: {:#}", e);
        }
        println!();
    }

    Ok(())
}

async fn send(orchestrator: &Orchestrator, session_id: &str, text: &str, stream: bool) -> Result<()> {
    if !stream {
        let reply = orchestrator
            .chat(session_id, text)
            .await
            .with_context(|| "Chat failed")?;
        println!("{}", reply.content);
        print_tool_calls(reply.tool_calls.iter().flatten());
        return Ok(());
    }

    let mut rx = orchestrator
        .chat_stream(session_id, text)
        .await
        .with_context(|| "Chat failed")?;

    let mut content = String::new();
    let mut calls: Vec<ToolCall> = Vec::new();
    let mut stdout = io::stdout();
    while let Some(chunk) = rx.recv().await {
        if chunk.role != Role::Assistant {
            continue;
        }
        print!("{}", chunk.content);
        let _ = stdout.flush();
        content.push_str(&chunk.content);
        calls.extend(chunk.tool_calls.into_iter().flatten());
    }
    println!(); // newline after streaming
    print_tool_calls(calls.iter());

    let reply = if calls.is_empty() {
        Message::assistant(&content)
    } else {
        Message::assistant_with_tools(&content, calls)
    };
    orchestrator
        .append_assistant_message(session_id, reply)
        .await
        .with_context(|| "Failed to record reply")?;
    Ok(())
}

fn print_tool_calls<'a>(calls: impl Iterator<Item = &'a ToolCall>) {
    for call in calls {
        println!("[tool call] {}({})", call.name, call.arguments);
    }
}
