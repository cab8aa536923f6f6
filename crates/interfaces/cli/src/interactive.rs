use std::io::{self, Write};

use anyhow::Result;
use hostagent_runtime::Agent;

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Input<'a> {
    Empty,
    Exit,
    Clear,
    Help,
    Unknown(&'a str),
    Message(&'a str),
}

pub(crate) fn classify(line: &str) -> Input<'_> {
    let line = line.trim();
    match line {
        "" => Input::Empty,
        "/exit" | "/quit" => Input::Exit,
        "/clear" => Input::Clear,
        "/help" => Input::Help,
        cmd if cmd.starts_with('/') => Input::Unknown(cmd),
        text => Input::Message(text),
    }
}

fn print_help() {
    println!("/clear  -- forget the conversation and remembered confirmations");
    println!("/help");
    println!("/exit");
}

pub(crate) async fn run_chat_session(mut agent: Agent) -> Result<()> {
    println!("hostagent chat (model: {})", agent.settings().model);
    println!("type a message, or /help for commands");

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        let bytes = stdin.read_line(&mut line)?;
        if bytes == 0 {
            println!("session closed");
            break;
        }

        match classify(&line) {
            Input::Empty => continue,
            Input::Exit => {
                println!("session closed");
                break;
            }
            Input::Clear => {
                agent.clear_history();
                println!("history cleared");
            }
            Input::Help => print_help(),
            Input::Unknown(cmd) => println!("unknown command: {cmd} (try /help)"),
            Input::Message(text) => {
                let answer = agent.process_message(text).await;
                println!("{answer}");
            }
        }
    }
    Ok(())
}
