//! Terminal controller.
//!
//! ```text
//! console-controller 192.168.1.20:7777
//! console-controller ws://192.168.1.20:7778/mobile
//! console-controller "https://play.example/join?connect=MTkyLjE2OC4xLjIwOjc3Nzc="
//! ```
//!
//! Each line typed is sent as a `STRING` frame. Lines starting with `/`
//! are commands: `/devices`, `/mouse x y`, `/input STATE`,
//! `/to PLAYER TEXT`, `/forget`, `/reconnect`, `/quit`.

use std::process::ExitCode;

use mobcast::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_logging("info") {
        eprintln!("{e}");
    }

    let Some(target) = std::env::args().nth(1) else {
        eprintln!("usage: console-controller <host:port | ws://host:port/path | deep link>");
        return ExitCode::FAILURE;
    };

    match run(&target).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "controller stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(target: &str) -> Result<(), MobcastError> {
    let mut controller = Controller::builder().build()?;
    controller.subscribe(print_event);

    if target.contains("://") && !target.starts_with("ws://") {
        controller.connect_deep_link(target)?;
    } else {
        controller.connect_str(target)?;
    }

    let mut ticker = Ticker::new(TickConfig::default());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                if !handle_line(&mut controller, line.trim()).await {
                    break;
                }
            }
            tick = ticker.wait_for_tick() => controller.tick(tick.dt).await,
        }
    }

    controller.disconnect();
    Ok(())
}

/// Returns `false` when the user asked to quit.
async fn handle_line(controller: &mut Controller, line: &str) -> bool {
    let mut words = line.splitn(3, ' ');
    match words.next() {
        Some("/quit") => return false,
        Some("/devices") => controller.request_device_list().await,
        Some("/forget") => controller.clear_saved_identity(),
        Some("/reconnect") => {
            controller.disconnect();
            controller.reconnect_last();
        }
        Some("/input") => {
            let state = words.collect::<Vec<_>>().join(" ");
            controller.send_input_state(&state).await;
        }
        Some("/mouse") => {
            let x = words.next().and_then(|w| w.parse().ok());
            let y = words.next().and_then(|w| w.parse().ok());
            match (x, y) {
                (Some(x), Some(y)) => controller.send_mouse_position(x, y).await,
                _ => eprintln!("usage: /mouse x y"),
            }
        }
        Some("/to") => match (words.next(), words.next()) {
            (Some(player), Some(text)) => {
                controller
                    .send_text_to_player(&PlayerId::from(player), text)
                    .await
            }
            _ => eprintln!("usage: /to PLAYER TEXT"),
        },
        Some(cmd) if cmd.starts_with('/') => eprintln!("unknown command {cmd}"),
        Some("") | None => {}
        Some(_) => controller.send_string(line).await,
    }
    true
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::Connected => println!("* connected"),
        SessionEvent::Disconnected(reason) => println!("* disconnected ({reason:?})"),
        SessionEvent::Reconnecting(p) => println!(
            "* connection lost, retrying up to {} times over {:?}",
            p.max_attempts, p.timeout
        ),
        SessionEvent::ReconnectionFailed => println!("* could not reconnect"),
        SessionEvent::StringReceived { text } => println!("< {text}"),
        SessionEvent::ForwardedReceived { sender, text } => println!("< [{sender}] {text}"),
        SessionEvent::ImageReceived { sender, bytes } => match sender {
            Some(sender) => println!("< image from {sender} ({} bytes)", bytes.len()),
            None => println!("< image ({} bytes)", bytes.len()),
        },
        SessionEvent::AvatarReceived { sender, bytes, key } => {
            println!("< avatar {key} for {sender} ({} bytes)", bytes.len())
        }
    }
}
