//! Console front end for the session core.
//!
//! Run with: cargo run -p clisiana-console [-- --json]
//!
//! No HTTP transport ships with the core, so this replays a short scripted
//! conversation through a real supervisor and prints what a terminal client
//! would show. Press Ctrl-C to stop early.

mod logging;

use std::sync::Arc;

use anyhow::Context as _;
use clisiana_core::{
    ClientContext, Event, Message, NormalizedOutput, Notification, Notifier, NotifyError,
    OutgoingMessage, Recipient, User, notification_for,
};
use clisiana_session::{SessionConfig, SessionManager, ping, send_outgoing, source::ScriptedSource};
use futures::StreamExt;

/// Writes desktop notifications to the log instead of a notification daemon.
struct LogNotifier;

impl Notifier for LogNotifier {
    fn push(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(title = %notification.title, "Notification");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let json = std::env::args().any(|arg| arg == "--json");

    let ctx = Arc::new(ClientContext::from_env().context("Invalid client configuration")?);
    tracing::info!(?ctx, "Loaded client configuration");

    let source = Arc::new(script());
    let (manager, rx) = SessionManager::new(source.clone(), SessionConfig::default());
    let rx = rx.with_notifier(Arc::new(LogNotifier));

    let printer = tokio::spawn(async move {
        let mut outputs = rx.into_stream();
        while let Some(output) = outputs.next().await {
            if json {
                match serde_json::to_string(&output) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::error!("Cannot encode output: {e}"),
                }
            } else {
                println!("{}", render(&output));
            }
        }
    });

    ping(source.as_ref(), &ctx, &manager.output()).await?;

    let handle = manager.start(Arc::clone(&ctx))?;

    let reply = OutgoingMessage::Stream {
        stream: "general".into(),
        topic: "greetings".into(),
        content: "hello from the console".into(),
    };
    // Failures are already reported on the output channel.
    let _ = send_outgoing(source.as_ref(), &ctx, &manager.output(), &reply).await;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Cannot listen for Ctrl-C")?,
        () = source.wait_for_fetches(4) => {}
    }

    handle.stop().await;
    tracing::info!(state = ?handle.state(), "Session stopped");

    drop(handle);
    drop(manager);
    printer.await.context("Printer task failed")?;
    Ok(())
}

fn render(output: &NormalizedOutput) -> String {
    match output {
        NormalizedOutput::IncomingMessage(message) => {
            let Notification { title, content, .. } = notification_for(message);
            format!("[{title}] {content}")
        }
        NormalizedOutput::StatusNote(text) => format!("-- {text}"),
        NormalizedOutput::Failure(text) => format!("!! {text}"),
    }
}

/// An events reply as the server sends it.
const CAPTURED_EVENTS: &str = r#"{
    "result": "success",
    "msg": "",
    "events": [
        {"id": 4, "type": "message", "message": {
            "id": 103,
            "type": "stream",
            "display_recipient": "general",
            "subject": "greetings",
            "sender_full_name": "Cassio",
            "sender_email": "cassio@example.com",
            "content": "Good morrow.",
            "timestamp": 1700000120
        }}
    ]
}"#;

fn script() -> ScriptedSource {
    let stream = Message {
        id: 101,
        sender_name: "Emilia".into(),
        sender_email: "emilia@example.com".into(),
        recipient: Recipient::Stream {
            stream: "general".into(),
            topic: "greetings".into(),
        },
        content: "Is anybody there?".into(),
        timestamp: 1_700_000_000,
    };
    let private = Message {
        id: 102,
        sender_name: "Roderigo".into(),
        sender_email: "roderigo@example.com".into(),
        recipient: Recipient::Private {
            users: vec![User {
                id: 7,
                full_name: "Roderigo".into(),
                email: "roderigo@example.com".into(),
                short_name: "roderigo".into(),
            }],
        },
        content: "Put money in thy purse.".into(),
        timestamp: 1_700_000_060,
    };

    ScriptedSource::new()
        .with_registration_json(
            r#"{"result":"success","msg":"","queue_id":"demo-queue","last_event_id":-1}"#,
        )
        .with_batch(Ok(vec![Event::message(0, stream), Event::heartbeat(1)]))
        .with_batch(Ok(vec![
            Event::unsupported(2, "typing"),
            Event::message(3, private),
        ]))
        .with_batch_json(CAPTURED_EVENTS)
        .with_send_json(r#"{"result":"success","msg":"","id":104}"#)
}
