//! One-shot commands that report through the shared output channel.
//!
//! These run outside the supervisor but write to the same channel, so their
//! notes interleave with incoming messages in arrival order.

use std::sync::Arc;

use clisiana_core::{ClientContext, EventSource, MessageSender, OutgoingMessage, OutputSender};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::SessionError;

/// Validate and send one message, reporting the outcome on `output`.
///
/// Returns the server-assigned message id.
///
/// # Errors
/// Returns error if the message is invalid, the send fails, or the output
/// channel is closed. Invalid and failed sends are also reported as a
/// `Failure` before returning.
pub async fn send_outgoing<M: MessageSender + ?Sized>(
    sender: &M,
    ctx: &ClientContext,
    output: &OutputSender,
    message: &OutgoingMessage,
) -> Result<u64, SessionError> {
    if let Err(e) = message.validate() {
        output.failure(e.to_string()).await?;
        return Err(e.into());
    }

    match sender.send_message(ctx, message).await {
        Ok(id) => {
            info!(id, kind = message.label(), "Message sent");
            output
                .status(format!("{} message sent: got message ID {id}", message.label()))
                .await?;
            Ok(id)
        }
        Err(e) => {
            warn!("Sending message failed: {e}");
            output
                .failure(format!("Sending {} message failed: {e}", message.label().to_lowercase()))
                .await?;
            Err(e.into())
        }
    }
}

/// Send in the background so the caller's input loop is not held up.
pub fn spawn_send<M: MessageSender + ?Sized + 'static>(
    sender: Arc<M>,
    ctx: Arc<ClientContext>,
    output: OutputSender,
    message: OutgoingMessage,
) -> JoinHandle<Result<u64, SessionError>> {
    tokio::spawn(async move { send_outgoing(sender.as_ref(), &ctx, &output, &message).await })
}

/// Check the server is reachable and report the result as a status note.
///
/// # Errors
/// Returns error if the output channel is closed.
pub async fn ping<S: EventSource + ?Sized>(
    source: &S,
    ctx: &ClientContext,
    output: &OutputSender,
) -> Result<(), SessionError> {
    let note = match source.probe(ctx).await {
        Ok(()) => format!("Connection to {} is working properly.", ctx.api_base),
        Err(e) => {
            warn!("Probe failed: {e}");
            format!("Connection to {} failed: {e}.", ctx.endpoint("generate_204"))
        }
    };
    output.status(note).await?;
    Ok(())
}
