//! Chooses between a streaming and a blocking call for one chat turn.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::conversation::SharedConversation;
use super::stream::delta_stream;
use super::{ChatRequest, ChatTransport, FallbackResponse, StreamReply};
use crate::error::ChatError;

/// Why a streaming turn ended up on the blocking path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// The backend answered without a readable stream
    NoStream,
    /// The stream broke off before it finished
    StreamFailed,
}

/// How a turn was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Every delta came through the stream
    Streamed,
    /// Streaming was disabled and the blocking call answered
    Blocking,
    /// Streaming was requested but the backend sent the whole reply in one body
    WholeReply,
    /// Streaming was requested but the blocking call answered
    FellBack(FallbackReason),
    /// The caller cancelled the turn before it finished
    Cancelled,
}

/// A change applied to the target message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyUpdate<'a> {
    /// Text appended from the stream
    Append(&'a str),
    /// The whole content, set from a complete reply. Replaces anything
    /// appended earlier in the turn.
    Replace(&'a str),
}

impl<'a> ReplyUpdate<'a> {
    pub fn text(&self) -> &'a str {
        match *self {
            ReplyUpdate::Append(text) | ReplyUpdate::Replace(text) => text,
        }
    }
}

/// Runs one chat turn and applies the reply to the message `target`.
///
/// Deltas are appended in arrival order; `on_update` sees each one after it
/// has been applied. A target that no longer exists turns every delta into a
/// no-op. Errors opening the stream or from the blocking call end the turn,
/// leaving the target as it is. A stream that fails midway is abandoned and
/// the blocking reply replaces whatever partial content it produced.
pub async fn run_turn<F>(
    transport: &dyn ChatTransport,
    conversation: &SharedConversation,
    target: &str,
    request: &ChatRequest,
    streaming: bool,
    cancel: &CancellationToken,
    mut on_update: F,
) -> Result<TurnOutcome, ChatError>
where
    F: FnMut(ReplyUpdate<'_>),
{
    if cancel.is_cancelled() {
        return Ok(TurnOutcome::Cancelled);
    }

    if !streaming {
        let answered =
            complete_blocking(transport, conversation, target, request, cancel, &mut on_update)
                .await?;
        return Ok(if answered {
            TurnOutcome::Blocking
        } else {
            TurnOutcome::Cancelled
        });
    }

    let stream_request = request.with_stream(true);
    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(TurnOutcome::Cancelled),
        opened = transport.open_stream(&stream_request) => opened?,
    };

    let body = match opened {
        StreamReply::Stream(body) => body,
        StreamReply::Whole(reply) => {
            log::debug!("stream request for message {target} answered with a whole reply");
            apply_whole(conversation, target, &reply, &mut on_update).await;
            return Ok(TurnOutcome::WholeReply);
        }
        StreamReply::NoBody => {
            log::debug!("no readable stream for message {target}, using blocking call");
            return fall_back(
                FallbackReason::NoStream,
                transport,
                conversation,
                target,
                request,
                cancel,
                &mut on_update,
            )
            .await;
        }
    };

    let mut deltas = delta_stream(body);
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::debug!("turn for message {target} cancelled, dropping stream");
                return Ok(TurnOutcome::Cancelled);
            }
            next = deltas.next() => next,
        };

        match next {
            None => return Ok(TurnOutcome::Streamed),
            Some(Ok(delta)) => {
                if conversation.lock().await.append(target, &delta) {
                    on_update(ReplyUpdate::Append(&delta));
                } else {
                    log::trace!("message {target} is gone, dropping delta");
                }
            }
            Some(Err(err)) => {
                log::warn!("chat stream for message {target} failed: {err}; retrying without streaming");
                drop(deltas);
                return fall_back(
                    FallbackReason::StreamFailed,
                    transport,
                    conversation,
                    target,
                    request,
                    cancel,
                    &mut on_update,
                )
                .await;
            }
        }
    }
}

async fn fall_back<F>(
    reason: FallbackReason,
    transport: &dyn ChatTransport,
    conversation: &SharedConversation,
    target: &str,
    request: &ChatRequest,
    cancel: &CancellationToken,
    on_update: &mut F,
) -> Result<TurnOutcome, ChatError>
where
    F: FnMut(ReplyUpdate<'_>),
{
    let answered =
        complete_blocking(transport, conversation, target, request, cancel, on_update).await?;
    Ok(if answered {
        TurnOutcome::FellBack(reason)
    } else {
        TurnOutcome::Cancelled
    })
}

/// Returns `Ok(false)` when cancelled before the reply arrived.
async fn complete_blocking<F>(
    transport: &dyn ChatTransport,
    conversation: &SharedConversation,
    target: &str,
    request: &ChatRequest,
    cancel: &CancellationToken,
    on_update: &mut F,
) -> Result<bool, ChatError>
where
    F: FnMut(ReplyUpdate<'_>),
{
    let blocking_request = request.with_stream(false);
    let reply = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(false),
        reply = transport.complete(&blocking_request) => reply?,
    };

    apply_whole(conversation, target, &reply, on_update).await;
    Ok(true)
}

async fn apply_whole<F>(
    conversation: &SharedConversation,
    target: &str,
    reply: &FallbackResponse,
    on_update: &mut F,
) where
    F: FnMut(ReplyUpdate<'_>),
{
    let applied = conversation
        .lock()
        .await
        .replace_content(target, &reply.response);
    if applied {
        on_update(ReplyUpdate::Replace(&reply.response));
    } else {
        log::trace!("message {target} is gone, dropping whole reply");
    }
}
