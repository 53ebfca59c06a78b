//! Event loop: read events from a line stream, write replies to another.
//!
//! Lifecycle events run one at a time, in input order. Fetch events are
//! handed to the active worker and run concurrently, so their replies may
//! come back out of order; callers correlate them by `id`.

use bloom_client::{Event, EventOutcome, FetchOutcome, Registration};
use bloom_core::Request;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

use crate::error::ServeError;
use crate::protocol::{Inbound, Reply, error_line, reply_line};

const REPLY_BUFFER: usize = 64;

struct EventLoop {
    registration: Registration,
    replies: mpsc::Sender<String>,
    fetches: TaskTracker,
}

impl EventLoop {
    async fn handle_line(&mut self, line: &str) {
        let parsed = self
            .registration
            .config()
            .origin_url()
            .map_err(|e| ServeError::InvalidInput(e.to_string()))
            .and_then(|origin| Inbound::parse(line, &origin));
        let Inbound { id, event } = match parsed {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::warn!(error = %e, "malformed event");
                send(&self.replies, error_line(None, &e)).await;
                return;
            }
        };

        if let Event::Fetch { request } = event {
            self.spawn_fetch(id, request).await;
            return;
        }

        let is_message = matches!(event, Event::Message { .. });
        let line = match self.registration.dispatch(event).await {
            Ok(outcome) => reply_line(id.as_ref(), &to_reply(outcome, is_message)),
            Err(e) => Err(ServeError::from(e)),
        };
        let line = line.unwrap_or_else(|e| error_line(id.as_ref(), &e));
        send(&self.replies, line).await;
    }

    async fn spawn_fetch(&self, id: Option<Value>, request: Request) {
        let Some(worker) = self.registration.controller() else {
            let reply = Reply::from(FetchOutcome::Passthrough);
            let line = reply_line(id.as_ref(), &reply).unwrap_or_else(|e| error_line(id.as_ref(), &e));
            send(&self.replies, line).await;
            return;
        };

        let replies = self.replies.clone();
        self.fetches.spawn(async move {
            let reply = Reply::from(worker.handle_fetch(&request).await);
            let line = reply_line(id.as_ref(), &reply).unwrap_or_else(|e| error_line(id.as_ref(), &e));
            send(&replies, line).await;
        });
    }

    /// Wait for in-flight fetches and the cache writes they started,
    /// including those of workers replaced in the meantime.
    async fn drain(self) {
        self.fetches.close();
        self.fetches.wait().await;
        self.registration.writes().settle().await;
    }
}

fn to_reply(outcome: EventOutcome, is_message: bool) -> Reply {
    match outcome {
        EventOutcome::Installed(report) => Reply::Install { report },
        EventOutcome::Updated(report) => Reply::Update { report },
        EventOutcome::Activated(activated) if is_message => Reply::Message { handled: true, activated },
        EventOutcome::Activated(activated) => Reply::Activate { activated },
        EventOutcome::Fetched(outcome) => Reply::from(outcome),
        EventOutcome::Ignored => Reply::Message { handled: false, activated: None },
        EventOutcome::ClientOpened(client) => Reply::OpenClient { client },
        EventOutcome::ClientClosed(activated) => Reply::CloseClient { activated },
        EventOutcome::Status(status) => Reply::Status { status },
    }
}

async fn send(replies: &mpsc::Sender<String>, line: String) {
    if replies.send(line).await.is_err() {
        tracing::debug!("reply dropped, output closed");
    }
}

/// Serve events from `input` until it ends, then return `output`.
pub async fn run<R, W>(registration: Registration, input: R, output: W) -> anyhow::Result<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<String>(REPLY_BUFFER);
    let writer = tokio::spawn(async move {
        let mut output = output;
        while let Some(line) = rx.recv().await {
            output.write_all(line.as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }
        Ok::<_, std::io::Error>(output)
    });

    let mut events = EventLoop { registration, replies: tx, fetches: TaskTracker::new() };
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        events.handle_line(line).await;
    }

    tracing::info!("input closed, draining");
    events.drain().await;

    Ok(writer.await??)
}
