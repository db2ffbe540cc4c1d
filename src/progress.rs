//! Progress reporting for long-running scoring batches.
//!
//! The batch runs on its own task and reports through an unbounded channel.
//! Every run ends with exactly one terminal event; a stream that closes
//! without one surfaces as [`Error::ProgressChannelClosed`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::backend::ApiCredential;
use crate::error::{Error, Result};
use crate::pipeline::ScoringPipeline;
use crate::types::{Persona, ScoringReport};

/// Counters for a batch in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub completed: usize,
    pub total: usize,
    pub batch_completed: usize,
    pub batch_total: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Progress(ProgressUpdate),
    Completed(ScoringReport),
    Failed(String),
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::Progress(_))
    }
}

/// Create a connected sender/stream pair.
pub fn channel() -> (ProgressSender, ProgressStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressSender { tx }, ProgressStream { rx })
}

// ─────────────────────────────────────────────────────────────────
// Sender
// ─────────────────────────────────────────────────────────────────

pub struct ProgressSender {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressSender {
    pub fn progress(&self, update: ProgressUpdate) {
        // A dropped stream means nobody is watching; the batch carries on.
        let _ = self.tx.send(ProgressEvent::Progress(update));
    }

    /// Send the terminal event. Consumes the sender.
    pub fn finish(self, result: Result<ScoringReport>) {
        let event = match result {
            Ok(report) => ProgressEvent::Completed(report),
            Err(e) => ProgressEvent::Failed(e.to_string()),
        };
        if self.tx.send(event).is_err() {
            debug!("Progress stream dropped before the terminal event");
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Stream
// ─────────────────────────────────────────────────────────────────

pub struct ProgressStream {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressStream {
    /// Next event, or None once the sender is gone.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    /// Drive the stream to its terminal event.
    pub async fn wait<F>(mut self, mut on_progress: F) -> Result<ScoringReport>
    where
        F: FnMut(ProgressUpdate),
    {
        loop {
            match self.rx.recv().await {
                Some(ProgressEvent::Progress(update)) => on_progress(update),
                Some(ProgressEvent::Completed(report)) => return Ok(report),
                Some(ProgressEvent::Failed(message)) => {
                    return Err(Error::Internal(format!("scoring failed: {}", message)))
                }
                None => return Err(Error::ProgressChannelClosed),
            }
        }
    }
}

/// Run a scoring batch on its own task and return its progress stream.
pub fn spawn_scoring(
    pipeline: Arc<ScoringPipeline>,
    personas: Vec<Persona>,
    copy: String,
    credential: ApiCredential,
) -> ProgressStream {
    let (tx, stream) = channel();

    tokio::spawn(async move {
        let result = pipeline.run(&personas, &copy, &credential, Some(&tx)).await;
        if let Err(ref e) = result {
            error!(error = %e, "Scoring batch failed");
        }
        tx.finish(result);
    });

    stream
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockClient, MockReply};
    use crate::config::ScoringSettings;
    use crate::error::ErrorCode;
    use crate::resilience::{ResilientCaller, RetryPolicy};
    use crate::types::Feedback;
    use serde_json::json;

    fn update(completed: usize) -> ProgressUpdate {
        ProgressUpdate {
            completed,
            total: 2,
            batch_completed: 0,
            batch_total: 1,
        }
    }

    #[tokio::test]
    async fn test_wait_returns_report() {
        let (tx, stream) = channel();
        tx.progress(update(1));
        tx.progress(update(2));
        let report = ScoringReport::new(vec![Feedback::failed("csv_1", "x")]);
        tx.finish(Ok(report.clone()));

        let mut seen = Vec::new();
        let result = stream.wait(|u| seen.push(u.completed)).await.unwrap();

        assert_eq!(result, report);
        assert_eq!(seen, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_wait_reports_failure() {
        let (tx, stream) = channel();
        tx.finish(Err(Error::EmptyInput("marketing copy is empty".into())));

        let err = stream.wait(|_| {}).await.unwrap_err();
        assert!(err.to_string().contains("marketing copy is empty"));
    }

    #[tokio::test]
    async fn test_closed_without_terminal_event() {
        let (tx, stream) = channel();
        tx.progress(update(1));
        drop(tx);

        let err = stream.wait(|_| {}).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ProgressChannelClosed);
    }

    #[tokio::test]
    async fn test_recv_sees_terminal_event() {
        let (tx, mut stream) = channel();
        tx.finish(Ok(ScoringReport::new(Vec::new())));

        let event = stream.recv().await.unwrap();
        assert!(event.is_terminal());
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_scoring_end_to_end() {
        let mock = Arc::new(MockClient::scripted([
            MockReply::text(r#"{"score": 9, "reasons_to_buy": ["yes"]}"#),
            MockReply::fatal("403 Forbidden"),
        ]));
        let caller = ResilientCaller::new(mock, RetryPolicy::default());
        let pipeline = Arc::new(ScoringPipeline::new(caller, &ScoringSettings::default()));
        let personas: Vec<Persona> = vec![
            serde_json::from_value(json!({"persona_id": "md_1", "description": "a"})).unwrap(),
            serde_json::from_value(json!({"persona_id": "md_2", "description": "b"})).unwrap(),
        ];

        let stream = spawn_scoring(pipeline, personas, "copy".into(), ApiCredential::anonymous());
        let mut updates = 0;
        let report = stream.wait(|_| updates += 1).await.unwrap();

        assert_eq!(updates, 2);
        assert_eq!(report.feedback[0].score, 9.0);
        assert!(report.feedback[1].is_sentinel());
        assert_eq!(report.avg_score, 9.0);
    }
}
