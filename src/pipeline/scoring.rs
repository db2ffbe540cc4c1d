//! Marketing-copy scoring against a set of personas.

use std::time::Duration;

use tracing::{info, warn};

use crate::backend::ApiCredential;
use crate::config::ScoringSettings;
use crate::error::{Error, Result};
use crate::parser::parse_feedback;
use crate::progress::{ProgressSender, ProgressUpdate};
use crate::prompt::scoring_prompt;
use crate::resilience::ResilientCaller;
use crate::types::{Feedback, Persona, ScoringReport};

use super::Batch;

pub struct ScoringPipeline {
    caller: ResilientCaller,
    batch_size: usize,
    call_delay: Duration,
    batch_delay: Duration,
}

impl ScoringPipeline {
    pub fn new(caller: ResilientCaller, settings: &ScoringSettings) -> Self {
        Self {
            caller,
            batch_size: settings.batch_size.max(1),
            call_delay: Duration::from_secs(settings.call_delay_secs),
            batch_delay: Duration::from_secs(settings.batch_delay_secs),
        }
    }

    /// Score `copy` against every persona, in order.
    ///
    /// A persona whose call or parse fails gets a sentinel record, so the
    /// report always holds one feedback per persona.
    pub async fn run(
        &self,
        personas: &[Persona],
        copy: &str,
        credential: &ApiCredential,
        progress: Option<&ProgressSender>,
    ) -> Result<ScoringReport> {
        if copy.trim().is_empty() {
            return Err(Error::EmptyInput("marketing copy is empty".to_string()));
        }
        if personas.is_empty() {
            return Err(Error::EmptyInput("no personas selected".to_string()));
        }

        let total = personas.len();
        let batch_total = total.div_ceil(self.batch_size);
        let mut feedback = Vec::with_capacity(total);

        info!(
            personas = total,
            batches = batch_total,
            batch_size = self.batch_size,
            "Scoring marketing copy"
        );

        for (b, group) in personas.chunks(self.batch_size).enumerate() {
            let mut batch = Batch::new(b + 1, batch_total);

            for (j, persona) in group.iter().enumerate() {
                if j > 0 {
                    pause(self.call_delay).await;
                }

                let (record, retries) = self.evaluate(persona, copy, credential).await;
                batch.retries += retries;
                feedback.push(record);

                if let Some(tx) = progress {
                    let batch_done = j + 1 == group.len();
                    tx.progress(ProgressUpdate {
                        completed: feedback.len(),
                        total,
                        batch_completed: b + usize::from(batch_done),
                        batch_total,
                    });
                }
            }

            info!(
                batch = batch.index,
                total = batch.total,
                retries = batch.retries,
                "Scoring batch complete"
            );

            if !batch.is_last() {
                pause(self.batch_delay).await;
            }
        }

        let report = ScoringReport::new(feedback);
        info!(
            avg_score = report.avg_score,
            failed = report.failed_count(),
            "Scoring finished"
        );
        Ok(report)
    }

    async fn evaluate(
        &self,
        persona: &Persona,
        copy: &str,
        credential: &ApiCredential,
    ) -> (Feedback, u32) {
        let persona_id = persona.id().unwrap_or("unknown");
        let prompt = scoring_prompt(persona, copy);

        let (result, state) = self.caller.call_traced(credential, &prompt).await;
        let record = match result.and_then(|c| parse_feedback(&c.text, persona_id)) {
            Ok(record) => {
                info!(persona_id, score = record.score, "Persona scored");
                record
            }
            Err(e) => {
                warn!(persona_id, error = %e, "Persona evaluation failed");
                Feedback::failed(persona_id, e.to_string())
            }
        };
        (record, state.retries())
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
