//! Persona generation from survey or interview documents.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::backend::ApiCredential;
use crate::config::GenerationSettings;
use crate::error::{Error, Result};
use crate::parser::parse_personas;
use crate::persona::{IdentityNormalizer, PersistedPaths, PersonaAggregator, PersonaStore, TextNormalizer};
use crate::prompt::generation_prompt;
use crate::resilience::ResilientCaller;
use crate::text::{check_token_budget, estimate_tokens, Chunker};
use crate::types::{ConversationEntry, Namespace, Persona, BATCH_INFO_KEY};

use super::Batch;

/// What a generation run produced.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    /// Every recovered record was discarded; nothing was written
    Empty,
    Persisted {
        personas: Vec<Persona>,
        paths: PersistedPaths,
    },
}

impl GenerationOutcome {
    pub fn personas(&self) -> &[Persona] {
        match self {
            GenerationOutcome::Empty => &[],
            GenerationOutcome::Persisted { personas, .. } => personas,
        }
    }
}

/// Summary of one generation run.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationReport {
    pub namespace: Namespace,
    pub outcome: GenerationOutcome,
    pub chunks_total: usize,
    /// 1-based indices of chunks whose call or parse failed
    pub chunks_failed: Vec<usize>,
    /// JSON blocks dropped by the parser
    pub dropped_blocks: usize,
    /// Raw records discarded by the aggregator
    pub discarded_records: usize,
    pub conversation: Vec<ConversationEntry>,
}

pub struct GenerationPipeline {
    caller: ResilientCaller,
    settings: GenerationSettings,
    store: PersonaStore,
    normalizer: Arc<dyn TextNormalizer>,
}

impl GenerationPipeline {
    pub fn new(caller: ResilientCaller, settings: GenerationSettings, store: PersonaStore) -> Self {
        Self {
            caller,
            settings,
            store,
            normalizer: Arc::new(IdentityNormalizer),
        }
    }

    pub fn with_normalizer(mut self, normalizer: Arc<dyn TextNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Split `text` into the chunks that will each get one model call.
    pub fn plan<'a>(&self, text: &'a str) -> Result<Vec<&'a str>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let estimated = estimate_tokens(text);
        if estimated > self.settings.batching_threshold_tokens {
            let chunks: Vec<&str> = Chunker::new(self.settings.chunk_size).chunks(text).collect();
            info!(
                estimated_tokens = estimated,
                chunks = chunks.len(),
                "Document exceeds batching threshold, chunking"
            );
            Ok(chunks)
        } else {
            check_token_budget(text, self.settings.max_estimated_tokens)?;
            Ok(vec![text])
        }
    }

    /// Generate personas for `namespace` from `text` and persist them.
    pub async fn run(
        &self,
        namespace: Namespace,
        text: &str,
        credential: &ApiCredential,
    ) -> Result<GenerationReport> {
        let chunks = self.plan(text)?;
        if chunks.is_empty() {
            return Err(Error::EmptyInput(format!("{} document has no content", namespace)));
        }

        let total = chunks.len();
        let delay = self.settings.chunk_delay(namespace);
        let mut raw: Vec<Value> = Vec::new();
        let mut conversation = Vec::with_capacity(total * 2);
        let mut chunks_failed = Vec::new();
        let mut dropped_blocks = 0;

        for (i, chunk) in chunks.iter().enumerate() {
            let mut batch = Batch::new(i + 1, total);
            info!(
                namespace = %namespace,
                chunk = batch.index,
                total = batch.total,
                chars = chunk.chars().count(),
                "Processing chunk"
            );

            let prompt = generation_prompt(chunk, namespace.source_kind());
            conversation.push(ConversationEntry::prompt(prompt.as_str()));

            let (result, state) = self.caller.call_traced(credential, &prompt).await;
            batch.retries = state.retries();

            match result.and_then(|completion| {
                conversation.push(ConversationEntry::response(
                    completion.text.as_str(),
                    completion.usage,
                ));
                parse_personas(&completion.text)
            }) {
                Ok(blocks) => {
                    dropped_blocks += blocks.dropped;
                    let count = blocks.values.len();
                    for mut value in blocks.values {
                        if total > 1 {
                            if let Value::Object(ref mut map) = value {
                                map.insert(BATCH_INFO_KEY.to_string(), Value::String(batch.label()));
                            }
                        }
                        raw.push(value);
                    }
                    info!(
                        chunk = batch.index,
                        records = count,
                        dropped_blocks = blocks.dropped,
                        retries = batch.retries,
                        "Chunk complete"
                    );
                }
                Err(e) => {
                    warn!(
                        chunk = batch.index,
                        total = batch.total,
                        retries = batch.retries,
                        error = %e,
                        "Chunk failed, skipping"
                    );
                    chunks_failed.push(batch.index);
                }
            }

            if !batch.is_last() && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        if raw.is_empty() {
            return Err(Error::AllChunksFailed { chunks: total });
        }

        let aggregation =
            PersonaAggregator::new(namespace, self.normalizer.clone()).aggregate(raw);
        let discarded_records = aggregation.discarded;

        let outcome = if aggregation.is_empty() {
            warn!(namespace = %namespace, discarded = discarded_records, "No usable personas");
            GenerationOutcome::Empty
        } else {
            let paths = self
                .store
                .persist(namespace, &aggregation.personas, &conversation)?;
            GenerationOutcome::Persisted {
                personas: aggregation.personas,
                paths,
            }
        };

        info!(
            namespace = %namespace,
            personas = outcome.personas().len(),
            chunks = total,
            failed_chunks = chunks_failed.len(),
            dropped_blocks,
            "Generation finished"
        );

        Ok(GenerationReport {
            namespace,
            outcome,
            chunks_total: total,
            chunks_failed,
            dropped_blocks,
            discarded_records,
            conversation,
        })
    }
}
