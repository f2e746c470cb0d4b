//! Question and answer synthesis over the path corpus.
//!
//! Two passes, each one model call per record:
//!
//! 1. a path record becomes a multi-hop question centred on its rare node
//! 2. the path plus that question becomes a step-by-step reasoning answer
//!
//! Calls run on a rayon pool of `llm.max_concurrent` threads. Output order
//! always matches input order, and a failed call becomes an `error` field on
//! its record instead of aborting the pass.

use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::corpus::PathRecord;
use crate::error::{ConfigError, RarepathResult};
use crate::llm::ChatModel;

/// A generated question, or the reason there is none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub original_record: PathRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A generated answer, or the reason there is none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome counts for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub succeeded: usize,
    pub failed: usize,
    /// Inputs without a question, not sent to the model.
    pub skipped: usize,
}

pub fn question_prompt(domain: &str, record: &PathRecord) -> String {
    let record_json =
        serde_json::to_string_pretty(record).unwrap_or_else(|_| format!("{record:?}"));
    format!(
        "You are a senior expert in {domain}, designing a challenging multi-hop reasoning \
question. Using the knowledge graph information below, write one question centred on the \
\"rare_node\" that needs at least two reasoning steps to answer.

Knowledge graph information:
{record_json}

Requirements:
1. Intermediate nodes may be referred to through their attributes instead of their names, \
to make the question harder.
2. Answering must take at least two distinct reasoning steps.
3. Use correct professional {domain} language; the question must have exactly one answer.
4. The question must be about the \"rare_node\".
5. Do not use phrases such as \"according to the provided information\" or \"based on the \
knowledge graph\"; state the facts themselves instead.
6. Keep the question general: its answer must not be a specific private person.

Output only the question itself, with no explanation and no answer."
    )
}

pub fn answer_prompt(domain: &str, record: &PathRecord, question: &str) -> String {
    let record_json =
        serde_json::to_string_pretty(record).unwrap_or_else(|_| format!("{record:?}"));
    format!(
        "You are a senior expert in {domain}, answering a difficult multi-hop reasoning question \
built from a chain of facts.

Chain of facts:
{record_json}

Question:
{question}

Instructions:
1. The chain contains the answer, but you must lay out the reasoning that leads to it.
2. Make the reasoning detailed and logically sound.
3. Never mention a knowledge graph, a chain of facts, or provided information.
4. Present everything as your own expertise, e.g. \"from what I know\" or \"recalling my \
knowledge\"."
    )
}

/// Drives question and answer passes against one model.
pub struct QaGenerator<'a, M> {
    model: &'a M,
    config: &'a LlmConfig,
}

impl<'a, M: ChatModel> QaGenerator<'a, M> {
    pub fn new(model: &'a M, config: &'a LlmConfig) -> Self {
        Self { model, config }
    }

    fn pool(&self) -> RarepathResult<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.max_concurrent)
            .build()
            .map_err(|e| {
                ConfigError::Invalid {
                    field: "llm.max_concurrent".into(),
                    message: e.to_string(),
                }
                .into()
            })
    }

    /// Generate one question per path record.
    pub fn questions(
        &self,
        records: Vec<PathRecord>,
    ) -> RarepathResult<(Vec<QuestionRecord>, PassStats)> {
        use rayon::prelude::*;

        tracing::info!(records = records.len(), "generating questions");
        let out: Vec<QuestionRecord> = self.pool()?.install(|| {
            records
                .into_par_iter()
                .map(|record| {
                    let prompt = question_prompt(&self.config.domain, &record);
                    match self.model.complete(&prompt, self.config.question_temperature) {
                        Ok(question) => QuestionRecord {
                            original_record: record,
                            generated_question: Some(question),
                            error: None,
                        },
                        Err(e) => {
                            tracing::warn!(
                                rare_node = %record.rare_node.element_id,
                                error = %e,
                                "question generation failed"
                            );
                            QuestionRecord {
                                original_record: record,
                                generated_question: None,
                                error: Some(e.to_string()),
                            }
                        }
                    }
                })
                .collect()
        });

        let failed = out.iter().filter(|q| q.error.is_some()).count();
        let stats = PassStats {
            succeeded: out.len() - failed,
            failed,
            skipped: 0,
        };
        Ok((out, stats))
    }

    /// Generate one answer per question record that has a question.
    pub fn answers(
        &self,
        records: Vec<QuestionRecord>,
    ) -> RarepathResult<(Vec<AnswerRecord>, PassStats)> {
        use rayon::prelude::*;

        let total = records.len();
        let answerable: Vec<(PathRecord, String)> = records
            .into_iter()
            .filter_map(|r| Some((r.original_record, r.generated_question?)))
            .collect();
        let skipped = total - answerable.len();

        tracing::info!(records = answerable.len(), skipped, "generating answers");
        let out: Vec<AnswerRecord> = self.pool()?.install(|| {
            answerable
                .into_par_iter()
                .map(|(record, question)| {
                    let prompt = answer_prompt(&self.config.domain, &record, &question);
                    match self.model.complete(&prompt, self.config.answer_temperature) {
                        Ok(answer) => AnswerRecord {
                            question,
                            answer: Some(answer),
                            error: None,
                        },
                        Err(e) => {
                            tracing::warn!(error = %e, "answer generation failed");
                            AnswerRecord {
                                question,
                                answer: None,
                                error: Some(e.to_string()),
                            }
                        }
                    }
                })
                .collect()
        });

        let failed = out.iter().filter(|a| a.error.is_some()).count();
        let stats = PassStats {
            succeeded: out.len() - failed,
            failed,
            skipped,
        };
        Ok((out, stats))
    }
}
