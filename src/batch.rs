//! Batch driver: repeated single-question generation for one (subject, topic).
//!
//! Per item: prompt -> completion (bounded by a timeout) -> parse -> append.
//! Completion and parse failures are logged and counted; only store errors
//! abort the run. Every success is on disk before the next request goes out,
//! so an interrupted run loses at most the in-flight item and a re-run resumes
//! from the persisted count.

use std::collections::VecDeque;
use std::fmt;

use rand::Rng;
use tracing::{debug, info, instrument, warn};

use crate::completion::CompletionService;
use crate::config::GeneratorConfig;
use crate::distribution::DistributionPolicy;
use crate::domain::{Difficulty, QuestionRequest, QuestionType, Subject};
use crate::error::{CompletionError, StoreError};
use crate::parser::{parse_response, IdAllocator};
use crate::prompt::build_prompt;
use crate::store::QuestionStore;
use crate::util::trunc_for_log;

/// What one invocation of the driver is asked to do.
#[derive(Clone, Debug)]
pub struct BatchJob {
  pub subject: Subject,
  pub topic: String,
  pub target: usize,
  /// Upper bound on records produced by this run; `None` means "up to target".
  pub batch_size: Option<usize>,
  pub policy: DistributionPolicy,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchResult {
  pub needed: usize,
  pub generated: usize,
  pub failed: usize,
  pub attempts: usize,
}

impl BatchResult {
  pub fn success_rate(&self) -> f64 {
    if self.attempts == 0 { 0.0 } else { self.generated as f64 * 100.0 / self.attempts as f64 }
  }
}

impl fmt::Display for BatchResult {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "generated {}, failed {}, attempts {} ({:.1}% success)",
      self.generated,
      self.failed,
      self.attempts,
      self.success_rate()
    )
  }
}

/// One generation attempt. `Ok(Some(id))` on success, `Ok(None)` when the
/// attempt produced nothing usable.
#[instrument(level = "debug", skip_all, fields(subject = %request.subject, topic = %request.topic, difficulty = %request.difficulty, kind = %request.question_type))]
pub async fn generate_question(
  store: &mut QuestionStore,
  completion: &dyn CompletionService,
  config: &GeneratorConfig,
  request: &QuestionRequest,
) -> Result<Option<String>, StoreError> {
  let prompt = build_prompt(&config.prompts, request);
  let timeout = config.completion.timeout();

  let raw = match tokio::time::timeout(timeout, completion.complete(&prompt, config.completion.max_tokens)).await {
    Ok(Ok(text)) => text,
    Ok(Err(e)) => {
      warn!(target: "batch", error = %e, "Completion failed");
      return Ok(None);
    }
    Err(_) => {
      warn!(target: "batch", error = %CompletionError::Timeout(timeout), "Completion failed");
      return Ok(None);
    }
  };

  let record = match parse_response(&raw, request, &*store) {
    Ok(r) => r,
    Err(failure) => {
      warn!(target: "batch", error = %failure.error, raw = %trunc_for_log(&failure.raw, 500), "Unusable completion");
      return Ok(None);
    }
  };

  let id = record.id.clone();
  store.append(request.subject, record)?;
  info!(target: "batch", %id, "Question stored");
  Ok(Some(id))
}

/// Generate until the topic target (or the batch size) is reached.
#[instrument(level = "info", skip(store, completion, config, job, rng), fields(subject = %job.subject, topic = %job.topic, target = job.target, strategy = %job.policy.strategy))]
pub async fn run_batch<R: Rng + ?Sized>(
  store: &mut QuestionStore,
  completion: &dyn CompletionService,
  config: &GeneratorConfig,
  job: &BatchJob,
  rng: &mut R,
) -> Result<BatchResult, StoreError> {
  // Progress is read from the file, the one source every process shares.
  let current = QuestionStore::load(store.path())?.metadata.topic_count(job.subject, &job.topic);
  let in_memory = store.count_for(job.subject, &job.topic);
  if current != in_memory {
    warn!(target: "batch", on_disk = current, in_memory, "Database changed since it was opened; another writer is active");
  }
  let needed = job.target.saturating_sub(current);
  if needed == 0 {
    info!(target: "batch", current, "Target already met; nothing to do");
    return Ok(BatchResult::default());
  }

  let to_generate = job.batch_size.map_or(needed, |n| n.min(needed));
  let max_attempts = config.batch.max_attempts_factor.map_or(to_generate, |f| to_generate * f.max(1));
  let retry_failed = config.batch.max_attempts_factor.is_some();
  info!(target: "batch", current, needed, to_generate, max_attempts, provider = %completion.describe(), "Starting batch");

  let mut pending: VecDeque<(Difficulty, QuestionType)> = job.policy.plan(to_generate, rng).into();
  let mut result = BatchResult { needed, ..BatchResult::default() };
  let group_size = config.batch.group_size.max(1);

  while result.attempts < max_attempts {
    let Some((difficulty, question_type)) = pending.pop_front() else { break };
    if result.attempts > 0 {
      if result.attempts % group_size == 0 {
        log_group_progress(store, job, &result)?;
        tokio::time::sleep(config.batch.group_delay()).await;
      } else {
        tokio::time::sleep(config.batch.item_delay()).await;
      }
    }

    result.attempts += 1;
    let request = QuestionRequest::new(job.subject, &job.topic, difficulty, question_type);
    debug!(target: "batch", attempt = result.attempts, %difficulty, kind = %question_type, "Requesting question");

    match generate_question(store, completion, config, &request).await? {
      Some(_) => result.generated += 1,
      None => {
        result.failed += 1;
        if retry_failed {
          pending.push_back((difficulty, question_type));
        }
      }
    }
  }

  if result.generated < to_generate && retry_failed {
    warn!(target: "batch", generated = result.generated, wanted = to_generate, "Attempt cap reached before the batch was filled");
  }
  info!(
    target: "batch",
    generated = result.generated,
    failed = result.failed,
    attempts = result.attempts,
    success_pct = %format_args!("{:.1}", result.success_rate()),
    next_id = %store.next_id(job.subject, &job.topic),
    "Batch finished"
  );
  Ok(result)
}

/// Re-read the file between sub-batches; a different count than ours means
/// someone else is writing the same database.
fn log_group_progress(store: &QuestionStore, job: &BatchJob, result: &BatchResult) -> Result<(), StoreError> {
  let on_disk = QuestionStore::load(store.path())?.metadata.topic_count(job.subject, &job.topic);
  let in_memory = store.count_for(job.subject, &job.topic);
  if on_disk != in_memory {
    warn!(target: "batch", on_disk, in_memory, "Database changed underneath this run; another writer is active");
  }
  info!(target: "batch", progress = %format_args!("{}/{}", on_disk, job.target), generated = result.generated, failed = result.failed, "Sub-batch complete");
  Ok(())
}
