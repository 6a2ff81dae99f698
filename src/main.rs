//! qbank · MCAT question bank generator
//!
//! - Generates exam questions one at a time through an LLM completion API
//! - Keeps `question-database.json` (records + summary counts) consistent
//! - Merges externally produced batch files and reports progress vs targets
//!
//! Important env variables:
//!   QBANK_CONFIG_PATH  : path to TOML config (provider, pacing, prompts, targets)
//!   QBANK_DATABASE     : database file (overrides config; same as --database)
//!   ANTHROPIC_API_KEY  : required for provider "anthropic" (default)
//!   OPENAI_API_KEY     : required for provider "openai"
//!   OPENAI_BASE_URL    : optional OpenAI-compatible endpoint
//!   LOG_LEVEL          : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT         : "pretty" (default) or "json"

mod batch;
mod catalog;
mod completion;
mod config;
mod distribution;
mod domain;
mod error;
mod merge;
mod monitor;
mod parser;
mod prompt;
mod state;
mod store;
mod telemetry;
mod util;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::batch::{run_batch, BatchJob, BatchResult};
use crate::completion::CompletionService;
use crate::distribution::{DistributionPolicy, Strategy};
use crate::domain::{Difficulty, Subject};
use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "qbank", version, about = "MCAT question bank generator")]
struct Cli {
  /// Question database file.
  #[arg(long, global = true, env = "QBANK_DATABASE")]
  database: Option<PathBuf>,

  /// Subject to work on (biology | biochemistry).
  #[arg(long, global = true, value_parser = parse_subject)]
  subject: Option<Subject>,

  /// Difficulty/type distribution strategy.
  #[arg(long, global = true, value_enum, default_value_t = Strategy::RandomDraw)]
  strategy: Strategy,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Print progress against per-topic targets.
  Status,
  /// Generate questions for one topic until its target (or SIZE) is reached.
  Batch {
    topic: String,
    size: Option<usize>,
    /// Generate every question at this tier (foundation | intermediate | advanced | elite).
    #[arg(long, value_parser = parse_difficulty)]
    difficulty: Option<Difficulty>,
  },
  /// Walk every topic of the subject until all targets are met.
  Run,
  /// Merge externally produced JSON arrays of questions.
  Merge {
    #[arg(required = true)]
    files: Vec<PathBuf>,
  },
}

fn parse_subject(s: &str) -> Result<Subject, String> {
  Subject::parse(s).ok_or_else(|| format!("unknown subject '{s}' (expected biology or biochemistry)"))
}

fn parse_difficulty(s: &str) -> Result<Difficulty, String> {
  Difficulty::parse(s).ok_or_else(|| format!("unknown difficulty '{s}' (expected foundation, intermediate, advanced or elite)"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();
  let cli = Cli::parse();

  let mut state = AppState::new(cli.database.clone())?;
  let subject = cli.subject.unwrap_or(Subject::Biology);

  match cli.command {
    Command::Status => {
      let subjects = cli.subject.map_or(Subject::ALL.to_vec(), |s| vec![s]);
      println!("{}", state.report(&subjects)?);
    }

    Command::Batch { topic, size, difficulty } => {
      let target = state.config.target_for(subject, &topic);
      if target == 0 {
        let known: Vec<_> = catalog::topics(subject).iter().map(|t| t.key).collect();
        return Err(format!("no target for {subject}/{topic}; known topics: {}", known.join(", ")).into());
      }
      let completion = state.completion()?;
      let job = BatchJob {
        subject,
        topic: topic.clone(),
        target,
        batch_size: size,
        policy: match difficulty {
          Some(d) => DistributionPolicy::for_subject(subject, cli.strategy).pinned(d),
          None => DistributionPolicy::for_subject(subject, cli.strategy),
        },
      };
      let mut rng = StdRng::from_entropy();

      tokio::select! {
        res = run_batch(&mut state.store, completion.as_ref(), &state.config, &job, &mut rng) => {
          let result = res?;
          println!("{subject}/{topic}: {result}");
        }
        _ = tokio::signal::ctrl_c() => {
          warn!(target: "qbank", "Interrupted; every stored question is already saved");
        }
      }
      println!("\n{}", state.report(&[subject])?);
    }

    Command::Run => {
      let completion = state.completion()?;
      let policy = DistributionPolicy::for_subject(subject, cli.strategy);

      tokio::select! {
        res = run_subject(&mut state, completion.as_ref(), subject, &policy) => {
          for (topic, r) in res? {
            println!("{subject}/{topic}: {r}");
          }
        }
        _ = tokio::signal::ctrl_c() => {
          warn!(target: "qbank", "Interrupted; every stored question is already saved");
        }
      }
      println!("\n{}", state.report(&[subject])?);
    }

    Command::Merge { files } => {
      let report = merge::merge_external_batches(&mut state.store, &files, subject)?;
      println!(
        "Merged {} question(s) from {} file(s): {} -> {} total; {} rejected, {} file(s) skipped",
        report.merged,
        report.files_read,
        report.total_before,
        report.total_after,
        report.rejected.len(),
        report.files_skipped.len()
      );
      for r in &report.rejected {
        println!("  rejected {}[{}]: {}", r.file.display(), r.index, r.error);
      }
    }
  }

  Ok(())
}

/// Every topic of `subject` in catalog order; a topic is left once it meets
/// its target or a whole batch produced nothing.
async fn run_subject(
  state: &mut AppState,
  completion: &dyn CompletionService,
  subject: Subject,
  policy: &DistributionPolicy,
) -> Result<Vec<(String, BatchResult)>, error::StoreError> {
  let mut rng = StdRng::from_entropy();
  let mut results = vec![];

  for (topic, target) in state.config.subject_targets(subject) {
    let job = BatchJob { subject, topic: topic.clone(), target, batch_size: None, policy: policy.clone() };
    let mut total = BatchResult::default();
    loop {
      let r = run_batch(&mut state.store, completion, &state.config, &job, &mut rng).await?;
      total.needed = total.needed.max(r.needed);
      total.generated += r.generated;
      total.failed += r.failed;
      total.attempts += r.attempts;
      if r.needed == 0 || r.generated == 0 {
        break;
      }
    }
    info!(target: "qbank", %subject, %topic, generated = total.generated, failed = total.failed, "Topic finished");
    results.push((topic, total));
  }
  Ok(results)
}
