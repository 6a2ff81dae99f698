//! Loading generator configuration (paths, provider, pacing, prompts, targets) from TOML.
//!
//! Every field has a default, so an absent or partial file is fine.
//! See `GeneratorConfig` for the expected schema.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

use crate::catalog;
use crate::domain::Subject;

pub const DEFAULT_DATABASE_PATH: &str = "data/question-database.json";

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
  pub database_path: PathBuf,
  pub completion: CompletionSettings,
  pub batch: BatchSettings,
  pub prompts: Prompts,
  /// Per-subject topic target overrides: `[targets.biology] genetics = 150`.
  pub targets: HashMap<String, HashMap<String, usize>>,
}

impl Default for GeneratorConfig {
  fn default() -> Self {
    Self {
      database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
      completion: CompletionSettings::default(),
      batch: BatchSettings::default(),
      prompts: Prompts::default(),
      targets: HashMap::new(),
    }
  }
}

impl GeneratorConfig {
  /// Target for a topic: config override first, then the catalog, else 0.
  pub fn target_for(&self, subject: Subject, topic: &str) -> usize {
    self
      .targets
      .get(subject.as_str())
      .and_then(|m| m.get(topic).copied())
      .or_else(|| catalog::find_topic(subject, topic).map(|t| t.target))
      .unwrap_or(0)
  }

  /// Targets for every catalog topic of a subject plus any extra configured topics.
  pub fn subject_targets(&self, subject: Subject) -> Vec<(String, usize)> {
    let mut out: Vec<(String, usize)> = catalog::topics(subject)
      .iter()
      .map(|t| (t.key.to_string(), self.target_for(subject, t.key)))
      .collect();
    if let Some(extra) = self.targets.get(subject.as_str()) {
      let mut extra: Vec<_> = extra
        .iter()
        .filter(|(k, _)| catalog::find_topic(subject, k).is_none())
        .map(|(k, v)| (k.clone(), *v))
        .collect();
      extra.sort();
      out.extend(extra);
    }
    out
  }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
  Anthropic,
  #[serde(rename = "openai")]
  OpenAi,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CompletionSettings {
  pub provider: Provider,
  /// Empty means "provider default".
  pub model: String,
  pub base_url: String,
  pub max_tokens: u32,
  pub temperature: f32,
  pub timeout_secs: u64,
}

impl Default for CompletionSettings {
  fn default() -> Self {
    Self {
      provider: Provider::Anthropic,
      model: String::new(),
      base_url: String::new(),
      max_tokens: 3000,
      temperature: 0.7,
      timeout_secs: 90,
    }
  }
}

impl CompletionSettings {
  pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }
}

/// Pacing of the batch driver. Delays are courtesy for provider rate limits.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
  pub item_delay_ms: u64,
  /// Items per sub-batch; progress is re-read from disk between sub-batches.
  pub group_size: usize,
  pub group_delay_ms: u64,
  /// When set, keep attempting until `needed` records exist or
  /// `needed * factor` attempts were spent.
  pub max_attempts_factor: Option<usize>,
}

impl Default for BatchSettings {
  fn default() -> Self {
    Self { item_delay_ms: 2000, group_size: 12, group_delay_ms: 5000, max_attempts_factor: None }
  }
}

impl BatchSettings {
  pub fn item_delay(&self) -> Duration { Duration::from_millis(self.item_delay_ms) }
  pub fn group_delay(&self) -> Duration { Duration::from_millis(self.group_delay_ms) }
}

/// Prompt templates. `{placeholders}` are filled by the prompt builder:
/// style, subject, topic, difficulty, type, passage_requirement,
/// difficulty_guidelines, topic_guidelines, topic_focus, json_shape.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub question_system: String,
  pub question_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      question_system: "You are an expert MCAT item writer. Respond ONLY with valid JSON.".into(),
      question_user_template: "Generate a high-quality MCAT {style} {subject} question for {topic} at {difficulty} level.

CRITICAL REQUIREMENTS FOR 515+ MCAT SCORES:
- Target advanced test-takers who need challenging, differentiated content
- Focus on application, analysis, and synthesis over memorization
- Integrate multiple concepts when possible
- Use realistic experimental scenarios and data interpretation
- {passage_requirement}
- Provide 4 multiple choice answers (A, B, C, D)

QUESTION SPECIFICATIONS:
- Topic: {topic}
- Difficulty: {difficulty}
- Type: {type}

DIFFICULTY GUIDELINES for {difficulty}: {difficulty_guidelines}

TOPIC GUIDELINES for {topic}: {topic_guidelines}
For {topic} questions, emphasize:
{topic_focus}

Format your response as valid JSON only (no additional text):
{json_shape}".into(),
    }
  }
}

/// Attempt to load `GeneratorConfig` from QBANK_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_from_env() -> Option<GeneratorConfig> {
  let path = std::env::var("QBANK_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<GeneratorConfig>(&s) {
      Ok(cfg) => {
        info!(target: "qbank", %path, "Loaded generator config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "qbank", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "qbank", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_documented_pacing() {
    let cfg = GeneratorConfig::default();
    assert_eq!(cfg.database_path, PathBuf::from(DEFAULT_DATABASE_PATH));
    assert_eq!(cfg.batch.group_size, 12);
    assert_eq!(cfg.batch.item_delay(), Duration::from_secs(2));
    assert_eq!(cfg.completion.provider, Provider::Anthropic);
    assert!(cfg.batch.max_attempts_factor.is_none());
  }

  #[test]
  fn partial_toml_keeps_remaining_defaults() {
    let cfg: GeneratorConfig = toml::from_str(
      r#"
database_path = "/tmp/db.json"

[completion]
provider = "openai"
model = "gpt-4o"

[batch]
item_delay_ms = 0
max_attempts_factor = 2

[targets.biology]
genetics = 150
virology = 10
"#,
    )
    .unwrap();

    assert_eq!(cfg.database_path, PathBuf::from("/tmp/db.json"));
    assert_eq!(cfg.completion.provider, Provider::OpenAi);
    assert_eq!(cfg.completion.max_tokens, 3000);
    assert_eq!(cfg.batch.group_size, 12);
    assert_eq!(cfg.batch.max_attempts_factor, Some(2));
    assert!(cfg.prompts.question_user_template.contains("{json_shape}"));

    assert_eq!(cfg.target_for(Subject::Biology, "genetics"), 150);
    assert_eq!(cfg.target_for(Subject::Biology, "evolution"), 80);
    assert_eq!(cfg.target_for(Subject::Biochemistry, "genetics"), 0);

    let targets = cfg.subject_targets(Subject::Biology);
    assert_eq!(targets.len(), 7);
    assert_eq!(targets.last().unwrap(), &("virology".to_string(), 10));
  }
}
