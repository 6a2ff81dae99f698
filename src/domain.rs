//! Domain models: subjects, difficulty tiers, question types and the question record itself.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level grouping key used by the aggregate counts (`metadata.categories.<subject>`).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
  Biology,
  Biochemistry,
}

impl Subject {
  pub const ALL: [Subject; 2] = [Subject::Biology, Subject::Biochemistry];

  pub fn as_str(&self) -> &'static str {
    match self {
      Subject::Biology => "biology",
      Subject::Biochemistry => "biochemistry",
    }
  }

  /// Prefix of the sequential record ids, e.g. `bio_genetics_007`.
  pub fn id_prefix(&self) -> &'static str {
    match self {
      Subject::Biology => "bio",
      Subject::Biochemistry => "biochem",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "biology" | "bio" => Some(Subject::Biology),
      "biochemistry" | "biochem" => Some(Subject::Biochemistry),
      _ => None,
    }
  }
}

impl fmt::Display for Subject {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Difficulty tier, increasing integration of concepts and analytical demand.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
  Foundation,
  Intermediate,
  Advanced,
  Elite,
}

impl Difficulty {
  pub const ALL: [Difficulty; 4] = [
    Difficulty::Foundation,
    Difficulty::Intermediate,
    Difficulty::Advanced,
    Difficulty::Elite,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Foundation => "foundation",
      Difficulty::Intermediate => "intermediate",
      Difficulty::Advanced => "advanced",
      Difficulty::Elite => "elite",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|d| d.as_str() == s.trim().to_ascii_lowercase())
  }
}

impl fmt::Display for Difficulty {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Presentation style of a question.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
  /// Accompanied by a scenario / experimental narrative.
  Passage,
  /// Standalone question.
  Discrete,
}

impl QuestionType {
  pub fn as_str(&self) -> &'static str {
    match self {
      QuestionType::Passage => "passage",
      QuestionType::Discrete => "discrete",
    }
  }
}

impl fmt::Display for QuestionType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StudyResource {
  pub title: String,
  pub url: String,
  #[serde(rename = "type")]
  pub kind: String,
}

/// One generated exam question, as persisted in `question-database.json`.
///
/// `correct_answer` is always a 0-based index into `choices`; letter answers
/// returned by a model are mapped by the parser before a record exists.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QuestionRecord {
  pub id: String,
  pub topic: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub subject: Option<Subject>,
  pub difficulty: Difficulty,
  #[serde(rename = "type")]
  pub question_type: QuestionType,
  #[serde(default)]
  pub passage: Option<String>,
  pub question: String,
  pub choices: Vec<String>,
  pub correct_answer: usize,
  pub explanation: String,
  #[serde(default)]
  pub study_resources: Vec<StudyResource>,
  pub created_at: DateTime<Utc>,
}

/// Number of answer choices every record carries (labels A-D).
pub const CHOICE_COUNT: usize = 4;

impl QuestionRecord {
  /// Text of the correct choice, if the index resolves.
  pub fn correct_choice(&self) -> Option<&str> {
    self.choices.get(self.correct_answer).map(String::as_str)
  }
}

/// What the batch driver asks for in a single generation call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuestionRequest {
  pub subject: Subject,
  pub topic: String,
  pub difficulty: Difficulty,
  pub question_type: QuestionType,
}

impl QuestionRequest {
  pub fn new(subject: Subject, topic: &str, difficulty: Difficulty, question_type: QuestionType) -> Self {
    Self { subject, topic: topic.to_string(), difficulty, question_type }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn enums_use_snake_case_on_the_wire() {
    assert_eq!(serde_json::to_string(&Difficulty::Elite).unwrap(), "\"elite\"");
    assert_eq!(serde_json::to_string(&QuestionType::Passage).unwrap(), "\"passage\"");
    assert_eq!(serde_json::to_string(&Subject::Biochemistry).unwrap(), "\"biochemistry\"");
  }

  #[test]
  fn record_uses_type_key_and_omits_missing_subject() {
    let rec = QuestionRecord {
      id: "bio_genetics_001".into(),
      topic: "genetics".into(),
      subject: None,
      difficulty: Difficulty::Foundation,
      question_type: QuestionType::Discrete,
      passage: None,
      question: "Q?".into(),
      choices: vec!["a".into(), "b".into(), "c".into(), "d".into()],
      correct_answer: 2,
      explanation: "because".into(),
      study_resources: vec![],
      created_at: Utc::now(),
    };
    let v = serde_json::to_value(&rec).unwrap();
    assert_eq!(v["type"], "discrete");
    assert!(v.get("subject").is_none());
    assert_eq!(rec.correct_choice(), Some("c"));
  }

  #[test]
  fn parse_helpers_accept_known_names_only() {
    assert_eq!(Subject::parse("Bio"), Some(Subject::Biology));
    assert_eq!(Subject::parse("chemistry"), None);
    assert_eq!(Difficulty::parse(" Advanced "), Some(Difficulty::Advanced));
    assert_eq!(Difficulty::parse("expert"), None);
  }
}
