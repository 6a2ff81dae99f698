//! Progress monitor: read-only report of stored counts against topic targets.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::GeneratorConfig;
use crate::domain::{Difficulty, Subject};
use crate::store::DatabaseDocument;

/// Rough wall-clock cost of one generated question, including pacing.
pub const SECONDS_PER_QUESTION: u64 = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TopicStatus {
  Complete,
  InProgress,
  NotStarted,
}

impl TopicStatus {
  fn of(current: usize, target: usize) -> Self {
    if current >= target {
      TopicStatus::Complete
    } else if current > 0 {
      TopicStatus::InProgress
    } else {
      TopicStatus::NotStarted
    }
  }

  fn label(&self) -> &'static str {
    match self {
      TopicStatus::Complete => "[done]",
      TopicStatus::InProgress => "[....]",
      TopicStatus::NotStarted => "[    ]",
    }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TopicProgress {
  pub topic: String,
  pub current: usize,
  pub target: usize,
  pub status: TopicStatus,
}

impl TopicProgress {
  pub fn percent(&self) -> f64 {
    pct(self.current, self.target)
  }

  pub fn remaining(&self) -> usize {
    self.target.saturating_sub(self.current)
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubjectProgress {
  pub subject: Subject,
  pub topics: Vec<TopicProgress>,
}

impl SubjectProgress {
  pub fn current(&self) -> usize {
    self.topics.iter().map(|t| t.current).sum()
  }

  pub fn target(&self) -> usize {
    self.topics.iter().map(|t| t.target).sum()
  }

  pub fn remaining(&self) -> usize {
    self.topics.iter().map(TopicProgress::remaining).sum()
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProgressReport {
  pub subjects: Vec<SubjectProgress>,
  pub total_questions: usize,
  pub difficulty: Vec<(Difficulty, usize)>,
  pub last_updated: Option<DateTime<Utc>>,
  /// File size in bytes, when known.
  pub file_size: Option<u64>,
}

fn pct(part: usize, whole: usize) -> f64 {
  if whole == 0 { 0.0 } else { part as f64 * 100.0 / whole as f64 }
}

impl ProgressReport {
  pub fn build(doc: &DatabaseDocument, config: &GeneratorConfig, subjects: &[Subject]) -> Self {
    let m = &doc.metadata;
    let subjects = subjects
      .iter()
      .map(|&subject| SubjectProgress {
        subject,
        topics: config
          .subject_targets(subject)
          .into_iter()
          .map(|(topic, target)| {
            let current = m.topic_count(subject, &topic);
            TopicProgress { status: TopicStatus::of(current, target), topic, current, target }
          })
          .collect(),
      })
      .collect();
    let difficulty = Difficulty::ALL
      .into_iter()
      .map(|d| (d, m.difficulty_levels.get(d.as_str()).copied().unwrap_or(0)))
      .collect();

    Self { subjects, total_questions: m.total_questions, difficulty, last_updated: m.last_updated, file_size: None }
  }

  pub fn with_file_size(mut self, bytes: Option<u64>) -> Self {
    self.file_size = bytes;
    self
  }

  pub fn remaining(&self) -> usize {
    self.subjects.iter().map(SubjectProgress::remaining).sum()
  }

  pub fn estimated_time_left(&self) -> Duration {
    Duration::from_secs(self.remaining() as u64 * SECONDS_PER_QUESTION)
  }
}

impl fmt::Display for ProgressReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    const RULE: &str = "=======================================";

    for s in &self.subjects {
      writeln!(f, "{} PROGRESS", s.subject.as_str().to_uppercase())?;
      writeln!(f, "{RULE}")?;
      for t in &s.topics {
        writeln!(f, "{} {:<25}: {:>3}/{} ({:.1}%)", t.status.label(), t.topic, t.current, t.target, t.percent())?;
      }
      writeln!(f, "{RULE}")?;
      writeln!(f, "TOTAL {}: {}/{} ({:.1}%)", s.subject, s.current(), s.target(), pct(s.current(), s.target()))?;
      writeln!(f)?;
    }

    writeln!(f, "OVERALL")?;
    writeln!(f, "{RULE}")?;
    writeln!(f, "Total questions: {}", self.total_questions)?;
    if let Some(bytes) = self.file_size {
      writeln!(f, "Database size: {:.2} MB", bytes as f64 / 1024.0 / 1024.0)?;
    }
    match self.last_updated {
      Some(ts) => writeln!(f, "Last updated: {}", ts.format("%Y-%m-%d %H:%M:%S UTC"))?,
      None => writeln!(f, "Last updated: never")?,
    }
    writeln!(f)?;

    writeln!(f, "DIFFICULTY DISTRIBUTION")?;
    writeln!(f, "{RULE}")?;
    for (d, n) in &self.difficulty {
      writeln!(f, "{:<12}: {:>3} ({:.1}%)", d.as_str(), n, pct(*n, self.total_questions))?;
    }
    writeln!(f)?;

    let minutes = self.estimated_time_left().as_secs().div_ceil(60);
    writeln!(f, "Remaining questions: {}", self.remaining())?;
    write!(f, "Estimated completion time: ~{minutes} minutes")
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::Metadata;

  fn doc_with(counts: &[(&str, usize)], difficulty: &[(&str, usize)]) -> DatabaseDocument {
    let mut m = Metadata::default();
    for (topic, n) in counts {
      m.categories.entry("biology".into()).or_default().insert(topic.to_string(), *n);
      m.total_questions += n;
    }
    for (d, n) in difficulty {
      m.difficulty_levels.insert(d.to_string(), *n);
    }
    DatabaseDocument { metadata: m, questions: vec![] }
  }

  #[test]
  fn topic_status_and_totals() {
    let doc = doc_with(&[("genetics", 120), ("evolution", 40)], &[("foundation", 100), ("elite", 60)]);
    let report = ProgressReport::build(&doc, &GeneratorConfig::default(), &[Subject::Biology]);

    let bio = &report.subjects[0];
    let by_topic = |k: &str| bio.topics.iter().find(|t| t.topic == k).unwrap().clone();
    assert_eq!(by_topic("genetics").status, TopicStatus::Complete);
    assert_eq!(by_topic("evolution").status, TopicStatus::InProgress);
    assert_eq!(by_topic("evolution").percent(), 50.0);
    assert_eq!(by_topic("cell_biology").status, TopicStatus::NotStarted);
    assert_eq!(bio.current(), 160);
    assert_eq!(bio.target(), 1000);
    assert_eq!(report.remaining(), 840);
    assert_eq!(report.estimated_time_left(), Duration::from_secs(840 * 16));
  }

  #[test]
  fn over_target_topics_do_not_offset_others() {
    let doc = doc_with(&[("genetics", 200)], &[]);
    let report = ProgressReport::build(&doc, &GeneratorConfig::default(), &[Subject::Biology]);
    assert_eq!(report.remaining(), 1000 - 120);
  }

  #[test]
  fn rendered_report_lists_every_topic_and_tier() {
    let doc = doc_with(&[("genetics", 12)], &[("intermediate", 12)]);
    let text = ProgressReport::build(&doc, &GeneratorConfig::default(), &Subject::ALL)
      .with_file_size(Some(2 * 1024 * 1024))
      .to_string();
    assert!(text.contains("BIOLOGY PROGRESS"));
    assert!(text.contains("BIOCHEMISTRY PROGRESS"));
    assert!(text.contains("genetics                 :  12/120 (10.0%)"));
    assert!(text.contains("intermediate:  12 (100.0%)"));
    assert!(text.contains("Database size: 2.00 MB"));
    assert!(text.contains("Last updated: never"));
  }
}
