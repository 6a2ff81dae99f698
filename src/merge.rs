//! Merge utility: fold externally produced question arrays into the store.
//!
//! Files are processed in the order given. Each element is validated before
//! it may touch the counts; rejected elements are reported, never half-applied.
//! The database is written once, after the last file.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::domain::{QuestionRecord, Subject};
use crate::error::{StoreError, ValidationError};
use crate::store::{is_well_formed, QuestionStore};

#[derive(Debug)]
pub struct Rejected {
  pub file: PathBuf,
  pub index: usize,
  pub error: ValidationError,
}

#[derive(Debug, Default)]
pub struct MergeReport {
  pub files_read: usize,
  pub files_skipped: Vec<PathBuf>,
  pub merged: usize,
  pub rejected: Vec<Rejected>,
  pub total_before: usize,
  pub total_after: usize,
}

/// Validate one external element. The record's own `subject` wins over the default.
pub fn validate_record(value: Value, default_subject: Subject) -> Result<(Subject, QuestionRecord), ValidationError> {
  if !value.is_object() {
    return Err(ValidationError::Shape("expected a JSON object".into()));
  }
  match value.get("correct_answer") {
    Some(Value::Number(_)) => {}
    Some(other) => {
      return Err(ValidationError::Field {
        field: "correct_answer",
        reason: format!("expected an index 0-3, got {other}"),
      })
    }
    None => return Err(ValidationError::Field { field: "correct_answer", reason: "missing".into() }),
  }

  let record: QuestionRecord = serde_json::from_value(value).map_err(|e| ValidationError::Shape(e.to_string()))?;
  is_well_formed(&record).map_err(ValidationError::Shape)?;
  let subject = record.subject.unwrap_or(default_subject);
  Ok((subject, record))
}

fn read_batch_file(path: &Path) -> Result<Option<Vec<Value>>, String> {
  let text = match fs::read_to_string(path) {
    Ok(t) => t,
    Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
    Err(e) => return Err(e.to_string()),
  };
  serde_json::from_str::<Vec<Value>>(&text).map(Some).map_err(|e| e.to_string())
}

#[instrument(level = "info", skip_all, fields(files = paths.len(), %default_subject))]
pub fn merge_external_batches(
  store: &mut QuestionStore,
  paths: &[PathBuf],
  default_subject: Subject,
) -> Result<MergeReport, StoreError> {
  let mut report = MergeReport { total_before: store.document().metadata.total_questions, ..MergeReport::default() };

  for path in paths {
    let items = match read_batch_file(path) {
      Ok(Some(items)) => items,
      Ok(None) => {
        warn!(target: "merge", path = %path.display(), "Batch file not found; skipping");
        report.files_skipped.push(path.clone());
        continue;
      }
      Err(error) => {
        warn!(target: "merge", path = %path.display(), %error, "Batch file is not a JSON array of questions; skipping");
        report.files_skipped.push(path.clone());
        continue;
      }
    };
    report.files_read += 1;

    let mut merged_here = 0usize;
    for (index, value) in items.into_iter().enumerate() {
      let outcome = validate_record(value, default_subject).and_then(|(subject, record)| {
        if store.contains_id(&record.id) {
          return Err(ValidationError::DuplicateId(record.id));
        }
        Ok((subject, record))
      });
      match outcome {
        Ok((subject, record)) => {
          store.push_unsaved(subject, record)?;
          merged_here += 1;
        }
        Err(error) => {
          warn!(target: "merge", path = %path.display(), index, %error, "Rejected external record");
          report.rejected.push(Rejected { file: path.clone(), index, error });
        }
      }
    }
    info!(target: "merge", path = %path.display(), merged = merged_here, "Batch file merged");
    report.merged += merged_here;
  }

  if report.merged > 0 {
    store.touch();
    store.save()?;
  }
  report.total_after = store.document().metadata.total_questions;
  info!(
    target: "merge",
    before = report.total_before,
    after = report.total_after,
    merged = report.merged,
    rejected = report.rejected.len(),
    "Merge complete"
  );
  Ok(report)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Difficulty;
  use crate::store::tests::sample_record;

  fn write_json(path: &Path, value: &Value) {
    fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
  }

  fn seeded_store(dir: &Path, n: usize) -> QuestionStore {
    let mut store = QuestionStore::open(dir.join("db.json")).unwrap();
    for i in 0..n {
      let rec = sample_record(&format!("bio_cell_biology_{:03}", i + 1), "cell_biology", Difficulty::Intermediate);
      store.push_unsaved(Subject::Biology, rec).unwrap();
    }
    store.save().unwrap();
    store
  }

  #[test]
  fn seven_external_records_bring_93_to_100() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = seeded_store(dir.path(), 93);

    let external: Vec<Value> = (1..=7)
      .map(|i| {
        let d = if i <= 3 { Difficulty::Elite } else { Difficulty::Foundation };
        serde_json::to_value(sample_record(&format!("ext_genetics_{i}"), "genetics", d)).unwrap()
      })
      .collect();
    let file = dir.path().join("batch-1.json");
    write_json(&file, &Value::Array(external));

    let report = merge_external_batches(&mut store, &[file], Subject::Biology).unwrap();
    assert_eq!((report.total_before, report.total_after, report.merged), (93, 100, 7));

    let on_disk = QuestionStore::load(store.path()).unwrap();
    assert_eq!(on_disk.metadata.total_questions, 100);
    assert_eq!(on_disk.questions.len(), 100);
    assert_eq!(on_disk.metadata.topic_count(Subject::Biology, "cell_biology"), 93);
    assert_eq!(on_disk.metadata.topic_count(Subject::Biology, "genetics"), 7);
    assert_eq!(on_disk.metadata.difficulty_levels["elite"], 3);
    assert_eq!(on_disk.metadata.difficulty_levels["foundation"], 4);
    assert!(on_disk.consistency_issues().is_empty());
  }

  #[test]
  fn bad_elements_are_rejected_and_missing_files_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = seeded_store(dir.path(), 1);

    let good = serde_json::to_value(sample_record("ext_1", "evolution", Difficulty::Advanced)).unwrap();
    let mut letter = good.clone();
    letter["id"] = "ext_2".into();
    letter["correct_answer"] = "B".into();
    let mut three_choices = good.clone();
    three_choices["id"] = "ext_3".into();
    three_choices["choices"] = serde_json::json!(["a", "b", "c"]);
    let mut no_topic = good.clone();
    no_topic["id"] = "ext_4".into();
    no_topic.as_object_mut().unwrap().remove("topic");
    let dup_of_existing = serde_json::to_value(sample_record("bio_cell_biology_001", "genetics", Difficulty::Elite)).unwrap();
    let mut biochem = good.clone();
    biochem["id"] = "ext_5".into();
    biochem["subject"] = "biochemistry".into();
    biochem["topic"] = "amino_acids".into();

    let file = dir.path().join("mixed.json");
    write_json(&file, &serde_json::json!([good, letter, three_choices, no_topic, dup_of_existing, good, biochem]));
    let missing = dir.path().join("never-written.json");

    let report = merge_external_batches(&mut store, &[missing.clone(), file], Subject::Biology).unwrap();

    assert_eq!(report.files_skipped, vec![missing]);
    assert_eq!(report.files_read, 1);
    assert_eq!(report.merged, 2);
    let reasons: Vec<_> = report.rejected.iter().map(|r| (r.index, &r.error)).collect();
    assert_eq!(reasons.len(), 5);
    assert!(matches!(reasons[0], (1, ValidationError::Field { field: "correct_answer", .. })));
    assert!(matches!(reasons[1], (2, ValidationError::Shape(_))));
    assert!(matches!(reasons[2], (3, ValidationError::Shape(_))));
    assert!(matches!(reasons[3], (4, ValidationError::DuplicateId(_))));
    assert!(matches!(reasons[4], (5, ValidationError::DuplicateId(_))));

    let doc = store.document();
    assert_eq!(doc.metadata.total_questions, 3);
    assert_eq!(doc.metadata.topic_count(Subject::Biochemistry, "amino_acids"), 1);
    assert_eq!(doc.metadata.topic_count(Subject::Biology, "evolution"), 1);
  }

  #[test]
  fn nothing_to_merge_leaves_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = seeded_store(dir.path(), 2);
    let before = fs::read(store.path()).unwrap();
    let not_array = dir.path().join("object.json");
    fs::write(&not_array, r#"{"questions": []}"#).unwrap();

    let report = merge_external_batches(&mut store, &[not_array], Subject::Biology).unwrap();
    assert_eq!(report.merged, 0);
    assert_eq!(report.files_skipped.len(), 1);
    assert_eq!(fs::read(store.path()).unwrap(), before);
  }
}
