//! Question store: the on-disk aggregate document and its only mutation path.
//!
//! This module owns:
//!   - the `DatabaseDocument` (records + summary metadata) in the exact JSON
//!     shape every other process reads
//!   - load (missing file = empty document), append-with-recount, full save
//!   - id allocation for new records
//!
//! Every append rewrites the whole file before returning. There is no
//! cross-process locking: two processes appending to the same file will lose
//! each other's updates (single-writer discipline is an operational rule).

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::catalog;
use crate::domain::{QuestionRecord, StudyResource, Subject, CHOICE_COUNT};
use crate::error::{StoreError, StoreResult};
use crate::parser::{answer_index, IdAllocator};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    #[serde(default)]
    pub total_questions: usize,
    #[serde(default)]
    pub categories: BTreeMap<String, BTreeMap<String, usize>>,
    #[serde(default)]
    pub difficulty_levels: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Metadata {
    pub fn topic_count(&self, subject: Subject, topic: &str) -> usize {
        self.categories
            .get(subject.as_str())
            .and_then(|m| m.get(topic).copied())
            .unwrap_or(0)
    }

    pub fn subject_count(&self, subject: Subject) -> usize {
        self.categories
            .get(subject.as_str())
            .map(|m| m.values().sum())
            .unwrap_or(0)
    }

    fn record(&mut self, subject: Subject, record: &QuestionRecord) {
        self.total_questions += 1;
        *self
            .categories
            .entry(subject.as_str().to_string())
            .or_default()
            .entry(record.topic.clone())
            .or_insert(0) += 1;
        *self
            .difficulty_levels
            .entry(record.difficulty.as_str().to_string())
            .or_insert(0) += 1;
    }
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct DatabaseDocument {
    pub metadata: Metadata,
    pub questions: Vec<QuestionRecord>,
}

impl DatabaseDocument {
    /// Counts derived from the records alone. Records without a stored
    /// subject are attributed through the catalog when the topic is
    /// unambiguous, otherwise they only count toward totals.
    pub fn recount(&self) -> Metadata {
        let mut m = Metadata { last_updated: self.metadata.last_updated, ..Metadata::default() };
        for q in &self.questions {
            match q.subject.or_else(|| infer_subject(&q.topic)) {
                Some(subject) => m.record(subject, q),
                None => {
                    m.total_questions += 1;
                    *m.difficulty_levels.entry(q.difficulty.as_str().to_string()).or_insert(0) += 1;
                }
            }
        }
        m
    }

    /// Human-readable mismatches between stored metadata and the records.
    pub fn consistency_issues(&self) -> Vec<String> {
        let derived = self.recount();
        let mut issues = vec![];
        if self.metadata.total_questions != self.questions.len() {
            issues.push(format!(
                "total_questions is {} but {} records are stored",
                self.metadata.total_questions,
                self.questions.len()
            ));
        }
        if self.metadata.difficulty_levels != derived.difficulty_levels {
            issues.push("difficulty_levels do not match the records".into());
        }
        let count_in = |m: &Metadata, subject: &str, topic: &str| {
            m.categories.get(subject).and_then(|t| t.get(topic)).copied().unwrap_or(0)
        };
        let keys: BTreeSet<(&String, &String)> = derived
            .categories
            .iter()
            .chain(self.metadata.categories.iter())
            .flat_map(|(subject, topics)| topics.keys().map(move |topic| (subject, topic)))
            .collect();
        for (subject, topic) in keys {
            let stored = count_in(&self.metadata, subject, topic);
            let n = count_in(&derived, subject, topic);
            if stored != n {
                issues.push(format!("categories.{subject}.{topic} is {stored} but {n} records match"));
            }
        }
        issues
    }
}

fn infer_subject(topic: &str) -> Option<Subject> {
    let mut hits = Subject::ALL.into_iter().filter(|s| catalog::find_topic(*s, topic).is_some());
    match (hits.next(), hits.next()) {
        (Some(s), None) => Some(s),
        _ => None,
    }
}

#[derive(Deserialize)]
struct RawDocument {
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    questions: Vec<Value>,
}

/// Canonical record, or a legacy one (labelled `options` object and/or a
/// letter answer) upgraded to the canonical shape.
fn record_from_value(value: Value) -> Result<QuestionRecord, String> {
    let strict_err = match serde_json::from_value::<QuestionRecord>(value.clone()) {
        Ok(rec) => return Ok(rec),
        Err(e) => e.to_string(),
    };

    let Value::Object(mut obj) = value else {
        return Err(strict_err);
    };
    if !obj.contains_key("choices") {
        let options = obj.remove("options").ok_or_else(|| strict_err.clone())?;
        let choices: Vec<Value> = ["A", "B", "C", "D"]
            .iter()
            .map(|l| options.get(*l).cloned().unwrap_or(Value::Null))
            .collect();
        obj.insert("choices".into(), Value::Array(choices));
    }
    if let Some(answer) = obj.get("correct_answer") {
        if answer.is_string() {
            let idx = answer_index(answer).map_err(|e| e.to_string())?;
            obj.insert("correct_answer".into(), Value::from(idx));
        }
    }
    if obj.get("passage").is_some_and(|p| p.as_str() == Some("null")) {
        obj.insert("passage".into(), Value::Null);
    }
    serde_json::from_value::<QuestionRecord>(Value::Object(obj)).map_err(|_| strict_err)
}

pub struct QuestionStore {
    path: PathBuf,
    doc: DatabaseDocument,
    ids: HashSet<String>,
}

impl QuestionStore {
    /// Open the store at `path`. A missing file is a valid, empty database.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let doc = Self::load(&path)?;
        let ids = doc.questions.iter().map(|q| q.id.clone()).collect::<HashSet<_>>();
        if ids.len() != doc.questions.len() {
            warn!(target: "store", records = doc.questions.len(), unique_ids = ids.len(), "Database contains duplicate ids");
        }
        for issue in doc.consistency_issues() {
            warn!(target: "store", %issue, "Metadata inconsistent with records");
        }
        info!(target: "store", total = doc.questions.len(), "Question database opened");
        Ok(Self { path, doc, ids })
    }

    /// Read-only load of the document; used for fresh progress reads too.
    pub fn load(path: &Path) -> StoreResult<DatabaseDocument> {
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(target: "store", path = %path.display(), "No database file yet; starting empty");
                return Ok(DatabaseDocument::default());
            }
            Err(e) => return Err(StoreError::io(path, e)),
        };
        let raw: RawDocument =
            serde_json::from_str(&text).map_err(|source| StoreError::Corrupt { path: path.to_path_buf(), source })?;

        let mut questions = Vec::with_capacity(raw.questions.len());
        for (index, value) in raw.questions.into_iter().enumerate() {
            let rec = record_from_value(value).map_err(|reason| StoreError::InvalidRecord {
                path: path.to_path_buf(),
                index,
                reason,
            })?;
            questions.push(rec);
        }
        Ok(DatabaseDocument { metadata: raw.metadata, questions })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &DatabaseDocument {
        &self.doc
    }

    pub fn count_for(&self, subject: Subject, topic: &str) -> usize {
        self.doc.metadata.topic_count(subject, topic)
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Append one record, update every counter, persist the whole document.
    /// If the write fails the in-memory document is rolled back, so memory
    /// and disk never diverge.
    #[instrument(level = "debug", skip(self, record), fields(id = %record.id, %subject))]
    pub fn append(&mut self, subject: Subject, record: QuestionRecord) -> StoreResult<()> {
        let before = self.doc.metadata.clone();
        self.push_unsaved(subject, record)?;
        self.doc.metadata.last_updated = Some(Utc::now());

        if let Err(e) = self.save() {
            if let Some(rec) = self.doc.questions.pop() {
                self.ids.remove(&rec.id);
            }
            self.doc.metadata = before;
            return Err(e);
        }
        Ok(())
    }

    /// Add a record and its counts without writing. The merge utility uses
    /// this in a loop and saves once at the end.
    pub(crate) fn push_unsaved(&mut self, subject: Subject, mut record: QuestionRecord) -> StoreResult<()> {
        if self.ids.contains(&record.id) {
            return Err(StoreError::DuplicateId(record.id));
        }
        // A subject stored on the record wins; counts follow the record.
        let subject = *record.subject.get_or_insert(subject);
        self.doc.metadata.record(subject, &record);
        self.ids.insert(record.id.clone());
        self.doc.questions.push(record);
        Ok(())
    }

    pub(crate) fn touch(&mut self) {
        self.doc.metadata.last_updated = Some(Utc::now());
    }

    /// Serialise the document and replace the file in full (temp file + rename).
    pub fn save(&self) -> StoreResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let body = serde_json::to_string_pretty(&self.doc)?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "question-database.json".into());
        let tmp = self.path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        if let Err(e) = fs::write(&tmp, body) {
            let _ = fs::remove_file(&tmp);
            return Err(StoreError::io(&tmp, e));
        }
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(StoreError::io(&self.path, e));
        }
        debug!(target: "store", path = %self.path.display(), total = self.doc.metadata.total_questions, "Database saved");
        Ok(())
    }
}

impl IdAllocator for QuestionStore {
    /// `{prefix}_{topic}_{NNN}`: one past the highest sequence already used
    /// for this prefix+topic, bumped until free.
    fn next_id(&self, subject: Subject, topic: &str) -> String {
        let stem = format!("{}_{}_", subject.id_prefix(), topic);
        let mut seq = self
            .ids
            .iter()
            .filter_map(|id| id.strip_prefix(&stem))
            .filter_map(|n| n.parse::<usize>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        loop {
            let id = format!("{stem}{seq:03}");
            if !self.ids.contains(&id) {
                return id;
            }
            seq += 1;
        }
    }
}

/// Convenience for tests and the merge validator.
pub fn is_well_formed(record: &QuestionRecord) -> Result<(), String> {
    if record.id.trim().is_empty() {
        return Err("id is empty".into());
    }
    if record.topic.trim().is_empty() {
        return Err("topic is empty".into());
    }
    if record.question.trim().is_empty() {
        return Err("question is empty".into());
    }
    if record.explanation.trim().is_empty() {
        return Err("explanation is empty".into());
    }
    if record.choices.len() != CHOICE_COUNT {
        return Err(format!("expected {} choices, got {}", CHOICE_COUNT, record.choices.len()));
    }
    if record.choices.iter().any(|c| c.trim().is_empty()) {
        return Err("a choice is empty".into());
    }
    if record.correct_choice().is_none() {
        return Err(format!("correct_answer {} is out of range", record.correct_answer));
    }
    if record.study_resources.iter().any(|r: &StudyResource| r.url.trim().is_empty()) {
        return Err("a study resource has no url".into());
    }
    Ok(())
}
