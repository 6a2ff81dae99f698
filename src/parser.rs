//! Response parser: free-form completion text -> validated `QuestionRecord`.
//!
//! Flow:
//! 1) Strip a Markdown code fence if the model wrapped its answer in one.
//! 2) Locate the first balanced `{...}` span (string-aware brace matching).
//! 3) Strict decode. Only if that fails, run the best-effort sanitiser and
//!    decode again. Both outcomes are logged distinctly.
//! 4) Validate required fields, map the answer letter to an index, assign an id.
//!
//! A failure is always returned as `ParseFailure` (with the raw text); a
//! partially valid payload is never coerced into a record.

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::catalog;
use crate::domain::{QuestionRecord, QuestionRequest, QuestionType, StudyResource, Subject, CHOICE_COUNT};
use crate::error::{ParseError, ParseFailure};

const ANSWER_LETTERS: [char; CHOICE_COUNT] = ['A', 'B', 'C', 'D'];

/// Hands out record ids. Implemented by the question store, which knows
/// every id already taken.
pub trait IdAllocator {
  fn next_id(&self, subject: Subject, topic: &str) -> String;
}

#[derive(Deserialize)]
struct RawQuestion {
  #[serde(default)]
  passage: Option<String>,
  #[serde(default)]
  question: Option<String>,
  #[serde(default)]
  options: Option<RawOptions>,
  #[serde(default)]
  correct_answer: Option<Value>,
  #[serde(default)]
  explanation: Option<String>,
  #[serde(default)]
  study_resources: Option<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawOptions {
  Labeled {
    #[serde(rename = "A", default)]
    a: Option<String>,
    #[serde(rename = "B", default)]
    b: Option<String>,
    #[serde(rename = "C", default)]
    c: Option<String>,
    #[serde(rename = "D", default)]
    d: Option<String>,
  },
  List(Vec<String>),
}

pub fn parse_response(
  raw: &str,
  request: &QuestionRequest,
  ids: &impl IdAllocator,
) -> Result<QuestionRecord, ParseFailure> {
  decode(raw)
    .and_then(|q| into_record(q, request, ids))
    .map_err(|error| ParseFailure { error, raw: raw.to_string() })
}

fn decode(raw: &str) -> Result<RawQuestion, ParseError> {
  let text = strip_code_fence(raw);
  let span = extract_json_object(text)?;

  match serde_json::from_str::<RawQuestion>(span) {
    Ok(q) => Ok(q),
    Err(strict_err) => {
      debug!(target: "parser", error = %strict_err, "Strict decode failed; attempting best-effort recovery");
      let cleaned = sanitize_json(span);
      match serde_json::from_str::<RawQuestion>(&cleaned) {
        Ok(q) => {
          warn!(target: "parser", strict_error = %strict_err, "Decoded completion only after sanitisation");
          Ok(q)
        }
        Err(e) => {
          debug!(target: "parser", error = %e, "Recovery decode failed too");
          Err(ParseError::Malformed(strict_err.to_string()))
        }
      }
    }
  }
}

fn into_record(q: RawQuestion, request: &QuestionRequest, ids: &impl IdAllocator) -> Result<QuestionRecord, ParseError> {
  let question = required_text(q.question, "question")?;
  let choices = choices(q.options)?;
  let correct_answer = answer_index(q.correct_answer.as_ref().ok_or(ParseError::MissingField("correct_answer"))?)?;
  let explanation = required_text(q.explanation, "explanation")?;

  let passage = match request.question_type {
    QuestionType::Passage => {
      let p = required_text(q.passage, "passage")?;
      if p.eq_ignore_ascii_case("null") {
        return Err(ParseError::MissingField("passage"));
      }
      Some(p)
    }
    QuestionType::Discrete => None,
  };

  let study_resources = q
    .study_resources
    .and_then(|v| serde_json::from_value::<Vec<StudyResource>>(v).ok())
    .filter(|r| !r.is_empty())
    .unwrap_or_else(|| catalog::study_resources(request.subject, &request.topic));

  Ok(QuestionRecord {
    id: ids.next_id(request.subject, &request.topic),
    topic: request.topic.clone(),
    subject: Some(request.subject),
    difficulty: request.difficulty,
    question_type: request.question_type,
    passage,
    question,
    choices,
    correct_answer,
    explanation,
    study_resources,
    created_at: Utc::now(),
  })
}

fn required_text(value: Option<String>, field: &'static str) -> Result<String, ParseError> {
  match value.map(|s| s.trim().to_string()) {
    Some(s) if !s.is_empty() => Ok(s),
    _ => Err(ParseError::MissingField(field)),
  }
}

fn choices(options: Option<RawOptions>) -> Result<Vec<String>, ParseError> {
  match options.ok_or(ParseError::MissingField("options"))? {
    RawOptions::Labeled { a, b, c, d } => Ok(vec![
      required_text(a, "options.A")?,
      required_text(b, "options.B")?,
      required_text(c, "options.C")?,
      required_text(d, "options.D")?,
    ]),
    RawOptions::List(list) => {
      if list.len() != CHOICE_COUNT {
        return Err(ParseError::InvalidField {
          field: "options",
          reason: format!("expected {} choices, got {}", CHOICE_COUNT, list.len()),
        });
      }
      list.into_iter().map(|s| required_text(Some(s), "options")).collect()
    }
  }
}

/// Map the answer letter to a 0-based index. Accepts `"B"`, `"(b)"`, `"C."`.
/// Numbers are rejected: the prompt asks for a letter, and a bare number is
/// ambiguous between 0- and 1-based counting.
pub fn answer_index(value: &Value) -> Result<usize, ParseError> {
  let invalid = |reason: String| ParseError::InvalidField { field: "correct_answer", reason };
  match value {
    Value::Number(n) => Err(invalid(format!("expected a letter A-D, got number {n}"))),
    Value::String(s) => {
      let t = s.trim().trim_matches(|c: char| matches!(c, '(' | ')' | '.' | ':') || c.is_whitespace());
      let mut chars = t.chars();
      match (chars.next(), chars.next()) {
        (Some(c), None) => ANSWER_LETTERS
          .iter()
          .position(|l| *l == c.to_ascii_uppercase())
          .ok_or_else(|| invalid(format!("unknown letter {s:?}"))),
        _ => Err(invalid(format!("expected a letter A-D, got {s:?}"))),
      }
    }
    other => Err(invalid(format!("unexpected JSON value {other}"))),
  }
}

/// Remove a surrounding Markdown code fence (```json ... ```), if any.
pub fn strip_code_fence(text: &str) -> &str {
  let t = text.trim();
  let Some(rest) = t.strip_prefix("```") else { return t };
  // Drop the info string (`json`) on the opening fence line.
  let body = match rest.find('\n') {
    Some(i) => &rest[i + 1..],
    None => rest,
  };
  body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// First balanced `{...}` span, ignoring braces inside string literals.
pub fn extract_json_object(text: &str) -> Result<&str, ParseError> {
  let start = text.find('{').ok_or(ParseError::NoJsonObject)?;
  let mut depth = 0usize;
  let mut in_string = false;
  let mut escaped = false;

  for (i, ch) in text[start..].char_indices() {
    if in_string {
      match ch {
        _ if escaped => escaped = false,
        '\\' => escaped = true,
        '"' => in_string = false,
        _ => {}
      }
      continue;
    }
    match ch {
      '"' => in_string = true,
      '{' => depth += 1,
      '}' => {
        depth -= 1;
        if depth == 0 {
          return Ok(&text[start..start + i + 1]);
        }
      }
      _ => {}
    }
  }
  Err(ParseError::Malformed("unterminated JSON object".into()))
}

/// Best-effort repair of common model formatting slips. Lossy by nature, so
/// it only runs after a strict decode failed:
/// - raw newlines/tabs inside strings become escapes, other control chars are dropped
/// - invalid backslash escapes get their backslash escaped
/// - trailing commas before `}` / `]` are removed
pub fn sanitize_json(text: &str) -> String {
  let chars: Vec<char> = text.chars().collect();
  let mut out = String::with_capacity(text.len());
  let mut in_string = false;
  let mut i = 0;

  while i < chars.len() {
    let ch = chars[i];
    if in_string {
      match ch {
        '\\' => match chars.get(i + 1) {
          Some(&next) if matches!(next, '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u') => {
            out.push('\\');
            out.push(next);
            i += 1;
          }
          _ => out.push_str("\\\\"),
        },
        '"' => {
          in_string = false;
          out.push(ch);
        }
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        c if c.is_control() => {}
        c => out.push(c),
      }
    } else {
      match ch {
        '"' => {
          in_string = true;
          out.push(ch);
        }
        ',' => {
          let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
          if !matches!(next, Some('}') | Some(']')) {
            out.push(ch);
          }
        }
        c if c.is_control() && !c.is_whitespace() => {}
        c => out.push(c),
      }
    }
    i += 1;
  }
  out
}

#[cfg(test)]
mod tests {
  use std::cell::Cell;
  use std::collections::HashSet;

  use super::*;
  use crate::domain::Difficulty;
  use crate::store::QuestionStore;

  struct Counter(Cell<usize>);

  impl IdAllocator for Counter {
    fn next_id(&self, subject: Subject, topic: &str) -> String {
      self.0.set(self.0.get() + 1);
      format!("{}_{}_{:03}", subject.id_prefix(), topic, self.0.get())
    }
  }

  fn discrete() -> QuestionRequest {
    QuestionRequest::new(Subject::Biology, "genetics", Difficulty::Foundation, QuestionType::Discrete)
  }

  const VALID: &str = r#"{
    "passage": null,
    "question": "Which cross yields a 9:3:3:1 ratio?",
    "options": {"A": "AaBb x AaBb", "B": "AABB x aabb", "C": "Aabb x aaBb", "D": "AaBB x AABb"},
    "correct_answer": "A",
    "explanation": "A dihybrid cross of heterozygotes yields 9:3:3:1."
  }"#;

  #[test]
  fn valid_payload_becomes_record() {
    let rec = parse_response(VALID, &discrete(), &Counter(Cell::new(0))).unwrap();
    assert_eq!(rec.id, "bio_genetics_001");
    assert_eq!(rec.choices.len(), 4);
    assert_eq!(rec.correct_answer, 0);
    assert_eq!(rec.correct_choice(), Some("AaBb x AaBb"));
    assert_eq!(rec.passage, None);
    assert_eq!(rec.subject, Some(Subject::Biology));
    // Model omitted study_resources: catalog links are filled in.
    assert_eq!(rec.study_resources, catalog::study_resources(Subject::Biology, "genetics"));
  }

  #[test]
  fn fenced_and_chatty_output_is_accepted() {
    let fenced = format!("```json\n{}\n```", VALID);
    assert!(parse_response(&fenced, &discrete(), &Counter(Cell::new(0))).is_ok());

    let chatty = format!("Sure! Here is your question:\n{}\nLet me know if you need more.", VALID);
    assert!(parse_response(&chatty, &discrete(), &Counter(Cell::new(0))).is_ok());
  }

  #[test]
  fn refusal_text_is_a_failure_with_raw_text() {
    let err = parse_response("I cannot answer that.", &discrete(), &Counter(Cell::new(0))).unwrap_err();
    assert_eq!(err.error, ParseError::NoJsonObject);
    assert_eq!(err.raw, "I cannot answer that.");
  }

  #[test]
  fn truncated_json_is_a_failure() {
    let truncated = &VALID[..VALID.len() / 2];
    let err = parse_response(truncated, &discrete(), &Counter(Cell::new(0))).unwrap_err();
    assert!(matches!(err.error, ParseError::Malformed(_)));
  }

  #[test]
  fn missing_fields_are_never_fabricated() {
    let no_explanation = VALID.replace("\"explanation\"", "\"notes\"");
    let err = parse_response(&no_explanation, &discrete(), &Counter(Cell::new(0))).unwrap_err();
    assert_eq!(err.error, ParseError::MissingField("explanation"));

    let blank_option = VALID.replace("\"AABB x aabb\"", "\"  \"");
    let err = parse_response(&blank_option, &discrete(), &Counter(Cell::new(0))).unwrap_err();
    assert_eq!(err.error, ParseError::MissingField("options.B"));
  }

  #[test]
  fn passage_questions_require_a_passage() {
    let req = QuestionRequest::new(Subject::Biology, "genetics", Difficulty::Elite, QuestionType::Passage);
    let err = parse_response(VALID, &req, &Counter(Cell::new(0))).unwrap_err();
    assert_eq!(err.error, ParseError::MissingField("passage"));

    let with_passage = VALID.replace("\"passage\": null", "\"passage\": \"Researchers crossed pea plants...\"");
    let rec = parse_response(&with_passage, &req, &Counter(Cell::new(0))).unwrap();
    assert_eq!(rec.passage.as_deref(), Some("Researchers crossed pea plants..."));
  }

  #[test]
  fn answer_index_maps_letters_and_rejects_the_rest() {
    assert_eq!(answer_index(&serde_json::json!("D")), Ok(3));
    assert_eq!(answer_index(&serde_json::json!(" (b) ")), Ok(1));
    assert_eq!(answer_index(&serde_json::json!("C.")), Ok(2));
    assert!(answer_index(&serde_json::json!(2)).is_err());
    assert!(answer_index(&serde_json::json!("E")).is_err());
    assert!(answer_index(&serde_json::json!("AB")).is_err());
    assert!(answer_index(&serde_json::json!(4)).is_err());
    assert!(answer_index(&serde_json::json!(null)).is_err());
  }

  #[test]
  fn numeric_answer_from_the_model_is_rejected() {
    let numbered = VALID.replace("\"correct_answer\": \"A\"", "\"correct_answer\": 1");
    let err = parse_response(&numbered, &discrete(), &Counter(Cell::new(0))).unwrap_err();
    assert!(matches!(err.error, ParseError::InvalidField { field: "correct_answer", .. }));
  }

  #[test]
  fn every_parsed_answer_resolves_to_a_choice() {
    for letter in ["A", "B", "C", "D"] {
      let payload = VALID.replace("\"correct_answer\": \"A\"", &format!("\"correct_answer\": \"{letter}\""));
      let rec = parse_response(&payload, &discrete(), &Counter(Cell::new(0))).unwrap();
      assert!(rec.correct_answer < CHOICE_COUNT);
      assert!(!rec.correct_choice().unwrap().is_empty());
    }
  }

  #[test]
  fn extraction_ignores_braces_inside_strings() {
    let text = r#"noise {"question": "what does } mean?", "x": {"y": 1}} trailing }"#;
    assert_eq!(
      extract_json_object(text).unwrap(),
      r#"{"question": "what does } mean?", "x": {"y": 1}}"#
    );
  }

  #[test]
  fn sanitiser_recovers_common_slips() {
    let sloppy = "{\"question\": \"line one\nline two\", \"explanation\": \"uses \\d escape\",}";
    assert!(serde_json::from_str::<Value>(sloppy).is_err());
    let v: Value = serde_json::from_str(&sanitize_json(sloppy)).unwrap();
    assert_eq!(v["question"], "line one\nline two");
    assert_eq!(v["explanation"], "uses \\d escape");
  }

  #[test]
  fn sloppy_completion_parses_through_recovery_path() {
    let sloppy = VALID.replace("9:3:3:1.\"", "9:3:3:1.\n\nSee Mendel.\",");
    let rec = parse_response(&sloppy, &discrete(), &Counter(Cell::new(0))).unwrap();
    assert!(rec.explanation.ends_with("See Mendel."));
  }

  #[test]
  fn fifty_records_for_one_topic_get_unique_ids() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = QuestionStore::open(dir.path().join("db.json")).unwrap();
    let mut seen = HashSet::new();
    for _ in 0..50 {
      let rec = parse_response(VALID, &discrete(), &store).unwrap();
      assert!(seen.insert(rec.id.clone()), "duplicate id {}", rec.id);
      store.append(Subject::Biology, rec).unwrap();
    }
    assert_eq!(seen.len(), 50);
  }
}
