//! Prompt builder: turns a (subject, topic, difficulty, type) request into the
//! instruction text sent to the completion service.
//!
//! Pure function of its inputs plus the static catalog. Unknown topics get
//! generic guidance rather than an error. Study resources are injected here,
//! not left for the model to invent.

use serde_json::json;

use crate::catalog;
use crate::config::Prompts;
use crate::domain::{QuestionRequest, QuestionType};
use crate::util::fill_template;

/// The JSON object the model must return, with the study links pre-filled.
pub fn json_shape(request: &QuestionRequest) -> String {
  let passage = match request.question_type {
    QuestionType::Passage => json!("detailed scientific passage with experimental context here"),
    QuestionType::Discrete => json!(null),
  };
  let shape = json!({
    "passage": passage,
    "question": "challenging question text requiring analysis and application",
    "options": {
      "A": "option A",
      "B": "option B",
      "C": "option C",
      "D": "option D"
    },
    "correct_answer": "A",
    "explanation": "comprehensive explanation covering why the correct answer is right and why the other options are wrong",
    "study_resources": catalog::study_resources(request.subject, &request.topic),
  });
  serde_json::to_string_pretty(&shape).unwrap_or_else(|_| shape.to_string())
}

pub fn build_prompt(prompts: &Prompts, request: &QuestionRequest) -> String {
  let (style, passage_requirement) = match request.question_type {
    QuestionType::Passage => (
      "passage-based",
      "Include a scientific passage (200-300 words) with experimental context, followed by the question",
    ),
    QuestionType::Discrete => ("discrete", "Create a complex standalone scenario; set \"passage\" to null"),
  };
  let shape = json_shape(request);

  fill_template(
    &prompts.question_user_template,
    &[
      ("style", style),
      ("subject", request.subject.as_str()),
      ("topic", &request.topic),
      ("difficulty", request.difficulty.as_str()),
      ("type", request.question_type.as_str()),
      ("passage_requirement", passage_requirement),
      ("difficulty_guidelines", catalog::difficulty_guidelines(request.difficulty)),
      ("topic_guidelines", catalog::topic_guidance(request.subject, &request.topic)),
      ("topic_focus", catalog::topic_focus(request.subject, &request.topic)),
      ("json_shape", &shape),
    ],
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Difficulty, Subject};

  fn request(topic: &str, question_type: QuestionType) -> QuestionRequest {
    QuestionRequest::new(Subject::Biology, topic, Difficulty::Advanced, question_type)
  }

  #[test]
  fn prompt_embeds_guidance_rubric_and_shape() {
    let p = build_prompt(&Prompts::default(), &request("genetics", QuestionType::Passage));
    assert!(p.contains("passage-based biology question for genetics at advanced level"));
    assert!(p.contains(catalog::topic_guidance(Subject::Biology, "genetics")));
    assert!(p.contains(catalog::difficulty_guidelines(Difficulty::Advanced)));
    assert!(p.contains("\"correct_answer\": \"A\""));
    assert!(p.contains("https://www.khanacademy.org/science/biology/classical-genetics"));
    assert!(!p.contains("{topic}") && !p.contains("{json_shape}"));
  }

  #[test]
  fn discrete_shape_has_null_passage() {
    let shape = json_shape(&request("evolution", QuestionType::Discrete));
    let v: serde_json::Value = serde_json::from_str(&shape).unwrap();
    assert!(v["passage"].is_null());
    assert_eq!(v["options"].as_object().unwrap().len(), 4);
    assert_eq!(v["study_resources"].as_array().unwrap().len(), 2);
  }

  #[test]
  fn unknown_topic_uses_generic_guidance() {
    let p = build_prompt(&Prompts::default(), &request("astrobiology", QuestionType::Discrete));
    assert!(p.contains("TOPIC GUIDELINES for astrobiology: Cover the core principles"));
  }
}
