//! Reads the structured answer back out of free-form model text.
//!
//! The grammar is small: anything, then `<answer>`, a JSON object with a
//! `recipes` array (optionally inside a Markdown code fence), then `</answer>`,
//! then anything. Only the first answer segment counts. The `<thinking>`
//! section and other prose around it are discarded without inspection.

use lazy_static::lazy_static;
use pantry::basic_models::RecipeCollection;
use regex::Regex;

use crate::errors::{PipelineError, PipelineResult};

lazy_static! {
    static ref ANSWER: Regex = Regex::new(r"(?s)<answer>(.*?)</answer>").unwrap();
    static ref CODE_FENCE: Regex = Regex::new(r"(?s)^```[a-zA-Z]*\s*(.*?)\s*```$").unwrap();
}

/// Find the contents of the first `<answer>` segment, without any code fence.
fn answer_segment(raw_text: &str) -> Option<&str> {
    let answer = ANSWER.captures(raw_text)?.get(1)?.as_str().trim();
    Some(match CODE_FENCE.captures(answer).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => answer,
    })
}

/// Decode every recipe in the model's answer, or none of them.
pub fn extract(raw_text: &str) -> PipelineResult<RecipeCollection> {
    let answer = answer_segment(raw_text).ok_or_else(|| {
        PipelineError::MalformedModelOutput("no <answer> segment in model output".into())
    })?;
    let collection: RecipeCollection = serde_json::from_str(answer)
        .map_err(|err| PipelineError::MalformedModelOutput(format!("undecodable answer: {err}")))?;
    if collection.len() > RecipeCollection::MAX_RECIPES {
        return Err(PipelineError::MalformedModelOutput(format!(
            "expected at most {} recipes, got {}",
            RecipeCollection::MAX_RECIPES,
            collection.len()
        )));
    }
    Ok(collection)
}
