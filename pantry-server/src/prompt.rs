use lazy_static::lazy_static;
use pantry::basic_models::{Difficulty, GenerationRequest};
use regex::{Captures, Regex};
use strum::IntoEnumIterator;

use crate::errors::{PipelineError, PipelineResult};

pub const SYSTEM_DIRECTIVE: &str = include_str!("prompts/system.md");

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{(\w+)\}").unwrap();
}

/// Render a list the way the format example expects it: as a JSON array of strings.
fn json_list<'a>(items: impl IntoIterator<Item = &'a String>) -> PipelineResult<String> {
    serde_json::to_string(&items.into_iter().collect::<Vec<_>>())
        .map_err(|err| PipelineError::InvalidRequest(err.to_string()))
}

/// Build the instruction for the text model from what the user sent.
///
/// The output is a pure function of the request. The model is asked to think
/// inside `<thinking>` tags and answer inside `<answer>` tags; see
/// [`crate::extract`] for how the answer is read back.
pub fn build_prompt(request: &GenerationRequest) -> PipelineResult<String> {
    if request.language.trim().is_empty() {
        return Err(PipelineError::InvalidRequest("language is required".into()));
    }
    if request.ingredients.is_empty() {
        return Err(PipelineError::InvalidRequest(
            "at least one ingredient is required".into(),
        ));
    }
    if request.ingredients.iter().any(|i| i.trim().is_empty()) {
        return Err(PipelineError::InvalidRequest(
            "ingredients can't be blank".into(),
        ));
    }

    let difficulties = Difficulty::iter()
        .map(<&'static str>::from)
        .collect::<Vec<_>>()
        .join(", ");
    let ingredients = json_list(&request.ingredients)?;
    let allergies = json_list(&request.allergies)?;
    let preferences = json_list(&request.preferences)?;
    // One pass, so text from the request is never read as a placeholder
    let prompt = PLACEHOLDER
        .replace_all(
            include_str!("prompts/recipe-proposals.md"),
            |caps: &Captures| match &caps[1] {
                "difficulties" => difficulties.clone(),
                "ingredients" => ingredients.clone(),
                "allergies" => allergies.clone(),
                "preferences" => preferences.clone(),
                "language" => request.language.trim().to_string(),
                _ => caps[0].to_string(),
            },
        )
        .into_owned();
    tracing::debug!("Prompt: {}", prompt);
    Ok(prompt)
}
