use std::sync::Arc;

use pantry::basic_models::{same_ingredient, GenerationRequest, RecipeCollection};
use strum::Display;

use crate::errors::{PipelineError, PipelineResult};
use crate::extract::extract;
use crate::generation::{default_concurrency, fan_out, ImageModel, TextModel};
use crate::prompt::{build_prompt, SYSTEM_DIRECTIVE};
use crate::storage::ArtifactStore;

/// Where a run is. Failing in any stage ends the run there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Stage {
    BuildingPrompt,
    GeneratingText,
    ExtractingRecipes,
    BuildingImagePrompts,
    GeneratingImages,
    PersistingImages,
    AssemblingResult,
    Done,
}

/// Turns a request into illustrated recipes.
///
/// All three collaborators are injected, so tests can swap in stubs. One
/// pipeline can serve any number of concurrent runs; runs share nothing but the
/// store.
#[derive(Clone)]
pub struct Pipeline {
    text_model: Arc<dyn TextModel>,
    image_model: Arc<dyn ImageModel>,
    store: Arc<dyn ArtifactStore>,
    concurrency: usize,
}

impl Pipeline {
    pub fn new(
        text_model: Arc<dyn TextModel>,
        image_model: Arc<dyn ImageModel>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            text_model,
            image_model,
            store,
            concurrency: default_concurrency(),
        }
    }

    /// Limit how many images are generated at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Run every stage in order and return the finished collection.
    ///
    /// Images stored before a later failure are left where they are.
    pub async fn run(&self, request: &GenerationRequest) -> PipelineResult<RecipeCollection> {
        let mut stage = Stage::BuildingPrompt;
        match self.run_stages(request, &mut stage).await {
            Ok(collection) => {
                tracing::info!(stage = %stage, "Proposed {} recipes", collection.len());
                Ok(collection)
            }
            Err(err) => {
                tracing::error!(stage = %stage, "Pipeline failed: {}", err);
                Err(err)
            }
        }
    }

    async fn run_stages(
        &self,
        request: &GenerationRequest,
        stage: &mut Stage,
    ) -> PipelineResult<RecipeCollection> {
        let prompt = build_prompt(request)?;

        advance(stage, Stage::GeneratingText);
        let raw_text = self
            .text_model
            .generate(&prompt, SYSTEM_DIRECTIVE)
            .await
            .map_err(PipelineError::ModelInvocation)?;

        advance(stage, Stage::ExtractingRecipes);
        let mut collection = extract(&raw_text)?;
        check_ingredients(request, &collection)?;

        advance(stage, Stage::BuildingImagePrompts);
        // Each job is keyed by the position of the recipe it illustrates
        let jobs = collection
            .recipes
            .iter()
            .enumerate()
            .map(|(slot, recipe)| (slot, recipe.image_prompt()))
            .collect();

        // Each image is persisted as soon as it's generated, so both stages run inside one fan-out
        advance(stage, Stage::GeneratingImages);
        let image_model = &self.image_model;
        let store = &self.store;
        let stored = fan_out(jobs, self.concurrency, |prompt: String| async move {
            let image = image_model
                .generate(&prompt)
                .await
                .map_err(PipelineError::ModelInvocation)?;
            tracing::debug!("Storing {} bytes", image.len());
            store
                .upload_image(image)
                .await
                .map_err(PipelineError::StorageWrite)
        })
        .await
        .map_err(|err| {
            *stage = fan_out_failure_stage(&err);
            err
        })?;

        advance(stage, Stage::AssemblingResult);
        for (slot, rel_path) in stored {
            let recipe = collection.recipes.get_mut(slot).ok_or_else(|| {
                PipelineError::MalformedModelOutput(format!("no recipe for image {slot}"))
            })?;
            recipe.id = Some(uuid::Uuid::new_v4().to_string());
            recipe.image_reference = Some(format!("/{}", rel_path));
        }

        advance(stage, Stage::Done);
        Ok(collection)
    }
}

/// The generate-and-store fan-out covers two stages; the error kind says which one failed.
fn fan_out_failure_stage(err: &PipelineError) -> Stage {
    match err {
        PipelineError::StorageWrite(_) => Stage::PersistingImages,
        _ => Stage::GeneratingImages,
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    tracing::info!("Pipeline stage {} -> {}", stage, next);
    *stage = next;
}

/// Reject recipes that use an allergen, and flag ones that stray from the pantry.
fn check_ingredients(
    request: &GenerationRequest,
    collection: &RecipeCollection,
) -> PipelineResult<()> {
    for recipe in &collection.recipes {
        let allergens = recipe.allergens(&request.allergies);
        if !allergens.is_empty() {
            return Err(PipelineError::MalformedModelOutput(format!(
                "recipe {:?} uses allergens {:?}",
                recipe.title, allergens
            )));
        }
        let foreign = recipe
            .ingredients
            .iter()
            .filter(|i| {
                !request
                    .ingredients
                    .iter()
                    .any(|available| same_ingredient(available, i))
            })
            .collect::<Vec<_>>();
        if !foreign.is_empty() {
            tracing::warn!(
                "Recipe {:?} uses ingredients that weren't offered: {:?}",
                recipe.title,
                foreign
            );
        }
    }
    Ok(())
}
