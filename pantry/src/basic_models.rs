use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString, IntoStaticStr};

/// What the user has on hand and what they can't or won't eat.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub language: String,
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub allergies: BTreeSet<String>,
    #[serde(default)]
    pub preferences: BTreeSet<String>,
}

#[derive(
    Debug,
    Deserialize,
    Serialize,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumString,
    IntoStaticStr,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// One proposed recipe.
///
/// The model fills in everything except `id` and `image_reference`,
/// which stay empty until the images for the whole collection are stored.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Recipe {
    #[serde(rename = "recipe_title")]
    pub title: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub ingredients: Vec<String>,
    pub optional_ingredients: Vec<String>,
    /// Minutes
    pub preparation_time: u32,
    /// Minutes
    pub cooking_time: u32,
    // The misspelling is what existing frontends read.
    #[serde(rename = "recipee_id", skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "image_url", skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub image_reference: Option<String>,
}

/// Whether two ingredient names are the same, ignoring surrounding space and case in any script.
pub fn same_ingredient(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

impl Recipe {
    /// The text handed to the image model for this recipe.
    pub fn image_prompt(&self) -> String {
        format!("{}.{}", self.title, self.description)
    }

    /// Ingredients of this recipe that appear in `allergies`, ignoring case.
    pub fn allergens<'a>(&'a self, allergies: &'a BTreeSet<String>) -> Vec<&'a str> {
        self.ingredients
            .iter()
            .filter(|ingredient| {
                allergies
                    .iter()
                    .any(|allergy| same_ingredient(allergy, ingredient))
            })
            .map(String::as_str)
            .collect()
    }
}

/// The `{"recipes": [...]}` envelope, both as the model writes it and as it's returned.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct RecipeCollection {
    pub recipes: Vec<Recipe>,
}

impl RecipeCollection {
    pub const MAX_RECIPES: usize = 3;

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}
