use serde::{Deserialize, Serialize};

/// A recipe as cached locally.
///
/// `timestamp` is Unix seconds of the last full (single-recipe) refresh. Search
/// results arrive without ingredients and with a zero timestamp, so a row that
/// was only ever seen in a search is always eligible for refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Recipe {
    pub recipe_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub social_rank: f32,
    #[serde(default)]
    pub timestamp: i64,
}

impl Recipe {
    /// Seconds elapsed since the row was last stamped.
    pub fn age_secs(&self, now: i64) -> i64 {
        now - self.timestamp
    }

    /// Case-insensitive match against the title or any ingredient.
    pub fn matches(&self, query_lower: &str) -> bool {
        self.title.to_lowercase().contains(query_lower)
            || self
                .ingredients
                .iter()
                .any(|i| i.to_lowercase().contains(query_lower))
    }

    pub fn update_fields(&self) -> RecipeUpdate {
        RecipeUpdate {
            title: self.title.clone(),
            publisher: self.publisher.clone(),
            image_url: self.image_url.clone(),
            social_rank: self.social_rank,
        }
    }
}

/// Fields refreshed on an existing row when a search result conflicts with it.
/// Ingredients and the refresh timestamp are left untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeUpdate {
    pub title: String,
    pub publisher: String,
    pub image_url: String,
    pub social_rank: f32,
}

impl RecipeUpdate {
    pub fn apply(&self, recipe: &mut Recipe) {
        recipe.title.clone_from(&self.title);
        recipe.publisher.clone_from(&self.publisher);
        recipe.image_url.clone_from(&self.image_url);
        recipe.social_rank = self.social_rank;
    }
}

/// Response from `GET /api/search`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipeSearchResponse {
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub recipes: Vec<Recipe>,
}

/// Response from `GET /api/get`. The catalog answers `{"recipe": null}` for
/// ids it doesn't know.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipeResponse {
    #[serde(default)]
    pub recipe: Option<Recipe>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipe(title: &str, ingredients: &[&str]) -> Recipe {
        Recipe {
            recipe_id: "1".to_string(),
            title: title.to_string(),
            publisher: "pub".to_string(),
            ingredients: ingredients.iter().map(|s| s.to_string()).collect(),
            image_url: String::new(),
            social_rank: 50.0,
            timestamp: 0,
        }
    }

    #[test]
    fn test_matches_title_and_ingredients() {
        let r = recipe("Chicken Curry", &["2 cups Rice", "Garlic"]);
        assert!(r.matches("chicken"));
        assert!(r.matches("rice"));
        assert!(!r.matches("pasta"));
    }

    #[test]
    fn test_update_keeps_ingredients_and_timestamp() {
        let mut r = recipe("Old", &["salt"]);
        r.timestamp = 42;
        let update = RecipeUpdate {
            title: "New".to_string(),
            publisher: "Other".to_string(),
            image_url: "http://img".to_string(),
            social_rank: 99.5,
        };
        update.apply(&mut r);
        assert_eq!(r.title, "New");
        assert_eq!(r.social_rank, 99.5);
        assert_eq!(r.ingredients, vec!["salt".to_string()]);
        assert_eq!(r.timestamp, 42);
    }

    #[test]
    fn test_parse_search_response_without_timestamp() {
        let json = r#"{"count": 1, "recipes": [{"recipe_id": "35382", "title": "Jalapeno Popper Grilled Cheese Sandwich", "publisher": "Closet Cooking", "image_url": "http://img/35382.jpg", "social_rank": 100.0}]}"#;
        let parsed: RecipeSearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.count, 1);
        assert_eq!(parsed.recipes[0].recipe_id, "35382");
        assert!(parsed.recipes[0].ingredients.is_empty());
        assert_eq!(parsed.recipes[0].timestamp, 0);
    }

    #[test]
    fn test_parse_null_recipe() {
        let parsed: RecipeResponse = serde_json::from_str(r#"{"recipe": null}"#).unwrap();
        assert!(parsed.recipe.is_none());
    }
}
