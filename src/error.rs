//! Engine error types

use thiserror::Error;

use crate::models::RecipeId;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("recipe {0} not found")]
    UnknownRecipe(RecipeId),

    #[error("recipe cycle detected: {}", format_path(.path))]
    CycleDetected { path: Vec<RecipeId> },

    #[error("invalid selection '{0}', expected <recipe-id>:<quantity>")]
    InvalidSelection(String),
}

fn format_path(path: &[RecipeId]) -> String {
    path.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_lists_path() {
        let err = EngineError::CycleDetected { path: vec![1, 2, 1] };
        assert_eq!(err.to_string(), "recipe cycle detected: 1 -> 2 -> 1");
    }
}
