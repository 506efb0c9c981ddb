use serde::{Deserialize, Serialize};

use crate::{Category, ValidationError};

/// Longest accepted piece or model text, in characters.
pub const MAX_FIELD_LEN: usize = 200;

const KEY_SEPARATOR: char = '\u{1f}';

/// Validated search query.
///
/// Piece and model are trimmed and non-empty. The category is a filter hint
/// passed to adapters and does not take part in query equivalence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    piece: String,
    model: String,
    category: Option<Category>,
}

impl SearchQuery {
    pub fn new(piece: impl AsRef<str>, model: impl AsRef<str>) -> Result<Self, ValidationError> {
        let piece = piece.as_ref().trim();
        let model = model.as_ref().trim();

        if piece.is_empty() {
            return Err(ValidationError::MissingPiece);
        }
        if model.is_empty() {
            return Err(ValidationError::MissingModel);
        }
        check_field("piece", piece)?;
        check_field("model", model)?;

        Ok(Self {
            piece: piece.to_owned(),
            model: model.to_owned(),
            category: None,
        })
    }

    #[must_use]
    pub fn with_category(mut self, category: Option<Category>) -> Self {
        self.category = category;
        self
    }

    pub fn piece(&self) -> &str {
        &self.piece
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub const fn category(&self) -> Option<Category> {
        self.category
    }

    /// Free text sent to upstream search endpoints: `"<piece> <model>"`.
    pub fn search_text(&self) -> String {
        format!("{} {}", self.piece, self.model)
    }

    /// Case-folded piece and model used to derive cache keys, joined by the
    /// ASCII unit separator. Validation keeps control characters out of both
    /// fields, so distinct pairs never share key material.
    pub fn normalized_key_material(&self) -> String {
        format!(
            "{}{KEY_SEPARATOR}{}",
            self.piece.to_lowercase(),
            self.model.to_lowercase()
        )
    }

    /// Two queries are equivalent when their trimmed, lowercased piece and model match.
    pub fn is_equivalent(&self, other: &Self) -> bool {
        self.normalized_key_material() == other.normalized_key_material()
    }
}

fn check_field(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.chars().any(char::is_control) {
        return Err(ValidationError::ControlCharacter { field });
    }
    let len = value.chars().count();
    if len > MAX_FIELD_LEN {
        return Err(ValidationError::FieldTooLong {
            field,
            len,
            max: MAX_FIELD_LEN,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_rejects_blank_fields() {
        let query = SearchQuery::new("  pastillas de freno ", "Toyota Yaris 2015").expect("valid");
        assert_eq!(query.piece(), "pastillas de freno");
        assert_eq!(query.search_text(), "pastillas de freno Toyota Yaris 2015");

        assert_eq!(
            SearchQuery::new("   ", "Yaris").expect_err("blank piece"),
            ValidationError::MissingPiece
        );
        assert_eq!(
            SearchQuery::new("filtro", "").expect_err("blank model"),
            ValidationError::MissingModel
        );
    }

    #[test]
    fn equivalence_ignores_case_whitespace_and_category() {
        let a = SearchQuery::new("Filtro Aceite", " Kia Rio ").expect("valid");
        let b = SearchQuery::new("filtro aceite", "KIA RIO")
            .expect("valid")
            .with_category(Some(Category::Engine));
        assert!(a.is_equivalent(&b));
        assert_eq!(a.normalized_key_material(), "filtro aceite\u{1f}kia rio");
    }

    #[test]
    fn underscores_in_fields_do_not_make_queries_collide() {
        let left = SearchQuery::new("a_b", "c").expect("valid");
        let right = SearchQuery::new("a", "b_c").expect("valid");
        assert!(!left.is_equivalent(&right));
        assert_ne!(left.normalized_key_material(), right.normalized_key_material());

        assert_eq!(
            SearchQuery::new("a\u{1f}b", "c"),
            Err(ValidationError::ControlCharacter { field: "piece" })
        );
    }

    #[test]
    fn rejects_oversized_fields() {
        let long = "x".repeat(MAX_FIELD_LEN + 1);
        let err = SearchQuery::new(long, "Yaris").expect_err("too long");
        assert!(matches!(err, ValidationError::FieldTooLong { field: "piece", .. }));
    }
}
