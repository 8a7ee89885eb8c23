//! Consolidation exception keywords and detection keyword overrides

use crate::matching::patterns::DetectionKeywordRow;
use crate::models::{ExceptionBehavior, ExceptionKeyword, KeywordCreateRequest};
use anyhow::Result;
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

pub async fn list_exception_keywords(
    pool: &Pool<Sqlite>,
    enabled_only: bool,
) -> Result<Vec<ExceptionKeyword>> {
    let query = if enabled_only {
        "SELECT * FROM consolidation_exception_keywords WHERE enabled = 1 ORDER BY label"
    } else {
        "SELECT * FROM consolidation_exception_keywords ORDER BY label"
    };
    Ok(sqlx::query_as(query).fetch_all(pool).await?)
}

pub async fn create_exception_keyword(
    pool: &Pool<Sqlite>,
    req: &KeywordCreateRequest,
) -> Result<ExceptionKeyword> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO consolidation_exception_keywords (id, label, match_terms, behavior, enabled)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(&req.label)
    .bind(&req.match_terms)
    .bind(req.behavior)
    .bind(req.enabled)
    .execute(pool)
    .await?;

    Ok(
        sqlx::query_as("SELECT * FROM consolidation_exception_keywords WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await?,
    )
}

pub async fn update_exception_keyword(
    pool: &Pool<Sqlite>,
    id: Uuid,
    req: &KeywordCreateRequest,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE consolidation_exception_keywords
         SET label = ?, match_terms = ?, behavior = ?, enabled = ?
         WHERE id = ?",
    )
    .bind(&req.label)
    .bind(&req.match_terms)
    .bind(req.behavior)
    .bind(req.enabled)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_exception_keyword(pool: &Pool<Sqlite>, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM consolidation_exception_keywords WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// First enabled keyword whose match terms appear in the stream name.
/// Returns the label and behavior.
pub fn check_exception_keyword(
    stream_name: &str,
    keywords: &[ExceptionKeyword],
) -> Option<(String, ExceptionBehavior)> {
    let name_lower = stream_name.to_lowercase();
    for keyword in keywords.iter().filter(|k| k.enabled) {
        for term in keyword.match_term_list() {
            if name_lower.contains(&term.to_lowercase()) {
                return Some((keyword.label.clone(), keyword.behavior));
            }
        }
    }
    None
}

/// Enabled detection keyword overrides for the classifier pattern tables.
pub async fn list_detection_keywords(pool: &Pool<Sqlite>) -> Result<Vec<DetectionKeywordRow>> {
    let rows: Vec<(String, String, Option<String>)> = sqlx::query_as(
        "SELECT category, pattern, value FROM detection_keywords WHERE enabled = 1",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(category, pattern, value)| DetectionKeywordRow {
            category,
            pattern,
            value,
        })
        .collect())
}

pub async fn create_detection_keyword(
    pool: &Pool<Sqlite>,
    category: &str,
    pattern: &str,
    value: Option<&str>,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO detection_keywords (id, category, pattern, value) VALUES (?, ?, ?, ?)",
    )
    .bind(id)
    .bind(category)
    .bind(pattern)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn delete_detection_keyword(pool: &Pool<Sqlite>, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM detection_keywords WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn keyword(label: &str, terms: &str, behavior: ExceptionBehavior) -> ExceptionKeyword {
        ExceptionKeyword {
            id: Uuid::new_v4(),
            label: label.to_string(),
            match_terms: terms.to_string(),
            behavior,
            enabled: true,
            created_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn test_keyword_matching_any_term() {
        let keywords = vec![keyword(
            "Spanish",
            "Spanish, En Español",
            ExceptionBehavior::Consolidate,
        )];
        let result = check_exception_keyword("Lions @ Packers En Español", &keywords);
        assert_eq!(
            result,
            Some(("Spanish".to_string(), ExceptionBehavior::Consolidate))
        );
        assert!(check_exception_keyword("Lions @ Packers", &keywords).is_none());
    }

    #[test]
    fn test_disabled_keywords_skipped() {
        let mut kw = keyword("Spanish", "Spanish", ExceptionBehavior::Ignore);
        kw.enabled = false;
        assert!(check_exception_keyword("Lions Spanish", &[kw]).is_none());
    }
}
