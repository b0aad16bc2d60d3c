use crosspoint_core::model::{Category, Question, QuestionId, QuestionStatus, UserId};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    u64::try_from(v)
        .map(QuestionId::new)
        .map_err(|_| StorageError::Serialization("question_id sign overflow".into()))
}

pub(crate) fn limit_to_i64(limit: usize) -> Result<i64, StorageError> {
    i64::try_from(limit).map_err(|_| StorageError::Serialization("limit overflow".into()))
}

pub(crate) fn user_id_from_row(row: &SqliteRow, column: &str) -> Result<UserId, StorageError> {
    UserId::new(row.try_get::<String, _>(column).map_err(ser)?).map_err(ser)
}

pub(crate) fn category_from_row(row: &SqliteRow, column: &str) -> Result<Category, StorageError> {
    Category::new(row.try_get::<String, _>(column).map_err(ser)?).map_err(ser)
}

pub(crate) fn map_question_row(row: &SqliteRow) -> Result<Question, StorageError> {
    let status: String = row.try_get("status").map_err(ser)?;
    Question::from_persisted(
        question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        row.try_get::<String, _>("title").map_err(ser)?,
        row.try_get::<String, _>("body").map_err(ser)?,
        user_id_from_row(row, "author_id")?,
        category_from_row(row, "category")?,
        QuestionStatus::parse(&status).map_err(ser)?,
        row.try_get("created_at").map_err(ser)?,
        row.try_get::<i64, _>("created_at_ms").map_err(ser)?,
    )
    .map_err(ser)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_ids_are_rejected() {
        assert!(question_id_from_i64(-1).is_err());
        assert_eq!(question_id_from_i64(7).unwrap(), QuestionId::new(7));
    }
}
