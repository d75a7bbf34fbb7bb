use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::sea_query::{Expr, ExprTrait};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, Set};
use uuid::Uuid;

use super::base_traits::{HasCreatedAtColumn, HasIdActiveModel, TimestampedActiveModel};
use super::{DaoBase, DaoLayerError, DaoResult, PaginatedResponse};
use crate::db::entities::file::{self, Entity as File};

impl HasCreatedAtColumn for File {
    fn created_at_column() -> file::Column {
        file::Column::CreatedAt
    }
}

impl HasIdActiveModel for file::ActiveModel {
    fn set_id(&mut self, id: Uuid) {
        self.file_id = Set(id);
    }
}

impl TimestampedActiveModel for file::ActiveModel {
    fn set_created_at(&mut self, ts: sea_orm::entity::prelude::DateTimeWithTimeZone) {
        self.created_at = Set(ts);
    }

    fn set_updated_at(&mut self, ts: sea_orm::entity::prelude::DateTimeWithTimeZone) {
        self.updated_at = Set(ts);
    }
}

pub struct NewFile<'a> {
    pub user_id: Uuid,
    pub filename: &'a str,
    pub storage_key: &'a str,
    pub mime_type: &'a str,
    pub size_bytes: i64,
    pub checksum: &'a str,
    pub tags: Vec<String>,
}

#[derive(Clone)]
pub struct FileDao {
    db: DatabaseConnection,
}

impl DaoBase for FileDao {
    type Entity = File;

    fn new(db: &DatabaseConnection) -> Self {
        Self { db: db.clone() }
    }

    fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

impl FileDao {
    pub async fn create_file(&self, new: NewFile<'_>) -> DaoResult<file::Model> {
        let model = file::ActiveModel {
            user_id: Set(new.user_id),
            filename: Set(new.filename.to_string()),
            storage_key: Set(new.storage_key.to_string()),
            mime_type: Set(new.mime_type.to_string()),
            size_bytes: Set(new.size_bytes),
            visibility: Set(crate::services::Visibility::Private.as_str().to_string()),
            thumbnail_key: Set(None),
            checksum: Set(new.checksum.to_string()),
            tags: Set(new.tags),
            is_deleted: Set(false),
            deleted_at: Set(None),
            version: Set(1),
            ..Default::default()
        };
        self.create(model).await
    }

    /// Primary-key lookup filtering out tombstoned rows; a soft-deleted file
    /// behaves exactly like a missing one.
    pub async fn find_live(&self, file_id: &Uuid) -> DaoResult<Option<file::Model>> {
        File::find()
            .filter(file::Column::FileId.eq(*file_id))
            .filter(file::Column::IsDeleted.eq(false))
            .one(&self.db)
            .await
            .map_err(DaoLayerError::Db)
    }

    /// Dedup probe: number of live rows with the same owner and checksum.
    pub async fn count_by_owner_checksum(
        &self,
        user_id: &Uuid,
        checksum: &str,
    ) -> DaoResult<u64> {
        self.count(|query| {
            query
                .filter(file::Column::UserId.eq(*user_id))
                .filter(file::Column::Checksum.eq(checksum))
                .filter(file::Column::IsDeleted.eq(false))
        })
        .await
    }

    pub async fn list_public(
        &self,
        page: u64,
        page_size: u64,
    ) -> DaoResult<PaginatedResponse<file::Model>> {
        self.find(page, page_size, None, |query| {
            query
                .filter(
                    file::Column::Visibility.eq(crate::services::Visibility::Public.as_str()),
                )
                .filter(file::Column::IsDeleted.eq(false))
        })
        .await
    }

    pub async fn count_public(&self) -> DaoResult<u64> {
        self.count(|query| {
            query
                .filter(
                    file::Column::Visibility.eq(crate::services::Visibility::Public.as_str()),
                )
                .filter(file::Column::IsDeleted.eq(false))
        })
        .await
    }

    pub async fn list_user(
        &self,
        user_id: &Uuid,
        page: u64,
        page_size: u64,
    ) -> DaoResult<PaginatedResponse<file::Model>> {
        let user_id = *user_id;
        self.find(page, page_size, None, move |query| {
            query
                .filter(file::Column::UserId.eq(user_id))
                .filter(file::Column::IsDeleted.eq(false))
        })
        .await
    }

    pub async fn count_user(&self, user_id: &Uuid) -> DaoResult<u64> {
        let user_id = *user_id;
        self.count(move |query| {
            query
                .filter(file::Column::UserId.eq(user_id))
                .filter(file::Column::IsDeleted.eq(false))
        })
        .await
    }

    pub async fn set_visibility(
        &self,
        file_id: &Uuid,
        version: i32,
        visibility: &str,
    ) -> DaoResult<u64> {
        let result = File::update_many()
            .col_expr(file::Column::Visibility, Expr::value(visibility.to_string()))
            .col_expr(
                file::Column::Version,
                Expr::col(file::Column::Version).add(1),
            )
            .col_expr(
                file::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(file::Column::FileId.eq(*file_id))
            .filter(file::Column::Version.eq(version))
            .filter(file::Column::IsDeleted.eq(false))
            .exec(&self.db)
            .await
            .map_err(DaoLayerError::Db)?;
        Ok(result.rows_affected)
    }

    pub async fn rename(&self, file_id: &Uuid, version: i32, filename: &str) -> DaoResult<u64> {
        let result = File::update_many()
            .col_expr(file::Column::Filename, Expr::value(filename.to_string()))
            .col_expr(
                file::Column::Version,
                Expr::col(file::Column::Version).add(1),
            )
            .col_expr(
                file::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(file::Column::FileId.eq(*file_id))
            .filter(file::Column::Version.eq(version))
            .filter(file::Column::IsDeleted.eq(false))
            .exec(&self.db)
            .await
            .map_err(DaoLayerError::Db)?;
        Ok(result.rows_affected)
    }

    pub async fn soft_delete(
        &self,
        file_id: &Uuid,
        version: i32,
        deleted_at: DateTime<FixedOffset>,
    ) -> DaoResult<u64> {
        let result = File::update_many()
            .col_expr(file::Column::IsDeleted, Expr::value(true))
            .col_expr(file::Column::DeletedAt, Expr::value(Some(deleted_at)))
            .col_expr(
                file::Column::Version,
                Expr::col(file::Column::Version).add(1),
            )
            .col_expr(
                file::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(file::Column::FileId.eq(*file_id))
            .filter(file::Column::Version.eq(version))
            .filter(file::Column::IsDeleted.eq(false))
            .exec(&self.db)
            .await
            .map_err(DaoLayerError::Db)?;
        Ok(result.rows_affected)
    }

    /// Written by the thumbnail worker only after the object exists. A row
    /// soft-deleted while the job ran is left untouched; zero rows affected
    /// tells the worker the file is gone.
    pub async fn set_thumbnail_key(&self, file_id: &Uuid, thumbnail_key: &str) -> DaoResult<u64> {
        let result = File::update_many()
            .col_expr(
                file::Column::ThumbnailKey,
                Expr::value(Some(thumbnail_key.to_string())),
            )
            .col_expr(
                file::Column::Version,
                Expr::col(file::Column::Version).add(1),
            )
            .col_expr(
                file::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(file::Column::FileId.eq(*file_id))
            .filter(file::Column::IsDeleted.eq(false))
            .exec(&self.db)
            .await
            .map_err(DaoLayerError::Db)?;
        Ok(result.rows_affected)
    }

    /// Tombstoned rows whose retention window has elapsed, oldest first.
    pub async fn find_expired_deleted(&self, limit: u64) -> DaoResult<Vec<file::Model>> {
        File::find()
            .filter(file::Column::IsDeleted.eq(true))
            .filter(file::Column::DeletedAt.lt(Utc::now().fixed_offset()))
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(DaoLayerError::Db)
    }

    pub async fn hard_delete(&self, file_ids: &[Uuid]) -> DaoResult<u64> {
        if file_ids.is_empty() {
            return Ok(0);
        }
        let result = File::delete_many()
            .filter(file::Column::FileId.is_in(file_ids.to_vec()))
            .exec(&self.db)
            .await
            .map_err(DaoLayerError::Db)?;
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, FixedOffset, TimeZone, Utc};
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use uuid::Uuid;

    use super::{DaoBase, FileDao};
    use crate::db::entities::file;

    fn ts() -> chrono::DateTime<chrono::FixedOffset> {
        FixedOffset::east_opt(0)
            .expect("offset should be valid")
            .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
            .single()
            .expect("timestamp should be valid")
    }

    fn file_model(user_id: Uuid, visibility: &str) -> file::Model {
        let now = ts();
        file::Model {
            file_id: Uuid::new_v4(),
            user_id,
            filename: "test_doc.txt".to_string(),
            storage_key: format!("users/{user_id}/{}.txt", Uuid::new_v4()),
            mime_type: "text/plain".to_string(),
            size_bytes: 46,
            visibility: visibility.to_string(),
            thumbnail_key: None,
            checksum: "a".repeat(64),
            tags: vec![],
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    #[tokio::test]
    async fn find_live_filters_out_tombstones() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<file::Model>::new()])
            .into_connection();
        let dao = FileDao::new(&db);

        let found = dao
            .find_live(&Uuid::new_v4())
            .await
            .expect("query should succeed");
        assert!(found.is_none());

        let sql = db
            .into_transaction_log()
            .first()
            .map(|txn| format!("{:?}", txn).to_lowercase())
            .expect("expected one statement");
        assert!(sql.contains("is_deleted"));
    }

    #[tokio::test]
    async fn set_visibility_guards_on_version_and_liveness() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();
        let dao = FileDao::new(&db);

        let rows = dao
            .set_visibility(&Uuid::new_v4(), 5, "public")
            .await
            .expect("update should succeed");
        assert_eq!(rows, 0);

        let sql = db
            .into_transaction_log()
            .first()
            .map(|txn| format!("{:?}", txn).to_lowercase())
            .expect("expected one statement");
        assert!(sql.contains("version") && sql.contains("is_deleted"));
    }

    #[tokio::test]
    async fn soft_delete_sets_tombstone_columns() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();
        let dao = FileDao::new(&db);

        let deleted_at = Utc::now().fixed_offset() + Duration::days(7);
        let rows = dao
            .soft_delete(&Uuid::new_v4(), 1, deleted_at)
            .await
            .expect("update should succeed");
        assert_eq!(rows, 1);

        let sql = db
            .into_transaction_log()
            .first()
            .map(|txn| format!("{:?}", txn).to_lowercase())
            .expect("expected one statement");
        assert!(sql.contains("deleted_at"));
    }

    #[tokio::test]
    async fn set_thumbnail_key_skips_tombstoned_rows() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();
        let dao = FileDao::new(&db);

        let rows = dao
            .set_thumbnail_key(&Uuid::new_v4(), "thumbnails/x.jpg")
            .await
            .expect("update should succeed");
        assert_eq!(rows, 0);

        let sql = db
            .into_transaction_log()
            .first()
            .map(|txn| format!("{:?}", txn).to_lowercase())
            .expect("expected one statement");
        assert!(sql.contains("thumbnail_key") && sql.contains("is_deleted"));
    }

    #[tokio::test]
    async fn hard_delete_short_circuits_on_empty_input() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let dao = FileDao::new(&db);

        let rows = dao.hard_delete(&[]).await.expect("delete should succeed");
        assert_eq!(rows, 0);
        assert!(db.into_transaction_log().is_empty());
    }

    #[tokio::test]
    async fn list_public_orders_by_created_at_desc() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![file_model(Uuid::new_v4(), "public")]])
            .into_connection();
        let dao = FileDao::new(&db);

        let page = dao.list_public(1, 20).await.expect("query should succeed");
        assert_eq!(page.data.len(), 1);

        let sql = db
            .into_transaction_log()
            .first()
            .map(|txn| format!("{:?}", txn).to_lowercase())
            .expect("expected one statement");
        assert!(sql.contains("order by") && sql.contains("created_at") && sql.contains("desc"));
        assert!(sql.contains("visibility"));
    }
}
