use sea_orm::entity::prelude::DateTimeWithTimeZone;
use sea_orm::EntityTrait;
use uuid::Uuid;

pub trait HasIdActiveModel {
    fn set_id(&mut self, id: Uuid);
}

/// Entities without an `updated_at` column keep the default no-op.
pub trait TimestampedActiveModel {
    fn set_created_at(&mut self, ts: DateTimeWithTimeZone);

    fn set_updated_at(&mut self, _ts: DateTimeWithTimeZone) {}
}

pub trait HasCreatedAtColumn: EntityTrait {
    fn created_at_column() -> Self::Column;
}
