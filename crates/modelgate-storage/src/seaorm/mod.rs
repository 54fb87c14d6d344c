mod conversations;
mod providers;

use sea_orm::sea_query::Index;
use sea_orm::{
    ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, EntityTrait, QueryOrder,
    Schema,
};
use tracing::info;

use crate::entities;
use crate::storage::StorageResult;

/// Every repository and store the gateway needs, backed by one SeaORM
/// connection (sqlite, mysql or postgres).
#[derive(Clone)]
pub struct SeaOrmStorage {
    db: DatabaseConnection,
}

impl SeaOrmStorage {
    pub async fn connect(dsn: &str) -> StorageResult<Self> {
        let db = Database::connect(dsn).await?;
        // Cascades rely on sqlite enforcing foreign keys.
        if db.get_database_backend() == DatabaseBackend::Sqlite {
            db.execute_unprepared("PRAGMA foreign_keys = ON").await?;
        }
        Ok(Self { db })
    }

    pub fn from_connection(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Entity-first schema sync; creates missing tables, columns and indexes.
    pub async fn sync(&self) -> StorageResult<()> {
        Schema::new(self.db.get_database_backend())
            .builder()
            .register(entities::Providers)
            .register(entities::ModelCatalogs)
            .register(entities::ProviderModels)
            .register(entities::Conversations)
            .register(entities::Responses)
            .register(entities::ConversationItems)
            .sync(&self.db)
            .await?;
        self.ensure_lookup_indexes().await?;
        info!(event = "storage_synced", backend = ?self.db.get_database_backend());
        Ok(())
    }

    pub async fn health(&self) -> StorageResult<()> {
        entities::Providers::find()
            .order_by_asc(entities::providers::Column::Id)
            .one(&self.db)
            .await?;
        Ok(())
    }

    async fn ensure_lookup_indexes(&self) -> StorageResult<()> {
        use entities::conversation_items::Column as ItemColumn;
        use entities::provider_models::Column as ModelColumn;
        use entities::providers::Column as ProviderColumn;

        let statements = [
            Index::create()
                .name("idx_providers_org_project")
                .table(entities::Providers)
                .col(ProviderColumn::OrganizationId)
                .col(ProviderColumn::ProjectId)
                .if_not_exists()
                .to_owned(),
            Index::create()
                .name("idx_provider_models_key_active")
                .table(entities::ProviderModels)
                .col(ModelColumn::ModelKey)
                .col(ModelColumn::Active)
                .if_not_exists()
                .to_owned(),
            Index::create()
                .name("idx_conversation_items_conversation_id")
                .table(entities::ConversationItems)
                .col(ItemColumn::ConversationId)
                .col(ItemColumn::Id)
                .if_not_exists()
                .to_owned(),
        ];

        for statement in statements {
            self.db.execute(&statement).await?;
        }
        Ok(())
    }
}
