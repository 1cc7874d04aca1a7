//! Migration: Create todos table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TABLE todos (
                    id SERIAL PRIMARY KEY,
                    title VARCHAR(500) NOT NULL,
                    is_completed BOOLEAN NOT NULL DEFAULT FALSE,
                    order_index BIGINT NOT NULL DEFAULT 0,

                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                -- List ordering
                CREATE INDEX idx_todos_order_index
                    ON todos(order_index, id);

                -- Trigger to update updated_at
                CREATE TRIGGER update_todos_updated_at
                    BEFORE UPDATE ON todos
                    FOR EACH ROW
                    EXECUTE FUNCTION update_updated_at_column();
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                DROP TRIGGER IF EXISTS update_todos_updated_at ON todos;
                DROP TABLE IF EXISTS todos CASCADE;
                "#,
            )
            .await?;

        Ok(())
    }
}
