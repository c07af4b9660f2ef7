use sqlx::{Executor, Result, Sqlite, SqlitePool};

use super::ItemRecord;

/// 按序号顺序读取所有已索引的图片
pub async fn get_indexed_items<'c, E>(executor: E) -> Result<Vec<ItemRecord>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, ItemRecord>(
        r#"
        SELECT * FROM item WHERE ordinal IS NOT NULL ORDER BY ordinal ASC
        "#,
    )
    .fetch_all(executor)
    .await
}

/// 读取所有等待重建的图片
pub async fn get_orphaned_items<'c, E>(executor: E) -> Result<Vec<ItemRecord>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, ItemRecord>(
        r#"
        SELECT * FROM item WHERE ordinal IS NULL ORDER BY path ASC
        "#,
    )
    .fetch_all(executor)
    .await
}

/// 在一个事务中用 records 替换全部图片记录
pub async fn replace_items(executor: &SqlitePool, records: &[ItemRecord]) -> Result<()> {
    let mut tx = executor.begin().await?;
    sqlx::query("DELETE FROM item").execute(&mut *tx).await?;
    for record in records {
        sqlx::query(
            r#"
            INSERT INTO item (path, ordinal, width, height, format, size_bytes, captured_at, hash, tags)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.path)
        .bind(record.ordinal)
        .bind(record.width)
        .bind(record.height)
        .bind(&record.format)
        .bind(record.size_bytes)
        .bind(record.captured_at)
        .bind(&record.hash)
        .bind(&record.tags)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}
