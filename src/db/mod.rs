use std::path::Path;

use log::info;
use sqlx::{SqlitePool, sqlite::*};

pub mod crud;
pub mod model;

pub use model::*;

pub type Database = SqlitePool;

pub async fn init_db(filename: impl AsRef<Path>) -> Result<Database, sqlx::Error> {
    let filename = filename.as_ref();
    info!("初始化数据库连接: {}", filename.display());

    let options = SqliteConnectOptions::new()
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .filename(filename)
        .create_if_missing(true);

    let pool = SqlitePool::connect_with(options).await?;

    info!("检查数据库迁移");
    sqlx::migrate!().run(&pool).await?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;

    #[tokio::test]
    async fn replace_and_reload_items() {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(dir.path().join("test.db")).await.unwrap();

        let mut meta = Metadata::minimal(42);
        meta.tags = vec!["cat".to_owned()];
        let records = vec![
            ItemRecord::new("/b.png", Some(1), &meta),
            ItemRecord::new("/a.png", Some(0), &meta),
            ItemRecord::new("/c.png", None, &Metadata::minimal(1)),
        ];
        crud::replace_items(&db, &records).await.unwrap();

        let live = crud::get_indexed_items(&db).await.unwrap();
        let paths: Vec<_> = live.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, ["/a.png", "/b.png"]);
        let (_, loaded) = live[0].clone().into_item();
        assert_eq!(loaded, meta);

        let orphans = crud::get_orphaned_items(&db).await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].ordinal, None);

        crud::replace_items(&db, &records[..1]).await.unwrap();
        assert_eq!(crud::get_indexed_items(&db).await.unwrap().len(), 1);
        assert!(crud::get_orphaned_items(&db).await.unwrap().is_empty());
    }
}
