use anyhow::Context;
use sqlx::{
    Sqlite,
    pool::PoolConnection,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous},
};
use tokio::fs as async_fs;
use uuid::Uuid;

use std::path::{Path, PathBuf};

use crate::models::CropBlob;

const DB_FILE_NAME: &str = "civic.db";
const MEDIA_DIR_NAME: &str = "media";
/// Uploaded report photos
pub const PHOTO_DIR_NAME: &str = "ftp";
/// Crops written by the classifier
pub const CROP_DIR_NAME: &str = "cropped_objects";

pub(super) struct DbState {
    data_dir: PathBuf,
    pool: SqlitePool,
}

impl std::fmt::Debug for DbState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbState")
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

impl DbState {
    pub(super) async fn new<P: AsRef<Path>>(data_dir: P) -> anyhow::Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        let media_dir = data_dir.join(MEDIA_DIR_NAME);

        for dir in [PHOTO_DIR_NAME, CROP_DIR_NAME] {
            async_fs::create_dir_all(media_dir.join(dir))
                .await
                .with_context(|| format!("Failed to create media directory under {:?}", media_dir))?;
        }

        let connect_opts = SqliteConnectOptions::new()
            .filename(data_dir.join(DB_FILE_NAME))
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_opts)
            .await
            .with_context(|| format!("Failed to open database in {:?}", data_dir))?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { data_dir, pool })
    }

    pub(super) fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub(super) async fn conn(&self) -> anyhow::Result<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    pub(super) fn media_path(&self, dir: &str, fname: &str) -> PathBuf {
        self.data_dir.join(MEDIA_DIR_NAME).join(dir).join(fname)
    }

    /// Copy a report photo into the media store, returning the filename used.
    pub(super) async fn store_photo<P: AsRef<Path>>(&self, photo_path: P) -> anyhow::Result<String> {
        let photo_path = photo_path.as_ref();
        let fname = match photo_path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext.to_lowercase()),
            None => Uuid::new_v4().to_string(),
        };
        let dest_path = self.media_path(PHOTO_DIR_NAME, &fname);
        async_fs::copy(photo_path, &dest_path)
            .await
            .with_context(|| format!(
                "Failed to copy report photo from {:?} to {:?}",
                photo_path, dest_path
            ))?;
        Ok(fname)
    }

    pub(super) async fn store_crop(&self, crop: &CropBlob) -> anyhow::Result<()> {
        let dest_path = self.media_path(CROP_DIR_NAME, &crop.file_name);
        async_fs::write(&dest_path, &crop.bytes)
            .await
            .with_context(|| format!("Failed to write crop {:?}", dest_path))?;
        Ok(())
    }

    /// Remove a media file; one that is already gone is not an error.
    pub(super) async fn delete_media(&self, dir: &str, fname: &str) -> anyhow::Result<()> {
        let path = self.media_path(dir, fname);
        match async_fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete media file {:?}", path)),
        }
    }

    /// Checkpoint the WAL into the main database file and close the pool.
    pub(super) async fn close(&self) -> anyhow::Result<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE);")
            .execute(&self.pool)
            .await?;
        self.pool.close().await;
        Ok(())
    }
}
