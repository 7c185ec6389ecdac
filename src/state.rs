use std::sync::Arc;

use tracing::info;

use crate::{
    auth::repo::{JsonUserStore, PgUserStore, UserStore},
    config::{AppConfig, UploadBackend},
    db,
    feedback::repo::{FeedbackStore, JsonFeedbackStore, PgFeedbackStore},
    json_file::JsonFile,
    storage::{LocalStorage, S3Storage, StorageClient},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub feedback: Arc<dyn FeedbackStore>,
    pub uploads: Arc<dyn StorageClient>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let (users, feedback) = match &config.database_url {
            Some(url) => {
                let pool = db::connect(url).await?;
                db::migrate(&pool).await?;
                info!("using postgres for users and feedback");
                (
                    Arc::new(PgUserStore::new(pool.clone())) as Arc<dyn UserStore>,
                    Arc::new(PgFeedbackStore::new(pool)) as Arc<dyn FeedbackStore>,
                )
            }
            None => {
                info!(data_dir = %config.data_dir.display(), "using json files for users and feedback");
                (
                    Arc::new(JsonUserStore::new(JsonFile::new(config.users_file())))
                        as Arc<dyn UserStore>,
                    Arc::new(JsonFeedbackStore::new(JsonFile::new(config.feedback_file())))
                        as Arc<dyn FeedbackStore>,
                )
            }
        };

        let uploads = match &config.uploads {
            UploadBackend::Local => {
                info!(upload_dir = %config.upload_dir.display(), "storing uploads on disk");
                Arc::new(LocalStorage::new(&config.upload_dir).await?) as Arc<dyn StorageClient>
            }
            UploadBackend::S3(s3) => {
                info!(bucket = %s3.bucket, "storing uploads in s3");
                Arc::new(S3Storage::new(s3).await?) as Arc<dyn StorageClient>
            }
        };

        Ok(Self::from_parts(config, users, feedback, uploads))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        feedback: Arc<dyn FeedbackStore>,
        uploads: Arc<dyn StorageClient>,
    ) -> Self {
        Self {
            config,
            users,
            feedback,
            uploads,
        }
    }
}
