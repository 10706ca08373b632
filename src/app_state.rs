use crate::config::Config;
use crate::services::auth::AuthService;
use crate::services::queue::QueueService;
use sea_orm::DatabaseConnection;

pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Config,
    pub auth: AuthService,
    pub queue: QueueService,
}
