use crate::config::types::*;
use crate::constants::*;

impl Default for ContainerSpec {
    fn default() -> Self {
        Self {
            image: POSTGRES_IMAGE.to_string(),
            database: CONTAINER_DATABASE.to_string(),
            user: CONTAINER_USER.to_string(),
            password: CONTAINER_PASSWORD.to_string(),
            readiness_message: READINESS_LOG_MESSAGE.to_string(),
            readiness_occurrences: READINESS_LOG_OCCURRENCES,
            startup_timeout: CONTAINER_STARTUP_TIMEOUT,
            container_name: None,
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_DB_HOST.to_string(),
            port: EXISTING_DB_PORT,
            user: DEFAULT_DB_USER.to_string(),
            password: DEFAULT_DB_PASSWORD.to_string(),
            database: DEFAULT_DB_NAME.to_string(),
            ssl_mode: DEFAULT_SSL_MODE.to_string(),
        }
    }
}
