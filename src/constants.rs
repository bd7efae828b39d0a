use std::time::Duration;

// Ephemeral container defaults
pub const POSTGRES_IMAGE: &str = "postgres:15-alpine";
pub const CONTAINER_DATABASE: &str = "testdb";
pub const CONTAINER_USER: &str = "testuser";
pub const CONTAINER_PASSWORD: &str = "testpass";
pub const CONTAINER_NAME_PREFIX: &str = "migration_harness";
pub const POSTGRES_CONTAINER_PORT: &str = "5432/tcp";
pub const CONTAINER_HOST_IP: &str = "127.0.0.1";
pub const CONTAINER_BIND_ALL_IP: &str = "0.0.0.0";

// Postgres prints this once for the init-time server and once for the real one
pub const READINESS_LOG_MESSAGE: &str = "database system is ready to accept connections";
pub const READINESS_LOG_OCCURRENCES: usize = 2;
pub const CONTAINER_STARTUP_TIMEOUT: Duration = Duration::from_secs(5 * 60);

// Existing database settings
pub const EXISTING_DB_PORT: u16 = 5432;
pub const DEFAULT_SSL_MODE: &str = "disable";
pub const DEFAULT_DB_HOST: &str = "localhost";
pub const DEFAULT_DB_USER: &str = "postgres";
pub const DEFAULT_DB_PASSWORD: &str = "password";
pub const DEFAULT_DB_NAME: &str = "postgres";

// Environment variable names
pub const ENV_DB_HOST: &str = "DB_HOST";
pub const ENV_DB_USER: &str = "DB_USER";
pub const ENV_DB_PASSWORD: &str = "DB_PASSWORD";
pub const ENV_DB_NAME: &str = "DB_NAME";
pub const ENV_USE_EXISTING_DB: &str = "USE_EXISTING_DB";
pub const ENV_KEEP_CONTAINER_ON_FAILURE: &str = "HARNESS_KEEP_CONTAINER_ON_FAILURE";

// Connection behaviour
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const MAX_POOL_CONNECTIONS: u32 = 2;

// Table naming
pub const DEFAULT_TABLE_PREFIX: &str = "test_users";
pub const BENCH_TABLE_PREFIX: &str = "bench_users";
pub const TABLE_NAME_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const TABLE_NAME_RANDOM_BOUND: u32 = 10_000;
pub const MAX_IDENTIFIER_LENGTH: usize = 63;
