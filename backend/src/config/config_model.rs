#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub backend_server: BackendServer,
    pub database: Database,
    pub listing: Listing,
    pub request_logging: RequestLogging,
    pub cors: Cors,
}

#[derive(Debug, Clone)]
pub struct BackendServer {
    pub port: u16,
    /// MiB
    pub body_limit: u64,
    /// seconds
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
    pub max_connections: u32,
    /// seconds
    pub connect_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Listing {
    /// Applied when a list request has no `limit`. 0 means unlimited.
    pub default_limit: i64,
}

#[derive(Debug, Clone)]
pub struct RequestLogging {
    pub log_body: bool,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct Cors {
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
}
