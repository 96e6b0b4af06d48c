pub mod schema;

pub use schema::{
    CatalogConfig, Config, GatewayConfig, HealthCheckConfig, ObservabilityConfig, RagConfig,
    SessionsConfig, CONFIG_DIR_ENV,
};
