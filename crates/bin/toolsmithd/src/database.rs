use surrealdb::Surreal;
use surrealdb::engine::any::{self, Any};
use surrealdb::opt::auth::Root;
use toolsmith_core::store::{StoreError, SurrealToolStore};
use tracing::{info, warn};

use crate::config::DatabaseConfig;

/// Connects to the configured endpoint, selects the namespace and database,
/// and applies the table definitions.
pub async fn connect(config: &DatabaseConfig) -> Result<Surreal<Any>, StoreError> {
    if config.is_ephemeral() {
        warn!(endpoint = %config.endpoint, "in-memory database; nothing survives this process");
    }
    let db = any::connect(config.endpoint.as_str()).await?;

    if let (Some(username), Some(password)) = (config.username.as_ref(), config.password.as_ref()) {
        db.signin(Root {
            username: username.as_str(),
            password: password.as_str(),
        })
        .await?;
    }

    db.use_ns(&config.namespace).use_db(&config.database).await?;
    SurrealToolStore::new(db.clone()).ensure_schema().await?;
    info!(
        endpoint = %config.endpoint,
        namespace = %config.namespace,
        database = %config.database,
        "database ready"
    );
    Ok(db)
}
