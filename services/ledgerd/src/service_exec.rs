use std::sync::Arc;

use ledger::Service;

/// Run a call into the service on the blocking pool; the service guards its
/// ledgers with std locks
pub async fn with_service_blocking<R, F>(
    service: Arc<Service>,
    f: F,
) -> Result<R, tokio::task::JoinError>
where
    R: Send + 'static,
    F: FnOnce(&Service) -> R + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&service)).await
}
