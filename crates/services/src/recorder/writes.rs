use std::future::Future;

use storage::repository::{Collection, SchemaProvisioner, StorageError};
use tracing::{info, warn};

use crate::error::WriteError;

/// Run `write`; if the collection is missing, provision it and retry exactly once.
///
/// No state survives between calls: every schema-missing response triggers a
/// fresh provisioning attempt.
pub(crate) async fn write_with_provisioning<W, Fut>(
    provisioner: Option<&dyn SchemaProvisioner>,
    collection: Collection,
    write: W,
) -> Result<(), WriteError>
where
    W: Fn() -> Fut,
    Fut: Future<Output = Result<(), StorageError>>,
{
    let remote = |source: StorageError| WriteError::Remote { collection, source };

    let err = match write().await {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };
    let Some(provisioner) = provisioner.filter(|_| err.is_schema_missing()) else {
        return Err(remote(err));
    };

    info!(%collection, "collection missing; provisioning before retry");
    if let Err(provision_err) = provisioner.provision(collection).await {
        warn!(%collection, error = %provision_err, "provisioning failed");
    }
    write().await.map_err(remote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use storage::repository::InMemoryRepository;

    #[tokio::test]
    async fn success_needs_no_provisioning() {
        let repo = InMemoryRepository::new();
        let counter = AtomicUsize::new(0);
        let attempts = &counter;

        let result = write_with_provisioning(Some(&repo), Collection::PageViews, move || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(repo.provision_calls(Collection::PageViews), 0);
    }

    #[tokio::test]
    async fn transient_failure_is_not_retried() {
        let repo = InMemoryRepository::new();
        let counter = AtomicUsize::new(0);
        let attempts = &counter;

        let result = write_with_provisioning(Some(&repo), Collection::PageViews, move || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Connection("reset".into()))
        })
        .await;

        assert!(matches!(result, Err(WriteError::Remote { .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(repo.provision_calls(Collection::PageViews), 0);
    }

    #[tokio::test]
    async fn schema_missing_retries_exactly_once() {
        let repo = InMemoryRepository::new();
        let counter = AtomicUsize::new(0);
        let attempts = &counter;

        let result = write_with_provisioning(Some(&repo), Collection::UserEvents, move || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::SchemaMissing {
                collection: Collection::UserEvents,
            })
        })
        .await;

        let err = result.unwrap_err();
        assert!(matches!(
            err,
            WriteError::Remote {
                source: StorageError::SchemaMissing { .. },
                ..
            }
        ));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(repo.provision_calls(Collection::UserEvents), 1);
    }

    #[tokio::test]
    async fn provisioning_can_be_disabled() {
        let counter = AtomicUsize::new(0);
        let attempts = &counter;

        let result = write_with_provisioning(None, Collection::UserEvents, move || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::SchemaMissing {
                collection: Collection::UserEvents,
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
