//! Generic create/read/update/delete lifecycle shared by every resource type.
//!
//! A [`ResourceAdapter`] knows how to map one resource type onto directory
//! client calls. [`Reconciler`] wraps an adapter with everything that is the
//! same for all of them: local validation, the duplicate-name guard,
//! immutable-field checks, deadlines, not-found handling, read-back, drift
//! detection, import, and state upgrades.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use directory_reconciler_sdk::DirectoryError;
use secrecy::SecretString;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::{Instant, timeout_at};

use crate::config::OperationTimeouts;
use crate::domain::error::{Operation, ReconcileError, ReconcileErrorKind};
use crate::domain::ids::ResourceId;
use crate::domain::lock::{LockKey, NameGuard, NameLock};
use crate::domain::state::{Drift, PersistedState, ResourceState, changed_paths};
use crate::domain::upgrade::UpgradeChain;

/// Identity and write-only value returned by a successful remote create.
#[derive(Debug)]
pub struct Created {
    pub id: String,
    pub secret: Option<SecretString>,
}

impl Created {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: None,
        }
    }

    #[must_use]
    pub fn with_secret(mut self, secret: SecretString) -> Self {
        self.secret = Some(secret);
        self
    }
}

/// Per-resource-type mapping onto the directory service.
///
/// Adapters never catch not-found themselves: `read` returns `Ok(None)` for a
/// missing object and the engine decides what absence means.
#[async_trait]
pub trait ResourceAdapter: Send + Sync + 'static {
    /// Name used in errors, logs, and lock keys.
    const RESOURCE_TYPE: &'static str;
    /// Version of the persisted `Record` shape.
    const SCHEMA_VERSION: u32 = 0;

    type Id: ResourceId;
    type Desired: Send + Sync;
    type Record: Serialize + DeserializeOwned + Clone + PartialEq + fmt::Debug + Send + Sync;

    /// Local pre-flight checks. Must not call the service.
    ///
    /// # Errors
    ///
    /// Returns a validation error describing the first invalid attribute.
    fn validate(&self, _desired: &Self::Desired) -> Result<(), ReconcileError> {
        Ok(())
    }

    /// Display name to guard against duplicates, for resource types that
    /// support the duplicate-name guard.
    fn display_name<'a>(&self, _desired: &'a Self::Desired) -> Option<&'a str> {
        None
    }

    /// Whether the desired state itself asks for the duplicate-name guard.
    fn prevent_duplicate_names(&self, _desired: &Self::Desired) -> bool {
        false
    }

    /// Identities of existing objects with exactly this display name. An
    /// object returned without an identity is reported as an empty string.
    ///
    /// # Errors
    ///
    /// Propagates remote failures.
    async fn find_by_display_name(
        &self,
        _ctx: &OperationContext,
        _name: &str,
    ) -> Result<Vec<String>, ReconcileError> {
        Ok(Vec::new())
    }

    /// Attributes that differ between `current` and `desired` but cannot be
    /// changed in place.
    fn force_new_changes(&self, _current: &Self::Record, _desired: &Self::Desired) -> Vec<&'static str> {
        Vec::new()
    }

    /// Copies inputs the service never reports back from `desired` into the
    /// record read after create, so later updates can compare them.
    fn remember_inputs(&self, _record: &mut Self::Record, _desired: &Self::Desired) {}

    /// Carries remembered inputs from `previous` into a fresh read.
    fn carry_inputs(&self, _previous: &Self::Record, _fresh: &mut Self::Record) {}

    /// Creates the primary object.
    ///
    /// # Errors
    ///
    /// Propagates remote failures and rejects invalid responses.
    async fn create(
        &self,
        ctx: &OperationContext,
        desired: &Self::Desired,
    ) -> Result<Created, ReconcileError>;

    /// Writes sub-resources of a freshly created object (e.g. owners).
    ///
    /// # Errors
    ///
    /// Propagates remote failures.
    async fn after_create(
        &self,
        _ctx: &OperationContext,
        _id: &Self::Id,
        _desired: &Self::Desired,
    ) -> Result<(), ReconcileError> {
        Ok(())
    }

    /// Reads the object. `Ok(None)` when it does not exist.
    ///
    /// # Errors
    ///
    /// Propagates remote failures other than not-found.
    async fn read(
        &self,
        ctx: &OperationContext,
        id: &Self::Id,
    ) -> Result<Option<Self::Record>, ReconcileError>;

    /// Sends the changes needed to move `current` to `desired`. Returns a new
    /// write-only value when one was set.
    ///
    /// # Errors
    ///
    /// Propagates remote failures.
    async fn update(
        &self,
        ctx: &OperationContext,
        current: &ResourceState<Self::Id, Self::Record>,
        desired: &Self::Desired,
    ) -> Result<Option<SecretString>, ReconcileError>;

    /// Deletes an object known to exist as `current`.
    ///
    /// # Errors
    ///
    /// Propagates remote failures; not-found is treated as success by the
    /// engine.
    async fn delete(
        &self,
        ctx: &OperationContext,
        id: &Self::Id,
        current: &Self::Record,
    ) -> Result<(), ReconcileError>;

    /// Migrations from older persisted schema versions.
    fn upgrades(&self) -> UpgradeChain {
        UpgradeChain::new()
    }
}

// =============================================================================
// OperationContext
// =============================================================================

/// Deadline, lock registry, and error context of one running operation.
///
/// Every remote call and lock wait goes through the context so it is bounded
/// by the same deadline. Read-only data sources use a context without a lock
/// registry.
#[derive(Clone)]
pub struct OperationContext {
    operation: Operation,
    resource_type: &'static str,
    deadline: Instant,
    locks: Option<Arc<NameLock>>,
    poll_interval: Duration,
}

impl OperationContext {
    #[must_use]
    pub fn new(
        operation: Operation,
        resource_type: &'static str,
        timeout: Duration,
        locks: Arc<NameLock>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            operation,
            resource_type,
            deadline: Instant::now() + timeout,
            locks: Some(locks),
            poll_interval,
        }
    }

    /// Context whose deadline is the configured timeout for `operation`.
    #[must_use]
    pub fn from_settings(
        operation: Operation,
        resource_type: &'static str,
        settings: &EngineSettings,
        locks: Arc<NameLock>,
    ) -> Self {
        Self::new(
            operation,
            resource_type,
            settings.timeouts.for_operation(operation),
            locks,
            settings.poll_interval,
        )
    }

    /// Context that cannot take name locks, for data sources that only read.
    #[must_use]
    pub fn read_only(operation: Operation, resource_type: &'static str, settings: &EngineSettings) -> Self {
        Self {
            operation,
            resource_type,
            deadline: Instant::now() + settings.timeouts.for_operation(operation),
            locks: None,
            poll_interval: settings.poll_interval,
        }
    }

    #[must_use]
    pub fn operation(&self) -> Operation {
        self.operation
    }

    #[must_use]
    pub fn resource_type(&self) -> &'static str {
        self.resource_type
    }

    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Tags `err` with this operation and resource type.
    #[must_use]
    pub fn error(&self, err: ReconcileError) -> ReconcileError {
        err.in_context(self.operation, self.resource_type)
    }

    /// Runs one remote call under the deadline.
    ///
    /// # Errors
    ///
    /// `Remote` for a service error, `Timeout` when the deadline passes.
    pub async fn call<T, F>(&self, call: F) -> Result<T, ReconcileError>
    where
        F: Future<Output = Result<T, DirectoryError>> + Send,
    {
        match timeout_at(self.deadline, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(self.error(err.into())),
            Err(_) => Err(self.error(ReconcileError::timeout())),
        }
    }

    /// Like [`OperationContext::call`], but maps not-found to `Ok(None)`.
    ///
    /// # Errors
    ///
    /// `Remote` for a service error other than not-found, `Timeout` when the
    /// deadline passes.
    pub async fn call_opt<T, F>(&self, call: F) -> Result<Option<T>, ReconcileError>
    where
        F: Future<Output = Result<T, DirectoryError>> + Send,
    {
        match timeout_at(self.deadline, call).await {
            Ok(Ok(value)) => Ok(Some(value)),
            Ok(Err(err)) if err.is_not_found() => Ok(None),
            Ok(Err(err)) => Err(self.error(err.into())),
            Err(_) => Err(self.error(ReconcileError::timeout())),
        }
    }

    /// Acquires the name lock of a parent object under the deadline.
    ///
    /// # Errors
    ///
    /// `Timeout` when the lock is not free before the deadline, `Validation`
    /// on a read-only context.
    pub async fn lock(&self, resource_type: &'static str, name: &str) -> Result<NameGuard, ReconcileError> {
        let Some(locks) = &self.locks else {
            return Err(self.error(ReconcileError::validation(
                "lock",
                format!("read-only {} context cannot lock {resource_type} {name}", self.resource_type),
            )));
        };
        let key = LockKey::new(resource_type, name);
        timeout_at(self.deadline, locks.acquire(key))
            .await
            .map_err(|_| {
                self.error(
                    ReconcileError::timeout()
                        .with_message(format!("waiting for lock on {resource_type} {name}")),
                )
            })
    }

    /// Runs `work` while holding the name lock of a parent object. The lock is
    /// released whether `work` succeeds or fails.
    ///
    /// # Errors
    ///
    /// `Timeout` when the lock is not acquired in time, otherwise whatever
    /// `work` returns.
    pub async fn locked<T, F>(
        &self,
        resource_type: &'static str,
        name: &str,
        work: F,
    ) -> Result<T, ReconcileError>
    where
        F: Future<Output = Result<T, ReconcileError>> + Send,
    {
        let guard = self.lock(resource_type, name).await?;
        let result = work.await;
        guard.release();
        result
    }

    /// Waits one poll interval before re-reading an eventually consistent
    /// value.
    ///
    /// # Errors
    ///
    /// `Timeout` if the next poll would start after the deadline.
    pub async fn pause(&self) -> Result<(), ReconcileError> {
        let wake = Instant::now() + self.poll_interval;
        if wake >= self.deadline {
            return Err(self.error(
                ReconcileError::timeout().with_message("change did not become visible in time"),
            ));
        }
        tokio::time::sleep_until(wake).await;
        Ok(())
    }
}

impl fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationContext")
            .field("operation", &self.operation)
            .field("resource_type", &self.resource_type)
            .field("deadline", &self.deadline)
            .field("locks", &self.locks)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

// =============================================================================
// Reconciler
// =============================================================================

/// Shared settings for every reconciler built from one configuration.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub timeouts: OperationTimeouts,
    pub poll_interval: Duration,
    pub prevent_duplicate_names: bool,
}

/// Lifecycle driver for one resource type.
pub struct Reconciler<A: ResourceAdapter> {
    adapter: A,
    locks: Arc<NameLock>,
    settings: EngineSettings,
}

/// State type handled by a [`Reconciler`] over `A`.
pub type StateOf<A> = ResourceState<<A as ResourceAdapter>::Id, <A as ResourceAdapter>::Record>;
/// Drift type reported by a [`Reconciler`] over `A`.
pub type DriftOf<A> = Drift<<A as ResourceAdapter>::Id, <A as ResourceAdapter>::Record>;

impl<A: ResourceAdapter> Reconciler<A> {
    #[must_use]
    pub fn new(adapter: A, locks: Arc<NameLock>, settings: EngineSettings) -> Self {
        Self {
            adapter,
            locks,
            settings,
        }
    }

    #[must_use]
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    fn context(&self, operation: Operation) -> OperationContext {
        OperationContext::from_settings(operation, A::RESOURCE_TYPE, &self.settings, Arc::clone(&self.locks))
    }

    /// Creates the object and returns its read-back state.
    ///
    /// # Errors
    ///
    /// - `Validation` when the desired state is rejected locally
    /// - `Duplicate` when the guard finds another object with the same name
    /// - `InvalidServerResponse` when the service returns no usable identity
    ///   or the object cannot be read back
    /// - `Remote`/`Timeout` from the service; if the primary object was
    ///   already created the error carries its `created_identity`
    #[tracing::instrument(skip_all, fields(resource = A::RESOURCE_TYPE))]
    pub async fn create(&self, desired: &A::Desired) -> Result<StateOf<A>, ReconcileError> {
        let ctx = self.context(Operation::Create);
        self.adapter.validate(desired).map_err(|e| ctx.error(e))?;
        self.guard_duplicates(&ctx, desired, None).await?;

        let created = self.adapter.create(&ctx, desired).await.map_err(|e| ctx.error(e))?;
        if created.id.is_empty() {
            return Err(ctx.error(ReconcileError::invalid_server_response(
                "service returned an empty identity for the created object",
            )));
        }
        let id = A::Id::decode(&created.id).map_err(|e| {
            ctx.error(
                ReconcileError::invalid_server_response(format!(
                    "service returned an undecodable identity: {e}"
                ))
                .with_created_identity(created.id.clone()),
            )
        })?;
        tracing::info!(resource = A::RESOURCE_TYPE, id = %id, "created");

        if let Err(err) = self.adapter.after_create(&ctx, &id, desired).await {
            tracing::warn!(
                resource = A::RESOURCE_TYPE,
                id = %id,
                error = %err,
                "object created but follow-up writes failed"
            );
            return Err(ctx.error(err).with_identity(id.to_string()).with_created_identity(id.to_string()));
        }

        let mut record = match self.adapter.read(&ctx, &id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                return Err(ctx.error(
                    ReconcileError::invalid_server_response("created object could not be read back")
                        .with_identity(id.to_string())
                        .with_created_identity(id.to_string()),
                ));
            }
            Err(err) => {
                return Err(ctx.error(err).with_identity(id.to_string()).with_created_identity(id.to_string()));
            }
        };
        self.adapter.remember_inputs(&mut record, desired);

        Ok(ResourceState {
            id,
            schema_version: A::SCHEMA_VERSION,
            record,
            secret: created.secret,
        })
    }

    /// Reads the object. `Ok(None)` means it no longer exists.
    ///
    /// # Errors
    ///
    /// `Remote`/`Timeout` for failures other than not-found.
    #[tracing::instrument(skip_all, fields(resource = A::RESOURCE_TYPE, id = %id))]
    pub async fn read(&self, id: &A::Id) -> Result<Option<StateOf<A>>, ReconcileError> {
        let ctx = self.context(Operation::Read);
        self.read_with(&ctx, id).await
    }

    async fn read_with(
        &self,
        ctx: &OperationContext,
        id: &A::Id,
    ) -> Result<Option<StateOf<A>>, ReconcileError> {
        let record = self
            .adapter
            .read(ctx, id)
            .await
            .map_err(|e| ctx.error(e).with_identity(id.to_string()))?;

        let Some(record) = record else {
            tracing::debug!(resource = A::RESOURCE_TYPE, id = %id, "object not found; removing from state");
            return Ok(None);
        };

        Ok(Some(ResourceState {
            id: id.clone(),
            schema_version: A::SCHEMA_VERSION,
            record,
            secret: None,
        }))
    }

    /// Re-reads a known object and reports how it differs from `state`.
    ///
    /// # Errors
    ///
    /// `Remote`/`Timeout` for failures other than not-found.
    #[tracing::instrument(skip_all, fields(resource = A::RESOURCE_TYPE, id = %state.id))]
    pub async fn refresh(&self, state: &StateOf<A>) -> Result<DriftOf<A>, ReconcileError> {
        let ctx = self.context(Operation::Read);
        let Some(mut fresh) = self.read_with(&ctx, &state.id).await? else {
            return Ok(Drift::Absent);
        };
        fresh.secret.clone_from(&state.secret);
        self.adapter.carry_inputs(&state.record, &mut fresh.record);

        let changed = changed_paths(
            &to_json(&ctx, &state.record)?,
            &to_json(&ctx, &fresh.record)?,
        );
        if changed.is_empty() {
            return Ok(Drift::InSync(fresh));
        }
        tracing::debug!(resource = A::RESOURCE_TYPE, id = %state.id, changed = ?changed, "drift detected");
        Ok(Drift::Drifted {
            state: fresh,
            changed,
        })
    }

    /// Moves an existing object to `desired` and returns its read-back state.
    ///
    /// # Errors
    ///
    /// - `Validation` when the desired state is rejected locally or changes
    ///   an immutable attribute; no remote call is made in that case
    /// - `Duplicate` when the guard finds another object with the same name
    /// - `InvalidServerResponse` when the object vanishes during the update
    /// - `Remote`/`Timeout` from the service
    #[tracing::instrument(skip_all, fields(resource = A::RESOURCE_TYPE, id = %current.id))]
    pub async fn update(
        &self,
        current: &StateOf<A>,
        desired: &A::Desired,
    ) -> Result<StateOf<A>, ReconcileError> {
        let ctx = self.context(Operation::Update);
        let with_id = |e: ReconcileError| ctx.error(e).with_identity(current.id.to_string());

        self.adapter.validate(desired).map_err(with_id)?;
        if let Some(field) = self
            .adapter
            .force_new_changes(&current.record, desired)
            .into_iter()
            .next()
        {
            return Err(with_id(ReconcileError::validation(
                field,
                "cannot be changed in place; the resource must be replaced",
            )));
        }
        self.guard_duplicates(&ctx, desired, Some(&current.id)).await?;

        let new_secret = self.adapter.update(&ctx, current, desired).await.map_err(with_id)?;
        tracing::info!(resource = A::RESOURCE_TYPE, id = %current.id, "updated");

        let mut state = self.read_with(&ctx, &current.id).await?.ok_or_else(|| {
            with_id(ReconcileError::invalid_server_response(
                "object disappeared while it was being updated",
            ))
        })?;
        state.secret = new_secret.or_else(|| current.secret.clone());
        self.adapter.carry_inputs(&current.record, &mut state.record);
        Ok(state)
    }

    /// Deletes the object. Deleting an object that is already gone succeeds.
    ///
    /// # Errors
    ///
    /// `Remote`/`Timeout` for failures other than not-found.
    #[tracing::instrument(skip_all, fields(resource = A::RESOURCE_TYPE, id = %id))]
    pub async fn delete(&self, id: &A::Id) -> Result<(), ReconcileError> {
        let ctx = self.context(Operation::Delete);
        let with_id = |e: ReconcileError| ctx.error(e).with_identity(id.to_string());

        let Some(record) = self.adapter.read(&ctx, id).await.map_err(with_id)? else {
            tracing::debug!(resource = A::RESOURCE_TYPE, id = %id, "already absent; nothing to delete");
            return Ok(());
        };

        match self.adapter.delete(&ctx, id, &record).await {
            Ok(()) => {
                tracing::info!(resource = A::RESOURCE_TYPE, id = %id, "deleted");
                Ok(())
            }
            Err(err) if is_remote_not_found(&err) => {
                tracing::debug!(resource = A::RESOURCE_TYPE, id = %id, "deleted concurrently");
                Ok(())
            }
            Err(err) => Err(with_id(err)),
        }
    }

    /// Adopts an existing object by a user-supplied identity.
    ///
    /// # Errors
    ///
    /// `MalformedIdentifier` for a bad identity, `Validation` when no such
    /// object exists, `Remote`/`Timeout` from the service.
    #[tracing::instrument(skip_all, fields(resource = A::RESOURCE_TYPE, id = raw_id))]
    pub async fn import(&self, raw_id: &str) -> Result<StateOf<A>, ReconcileError> {
        let ctx = self.context(Operation::Import);
        let id = A::Id::decode_import(raw_id)
            .map_err(|e| ctx.error(ReconcileError::from(e).with_identity(raw_id)))?;

        self.read_with(&ctx, &id).await?.ok_or_else(|| {
            ctx.error(
                ReconcileError::validation("id", format!("no {} exists with this identity", A::RESOURCE_TYPE))
                    .with_identity(raw_id),
            )
        })
    }

    /// Restores state persisted by any earlier schema version.
    ///
    /// # Errors
    ///
    /// `Validation` when no upgrade path exists or the attributes do not match
    /// the record shape, `MalformedIdentifier` when the upgraded identity
    /// cannot be decoded.
    pub fn load(&self, persisted: PersistedState) -> Result<StateOf<A>, ReconcileError> {
        let in_load = |e: ReconcileError| e.in_context(Operation::Load, A::RESOURCE_TYPE);
        let raw_id = persisted.id.clone();

        let upgraded = self
            .adapter
            .upgrades()
            .run(persisted, A::SCHEMA_VERSION)
            .map_err(|e| in_load(e.with_identity(raw_id.clone())))?;

        let id = A::Id::decode(&upgraded.id)
            .map_err(|e| in_load(ReconcileError::from(e).with_identity(upgraded.id.clone())))?;
        let record: A::Record = serde_json::from_value(upgraded.attributes).map_err(|e| {
            in_load(
                ReconcileError::validation("attributes", format!("stored attributes are invalid: {e}"))
                    .with_identity(upgraded.id.clone()),
            )
        })?;

        Ok(ResourceState {
            id,
            schema_version: upgraded.schema_version,
            record,
            secret: upgraded.secret.map(SecretString::from),
        })
    }

    /// Serializes state for storage.
    ///
    /// # Errors
    ///
    /// `Validation` if the record cannot be represented as JSON.
    pub fn persist(&self, state: &StateOf<A>) -> Result<PersistedState, ReconcileError> {
        let attributes = serde_json::to_value(&state.record).map_err(|e| {
            ReconcileError::validation("attributes", format!("record cannot be serialized: {e}"))
                .in_context(Operation::Persist, A::RESOURCE_TYPE)
        })?;
        Ok(PersistedState::new(state.schema_version, state.id.to_string(), attributes)
            .with_secret(state.secret.as_ref()))
    }

    async fn guard_duplicates(
        &self,
        ctx: &OperationContext,
        desired: &A::Desired,
        own_id: Option<&A::Id>,
    ) -> Result<(), ReconcileError> {
        let Some(name) = self.adapter.display_name(desired) else {
            return Ok(());
        };
        if !(self.settings.prevent_duplicate_names || self.adapter.prevent_duplicate_names(desired)) {
            return Ok(());
        }

        let own = own_id.map(ToString::to_string);
        let existing = self
            .adapter
            .find_by_display_name(ctx, name)
            .await
            .map_err(|e| ctx.error(e.with_field("display_name")))?;

        for existing_id in existing {
            if existing_id.is_empty() {
                return Err(ctx.error(ReconcileError::invalid_server_response(
                    "object without identity returned during duplicate name check",
                )));
            }
            if own.as_deref() != Some(existing_id.as_str()) {
                tracing::debug!(
                    resource = A::RESOURCE_TYPE,
                    display_name = name,
                    existing = %existing_id,
                    "duplicate display name"
                );
                let mut err = ReconcileError::duplicate(existing_id, name);
                if let Some(own) = &own {
                    err = err.with_identity(own.clone());
                }
                return Err(ctx.error(err));
            }
        }
        Ok(())
    }
}

impl<A: ResourceAdapter + fmt::Debug> fmt::Debug for Reconciler<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("adapter", &self.adapter)
            .field("locks", &self.locks)
            .field("settings", &self.settings)
            .finish()
    }
}

fn is_remote_not_found(err: &ReconcileError) -> bool {
    matches!(err.kind(), ReconcileErrorKind::Remote(e) if e.is_not_found())
}

fn to_json<T: Serialize>(ctx: &OperationContext, value: &T) -> Result<serde_json::Value, ReconcileError> {
    serde_json::to_value(value).map_err(|e| {
        ctx.error(ReconcileError::validation(
            "attributes",
            format!("record cannot be serialized: {e}"),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::ObjectId;

    #[derive(Debug, Clone, PartialEq, serde::Deserialize)]
    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("refused"))
        }
    }

    struct RefusingAdapter;

    #[async_trait]
    impl ResourceAdapter for RefusingAdapter {
        const RESOURCE_TYPE: &'static str = "refusing";

        type Id = ObjectId;
        type Desired = ();
        type Record = Unserializable;

        async fn create(&self, _ctx: &OperationContext, _desired: &()) -> Result<Created, ReconcileError> {
            Ok(Created::new("11111111-1111-1111-1111-111111111111"))
        }

        async fn read(
            &self,
            _ctx: &OperationContext,
            _id: &ObjectId,
        ) -> Result<Option<Unserializable>, ReconcileError> {
            Ok(Some(Unserializable))
        }

        async fn update(
            &self,
            _ctx: &OperationContext,
            _current: &ResourceState<ObjectId, Unserializable>,
            _desired: &(),
        ) -> Result<Option<SecretString>, ReconcileError> {
            Ok(None)
        }

        async fn delete(
            &self,
            _ctx: &OperationContext,
            _id: &ObjectId,
            _current: &Unserializable,
        ) -> Result<(), ReconcileError> {
            Ok(())
        }
    }

    #[test]
    fn test_persist_failure_is_reported_as_persist() {
        let reconciler = Reconciler::new(
            RefusingAdapter,
            Arc::new(NameLock::new()),
            EngineSettings {
                timeouts: OperationTimeouts::uniform(Duration::from_secs(1)),
                poll_interval: Duration::from_millis(10),
                prevent_duplicate_names: false,
            },
        );
        let state = ResourceState {
            id: ObjectId::parse_uuid("11111111-1111-1111-1111-111111111111").unwrap(),
            schema_version: 0,
            record: Unserializable,
            secret: None,
        };

        let err = reconciler.persist(&state).unwrap_err();
        assert_eq!(err.operation(), Some(Operation::Persist));
        assert_eq!(err.resource_type(), Some("refusing"));
        assert!(err.to_string().starts_with("persist refusing"));
    }

    #[tokio::test]
    async fn test_read_only_context_never_locks() {
        let settings = EngineSettings {
            timeouts: OperationTimeouts::uniform(Duration::from_secs(1)),
            poll_interval: Duration::from_millis(10),
            prevent_duplicate_names: false,
        };
        let ctx = OperationContext::read_only(Operation::Read, "domains", &settings);

        let err = ctx.lock("application", "app-1").await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.operation(), Some(Operation::Read));
        assert_eq!(err.resource_type(), Some("domains"));

        let value = ctx.call(async { Ok::<_, DirectoryError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }
}
