//! Session wrapper carrying a per-unit-of-work identity map.
//!
//! Entities read through [`Session::get`] are cached by `(entity type, key)`
//! so repeated lookups inside one session observe the same snapshot. Bulk
//! statements bypass entity state entirely, which is exactly why
//! [`crate::BulkUpdate`] evicts the touched entity type after executing.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::Mutex;
use sea_orm::{ConnectionTrait, EntityTrait, PrimaryKeyTrait};

use crate::error::AccessError;

type IdentityKey = (TypeId, String);

/// A connection (or open transaction) plus the identity map scoped to it.
pub struct Session<C: ConnectionTrait> {
    conn: C,
    identity: Mutex<HashMap<IdentityKey, Arc<dyn Any + Send + Sync>>>,
}

impl<C: ConnectionTrait> Session<C> {
    pub fn new(conn: C) -> Self {
        Self {
            conn,
            identity: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying connection, for queries that manage caching themselves.
    pub fn conn(&self) -> &C {
        &self.conn
    }

    /// Discard the identity map and hand back the connection, typically to
    /// commit or roll back an open transaction.
    pub fn into_inner(self) -> C {
        self.conn
    }

    /// Read-through lookup by primary key.
    ///
    /// The first hit goes to the store; later calls with the same key return
    /// the cached snapshot until the entity type is evicted.
    ///
    /// # Errors
    /// Store failures are tagged with the `find_by_id` operation.
    pub async fn get<E>(
        &self,
        id: <E::PrimaryKey as PrimaryKeyTrait>::ValueType,
    ) -> Result<Option<Arc<E::Model>>, AccessError>
    where
        E: EntityTrait,
        E::Model: Send + Sync + 'static,
        <E::PrimaryKey as PrimaryKeyTrait>::ValueType: Debug,
    {
        let key = (TypeId::of::<E>(), format!("{id:?}"));

        if let Some(hit) = self.identity.lock().get(&key) {
            if let Ok(model) = Arc::clone(hit).downcast::<E::Model>() {
                tracing::trace!(entity = std::any::type_name::<E>(), "identity map hit");
                return Ok(Some(model));
            }
        }

        let found = E::find_by_id(id)
            .one(&self.conn)
            .await
            .map_err(|e| AccessError::from_db("find_by_id", e))?;

        Ok(match found {
            Some(model) => {
                let model = Arc::new(model);
                self.identity
                    .lock()
                    .insert(key, Arc::clone(&model) as Arc<dyn Any + Send + Sync>);
                Some(model)
            }
            None => None,
        })
    }

    /// Drop every cached snapshot of one entity type. Bulk mutations call
    /// this unconditionally so stale pre-mutation state cannot be observed.
    pub fn evict_all<E: EntityTrait>(&self) {
        let tid = TypeId::of::<E>();
        let mut map = self.identity.lock();
        let before = map.len();
        map.retain(|(t, _), _| *t != tid);
        tracing::debug!(
            entity = std::any::type_name::<E>(),
            evicted = before - map.len(),
            "identity map eviction"
        );
    }

    /// Drop the whole identity map.
    pub fn clear(&self) {
        self.identity.lock().clear();
    }
}
