/// Space pointer resolver
///
/// Resolution precedence, first match wins:
/// 1. a space pointer on the written data
/// 2. a space pointer in the REST query
/// 3. a parent pointer on the written data, chased through the store
/// 4. an `(itemType, itemId)` pair on the written data, chased likewise
/// 5. the queried `objectId` of the target class, chased likewise
///
/// Chasing is bounded by `max_hops` record fetches. Dangling references and
/// an exhausted bound both resolve to "no space".

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::SpaceConfig;
use crate::error::Result;
use crate::store::{Query, QueryExecutor};
use crate::types::{OperationContext, Pointer, Record, SpaceRef};

/// Resolves the space an operation's target belongs to
pub struct SpacePointerResolver {
    executor: Arc<dyn QueryExecutor>,
    config: SpaceConfig,
}

impl SpacePointerResolver {
    pub fn new(executor: Arc<dyn QueryExecutor>, config: SpaceConfig) -> Self {
        Self { executor, config }
    }

    pub fn config(&self) -> &SpaceConfig {
        &self.config
    }

    /// Find the space for `op`, or `None` when it has no space context
    ///
    /// Store failures while chasing are returned unchanged.
    pub async fn resolve(&self, op: &OperationContext) -> Result<Option<SpaceRef>> {
        if let Some(space) = self.direct_space(&op.data) {
            debug!("Space {} taken from data", space.object_id);
            return Ok(Some(space));
        }

        if let Some(space) = self.direct_space(&op.rest_query) {
            debug!("Space {} taken from REST query", space.object_id);
            return Ok(Some(space));
        }

        if let Some(parent) = self.parent_pointer(&op.data) {
            return self.chase(parent).await;
        }

        if let Some(item) = self.item_pointer(&op.data) {
            return self.chase(item).await;
        }

        if let Some(object_id) = op.query.get("objectId").and_then(Value::as_str) {
            if !object_id.is_empty() {
                return self.chase(Pointer::new(&op.class_name, object_id)).await;
            }
        }

        Ok(None)
    }

    fn direct_space(&self, record: &Record) -> Option<SpaceRef> {
        record.get(&self.config.space_field).and_then(Pointer::from_value)
    }

    fn parent_pointer(&self, record: &Record) -> Option<Pointer> {
        record.get(&self.config.parent_field).and_then(Pointer::from_value)
    }

    fn item_pointer(&self, record: &Record) -> Option<Pointer> {
        let class_name = record.get(&self.config.item_type_field)?.as_str()?;
        let object_id = record.get(&self.config.item_id_field)?.as_str()?;
        if class_name.is_empty() || object_id.is_empty() {
            return None;
        }
        Some(Pointer::new(class_name, object_id))
    }

    /// Follow parent pointers from `start` until a space pointer turns up
    async fn chase(&self, start: Pointer) -> Result<Option<SpaceRef>> {
        let mut current = start;

        for hop in 0..self.config.max_hops {
            // A record of the container class is its own space.
            if current.class_name == self.config.space_class {
                return Ok(Some(current));
            }

            let query = Query::new(&current.class_name)
                .equal_to("objectId", json!(current.object_id))
                .limit(1);
            let Some(record) = self.executor.execute(&query).await?.into_iter().next() else {
                warn!(
                    "Dangling reference {}/{} while resolving space",
                    current.class_name, current.object_id
                );
                return Ok(None);
            };

            if let Some(space) = self.direct_space(&record) {
                debug!(
                    "Space {} found on {}/{} after {} hop(s)",
                    space.object_id,
                    current.class_name,
                    current.object_id,
                    hop + 1
                );
                return Ok(Some(space));
            }

            match self.parent_pointer(&record) {
                Some(parent) => current = parent,
                None => return Ok(None),
            }
        }

        warn!(
            "Gave up resolving space after {} hops at {}/{}",
            self.config.max_hops, current.class_name, current.object_id
        );
        Ok(None)
    }
}
