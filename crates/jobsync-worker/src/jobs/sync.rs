//! `connector.*.sync` jobs: one handler instance per connector source.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use jobsync_entity::account::ConnectorSource;
use jobsync_entity::job::JobKind;

use crate::context::JobContext;
use crate::executor::{JobExecutionError, JobHandler};
use crate::sync::{SyncEngine, SyncRequest};

/// Runs the shared sync algorithm for one source.
#[derive(Debug, Clone)]
pub struct ConnectorSyncHandler {
    source: ConnectorSource,
    sync: Arc<SyncEngine>,
}

impl ConnectorSyncHandler {
    pub fn new(source: ConnectorSource, sync: Arc<SyncEngine>) -> Self {
        Self { source, sync }
    }

    /// One handler per source, ready to register.
    pub fn all(sync: &Arc<SyncEngine>) -> Vec<Arc<dyn JobHandler>> {
        [
            ConnectorSource::Calendar,
            ConnectorSource::Jira,
            ConnectorSource::Confluence,
        ]
        .into_iter()
        .map(|source| Arc::new(Self::new(source, Arc::clone(sync))) as Arc<dyn JobHandler>)
        .collect()
    }
}

#[async_trait]
impl JobHandler for ConnectorSyncHandler {
    fn kind(&self) -> JobKind {
        JobKind::for_source(self.source)
    }

    async fn execute(&self, ctx: &JobContext) -> Result<Value, JobExecutionError> {
        let request: SyncRequest = ctx.payload_as()?;
        self.sync.run(ctx, self.source, &request).await
    }
}
