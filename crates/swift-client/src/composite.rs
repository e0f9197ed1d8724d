//! Multi-step operations built from single requests

use crate::{
    error::PartialFailure,
    types::{CopyOutcome, DeleteContainerOutcome},
    ClientError, Result, SwiftClient,
};
use futures::{stream::FuturesUnordered, StreamExt};
use tracing::{debug, info, instrument, warn};

/// Barrier state after recording one completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanInState {
    /// Some expected completions are still outstanding
    Waiting,
    /// This completion was the last one; returned exactly once
    Released,
    /// The barrier released earlier; the completion was ignored
    Closed,
}

/// Join point for a known number of independent operations.
///
/// Successes and failures both count toward release. `succeeded + failed`
/// never exceeds `expected`.
#[derive(Debug, Clone, Default)]
pub struct DeleteFanIn {
    expected: usize,
    succeeded: usize,
    failed: usize,
}

impl DeleteFanIn {
    /// Create a barrier waiting for `expected` completions
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            ..Default::default()
        }
    }

    /// Record one completion
    pub fn record(&mut self, success: bool) -> FanInState {
        if self.is_released() {
            return FanInState::Closed;
        }
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        if self.is_released() {
            FanInState::Released
        } else {
            FanInState::Waiting
        }
    }

    /// All expected completions have been recorded
    pub fn is_released(&self) -> bool {
        self.completed() >= self.expected
    }

    pub fn completed(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn failed(&self) -> usize {
        self.failed
    }
}

impl SwiftClient {
    /// Move an object by copying it and then deleting the source.
    ///
    /// The delete is only issued after a successful copy. If the delete fails
    /// the object exists in both places and
    /// [`PartialFailure::CopiedNotDeleted`] is returned.
    #[instrument(skip(self))]
    pub async fn move_object(
        &self,
        container: &str,
        dest: &str,
        from_container: &str,
        source: &str,
    ) -> Result<CopyOutcome> {
        if container == from_container && dest == source {
            return Err(ClientError::InvalidArgument(format!(
                "cannot move {}/{} onto itself",
                container, source
            )));
        }

        let copied = self.copy_object(container, dest, from_container, source).await?;
        debug!(status = copied.status, "Copy step complete");

        match self.delete_object(from_container, source).await {
            Ok(_) => Ok(copied),
            Err(e) => {
                warn!("Moved object copied but source delete failed: {}", e);
                Err(PartialFailure::CopiedNotDeleted {
                    source_path: format!("{}/{}", from_container, source),
                    dest_path: format!("{}/{}", container, dest),
                    cause: Box::new(e),
                }
                .into())
            }
        }
    }

    /// Delete every object in a container, then the container itself.
    ///
    /// Object deletes run concurrently. The container delete is issued
    /// exactly once, after every object delete has completed, whether or not
    /// they succeeded. If the listing fails or is empty the container delete
    /// is issued straight away.
    #[instrument(skip(self))]
    pub async fn delete_container(&self, container: &str) -> Result<DeleteContainerOutcome> {
        let objects = match self.list_objects(container).await {
            Ok(objects) => objects,
            Err(e) => {
                warn!("Listing failed, deleting container directly: {}", e);
                Vec::new()
            }
        };

        let mut fan_in = DeleteFanIn::new(objects.len());
        let mut failed = Vec::new();

        if !objects.is_empty() {
            let mut pending: FuturesUnordered<_> = objects
                .into_iter()
                .map(|entry| async move {
                    let result = self.delete_object(container, &entry.name).await;
                    (entry.name, result)
                })
                .collect();

            while let Some((name, result)) = pending.next().await {
                let state = match result {
                    Ok(_) => fan_in.record(true),
                    Err(e) => {
                        warn!(object = %name, "Object delete failed: {}", e);
                        failed.push((name, e));
                        fan_in.record(false)
                    }
                };
                if state == FanInState::Released {
                    break;
                }
            }
        }

        debug!(
            expected = fan_in.expected(),
            succeeded = fan_in.succeeded(),
            failed = fan_in.failed(),
            "Object deletes complete"
        );

        let container_result = self.delete_empty_container(container).await;

        if failed.is_empty() {
            container_result?;
            info!(objects = fan_in.succeeded(), "Container deleted");
            return Ok(DeleteContainerOutcome {
                objects_deleted: fan_in.succeeded(),
            });
        }

        Err(PartialFailure::ChildDeletes {
            container: container.to_string(),
            failed,
            container_result: container_result.err().map(Box::new),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_in_releases_once() {
        let mut fan_in = DeleteFanIn::new(3);
        assert_eq!(fan_in.record(true), FanInState::Waiting);
        assert_eq!(fan_in.record(false), FanInState::Waiting);
        assert_eq!(fan_in.record(true), FanInState::Released);
        assert_eq!(fan_in.record(true), FanInState::Closed);

        assert_eq!(fan_in.completed(), 3);
        assert_eq!(fan_in.succeeded(), 2);
        assert_eq!(fan_in.failed(), 1);
    }

    #[test]
    fn test_fan_in_empty_is_released() {
        let mut fan_in = DeleteFanIn::new(0);
        assert!(fan_in.is_released());
        assert_eq!(fan_in.record(true), FanInState::Closed);
        assert_eq!(fan_in.completed(), 0);
    }

    #[test]
    fn test_failures_count_toward_release() {
        let mut fan_in = DeleteFanIn::new(2);
        fan_in.record(false);
        assert_eq!(fan_in.record(false), FanInState::Released);
        assert_eq!(fan_in.succeeded(), 0);
    }

    #[tokio::test]
    async fn test_move_onto_itself_rejected() {
        let client = SwiftClient::new(crate::Config::default()).unwrap();
        let result = client.move_object("box", "a.txt", "box", "a.txt").await;
        assert!(matches!(result, Err(ClientError::InvalidArgument(_))));
        assert!(client.session().is_none());
    }
}
