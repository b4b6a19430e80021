//! Client-side convergence checks.
//!
//! A client applies the server's patch to its local map and must arrive at
//! exactly the checksum the server declared. Anything else means the two
//! sides disagree about the basis, and the client should drop its state and
//! pull from scratch.

use deltasync_core::{apply, ContentHash, CoreError, VersionedMap};

use crate::messages::{PullRequest, PullResponse};

/// Apply a pull response to `local` and verify the result.
///
/// On success the returned map has `response.checksum`. On
/// [`CoreError::ChecksumMismatch`] the client's state is unusable.
pub fn apply_pull_response(
    local: &VersionedMap,
    response: &PullResponse,
) -> Result<VersionedMap, CoreError> {
    let next = apply(local, &response.patch)?;
    if next.checksum() != response.checksum {
        return Err(CoreError::ChecksumMismatch {
            expected: response.checksum,
            actual: next.checksum(),
        });
    }
    Ok(next)
}

/// A client replica driven by pull responses.
#[derive(Debug, Clone, Default)]
pub struct ClientState {
    state_id: Option<ContentHash>,
    map: VersionedMap,
}

impl ClientState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state_id(&self) -> Option<&ContentHash> {
        self.state_id.as_ref()
    }

    pub fn map(&self) -> &VersionedMap {
        &self.map
    }

    /// Build the next request for this replica.
    pub fn pull_request(&self, account_id: &str, client_id: &str) -> PullRequest {
        match &self.state_id {
            Some(id) => PullRequest::from_state(account_id, client_id, id, self.map.checksum()),
            None => PullRequest::fresh(account_id, client_id),
        }
    }

    /// Apply a response. On error the replica resets so the next pull is a
    /// full resync.
    pub fn apply(&mut self, response: &PullResponse) -> Result<(), CoreError> {
        match apply_pull_response(&self.map, response) {
            Ok(map) => {
                self.map = map;
                self.state_id = Some(response.state_id);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(state_id = %response.state_id, error = %e, "discarding client state");
                *self = Self::new();
                Err(e)
            }
        }
    }
}
