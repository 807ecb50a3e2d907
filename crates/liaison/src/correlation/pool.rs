//! Responses received but not yet claimed by a waiter.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::message::{Command, Response, is_paired};

/// Shared multiset of unclaimed responses.
///
/// Every claim removes the response under the lock, so a response is handed
/// to at most one waiter.
#[derive(Debug, Default)]
pub struct ResponsePool {
    responses: Mutex<Vec<Response>>,
}

impl ResponsePool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Response>> {
        self.responses.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds an inbound response.
    pub fn push(&self, response: Response) {
        self.lock().push(response);
    }

    /// Number of unclaimed responses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the pool is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops every unclaimed response, returning how many were held.
    #[must_use]
    pub fn clear(&self) -> usize {
        let mut responses = self.lock();
        let dropped = responses.len();
        responses.clear();
        dropped
    }

    /// Removes and returns the oldest response paired with `command`.
    #[must_use]
    pub fn claim(&self, command: &Command) -> Option<Response> {
        let mut responses = self.lock();
        let index = responses
            .iter()
            .position(|response| is_paired(command, response))?;
        Some(responses.remove(index))
    }

    /// Sort-merge claim for a batch.
    ///
    /// `pending` holds `(slot, command)` entries ordered by command name; a
    /// claimed response is stored in `claimed[slot]`. The pool is sorted by
    /// name (stably, so arrival order decides between equal names) and each
    /// scan resumes where the previous one started. Returns how many
    /// responses were claimed.
    pub(crate) fn claim_sorted(
        &self,
        pending: &[(usize, &Command)],
        claimed: &mut [Option<Response>],
    ) -> usize {
        let mut responses = self.lock();
        if responses.is_empty() {
            return 0;
        }
        responses.sort_by(|a, b| a.name().cmp(b.name()));

        let mut start = 0;
        let mut count = 0;
        for &(slot, command) in pending {
            let Some(entry) = claimed.get_mut(slot).filter(|entry| entry.is_none()) else {
                continue;
            };
            while responses
                .get(start)
                .is_some_and(|candidate| candidate.name() < command.name())
            {
                start += 1;
            }
            let lead = leading_byte(command.name());
            let mut index = start;
            while let Some(candidate) = responses.get(index) {
                if leading_byte(candidate.name()) > lead {
                    break;
                }
                if is_paired(command, candidate) {
                    *entry = Some(responses.remove(index));
                    count += 1;
                    break;
                }
                index += 1;
            }
        }
        count
    }
}

fn leading_byte(name: &str) -> u8 {
    name.as_bytes().first().copied().unwrap_or_default()
}
