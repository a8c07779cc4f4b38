//! UserSearch - debounced, latest-wins participant search.
//!
//! Every keystroke calls [`UserSearch::search`]. A call waits out the
//! debounce window and only issues a request if no newer keystroke arrived
//! meanwhile. A response that lands after a newer keystroke is discarded.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use crate::domain::foundation::UserId;
use crate::domain::messaging::{MessagingError, Role, UserSummary, Viewer};
use crate::ports::{UserDirectory, UserSearchQuery};

/// Debounce window and minimum query length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchSettings {
    pub debounce: Duration,
    pub min_chars: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            min_chars: 2,
        }
    }
}

/// What happened to one keystroke's search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Results were applied and are now shown.
    Applied(Vec<UserSummary>),
    /// A newer keystroke took over; nothing was applied.
    Superseded,
    /// The query is too short; results were cleared without a request.
    Cleared,
}

#[derive(Default)]
struct SearchState {
    generation: u64,
    results: Vec<UserSummary>,
}

/// Participant picker search for one composer or roster view.
pub struct UserSearch {
    directory: Arc<dyn UserDirectory>,
    settings: SearchSettings,
    state: Mutex<SearchState>,
}

impl UserSearch {
    pub fn new(directory: Arc<dyn UserDirectory>, settings: SearchSettings) -> Self {
        Self {
            directory,
            settings,
            state: Mutex::new(SearchState::default()),
        }
    }

    /// Results currently shown.
    pub fn results(&self) -> Vec<UserSummary> {
        self.lock().results.clone()
    }

    /// Handles one keystroke.
    ///
    /// `selected` are users already picked as participants; they never
    /// appear in results.
    ///
    /// # Errors
    ///
    /// - `Network` if the latest request fails; shown results are kept
    pub async fn search(
        &self,
        viewer: &Viewer,
        text: &str,
        role: Option<Role>,
        selected: &[UserId],
    ) -> Result<SearchOutcome, MessagingError> {
        let text = text.trim().to_string();
        let generation = {
            let mut state = self.lock();
            state.generation += 1;
            if text.chars().count() < self.settings.min_chars {
                state.results.clear();
                return Ok(SearchOutcome::Cleared);
            }
            state.generation
        };

        tokio::time::sleep(self.settings.debounce).await;
        if !self.is_current(generation) {
            return Ok(SearchOutcome::Superseded);
        }

        let mut query = UserSearchQuery::new(text.as_str());
        if let Some(role) = role {
            query = query.with_role(role);
        }
        if let Some(establishment_id) = &viewer.establishment_id {
            query = query.with_establishment(establishment_id.clone());
        }

        debug!(query = %text, "Searching users");
        let response = self.directory.search_users(&viewer.id, &query).await;

        let mut state = self.lock();
        if state.generation != generation {
            warn!(query = %text, "Discarding stale user search response");
            return Ok(SearchOutcome::Superseded);
        }
        match response {
            Ok(users) => {
                let users: Vec<UserSummary> = users
                    .into_iter()
                    .filter(|u| u.id != viewer.id && !selected.contains(&u.id))
                    .collect();
                state.results = users.clone();
                Ok(SearchOutcome::Applied(users))
            }
            Err(e) => {
                warn!(query = %text, error = %e, "User search failed");
                Err(e)
            }
        }
    }

    /// Invalidates any pending keystroke and clears results.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.results.clear();
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    fn lock(&self) -> MutexGuard<'_, SearchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
