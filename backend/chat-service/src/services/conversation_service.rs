use crate::error::{AppError, AppResult};
use crate::models::{ConversationSummary, CounterpartProfile, Message, MessageView, Page, UserId};
use crate::services::profile_directory::ProfileDirectory;
use crate::store::{DeletedFilter, MessageStore};
use std::sync::Arc;

/// Read side of the chat: conversation list and per-pair history.
pub struct ConversationService {
    store: Arc<dyn MessageStore>,
    profiles: Arc<dyn ProfileDirectory>,
    file_base_url: String,
}

impl ConversationService {
    pub fn new(
        store: Arc<dyn MessageStore>,
        profiles: Arc<dyn ProfileDirectory>,
        file_base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            profiles,
            file_base_url: file_base_url.into(),
        }
    }

    /// One row per counterpart, most recently active first.
    pub async fn recent_conversations(
        &self,
        user: &UserId,
        page: Page,
    ) -> AppResult<Vec<ConversationSummary>> {
        let latest = self
            .store
            .latest_per_counterpart(user, DeletedFilter::Exclude, page)
            .await?;

        let counterparts: Vec<UserId> = latest
            .iter()
            .map(|m| m.counterpart_of(user).clone())
            .collect();

        // A profile outage degrades the rows, it does not fail the listing.
        let profiles = match self.profiles.profiles(&counterparts).await {
            Ok(profiles) => profiles,
            Err(e) => {
                tracing::warn!(user_id = %user, error = %e, "profile lookup failed");
                Default::default()
            }
        };

        Ok(latest
            .into_iter()
            .zip(counterparts)
            .map(|(message, counterpart_id)| ConversationSummary {
                user: CounterpartProfile::from_profile(
                    profiles.get(&counterpart_id),
                    &counterpart_id,
                    &self.file_base_url,
                ),
                counterpart_id,
                last_message: MessageView::from(message),
            })
            .collect())
    }

    pub async fn history(
        &self,
        user: &UserId,
        counterpart: &UserId,
        page: Page,
    ) -> AppResult<Vec<Message>> {
        if !counterpart.is_well_formed() {
            return Err(AppError::Validation("Invalid receiver ID format".into()));
        }
        self.store
            .between(user, counterpart, DeletedFilter::Exclude, page)
            .await
    }
}
