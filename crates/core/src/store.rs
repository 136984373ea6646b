use crate::registration::{Employer, Organization};
use crate::session_state::Conversation;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("document store is closed")]
    Closed,
    #[error("duplicate value for unique field {0}")]
    Duplicate(&'static str),
    #[error("{0} not found")]
    NotFound(String),
}

/// Persistence for registration records and saved transcripts.
///
/// Listing methods return records newest first.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] if the contact email is taken.
    async fn insert_employer(&self, employer: Employer) -> Result<(), StoreError>;

    async fn employers(&self) -> Result<Vec<Employer>, StoreError>;

    async fn employer(&self, id: Uuid) -> Result<Option<Employer>, StoreError>;

    async fn employer_by_email(&self, email: &str) -> Result<Option<Employer>, StoreError>;

    async fn update_employer(&self, employer: Employer) -> Result<(), StoreError>;

    async fn insert_organization(&self, organization: Organization) -> Result<(), StoreError>;

    async fn organizations(&self) -> Result<Vec<Organization>, StoreError>;

    async fn organization(&self, id: Uuid) -> Result<Option<Organization>, StoreError>;

    async fn organization_by_clerk_id(
        &self,
        clerk_org_id: &str,
    ) -> Result<Option<Organization>, StoreError>;

    /// The most recent request made by the user, if any.
    async fn organization_for_user(&self, user_id: &str)
    -> Result<Option<Organization>, StoreError>;

    async fn update_organization(&self, organization: Organization) -> Result<(), StoreError>;

    async fn insert_conversation(&self, conversation: Conversation) -> Result<(), StoreError>;

    async fn conversations(&self) -> Result<Vec<Conversation>, StoreError>;
}

#[derive(Default)]
struct Collections {
    employers: HashMap<Uuid, Employer>,
    organizations: HashMap<Uuid, Organization>,
    conversations: Vec<Conversation>,
}

/// In-process [`DocumentStore`]. Contents are lost when the process exits.
pub struct MemoryStore {
    state: RwLock<Option<Collections>>,
}

impl MemoryStore {
    pub fn open() -> Self {
        tracing::info!("Opened in-memory document store");
        Self {
            state: RwLock::new(Some(Collections::default())),
        }
    }

    /// Drops all records; later calls fail with [`StoreError::Closed`].
    pub async fn close(&self) {
        if self.state.write().await.take().is_some() {
            tracing::info!("Closed in-memory document store");
        }
    }
}

fn newest_first<T>(mut items: Vec<T>, created: impl Fn(&T) -> chrono::DateTime<chrono::Utc>) -> Vec<T> {
    items.sort_by_key(|item| std::cmp::Reverse(created(item)));
    items
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_employer(&self, employer: Employer) -> Result<(), StoreError> {
        let mut guard = self.state.write().await;
        let state = guard.as_mut().ok_or(StoreError::Closed)?;
        if state
            .employers
            .values()
            .any(|e| e.contact_email == employer.contact_email)
        {
            return Err(StoreError::Duplicate("contactEmail"));
        }
        state.employers.insert(employer.id, employer);
        Ok(())
    }

    async fn employers(&self) -> Result<Vec<Employer>, StoreError> {
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or(StoreError::Closed)?;
        Ok(newest_first(
            state.employers.values().cloned().collect(),
            |e| e.created_at,
        ))
    }

    async fn employer(&self, id: Uuid) -> Result<Option<Employer>, StoreError> {
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or(StoreError::Closed)?;
        Ok(state.employers.get(&id).cloned())
    }

    async fn employer_by_email(&self, email: &str) -> Result<Option<Employer>, StoreError> {
        let email = email.trim().to_lowercase();
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or(StoreError::Closed)?;
        Ok(state
            .employers
            .values()
            .find(|e| e.contact_email == email)
            .cloned())
    }

    async fn update_employer(&self, employer: Employer) -> Result<(), StoreError> {
        let mut guard = self.state.write().await;
        let state = guard.as_mut().ok_or(StoreError::Closed)?;
        match state.employers.get_mut(&employer.id) {
            Some(slot) => {
                *slot = employer;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("employer {}", employer.id))),
        }
    }

    async fn insert_organization(&self, organization: Organization) -> Result<(), StoreError> {
        let mut guard = self.state.write().await;
        let state = guard.as_mut().ok_or(StoreError::Closed)?;
        state.organizations.insert(organization.id, organization);
        Ok(())
    }

    async fn organizations(&self) -> Result<Vec<Organization>, StoreError> {
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or(StoreError::Closed)?;
        Ok(newest_first(
            state.organizations.values().cloned().collect(),
            |o| o.created_at,
        ))
    }

    async fn organization(&self, id: Uuid) -> Result<Option<Organization>, StoreError> {
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or(StoreError::Closed)?;
        Ok(state.organizations.get(&id).cloned())
    }

    async fn organization_by_clerk_id(
        &self,
        clerk_org_id: &str,
    ) -> Result<Option<Organization>, StoreError> {
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or(StoreError::Closed)?;
        Ok(state
            .organizations
            .values()
            .find(|o| o.clerk_org_id.as_deref() == Some(clerk_org_id))
            .cloned())
    }

    async fn organization_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<Organization>, StoreError> {
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or(StoreError::Closed)?;
        Ok(state
            .organizations
            .values()
            .filter(|o| o.user_id == user_id)
            .max_by_key(|o| o.created_at)
            .cloned())
    }

    async fn update_organization(&self, organization: Organization) -> Result<(), StoreError> {
        let mut guard = self.state.write().await;
        let state = guard.as_mut().ok_or(StoreError::Closed)?;
        match state.organizations.get_mut(&organization.id) {
            Some(slot) => {
                *slot = organization;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!(
                "organization {}",
                organization.id
            ))),
        }
    }

    async fn insert_conversation(&self, conversation: Conversation) -> Result<(), StoreError> {
        let mut guard = self.state.write().await;
        let state = guard.as_mut().ok_or(StoreError::Closed)?;
        state.conversations.push(conversation);
        Ok(())
    }

    async fn conversations(&self) -> Result<Vec<Conversation>, StoreError> {
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or(StoreError::Closed)?;
        // Reversed first so equal timestamps still list the later insert first.
        let conversations = state.conversations.iter().rev().cloned().collect();
        Ok(newest_first(conversations, |c| c.created_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::{ApprovalStatus, EmployerForm, OrganizationForm, Validator};
    use crate::session_state::Turn;
    use chrono::{Duration, Utc};

    fn employer(email: &str, minutes_ago: i64) -> Employer {
        Validator::new()
            .unwrap()
            .employer(
                EmployerForm {
                    company_name: "Acme".into(),
                    location: "Remote".into(),
                    company_details: "Widgets".into(),
                    industry: "Manufacturing".into(),
                    company_size: "1-10".into(),
                    website: None,
                    contact_person_name: "Ada".into(),
                    contact_email: email.into(),
                    contact_phone: "555-0100".into(),
                },
                Utc::now() - Duration::minutes(minutes_ago),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_contact_email_is_rejected() {
        let store = MemoryStore::open();
        store.insert_employer(employer("ada@acme.com", 0)).await.unwrap();

        let err = store
            .insert_employer(employer("ada@acme.com", 0))
            .await
            .unwrap_err();

        assert_eq!(err, StoreError::Duplicate("contactEmail"));
    }

    #[tokio::test]
    async fn test_employers_are_listed_newest_first() {
        let store = MemoryStore::open();
        store.insert_employer(employer("old@acme.com", 30)).await.unwrap();
        store.insert_employer(employer("new@acme.com", 1)).await.unwrap();

        let listed = store.employers().await.unwrap();

        assert_eq!(listed[0].contact_email, "new@acme.com");
        assert_eq!(listed[1].contact_email, "old@acme.com");
    }

    #[tokio::test]
    async fn test_lookup_by_email_ignores_case() {
        let store = MemoryStore::open();
        store.insert_employer(employer("ada@acme.com", 0)).await.unwrap();

        let found = store.employer_by_email("ADA@acme.com").await.unwrap();

        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_organization_lookups() {
        let store = MemoryStore::open();
        let mut org = Validator::new()
            .unwrap()
            .organization(
                OrganizationForm {
                    company_name: "Acme".into(),
                    company_size: "11-50".into(),
                    industry: "Retail".into(),
                },
                "user_1",
                "ada@acme.com",
                Utc::now(),
            )
            .unwrap();
        store.insert_organization(org.clone()).await.unwrap();
        assert!(store.organization_by_clerk_id("org_1").await.unwrap().is_none());

        org.clerk_org_id = Some("org_1".into());
        org.status = ApprovalStatus::Approved;
        store.update_organization(org.clone()).await.unwrap();

        let by_clerk = store.organization_by_clerk_id("org_1").await.unwrap().unwrap();
        assert_eq!(by_clerk.status, ApprovalStatus::Approved);
        let for_user = store.organization_for_user("user_1").await.unwrap();
        assert_eq!(for_user.map(|o| o.id), Some(org.id));
    }

    #[tokio::test]
    async fn test_conversations_are_listed_newest_first() {
        let store = MemoryStore::open();
        let older = Conversation::new(
            vec![Turn::interviewer("Q1")],
            Utc::now() - Duration::minutes(10),
        )
        .unwrap();
        let newer = Conversation::new(vec![Turn::candidate("A1")], Utc::now()).unwrap();
        store.insert_conversation(older.clone()).await.unwrap();
        store.insert_conversation(newer.clone()).await.unwrap();

        let listed = store.conversations().await.unwrap();

        assert_eq!(listed, vec![newer, older]);
    }

    #[tokio::test]
    async fn test_closed_store_rejects_calls() {
        let store = MemoryStore::open();
        store.close().await;

        assert_eq!(store.employers().await.unwrap_err(), StoreError::Closed);
        assert_eq!(
            store.insert_employer(employer("a@b.com", 0)).await.unwrap_err(),
            StoreError::Closed
        );
    }

    #[tokio::test]
    async fn test_updating_unknown_record_is_not_found() {
        let store = MemoryStore::open();
        let err = store
            .update_employer(employer("ghost@acme.com", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
