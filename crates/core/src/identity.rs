//! Users, organizations and memberships held by the identity provider (Clerk).

use crate::policy::{OrganizationRole, Principal};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::{Client, Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

pub const CLERK_API_URL: &str = "https://api.clerk.com/v1";

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("missing or invalid session token")]
    Unauthenticated,
    #[error("{0} not found")]
    NotFound(String),
    #[error("identity provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("identity provider returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// Organization to be created on behalf of an approved employer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewOrganization {
    pub name: String,
    /// Becomes the organization's first admin member.
    pub created_by: String,
    pub private_metadata: Value,
    pub public_metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub id: String,
    pub organization_id: String,
    pub role: String,
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    pub id: String,
    pub email_address: String,
    pub role: String,
    pub status: String,
}

/// Operations the service needs from the identity provider.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolves a bearer token to a user id.
    async fn authenticate(&self, token: &str) -> Result<String, IdentityError>;

    async fn get_user(&self, user_id: &str) -> Result<Principal, IdentityError>;

    /// Merges `metadata` into the user's public metadata.
    async fn update_public_metadata(&self, user_id: &str, metadata: Value) -> Result<(), IdentityError>;

    /// Returns the new organization's id.
    async fn create_organization(&self, organization: NewOrganization) -> Result<String, IdentityError>;

    async fn delete_organization(&self, organization_id: &str) -> Result<(), IdentityError>;

    /// Organizations the user belongs to, oldest membership first.
    async fn user_memberships(&self, user_id: &str) -> Result<Vec<Membership>, IdentityError>;

    async fn memberships(&self, organization_id: &str) -> Result<Vec<Membership>, IdentityError>;

    async fn invite_member(
        &self,
        organization_id: &str,
        inviter_user_id: &str,
        email: &str,
        role: &str,
    ) -> Result<Invitation, IdentityError>;

    async fn pending_invitations(&self, organization_id: &str) -> Result<Vec<Invitation>, IdentityError>;

    async fn revoke_invitation(
        &self,
        organization_id: &str,
        invitation_id: &str,
        requesting_user_id: &str,
    ) -> Result<(), IdentityError>;

    async fn remove_member(&self, organization_id: &str, user_id: &str) -> Result<(), IdentityError>;
}

#[derive(Deserialize)]
struct ClerkEmail {
    id: String,
    email_address: String,
}

#[derive(Deserialize)]
struct ClerkUser {
    id: String,
    #[serde(default)]
    email_addresses: Vec<ClerkEmail>,
    #[serde(default)]
    primary_email_address_id: Option<String>,
    #[serde(default)]
    public_metadata: Value,
}

impl From<ClerkUser> for Principal {
    fn from(user: ClerkUser) -> Self {
        let email = user
            .email_addresses
            .iter()
            .find(|e| Some(&e.id) == user.primary_email_address_id.as_ref())
            .or_else(|| user.email_addresses.first())
            .map(|e| e.email_address.clone());
        let role = user
            .public_metadata
            .get("role")
            .and_then(Value::as_str)
            .map(str::to_string);
        let organization_role = user
            .public_metadata
            .get("organizationRole")
            .cloned()
            .and_then(|v| serde_json::from_value::<OrganizationRole>(v).ok());
        Principal {
            user_id: user.id,
            email,
            role,
            organization_role,
        }
    }
}

#[derive(Deserialize)]
struct ClerkSession {
    id: String,
    user_id: String,
    status: String,
}

#[derive(Deserialize)]
struct ClerkClientState {
    #[serde(default)]
    sessions: Vec<ClerkSession>,
    last_active_session_id: Option<String>,
}

#[derive(Deserialize)]
struct Created {
    id: String,
}

#[derive(Deserialize)]
struct Page<T> {
    data: Vec<T>,
}

#[derive(Deserialize)]
struct ClerkOrganizationRef {
    id: String,
}

#[derive(Deserialize, Default)]
struct ClerkPublicUserData {
    user_id: Option<String>,
    identifier: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
}

#[derive(Deserialize)]
struct ClerkMembership {
    id: String,
    role: String,
    organization: ClerkOrganizationRef,
    #[serde(default)]
    public_user_data: Option<ClerkPublicUserData>,
}

impl From<ClerkMembership> for Membership {
    fn from(m: ClerkMembership) -> Self {
        let user = m.public_user_data.unwrap_or_default();
        Membership {
            id: m.id,
            organization_id: m.organization.id,
            role: m.role,
            user_id: user.user_id,
            email: user.identifier,
            first_name: user.first_name,
            last_name: user.last_name,
        }
    }
}

#[derive(Deserialize)]
struct ClerkInvitation {
    id: String,
    email_address: String,
    role: String,
    status: String,
}

impl From<ClerkInvitation> for Invitation {
    fn from(i: ClerkInvitation) -> Self {
        Invitation {
            id: i.id,
            email_address: i.email_address,
            role: i.role,
            status: i.status,
        }
    }
}

/// [`IdentityProvider`] backed by the Clerk Backend API.
pub struct ClerkClient {
    client: Client,
    secret_key: SecretString,
    base_url: String,
}

impl ClerkClient {
    pub fn new(secret_key: SecretString, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            secret_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(self.secret_key.expose_secret())
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<T, IdentityError> {
        let resp = req.send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(IdentityError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!("Clerk request for {} failed with {}: {}", what, status, body);
            return Err(IdentityError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json::<T>().await?)
    }
}

#[async_trait]
impl IdentityProvider for ClerkClient {
    async fn authenticate(&self, token: &str) -> Result<String, IdentityError> {
        let req = self
            .request(Method::POST, "/clients/verify")
            .json(&json!({ "token": token }));
        let state: ClerkClientState = match self.send(req, "session").await {
            Ok(state) => state,
            Err(IdentityError::NotFound(_)) => return Err(IdentityError::Unauthenticated),
            Err(IdentityError::Api { status, .. }) if (400..500).contains(&status) => {
                return Err(IdentityError::Unauthenticated);
            }
            Err(e) => return Err(e),
        };
        active_user(&state).ok_or(IdentityError::Unauthenticated)
    }

    async fn get_user(&self, user_id: &str) -> Result<Principal, IdentityError> {
        let user: ClerkUser = self
            .send(self.request(Method::GET, &format!("/users/{user_id}")), "user")
            .await?;
        Ok(user.into())
    }

    async fn update_public_metadata(&self, user_id: &str, metadata: Value) -> Result<(), IdentityError> {
        let req = self
            .request(Method::PATCH, &format!("/users/{user_id}/metadata"))
            .json(&json!({ "public_metadata": metadata }));
        let _: Value = self.send(req, "user").await?;
        Ok(())
    }

    async fn create_organization(&self, organization: NewOrganization) -> Result<String, IdentityError> {
        let req = self.request(Method::POST, "/organizations").json(&organization);
        let created: Created = self.send(req, "organization").await?;
        tracing::info!("Created Clerk organization {}", created.id);
        Ok(created.id)
    }

    async fn delete_organization(&self, organization_id: &str) -> Result<(), IdentityError> {
        let req = self.request(Method::DELETE, &format!("/organizations/{organization_id}"));
        let _: Value = self.send(req, "organization").await?;
        tracing::info!("Deleted Clerk organization {}", organization_id);
        Ok(())
    }

    async fn user_memberships(&self, user_id: &str) -> Result<Vec<Membership>, IdentityError> {
        let req = self.request(
            Method::GET,
            &format!("/users/{user_id}/organization_memberships"),
        );
        let page: Page<ClerkMembership> = self.send(req, "user").await?;
        Ok(page.data.into_iter().map(Membership::from).collect())
    }

    async fn memberships(&self, organization_id: &str) -> Result<Vec<Membership>, IdentityError> {
        let req = self.request(
            Method::GET,
            &format!("/organizations/{organization_id}/memberships"),
        );
        let page: Page<ClerkMembership> = self.send(req, "organization").await?;
        Ok(page.data.into_iter().map(Membership::from).collect())
    }

    async fn invite_member(
        &self,
        organization_id: &str,
        inviter_user_id: &str,
        email: &str,
        role: &str,
    ) -> Result<Invitation, IdentityError> {
        let req = self
            .request(
                Method::POST,
                &format!("/organizations/{organization_id}/invitations"),
            )
            .json(&json!({
                "email_address": email,
                "inviter_user_id": inviter_user_id,
                "role": role,
            }));
        let invitation: ClerkInvitation = self.send(req, "organization").await?;
        Ok(invitation.into())
    }

    async fn pending_invitations(&self, organization_id: &str) -> Result<Vec<Invitation>, IdentityError> {
        let req = self
            .request(
                Method::GET,
                &format!("/organizations/{organization_id}/invitations"),
            )
            .query(&[("status", "pending")]);
        let page: Page<ClerkInvitation> = self.send(req, "organization").await?;
        Ok(page.data.into_iter().map(Invitation::from).collect())
    }

    async fn revoke_invitation(
        &self,
        organization_id: &str,
        invitation_id: &str,
        requesting_user_id: &str,
    ) -> Result<(), IdentityError> {
        let req = self
            .request(
                Method::POST,
                &format!("/organizations/{organization_id}/invitations/{invitation_id}/revoke"),
            )
            .json(&json!({ "requesting_user_id": requesting_user_id }));
        let _: Value = self.send(req, "invitation").await?;
        Ok(())
    }

    async fn remove_member(&self, organization_id: &str, user_id: &str) -> Result<(), IdentityError> {
        let req = self.request(
            Method::DELETE,
            &format!("/organizations/{organization_id}/memberships/{user_id}"),
        );
        let _: Value = self.send(req, "membership").await?;
        Ok(())
    }
}

fn active_user(state: &ClerkClientState) -> Option<String> {
    let active = state.last_active_session_id.as_deref()?;
    state
        .sessions
        .iter()
        .find(|s| s.id == active && s.status == "active")
        .map(|s| s.user_id.clone())
}
