//! Registration and approval workflows for employers and their organizations.

use crate::identity::{IdentityError, IdentityProvider, Invitation, Membership, NewOrganization};
use crate::policy::{AuthorizationPolicy, Principal};
use crate::registration::{
    ApprovalStatus, Employer, EmployerForm, Organization, OrganizationForm, ValidationError,
    Validator,
};
use crate::store::{DocumentStore, StoreError};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

pub const MEMBER_ROLES: [&str; 2] = ["org:member", "org:admin"];

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("A registration with this email already exists")]
    DuplicateEmail,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidState(String),
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

impl From<StoreError> for WorkflowError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(_) => WorkflowError::DuplicateEmail,
            StoreError::NotFound(what) => WorkflowError::NotFound(format!("{what} not found")),
            other => WorkflowError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Everything an admin or employer can do to registration records.
///
/// The store and identity provider are injected so the same workflows run
/// against Clerk in production and against mocks in tests.
pub struct ApprovalService {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    validator: Validator,
}

impl ApprovalService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        validator: Validator,
    ) -> Self {
        Self {
            store,
            identity,
            validator,
        }
    }

    pub async fn register_employer(&self, form: EmployerForm) -> Result<Employer> {
        let employer = self.validator.employer(form, Utc::now())?;
        self.store.insert_employer(employer.clone()).await?;
        tracing::info!(
            "Employer registration {} submitted for {}",
            employer.id,
            employer.company_name
        );
        Ok(employer)
    }

    pub async fn list_employer_registrations(&self) -> Result<Vec<Employer>> {
        Ok(self.store.employers().await?)
    }

    pub async fn review_employer_registration(
        &self,
        id: Uuid,
        status: ApprovalStatus,
        reviewer_id: &str,
    ) -> Result<Employer> {
        if status == ApprovalStatus::Pending {
            return Err(ValidationError::single("Invalid status").into());
        }
        let mut employer = self
            .store
            .employer(id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound("Registration not found".to_string()))?;

        let now = Utc::now();
        employer.status = status;
        employer.updated_at = now;
        if status == ApprovalStatus::Approved {
            employer.approved_by = Some(reviewer_id.to_string());
            employer.approved_at = Some(now);
        }
        self.store.update_employer(employer.clone()).await?;
        tracing::info!("Registration {} {} by {}", id, status, reviewer_id);
        Ok(employer)
    }

    /// The approved registration whose contact email matches the user's.
    pub async fn employer_profile(&self, email: &str) -> Result<Employer> {
        self.store
            .employer_by_email(email)
            .await?
            .filter(|e| e.status == ApprovalStatus::Approved)
            .ok_or_else(|| {
                WorkflowError::NotFound("Employer profile not found or not approved".to_string())
            })
    }

    pub async fn request_organization(
        &self,
        principal: &Principal,
        form: OrganizationForm,
    ) -> Result<Organization> {
        let email = principal
            .email
            .as_deref()
            .ok_or_else(|| ValidationError::single("An email address is required"))?;
        let organization =
            self.validator
                .organization(form, &principal.user_id, email, Utc::now())?;
        self.store.insert_organization(organization.clone()).await?;
        tracing::info!(
            "Organization request {} created by {}",
            organization.id,
            principal.user_id
        );
        Ok(organization)
    }

    pub async fn list_organizations(&self) -> Result<Vec<Organization>> {
        Ok(self.store.organizations().await?)
    }

    pub async fn organization_status(&self, clerk_org_id: &str) -> Result<ApprovalStatus> {
        self.store
            .organization_by_clerk_id(clerk_org_id)
            .await?
            .map(|o| o.status)
            .ok_or_else(|| WorkflowError::NotFound("Organization not found".to_string()))
    }

    /// Provisions the organization in the identity provider and marks it approved.
    ///
    /// If anything fails once the remote organization exists, it is deleted
    /// again and the local record stays pending.
    pub async fn approve_organization(&self, id: Uuid) -> Result<Organization> {
        let organization = self.find_organization(id).await?;
        if organization.status == ApprovalStatus::Approved {
            return Err(WorkflowError::InvalidState(
                "Organization is already approved".to_string(),
            ));
        }

        let clerk_org_id = self
            .identity
            .create_organization(NewOrganization {
                name: organization.name.clone(),
                created_by: organization.user_id.clone(),
                private_metadata: json!({
                    "companySize": organization.company_size,
                    "industry": organization.industry,
                }),
                public_metadata: json!({ "status": "approved", "role": "employer" }),
            })
            .await?;

        match self.finish_approval(organization, &clerk_org_id).await {
            Ok(approved) => {
                tracing::info!("Organization {} approved as {}", id, clerk_org_id);
                Ok(approved)
            }
            Err(e) => {
                tracing::error!("Approval of {} failed after creating {}: {}", id, clerk_org_id, e);
                if let Err(cleanup) = self.identity.delete_organization(&clerk_org_id).await {
                    tracing::error!("Failed to clean up organization {}: {}", clerk_org_id, cleanup);
                }
                Err(e)
            }
        }
    }

    async fn finish_approval(
        &self,
        mut organization: Organization,
        clerk_org_id: &str,
    ) -> Result<Organization> {
        self.identity
            .update_public_metadata(
                &organization.user_id,
                json!({ "organizationRole": "employer" }),
            )
            .await?;
        organization.status = ApprovalStatus::Approved;
        organization.clerk_org_id = Some(clerk_org_id.to_string());
        organization.updated_at = Utc::now();
        self.store.update_organization(organization.clone()).await?;
        Ok(organization)
    }

    pub async fn reject_organization(&self, id: Uuid) -> Result<Organization> {
        let mut organization = self.find_organization(id).await?;
        if organization.status == ApprovalStatus::Approved {
            return Err(WorkflowError::InvalidState(
                "Approved organizations cannot be rejected".to_string(),
            ));
        }
        organization.status = ApprovalStatus::Rejected;
        organization.updated_at = Utc::now();
        self.store.update_organization(organization.clone()).await?;
        tracing::info!("Organization {} rejected", id);
        Ok(organization)
    }

    pub async fn make_admin(&self, user_id: &str) -> Result<()> {
        self.identity
            .update_public_metadata(user_id, json!({ "role": "admin" }))
            .await?;
        tracing::info!("User {} is now an admin", user_id);
        Ok(())
    }

    /// Resolves what the principal may access.
    ///
    /// An identity-provider membership takes precedence; otherwise the user's
    /// own latest (possibly still pending) request decides.
    pub async fn resolve_policy(&self, principal: &Principal) -> Result<AuthorizationPolicy> {
        if principal.is_admin() {
            return Ok(AuthorizationPolicy::Admin);
        }
        let memberships = self.identity.user_memberships(&principal.user_id).await?;
        let status = match memberships.first() {
            Some(membership) => self
                .store
                .organization_by_clerk_id(&membership.organization_id)
                .await?
                .map(|o| o.status),
            None => None,
        };
        let status = match status {
            Some(status) => Some(status),
            None => self
                .store
                .organization_for_user(&principal.user_id)
                .await?
                .map(|o| o.status),
        };
        Ok(AuthorizationPolicy::resolve(principal, status))
    }

    /// The identity-provider organization the employer manages.
    pub async fn employer_organization_id(&self, principal: &Principal) -> Result<String> {
        self.identity
            .user_memberships(&principal.user_id)
            .await?
            .into_iter()
            .next()
            .map(|m| m.organization_id)
            .ok_or_else(|| WorkflowError::NotFound("Organization not found".to_string()))
    }

    pub async fn members(&self, principal: &Principal) -> Result<Vec<Membership>> {
        let org_id = self.employer_organization_id(principal).await?;
        Ok(self.identity.memberships(&org_id).await?)
    }

    pub async fn invite_member(
        &self,
        principal: &Principal,
        email: &str,
        role: &str,
    ) -> Result<Invitation> {
        let email = email.trim().to_lowercase();
        if !self.validator.is_valid_email(&email) {
            return Err(ValidationError::single("Please enter a valid email address").into());
        }
        if !MEMBER_ROLES.contains(&role) {
            return Err(ValidationError::single(format!("Invalid role: {role}")).into());
        }
        let org_id = self.employer_organization_id(principal).await?;
        let invitation = self
            .identity
            .invite_member(&org_id, &principal.user_id, &email, role)
            .await?;
        tracing::info!("Invited {} to {} as {}", email, org_id, role);
        Ok(invitation)
    }

    pub async fn pending_invitations(&self, principal: &Principal) -> Result<Vec<Invitation>> {
        let org_id = self.employer_organization_id(principal).await?;
        Ok(self.identity.pending_invitations(&org_id).await?)
    }

    pub async fn revoke_invitation(&self, principal: &Principal, invitation_id: &str) -> Result<()> {
        let org_id = self.employer_organization_id(principal).await?;
        self.identity
            .revoke_invitation(&org_id, invitation_id, &principal.user_id)
            .await?;
        Ok(())
    }

    pub async fn remove_member(&self, principal: &Principal, user_id: &str) -> Result<()> {
        if user_id == principal.user_id {
            return Err(WorkflowError::InvalidState(
                "You cannot remove yourself from the organization".to_string(),
            ));
        }
        let org_id = self.employer_organization_id(principal).await?;
        self.identity.remove_member(&org_id, user_id).await?;
        tracing::info!("Removed {} from {}", user_id, org_id);
        Ok(())
    }

    async fn find_organization(&self, id: Uuid) -> Result<Organization> {
        self.store
            .organization(id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound("Organization not found".to_string()))
    }
}
