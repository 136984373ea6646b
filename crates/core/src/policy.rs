//! Role and approval gating for every protected area of the app.
//!
//! A request is resolved once into an [`AuthorizationPolicy`] from the signed-in
//! [`Principal`] and the status of their organization request; the policy then
//! answers for any [`Area`].

use crate::registration::ApprovalStatus;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const HOME: &str = "/";
pub const CANDIDATE_HOME: &str = "/dashboard";
pub const EMPLOYER_HOME: &str = "/recruiter/dashboard";
pub const ONBOARDING: &str = "/recruiter/onboarding";
pub const PENDING_APPROVAL: &str = "/recruiter/pending-approval";
pub const REJECTED: &str = "/dashboard?status=rejected";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrganizationRole {
    Employer,
    Candidate,
}

/// The signed-in user as described by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub user_id: String,
    pub email: Option<String>,
    /// Platform role from public metadata; only `admin` is meaningful.
    pub role: Option<String>,
    pub organization_role: Option<OrganizationRole>,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some("admin")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Area {
    AdminConsole,
    EmployerDashboard,
    Interview,
    Onboarding,
}

/// Where an employer's organization request stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmployerStanding {
    NoOrganization,
    Pending,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AuthorizationPolicy {
    Admin,
    ApprovedEmployer,
    PendingEmployer { status: EmployerStanding },
    Candidate,
    /// Signed in but no role chosen yet.
    Unassigned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DenialReason {
    AdminOnly,
    OrganizationRequired,
    PendingApproval,
    Rejected,
    WrongRole,
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DenialReason::AdminOnly => "admin access required",
            DenialReason::OrganizationRequired => "register your organization first",
            DenialReason::PendingApproval => "organization is awaiting approval",
            DenialReason::Rejected => "organization registration was rejected",
            DenialReason::WrongRole => "not available for your role",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[error("{reason}")]
pub struct Denial {
    pub reason: DenialReason,
    pub redirect: &'static str,
}

impl AuthorizationPolicy {
    /// `organization` is the status of the principal's latest organization
    /// request, `None` if they never made one.
    pub fn resolve(principal: &Principal, organization: Option<ApprovalStatus>) -> Self {
        if principal.is_admin() {
            return Self::Admin;
        }
        match (principal.organization_role, organization) {
            (Some(OrganizationRole::Candidate), _) => Self::Candidate,
            // Filing an organization request puts a role-less user on the employer track.
            (None, None) => Self::Unassigned,
            (_, Some(ApprovalStatus::Approved)) => Self::ApprovedEmployer,
            (_, Some(ApprovalStatus::Pending)) => Self::PendingEmployer {
                status: EmployerStanding::Pending,
            },
            (_, Some(ApprovalStatus::Rejected)) => Self::PendingEmployer {
                status: EmployerStanding::Rejected,
            },
            (Some(OrganizationRole::Employer), None) => Self::PendingEmployer {
                status: EmployerStanding::NoOrganization,
            },
        }
    }

    pub fn authorize(&self, area: Area) -> Result<(), Denial> {
        let deny = |reason, redirect| Err(Denial { reason, redirect });
        match (self, area) {
            (Self::Admin, _) => Ok(()),
            (_, Area::AdminConsole) => deny(DenialReason::AdminOnly, self.home()),

            (Self::ApprovedEmployer, Area::EmployerDashboard) => Ok(()),
            (Self::ApprovedEmployer, _) => deny(DenialReason::WrongRole, EMPLOYER_HOME),

            (Self::PendingEmployer { status }, area) => match status {
                EmployerStanding::NoOrganization if area == Area::Onboarding => Ok(()),
                EmployerStanding::NoOrganization => {
                    deny(DenialReason::OrganizationRequired, ONBOARDING)
                }
                EmployerStanding::Pending => deny(DenialReason::PendingApproval, PENDING_APPROVAL),
                EmployerStanding::Rejected => deny(DenialReason::Rejected, REJECTED),
            },

            (Self::Candidate, Area::Interview) => Ok(()),
            (Self::Candidate, _) => deny(DenialReason::WrongRole, CANDIDATE_HOME),

            (Self::Unassigned, Area::Onboarding) => Ok(()),
            (Self::Unassigned, _) => deny(DenialReason::WrongRole, HOME),
        }
    }

    /// Landing page for the policy's role.
    pub fn home(&self) -> &'static str {
        match self {
            Self::Admin => "/admin",
            Self::ApprovedEmployer => EMPLOYER_HOME,
            Self::PendingEmployer {
                status: EmployerStanding::NoOrganization,
            } => ONBOARDING,
            Self::PendingEmployer {
                status: EmployerStanding::Pending,
            } => PENDING_APPROVAL,
            Self::PendingEmployer {
                status: EmployerStanding::Rejected,
            } => REJECTED,
            Self::Candidate => CANDIDATE_HOME,
            Self::Unassigned => HOME,
        }
    }
}
