//! Employer and organization registration records.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub const MAX_COMPANY_DETAILS_CHARS: usize = 1000;

const WEBSITE_PATTERN: &str = r"^(https?://)?([\da-z.-]+)\.([a-z.]{2,6})([/\w .-]*)*/?$";
const EMAIL_PATTERN: &str = r"^\w+([.-]?\w+)*@\w+([.-]?\w+)*(\.\w{2,3})+$";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        })
    }
}

impl FromStr for ApprovalStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(ValidationError::single(format!("Invalid status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompanySize {
    #[serde(rename = "1-10")]
    Micro,
    #[serde(rename = "11-50")]
    Small,
    #[serde(rename = "51-200")]
    Medium,
    #[serde(rename = "201-500")]
    Large,
    #[serde(rename = "501+")]
    Enterprise,
}

impl FromStr for CompanySize {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1-10" => Ok(Self::Micro),
            "11-50" => Ok(Self::Small),
            "51-200" => Ok(Self::Medium),
            "201-500" => Ok(Self::Large),
            "501+" => Ok(Self::Enterprise),
            _ => Err(()),
        }
    }
}

/// A rejected registration, with one message per offending field.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Validation failed: {}", .errors.join("; "))]
pub struct ValidationError {
    pub errors: Vec<String>,
}

impl ValidationError {
    pub fn single(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
        }
    }
}

/// Employer registration as submitted by the public form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmployerForm {
    pub company_name: String,
    pub location: String,
    pub company_details: String,
    pub industry: String,
    pub company_size: String,
    pub website: Option<String>,
    pub contact_person_name: String,
    pub contact_email: String,
    pub contact_phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employer {
    pub id: Uuid,
    pub company_name: String,
    pub location: String,
    pub company_details: String,
    pub industry: String,
    pub company_size: CompanySize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    pub contact_person_name: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub status: ApprovalStatus,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request from a signed-in user to have their company set up as an organization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrganizationForm {
    pub company_name: String,
    pub company_size: String,
    pub industry: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub user_id: String,
    pub user_email: String,
    pub company_size: String,
    pub industry: String,
    pub status: ApprovalStatus,
    pub clerk_org_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Compiled field patterns for registration forms.
#[derive(Debug, Clone)]
pub struct Validator {
    website: Regex,
    email: Regex,
}

fn required(errors: &mut Vec<String>, value: &str, message: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        errors.push(message.to_string());
    }
    value.to_string()
}

impl Validator {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            website: Regex::new(WEBSITE_PATTERN)?,
            email: Regex::new(EMAIL_PATTERN)?,
        })
    }

    pub fn is_valid_email(&self, email: &str) -> bool {
        self.email.is_match(email)
    }

    /// Normalises the form (trimmed fields, lowercased email) into a new pending record.
    pub fn employer(&self, form: EmployerForm, now: DateTime<Utc>) -> Result<Employer, ValidationError> {
        let mut errors = Vec::new();

        let company_name = required(&mut errors, &form.company_name, "Company name is required");
        let location = required(&mut errors, &form.location, "Location is required");
        let company_details = required(
            &mut errors,
            &form.company_details,
            "Company details are required",
        );
        if company_details.chars().count() > MAX_COMPANY_DETAILS_CHARS {
            errors.push(format!(
                "Company details cannot exceed {MAX_COMPANY_DETAILS_CHARS} characters"
            ));
        }
        let industry = required(&mut errors, &form.industry, "Industry is required");

        let size = form.company_size.trim();
        let company_size = if size.is_empty() {
            errors.push("Company size is required".to_string());
            None
        } else {
            let parsed = size.parse::<CompanySize>().ok();
            if parsed.is_none() {
                errors.push("Please select a valid company size".to_string());
            }
            parsed
        };

        let website = form
            .website
            .as_deref()
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .map(str::to_string);
        if let Some(site) = &website {
            if !self.website.is_match(site) {
                errors.push("Please enter a valid URL".to_string());
            }
        }

        let contact_person_name = required(
            &mut errors,
            &form.contact_person_name,
            "Contact person name is required",
        );
        let contact_email =
            required(&mut errors, &form.contact_email, "Contact email is required").to_lowercase();
        if !contact_email.is_empty() && !self.is_valid_email(&contact_email) {
            errors.push("Please enter a valid email address".to_string());
        }
        let contact_phone = required(&mut errors, &form.contact_phone, "Contact phone is required");

        match company_size {
            Some(company_size) if errors.is_empty() => Ok(Employer {
                id: Uuid::new_v4(),
                company_name,
                location,
                company_details,
                industry,
                company_size,
                website,
                contact_person_name,
                contact_email,
                contact_phone,
                status: ApprovalStatus::Pending,
                approved_by: None,
                approved_at: None,
                created_at: now,
                updated_at: now,
            }),
            _ => Err(ValidationError { errors }),
        }
    }

    pub fn organization(
        &self,
        form: OrganizationForm,
        user_id: &str,
        user_email: &str,
        now: DateTime<Utc>,
    ) -> Result<Organization, ValidationError> {
        let mut errors = Vec::new();
        let name = required(&mut errors, &form.company_name, "Company name is required");
        let company_size = required(&mut errors, &form.company_size, "Company size is required");
        let industry = required(&mut errors, &form.industry, "Industry is required");
        if !errors.is_empty() {
            return Err(ValidationError { errors });
        }
        Ok(Organization {
            id: Uuid::new_v4(),
            name,
            user_id: user_id.to_string(),
            user_email: user_email.to_string(),
            company_size,
            industry,
            status: ApprovalStatus::Pending,
            clerk_org_id: None,
            created_at: now,
            updated_at: now,
        })
    }
}
