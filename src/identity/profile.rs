//! Identity payload types and the default profile mapping.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Event envelope delivered by the identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityEvent {
    /// Event kind, e.g. `user.created`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Identity payload for the affected user.
    #[serde(default)]
    pub data: Option<IdentityPayload>,
    /// Provider-assigned event id.
    #[serde(default)]
    pub id: Option<String>,
}

/// One email address attached to an identity.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailAddress {
    /// Provider-assigned address id.
    pub id: String,
    /// The address itself.
    pub email_address: String,
}

/// Identity data carried in a webhook event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityPayload {
    /// Provider user id; becomes our `user_id`.
    pub id: String,
    /// Chosen username, when the provider has one.
    #[serde(default)]
    pub username: Option<String>,
    /// First name as held by the provider.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Last name as held by the provider.
    #[serde(default)]
    pub last_name: Option<String>,
    /// All addresses registered with the identity.
    #[serde(default)]
    pub email_addresses: Vec<EmailAddress>,
    /// Id of the primary address within `email_addresses`.
    #[serde(default)]
    pub primary_email_address_id: Option<String>,
    /// Avatar URL, when set.
    #[serde(default)]
    pub profile_image_url: Option<String>,
    /// Account creation time as Unix seconds.
    #[serde(default)]
    pub created_at: Option<i64>,
}

/// Nested profile document stored per user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Identity facts copied from the provider payload.
    pub basic_info: BasicInfo,
    /// User-tunable settings, defaulted at creation.
    pub preferences: Preferences,
    /// Usage activity counters.
    pub activity: Activity,
    /// Self-reported education details.
    pub education: Education,
    /// Free-form interest tags.
    pub interests: Vec<String>,
    /// Lifetime usage statistics.
    pub stats: Stats,
    /// Account-level bookkeeping.
    pub metadata: ProfileMetadata,
}

/// Identity facts for a profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BasicInfo {
    /// Provider user id.
    pub user_id: String,
    /// Display username.
    pub username: String,
    /// First name, possibly derived from the username.
    pub first_name: String,
    /// Last name, possibly derived from the username.
    pub last_name: String,
    /// Primary email address.
    pub email: String,
    /// Avatar URL, empty when unset.
    pub avatar_url: String,
    /// RFC3339 timestamp the account was created.
    pub joined_date: String,
}

/// User settings sub-object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    /// UI theme name.
    pub theme: String,
    /// BCP 47 language tag.
    pub language: String,
    /// IANA timezone name.
    pub timezone: String,
    /// Notification channel settings.
    pub notifications: Notifications,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: "light".into(),
            language: "en-US".into(),
            timezone: "UTC".into(),
            notifications: Notifications::default(),
        }
    }
}

/// Notification channel settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notifications {
    /// Whether email notifications are enabled.
    pub email: bool,
    /// Whether push notifications are enabled.
    pub push: bool,
    /// Delivery cadence.
    pub frequency: String,
}

impl Default for Notifications {
    fn default() -> Self {
        Self {
            email: true,
            push: false,
            frequency: "daily".into(),
        }
    }
}

/// Usage activity counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    /// RFC3339 timestamp of the most recent activity.
    pub last_active: String,
    /// Account activity status.
    pub status: String,
    /// Consecutive active days.
    pub streak_days: u32,
    /// Total login count.
    pub login_count: u32,
}

/// Self-reported education details, all empty by default.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Education {
    /// Education level.
    pub level: String,
    /// Institution name.
    pub institution: String,
    /// Expected graduation year.
    pub expected_graduation_year: Option<u32>,
    /// Primary field of interest.
    pub field_of_interest: String,
    /// Degree currently pursued.
    pub degree_pursuing: Option<String>,
    /// Highest degree already earned.
    pub highest_degree_earned: Option<String>,
    /// Year the highest degree was earned.
    pub year_earned: Option<u32>,
}

/// Lifetime usage statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Documents uploaded so far.
    pub documents_uploaded: u64,
    /// Notes taken so far.
    pub notes_taken: u64,
    /// Study sessions completed so far.
    pub sessions_completed: u64,
}

/// Account-level bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileMetadata {
    /// Billing tier of the account.
    pub account_type: String,
    /// RFC3339 timestamp the account was created.
    pub created_at: String,
    /// RFC3339 timestamp of the most recent profile write.
    pub updated_at: String,
}

/// Build the default-shaped profile for an identity payload.
///
/// The primary email is resolved through `primary_email_address_id`; when
/// the provider has no username, the email local part stands in. Missing
/// names are derived by splitting the username on `.`, `_`, or `-`.
pub fn map_identity(payload: &IdentityPayload, now: &str) -> UserProfile {
    let email = payload
        .primary_email_address_id
        .as_deref()
        .and_then(|primary| {
            payload
                .email_addresses
                .iter()
                .find(|address| address.id == primary)
        })
        .map(|address| address.email_address.clone())
        .unwrap_or_default();

    let username = payload
        .username
        .clone()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

    let (first_name, last_name) = match (&payload.first_name, &payload.last_name) {
        (Some(first), Some(last)) => (first.clone(), last.clone()),
        _ => {
            let mut parts = username.split(['.', '_', '-']);
            (
                parts.next().unwrap_or_default().to_string(),
                parts.next().unwrap_or_default().to_string(),
            )
        }
    };

    let joined_date = payload
        .created_at
        .and_then(|seconds| OffsetDateTime::from_unix_timestamp(seconds).ok())
        .and_then(|instant| instant.format(&Rfc3339).ok())
        .unwrap_or_else(|| now.to_string());

    UserProfile {
        basic_info: BasicInfo {
            user_id: payload.id.clone(),
            username,
            first_name,
            last_name,
            email,
            avatar_url: payload.profile_image_url.clone().unwrap_or_default(),
            joined_date: joined_date.clone(),
        },
        preferences: Preferences::default(),
        activity: Activity {
            last_active: now.to_string(),
            status: "active".into(),
            streak_days: 0,
            login_count: 0,
        },
        education: Education::default(),
        interests: Vec::new(),
        stats: Stats::default(),
        metadata: ProfileMetadata {
            account_type: "free".into(),
            created_at: joined_date,
            updated_at: now.to_string(),
        },
    }
}
