use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::message::StatusInfo;

/// The only `source` tag that grants access.
pub const SESSION_SOURCE_SUPABASE: &str = "supabase";

/// Placeholder token written by early builds of the popup.
pub const MOCK_TOKEN: &str = "mock-token";

pub const DEFAULT_ROLE: &str = "STUDENT";
pub const DEFAULT_TIER: &str = "BASIC";

/// The user half of a session.
///
/// Every field tolerates absence and explicit `null` so that legacy records
/// still deserialize and can be judged (and swept) instead of failing to load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
}

/// The authentication fact shared by every context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default, deserialize_with = "null_as_default")]
    pub user: SessionUser,
    /// Opaque bearer credential. Empty when the stored record had none.
    #[serde(default, deserialize_with = "null_as_default")]
    pub token: String,
    #[serde(
        default = "Utc::now",
        serialize_with = "chrono::serde::ts_milliseconds::serialize",
        deserialize_with = "signed_in_at"
    )]
    pub signed_in_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub validated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Session {
    /// Builds the session recorded right after a credential exchange.
    ///
    /// It is never valid: only enrichment sets `validated` and `source`.
    pub fn unvalidated(user: SessionUser, token: impl Into<String>) -> Self {
        Self {
            user,
            token: token.into(),
            // Persisted with millisecond precision.
            signed_in_at: Utc::now().trunc_subsecs(3),
            validated: false,
            source: None,
        }
    }

    /// Stand-in for a relayed payload that could not be read at all.
    ///
    /// It carries no token, so it is always rejected for relay.
    pub fn unreadable() -> Self {
        Self::unvalidated(SessionUser::default(), String::new())
    }

    /// The validity predicate.
    pub fn is_valid(&self) -> bool {
        !self.token.is_empty()
            && self.validated
            && self.source.as_deref() == Some(SESSION_SOURCE_SUPABASE)
    }

    /// Whether a relayed payload must be replaced by a sign-out.
    ///
    /// Catches records without a token, unvalidated records and the mock token.
    /// `source` is deliberately not consulted here; receivers still gate on
    /// [`Session::is_valid`].
    pub fn is_rejected_for_relay(&self) -> bool {
        self.token.is_empty() || !self.validated || self.token == MOCK_TOKEN
    }

    /// Merges an enrichment result and marks the session validated.
    pub fn apply_status(&mut self, status: &StatusInfo) {
        let user = &mut self.user;
        user.organization_id = non_empty(&status.organization_id).or(user.organization_id.take());
        user.role = non_empty(&status.role)
            .or(user.role.take())
            .or_else(|| Some(DEFAULT_ROLE.to_string()));
        user.tier = non_empty(&status.tier)
            .or(user.tier.take())
            .or_else(|| Some(DEFAULT_TIER.to_string()));
        user.organization_name =
            non_empty(&status.organization_name).or(user.organization_name.take());

        self.validated = true;
        self.source = Some(SESSION_SOURCE_SUPABASE.to_string());
    }
}

/// `signedIn` for an optional local session.
pub fn signed_in(session: Option<&Session>) -> bool {
    session.is_some_and(Session::is_valid)
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Epoch milliseconds, an RFC 3339 string, or `null` (read as now).
fn signed_in_at<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Timestamp {
        Millis(i64),
        Text(String),
    }

    match Option::<Timestamp>::deserialize(deserializer)? {
        None => Ok(Utc::now()),
        Some(Timestamp::Millis(ms)) => DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {ms}"))),
        Some(Timestamp::Text(text)) => DateTime::parse_from_rfc3339(&text)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_session() -> Session {
        let mut session = Session::unvalidated(
            SessionUser {
                id: "u1".into(),
                email: "ada@example.com".into(),
                ..Default::default()
            },
            "tok",
        );
        session.apply_status(&StatusInfo::default());
        session
    }

    #[test]
    fn test_predicate_requires_all_three_conditions() {
        let session = valid_session();
        assert!(session.is_valid());

        let mut no_token = session.clone();
        no_token.token.clear();
        assert!(!no_token.is_valid());

        let mut unvalidated = session.clone();
        unvalidated.validated = false;
        assert!(!unvalidated.is_valid());

        let mut other_source = session.clone();
        other_source.source = Some("mock".into());
        assert!(!other_source.is_valid());

        let mut no_source = session;
        no_source.source = None;
        assert!(!no_source.is_valid());
    }

    #[test]
    fn test_signed_in_matches_predicate() {
        assert!(!signed_in(None));
        let session = valid_session();
        assert!(signed_in(Some(&session)));
        let fresh = Session::unvalidated(SessionUser::default(), "tok");
        assert!(!signed_in(Some(&fresh)));
    }

    #[test]
    fn test_legacy_shape_deserializes_as_invalid() {
        let session: Session = serde_json::from_value(json!({
            "token": "t",
            "validated": false
        }))
        .unwrap();
        assert_eq!(session.token, "t");
        assert!(!session.is_valid());

        let bare: Session = serde_json::from_value(json!({
            "user": { "id": "u1", "email": "a@b.c", "organizationId": null },
            "token": "abc",
            "signedInAt": 1_700_000_000_000i64
        }))
        .unwrap();
        assert!(!bare.validated);
        assert!(bare.source.is_none());
        assert_eq!(bare.signed_in_at.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_explicit_nulls_and_iso_timestamps_deserialize() {
        let session: Session = serde_json::from_value(json!({
            "user": null,
            "token": "mock-token",
            "validated": null,
            "signedInAt": null
        }))
        .unwrap();
        assert_eq!(session.user, SessionUser::default());
        assert!(!session.validated);
        assert!(session.is_rejected_for_relay());

        let session: Session = serde_json::from_value(json!({
            "user": { "id": null, "email": "a@b.c" },
            "token": null,
            "validated": true,
            "signedInAt": "2024-05-01T12:00:00.250Z"
        }))
        .unwrap();
        assert!(session.token.is_empty());
        assert!(session.is_rejected_for_relay());
        assert_eq!(session.signed_in_at.timestamp_millis(), 1_714_564_800_250);
    }

    #[test]
    fn test_unreadable_is_always_rejected() {
        assert!(Session::unreadable().is_rejected_for_relay());
        assert!(!Session::unreadable().is_valid());
    }

    #[test]
    fn test_relay_rejection_rule() {
        let session = valid_session();
        assert!(!session.is_rejected_for_relay());

        let mut mock = session.clone();
        mock.token = MOCK_TOKEN.into();
        assert!(mock.is_rejected_for_relay());

        let mut unvalidated = session.clone();
        unvalidated.validated = false;
        assert!(unvalidated.is_rejected_for_relay());

        let mut missing = session;
        missing.token.clear();
        assert!(missing.is_rejected_for_relay());
    }

    #[test]
    fn test_apply_status_prefers_enrichment_then_prior_then_defaults() {
        let mut session = Session::unvalidated(
            SessionUser {
                id: "u1".into(),
                email: "a@b.c".into(),
                organization_id: Some("meta-org".into()),
                ..Default::default()
            },
            "tok",
        );
        session.apply_status(&StatusInfo {
            organization_id: None,
            role: Some(String::new()),
            tier: Some("PRO".into()),
            organization_name: Some("Layers".into()),
        });

        assert_eq!(session.user.organization_id.as_deref(), Some("meta-org"));
        assert_eq!(session.user.role.as_deref(), Some(DEFAULT_ROLE));
        assert_eq!(session.user.tier.as_deref(), Some("PRO"));
        assert_eq!(session.user.organization_name.as_deref(), Some("Layers"));
        assert!(session.validated);
        assert_eq!(session.source.as_deref(), Some(SESSION_SOURCE_SUPABASE));
    }

    #[test]
    fn test_serializes_with_camel_case_keys() {
        let value = serde_json::to_value(valid_session()).unwrap();
        assert!(value.get("signedInAt").is_some());
        assert_eq!(value["source"], "supabase");
        assert_eq!(value["user"]["role"], DEFAULT_ROLE);
    }
}
