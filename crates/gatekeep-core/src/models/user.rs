use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Profile of the authenticated user as returned by `/login` and `/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub org_id: i64,
    /// `user`, `org_admin` or `super_admin` today; kept free-form
    pub role: String,
    #[serde(with = "timestamp")]
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Full name when the account has one, username otherwise
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.username)
    }
}

/// The Auth service writes naive UTC timestamps (no offset); accept those
/// as well as RFC 3339.
mod timestamp {
    use super::*;
    use serde::{de, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {}", raw)))
    }

    pub(super) fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    fn user_json(created_at: &str) -> serde_json::Value {
        json!({
            "id": 7,
            "username": "ada",
            "email": "ada@example.com",
            "full_name": null,
            "is_active": true,
            "is_superuser": false,
            "org_id": 1,
            "role": "user",
            "created_at": created_at,
        })
    }

    #[test]
    fn test_deserialize_naive_timestamp() {
        let user: User = serde_json::from_value(user_json("2024-03-05T14:30:00.123456")).unwrap();
        assert_eq!(user.created_at.year(), 2024);
        assert_eq!(user.created_at.hour(), 14);
        assert_eq!(user.full_name, None);
    }

    #[test]
    fn test_deserialize_rfc3339_timestamp() {
        let user: User = serde_json::from_value(user_json("2024-03-05T14:30:00+02:00")).unwrap();
        assert_eq!(user.created_at.hour(), 12);
    }

    #[test]
    fn test_deserialize_rejects_bad_timestamp() {
        assert!(serde_json::from_value::<User>(user_json("yesterday")).is_err());
    }

    #[test]
    fn test_display_name_falls_back_to_username() {
        let mut user: User = serde_json::from_value(user_json("2024-03-05T14:30:00")).unwrap();
        assert_eq!(user.display_name(), "ada");

        user.full_name = Some("Ada Lovelace".to_string());
        assert_eq!(user.display_name(), "Ada Lovelace");

        user.full_name = Some("  ".to_string());
        assert_eq!(user.display_name(), "ada");
    }
}
