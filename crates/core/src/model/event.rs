use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::model::{PagePath, SessionId, UserId};

//
// ─── EVENT NAME ────────────────────────────────────────────────────────────────
//

/// Name of a discrete user action.
///
/// Serialized as its snake_case wire name; unknown names round-trip as `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventName {
    CourseEnrollment,
    VideoPlay,
    FormSubmission,
    ResourceDownload,
    Custom(String),
}

impl EventName {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            EventName::CourseEnrollment => "course_enrollment",
            EventName::VideoPlay => "video_play",
            EventName::FormSubmission => "form_submission",
            EventName::ResourceDownload => "resource_download",
            EventName::Custom(name) => name,
        }
    }
}

impl From<&str> for EventName {
    fn from(value: &str) -> Self {
        match value {
            "course_enrollment" => EventName::CourseEnrollment,
            "video_play" => EventName::VideoPlay,
            "form_submission" => EventName::FormSubmission,
            "resource_download" => EventName::ResourceDownload,
            other => EventName::Custom(other.to_owned()),
        }
    }
}

impl From<String> for EventName {
    fn from(value: String) -> Self {
        EventName::from(value.as_str())
    }
}

impl From<EventName> for String {
    fn from(value: EventName) -> Self {
        match value {
            EventName::Custom(name) => name,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── ATTRIBUTES ────────────────────────────────────────────────────────────────
//

/// Scalar attribute value attached to an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Text(String),
    Number(f64),
    Flag(bool),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        AttributeValue::Number(f64::from(value))
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Flag(value)
    }
}

pub type Attributes = BTreeMap<String, AttributeValue>;

//
// ─── EVENT ─────────────────────────────────────────────────────────────────────
//

/// Immutable record of one user action, stamped with the session current at observation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub session_id: SessionId,
    pub user_id: Option<UserId>,
    pub name: EventName,
    pub attributes: Attributes,
    pub path: PagePath,
    pub observed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names_use_snake_case() {
        assert_eq!(EventName::CourseEnrollment.as_str(), "course_enrollment");
        assert_eq!(EventName::from("resource_download"), EventName::ResourceDownload);
    }

    #[test]
    fn unknown_names_are_custom() {
        let name = EventName::from("quiz_started");
        assert_eq!(name, EventName::Custom("quiz_started".into()));
        assert_eq!(String::from(name), "quiz_started");
    }

    #[test]
    fn attributes_serialize_as_plain_scalars() {
        let mut attrs = Attributes::new();
        attrs.insert("course_id".into(), "rust-101".into());
        attrs.insert("success".into(), true.into());
        attrs.insert("position".into(), 42_u32.into());

        let json = serde_json::to_value(&attrs).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"course_id": "rust-101", "position": 42.0, "success": true})
        );
    }
}
