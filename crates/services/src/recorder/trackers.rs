use telemetry_core::model::{Attributes, EventName};

use super::Recorder;
use crate::best_effort::BestEffort;

impl Recorder {
    pub fn track_course_enrollment(&self, course_id: &str, course_title: &str) -> BestEffort {
        let mut attributes = Attributes::new();
        attributes.insert("course_id".into(), course_id.into());
        attributes.insert("course_title".into(), course_title.into());
        self.track_event(EventName::CourseEnrollment, attributes)
    }

    /// `course_id` is omitted from the attributes when the video is standalone.
    pub fn track_video_play(
        &self,
        video_id: &str,
        video_title: &str,
        course_id: Option<&str>,
    ) -> BestEffort {
        let mut attributes = Attributes::new();
        attributes.insert("video_id".into(), video_id.into());
        attributes.insert("video_title".into(), video_title.into());
        if let Some(course_id) = course_id {
            attributes.insert("course_id".into(), course_id.into());
        }
        self.track_event(EventName::VideoPlay, attributes)
    }

    pub fn track_form_submission(&self, form_name: &str, success: bool) -> BestEffort {
        let mut attributes = Attributes::new();
        attributes.insert("form_name".into(), form_name.into());
        attributes.insert("success".into(), success.into());
        self.track_event(EventName::FormSubmission, attributes)
    }

    pub fn track_download(
        &self,
        resource_id: &str,
        resource_name: &str,
        resource_type: &str,
    ) -> BestEffort {
        let mut attributes = Attributes::new();
        attributes.insert("resource_id".into(), resource_id.into());
        attributes.insert("resource_name".into(), resource_name.into());
        attributes.insert("resource_type".into(), resource_type.into());
        self.track_event(EventName::ResourceDownload, attributes)
    }
}
