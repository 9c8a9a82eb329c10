mod enrollment;
mod event;
mod ids;
mod location;
mod phase;
mod session;

pub use ids::{EnrollmentId, ParseIdError, SessionId, UserId};
pub use location::PagePath;

pub use enrollment::EnrollmentRecord;
pub use event::{AttributeValue, Attributes, Event, EventName};
pub use phase::{PhaseError, PhaseTransition, RecorderPhase};
pub use session::{EnvironmentInfo, PageView, Session, SessionSnapshot, SnapshotContext};
