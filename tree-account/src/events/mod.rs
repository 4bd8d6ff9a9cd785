//! Events are used to emit information necessary to
//! index changes made to a concurrent merkle tree account

mod changelog_event;

pub use changelog_event::{ChangeLogEvent, ChangeLogEventV1};
