//! Plain records exchanged between the recurrence and timeline layers.

mod occurrence;
mod recurrence;
mod sequence;

pub use occurrence::Occurrence;
pub use recurrence::{Frequency, RecurrenceRule, WeekDay};
pub use sequence::Sequence;
