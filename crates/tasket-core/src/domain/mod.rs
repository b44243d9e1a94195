//! Domain model: ids, target references, status machine, records, errors.

pub mod duration;
pub mod errors;
pub mod ids;
pub mod record;
pub mod status;
pub mod target;

pub use self::duration::format_duration;
pub use self::errors::{StoreError, TaskError};
pub use self::ids::TaskId;
pub use self::record::{NewTask, StatusUpdate, TaskRecord, DATE_FORMAT};
pub use self::status::TaskStatus;
pub use self::target::TargetRef;
