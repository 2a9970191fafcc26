//! Task status records and the views derived from them

mod status;
mod view;

pub use status::{TaskState, TaskStatus, parse_timestamp};
pub use view::TaskView;
