pub mod error;
pub mod mutator;
pub mod parser;
pub mod plan;
pub mod rank;
pub mod resolver;
pub mod schema;

pub use error::{Result, TaskError};
pub use mutator::{Inserted, SectionStyle, add_task_to, complete_task_in};
pub use parser::{Outline, parse, parse_bytes, parse_outline};
pub use plan::{PlanFile, PlanScan, next_across, scan_plans};
pub use rank::heading_rank;
pub use resolver::{next_task, queue};
pub use schema::{Section, Task, TaskId, TaskStatus};
