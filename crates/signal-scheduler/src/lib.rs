mod scheduler;

pub use scheduler::{DivergenceScheduler, IntervalSchedule, IntervalStatus, ScheduleMap};
