pub mod handlers;
pub mod job_state;
pub mod jobs;
pub mod runner;
pub mod scheduler;
