pub mod agent_run;
pub mod candidate;
pub mod job;
pub mod job_state;
pub mod learning;
pub mod matching;
pub mod tenant;
