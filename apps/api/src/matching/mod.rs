pub mod agent;
pub mod batch;
pub mod feedback;
pub mod handlers;
pub mod shortlist;
pub mod store;
