pub mod cache;
pub mod ete_index;
pub mod handlers;
pub mod signals;
pub mod stats;
pub mod store;
