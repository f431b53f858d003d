pub mod handlers;
pub mod time_to_fill;
