//! Background tasks.

pub mod session_sweeper;

pub use session_sweeper::run_session_sweeper;
