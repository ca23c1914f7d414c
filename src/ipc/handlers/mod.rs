pub mod attendance;
pub mod auth;
pub mod classrooms;
pub mod core;
pub mod grading;
pub mod levels;
pub mod quarters;
pub mod reports;
pub mod students;
pub mod teachers;
pub mod users;
