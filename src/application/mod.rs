pub mod identity;
pub mod session;
pub mod todo_service;
