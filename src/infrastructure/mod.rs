pub mod db;
pub mod sqlite_repo;
pub mod sqlite_users;
