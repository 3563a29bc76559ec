pub mod notification;
pub mod task;
pub mod users;
pub mod wallet;
