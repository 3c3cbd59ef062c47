pub mod chatroom;
pub mod logs;
pub mod message;
pub mod user;
pub mod verification_code;
