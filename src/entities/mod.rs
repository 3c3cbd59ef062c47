pub mod prelude;

pub mod chatrooms;
pub mod messages;
pub mod system_logs;
pub mod users;
pub mod verification_codes;
