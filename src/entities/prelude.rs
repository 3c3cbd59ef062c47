pub use super::chatrooms::Entity as Chatrooms;
pub use super::messages::Entity as Messages;
pub use super::system_logs::Entity as SystemLogs;
pub use super::users::Entity as Users;
pub use super::verification_codes::Entity as VerificationCodes;
