pub mod quota;
pub use quota::{QuotaError, QuotaTracker};

pub mod context;
pub use context::ContextAssembler;

pub mod pipeline;
pub use pipeline::GenerationPipeline;

pub mod chat_service;
pub use chat_service::{ChatError, ChatService, ChatroomDetail, MessageView, SendOutcome};

pub mod chat_service_impl;
pub use chat_service_impl::SeaOrmChatService;

pub mod auth_service;
pub use auth_service::{AuthError, AuthService, CodeRequestResult, VerifiedLogin};

pub mod auth_service_impl;
pub use auth_service_impl::SeaOrmAuthService;

pub mod logs;
pub use logs::LogService;

pub mod scheduler;
pub use scheduler::Scheduler;
