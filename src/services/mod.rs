pub mod admin_service;
pub mod attendance_service;
pub mod auth_service;
pub mod contact_service;
pub mod course_service;
pub mod email_service;
pub mod media_service;
pub mod moderation_service;
pub mod offline_service;
pub mod onboarding_service;
pub mod payment_service;
pub mod video_service;

pub use email_service::Mailer;
pub use media_service::MediaStore;
pub use payment_service::RazorpayClient;
