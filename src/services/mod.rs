pub mod ai_service;
pub mod chat_service;
pub mod enrichment;
pub mod llm_client;
pub mod notice;
pub mod otp_service;
pub mod renderer;
pub mod settings_store;
pub mod site_context;
pub mod sms_client;
pub mod upload_service;
