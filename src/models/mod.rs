pub mod category;
pub mod otp;
pub mod photo;
pub mod post;
pub mod site_setting;
pub mod user;
