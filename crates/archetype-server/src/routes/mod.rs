pub mod avatar;
pub mod facebook;
pub mod fields;
pub mod forms;
pub mod funnels;
pub mod nonce;
