pub mod messages;
pub mod qkd;
pub mod qrng;
pub mod wrap;
