pub mod artifact;
pub mod decode;
pub mod encode;
pub mod error;
pub mod export;
pub mod frame;
