pub mod chat;
pub mod models;
pub mod responses;
pub mod sse;

pub use sse::{DONE_LINE, LineDecoder, LineTooLong};
