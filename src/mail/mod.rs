pub mod markdown;
pub mod message;
pub mod translate;

pub use message::{Address, Attachment, EmailMessage, Priority};
pub use translate::translate;
