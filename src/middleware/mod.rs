pub mod capture;
pub mod redact;

pub use capture::{capture_middleware, Capture};
pub use redact::{Redactor, REDACTED};
