mod resolver;
mod signature;

pub use resolver::{resolve, select_output_format, AccountSource, Overrides, ResolvedContext};
pub use signature::{redact_header, Credentials};
