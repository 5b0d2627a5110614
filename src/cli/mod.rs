pub mod commands;
pub mod dispatch;
pub mod output;
pub mod prompt;
pub mod registry;
