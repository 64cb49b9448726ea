//! Feed retrieval port and iCalendar parsing.

pub mod ports;
pub mod reader;

pub use reader::FeedReader;
