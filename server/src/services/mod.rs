pub mod booking;
pub mod search;

pub use booking::{BookingError, BookingManager, ErrorKind};
pub use search::{SearchError, SearchPage, SearchParams};
