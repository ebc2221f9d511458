pub mod events;
pub mod format;
pub mod quality;
pub mod records;
pub mod store;
pub mod tracker;
