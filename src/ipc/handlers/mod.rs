pub mod backup;
pub mod core;
pub mod curriculum;
pub mod draft;
pub mod setup;
pub mod wizard;
