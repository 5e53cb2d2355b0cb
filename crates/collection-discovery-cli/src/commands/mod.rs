pub mod catalog;
pub mod format;
pub mod serve;
pub mod sources;
pub mod sync;
