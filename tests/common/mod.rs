pub mod fixtures;
pub mod queues;

pub use fixtures::*;
pub use queues::*;
