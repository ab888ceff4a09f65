mod task;

pub use task::{ClassifiedEvent, OccurrencePair, TaskRecord};
