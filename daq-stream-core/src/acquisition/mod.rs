pub mod acquisition_loop;
pub mod cancellation;
pub mod consumer;
