pub mod async_task;
pub mod scoped_timer;
pub mod time;

#[cfg(test)]
mod time_test;
