pub mod async_task;

pub mod package;

#[cfg(test)]
mod package_test;
