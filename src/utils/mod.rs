pub mod clock;
pub mod events;
pub mod poll;
pub mod shutdown;

#[cfg(test)]
pub(crate) mod test_support;
