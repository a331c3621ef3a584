pub mod account;
pub mod connection;
pub mod container;
pub mod object;

#[cfg(test)]
pub(crate) mod mock;
