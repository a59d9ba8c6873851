use std::{future::Future, pin::Pin};

pub mod config;
pub mod domain;
pub mod http;
pub mod search;
pub mod store;
pub mod sync;
pub mod version;

#[cfg(test)]
pub(crate) mod testing;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
