//! Resource-style handles over a Cloud Files storage account.
//!
//! An [`Account`] hands out [`Container`]s, which in turn list, hand out and
//! delete [`Object`]s and manage the container's CDN publication. Every
//! network-touching call issues exactly one blocking request through a shared
//! [`Connection`].

pub mod config;
pub mod resources;

pub use config::{ConfigError, ConnectionConfig};
pub use resources::account::Account;
pub use resources::connection::{Connection, ConnectionError, HttpConnection, Response, ResponseError};
pub use resources::container::{Container, ContainerOperationError, ContainerResults, DEFAULT_CDN_TTL};
pub use resources::object::{Object, ObjectOperationError, ObjectResults};
