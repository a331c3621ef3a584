use std::{collections::HashMap, sync::Arc};

use reqwest::{header::HeaderMap, Method};

use super::{
    connection::{Connection, ConnectionError, HttpConnection, Response, ResponseError},
    container::{parse_listing, validate_name, Container, ContainerOperationError, ContainerResults},
};
use crate::config::ConnectionConfig;

const OBJECT_COUNT: &str = "x-container-object-count";
const BYTES_USED: &str = "x-container-bytes-used";

/// Entry point to a storage account: the factory for [`Container`]s.
#[derive(Clone)]
pub struct Account {
    conn: Arc<dyn Connection>,
}

impl Account {
    /// Create an `Account` with the connection configuration loaded from the
    /// environment.
    pub fn from_env() -> Result<Self, ConnectionError> {
        Ok(Self::with_connection(Arc::new(HttpConnection::from_env()?)))
    }

    /// Create an `Account` over HTTP with the provided `config`.
    pub fn with_config(config: ConnectionConfig) -> Result<Self, ConnectionError> {
        Ok(Self::with_connection(Arc::new(HttpConnection::new(config)?)))
    }

    pub fn with_connection(conn: Arc<dyn Connection>) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    /// Handle for a container, without checking that it exists.
    pub fn container(&self, name: &str) -> Result<Container, ContainerOperationError> {
        Container::open(self.conn.clone(), name, None, None)
    }

    /// Handle for an existing container, with its object count and size.
    pub fn get_container(&self, name: &str) -> Result<Container, ContainerOperationError> {
        validate_name(name)?;
        let mut response = self
            .conn
            .make_request(Method::HEAD, &[name], &[], HeaderMap::new())?;
        response.drain()?;
        if response.status == 404 {
            return Err(ContainerOperationError::NoSuchContainer(name.to_string()));
        }
        ResponseError::check(&mut response)?;
        let count = parse_counter(&response, OBJECT_COUNT)?;
        let size = parse_counter(&response, BYTES_USED)?;
        Container::open(self.conn.clone(), name, count, size)
    }

    pub fn create_container(&self, name: &str) -> Result<Container, ContainerOperationError> {
        validate_name(name)?;
        let mut response = self
            .conn
            .make_request(Method::PUT, &[name], &[], HeaderMap::new())?;
        ResponseError::check(&mut response)?;
        response.drain()?;
        tracing::debug!("Created container {}", name);
        Container::open(self.conn.clone(), name, Some(0), Some(0))
    }

    /// Delete an empty container.
    pub fn delete_container(&self, name: &str) -> Result<(), ContainerOperationError> {
        validate_name(name)?;
        let mut response = self
            .conn
            .make_request(Method::DELETE, &[name], &[], HeaderMap::new())?;
        response.drain()?;
        match response.status {
            404 => Err(ContainerOperationError::NoSuchContainer(name.to_string())),
            409 => Err(ContainerOperationError::ContainerNotEmpty(name.to_string())),
            _ => {
                ResponseError::check(&mut response)?;
                tracing::debug!("Deleted container {}", name);
                Ok(())
            }
        }
    }

    /// Names of the containers in the account.
    ///
    /// `params` are passed through as query parameters.
    pub fn list_containers(&self, params: &[(&str, &str)]) -> Result<Vec<String>, ContainerOperationError> {
        let mut response = self
            .conn
            .make_request(Method::GET, &[], params, HeaderMap::new())?;
        ResponseError::check(&mut response)?;
        parse_listing(response.read()?)
    }

    pub fn get_all_containers(&self, params: &[(&str, &str)]) -> Result<ContainerResults, ContainerOperationError> {
        let names = self.list_containers(params)?;
        Ok(ContainerResults::new(self.conn.clone(), names))
    }

    /// Names of the containers published to the CDN.
    pub fn list_public_containers(&self) -> Result<Vec<String>, ContainerOperationError> {
        if !self.conn.cdn_enabled() {
            return Err(ContainerOperationError::CdnNotEnabled);
        }
        let mut response = self.conn.cdn_request(Method::GET, &[], HeaderMap::new())?;
        ResponseError::check(&mut response)?;
        parse_listing(response.read()?)
    }
}

fn parse_counter(response: &Response, header: &str) -> Result<Option<u64>, ContainerOperationError> {
    response
        .header(header)
        .map(|value| {
            value.trim().parse::<u64>().map_err(|_| ContainerOperationError::Other {
                msg: format!("{} is not a number", header),
                data: HashMap::from([("value".into(), value.to_string())]),
            })
        })
        .transpose()
}
