use std::{collections::HashMap, fmt, ops::Range, sync::Arc};

use reqwest::{
    header::{HeaderMap, HeaderValue},
    Method,
};

use super::{
    connection::{Connection, ConnectionError, ResponseError},
    object::{Object, ObjectOperationError, ObjectResults},
};

/// CDN cache lifetime used when publishing without an explicit TTL, in
/// seconds.
pub const DEFAULT_CDN_TTL: u32 = 86400;

const CDN_URI: &str = "x-cdn-uri";
const TTL: &str = "x-ttl";
const USER_AGENT_ACL: &str = "x-user-agent-acl";
const REFERRER_ACL: &str = "x-referrer-acl";
const CDN_ENABLED: &str = "x-cdn-enabled";

/// A flat storage compartment, and the factory for its [`Object`]s.
///
/// The CDN fields are a local cache of the container's publication state.
/// They are filled by [`Container::refresh_cdn_metadata`] and updated by
/// [`Container::make_public`]; the CDN itself stays the source of truth.
#[derive(Clone)]
pub struct Container {
    name: String,
    object_count: Option<u64>,
    size_used: Option<u64>,
    cdn_uri: Option<String>,
    cdn_ttl: Option<u32>,
    cdn_agent_acl: Option<String>,
    cdn_referer_acl: Option<String>,
    conn: Arc<dyn Connection>,
}

impl Container {
    /// Build a handle without touching the network.
    ///
    /// `count` and `size` are whatever the caller already knows about the
    /// container; they are never refreshed by the handle itself.
    pub fn new(
        conn: Arc<dyn Connection>,
        name: impl Into<String>,
        count: Option<u64>,
        size: Option<u64>,
    ) -> Result<Self, ContainerOperationError> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            object_count: count,
            size_used: size,
            cdn_uri: None,
            cdn_ttl: None,
            cdn_agent_acl: None,
            cdn_referer_acl: None,
            conn,
        })
    }

    /// Build a handle and, if the account has CDN enabled, fetch its CDN
    /// metadata.
    pub fn open(
        conn: Arc<dyn Connection>,
        name: impl Into<String>,
        count: Option<u64>,
        size: Option<u64>,
    ) -> Result<Self, ContainerOperationError> {
        let mut container = Self::new(conn, name, count, size)?;
        if container.conn.cdn_enabled() {
            container.refresh_cdn_metadata()?;
        }
        Ok(container)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn object_count(&self) -> Option<u64> {
        self.object_count
    }

    pub fn size_used(&self) -> Option<u64> {
        self.size_used
    }

    pub fn cdn_uri(&self) -> Option<&str> {
        self.cdn_uri.as_deref()
    }

    pub fn cdn_ttl(&self) -> Option<u32> {
        self.cdn_ttl
    }

    pub fn cdn_agent_acl(&self) -> Option<&str> {
        self.cdn_agent_acl.as_deref()
    }

    pub fn cdn_referer_acl(&self) -> Option<&str> {
        self.cdn_referer_acl.as_deref()
    }

    /// Re-read the CDN publication state.
    ///
    /// Best effort: a non-2xx answer leaves the cached fields as they are.
    pub fn refresh_cdn_metadata(&mut self) -> Result<(), ContainerOperationError> {
        let mut response = self
            .conn
            .cdn_request(Method::HEAD, &[self.name.as_str()], HeaderMap::new())?;
        response.drain()?;
        if !response.is_success() {
            tracing::debug!(
                "Ignoring CDN metadata for container {}: {} {}",
                self.name,
                response.status,
                response.reason
            );
            return Ok(());
        }

        let ttl = match response.header(TTL) {
            Some(ttl) => Some(ttl.trim().parse::<u32>().map_err(|_| ContainerOperationError::Other {
                msg: "CDN returned a TTL that is not a number of seconds".into(),
                data: HashMap::from([
                    ("container_name".into(), self.name.clone()),
                    ("ttl".into(), ttl.to_string()),
                ]),
            })?),
            None => None,
        };
        if let Some(uri) = response.header(CDN_URI) {
            self.cdn_uri = Some(uri.to_string());
        }
        if ttl.is_some() {
            self.cdn_ttl = ttl;
        }
        if let Some(acl) = response.header(USER_AGENT_ACL) {
            self.cdn_agent_acl = Some(acl.to_string());
        }
        if let Some(acl) = response.header(REFERRER_ACL) {
            self.cdn_referer_acl = Some(acl.to_string());
        }
        Ok(())
    }

    /// Publish the container to the CDN, or update its CDN attributes if it
    /// is already published.
    ///
    /// When updating, ACLs that are not supplied keep their cached values.
    pub fn make_public(
        &mut self,
        ttl: u32,
        user_agent_acl: Option<&str>,
        referer_acl: Option<&str>,
    ) -> Result<(), ContainerOperationError> {
        self.require_cdn()?;
        let user_agent_acl = user_agent_acl.filter(|acl| !acl.is_empty()).map(str::to_string);
        let referer_acl = referer_acl.filter(|acl| !acl.is_empty()).map(str::to_string);
        let (method, user_agent_acl, referer_acl) = if self.cdn_uri.is_some() {
            (
                Method::POST,
                user_agent_acl.or_else(|| self.cdn_agent_acl.clone()),
                referer_acl.or_else(|| self.cdn_referer_acl.clone()),
            )
        } else {
            (Method::PUT, user_agent_acl, referer_acl)
        };

        let mut headers = HeaderMap::new();
        headers.insert(TTL, HeaderValue::from(ttl));
        headers.insert(CDN_ENABLED, HeaderValue::from_static("True"));
        if let Some(acl) = &user_agent_acl {
            headers.insert(USER_AGENT_ACL, HeaderValue::from_str(acl).map_err(ConnectionError::from)?);
        }
        if let Some(acl) = &referer_acl {
            headers.insert(REFERRER_ACL, HeaderValue::from_str(acl).map_err(ConnectionError::from)?);
        }

        let mut response = self.conn.cdn_request(method, &[self.name.as_str()], headers)?;
        ResponseError::check(&mut response)?;
        response.drain()?;

        self.cdn_ttl = Some(ttl);
        self.cdn_agent_acl = user_agent_acl;
        self.cdn_referer_acl = referer_acl;
        if let Some(uri) = response.header(CDN_URI) {
            self.cdn_uri = Some(uri.to_string());
        }
        tracing::info!("Published container {} to the CDN (ttl {}s)", self.name, ttl);
        Ok(())
    }

    /// Disable CDN access to the container.
    ///
    /// The cached URI and TTL are kept: the public copy may stay reachable
    /// until the previous TTL expires.
    pub fn make_private(&mut self) -> Result<(), ContainerOperationError> {
        self.require_cdn()?;
        let mut headers = HeaderMap::new();
        headers.insert(CDN_ENABLED, HeaderValue::from_static("False"));
        let mut response = self.conn.cdn_request(Method::POST, &[self.name.as_str()], headers)?;
        ResponseError::check(&mut response)?;
        response.drain()?;
        tracing::info!("Disabled CDN access to container {}", self.name);
        Ok(())
    }

    /// Whether the container is known to be published. Answers from the local
    /// cache only.
    pub fn is_public(&self) -> Result<bool, ContainerOperationError> {
        self.require_cdn()?;
        Ok(self.cdn_uri.is_some())
    }

    pub fn public_uri(&self) -> Result<&str, ContainerOperationError> {
        if !self.is_public()? {
            return Err(ContainerOperationError::ContainerNotPublic(self.name.clone()));
        }
        self.cdn_uri
            .as_deref()
            .ok_or_else(|| ContainerOperationError::ContainerNotPublic(self.name.clone()))
    }

    /// Handle for an object in this container, whether or not it exists yet.
    pub fn create_object(&self, name: &str) -> Result<Object, ContainerOperationError> {
        Ok(Object::new(self.name.clone(), name.to_string(), self.conn.clone())?)
    }

    /// Handle for an object that must already exist.
    pub fn get_object(&self, name: &str) -> Result<Object, ContainerOperationError> {
        Ok(Object::existing(self.name.clone(), name.to_string(), self.conn.clone())?)
    }

    /// List the container and wrap the names in a results view.
    ///
    /// `params` are passed through as query parameters.
    pub fn get_objects(&self, params: &[(&str, &str)]) -> Result<ObjectResults, ContainerOperationError> {
        let names = self.list_objects(params)?;
        Ok(ObjectResults::new(self.name.clone(), names, self.conn.clone()))
    }

    /// Names of the objects in this container, in listing order.
    ///
    /// The body is split on any line break, so names cannot contain `\n` or
    /// `\r`. `params` (`limit`, `marker`, `prefix`, ...) are passed through as
    /// query parameters without validation.
    pub fn list_objects(&self, params: &[(&str, &str)]) -> Result<Vec<String>, ContainerOperationError> {
        let mut response = self
            .conn
            .make_request(Method::GET, &[self.name.as_str()], params, HeaderMap::new())?;
        ResponseError::check(&mut response)?;
        let body = response.read()?;
        parse_listing(body)
    }

    /// Permanently remove an object.
    pub fn delete_object(&self, name: &str) -> Result<(), ContainerOperationError> {
        if name.is_empty() {
            return Err(ContainerOperationError::InvalidObjectName(name.to_string()));
        }
        let mut response = self.conn.make_request(
            Method::DELETE,
            &[self.name.as_str(), name],
            &[],
            HeaderMap::new(),
        )?;
        ResponseError::check(&mut response)?;
        response.drain()?;
        Ok(())
    }

    fn require_cdn(&self) -> Result<(), ContainerOperationError> {
        if self.conn.cdn_enabled() {
            Ok(())
        } else {
            Err(ContainerOperationError::CdnNotEnabled)
        }
    }
}

/// Split a listing body into names on `\n`, `\r\n` or a lone `\r`.
///
/// A trailing line break does not produce an empty name.
pub(crate) fn parse_listing(body: Vec<u8>) -> Result<Vec<String>, ContainerOperationError> {
    let body = String::from_utf8(body).map_err(|err| ContainerOperationError::Other {
        msg: "listing is not valid UTF-8".into(),
        data: HashMap::from([("error".into(), err.to_string())]),
    })?;
    let mut names: Vec<String> = body
        .replace("\r\n", "\n")
        .split(|c| c == '\n' || c == '\r')
        .map(str::to_string)
        .collect();
    if matches!(names.last(), Some(last) if last.is_empty()) {
        names.pop();
    }
    Ok(names)
}

/// Check a container name: non-empty, and no `/` since containers cannot
/// nest.
pub(crate) fn validate_name(name: &str) -> Result<(), ContainerOperationError> {
    if name.is_empty() || name.contains('/') {
        return Err(ContainerOperationError::InvalidContainerName(name.to_string()));
    }
    Ok(())
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("name", &self.name)
            .field("object_count", &self.object_count)
            .field("size_used", &self.size_used)
            .field("cdn_uri", &self.cdn_uri)
            .field("cdn_ttl", &self.cdn_ttl)
            .field("cdn_agent_acl", &self.cdn_agent_acl)
            .field("cdn_referer_acl", &self.cdn_referer_acl)
            .finish_non_exhaustive()
    }
}

/// Read-only ordered view over container names.
///
/// Every access builds a fresh [`Container`] through [`Container::open`], so
/// repeated access re-fetches CDN metadata.
#[derive(Clone)]
pub struct ContainerResults {
    names: Vec<String>,
    conn: Arc<dyn Connection>,
}

impl ContainerResults {
    pub fn new(conn: Arc<dyn Connection>, names: Vec<String>) -> Self {
        Self { names, conn }
    }

    pub fn get(&self, index: usize) -> Option<Result<Container, ContainerOperationError>> {
        self.names.get(index).map(|name| self.container(name))
    }

    /// Containers for the names in `range`, clamped to the sequence.
    pub fn slice(&self, range: Range<usize>) -> Result<Vec<Container>, ContainerOperationError> {
        let end = range.end.min(self.names.len());
        let start = range.start.min(end);
        self.names[start..end]
            .iter()
            .map(|name| self.container(name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn count(&self, name: &str) -> usize {
        self.names.iter().filter(|n| *n == name).count()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<Container, ContainerOperationError>> + '_ {
        self.names.iter().map(|name| self.container(name))
    }

    fn container(&self, name: &str) -> Result<Container, ContainerOperationError> {
        Container::open(self.conn.clone(), name, None, None)
    }
}

impl fmt::Debug for ContainerResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.names).finish()
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ContainerOperationError {
    #[error("invalid container name: {0:?}")]
    InvalidContainerName(String),
    #[error("invalid object name: {0:?}")]
    InvalidObjectName(String),
    #[error("CDN is not enabled for this account")]
    CdnNotEnabled,
    #[error("container {0:?} is not published to the CDN")]
    ContainerNotPublic(String),
    #[error("no such container: {0:?}")]
    NoSuchContainer(String),
    #[error("container {0:?} is not empty")]
    ContainerNotEmpty(String),
    #[error(transparent)]
    Response(#[from] ResponseError),
    #[error(transparent)]
    Object(#[from] ObjectOperationError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("{msg}")]
    Other {
        msg: String,
        data: HashMap<String, String>,
    },
}
