use std::{collections::HashMap, fmt, ops::Range, sync::Arc};

use reqwest::{header::HeaderMap, Method};

use super::connection::{Connection, ConnectionError, ResponseError};

/// Handle on a single storage object.
///
/// Creating a handle issues no request; [`Object::refresh_metadata`] fetches
/// the object's attributes and fails if it does not exist.
#[derive(Clone)]
pub struct Object {
    pub container_name: String,
    name: String,
    size: Option<u64>,
    content_type: Option<String>,
    etag: Option<String>,
    last_modified: Option<String>,
    conn: Arc<dyn Connection>,
}

impl Object {
    pub(crate) fn new(
        container_name: String,
        name: String,
        conn: Arc<dyn Connection>,
    ) -> Result<Self, ObjectOperationError> {
        if name.is_empty() {
            return Err(ObjectOperationError::InvalidObjectName(name));
        }
        Ok(Self {
            container_name,
            name,
            size: None,
            content_type: None,
            etag: None,
            last_modified: None,
            conn,
        })
    }

    /// Handle on an object that must already exist remotely.
    pub(crate) fn existing(
        container_name: String,
        name: String,
        conn: Arc<dyn Connection>,
    ) -> Result<Self, ObjectOperationError> {
        let mut object = Self::new(container_name, name, conn)?;
        object.refresh_metadata()?;
        Ok(object)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size in bytes, as of the last metadata fetch.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn last_modified(&self) -> Option<&str> {
        self.last_modified.as_deref()
    }

    pub fn refresh_metadata(&mut self) -> Result<(), ObjectOperationError> {
        let mut response = self.conn.make_request(
            Method::HEAD,
            &[self.container_name.as_str(), self.name.as_str()],
            &[],
            HeaderMap::new(),
        )?;
        if response.status == 404 {
            response.drain()?;
            return Err(ObjectOperationError::NoSuchObject {
                container_name: self.container_name.clone(),
                name: self.name.clone(),
            });
        }
        ResponseError::check(&mut response)?;
        response.drain()?;

        if let Some(length) = response.header("content-length") {
            self.size = Some(length.trim().parse::<u64>().map_err(|_| {
                ObjectOperationError::Other {
                    msg: "object content length is not a valid size".into(),
                    data: HashMap::from([
                        ("container_name".into(), self.container_name.clone()),
                        ("name".into(), self.name.clone()),
                        ("content_length".into(), length.to_string()),
                    ]),
                }
            })?);
        }
        self.content_type = response.header("content-type").map(str::to_string);
        self.etag = response.header("etag").map(str::to_string);
        self.last_modified = response.header("last-modified").map(str::to_string);
        Ok(())
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("container_name", &self.container_name)
            .field("name", &self.name)
            .field("size", &self.size)
            .field("content_type", &self.content_type)
            .field("etag", &self.etag)
            .field("last_modified", &self.last_modified)
            .finish_non_exhaustive()
    }
}

/// Read-only ordered view over object names from a container listing.
///
/// Handles are built on access and never cached.
#[derive(Clone)]
pub struct ObjectResults {
    container_name: String,
    names: Vec<String>,
    conn: Arc<dyn Connection>,
}

impl ObjectResults {
    pub(crate) fn new(container_name: String, names: Vec<String>, conn: Arc<dyn Connection>) -> Self {
        Self {
            container_name,
            names,
            conn,
        }
    }

    pub fn get(&self, index: usize) -> Option<Result<Object, ObjectOperationError>> {
        self.names.get(index).map(|name| self.object(name))
    }

    /// Handles for the names in `range`, clamped to the listing.
    pub fn slice(&self, range: Range<usize>) -> Result<Vec<Object>, ObjectOperationError> {
        let end = range.end.min(self.names.len());
        let start = range.start.min(end);
        self.names[start..end].iter().map(|name| self.object(name)).collect()
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

    pub fn iter(&self) -> impl Iterator<Item = Result<Object, ObjectOperationError>> + '_ {
        self.names.iter().map(|name| self.object(name))
    }

    fn object(&self, name: &str) -> Result<Object, ObjectOperationError> {
        Object::new(self.container_name.clone(), name.to_string(), self.conn.clone())
    }
}

impl fmt::Debug for ObjectResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.names).finish()
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ObjectOperationError {
    #[error("invalid object name: {0:?}")]
    InvalidObjectName(String),
    #[error("no such object {name:?} in container {container_name:?}")]
    NoSuchObject { container_name: String, name: String },
    #[error(transparent)]
    Response(#[from] ResponseError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("{msg}")]
    Other {
        msg: String,
        data: HashMap<String, String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::mock::{MockConnection, MockResponse};

    #[test]
    fn test_new_rejects_empty_name() {
        let mock = MockConnection::new(false);
        let err = Object::new("photos".into(), String::new(), mock.clone()).unwrap_err();
        assert!(matches!(err, ObjectOperationError::InvalidObjectName(_)));
        assert_eq!(mock.request_count(), 0);
    }

    #[test]
    fn test_existing_populates_metadata() {
        let mock = MockConnection::new(false);
        mock.push(
            MockResponse::new(200, "OK")
                .header("Content-Length", "512")
                .header("Content-Type", "image/jpeg")
                .header("ETag", "d41d8cd98f00b204e9800998ecf8427e")
                .header("Last-Modified", "Tue, 20 Oct 2026 10:00:00 GMT"),
        );
        let object = Object::existing("photos".into(), "cat.jpg".into(), mock.clone()).unwrap();
        assert_eq!(object.size(), Some(512));
        assert_eq!(object.content_type(), Some("image/jpeg"));
        assert_eq!(object.etag(), Some("d41d8cd98f00b204e9800998ecf8427e"));
        assert_eq!(object.last_modified(), Some("Tue, 20 Oct 2026 10:00:00 GMT"));

        let requests = mock.requests();
        assert_eq!(requests[0].method, Method::HEAD);
        assert_eq!(requests[0].path, vec!["photos", "cat.jpg"]);
        drop(requests);
        assert!(mock.all_bodies_drained());
    }

    #[test]
    fn test_existing_missing_object() {
        let mock = MockConnection::new(false);
        mock.push(MockResponse::new(404, "Not Found").body(b"not here"));
        let err = Object::existing("photos".into(), "dog.jpg".into(), mock.clone()).unwrap_err();
        assert!(matches!(
            err,
            ObjectOperationError::NoSuchObject { ref name, .. } if name == "dog.jpg"
        ));
        assert!(mock.all_bodies_drained());
    }

    #[test]
    fn test_refresh_metadata_server_error() {
        let mock = MockConnection::new(false);
        mock.push(MockResponse::new(503, "Service Unavailable"));
        let mut object = Object::new("photos".into(), "cat.jpg".into(), mock.clone()).unwrap();
        let err = object.refresh_metadata().unwrap_err();
        assert!(matches!(
            err,
            ObjectOperationError::Response(ResponseError { status: 503, ref reason }) if reason == "Service Unavailable"
        ));
    }

    #[test]
    fn test_results_view() {
        let mock = MockConnection::new(false);
        let results = ObjectResults::new(
            "photos".into(),
            vec!["a".into(), "b".into(), "a".into()],
            mock.clone(),
        );
        assert_eq!(results.len(), 3);
        assert_eq!(results.get(1).unwrap().unwrap().name(), "b");
        assert!(results.get(3).is_none());
        assert!(results.contains("a"));
        assert_eq!(results.index_of("a"), Some(0));
        assert_eq!(results.count("a"), 2);
        let sliced = results.slice(1..10).unwrap();
        assert_eq!(sliced.len(), 2);
        assert_eq!(sliced[0].container_name, "photos");
        assert_eq!(mock.request_count(), 0);
    }
}
