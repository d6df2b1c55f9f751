// src/store.rs

//! Document store contract used by the blog service, and an in-memory store.

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use facet::Facet;
use futures::StreamExt;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::Status;

/// Opaque, globally unique document identifier.
///
/// Rendered as a hyphenated lowercase UUID string on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct DocumentId(Uuid);

impl DocumentId {
    pub fn generate() -> Self {
        DocumentId(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Result<Self, ParseIdError> {
        Uuid::parse_str(raw.trim())
            .map(DocumentId)
            .map_err(|_| ParseIdError(raw.to_string()))
    }
}

impl FromStr for DocumentId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentId::parse(s)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// A string that is not a valid [`DocumentId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError(pub String);

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "the provided id {:?} is not a valid document id", self.0)
    }
}

impl std::error::Error for ParseIdError {}

impl From<ParseIdError> for Status {
    fn from(err: ParseIdError) -> Self {
        Status::invalid_argument(err.to_string())
    }
}

/// Stored form of a blog post.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct BlogDocument {
    pub id: String,
    pub author_id: String,
    pub title: String,
    pub content: String,
}

/// Fields to overwrite in [`DocumentStore::find_and_update`].
///
/// `None` leaves the stored value untouched; it never clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlogPatch {
    pub author_id: Option<DocumentId>,
    pub title: Option<String>,
    pub content: Option<String>,
}

impl BlogPatch {
    pub fn is_empty(&self) -> bool {
        self.author_id.is_none() && self.title.is_none() && self.content.is_none()
    }

    pub fn apply(self, doc: &mut BlogDocument) {
        if let Some(author_id) = self.author_id {
            doc.author_id = author_id.to_string();
        }
        if let Some(title) = self.title {
            doc.title = title;
        }
        if let Some(content) = self.content {
            doc.content = content;
        }
    }
}

/// Outcome of a store operation that did not produce a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No document has this id.
    NotFound(DocumentId),
    /// The backend could not be reached or refused the operation.
    Backend(String),
    /// A stored document could not be read back.
    Decode(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "document {id} not found"),
            StoreError::Backend(detail) => write!(f, "store unavailable: {detail}"),
            StoreError::Decode(detail) => write!(f, "stored document is unreadable: {detail}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<StoreError> for Status {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Status::not_found(err.to_string()),
            StoreError::Backend(_) => Status::unavailable(err.to_string()),
            StoreError::Decode(_) => Status::internal(err.to_string()),
        }
    }
}

/// Read/write access to blog documents.
///
/// Each operation is atomic and independent; no operation spans another.
pub trait DocumentStore: Send + Sync + 'static {
    fn insert(
        &self,
        doc: BlogDocument,
    ) -> impl Future<Output = Result<DocumentId, StoreError>> + Send + '_;

    fn find_by_id(
        &self,
        id: DocumentId,
    ) -> impl Future<Output = Result<BlogDocument, StoreError>> + Send + '_;

    /// Apply `patch` and return the document as it is afterwards.
    fn find_and_update(
        &self,
        id: DocumentId,
        patch: BlogPatch,
    ) -> impl Future<Output = Result<BlogDocument, StoreError>> + Send + '_;

    fn find_and_delete(
        &self,
        id: DocumentId,
    ) -> impl Future<Output = Result<DocumentId, StoreError>> + Send + '_;

    /// Every document, produced lazily in insertion order.
    fn find_all(&self) -> BoxStream<'static, Result<BlogDocument, StoreError>>;
}

/// In-process [`DocumentStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: Mutex<Vec<(DocumentId, BlogDocument)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.lock().is_empty()
    }
}

impl DocumentStore for MemoryStore {
    async fn insert(&self, mut doc: BlogDocument) -> Result<DocumentId, StoreError> {
        let id = DocumentId::generate();
        doc.id = id.to_string();
        self.docs.lock().push((id, doc));
        Ok(id)
    }

    async fn find_by_id(&self, id: DocumentId) -> Result<BlogDocument, StoreError> {
        self.docs
            .lock()
            .iter()
            .find(|(key, _)| *key == id)
            .map(|(_, doc)| doc.clone())
            .ok_or(StoreError::NotFound(id))
    }

    async fn find_and_update(
        &self,
        id: DocumentId,
        patch: BlogPatch,
    ) -> Result<BlogDocument, StoreError> {
        let mut docs = self.docs.lock();
        let (_, doc) = docs
            .iter_mut()
            .find(|(key, _)| *key == id)
            .ok_or(StoreError::NotFound(id))?;
        patch.apply(doc);
        Ok(doc.clone())
    }

    async fn find_and_delete(&self, id: DocumentId) -> Result<DocumentId, StoreError> {
        let mut docs = self.docs.lock();
        let index = docs
            .iter()
            .position(|(key, _)| *key == id)
            .ok_or(StoreError::NotFound(id))?;
        docs.remove(index);
        Ok(id)
    }

    fn find_all(&self) -> BoxStream<'static, Result<BlogDocument, StoreError>> {
        let snapshot: Vec<BlogDocument> = self.docs.lock().iter().map(|(_, doc)| doc.clone()).collect();
        futures::stream::iter(snapshot.into_iter().map(Ok)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Code;
    use futures::TryStreamExt;

    fn doc(title: &str) -> BlogDocument {
        BlogDocument {
            id: String::new(),
            author_id: DocumentId::generate().to_string(),
            title: title.to_string(),
            content: format!("{title} body"),
        }
    }

    #[test]
    fn ids_parse_back() {
        let id = DocumentId::generate();
        assert_eq!(id.to_string().parse::<DocumentId>().unwrap(), id);
        assert!(DocumentId::parse("5f2b1c").is_err());

        let status = Status::from(DocumentId::parse("nope").unwrap_err());
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn insert_assigns_id() {
        let store = MemoryStore::new();
        let id = store.insert(doc("first")).await.unwrap();
        let found = store.find_by_id(id).await.unwrap();
        assert_eq!(found.id, id.to_string());
        assert_eq!(found.title, "first");
    }

    #[tokio::test]
    async fn patch_only_touches_given_fields() {
        let store = MemoryStore::new();
        let original = doc("draft");
        let id = store.insert(original.clone()).await.unwrap();

        let patch = BlogPatch {
            title: Some("final".to_string()),
            ..BlogPatch::default()
        };
        let updated = store.find_and_update(id, patch).await.unwrap();
        assert_eq!(updated.title, "final");
        assert_eq!(updated.content, original.content);
        assert_eq!(updated.author_id, original.author_id);
    }

    #[tokio::test]
    async fn missing_ids_are_not_found() {
        let store = MemoryStore::new();
        let id = DocumentId::generate();
        assert_eq!(store.find_by_id(id).await, Err(StoreError::NotFound(id)));
        assert_eq!(store.find_and_delete(id).await, Err(StoreError::NotFound(id)));
        let err = store
            .find_and_update(id, BlogPatch::default())
            .await
            .unwrap_err();
        assert_eq!(Status::from(err).code(), Code::NotFound);
    }

    #[tokio::test]
    async fn find_all_in_insertion_order() {
        let store = MemoryStore::new();
        for title in ["a", "b", "c"] {
            store.insert(doc(title)).await.unwrap();
        }
        let deleted = store
            .find_all()
            .try_collect::<Vec<_>>()
            .await
            .unwrap()
            .remove(1);
        store
            .find_and_delete(deleted.id.parse().unwrap())
            .await
            .unwrap();

        let titles: Vec<String> = store
            .find_all()
            .map_ok(|doc| doc.title)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(titles, ["a", "c"]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn store_errors_map_to_status() {
        assert_eq!(
            Status::from(StoreError::Backend("connection refused".into())).code(),
            Code::Unavailable
        );
        assert_eq!(
            Status::from(StoreError::Decode("bad field".into())).code(),
            Code::Internal
        );
    }
}
