// src/services/blog.rs

use std::sync::Arc;

use facet::Facet;
use futures::StreamExt;
use tracing::debug;

use crate::dispatch::{Handler, Outbound};
use crate::error::Status;
use crate::store::{BlogDocument, BlogPatch, DocumentId, DocumentStore};

#[derive(Debug, Clone, Default, PartialEq, Eq, Facet)]
pub struct Blog {
    pub id: String,
    pub author_id: String,
    pub title: String,
    pub content: String,
}

impl From<BlogDocument> for Blog {
    fn from(doc: BlogDocument) -> Self {
        Blog {
            id: doc.id,
            author_id: doc.author_id,
            title: doc.title,
            content: doc.content,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct CreateBlogRequest {
    pub blog: Blog,
}

#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct CreateBlogResponse {
    pub blog: Blog,
}

#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct ReadBlogRequest {
    pub blog_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct ReadBlogResponse {
    pub blog: Blog,
}

/// Empty `author_id`, `title`, or `content` means "leave unchanged".
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct UpdateBlogRequest {
    pub blog: Blog,
}

#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct UpdateBlogResponse {
    pub blog: Blog,
}

#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct DeleteBlogRequest {
    pub blog_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct DeleteBlogResponse {
    pub blog_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct ListBlogResponse {
    pub blog: Blog,
}

/// CRUD over blog posts kept in a [`DocumentStore`].
pub struct BlogService<S> {
    store: Arc<S>,
}

impl<S> Clone for BlogService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: DocumentStore> BlogService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn create_blog(&self) -> Handler<CreateBlogRequest, CreateBlogResponse> {
        let store = Arc::clone(&self.store);
        Handler::unary(move |cx, req: CreateBlogRequest| async move {
            let author_id = DocumentId::parse(&req.blog.author_id)?;
            let mut doc = BlogDocument {
                id: String::new(),
                author_id: author_id.to_string(),
                title: req.blog.title,
                content: req.blog.content,
            };
            let id = store.insert(doc.clone()).await?;
            doc.id = id.to_string();
            debug!(session = %cx.session_id(), blog = %id, "blog created");
            Ok(CreateBlogResponse { blog: doc.into() })
        })
    }

    pub fn read_blog(&self) -> Handler<ReadBlogRequest, ReadBlogResponse> {
        let store = Arc::clone(&self.store);
        Handler::unary(move |_, req: ReadBlogRequest| async move {
            let id = DocumentId::parse(&req.blog_id)?;
            let doc = store.find_by_id(id).await?;
            Ok(ReadBlogResponse { blog: doc.into() })
        })
    }

    /// Partial update. A missing document is `NotFound`; there is no upsert.
    pub fn update_blog(&self) -> Handler<UpdateBlogRequest, UpdateBlogResponse> {
        let store = Arc::clone(&self.store);
        Handler::unary(move |cx, req: UpdateBlogRequest| async move {
            let id = DocumentId::parse(&req.blog.id)?;
            let patch = patch_from(req.blog)?;
            let doc = store.find_and_update(id, patch).await?;
            debug!(session = %cx.session_id(), blog = %id, "blog updated");
            Ok(UpdateBlogResponse { blog: doc.into() })
        })
    }

    pub fn delete_blog(&self) -> Handler<DeleteBlogRequest, DeleteBlogResponse> {
        let store = Arc::clone(&self.store);
        Handler::unary(move |cx, req: DeleteBlogRequest| async move {
            let id = DocumentId::parse(&req.blog_id)?;
            let deleted = store.find_and_delete(id).await?;
            debug!(session = %cx.session_id(), blog = %deleted, "blog deleted");
            Ok(DeleteBlogResponse {
                blog_id: deleted.to_string(),
            })
        })
    }

    /// Streams every stored blog. A store failure mid-stream is `Internal`.
    pub fn list_blog(&self) -> Handler<(), ListBlogResponse> {
        let store = Arc::clone(&self.store);
        Handler::server_stream(move |cx, (), out: Outbound<ListBlogResponse>| async move {
            let mut docs = store.find_all();
            let mut listed = 0usize;
            while let Some(doc) = docs.next().await {
                let doc = doc.map_err(|e| {
                    Status::internal(format!("error while reading blogs: {e}"))
                })?;
                out.send(&ListBlogResponse { blog: doc.into() }).await?;
                listed += 1;
            }
            debug!(session = %cx.session_id(), listed, "blogs listed");
            Ok(())
        })
    }
}

/// Fields of an update request that were actually provided.
fn patch_from(blog: Blog) -> Result<BlogPatch, Status> {
    let author_id = match blog.author_id.as_str() {
        "" => None,
        raw => Some(DocumentId::parse(raw)?),
    };
    Ok(BlogPatch {
        author_id,
        title: Some(blog.title).filter(|t| !t.is_empty()),
        content: Some(blog.content).filter(|c| !c.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Code;

    #[test]
    fn empty_fields_are_not_provided() {
        let author = DocumentId::generate();
        let patch = patch_from(Blog {
            id: String::new(),
            author_id: author.to_string(),
            title: String::new(),
            content: "new body".to_string(),
        })
        .unwrap();
        assert_eq!(patch.author_id, Some(author));
        assert_eq!(patch.title, None);
        assert_eq!(patch.content.as_deref(), Some("new body"));

        assert!(patch_from(Blog::default()).unwrap().is_empty());
    }

    #[test]
    fn bad_author_is_invalid_argument() {
        let err = patch_from(Blog {
            author_id: "not-an-id".to_string(),
            ..Blog::default()
        })
        .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }
}
