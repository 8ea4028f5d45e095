use murmur_shared::content::ContentService;

/// Shared state of the post service handlers
#[derive(Clone)]
pub struct PostServiceContext {
    pub content: ContentService,
}

impl PostServiceContext {
    pub fn new(content: ContentService) -> Self {
        Self { content }
    }
}
