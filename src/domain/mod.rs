pub mod document;
pub mod feed;
pub mod post;
pub mod user;

pub use document::{HyperlinkFragment, NormalizedItem, ParsedDocument, ParsedItem};
pub use feed::Feed;
pub use post::{NewPost, Post};
pub use user::User;
