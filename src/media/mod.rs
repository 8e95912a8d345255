pub mod bundle;
pub mod caption;
pub mod hashing;
pub mod post;
pub mod timestamp;

pub use bundle::ExportBundle;
pub use caption::Caption;
pub use hashing::{hash_media, ImageHasher, MediaHash, MediaHasher};
pub use post::{CaptionField, Post};
