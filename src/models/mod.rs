pub mod comment;
pub mod group;
pub mod post;
pub mod vote;

pub use comment::*;
pub use group::*;
pub use post::*;
pub use vote::*;
