pub mod tree;

pub use tree::{enter, TtyHandle, TtyTree, NO_FOCUS, ROOT};
