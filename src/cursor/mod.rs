mod results;
mod stream;

pub use results::{CursorState, ResultCursor};
