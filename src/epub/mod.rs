mod reader;
mod writer;

pub use reader::{read_epub, read_epub_from_reader};
pub use writer::{write_epub_chapter, write_epub_chapter_to_writer};
