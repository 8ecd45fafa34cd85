mod reader;
mod writer;

pub use reader::read_pdf;
pub use writer::write_pdf_chapter;
