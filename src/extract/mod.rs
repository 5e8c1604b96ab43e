//! Archive unpacking and document text extraction.

mod text;
mod unpack;

pub use text::{save_text, text_output_path, PdfExtractor, TextExtractor};
pub use unpack::{archive_filename, archive_slug, discover_documents, unpack_archive};
