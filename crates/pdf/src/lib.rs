pub mod backend;
pub mod extract;
pub mod layout;

pub use backend::{DocumentBackend, ExtractError, MockBackend, PdfRsBackend, RawPage};
pub use extract::{extract, Extractor};
pub use layout::{layout_page, PageText, TableRegion, TextFragment, TextLine};
