pub mod document;
pub mod loaders;
pub mod page;
pub mod session;

pub use document::{DocumentType, ExtractionContext, ExtractionOutcome, NormalizedPageData};
pub use loaders::{load_manifest, parse_manifest, PageManifest};
pub use page::{PageDescriptor, PageState, PageStatus};
pub use session::{BatchStatus, RemotePageInfo, RemotePageStatus, SessionDocument, SessionStatus};
