pub mod manifest_loader;

pub use manifest_loader::{load_manifest, parse_manifest, PageManifest};
