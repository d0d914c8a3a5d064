mod ply_gaussian;
mod splat_import;

pub use serde_ply::DeserializeError as PlyError;
pub use splat_import::{SplatImportError, load_splats_from_path, load_splats_from_ply};
