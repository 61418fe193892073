pub mod build;
pub mod cancel;
pub mod codec;
pub mod descriptor;
pub mod error;
pub mod path_safety;
pub mod progress;
pub mod scan;
pub mod span;
pub mod trackers;
pub mod verify;

pub use cancel::CancelToken;
pub use descriptor::{Descriptor, FileEntry, PieceHash, Tiers, DEFAULT_PIECE_LENGTH};
pub use error::{Error, Result};
