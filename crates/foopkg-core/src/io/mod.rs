//! IO modules - side effects (network, filesystem)

pub mod download;
pub mod extract;

pub use download::{Downloader, FetchRequest, HttpDownloader};
pub use extract::{TarUnpacker, Unpacker};
