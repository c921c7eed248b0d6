// Library management module
// This module handles music library scanning, indexing and browsing

pub mod indexer;
pub mod repository;
pub mod scanner;

pub use indexer::{scan_library, IndexingProgress, IndexingResult, LibraryIndexer};
pub use repository::LibraryRepository;
pub use scanner::DirectoryScanner;
