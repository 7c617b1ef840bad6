// Terminal rendering for the CLI binary
//
// Organized structure:
// - progress.rs: In-place progress bar for wipe sessions

pub mod progress;


// Re-exports for convenience
pub use progress::{human_bytes, ProgressBar};
