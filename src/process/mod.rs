// Subprocess supervision module
//
// Organized structure:
// - runner.rs: Spawning and line-framed streaming of external tools
// - output.rs: Classification of tool stdout lines into structured events

pub mod output;
pub mod runner;

// Tests
#[cfg(test)]
mod output_tests;


// Re-exports for convenience
pub use output::OutputLine;
pub use runner::{CollectedOutput, CommandSpec, ProcessEvent, ProcessExit, ProcessRunner, ProcessStream};
