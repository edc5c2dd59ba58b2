//! Runnable example drivers for the table engine workspace.
