// Sstcat Kernel
//
// Reconstructs SSTables from a flat object listing and produces
// their descriptors plus the migration global state.

pub mod catalog;
pub mod classify;
pub mod config;
pub mod descriptor;
pub mod format;
pub mod names;
pub mod run;
pub mod state;
pub mod store;
