//! Genesis - Friday Night Funkin' engine launcher
//!
//! Downloads engine builds from a catalog, keeps one shared mod library
//! linked into every install, and runs the games (through Wine on Linux
//! when only a Windows build exists).

pub mod archive;
pub mod catalog;
pub mod downloaders;
pub mod installer;
pub mod launcher;
pub mod logging;
pub mod mods;
pub mod paths;
pub mod platform;
pub mod settings;
