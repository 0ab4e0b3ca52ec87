// ABOUTME: Change-capture installation for tracked tables
// ABOUTME: One trigger function and one row-level trigger per table, named deterministically

pub mod installer;

pub use installer::{change_function_name, change_trigger_name, CaptureInstaller};
