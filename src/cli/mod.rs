//! CLI support commands.

pub mod doctor;
