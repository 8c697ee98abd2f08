pub mod command;
pub mod info;
pub mod pack;
pub mod play;
