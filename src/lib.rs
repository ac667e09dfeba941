pub mod audio;
pub mod config;
pub mod net_link;
pub mod protocol;
