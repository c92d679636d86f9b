pub mod common;
pub mod listen;
pub mod playback;
pub mod purge;
pub mod send;
pub mod start;
pub mod status;
pub mod stop;
