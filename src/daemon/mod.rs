pub mod client;
pub mod gateway;
pub mod lifecycle;
pub mod pipeline;
pub mod protocol;

pub use client::{ClientError, IpcClient};
pub use gateway::{Gateway, GatewayError};
pub use lifecycle::{check_status, daemonize, stop, DaemonStatus, PidFile};
pub use pipeline::{Collaborators, Daemon, RunningDaemon, Stage, StartupError, Startup};
pub use protocol::{Command, Push, Request, Response};
