pub mod archive;
pub mod auth;
pub mod downloads;
pub mod email;
pub mod galleries;
pub mod init;
pub mod lifecycle;
pub mod redeploy;
pub mod scheduler;
pub mod settings;
pub mod storage;
