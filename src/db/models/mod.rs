#![allow(unused_imports)]

//! Database models split into separate files.
//! Re-exported so callers can `use crate::db::models::*;`.

pub mod event;
pub mod gallery;
pub mod image;
pub mod settings;
pub mod tier;
pub mod user;

pub use self::event::*;
pub use self::gallery::*;
pub use self::image::*;
pub use self::settings::*;
pub use self::tier::*;
pub use self::user::*;
