pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod notify;
pub mod services;

pub use app::{Action, SphereClient};
pub use error::{ClientError, ClientResult};
pub use notify::{Notice, NoticeVariant, Notifier};
