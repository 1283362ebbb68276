#![doc = "mdhost-core: upload protocol and hosting backends for mdhost."]

//! This crate holds every piece of upload logic; the `mdhost` binary crate only adds CLI glue
//! and configuration loading.
//!
//! # Layout
//! - [`orchestrator`]: the backend-agnostic upload protocol for eventually-consistent backends
//! - [`poller`] and [`retry`]: bounded link polling and its timing policy
//! - [`contract`]: the traits backends implement (credentials, remote fs, transfer, links)
//! - [`backends`]: Alist, SM.MS and Imgur, plus [`backends::build_uploader`]
//! - [`transport`], [`multipart`], [`artifact`], [`markdown`]: leaf utilities
//!
//! # Usage
//! ```ignore
//! let http = Arc::new(ReqwestTransport::new());
//! let uploader = mdhost_core::backends::build_uploader(&config, http, None);
//! let request = UploadRequest::from_path("shot.png").await?;
//! println!("{}", uploader.upload(&request).await?);
//! ```

pub mod artifact;
pub mod backends;
pub mod config;
pub mod contract;
pub mod error;
pub mod markdown;
pub mod multipart;
pub mod orchestrator;
pub mod poller;
pub mod retry;
pub mod transport;

pub use contract::{UploadRequest, Uploader};
pub use error::{TransportError, UploadError};
