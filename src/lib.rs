//! # STEP - Block-Chunked File Transfer
//!
//! Client for the STEP protocol: length-prefixed frames with a JSON header
//! and a binary payload over TCP. A file is uploaded by asking the server
//! for a plan, streaming one block per request in index order, and
//! comparing the server's MD5 of the stored file with the local one.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use step::{ClientConfig, StepClient, Uploader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), step::StepError> {
//!     let client = StepClient::new(ClientConfig::default());
//!     let token = client.login("2254411", "2254411").await?;
//!     client.verify_token(&token)?;
//!     let outcome = Uploader::new(&client).upload(&token, "report.pdf".as_ref()).await?;
//!     println!("{} uploaded in {} blocks", outcome.key, outcome.total_block);
//!     Ok(())
//! }
//! ```
//!
//! A reference server lives in [`serve`]; it is what `step serve` runs and
//! what the integration tests upload against.

pub mod auth;
pub mod callbacks;
pub mod client;
pub mod config;
pub mod error;
pub mod integrity;
pub mod logging;
pub mod protocol;
pub mod serve;
pub mod upload;
pub mod util;

// Re-export commonly used types and functions
pub use auth::{Md5TokenStrategy, TokenClaims, TokenError, TokenStrategy};
pub use callbacks::{BlockProgress, LogCallback, NoCallback, UploadCallback, UploadEvent};
pub use client::{Connector, StepClient, TcpConnector};
pub use config::ClientConfig;
pub use error::{ErrorKind, StepError};
pub use integrity::IntegrityStatus;
pub use upload::{UploadOutcome, UploadPlan, Uploader};

// vim: ts=4
