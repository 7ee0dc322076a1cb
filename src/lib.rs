//! Resilient admin dashboard API client: single-flight token refresh, circuit breaking,
//! per-category rate limiting, and bounded retry funneled through one request pipeline.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod backoff;
pub mod breaker;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod obs;
pub mod rate_limit;
pub mod store;

mod _prelude {
	pub use std::{
		collections::{HashMap, VecDeque},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
		time::Duration,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use tokio::time::Instant;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use client::{ApiClient, ApiEnvelope, ApiRequest};
pub use config::ClientConfig;
pub use error::{Error, ErrorKind, Result};
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
