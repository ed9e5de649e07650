//! Web automation for data-extraction pipelines.
//!
//! One command surface drives two interchangeable backends — a stateful
//! HTTP client ([`Session`]) and a headless browser ([`BrowserSession`]) —
//! and every network interaction is transparently recorded to disk so a
//! script can later replay deterministically without touching the network.
//! On top sits a declarative extractor ([`extract_model!`]) mapping DOM
//! subtrees onto typed records.
//!
//! ```no_run
//! use webreplay::{action, DataSlot, ExtractOptions, Session};
//!
//! webreplay::extract_model! {
//!     pub struct Headline {
//!         title: String [find("h1")],
//!         links: Vec<String> [find("a"), attr("href")],
//!     }
//! }
//!
//! # async fn run() -> webreplay::Result<()> {
//! let session = Session::new("example")?.with_save_to_file(true);
//! let data = DataSlot::<Headline>::new();
//! session
//!     .run(&[
//!         action::navigate("https://example.com"),
//!         action::wait_visible("h1"),
//!         action::extract_into(data.clone(), "body", ExtractOptions::default()),
//!     ])
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod artifact;
pub mod browser;
pub mod config;
pub mod error;
pub mod extract;
pub mod form;
pub mod page;
pub mod session;
pub mod timeouts;
pub mod xpath;

pub use action::{Action, DataSlot, ScraperRef};
pub use artifact::{ArtifactStore, PageMetadata};
pub use browser::{BrowserOptions, BrowserSession, DownloadOptions};
pub use config::Config;
pub use error::Error;
pub use extract::{Extract, ExtractOptions};
pub use form::{Form, FormElement};
pub use page::Page;
pub use session::{FollowAnchorTextOptions, HttpResponse, Session, TraceFlags};

pub type Result<T> = std::result::Result<T, Error>;
